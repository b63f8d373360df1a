//! Per-employee document excerpts.
//!
//! Each line of the document is owned by the most recent employee whose
//! identifier it mentions. Lines before the first mention (titles, column
//! headers) belong to everyone. This works for block layouts, where a header
//! line starts each employee's section, and for row layouts, where every row
//! names its employee.

use std::borrow::Cow;

/// Returns the lines of `document_text` relevant to `identifier`.
///
/// `all_identifiers` must list every employee being extracted, including
/// `identifier` itself. If no line mentions `identifier`, the whole document
/// is returned unchanged.
///
/// # Example
///
/// ```
/// use timesheet_ingest::workflow::excerpt_for_employee;
///
/// let document = "Week 3\nEmployee: Ann\n09:00 IN\nEmployee: Bob\n10:00 IN\n";
/// let excerpt = excerpt_for_employee(document, "Bob", &["Ann", "Bob"]);
/// assert_eq!(excerpt, "Week 3\nEmployee: Bob\n10:00 IN\n");
/// ```
pub fn excerpt_for_employee<'a>(
    document_text: &'a str,
    identifier: &str,
    all_identifiers: &[&str],
) -> Cow<'a, str> {
    let mut excerpt = String::new();
    let mut owner: Option<&str> = None;
    let mut owned_lines = 0usize;

    for line in document_text.split_inclusive('\n') {
        let mut mentions = all_identifiers
            .iter()
            .copied()
            .filter(|id| !id.is_empty() && line.contains(id));

        if let Some(first) = mentions.next() {
            let mentions_target = first == identifier || mentions.any(|id| id == identifier);
            owner = Some(if mentions_target { identifier } else { first });
        }

        match owner {
            None => excerpt.push_str(line),
            Some(current) if current == identifier => {
                excerpt.push_str(line);
                owned_lines += 1;
            }
            Some(_) => {}
        }
    }

    if owned_lines == 0 {
        Cow::Borrowed(document_text)
    } else {
        Cow::Owned(excerpt)
    }
}
