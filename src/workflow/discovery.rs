//! Employee discovery, validation and deduplication.
//!
//! Discovery asks the extraction capability to list the employees in a
//! document. Every candidate it returns is then checked against the source
//! text, so a hallucinated employee never reaches the per-employee stage, and
//! near-duplicate identifiers (a partial and a full capture of the same
//! header) are merged.

use tracing::{debug, info, warn};

use crate::capability::ExtractionCapability;
use crate::error::{EngineError, EngineResult};
use crate::models::EmployeeCandidate;

/// The validated result of a discovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    /// Validated, deduplicated candidates in discovery order.
    pub candidates: Vec<EmployeeCandidate>,
    /// Issues raised by the service, the validator and the deduplicator.
    pub issues: Vec<String>,
    /// Number of candidates the service returned before validation.
    pub discovered_count: usize,
}

/// Runs discovery against the capability and validates the result.
///
/// # Errors
///
/// - `CapabilityUnavailable` if the service could not be reached
/// - `DiscoveryFailed` if the request failed for any other reason, or if no
///   candidate survived validation
pub async fn discover(
    capability: &dyn ExtractionCapability,
    document_text: &str,
    filename: &str,
) -> EngineResult<DiscoveryOutcome> {
    let document_size = document_text.chars().count();

    let payload = match capability.discover(document_text, filename).await {
        Ok(payload) => payload,
        Err(e) if e.is_infrastructure() => {
            return Err(EngineError::CapabilityUnavailable {
                stage: "discovery".to_string(),
                message: e.to_string(),
            });
        }
        Err(e) => {
            return Err(EngineError::DiscoveryFailed {
                filename: filename.to_string(),
                document_size,
                issues: vec![e.to_string()],
            });
        }
    };

    if let Err(e) = payload.validate() {
        return Err(EngineError::DiscoveryFailed {
            filename: filename.to_string(),
            document_size,
            issues: vec![e.to_string()],
        });
    }

    let discovered_count = payload.employees.len();
    let mut issues = payload.issues;
    let candidates: Vec<EmployeeCandidate> = payload
        .employees
        .into_iter()
        .map(EmployeeCandidate::from)
        .collect();

    let (validated, validation_issues) = validate_candidates(document_text, candidates);
    issues.extend(validation_issues);

    let (candidates, merge_notes) = deduplicate_candidates(validated);
    issues.extend(merge_notes);

    if candidates.is_empty() {
        issues.push("no validated employees found in document".to_string());
        return Err(EngineError::DiscoveryFailed {
            filename: filename.to_string(),
            document_size,
            issues,
        });
    }

    info!(
        filename = filename,
        discovered = discovered_count,
        validated = candidates.len(),
        "Employee discovery complete"
    );

    Ok(DiscoveryOutcome {
        candidates,
        issues,
        discovered_count,
    })
}

/// Drops candidates whose identifier does not appear verbatim in the document.
///
/// An identifier that only matches after trimming surrounding whitespace is
/// kept in its trimmed form, which is still a verbatim substring.
///
/// # Example
///
/// ```
/// use timesheet_ingest::models::EmployeeCandidate;
/// use timesheet_ingest::workflow::validate_candidates;
///
/// let document = "Employee: Jane Doe\n09:00 IN\n";
/// let (kept, issues) = validate_candidates(
///     document,
///     vec![EmployeeCandidate::new("Jane Doe", 1), EmployeeCandidate::new("John Roe", 3)],
/// );
/// assert_eq!(kept.len(), 1);
/// assert_eq!(issues, vec!["no evidence of employee 'John Roe' in source document"]);
/// ```
pub fn validate_candidates(
    document_text: &str,
    candidates: Vec<EmployeeCandidate>,
) -> (Vec<EmployeeCandidate>, Vec<String>) {
    let mut kept = Vec::with_capacity(candidates.len());
    let mut issues = Vec::new();

    for mut candidate in candidates {
        let trimmed = candidate.identifier.trim();
        if !trimmed.is_empty() && document_text.contains(candidate.identifier.as_str()) {
            kept.push(candidate);
        } else if !trimmed.is_empty() && document_text.contains(trimmed) {
            candidate.identifier = trimmed.to_string();
            kept.push(candidate);
        } else {
            warn!(
                identifier = %candidate.identifier,
                "Discarding employee with no evidence in source document"
            );
            issues.push(format!(
                "no evidence of employee '{}' in source document",
                candidate.identifier
            ));
        }
    }

    (kept, issues)
}

/// Merges candidates that refer to the same employee.
///
/// Two identifiers match when their normalized forms (lowercase, whitespace
/// collapsed) are equal or when one is contained in the other on word
/// boundaries, where punctuation also separates words. The candidate with the
/// higher punch estimate wins; on a tie the one discovered first wins. The
/// survivor keeps the earlier position, so the output preserves discovery
/// order. Merging repeats until no pair matches, which makes the operation
/// idempotent.
pub fn deduplicate_candidates(
    candidates: Vec<EmployeeCandidate>,
) -> (Vec<EmployeeCandidate>, Vec<String>) {
    let mut current = candidates;
    let mut notes = Vec::new();

    loop {
        let mut kept: Vec<EmployeeCandidate> = Vec::with_capacity(current.len());
        let mut merged_any = false;

        for candidate in current {
            let Some(index) = kept
                .iter()
                .position(|k| identifiers_match(&k.identifier, &candidate.identifier))
            else {
                kept.push(candidate);
                continue;
            };

            merged_any = true;
            let (mut winner, loser) =
                if candidate.punch_count_estimate > kept[index].punch_count_estimate {
                    (candidate, kept[index].clone())
                } else {
                    (kept[index].clone(), candidate)
                };

            debug!(
                kept = %winner.identifier,
                dropped = %loser.identifier,
                "Merging duplicate employee candidates"
            );
            notes.push(format!(
                "merged duplicate employee '{}' (estimate {}) into '{}' (estimate {})",
                loser.identifier,
                loser.punch_count_estimate,
                winner.identifier,
                winner.punch_count_estimate
            ));

            if winner.canonical_name_hint.is_none() {
                winner.canonical_name_hint = loser.canonical_name_hint;
            }
            kept[index] = winner;
        }

        current = kept;
        if !merged_any {
            return (current, notes);
        }
    }
}

/// Returns true if two identifiers name the same employee.
///
/// Both sides are lowercased with whitespace collapsed. They match when equal,
/// or when the shorter appears inside the longer between word boundaries. Any
/// character that is not alphanumeric counts as a boundary, so "smith" matches
/// "smith, john" but "ann" does not match "joann".
pub(crate) fn identifiers_match(a: &str, b: &str) -> bool {
    let a = normalize_identifier(a);
    let b = normalize_identifier(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }

    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    long.char_indices()
        .filter(|(start, _)| long[*start..].starts_with(short.as_str()))
        .any(|(start, _)| {
            let before = long[..start].chars().next_back();
            let after = long[start + short.len()..].chars().next();
            is_word_boundary(before) && is_word_boundary(after)
        })
}

fn normalize_identifier(identifier: &str) -> String {
    identifier
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_word_boundary(neighbor: Option<char>) -> bool {
    neighbor.is_none_or(|c| !c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{
        CapabilityError, DiscoveredEmployee, DiscoveryPayload, ExtractionPayload,
    };
    use async_trait::async_trait;
    use proptest::prelude::*;

    struct FixedDiscovery(Result<DiscoveryPayload, CapabilityError>);

    #[async_trait]
    impl ExtractionCapability for FixedDiscovery {
        async fn discover(
            &self,
            _document_text: &str,
            _filename: &str,
        ) -> Result<DiscoveryPayload, CapabilityError> {
            self.0.clone()
        }

        async fn extract_for_employee(
            &self,
            _document_text: &str,
            _employee_identifier: &str,
            _filename: &str,
            _estimated_count: u32,
        ) -> Result<ExtractionPayload, CapabilityError> {
            Ok(ExtractionPayload::default())
        }

        async fn extract_document(
            &self,
            _document_text: &str,
            _filename: &str,
        ) -> Result<ExtractionPayload, CapabilityError> {
            Ok(ExtractionPayload::default())
        }
    }

    fn employee(identifier: &str, estimate: u32) -> DiscoveredEmployee {
        DiscoveredEmployee {
            identifier: identifier.to_string(),
            punch_count_estimate: estimate,
            canonical_name: None,
        }
    }

    fn candidate(identifier: &str, estimate: u32) -> EmployeeCandidate {
        EmployeeCandidate::new(identifier, estimate)
    }

    const DOCUMENT: &str = "\
Employee: Jane Doe
2026-01-15 09:00 Clock In
2026-01-15 17:00 Clock Out
Employee: SMITH, John (4471)
2026-01-15 08:00 Clock In
";

    #[tokio::test]
    async fn test_discover_validates_and_dedupes() {
        let capability = FixedDiscovery(Ok(DiscoveryPayload {
            employees: vec![
                employee("Jane Doe", 2),
                employee("SMITH, John", 1),
                employee("Ghost Person", 4),
                employee("SMITH, John (4471)", 1),
            ],
            issues: vec![],
        }));

        let outcome = discover(&capability, DOCUMENT, "week.txt").await.unwrap();

        assert_eq!(outcome.discovered_count, 4);
        let ids: Vec<&str> = outcome
            .candidates
            .iter()
            .map(|c| c.identifier.as_str())
            .collect();
        assert_eq!(ids, vec!["Jane Doe", "SMITH, John"]);
        assert_eq!(outcome.issues.len(), 2);
        assert_eq!(
            outcome.issues[0],
            "no evidence of employee 'Ghost Person' in source document"
        );
        assert!(outcome.issues[1].starts_with("merged duplicate employee 'SMITH, John (4471)'"));
    }

    #[tokio::test]
    async fn test_discover_with_no_surviving_candidates_fails() {
        let capability = FixedDiscovery(Ok(DiscoveryPayload {
            employees: vec![employee("Ghost Person", 4)],
            issues: vec![],
        }));

        match discover(&capability, DOCUMENT, "week.txt").await {
            Err(EngineError::DiscoveryFailed {
                filename,
                document_size,
                issues,
            }) => {
                assert_eq!(filename, "week.txt");
                assert_eq!(document_size, DOCUMENT.chars().count());
                assert_eq!(issues.len(), 2);
                assert_eq!(issues[1], "no validated employees found in document");
            }
            other => panic!("Expected DiscoveryFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discover_empty_payload_fails() {
        let capability = FixedDiscovery(Ok(DiscoveryPayload::default()));
        assert!(matches!(
            discover(&capability, "", "empty.csv").await,
            Err(EngineError::DiscoveryFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_discover_unreachable_capability() {
        let capability = FixedDiscovery(Err(CapabilityError::Unavailable {
            message: "connection refused".to_string(),
        }));

        match discover(&capability, DOCUMENT, "week.txt").await {
            Err(EngineError::CapabilityUnavailable { stage, message }) => {
                assert_eq!(stage, "discovery");
                assert!(message.contains("connection refused"));
            }
            other => panic!("Expected CapabilityUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discover_request_error_is_discovery_failure() {
        let capability = FixedDiscovery(Err(CapabilityError::Fatal {
            message: "invalid api key".to_string(),
        }));

        assert!(matches!(
            discover(&capability, DOCUMENT, "week.txt").await,
            Err(EngineError::DiscoveryFailed { .. })
        ));
    }

    #[test]
    fn test_validate_trims_padded_identifier() {
        let (kept, issues) = validate_candidates(DOCUMENT, vec![candidate("  Jane Doe ", 2)]);

        assert!(issues.is_empty());
        assert_eq!(kept[0].identifier, "Jane Doe");
    }

    #[test]
    fn test_validate_is_case_sensitive() {
        let (kept, issues) = validate_candidates(DOCUMENT, vec![candidate("jane doe", 2)]);

        assert!(kept.is_empty());
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_validate_rejects_blank_identifier() {
        let (kept, _) = validate_candidates(DOCUMENT, vec![candidate("   ", 2)]);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_dedupe_prefers_higher_estimate() {
        let (kept, notes) =
            deduplicate_candidates(vec![candidate("John Smith", 3), candidate("SMITH", 9)]);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].identifier, "SMITH");
        assert_eq!(kept[0].punch_count_estimate, 9);
        assert_eq!(
            notes,
            vec!["merged duplicate employee 'John Smith' (estimate 3) into 'SMITH' (estimate 9)"]
        );
    }

    #[test]
    fn test_dedupe_merges_surname_into_punctuated_header() {
        let (kept, notes) =
            deduplicate_candidates(vec![candidate("SMITH", 3), candidate("SMITH, John", 8)]);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].identifier, "SMITH, John");
        assert_eq!(
            notes,
            vec!["merged duplicate employee 'SMITH' (estimate 3) into 'SMITH, John' (estimate 8)"]
        );
    }

    #[test]
    fn test_identifiers_match_on_punctuation_boundaries() {
        assert!(identifiers_match("SMITH", "SMITH, John"));
        assert!(identifiers_match("John", "SMITH,John"));
        assert!(identifiers_match("4471", "Smith (4471)"));
        assert!(identifiers_match("jane  DOE", "Jane Doe"));
        assert!(!identifiers_match("Ann", "Joann"));
        assert!(!identifiers_match("Smith", "Smithson, Al"));
        assert!(!identifiers_match("", "Ann"));
    }

    #[test]
    fn test_dedupe_tie_keeps_first_discovered() {
        let (kept, _) = deduplicate_candidates(vec![
            candidate("jane  doe", 4),
            candidate("Bob Roe", 2),
            candidate("Jane Doe", 4),
        ]);

        let ids: Vec<&str> = kept.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(ids, vec!["jane  doe", "Bob Roe"]);
    }

    #[test]
    fn test_dedupe_winner_keeps_earlier_position() {
        let (kept, _) = deduplicate_candidates(vec![
            candidate("Lee", 1),
            candidate("Bob Roe", 2),
            candidate("Ann Lee", 5),
        ]);

        let ids: Vec<&str> = kept.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(ids, vec!["Ann Lee", "Bob Roe"]);
    }

    #[test]
    fn test_dedupe_does_not_merge_partial_words() {
        let (kept, notes) = deduplicate_candidates(vec![candidate("Ann", 2), candidate("Joann", 2)]);

        assert_eq!(kept.len(), 2);
        assert!(notes.is_empty());
    }

    #[test]
    fn test_dedupe_merges_transitively() {
        // "Ann Lee Bob" absorbs "Ann Lee", then matches "Bob" on the next pass
        let (kept, _) = deduplicate_candidates(vec![
            candidate("Ann Lee", 1),
            candidate("Bob", 1),
            candidate("Ann Lee Bob", 5),
        ]);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].identifier, "Ann Lee Bob");
    }

    #[test]
    fn test_dedupe_inherits_name_hint() {
        let mut hinted = candidate("J. Doe", 1);
        hinted.canonical_name_hint = Some("Jane Doe".to_string());

        let (kept, _) = deduplicate_candidates(vec![hinted, candidate("Mrs J. Doe", 7)]);

        assert_eq!(kept[0].identifier, "Mrs J. Doe");
        assert_eq!(kept[0].canonical_name_hint.as_deref(), Some("Jane Doe"));
    }

    proptest! {
        #[test]
        fn prop_dedupe_is_idempotent(
            entries in prop::collection::vec(
                ("(Ann|Bob|Lee|Roe|Cy|Tam)( (Ann|Bob|Lee|Roe|Cy|Tam)){0,2}", 0u32..10),
                0..12,
            )
        ) {
            let candidates: Vec<EmployeeCandidate> = entries
                .iter()
                .map(|(id, est)| candidate(id, *est))
                .collect();

            let (once, _) = deduplicate_candidates(candidates);
            let (twice, notes) = deduplicate_candidates(once.clone());

            prop_assert_eq!(once, twice);
            prop_assert!(notes.is_empty());
        }
    }
}
