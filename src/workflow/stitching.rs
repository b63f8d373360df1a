//! Merging extraction results into one dataset.
//!
//! Stitching is synchronous and deterministic. Output order depends only on
//! the order of its input, never on when requests completed.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::models::{EmployeeParseOutcome, PunchEvent, StitchOutput};

/// Weight of the success rate in the quality score; the rest comes from
/// count accuracy.
const SUCCESS_WEIGHT: f64 = 0.8;

/// Merges per-employee outcomes into a single result.
///
/// Events from successful outcomes are emitted in outcome order, sorted by
/// timestamp within each employee. Discovery issues come first in the issue
/// list, followed by every outcome's issues prefixed with its identifier.
///
/// # Example
///
/// ```
/// use timesheet_ingest::workflow::stitch;
///
/// let output = stitch(&[], &["no punches found".to_string()], true);
/// assert!(output.punch_events.is_empty());
/// assert_eq!(output.issues, vec!["no punches found"]);
/// assert_eq!(output.quality_score, 0.0);
/// ```
pub fn stitch(
    outcomes: &[EmployeeParseOutcome],
    discovery_issues: &[String],
    enable_deduplication: bool,
) -> StitchOutput {
    let mut issues: Vec<String> = discovery_issues.to_vec();
    let mut events = Vec::new();

    for outcome in outcomes {
        issues.extend(
            outcome
                .issues
                .iter()
                .map(|issue| format!("[{}] {}", outcome.employee_identifier, issue)),
        );

        if !outcome.is_success() {
            continue;
        }
        let mut employee_events = outcome.punch_events.clone();
        employee_events.sort_by_key(|e| e.timestamp);
        events.extend(employee_events);
    }

    let (punch_events, duplicates_removed) = if enable_deduplication {
        deduplicate_events(events)
    } else {
        (events, 0)
    };

    if duplicates_removed > 0 {
        debug!(duplicates_removed, "Removed duplicate punch events");
    }

    StitchOutput {
        punch_events,
        issues,
        quality_score: quality_score(outcomes),
        duplicates_removed,
    }
}

/// Builds the result of a whole-document extraction.
///
/// Events whose identifier (after trimming) does not appear verbatim in the
/// document are dropped with an issue. The rest are grouped by employee in
/// order of first appearance and sorted by timestamp within each group.
pub fn stitch_document(
    document_text: &str,
    events: Vec<PunchEvent>,
    mut issues: Vec<String>,
    enable_deduplication: bool,
) -> StitchOutput {
    let mut order: Vec<String> = Vec::new();
    let mut kept = Vec::with_capacity(events.len());
    let mut unverified: Vec<String> = Vec::new();

    for mut event in events {
        let trimmed = event.employee_identifier.trim();
        if trimmed.is_empty() || !document_text.contains(trimmed) {
            if !unverified.contains(&event.employee_identifier) {
                unverified.push(event.employee_identifier.clone());
            }
            continue;
        }
        if trimmed.len() != event.employee_identifier.len() {
            event.employee_identifier = trimmed.to_string();
        }
        if !order.contains(&event.employee_identifier) {
            order.push(event.employee_identifier.clone());
        }
        kept.push(event);
    }

    for identifier in &unverified {
        warn!(
            identifier = %identifier,
            "Dropping punch events for employee with no evidence in source document"
        );
        issues.push(format!(
            "dropped punch events for employee '{}' with no evidence in source document",
            identifier
        ));
    }

    kept.sort_by_key(|e| {
        let group = order
            .iter()
            .position(|id| *id == e.employee_identifier)
            .unwrap_or(order.len());
        (group, e.timestamp)
    });

    let (punch_events, duplicates_removed) = if enable_deduplication {
        deduplicate_events(kept)
    } else {
        (kept, 0)
    };

    StitchOutput {
        punch_events,
        issues,
        quality_score: 100.0,
        duplicates_removed,
    }
}

/// Removes events that repeat an earlier event's employee, timestamp and
/// punch type. Returns the survivors and the number removed.
pub fn deduplicate_events(events: Vec<PunchEvent>) -> (Vec<PunchEvent>, usize) {
    let before = events.len();
    let mut seen = HashSet::with_capacity(before);
    let mut kept = Vec::with_capacity(before);

    for event in events {
        let key = (
            event.employee_identifier.clone(),
            event.timestamp,
            event.punch_type.clone(),
        );
        if seen.insert(key) {
            kept.push(event);
        }
    }

    let removed = before - kept.len();
    (kept, removed)
}

/// How closely an actual punch count matches its estimate, in `0.0..=1.0`.
///
/// # Example
///
/// ```
/// use timesheet_ingest::workflow::count_accuracy;
///
/// assert_eq!(count_accuracy(8, 6), 0.75);
/// assert_eq!(count_accuracy(0, 0), 1.0);
/// assert_eq!(count_accuracy(0, 3), 0.0);
/// ```
pub fn count_accuracy(estimate: u32, actual: usize) -> f64 {
    let estimate = estimate as f64;
    let actual = actual as f64;
    let high = estimate.max(actual);
    if high == 0.0 {
        1.0
    } else {
        estimate.min(actual) / high
    }
}

/// `100 * success_rate * (0.8 + 0.2 * mean count accuracy)`, rounded to two
/// decimals. Count accuracy uses each successful outcome's events before
/// deduplication.
fn quality_score(outcomes: &[EmployeeParseOutcome]) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }

    let succeeded: Vec<&EmployeeParseOutcome> =
        outcomes.iter().filter(|o| o.is_success()).collect();
    if succeeded.is_empty() {
        return 0.0;
    }

    let success_rate = succeeded.len() as f64 / outcomes.len() as f64;
    let mean_accuracy = succeeded
        .iter()
        .map(|o| count_accuracy(o.punch_count_estimate, o.punch_events.len()))
        .sum::<f64>()
        / succeeded.len() as f64;

    let score = 100.0 * success_rate * (SUCCESS_WEIGHT + (1.0 - SUCCESS_WEIGHT) * mean_accuracy);
    (score * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParseStatus;
    use chrono::NaiveDateTime;
    use proptest::prelude::*;

    fn make_datetime(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn make_outcome(
        identifier: &str,
        status: ParseStatus,
        estimate: u32,
        times: &[&str],
    ) -> EmployeeParseOutcome {
        EmployeeParseOutcome {
            employee_identifier: identifier.to_string(),
            punch_events: times
                .iter()
                .map(|t| PunchEvent::new(identifier, make_datetime(t), "Clock In"))
                .collect(),
            issues: vec![],
            status,
            attempt_count: 1,
            punch_count_estimate: estimate,
            duration_us: 0,
        }
    }

    #[test]
    fn test_events_follow_outcome_order_then_timestamp() {
        let outcomes = vec![
            make_outcome(
                "Bob",
                ParseStatus::Success,
                2,
                &["2026-01-15 17:00:00", "2026-01-15 09:00:00"],
            ),
            make_outcome("Ann", ParseStatus::Success, 1, &["2026-01-15 08:00:00"]),
        ];

        let output = stitch(&outcomes, &[], true);

        let order: Vec<(&str, String)> = output
            .punch_events
            .iter()
            .map(|e| (e.employee_identifier.as_str(), e.timestamp.format("%H").to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Bob", "09".to_string()),
                ("Bob", "17".to_string()),
                ("Ann", "08".to_string())
            ]
        );
    }

    #[test]
    fn test_exact_duplicates_are_removed_and_counted() {
        let outcomes = vec![make_outcome(
            "Ann",
            ParseStatus::Success,
            3,
            &["2026-01-15 09:00:00", "2026-01-15 09:00:00", "2026-01-15 17:00:00"],
        )];

        let output = stitch(&outcomes, &[], true);
        assert_eq!(output.punch_events.len(), 2);
        assert_eq!(output.duplicates_removed, 1);

        let output = stitch(&outcomes, &[], false);
        assert_eq!(output.punch_events.len(), 3);
        assert_eq!(output.duplicates_removed, 0);
    }

    #[test]
    fn test_same_time_different_punch_type_is_kept() {
        let at = make_datetime("2026-01-15 12:00:00");
        let events = vec![
            PunchEvent::new("Ann", at, "Meal Break Start"),
            PunchEvent::new("Ann", at, "Clock Out"),
        ];

        let (kept, removed) = deduplicate_events(events);
        assert_eq!(kept.len(), 2);
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_failed_outcome_contributes_prefixed_issue_only() {
        let mut failed = make_outcome("Bob", ParseStatus::TimedOut, 4, &[]);
        failed.issues = vec!["extraction timed out after 3 attempt(s) of 60000ms each".to_string()];
        let outcomes = vec![
            make_outcome("Ann", ParseStatus::Success, 1, &["2026-01-15 09:00:00"]),
            failed,
        ];

        let output = stitch(&outcomes, &["merged duplicate employee 'Ann L'".to_string()], true);

        assert_eq!(output.punch_events.len(), 1);
        assert_eq!(
            output.issues,
            vec![
                "merged duplicate employee 'Ann L'".to_string(),
                "[Bob] extraction timed out after 3 attempt(s) of 60000ms each".to_string()
            ]
        );
    }

    #[test]
    fn test_quality_score_half_success_exact_counts() {
        let outcomes = vec![
            make_outcome(
                "Ann",
                ParseStatus::Success,
                2,
                &["2026-01-15 09:00:00", "2026-01-15 17:00:00"],
            ),
            make_outcome("Bob", ParseStatus::Failed, 4, &[]),
        ];

        assert_eq!(stitch(&outcomes, &[], true).quality_score, 50.0);
    }

    #[test]
    fn test_quality_score_penalizes_count_mismatch() {
        let outcomes = vec![make_outcome(
            "Ann",
            ParseStatus::Success,
            4,
            &["2026-01-15 09:00:00", "2026-01-15 17:00:00"],
        )];

        // 100 * 1.0 * (0.8 + 0.2 * 0.5)
        assert_eq!(stitch(&outcomes, &[], true).quality_score, 90.0);
    }

    #[test]
    fn test_quality_score_zero_when_nothing_succeeded() {
        let outcomes = vec![make_outcome("Ann", ParseStatus::TimedOut, 2, &[])];
        assert_eq!(stitch(&outcomes, &[], true).quality_score, 0.0);
    }

    #[test]
    fn test_document_drops_unverified_identifiers() {
        let document = "Employee: Ann Lee\n09:00 IN\n";
        let at = make_datetime("2026-01-15 09:00:00");
        let events = vec![
            PunchEvent::new(" Ann Lee ", at, "Clock In"),
            PunchEvent::new("Ghost", at, "Clock In"),
            PunchEvent::new("Ghost", at, "Clock Out"),
        ];

        let output = stitch_document(document, events, vec![], true);

        assert_eq!(output.punch_events.len(), 1);
        assert_eq!(output.punch_events[0].employee_identifier, "Ann Lee");
        assert_eq!(
            output.issues,
            vec!["dropped punch events for employee 'Ghost' with no evidence in source document"]
        );
    }

    #[test]
    fn test_document_groups_by_first_appearance() {
        let document = "Ann\nBob\n";
        let events = vec![
            PunchEvent::new("Bob", make_datetime("2026-01-15 10:00:00"), "Clock In"),
            PunchEvent::new("Ann", make_datetime("2026-01-15 09:00:00"), "Clock In"),
            PunchEvent::new("Bob", make_datetime("2026-01-15 08:00:00"), "Clock In"),
        ];

        let output = stitch_document(document, events, vec![], true);

        let ids: Vec<&str> = output
            .punch_events
            .iter()
            .map(|e| e.employee_identifier.as_str())
            .collect();
        assert_eq!(ids, vec!["Bob", "Bob", "Ann"]);
        assert_eq!(output.punch_events[0].timestamp, make_datetime("2026-01-15 08:00:00"));
    }

    fn arb_outcome() -> impl Strategy<Value = EmployeeParseOutcome> {
        (
            prop::sample::select(vec!["Ann", "Bob", "Cy"]),
            prop::sample::select(vec![
                ParseStatus::Success,
                ParseStatus::Failed,
                ParseStatus::TimedOut,
            ]),
            0u32..6,
            prop::collection::vec((0i64..4, prop::sample::select(vec!["Clock In", "Clock Out"])), 0..6),
        )
            .prop_map(|(id, status, estimate, punches)| {
                let base = make_datetime("2026-01-15 08:00:00");
                EmployeeParseOutcome {
                    employee_identifier: id.to_string(),
                    punch_events: punches
                        .into_iter()
                        .map(|(h, t)| PunchEvent::new(id, base + chrono::Duration::hours(h), t))
                        .collect(),
                    issues: vec![],
                    status,
                    attempt_count: 1,
                    punch_count_estimate: estimate,
                    duration_us: 0,
                }
            })
    }

    proptest! {
        #[test]
        fn prop_stitching_is_idempotent(outcomes in prop::collection::vec(arb_outcome(), 0..5)) {
            let first = stitch(&outcomes, &[], true);
            let second = stitch(&outcomes, &[], true);
            prop_assert_eq!(&first.punch_events, &second.punch_events);
            prop_assert_eq!(first.quality_score, second.quality_score);

            let (again, removed) = deduplicate_events(first.punch_events.clone());
            prop_assert_eq!(again, first.punch_events);
            prop_assert_eq!(removed, 0);
        }

        #[test]
        fn prop_quality_score_in_range(outcomes in prop::collection::vec(arb_outcome(), 0..5)) {
            let score = stitch(&outcomes, &[], true).quality_score;
            prop_assert!((0.0..=100.0).contains(&score));
        }
    }
}
