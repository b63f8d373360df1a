//! Decision result model.

use serde::{Deserialize, Serialize};

/// The single-pass vs two-pass recommendation for one document.
///
/// # Example
///
/// ```
/// use timesheet_ingest::models::DecisionResult;
///
/// let decision = DecisionResult {
///     complexity_score: 7,
///     should_use_two_pass: true,
///     reason: "large document (120000 chars)".to_string(),
///     estimated_employee_count: 12,
/// };
/// assert!(decision.should_use_two_pass);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionResult {
    /// Heuristic complexity score in `0..=10`.
    pub complexity_score: u8,
    /// Whether the score reached the configured two-pass threshold.
    pub should_use_two_pass: bool,
    /// Human-readable explanation naming the signals that fired.
    pub reason: String,
    /// Number of distinct employee headers found in the text.
    pub estimated_employee_count: u32,
}
