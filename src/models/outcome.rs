//! Per-employee parse outcomes and the stitched result built from them.

use serde::{Deserialize, Serialize};

use super::PunchEvent;

/// Terminal status of one per-employee extraction task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// The extraction request returned a usable payload.
    Success,
    /// Every attempt failed with a non-timeout error, or a non-retryable error occurred.
    Failed,
    /// The final attempt ran out of time (per-employee timeout or workflow deadline).
    TimedOut,
}

/// The result of extracting punch events for a single employee.
///
/// Exactly one outcome exists per dispatched candidate, whatever happened to
/// the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeParseOutcome {
    /// The validated candidate identifier this outcome belongs to.
    pub employee_identifier: String,
    /// Punch events extracted for the employee (empty unless `Success`).
    pub punch_events: Vec<PunchEvent>,
    /// Problems encountered while extracting this employee.
    pub issues: Vec<String>,
    /// Terminal status of the task.
    pub status: ParseStatus,
    /// Number of requests issued, including the first.
    pub attempt_count: u32,
    /// The discovery-time punch estimate, carried for quality scoring.
    pub punch_count_estimate: u32,
    /// Wall-clock time spent on this employee in microseconds.
    pub duration_us: u64,
}

impl EmployeeParseOutcome {
    /// Returns true if the task succeeded.
    pub fn is_success(&self) -> bool {
        self.status == ParseStatus::Success
    }
}

/// The merged dataset produced by stitching per-employee outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchOutput {
    /// Deduplicated punch events in discovery order, then timestamp order.
    pub punch_events: Vec<PunchEvent>,
    /// Issues from every outcome, prefixed with the employee identifier.
    pub issues: Vec<String>,
    /// Completeness score in `0.0..=100.0`.
    pub quality_score: f64,
    /// Number of exact duplicate events removed.
    pub duplicates_removed: usize,
}
