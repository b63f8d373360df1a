//! Workflow result and metrics models.
//!
//! This module contains the [`WorkflowResult`] returned from every run, along
//! with the [`WorkflowMetrics`] record that describes how the run went.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Severity;

use super::{DecisionResult, PunchEvent};

/// How the final punch events were produced.
///
/// # Example
///
/// ```
/// use timesheet_ingest::models::WorkflowMode;
///
/// let json = serde_json::to_string(&WorkflowMode::TwoPassFallback).unwrap();
/// assert_eq!(json, "\"two_pass_fallback\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    /// One whole-document extraction call.
    SinglePass,
    /// Discovery followed by per-employee extraction and stitching.
    TwoPass,
    /// Two-pass failed and a whole-document call was used instead.
    TwoPassFallback,
}

/// States of the orchestrator, recorded in order as the run moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Scoring the document.
    Deciding,
    /// Enumerating employees.
    Discovering,
    /// Extracting per employee.
    Parsing,
    /// Merging per-employee results.
    Stitching,
    /// Two-pass failed, switching to a whole-document call.
    FallingBack,
    /// Running the whole-document call.
    SinglePassParsing,
    /// Terminal state.
    Done,
}

/// Category of a caller-visible failure or partial result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid workflow configuration.
    Config,
    /// Discovery failed or found no verifiable employees.
    Discovery,
    /// Too many employees failed to extract.
    EmployeeParsing,
    /// Some employees failed, but below the critical rate.
    PartialSuccess,
    /// The extraction capability could not be reached.
    CapabilityUnavailable,
    /// The whole-document extraction call failed.
    SinglePass,
}

/// Serializable summary of the error that ended (or qualified) a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// The error category.
    pub kind: ErrorKind,
    /// The error message, unmodified from the underlying error.
    pub message: String,
    /// Failure-rate severity, for employee parsing errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// Wall-clock time spent in each stage, in microseconds.
///
/// Stages that did not run are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDurations {
    /// Decision engine.
    pub decision_us: Option<u64>,
    /// Discovery request plus validation.
    pub discovery_us: Option<u64>,
    /// Per-employee extraction.
    pub parsing_us: Option<u64>,
    /// Stitching.
    pub stitching_us: Option<u64>,
    /// Whole-document extraction (single-pass or fallback).
    pub single_pass_us: Option<u64>,
    /// The whole run.
    pub total_us: u64,
}

/// Performance and quality record emitted once per run, on every path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    /// Correlation id for this run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// The source document's filename.
    pub filename: String,
    /// Size of the source document in characters.
    pub document_chars: usize,
    /// The mode the run ended in.
    pub mode: WorkflowMode,
    /// The decision used, if the decision engine ran.
    pub decision: Option<DecisionResult>,
    /// True if the caller forced two-pass processing.
    pub forced_two_pass: bool,
    /// Per-stage timings.
    pub stage_durations: StageDurations,
    /// States visited, in order.
    pub transitions: Vec<WorkflowState>,
    /// Candidates returned by the discovery request.
    pub employees_discovered: usize,
    /// Candidates left after validation and deduplication.
    pub employees_validated: usize,
    /// Per-employee tasks dispatched (or marked timed out by the deadline).
    pub employees_attempted: usize,
    /// Tasks that finished with `Success`.
    pub employees_succeeded: usize,
    /// Tasks that finished with `Failed`.
    pub employees_failed: usize,
    /// Tasks that finished with `TimedOut`.
    pub employees_timed_out: usize,
    /// Total extraction requests issued across all employees.
    pub total_attempts: u32,
    /// Exact duplicate punch events removed while stitching.
    pub duplicates_removed: usize,
    /// Punch events in the final result.
    pub punch_events: usize,
    /// Fraction of attempted work that succeeded, in `0.0..=1.0`.
    pub success_rate: f64,
    /// Stitching quality score, for two-pass results.
    pub quality_score: Option<f64>,
    /// Attempted employees per second of total run time.
    pub employees_per_second: f64,
    /// Final punch events per second of total run time.
    pub punches_per_second: f64,
    /// Mirrors [`WorkflowResult::workflow_success`].
    pub workflow_success: bool,
}

impl WorkflowMetrics {
    /// Creates an empty metrics record for a run that is about to start.
    pub fn new(run_id: Uuid, filename: impl Into<String>, document_chars: usize) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            filename: filename.into(),
            document_chars,
            mode: WorkflowMode::SinglePass,
            decision: None,
            forced_two_pass: false,
            stage_durations: StageDurations::default(),
            transitions: Vec::new(),
            employees_discovered: 0,
            employees_validated: 0,
            employees_attempted: 0,
            employees_succeeded: 0,
            employees_failed: 0,
            employees_timed_out: 0,
            total_attempts: 0,
            duplicates_removed: 0,
            punch_events: 0,
            success_rate: 0.0,
            quality_score: None,
            employees_per_second: 0.0,
            punches_per_second: 0.0,
            workflow_success: false,
        }
    }

    /// Records the total run time and derives the throughput figures from it.
    pub fn finalize(&mut self, total: Duration) {
        self.stage_durations.total_us = total.as_micros() as u64;

        let seconds = total.as_secs_f64();
        if seconds > 0.0 {
            self.employees_per_second = self.employees_attempted as f64 / seconds;
            self.punches_per_second = self.punch_events as f64 / seconds;
        } else {
            self.employees_per_second = 0.0;
            self.punches_per_second = 0.0;
        }
    }
}

/// The terminal artifact returned by every workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// The final punch events.
    pub punch_events: Vec<PunchEvent>,
    /// Issues collected along the way.
    pub issues: Vec<String>,
    /// False if the run could not produce a trustworthy result.
    pub workflow_success: bool,
    /// How the punch events were produced.
    pub mode: WorkflowMode,
    /// The error that ended the run, or the partial-success qualifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
    /// Performance and quality record for this run.
    pub metrics: WorkflowMetrics,
}
