//! Core data models for timesheet ingestion.
//!
//! This module contains the domain models shared by every workflow stage.

mod candidate;
mod decision;
mod outcome;
mod punch_event;
mod workflow_result;

pub use candidate::EmployeeCandidate;
pub use decision::DecisionResult;
pub use outcome::{EmployeeParseOutcome, ParseStatus, StitchOutput};
pub use punch_event::PunchEvent;
pub use workflow_result::{
    ErrorKind, ErrorSummary, StageDurations, WorkflowMetrics, WorkflowMode, WorkflowResult,
    WorkflowState,
};
