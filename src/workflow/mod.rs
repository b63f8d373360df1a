//! The extraction workflow.
//!
//! This module contains the stages of a run: the decision engine that picks
//! single-pass or two-pass processing, employee discovery, per-employee
//! extraction in concurrent batches, stitching, and the orchestrator that
//! drives them and falls back to a whole-document extraction when two-pass
//! processing fails.

mod decision;
mod discovery;
mod excerpt;
mod orchestrator;
mod parallel;
mod stitching;

pub use decision::{DecisionEngine, HeaderScan, MAX_COMPLEXITY_SCORE};
pub use discovery::{DiscoveryOutcome, deduplicate_candidates, discover, validate_candidates};
pub use excerpt::excerpt_for_employee;
pub use orchestrator::{WorkflowOrchestrator, assess_failure_rate, check_partial_success};
pub use parallel::{ParallelParseConfig, parse_all};
pub use stitching::{count_accuracy, deduplicate_events, stitch, stitch_document};
