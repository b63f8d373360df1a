//! The workflow orchestrator.
//!
//! A run moves through these states:
//!
//! ```text
//! Deciding ──► SinglePassParsing ──► Done
//!    │
//!    ▼
//! Discovering ──► Parsing ──► Stitching ──► Done
//!    │               │
//!    └──► FallingBack ◄┘
//!             │
//!             ▼
//!      SinglePassParsing ──► Done
//! ```
//!
//! Every path ends in a [`WorkflowResult`] carrying one complete metrics
//! record. Errors never escape [`WorkflowOrchestrator::run`].

use std::sync::Arc;

use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capability::{CapabilityError, ExtractionCapability};
use crate::config::WorkflowConfig;
use crate::error::{EngineError, EngineResult, Severity};
use crate::models::{
    EmployeeParseOutcome, ErrorSummary, ParseStatus, PunchEvent, StitchOutput, WorkflowMetrics,
    WorkflowMode, WorkflowResult, WorkflowState,
};

use super::decision::DecisionEngine;
use super::discovery::{DiscoveryOutcome, discover};
use super::parallel::{ParallelParseConfig, parse_all};
use super::stitching::{stitch, stitch_document};

/// Runs the extraction workflow against an extraction capability.
///
/// The orchestrator holds no per-run state, so one instance can serve many
/// concurrent runs.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    capability: Arc<dyn ExtractionCapability>,
}

impl WorkflowOrchestrator {
    /// Creates an orchestrator using the given capability.
    pub fn new(capability: Arc<dyn ExtractionCapability>) -> Self {
        Self { capability }
    }

    /// Extracts the punch events of `document_text`.
    ///
    /// Failures are reported through `workflow_success`, `error` and `issues`
    /// on the returned result.
    pub async fn run(
        &self,
        document_text: &str,
        filename: &str,
        config: &WorkflowConfig,
    ) -> WorkflowResult {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let mut run = Run {
            run_id,
            deadline: config
                .workflow_deadline
                .and_then(|limit| started.checked_add(limit)),
            state: None,
            metrics: WorkflowMetrics::new(run_id, filename, document_text.chars().count()),
        };

        info!(
            run_id = %run_id,
            filename = filename,
            document_chars = run.metrics.document_chars,
            "Starting extraction workflow"
        );

        let conclusion = self.execute(&mut run, document_text, filename, config).await;
        run.enter(WorkflowState::Done);

        let mut metrics = run.metrics;
        metrics.punch_events = conclusion.punch_events.len();
        metrics.workflow_success = conclusion.workflow_success;
        metrics.finalize(started.elapsed());

        if conclusion.workflow_success {
            info!(
                run_id = %run_id,
                mode = ?metrics.mode,
                punch_events = metrics.punch_events,
                issues = conclusion.issues.len(),
                duration_us = metrics.stage_durations.total_us,
                "Extraction workflow completed"
            );
        } else {
            warn!(
                run_id = %run_id,
                mode = ?metrics.mode,
                issues = conclusion.issues.len(),
                duration_us = metrics.stage_durations.total_us,
                "Extraction workflow failed"
            );
        }

        WorkflowResult {
            punch_events: conclusion.punch_events,
            issues: conclusion.issues,
            workflow_success: conclusion.workflow_success,
            mode: metrics.mode,
            error: conclusion.error,
            metrics,
        }
    }

    async fn execute(
        &self,
        run: &mut Run,
        document_text: &str,
        filename: &str,
        config: &WorkflowConfig,
    ) -> Conclusion {
        run.enter(WorkflowState::Deciding);
        let stage = Instant::now();
        let strategy = run.choose_strategy(document_text, filename, config);
        run.metrics.stage_durations.decision_us = Some(micros_since(stage));

        let two_pass = match strategy {
            Ok(two_pass) => two_pass,
            Err(error) => {
                warn!(run_id = %run.run_id, error = %error, "Invalid workflow configuration");
                let issues = vec![error.to_string()];
                return Conclusion::failure(error.summary(), issues);
            }
        };

        if !two_pass {
            run.metrics.mode = WorkflowMode::SinglePass;
            return self
                .single_pass(run, document_text, filename, config, Vec::new())
                .await;
        }

        run.metrics.mode = WorkflowMode::TwoPass;
        match self.two_pass(run, document_text, filename, config).await {
            Ok(conclusion) => conclusion,
            Err(failure) if config.fallback_to_single_pass => {
                run.enter(WorkflowState::FallingBack);
                run.metrics.mode = WorkflowMode::TwoPassFallback;
                warn!(
                    run_id = %run.run_id,
                    error = %failure.error,
                    "Two-pass extraction failed, falling back to single pass"
                );
                let note = format!("two-pass extraction abandoned: {}", failure.error);
                self.single_pass(run, document_text, filename, config, vec![note])
                    .await
            }
            Err(failure) => {
                warn!(
                    run_id = %run.run_id,
                    error = %failure.error,
                    "Two-pass extraction failed and fallback is disabled"
                );
                Conclusion::failure(failure.error.summary(), failure.issues)
            }
        }
    }

    async fn two_pass(
        &self,
        run: &mut Run,
        document_text: &str,
        filename: &str,
        config: &WorkflowConfig,
    ) -> Result<Conclusion, TwoPassFailure> {
        run.enter(WorkflowState::Discovering);
        let stage = Instant::now();
        let discovery = self.discover_before_deadline(run.deadline, document_text, filename).await;
        run.metrics.stage_durations.discovery_us = Some(micros_since(stage));

        let DiscoveryOutcome {
            candidates,
            issues: discovery_issues,
            discovered_count,
        } = discovery.map_err(|error| {
            let issues = match &error {
                EngineError::DiscoveryFailed { issues, .. } => issues.clone(),
                other => vec![other.to_string()],
            };
            TwoPassFailure { error, issues }
        })?;
        run.metrics.employees_discovered = discovered_count;
        run.metrics.employees_validated = candidates.len();

        run.enter(WorkflowState::Parsing);
        let stage = Instant::now();
        let parse_config = ParallelParseConfig::from_workflow(config, run.deadline);
        let parsed = parse_all(
            self.capability.as_ref(),
            document_text,
            filename,
            &candidates,
            &parse_config,
        )
        .await;
        run.metrics.stage_durations.parsing_us = Some(micros_since(stage));

        let outcomes = match parsed {
            Ok(outcomes) => outcomes,
            Err(error) => {
                let mut issues = discovery_issues;
                issues.push(error.to_string());
                return Err(TwoPassFailure { error, issues });
            }
        };
        run.record_outcomes(&outcomes);
        info!(
            run_id = %run.run_id,
            attempted = run.metrics.employees_attempted,
            succeeded = run.metrics.employees_succeeded,
            failed = run.metrics.employees_failed,
            timed_out = run.metrics.employees_timed_out,
            "Per-employee extraction complete"
        );

        if let Err(error) = assess_failure_rate(&outcomes, config.critical_failure_rate) {
            if config.fallback_to_single_pass {
                return Err(TwoPassFailure {
                    error,
                    issues: Vec::new(),
                });
            }
            let output = run.stitch_outcomes(&outcomes, &discovery_issues, config);
            return Ok(Conclusion {
                punch_events: output.punch_events,
                issues: output.issues,
                workflow_success: false,
                error: Some(error.summary()),
            });
        }

        let output = run.stitch_outcomes(&outcomes, &discovery_issues, config);
        match check_partial_success(&outcomes, output) {
            Ok(output) => Ok(Conclusion::success(output)),
            Err(error) => {
                let summary = error.summary();
                warn!(run_id = %run.run_id, error = %error, "Returning partial result");
                Ok(match error.into_partial_result() {
                    Some(output) => Conclusion {
                        error: Some(summary),
                        ..Conclusion::success(output)
                    },
                    None => Conclusion::failure(summary, Vec::new()),
                })
            }
        }
    }

    async fn single_pass(
        &self,
        run: &mut Run,
        document_text: &str,
        filename: &str,
        config: &WorkflowConfig,
        mut issues: Vec<String>,
    ) -> Conclusion {
        run.enter(WorkflowState::SinglePassParsing);
        let stage = Instant::now();
        let extracted = self
            .extract_document_before_deadline(run.deadline, document_text, filename)
            .await;
        run.metrics.stage_durations.single_pass_us = Some(micros_since(stage));

        match extracted {
            Ok((events, payload_issues)) => {
                issues.extend(payload_issues);
                let output =
                    stitch_document(document_text, events, issues, config.enable_deduplication);
                run.metrics.success_rate = 1.0;
                run.metrics.quality_score = Some(output.quality_score);
                run.metrics.duplicates_removed = output.duplicates_removed;
                info!(
                    run_id = %run.run_id,
                    punch_events = output.punch_events.len(),
                    "Whole-document extraction complete"
                );
                Conclusion::success(output)
            }
            Err(error) => {
                warn!(run_id = %run.run_id, error = %error, "Whole-document extraction failed");
                run.metrics.success_rate = 0.0;
                issues.push(error.to_string());
                Conclusion::failure(error.summary(), issues)
            }
        }
    }

    async fn discover_before_deadline(
        &self,
        deadline: Option<Instant>,
        document_text: &str,
        filename: &str,
    ) -> EngineResult<DiscoveryOutcome> {
        let request = discover(self.capability.as_ref(), document_text, filename);
        let Some(deadline) = deadline else {
            return request.await;
        };
        timeout_at(deadline, request)
            .await
            .unwrap_or_else(|_| {
                Err(EngineError::DiscoveryFailed {
                    filename: filename.to_string(),
                    document_size: document_text.chars().count(),
                    issues: vec!["workflow deadline exceeded during discovery".to_string()],
                })
            })
    }

    async fn extract_document_before_deadline(
        &self,
        deadline: Option<Instant>,
        document_text: &str,
        filename: &str,
    ) -> EngineResult<(Vec<PunchEvent>, Vec<String>)> {
        let request = self.capability.extract_document(document_text, filename);
        let response = match deadline {
            Some(deadline) => timeout_at(deadline, request).await.map_err(|_| {
                EngineError::SinglePassFailed {
                    message: "workflow deadline exceeded before extraction completed".to_string(),
                }
            })?,
            None => request.await,
        };

        let payload = response.map_err(single_pass_error)?;
        payload.validate().map_err(single_pass_error)?;
        Ok(payload.into_events())
    }
}

/// Checks the per-employee failure rate against the critical threshold.
///
/// A stage where nobody succeeded is always critical.
///
/// # Errors
///
/// Returns `EmployeeParsing` when the rate of failed and timed-out employees
/// is strictly greater than `critical_failure_rate`.
pub fn assess_failure_rate(
    outcomes: &[EmployeeParseOutcome],
    critical_failure_rate: f64,
) -> EngineResult<()> {
    if outcomes.is_empty() {
        return Ok(());
    }

    let (succeeded, failed) = split_by_success(outcomes);
    let rate = failed.len() as f64 / outcomes.len() as f64;
    if succeeded.is_empty() || rate > critical_failure_rate {
        return Err(EngineError::EmployeeParsing {
            severity: Severity::from_failure_rate(rate),
            failed,
            succeeded,
        });
    }
    Ok(())
}

/// Wraps a stitched result in `PartialSuccess` if any employee failed.
pub fn check_partial_success(
    outcomes: &[EmployeeParseOutcome],
    output: StitchOutput,
) -> EngineResult<StitchOutput> {
    let (succeeded, failed) = split_by_success(outcomes);
    if failed.is_empty() {
        return Ok(output);
    }
    Err(EngineError::PartialSuccess {
        succeeded,
        failed,
        partial: Box::new(output),
    })
}

fn split_by_success(outcomes: &[EmployeeParseOutcome]) -> (Vec<String>, Vec<String>) {
    let (succeeded, failed): (Vec<_>, Vec<_>) = outcomes.iter().partition(|o| o.is_success());
    let identifiers = |group: Vec<&EmployeeParseOutcome>| {
        group
            .into_iter()
            .map(|o| o.employee_identifier.clone())
            .collect::<Vec<_>>()
    };
    (identifiers(succeeded), identifiers(failed))
}

fn single_pass_error(error: CapabilityError) -> EngineError {
    if error.is_infrastructure() {
        EngineError::CapabilityUnavailable {
            stage: "single_pass".to_string(),
            message: error.to_string(),
        }
    } else {
        EngineError::SinglePassFailed {
            message: error.to_string(),
        }
    }
}

fn micros_since(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

/// Mutable state of one run.
struct Run {
    run_id: Uuid,
    deadline: Option<Instant>,
    state: Option<WorkflowState>,
    metrics: WorkflowMetrics,
}

impl Run {
    fn enter(&mut self, next: WorkflowState) {
        debug!(
            run_id = %self.run_id,
            from = ?self.state,
            to = ?next,
            "Workflow state transition"
        );
        self.state = Some(next);
        self.metrics.transitions.push(next);
    }

    /// Returns true for two-pass processing.
    fn choose_strategy(
        &mut self,
        document_text: &str,
        filename: &str,
        config: &WorkflowConfig,
    ) -> EngineResult<bool> {
        config.validate()?;

        if config.force_two_pass {
            self.metrics.forced_two_pass = true;
            info!(run_id = %self.run_id, "Two-pass processing forced, skipping decision engine");
            return Ok(true);
        }

        let decision = DecisionEngine::new(&config.decision)?.decide(document_text, filename);
        let two_pass = config.enable_two_pass && decision.should_use_two_pass;
        info!(
            run_id = %self.run_id,
            complexity_score = decision.complexity_score,
            recommended_two_pass = decision.should_use_two_pass,
            two_pass_enabled = config.enable_two_pass,
            reason = %decision.reason,
            "Processing strategy decided"
        );
        self.metrics.decision = Some(decision);
        Ok(two_pass)
    }

    fn record_outcomes(&mut self, outcomes: &[EmployeeParseOutcome]) {
        let count = |status: ParseStatus| outcomes.iter().filter(|o| o.status == status).count();

        let metrics = &mut self.metrics;
        metrics.employees_attempted = outcomes.len();
        metrics.employees_succeeded = count(ParseStatus::Success);
        metrics.employees_failed = count(ParseStatus::Failed);
        metrics.employees_timed_out = count(ParseStatus::TimedOut);
        metrics.total_attempts = outcomes.iter().map(|o| o.attempt_count).sum();
        metrics.success_rate = if outcomes.is_empty() {
            0.0
        } else {
            metrics.employees_succeeded as f64 / outcomes.len() as f64
        };
    }

    fn stitch_outcomes(
        &mut self,
        outcomes: &[EmployeeParseOutcome],
        discovery_issues: &[String],
        config: &WorkflowConfig,
    ) -> StitchOutput {
        self.enter(WorkflowState::Stitching);
        let stage = Instant::now();
        let output = stitch(outcomes, discovery_issues, config.enable_deduplication);
        self.metrics.stage_durations.stitching_us = Some(micros_since(stage));
        self.metrics.duplicates_removed = output.duplicates_removed;
        self.metrics.quality_score = Some(output.quality_score);

        info!(
            run_id = %self.run_id,
            punch_events = output.punch_events.len(),
            duplicates_removed = output.duplicates_removed,
            quality_score = output.quality_score,
            "Stitching complete"
        );
        output
    }
}

/// A two-pass failure the caller may recover from by falling back.
struct TwoPassFailure {
    error: EngineError,
    /// Issues to report if there is no fallback.
    issues: Vec<String>,
}

struct Conclusion {
    punch_events: Vec<PunchEvent>,
    issues: Vec<String>,
    workflow_success: bool,
    error: Option<ErrorSummary>,
}

impl Conclusion {
    fn success(output: StitchOutput) -> Self {
        Self {
            punch_events: output.punch_events,
            issues: output.issues,
            workflow_success: true,
            error: None,
        }
    }

    fn failure(error: ErrorSummary, issues: Vec<String>) -> Self {
        Self {
            punch_events: Vec::new(),
            issues,
            workflow_success: false,
            error: Some(error),
        }
    }
}
