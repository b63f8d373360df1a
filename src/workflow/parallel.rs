//! Per-employee extraction in bounded concurrent batches.
//!
//! Candidates are split into fixed-size batches. All requests in a batch run
//! concurrently and batches run one after another, so `batch_size` bounds the
//! number of in-flight requests to the capability. Every candidate produces
//! exactly one [`EmployeeParseOutcome`], in candidate order, no matter which
//! request finishes first.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::capability::{CapabilityError, ExtractionCapability};
use crate::config::WorkflowConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{EmployeeCandidate, EmployeeParseOutcome, ParseStatus, PunchEvent};

use super::discovery::identifiers_match;
use super::excerpt::excerpt_for_employee;

/// Upper bound on the backoff doubling, so large retry counts cannot overflow.
const MAX_BACKOFF_DOUBLINGS: u32 = 10;

/// Settings for the per-employee stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelParseConfig {
    /// Maximum concurrent requests.
    pub batch_size: usize,
    /// Time limit for each attempt.
    pub timeout_per_employee: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay before a retry.
    pub retry_backoff: Duration,
    /// Drop, rather than re-attribute, events naming another employee.
    pub strict_validation: bool,
    /// Send each employee only its excerpt of the document.
    pub slice_document: bool,
    /// Point in time after which pending work is abandoned.
    pub deadline: Option<Instant>,
}

impl ParallelParseConfig {
    /// Takes the stage settings from a workflow configuration.
    pub fn from_workflow(config: &WorkflowConfig, deadline: Option<Instant>) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            timeout_per_employee: config.timeout_per_employee,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
            strict_validation: config.strict_validation,
            slice_document: config.slice_document,
            deadline,
        }
    }
}

enum AttemptError {
    TimedOut,
    Capability(CapabilityError),
}

struct TaskResult {
    outcome: EmployeeParseOutcome,
    unreachable: Option<String>,
}

/// Extracts every candidate's punch events.
///
/// Per-employee failures are recorded on the outcomes and never returned as
/// errors. The stage only fails, with `CapabilityUnavailable`, when every
/// request in a batch ended because the capability could not be reached.
pub async fn parse_all(
    capability: &dyn ExtractionCapability,
    document_text: &str,
    filename: &str,
    candidates: &[EmployeeCandidate],
    config: &ParallelParseConfig,
) -> EngineResult<Vec<EmployeeParseOutcome>> {
    let identifiers: Vec<&str> = candidates.iter().map(|c| c.identifier.as_str()).collect();
    let batch_size = config.batch_size.max(1);
    let batch_count = candidates.len().div_ceil(batch_size);
    let mut outcomes = Vec::with_capacity(candidates.len());

    for (batch_index, batch) in candidates.chunks(batch_size).enumerate() {
        if config.deadline.is_some_and(|d| Instant::now() >= d) {
            warn!(
                batch = batch_index + 1,
                skipped = batch.len(),
                "Workflow deadline passed, skipping batch"
            );
            outcomes.extend(batch.iter().map(|c| deadline_outcome(c, 0, Duration::ZERO)));
            continue;
        }

        info!(
            batch = batch_index + 1,
            batches = batch_count,
            employees = batch.len(),
            "Dispatching extraction batch"
        );

        let tasks = batch.iter().map(|candidate| {
            parse_employee(
                capability,
                document_text,
                filename,
                candidate,
                &identifiers,
                config,
            )
        });
        let results = join_all(tasks).await;

        if results.iter().all(|r| r.unreachable.is_some()) {
            let message = results
                .iter()
                .find_map(|r| r.unreachable.clone())
                .unwrap_or_default();
            return Err(EngineError::CapabilityUnavailable {
                stage: "parsing".to_string(),
                message,
            });
        }

        outcomes.extend(results.into_iter().map(|r| r.outcome));
    }

    Ok(outcomes)
}

async fn parse_employee(
    capability: &dyn ExtractionCapability,
    document_text: &str,
    filename: &str,
    candidate: &EmployeeCandidate,
    identifiers: &[&str],
    config: &ParallelParseConfig,
) -> TaskResult {
    let started = Instant::now();
    let attempts = AtomicU32::new(0);
    let text = if config.slice_document {
        excerpt_for_employee(document_text, &candidate.identifier, identifiers)
    } else {
        document_text.into()
    };

    let work = attempt_with_retries(capability, &text, filename, candidate, config, &attempts);
    let result = match config.deadline {
        Some(deadline) => match timeout_at(deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    employee = %candidate.identifier,
                    "Workflow deadline exceeded during extraction"
                );
                return TaskResult {
                    outcome: deadline_outcome(
                        candidate,
                        attempts.load(Ordering::Relaxed),
                        started.elapsed(),
                    ),
                    unreachable: None,
                };
            }
        },
        None => work.await,
    };

    let attempt_count = attempts.load(Ordering::Relaxed);
    let duration_us = started.elapsed().as_micros() as u64;

    match result {
        Ok(payload) => {
            let (events, mut issues) = payload.into_events();
            let (punch_events, attribution_issues) =
                attribute_events(candidate, events, config.strict_validation);
            issues.extend(attribution_issues);

            debug!(
                employee = %candidate.identifier,
                punches = punch_events.len(),
                attempts = attempt_count,
                "Employee extraction succeeded"
            );

            TaskResult {
                outcome: EmployeeParseOutcome {
                    employee_identifier: candidate.identifier.clone(),
                    punch_events,
                    issues,
                    status: ParseStatus::Success,
                    attempt_count,
                    punch_count_estimate: candidate.punch_count_estimate,
                    duration_us,
                },
                unreachable: None,
            }
        }
        Err(AttemptError::TimedOut) => TaskResult {
            outcome: EmployeeParseOutcome {
                employee_identifier: candidate.identifier.clone(),
                punch_events: Vec::new(),
                issues: vec![format!(
                    "extraction timed out after {} attempt(s) of {}ms each",
                    attempt_count,
                    config.timeout_per_employee.as_millis()
                )],
                status: ParseStatus::TimedOut,
                attempt_count,
                punch_count_estimate: candidate.punch_count_estimate,
                duration_us,
            },
            unreachable: None,
        },
        Err(AttemptError::Capability(error)) => TaskResult {
            outcome: EmployeeParseOutcome {
                employee_identifier: candidate.identifier.clone(),
                punch_events: Vec::new(),
                issues: vec![format!(
                    "extraction failed after {} attempt(s): {}",
                    attempt_count, error
                )],
                status: ParseStatus::Failed,
                attempt_count,
                punch_count_estimate: candidate.punch_count_estimate,
                duration_us,
            },
            unreachable: error.is_infrastructure().then(|| error.to_string()),
        },
    }
}

async fn attempt_with_retries(
    capability: &dyn ExtractionCapability,
    text: &str,
    filename: &str,
    candidate: &EmployeeCandidate,
    config: &ParallelParseConfig,
    attempts: &AtomicU32,
) -> Result<crate::capability::ExtractionPayload, AttemptError> {
    let mut last_error = AttemptError::TimedOut;

    for retry in 0..=config.max_retries {
        if retry > 0 {
            let delay = backoff_delay(config.retry_backoff, retry);
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
        let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;

        let request = capability.extract_for_employee(
            text,
            &candidate.identifier,
            filename,
            candidate.punch_count_estimate,
        );
        let error = match timeout(config.timeout_per_employee, request).await {
            Ok(Ok(payload)) => match payload.validate() {
                Ok(()) => return Ok(payload),
                Err(e) => AttemptError::Capability(e),
            },
            Ok(Err(e)) => AttemptError::Capability(e),
            Err(_) => AttemptError::TimedOut,
        };

        let fatal = matches!(&error, AttemptError::Capability(e) if !e.is_retryable());
        if fatal {
            warn!(
                employee = %candidate.identifier,
                attempt = attempt,
                "Non-retryable extraction error, giving up"
            );
            return Err(error);
        }

        match &error {
            AttemptError::Capability(e) => warn!(
                employee = %candidate.identifier,
                attempt = attempt,
                error = %e,
                "Extraction attempt failed"
            ),
            AttemptError::TimedOut => warn!(
                employee = %candidate.identifier,
                attempt = attempt,
                timeout_ms = config.timeout_per_employee.as_millis() as u64,
                "Extraction attempt timed out"
            ),
        }
        last_error = error;
    }

    Err(last_error)
}

/// Delay before retry number `retry` (1-based): the base doubled per retry,
/// plus up to half of that again as jitter.
fn backoff_delay(base: Duration, retry: u32) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    let doublings = retry.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
    let delay = base.saturating_mul(1u32 << doublings);
    let jitter_cap = (delay.as_millis() / 2) as u64;
    let jitter = if jitter_cap == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_cap)
    };
    delay.saturating_add(Duration::from_millis(jitter))
}

/// Makes every event carry the candidate's identifier.
///
/// Events naming the candidate in another form are re-attributed silently.
/// Events naming someone else are dropped in strict mode and re-attributed
/// with an issue otherwise.
fn attribute_events(
    candidate: &EmployeeCandidate,
    events: Vec<PunchEvent>,
    strict: bool,
) -> (Vec<PunchEvent>, Vec<String>) {
    let mut kept = Vec::with_capacity(events.len());
    let mut foreign = 0usize;

    for mut event in events {
        if event.employee_identifier == candidate.identifier
            || identifiers_match(&event.employee_identifier, &candidate.identifier)
        {
            event.employee_identifier = candidate.identifier.clone();
            kept.push(event);
        } else {
            foreign += 1;
            if !strict {
                event.employee_identifier = candidate.identifier.clone();
                kept.push(event);
            }
        }
    }

    let mut issues = Vec::new();
    if foreign > 0 {
        let action = if strict { "dropped" } else { "re-attributed" };
        issues.push(format!(
            "{} {} punch event(s) attributed to a different employee",
            action, foreign
        ));
    }
    (kept, issues)
}

fn deadline_outcome(
    candidate: &EmployeeCandidate,
    attempt_count: u32,
    elapsed: Duration,
) -> EmployeeParseOutcome {
    EmployeeParseOutcome {
        employee_identifier: candidate.identifier.clone(),
        punch_events: Vec::new(),
        issues: vec!["workflow deadline exceeded before extraction completed".to_string()],
        status: ParseStatus::TimedOut,
        attempt_count,
        punch_count_estimate: candidate.punch_count_estimate,
        duration_us: elapsed.as_micros() as u64,
    }
}
