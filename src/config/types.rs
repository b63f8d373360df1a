//! Configuration types for the ingestion workflow.
//!
//! This module contains the strongly-typed configuration structures that are
//! deserialized from YAML configuration files or built directly by callers.
//! Durations are written in YAML as (fractional) seconds.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Default pattern for lines that introduce an employee block.
///
/// Capture group 1 is the value after the marker (usually the name or ID).
pub const DEFAULT_HEADER_MARKER_PATTERN: &str = r"(?im)^[ \t]*(?:employee(?:[ \t]+(?:name|id))?|name|associate|staff(?:[ \t]+member)?|team[ \t]+member|worker)[ \t]*[:#][ \t]*(\S[^\r\n]*?)[ \t\r]*$";

/// Cutoffs and thresholds for the decision engine.
///
/// Only the cutoffs live here; the number of points each signal contributes
/// is fixed by the decision engine so the relative weight of the signals
/// stays the same whatever the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Minimum score at which two-pass processing is recommended (0-10).
    pub two_pass_threshold: u8,
    /// Documents at or above this many characters are medium sized.
    pub medium_document_chars: usize,
    /// Documents at or above this many characters are large.
    pub large_document_chars: usize,
    /// Documents at or above this many characters are very large.
    pub very_large_document_chars: usize,
    /// Header marker count that earns the first marker point.
    pub marker_count_low: u32,
    /// Header marker count that earns the second marker point.
    pub marker_count_high: u32,
    /// Estimated employee count that earns the first employee point.
    pub employee_count_low: u32,
    /// Estimated employee count that earns the second employee point.
    pub employee_count_high: u32,
    /// File extensions (without the dot) treated as tabular exports.
    pub tabular_extensions: Vec<String>,
    /// Regex matching employee header lines; group 1 is the employee value.
    pub header_marker_pattern: String,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            two_pass_threshold: 4,
            medium_document_chars: 10_000,
            large_document_chars: 50_000,
            very_large_document_chars: 150_000,
            marker_count_low: 3,
            marker_count_high: 10,
            employee_count_low: 3,
            employee_count_high: 6,
            tabular_extensions: vec![
                "csv".to_string(),
                "tsv".to_string(),
                "xls".to_string(),
                "xlsx".to_string(),
            ],
            header_marker_pattern: DEFAULT_HEADER_MARKER_PATTERN.to_string(),
        }
    }
}

impl DecisionConfig {
    /// Checks that thresholds are in range and cutoffs are ordered.
    pub fn validate(&self) -> EngineResult<()> {
        if self.two_pass_threshold > 10 {
            return Err(invalid(
                "decision.two_pass_threshold",
                "must be between 0 and 10",
            ));
        }
        if !(self.medium_document_chars < self.large_document_chars
            && self.large_document_chars < self.very_large_document_chars)
        {
            return Err(invalid(
                "decision.medium_document_chars",
                "size bands must be strictly increasing (medium < large < very_large)",
            ));
        }
        if self.marker_count_low > self.marker_count_high {
            return Err(invalid(
                "decision.marker_count_low",
                "must not exceed decision.marker_count_high",
            ));
        }
        if self.employee_count_low > self.employee_count_high {
            return Err(invalid(
                "decision.employee_count_low",
                "must not exceed decision.employee_count_high",
            ));
        }
        Regex::new(&self.header_marker_pattern)
            .map_err(|e| invalid("decision.header_marker_pattern", &e.to_string()))?;
        Ok(())
    }
}

/// Options recognized by a workflow run.
///
/// # Example
///
/// ```
/// use timesheet_ingest::config::WorkflowConfig;
/// use std::time::Duration;
///
/// let config = WorkflowConfig {
///     force_two_pass: true,
///     batch_size: 5,
///     timeout_per_employee: Duration::from_secs(30),
///     ..WorkflowConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Allow the decision engine to pick two-pass processing.
    pub enable_two_pass: bool,
    /// Skip the decision engine and always run discovery.
    pub force_two_pass: bool,
    /// Maximum number of concurrent per-employee requests.
    pub batch_size: usize,
    /// Time limit for each per-employee request attempt.
    #[serde(with = "seconds")]
    pub timeout_per_employee: Duration,
    /// Retries after the first attempt for a failed per-employee request.
    pub max_retries: u32,
    /// Remove exact duplicate punch events while stitching.
    pub enable_deduplication: bool,
    /// Drop, rather than re-attribute, events that name a different employee.
    pub strict_validation: bool,
    /// Run a whole-document extraction if two-pass processing fails.
    pub fallback_to_single_pass: bool,
    /// Overall time limit for a run, measured from its start.
    #[serde(with = "optional_seconds")]
    pub workflow_deadline: Option<Duration>,
    /// Base delay before a retry; doubled per attempt and jittered.
    #[serde(with = "seconds")]
    pub retry_backoff: Duration,
    /// Failure rate above which per-employee parsing counts as failed.
    pub critical_failure_rate: f64,
    /// Send each employee only the lines of the document that concern them.
    pub slice_document: bool,
    /// Decision engine cutoffs.
    pub decision: DecisionConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            enable_two_pass: true,
            force_two_pass: false,
            batch_size: 10,
            timeout_per_employee: Duration::from_secs(60),
            max_retries: 2,
            enable_deduplication: true,
            strict_validation: true,
            fallback_to_single_pass: true,
            workflow_deadline: None,
            retry_backoff: Duration::from_millis(500),
            critical_failure_rate: 0.5,
            slice_document: true,
            decision: DecisionConfig::default(),
        }
    }
}

impl WorkflowConfig {
    /// Checks every option for range and consistency problems.
    pub fn validate(&self) -> EngineResult<()> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be greater than zero"));
        }
        if self.timeout_per_employee.is_zero() {
            return Err(invalid("timeout_per_employee", "must be greater than zero"));
        }
        if self.workflow_deadline.is_some_and(|d| d.is_zero()) {
            return Err(invalid("workflow_deadline", "must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.critical_failure_rate) {
            return Err(invalid(
                "critical_failure_rate",
                "must be between 0.0 and 1.0",
            ));
        }
        self.decision.validate()
    }
}

fn invalid(field: &str, message: &str) -> EngineError {
    EngineError::InvalidConfig {
        field: field.to_string(),
        message: message.to_string(),
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

mod optional_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(WorkflowConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let config = WorkflowConfig {
            batch_size: 0,
            ..WorkflowConfig::default()
        };

        match config.validate() {
            Err(EngineError::InvalidConfig { field, .. }) => assert_eq!(field, "batch_size"),
            other => panic!("Expected InvalidConfig error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = WorkflowConfig {
            timeout_per_employee: Duration::ZERO,
            ..WorkflowConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_failure_rate_out_of_range_is_rejected() {
        let config = WorkflowConfig {
            critical_failure_rate: 1.5,
            ..WorkflowConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unordered_size_bands_are_rejected() {
        let mut config = WorkflowConfig::default();
        config.decision.large_document_chars = config.decision.medium_document_chars;

        match config.validate() {
            Err(EngineError::InvalidConfig { field, .. }) => {
                assert_eq!(field, "decision.medium_document_chars")
            }
            other => panic!("Expected InvalidConfig error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_header_pattern_is_rejected() {
        let mut config = WorkflowConfig::default();
        config.decision.header_marker_pattern = "(unclosed".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_above_ten_is_rejected() {
        let mut config = WorkflowConfig::default();
        config.decision.two_pass_threshold = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations_deserialize_from_seconds() {
        let yaml = "timeout_per_employee: 1.5\nworkflow_deadline: 120\nretry_backoff: 0";
        let config: WorkflowConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.timeout_per_employee, Duration::from_millis(1500));
        assert_eq!(config.workflow_deadline, Some(Duration::from_secs(120)));
        assert_eq!(config.retry_backoff, Duration::ZERO);
        // Unspecified fields keep their defaults
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn test_negative_duration_fails_to_deserialize() {
        let yaml = "timeout_per_employee: -1";
        assert!(serde_yaml::from_str::<WorkflowConfig>(yaml).is_err());
    }
}
