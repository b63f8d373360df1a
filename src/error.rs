//! Error types for timesheet ingestion.
//!
//! This module provides strongly-typed errors using the `thiserror` crate for
//! configuration problems and for the stage-level failures the workflow
//! orchestrator reacts to. Per-employee failures never become errors; they
//! are recorded as issues on the employee's outcome instead.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ErrorKind, ErrorSummary, StitchOutput};

/// How serious an aggregate employee failure rate is.
///
/// # Example
///
/// ```
/// use timesheet_ingest::error::Severity;
///
/// assert_eq!(Severity::from_failure_rate(0.75), Severity::High);
/// assert_eq!(Severity::from_failure_rate(0.3), Severity::Medium);
/// assert_eq!(Severity::from_failure_rate(0.1), Severity::Low);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// At most 20% of employees failed.
    Low,
    /// More than 20% and at most 50% of employees failed.
    Medium,
    /// More than half of the employees failed.
    High,
}

impl Severity {
    /// Classifies a failure rate in `0.0..=1.0`.
    pub fn from_failure_rate(rate: f64) -> Self {
        if rate > 0.5 {
            Severity::High
        } else if rate > 0.2 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(label)
    }
}

/// The main error type for timesheet ingestion.
///
/// # Example
///
/// ```
/// use timesheet_ingest::error::EngineError;
///
/// let error = EngineError::ConfigNotFound {
///     path: "/missing/workflow.yaml".to_string(),
/// };
/// assert_eq!(error.to_string(), "Configuration file not found: /missing/workflow.yaml");
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration file was not found at the specified path.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Configuration file could not be parsed.
    #[error("Failed to parse configuration file '{path}': {message}")]
    ConfigParseError {
        /// The path to the file that failed to parse.
        path: String,
        /// A description of the parse error.
        message: String,
    },

    /// A configuration value is out of range or inconsistent.
    #[error("Invalid configuration field '{field}': {message}")]
    InvalidConfig {
        /// The offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The discovery request failed or no candidate survived validation.
    #[error(
        "Discovery failed for '{filename}' ({document_size} chars): {}",
        .issues.join("; ")
    )]
    DiscoveryFailed {
        /// The document's filename.
        filename: String,
        /// The document's size in characters.
        document_size: usize,
        /// Issues raised during discovery.
        issues: Vec<String>,
    },

    /// The employee failure rate crossed the critical threshold.
    #[error(
        "Employee parsing failed ({severity} severity): {} of {} employees failed",
        .failed.len(),
        .failed.len() + .succeeded.len()
    )]
    EmployeeParsing {
        /// Severity of the failure rate.
        severity: Severity,
        /// Identifiers of employees that failed or timed out.
        failed: Vec<String>,
        /// Identifiers of employees that succeeded.
        succeeded: Vec<String>,
    },

    /// Some employees failed, but below the critical rate. Carries the
    /// stitched result so it can still be returned.
    #[error(
        "Partial success: {} of {} employees failed",
        .failed.len(),
        .failed.len() + .succeeded.len()
    )]
    PartialSuccess {
        /// Identifiers of employees that succeeded.
        succeeded: Vec<String>,
        /// Identifiers of employees that failed or timed out.
        failed: Vec<String>,
        /// The stitched result from the employees that succeeded.
        partial: Box<StitchOutput>,
    },

    /// The extraction capability could not be reached at all.
    #[error("Extraction capability unavailable during {stage}: {message}")]
    CapabilityUnavailable {
        /// The stage that was running.
        stage: String,
        /// The underlying error message.
        message: String,
    },

    /// The whole-document extraction call failed.
    #[error("Single-pass extraction failed: {message}")]
    SinglePassFailed {
        /// The underlying error message.
        message: String,
    },
}

impl EngineError {
    /// The caller-facing category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ConfigNotFound { .. }
            | EngineError::ConfigParseError { .. }
            | EngineError::InvalidConfig { .. } => ErrorKind::Config,
            EngineError::DiscoveryFailed { .. } => ErrorKind::Discovery,
            EngineError::EmployeeParsing { .. } => ErrorKind::EmployeeParsing,
            EngineError::PartialSuccess { .. } => ErrorKind::PartialSuccess,
            EngineError::CapabilityUnavailable { .. } => ErrorKind::CapabilityUnavailable,
            EngineError::SinglePassFailed { .. } => ErrorKind::SinglePass,
        }
    }

    /// Takes the stitched result out of a partial success.
    pub fn into_partial_result(self) -> Option<StitchOutput> {
        match self {
            EngineError::PartialSuccess { partial, .. } => Some(*partial),
            _ => None,
        }
    }

    /// Renders this error as a serializable summary.
    pub fn summary(&self) -> ErrorSummary {
        let severity = match self {
            EngineError::EmployeeParsing { severity, .. } => Some(*severity),
            _ => None,
        };
        ErrorSummary {
            kind: self.kind(),
            message: self.to_string(),
            severity,
        }
    }
}

/// A type alias for Results that return EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
