//! The external extraction capability.
//!
//! The extraction service (typically an LLM behind an HTTP API) is treated as
//! an opaque capability: submit a document, receive a structured payload or an
//! error. Implementations own prompt construction and transport; this crate
//! only depends on the [`ExtractionCapability`] trait and the payload contract
//! in [`schema`].
//!
//! Implementations are configured through their own constructors. Nothing
//! about the capability is switched by mutating shared state.

mod schema;

use async_trait::async_trait;
use thiserror::Error;

pub use schema::{
    DiscoveredEmployee, DiscoveryPayload, ExtractionPayload, PunchRecord,
    parse_discovery_payload, parse_extraction_payload,
};

/// Errors reported by an extraction capability.
///
/// The variants split into retryable request problems and errors that no
/// retry can fix. [`CapabilityError::Unavailable`] additionally marks an
/// infrastructure failure rather than a problem with one request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// A transient failure such as a dropped connection or a 5xx response.
    #[error("transient extraction error: {message}")]
    Transient {
        /// Description from the service or transport.
        message: String,
    },

    /// The service asked the caller to slow down.
    #[error("extraction rate limited: {message}")]
    RateLimited {
        /// Description from the service.
        message: String,
    },

    /// The response did not match the payload contract.
    #[error("extraction response violates schema: {message}")]
    SchemaViolation {
        /// What was wrong with the response.
        message: String,
    },

    /// A non-retryable failure such as rejected credentials.
    #[error("fatal extraction error: {message}")]
    Fatal {
        /// Description from the service or transport.
        message: String,
    },

    /// The service could not be reached at all.
    #[error("extraction capability unreachable: {message}")]
    Unavailable {
        /// Description from the transport.
        message: String,
    },
}

impl CapabilityError {
    /// Returns true if the same request may succeed when retried.
    ///
    /// Schema violations are retried because model output varies between
    /// calls.
    ///
    /// # Example
    ///
    /// ```
    /// use timesheet_ingest::capability::CapabilityError;
    ///
    /// let limited = CapabilityError::RateLimited { message: "429".to_string() };
    /// assert!(limited.is_retryable());
    ///
    /// let auth = CapabilityError::Fatal { message: "401".to_string() };
    /// assert!(!auth.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CapabilityError::Fatal { .. })
    }

    /// Returns true if the error means the service itself is unreachable.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, CapabilityError::Unavailable { .. })
    }
}

/// An external service that extracts structured timesheet data from text.
///
/// All timestamps in returned payloads must already be local time.
#[async_trait]
pub trait ExtractionCapability: Send + Sync {
    /// Lists the employees present in the document with rough punch counts.
    async fn discover(
        &self,
        document_text: &str,
        filename: &str,
    ) -> Result<DiscoveryPayload, CapabilityError>;

    /// Extracts the punch events of a single employee.
    ///
    /// `document_text` may be an excerpt of the full document containing only
    /// the lines relevant to the employee.
    async fn extract_for_employee(
        &self,
        document_text: &str,
        employee_identifier: &str,
        filename: &str,
        estimated_count: u32,
    ) -> Result<ExtractionPayload, CapabilityError>;

    /// Extracts the punch events of every employee in one request.
    async fn extract_document(
        &self,
        document_text: &str,
        filename: &str,
    ) -> Result<ExtractionPayload, CapabilityError>;
}
