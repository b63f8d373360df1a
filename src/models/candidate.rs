//! Employee candidate model.

use serde::{Deserialize, Serialize};

/// An employee found by the discovery pass.
///
/// After validation the `identifier` is guaranteed to be an exact substring of
/// the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeCandidate {
    /// The employee identifier exactly as written in the document.
    pub identifier: String,
    /// Rough number of punches the discovery pass expects for this employee.
    pub punch_count_estimate: u32,
    /// A cleaner display name, if the discovery pass offered one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_name_hint: Option<String>,
}

impl EmployeeCandidate {
    /// Creates a candidate without a name hint.
    pub fn new(identifier: impl Into<String>, punch_count_estimate: u32) -> Self {
        Self {
            identifier: identifier.into(),
            punch_count_estimate,
            canonical_name_hint: None,
        }
    }
}
