//! Strict payload contract for the extraction capability.
//!
//! Every response from the extraction service must decode into one of these
//! tagged records. Unknown fields are rejected, and each payload is checked
//! for semantic problems before any stage uses it. A response that fails
//! either check is a [`CapabilityError::SchemaViolation`].

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{EmployeeCandidate, PunchEvent};

use super::CapabilityError;

/// One employee listed by the discovery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveredEmployee {
    /// The employee identifier exactly as written in the document.
    pub identifier: String,
    /// Rough number of punches seen for the employee.
    #[serde(default)]
    pub punch_count_estimate: u32,
    /// A cleaner display name, if one is evident.
    #[serde(default)]
    pub canonical_name: Option<String>,
}

impl From<DiscoveredEmployee> for EmployeeCandidate {
    fn from(employee: DiscoveredEmployee) -> Self {
        Self {
            identifier: employee.identifier,
            punch_count_estimate: employee.punch_count_estimate,
            canonical_name_hint: employee.canonical_name,
        }
    }
}

/// Response to a discovery request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryPayload {
    /// Employees found in the document, in document order.
    pub employees: Vec<DiscoveredEmployee>,
    /// Anything the service wants to flag about the document.
    #[serde(default)]
    pub issues: Vec<String>,
}

impl DiscoveryPayload {
    /// Rejects payloads that list an employee with a blank identifier.
    pub fn validate(&self) -> Result<(), CapabilityError> {
        if let Some(index) = self
            .employees
            .iter()
            .position(|e| e.identifier.trim().is_empty())
        {
            return Err(CapabilityError::SchemaViolation {
                message: format!("employees[{}].identifier is blank", index),
            });
        }
        Ok(())
    }
}

/// One punch as reported by the extraction service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PunchRecord {
    /// The employee the punch belongs to.
    pub employee_identifier: String,
    /// Local time of the punch, with no timezone.
    pub timestamp: NaiveDateTime,
    /// The kind of punch.
    pub punch_type: String,
    /// The role worked, if present.
    #[serde(default)]
    pub role: Option<String>,
    /// The hourly wage, if present.
    #[serde(default)]
    pub hourly_wage: Option<Decimal>,
}

impl From<PunchRecord> for PunchEvent {
    fn from(record: PunchRecord) -> Self {
        Self {
            employee_identifier: record.employee_identifier,
            timestamp: record.timestamp,
            punch_type: record.punch_type,
            role: record.role,
            hourly_wage: record.hourly_wage,
        }
    }
}

/// Response to a per-employee or whole-document extraction request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionPayload {
    /// The extracted punches.
    pub punch_events: Vec<PunchRecord>,
    /// Anything the service wants to flag about the extraction.
    #[serde(default)]
    pub issues: Vec<String>,
}

impl ExtractionPayload {
    /// Rejects payloads with blank identifiers, blank punch types or negative wages.
    pub fn validate(&self) -> Result<(), CapabilityError> {
        for (index, record) in self.punch_events.iter().enumerate() {
            let problem = if record.employee_identifier.trim().is_empty() {
                Some("employee_identifier is blank")
            } else if record.punch_type.trim().is_empty() {
                Some("punch_type is blank")
            } else if record.hourly_wage.is_some_and(|w| w.is_sign_negative()) {
                Some("hourly_wage is negative")
            } else {
                None
            };

            if let Some(problem) = problem {
                return Err(CapabilityError::SchemaViolation {
                    message: format!("punch_events[{}].{}", index, problem),
                });
            }
        }
        Ok(())
    }

    /// Converts the validated records into punch events.
    pub fn into_events(self) -> (Vec<PunchEvent>, Vec<String>) {
        let events = self.punch_events.into_iter().map(PunchEvent::from).collect();
        (events, self.issues)
    }
}

/// Decodes and validates a raw discovery response.
///
/// # Example
///
/// ```
/// use timesheet_ingest::capability::parse_discovery_payload;
///
/// let raw = r#"{"employees": [{"identifier": "Jane Doe", "punch_count_estimate": 6}]}"#;
/// let payload = parse_discovery_payload(raw).unwrap();
/// assert_eq!(payload.employees[0].identifier, "Jane Doe");
///
/// let bad = r#"{"employees": [], "extra": true}"#;
/// assert!(parse_discovery_payload(bad).is_err());
/// ```
pub fn parse_discovery_payload(raw: &str) -> Result<DiscoveryPayload, CapabilityError> {
    let payload: DiscoveryPayload =
        serde_json::from_str(raw).map_err(|e| CapabilityError::SchemaViolation {
            message: e.to_string(),
        })?;
    payload.validate()?;
    Ok(payload)
}

/// Decodes and validates a raw extraction response.
pub fn parse_extraction_payload(raw: &str) -> Result<ExtractionPayload, CapabilityError> {
    let payload: ExtractionPayload =
        serde_json::from_str(raw).map_err(|e| CapabilityError::SchemaViolation {
            message: e.to_string(),
        })?;
    payload.validate()?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extraction_payload() {
        let raw = r#"{
            "punch_events": [
                {
                    "employee_identifier": "Jane Doe",
                    "timestamp": "2026-01-15T09:00:00",
                    "punch_type": "Clock In",
                    "role": "Cook",
                    "hourly_wage": "21.50"
                }
            ]
        }"#;

        let payload = parse_extraction_payload(raw).unwrap();
        let (events, issues) = payload.into_events();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].role.as_deref(), Some("Cook"));
        assert_eq!(events[0].hourly_wage, Some(Decimal::new(2150, 2)));
        assert!(issues.is_empty());
    }

    #[test]
    fn test_unknown_field_is_schema_violation() {
        let raw = r#"{
            "punch_events": [
                {
                    "employee_identifier": "Jane Doe",
                    "timestamp": "2026-01-15T09:00:00",
                    "punch_type": "Clock In",
                    "timezone": "UTC"
                }
            ]
        }"#;

        match parse_extraction_payload(raw) {
            Err(CapabilityError::SchemaViolation { message }) => {
                assert!(message.contains("timezone"), "unexpected message: {}", message)
            }
            other => panic!("Expected SchemaViolation, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_punch_type_is_schema_violation() {
        let raw = r#"{
            "punch_events": [
                {
                    "employee_identifier": "Jane Doe",
                    "timestamp": "2026-01-15T09:00:00",
                    "punch_type": "  "
                }
            ]
        }"#;

        match parse_extraction_payload(raw) {
            Err(CapabilityError::SchemaViolation { message }) => {
                assert_eq!(message, "punch_events[0].punch_type is blank")
            }
            other => panic!("Expected SchemaViolation, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_wage_is_schema_violation() {
        let raw = r#"{
            "punch_events": [
                {
                    "employee_identifier": "Jane Doe",
                    "timestamp": "2026-01-15T09:00:00",
                    "punch_type": "Clock In",
                    "hourly_wage": "-1.00"
                }
            ]
        }"#;
        assert!(parse_extraction_payload(raw).is_err());
    }

    #[test]
    fn test_timestamp_with_offset_is_rejected() {
        let raw = r#"{
            "punch_events": [
                {
                    "employee_identifier": "Jane Doe",
                    "timestamp": "2026-01-15T09:00:00Z",
                    "punch_type": "Clock In"
                }
            ]
        }"#;
        assert!(parse_extraction_payload(raw).is_err());
    }

    #[test]
    fn test_blank_discovered_identifier_is_schema_violation() {
        let raw = r#"{"employees": [{"identifier": "Jane"}, {"identifier": ""}]}"#;

        match parse_discovery_payload(raw) {
            Err(CapabilityError::SchemaViolation { message }) => {
                assert_eq!(message, "employees[1].identifier is blank")
            }
            other => panic!("Expected SchemaViolation, got {:?}", other),
        }
    }

    #[test]
    fn test_discovered_employee_converts_to_candidate() {
        let employee = DiscoveredEmployee {
            identifier: "SMITH, JOHN".to_string(),
            punch_count_estimate: 8,
            canonical_name: Some("John Smith".to_string()),
        };

        let candidate = EmployeeCandidate::from(employee);
        assert_eq!(candidate.identifier, "SMITH, JOHN");
        assert_eq!(candidate.punch_count_estimate, 8);
        assert_eq!(candidate.canonical_name_hint.as_deref(), Some("John Smith"));
    }
}
