//! Punch event model.
//!
//! This module defines the [`PunchEvent`] struct, a single timestamped clock
//! action attributed to one employee.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single clock action (in, out, break start/end) attributed to one employee.
///
/// Timestamps are naive local time as written in the source document. No
/// timezone conversion is ever applied.
///
/// # Example
///
/// ```
/// use timesheet_ingest::models::PunchEvent;
/// use chrono::NaiveDateTime;
///
/// let event = PunchEvent::new(
///     "Jane Doe",
///     NaiveDateTime::parse_from_str("2026-01-15 09:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
///     "Clock In",
/// );
/// assert_eq!(event.punch_type, "Clock In");
/// assert!(event.role.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PunchEvent {
    /// The identifier of the employee, as it appears in the source document.
    pub employee_identifier: String,
    /// When the punch happened, in local time.
    pub timestamp: NaiveDateTime,
    /// The kind of punch (e.g., "Clock In", "Meal Break Start").
    pub punch_type: String,
    /// The role worked, if the document records one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// The hourly wage, if the document records one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_wage: Option<Decimal>,
}

impl PunchEvent {
    /// Creates a punch event with no role or wage information.
    pub fn new(
        employee_identifier: impl Into<String>,
        timestamp: NaiveDateTime,
        punch_type: impl Into<String>,
    ) -> Self {
        Self {
            employee_identifier: employee_identifier.into(),
            timestamp,
            punch_type: punch_type.into(),
            role: None,
            hourly_wage: None,
        }
    }

    /// Sets the role worked.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Sets the hourly wage.
    pub fn with_hourly_wage(mut self, wage: Decimal) -> Self {
        self.hourly_wage = Some(wage);
        self
    }

    /// The key two events must share to be considered exact duplicates.
    pub fn dedup_key(&self) -> (&str, NaiveDateTime, &str) {
        (
            self.employee_identifier.as_str(),
            self.timestamp,
            self.punch_type.as_str(),
        )
    }
}
