//! Donor appointments and their lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Where an appointment is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Booked.
    Scheduled,
    /// The donor confirmed attendance.
    Confirmed,
    /// The donor is being seen.
    InProgress,
    /// Blood was collected.
    Completed,
    /// Called off.
    Cancelled,
    /// The donor did not come.
    NoShow,
}

impl AppointmentStatus {
    /// Stable name used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    /// Whether the appointment can still change.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// Whether the appointment is still waiting for the donor to arrive.
    #[must_use]
    pub fn is_upcoming(self) -> bool {
        matches!(self, Self::Scheduled | Self::Confirmed)
    }

    /// Every state reachable from this one.
    #[must_use]
    pub fn next_states(self) -> &'static [AppointmentStatus] {
        match self {
            Self::Scheduled => &[Self::Confirmed, Self::Cancelled, Self::NoShow],
            Self::Confirmed => &[Self::InProgress, Self::Cancelled, Self::NoShow],
            Self::InProgress => &[Self::Completed, Self::Cancelled],
            Self::Completed | Self::Cancelled | Self::NoShow => &[],
        }
    }

    /// Whether the lifecycle allows moving to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        self.next_states().contains(&next)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "confirmed" => Ok(Self::Confirmed),
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "no_show" | "no-show" => Ok(Self::NoShow),
            _ => Err(Error::validation(format!("unknown appointment status: '{s}'"))),
        }
    }
}

/// A scheduled donor visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    /// Row id.
    pub id: i64,
    /// Donor expected.
    pub donor_id: i64,
    /// Request the donation goes to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
    /// Notification whose acceptance booked this visit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<i64>,
    /// When the donor is expected.
    pub scheduled_at: DateTime<Utc>,
    /// Lifecycle state.
    pub status: AppointmentStatus,
    /// Units collected, once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units_collected: Option<u32>,
    /// Staff notes, including cancellation reasons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// When it was booked.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

/// Filters for listing appointments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentFilter {
    /// Only this donor's appointments.
    pub donor_id: Option<i64>,
    /// Only appointments in this state.
    pub status: Option<AppointmentStatus>,
    /// Only appointments for this request.
    pub request_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        use AppointmentStatus::*;
        assert!(Scheduled.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
    }

    #[test]
    fn test_forbidden_transitions() {
        use AppointmentStatus::*;
        assert!(!Scheduled.can_transition_to(InProgress));
        assert!(!Scheduled.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(NoShow));
        for terminal in [Completed, Cancelled, NoShow] {
            assert!(terminal.is_terminal());
            assert!(terminal.next_states().is_empty());
        }
    }

    #[test]
    fn test_status_names() {
        assert_eq!(AppointmentStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            "canceled".parse::<AppointmentStatus>().unwrap(),
            AppointmentStatus::Cancelled
        );
    }

    #[test]
    fn test_is_upcoming() {
        assert!(AppointmentStatus::Scheduled.is_upcoming());
        assert!(AppointmentStatus::Confirmed.is_upcoming());
        assert!(!AppointmentStatus::InProgress.is_upcoming());
    }
}
