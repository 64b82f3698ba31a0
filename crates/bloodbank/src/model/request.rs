//! Blood requests and their approval lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BloodGroup;
use crate::error::Error;

/// How soon the blood is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Planned procedure.
    #[default]
    Normal,
    /// Needed within the day.
    Urgent,
    /// Needed immediately.
    Critical,
}

impl Urgency {
    /// Stable name used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Urgent => "urgent",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "urgent" => Ok(Self::Urgent),
            "critical" => Ok(Self::Critical),
            _ => Err(Error::validation(format!("unknown urgency: '{s}'"))),
        }
    }
}

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting for an admin decision.
    Pending,
    /// Approved, but stock did not cover every unit yet.
    Approved,
    /// Every unit is reserved and waiting for pickup.
    Fulfilled,
    /// The requester picked the units up.
    Collected,
    /// Turned down or withdrawn by an admin.
    Rejected,
    /// Never picked up; reserved units went back to stock.
    NoShow,
}

impl RequestStatus {
    /// Stable name used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Fulfilled => "fulfilled",
            Self::Collected => "collected",
            Self::Rejected => "rejected",
            Self::NoShow => "no_show",
        }
    }

    /// Whether the request can still change.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Collected | Self::Rejected | Self::NoShow)
    }

    /// Whether the lifecycle allows moving to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::{Approved, Collected, Fulfilled, NoShow, Pending, Rejected};
        matches!(
            (self, next),
            (Pending, Approved | Fulfilled | Rejected)
                | (Approved, Fulfilled | Rejected | NoShow)
                | (Fulfilled, Collected | NoShow)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "fulfilled" => Ok(Self::Fulfilled),
            "collected" => Ok(Self::Collected),
            "rejected" => Ok(Self::Rejected),
            "no_show" | "no-show" => Ok(Self::NoShow),
            _ => Err(Error::validation(format!("unknown request status: '{s}'"))),
        }
    }
}

/// An ask for units of one blood group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodRequest {
    /// Row id.
    pub id: i64,
    /// Account that filed the request.
    pub requester_id: i64,
    /// Requesting hospital.
    pub hospital_name: String,
    /// Patient the blood is for.
    pub patient_name: String,
    /// Group required.
    pub blood_group: BloodGroup,
    /// Units asked for.
    pub units_requested: u32,
    /// Units reserved so far.
    pub units_allocated: u32,
    /// How soon the blood is needed.
    pub urgency: Urgency,
    /// Lifecycle state.
    pub status: RequestStatus,
    /// Clinical reason, or the rejection reason once rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Admin who approved the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<i64>,
    /// When the request was approved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    /// Latest pickup time once every unit is reserved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_deadline: Option<DateTime<Utc>>,
    /// When the request was filed.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl BloodRequest {
    /// Units still missing.
    #[must_use]
    pub fn shortfall(&self) -> u32 {
        self.units_requested.saturating_sub(self.units_allocated)
    }

    /// Whether every unit is reserved.
    #[must_use]
    pub fn is_fully_allocated(&self) -> bool {
        self.shortfall() == 0
    }
}

/// Input for filing a request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRequest {
    /// Requesting hospital.
    pub hospital_name: String,
    /// Patient the blood is for.
    pub patient_name: String,
    /// Group required.
    pub blood_group: BloodGroup,
    /// Units asked for.
    pub units: u32,
    /// How soon the blood is needed.
    #[serde(default)]
    pub urgency: Urgency,
    /// Clinical reason.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Filters for listing requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestFilter {
    /// Only requests in this state.
    pub status: Option<RequestStatus>,
    /// Only requests for this group.
    pub blood_group: Option<BloodGroup>,
    /// Only requests filed by this account.
    pub requester_id: Option<i64>,
}
