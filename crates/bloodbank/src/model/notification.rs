//! Donation solicitations sent to donors.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A donor's answer to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationResponse {
    /// Will donate; an appointment is booked.
    Accept,
    /// Will not donate.
    Decline,
    /// Undecided; may answer again later.
    Maybe,
}

impl NotificationResponse {
    /// Stable name used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Decline => "decline",
            Self::Maybe => "maybe",
        }
    }

    /// Whether no further answer is accepted after this one.
    #[must_use]
    pub fn is_final(self) -> bool {
        !matches!(self, Self::Maybe)
    }
}

impl fmt::Display for NotificationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationResponse {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" | "accepted" | "yes" => Ok(Self::Accept),
            "decline" | "declined" | "no" => Ok(Self::Decline),
            "maybe" => Ok(Self::Maybe),
            _ => Err(Error::validation(format!("unknown response: '{s}'"))),
        }
    }
}

/// A message soliciting a donation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Row id.
    pub id: i64,
    /// Recipient.
    pub donor_id: i64,
    /// Request the donation is for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
    /// Short subject line.
    pub title: String,
    /// Body text.
    pub message: String,
    /// The donor's latest answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<NotificationResponse>,
    /// When the answer was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    /// When the donor opened it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    /// When it was sent.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Whether the donor may still answer.
    #[must_use]
    pub fn accepts_response(&self) -> bool {
        self.response.is_none_or(|r| !r.is_final())
    }
}
