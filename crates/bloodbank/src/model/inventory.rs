//! Inventory lots, the movement ledger and allocations.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::BloodGroup;
use crate::error::Error;

/// Where a lot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LotSource {
    /// Entered by staff (transfers, stock counts).
    Manual,
    /// Collected at a completed appointment.
    Donation {
        /// The appointment that produced the lot.
        appointment_id: i64,
    },
}

/// Derived state of a lot on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotState {
    /// Has units and has not expired.
    Available,
    /// No units left.
    Depleted,
    /// Past its expiry date.
    Expired,
}

/// A batch of units of one blood group sharing an expiry date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLot {
    /// Row id.
    pub id: i64,
    /// Group of every unit in the lot.
    pub blood_group: BloodGroup,
    /// Units currently on hand.
    pub units: u32,
    /// Units the lot was created with.
    pub initial_units: u32,
    /// Day the blood was collected.
    pub collected_on: NaiveDate,
    /// Last usable day.
    pub expires_on: NaiveDate,
    /// Origin of the lot.
    pub source: LotSource,
    /// When the lot was recorded.
    pub created_at: DateTime<Utc>,
}

impl InventoryLot {
    /// Whether the lot is past its last usable day.
    #[must_use]
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        today > self.expires_on
    }

    /// State of the lot on `today`.
    #[must_use]
    pub fn state(&self, today: NaiveDate) -> LotState {
        if self.is_expired(today) {
            LotState::Expired
        } else if self.units == 0 {
            LotState::Depleted
        } else {
            LotState::Available
        }
    }
}

/// Why a lot's unit count changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    /// Units entered the inventory.
    Intake,
    /// Units were reserved for a request.
    Allocation,
    /// Reserved units returned after a rejection or no-show.
    Release,
    /// Manual correction.
    Adjustment,
    /// Units written off at expiry.
    Expiry,
}

impl MovementReason {
    /// Stable name used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Allocation => "allocation",
            Self::Release => "release",
            Self::Adjustment => "adjustment",
            Self::Expiry => "expiry",
        }
    }
}

impl fmt::Display for MovementReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intake" => Ok(Self::Intake),
            "allocation" => Ok(Self::Allocation),
            "release" => Ok(Self::Release),
            "adjustment" => Ok(Self::Adjustment),
            "expiry" => Ok(Self::Expiry),
            _ => Err(Error::validation(format!("unknown movement reason: '{s}'"))),
        }
    }
}

/// One signed change to a lot's unit count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Row id.
    pub id: i64,
    /// Lot that changed.
    pub lot_id: i64,
    /// Signed unit change.
    pub delta: i64,
    /// Why it changed.
    pub reason: MovementReason,
    /// Request involved, for allocations and releases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
    /// Appointment involved, for donation intake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<i64>,
    /// Free-form note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// When the change was recorded.
    pub at: DateTime<Utc>,
}

/// Units of a lot reserved for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Request holding the units.
    pub request_id: i64,
    /// Lot the units came from.
    pub lot_id: i64,
    /// Units reserved.
    pub units: u32,
}

/// Stock of one group on a given day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStock {
    /// The group.
    pub blood_group: BloodGroup,
    /// Usable units.
    pub units: u32,
    /// Lots holding usable units.
    pub lots: u32,
    /// Earliest expiry among usable lots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_expiry: Option<NaiveDate>,
}

/// Usable stock of every group; groups with no stock report zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySummary {
    /// Day the summary was computed for.
    pub as_of: NaiveDate,
    /// One entry per group, in [`BloodGroup::ALL`] order.
    pub groups: Vec<GroupStock>,
}

impl InventorySummary {
    /// Usable units across all groups.
    #[must_use]
    pub fn total_units(&self) -> u32 {
        self.groups.iter().map(|g| g.units).sum()
    }

    /// Stock entry for one group.
    #[must_use]
    pub fn group(&self, group: BloodGroup) -> Option<&GroupStock> {
        self.groups.iter().find(|g| g.blood_group == group)
    }
}

/// Input for recording a lot by hand.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLot {
    /// Group of every unit.
    pub blood_group: BloodGroup,
    /// Number of units.
    pub units: u32,
    /// Day the blood was collected.
    pub collected_on: NaiveDate,
    /// Override of the configured shelf life.
    #[serde(default)]
    pub expires_on: Option<NaiveDate>,
}

/// Filters for listing lots.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LotFilter {
    /// Only lots of this group.
    pub blood_group: Option<BloodGroup>,
    /// Only lots that are usable on this day.
    pub usable_on: Option<NaiveDate>,
}

/// A lot whose unit count disagrees with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMismatch {
    /// The lot.
    pub lot_id: i64,
    /// Units recorded on the lot row.
    pub units: i64,
    /// Sum of the lot's movements.
    pub ledger_units: i64,
}
