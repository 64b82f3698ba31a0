//! Periodic upkeep and the admin dashboard.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::BloodBank;
use crate::error::Result;
use crate::model::{
    AppointmentStatus, BloodGroup, DonorFilter, InventorySummary, RequestStatus, Role, UserStatus,
};

/// Groups holding fewer usable units than this are flagged on the dashboard.
pub const LOW_STOCK_UNITS: u32 = 5;

/// What one maintenance sweep changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Lots emptied because they expired.
    pub expired_lots: u32,
    /// Units discarded with them.
    pub expired_units: u32,
    /// Fulfilled requests not picked up before their deadline.
    pub request_no_shows: u32,
    /// Appointments the donor never arrived for.
    pub appointment_no_shows: u32,
}

impl MaintenanceReport {
    /// Whether the sweep changed anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Figures for the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    /// Stock per group.
    pub inventory: InventorySummary,
    /// Groups below [`LOW_STOCK_UNITS`].
    pub low_stock: Vec<BloodGroup>,
    /// Requests per status.
    pub requests: BTreeMap<String, i64>,
    /// Appointments per status.
    pub appointments: BTreeMap<String, i64>,
    /// Registered donors.
    pub donors: usize,
    /// Donors who could give blood today.
    pub eligible_donors: usize,
    /// Accounts waiting for an admin decision.
    pub pending_users: i64,
}

impl BloodBank {
    /// Run one maintenance sweep in a single transaction.
    ///
    /// Expires lots, turns fulfilled requests past their pickup deadline into
    /// no-shows (returning their units), and closes scheduled or confirmed
    /// appointments more than `no_show_grace_hours` past their slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is changed
    /// in that case.
    pub fn run_maintenance(&self, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let tx = self.storage.transaction()?;

        let expired = self.expire_lots_in_tx(now)?;
        let mut report = MaintenanceReport {
            expired_lots: expired.lots,
            expired_units: expired.units,
            ..MaintenanceReport::default()
        };

        for request in self.storage.overdue_pickups(now)? {
            self.close_request_in_tx(request.id, RequestStatus::NoShow, None, now)?;
            debug!(request_id = request.id, "Pickup deadline passed");
            report.request_no_shows += 1;
        }

        let grace = TimeDelta::hours(i64::from(self.config.donation.no_show_grace_hours));
        for mut appointment in self.storage.stale_appointments(now - grace)? {
            appointment.status = AppointmentStatus::NoShow;
            appointment.updated_at = now;
            self.storage.update_appointment(&appointment)?;
            debug!(appointment_id = appointment.id, "Donor did not attend");
            report.appointment_no_shows += 1;
        }

        tx.commit()?;
        if !report.is_empty() {
            info!(
                expired_lots = report.expired_lots,
                expired_units = report.expired_units,
                request_no_shows = report.request_no_shows,
                appointment_no_shows = report.appointment_no_shows,
                "Maintenance sweep"
            );
        }
        Ok(report)
    }

    /// Collect the dashboard figures for `today`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn dashboard(&self, today: NaiveDate) -> Result<Dashboard> {
        let inventory = self.inventory_summary(today)?;
        let low_stock = inventory
            .groups
            .iter()
            .filter(|g| g.units < LOW_STOCK_UNITS)
            .map(|g| g.blood_group)
            .collect();

        let requests = self
            .storage
            .request_counts()?
            .into_iter()
            .map(|(status, n)| (status.to_string(), n))
            .collect();
        let appointments = self
            .storage
            .appointment_counts()?
            .into_iter()
            .map(|(status, n)| (status.to_string(), n))
            .collect();

        let donors = self.list_donors(&DonorFilter::default())?.len();
        let eligible_donors = self
            .list_donors(&DonorFilter {
                eligible_on: Some(today),
                ..DonorFilter::default()
            })?
            .len();

        let pending_users = self
            .storage
            .count_users(Role::Hospital, Some(UserStatus::Pending))?
            + self
                .storage
                .count_users(Role::Admin, Some(UserStatus::Pending))?;

        Ok(Dashboard {
            inventory,
            low_stock,
            requests,
            appointments,
            donors,
            eligible_donors,
            pending_users,
        })
    }
}
