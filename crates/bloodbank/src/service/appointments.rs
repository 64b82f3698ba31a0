//! Donation appointments and the completion flow.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{require_admin, BloodBank};
use crate::error::{Error, Result};
use crate::model::{
    Appointment, AppointmentFilter, AppointmentStatus, BloodRequest, Donor, InventoryLot,
    LotSource, MedicalReport, NewReport, RequestStatus, Role, User,
};
use crate::storage::NewAppointmentRow;

/// Input for booking an appointment.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointment {
    /// Donor attending.
    pub donor_id: i64,
    /// Request the donation is for.
    #[serde(default)]
    pub request_id: Option<i64>,
    /// Slot start.
    pub scheduled_at: DateTime<Utc>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Everything a completed donation produced.
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    /// The completed appointment.
    pub appointment: Appointment,
    /// The lot the donation went into.
    pub lot: InventoryLot,
    /// The screening report, when one was taken.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<MedicalReport>,
    /// The linked request after the donation was allocated to it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<BloodRequest>,
}

impl BloodBank {
    /// Fail with [`Error::Conflict`] when a visit can no longer help
    /// `request_id` because the request is closed.
    pub(crate) fn ensure_request_open(&self, request_id: i64) -> Result<()> {
        let request = self
            .storage
            .get_request(request_id)?
            .ok_or_else(|| Error::not_found("request", request_id))?;
        if request.status.is_terminal() {
            return Err(Error::conflict(format!(
                "request {request_id} is {}; no donation is needed for it",
                request.status
            )));
        }
        Ok(())
    }

    /// Check that `donor` can take a slot at `at`.
    ///
    /// The slot must lie in the future but within `max_schedule_ahead_days`,
    /// the donor must be eligible on that day, and must hold no other open
    /// appointment (`except` excludes one being moved).
    pub(crate) fn check_slot(
        &self,
        donor: &Donor,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
        except: Option<i64>,
    ) -> Result<()> {
        if at <= now {
            return Err(Error::validation("appointment time must be in the future"));
        }
        let ahead = self.config.donation.max_schedule_ahead_days;
        if at > now + TimeDelta::days(i64::from(ahead)) {
            return Err(Error::validation(format!(
                "appointments can be booked at most {ahead} days ahead"
            )));
        }

        let eligibility = donor.eligibility(at.date_naive(), &self.config.donation);
        if !eligibility.eligible {
            return Err(Error::validation(format!(
                "donor {} is not eligible on {}: {}",
                donor.id,
                at.date_naive(),
                eligibility.reasons.join("; ")
            )));
        }

        if self.storage.has_open_appointment(donor.id, except)? {
            return Err(Error::conflict(format!(
                "donor {} already has an open appointment",
                donor.id
            )));
        }
        Ok(())
    }

    /// Book an appointment for a donor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] unless `admin` is an admin,
    /// [`Error::Validation`] for an unacceptable slot, and
    /// [`Error::Conflict`] if the donor already has an open appointment or
    /// the linked request is closed.
    pub fn schedule_appointment(
        &self,
        admin: &User,
        new: &NewAppointment,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        require_admin(admin)?;

        let tx = self.storage.transaction()?;
        let donor = self.get_donor(new.donor_id)?;
        if let Some(request_id) = new.request_id {
            self.ensure_request_open(request_id)?;
        }
        self.check_slot(&donor, new.scheduled_at, now, None)?;

        let id = self.storage.insert_appointment(
            &NewAppointmentRow {
                donor_id: donor.id,
                request_id: new.request_id,
                notification_id: None,
                notes: new.notes.as_deref(),
            },
            new.scheduled_at,
            now,
        )?;
        tx.commit()?;

        info!(appointment_id = id, donor_id = donor.id, "Appointment scheduled");
        self.get_appointment(id)
    }

    /// Get an appointment by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the appointment does not exist.
    pub fn get_appointment(&self, id: i64) -> Result<Appointment> {
        self.storage
            .get_appointment(id)?
            .ok_or_else(|| Error::not_found("appointment", id))
    }

    /// Get an appointment the viewer may see: admins any, donors their own.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if it does not exist or is not visible.
    pub fn view_appointment(&self, viewer: &User, id: i64) -> Result<Appointment> {
        let appointment = self.get_appointment(id)?;
        match viewer.role {
            Role::Admin => Ok(appointment),
            Role::Donor if self.donor_for_user(viewer.id)?.id == appointment.donor_id => {
                Ok(appointment)
            }
            _ => Err(Error::not_found("appointment", id)),
        }
    }

    /// List appointments: admins any, donors only their own.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] for hospital accounts.
    pub fn list_appointments(
        &self,
        viewer: &User,
        filter: &AppointmentFilter,
    ) -> Result<Vec<Appointment>> {
        let mut filter = filter.clone();
        match viewer.role {
            Role::Admin => {}
            Role::Donor => filter.donor_id = Some(self.donor_for_user(viewer.id)?.id),
            Role::Hospital => return Err(Error::forbidden("hospital accounts have no appointments")),
        }
        self.storage.list_appointments(&filter)
    }

    fn move_appointment(
        &self,
        id: i64,
        to: AppointmentStatus,
        now: DateTime<Utc>,
        note: Option<&str>,
    ) -> Result<Appointment> {
        let mut appointment = self.get_appointment(id)?;
        if !appointment.status.can_transition_to(to) {
            return Err(Error::invalid_transition(
                "appointment",
                appointment.status,
                to,
            ));
        }
        appointment.status = to;
        appointment.updated_at = now;
        if let Some(note) = note {
            appointment.notes = Some(match appointment.notes.take() {
                Some(existing) => format!("{existing}\n{note}"),
                None => note.to_string(),
            });
        }
        self.storage.update_appointment(&appointment)?;
        info!(appointment_id = id, status = %to, "Appointment updated");
        Ok(appointment)
    }

    /// Confirm a scheduled appointment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the appointment is scheduled.
    pub fn confirm_appointment(&self, id: i64, now: DateTime<Utc>) -> Result<Appointment> {
        self.move_appointment(id, AppointmentStatus::Confirmed, now, None)
    }

    /// Check the donor in for a confirmed appointment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the appointment is confirmed.
    pub fn start_appointment(&self, id: i64, now: DateTime<Utc>) -> Result<Appointment> {
        self.move_appointment(id, AppointmentStatus::InProgress, now, None)
    }

    /// Cancel an appointment that has not finished.
    ///
    /// The viewer must be an admin or the donor it belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the appointment is finished.
    pub fn cancel_appointment(
        &self,
        viewer: &User,
        id: i64,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        self.view_appointment(viewer, id)?;
        let note = reason.map(|r| format!("cancelled: {r}"));
        self.move_appointment(id, AppointmentStatus::Cancelled, now, note.as_deref())
    }

    /// Record that the donor did not attend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the appointment is
    /// scheduled or confirmed.
    pub fn mark_appointment_no_show(&self, id: i64, now: DateTime<Utc>) -> Result<Appointment> {
        self.move_appointment(id, AppointmentStatus::NoShow, now, None)
    }

    /// Move an upcoming appointment to a new time.
    ///
    /// The viewer must be an admin or the donor it belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the appointment is
    /// scheduled or confirmed, and [`Error::Validation`] for a bad slot.
    pub fn reschedule_appointment(
        &self,
        viewer: &User,
        id: i64,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        let tx = self.storage.transaction()?;
        let mut appointment = self.view_appointment(viewer, id)?;
        if !appointment.status.is_upcoming() {
            return Err(Error::invalid_transition(
                "appointment",
                appointment.status,
                "rescheduled",
            ));
        }
        let donor = self.get_donor(appointment.donor_id)?;
        self.check_slot(&donor, scheduled_at, now, Some(id))?;

        appointment.scheduled_at = scheduled_at;
        appointment.updated_at = now;
        self.storage.update_appointment(&appointment)?;
        tx.commit()?;

        info!(appointment_id = id, %scheduled_at, "Appointment rescheduled");
        Ok(appointment)
    }

    /// Finish an in-progress donation.
    ///
    /// In one transaction: stores the collected units as a new lot, records
    /// the donation day on the donor, saves the screening report if given,
    /// and allocates the new units to the linked request when it is approved
    /// and still short.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the appointment is in
    /// progress and [`Error::Validation`] for a unit count outside
    /// `1..=max_units_per_donation` or a bad report.
    pub fn complete_appointment(
        &self,
        id: i64,
        units: u32,
        report: Option<NewReport>,
        now: DateTime<Utc>,
    ) -> Result<Completion> {
        let max = self.config.donation.max_units_per_donation;
        if !(1..=max).contains(&units) {
            return Err(Error::validation(format!(
                "units must be between 1 and {max}, got {units}"
            )));
        }

        let tx = self.storage.transaction()?;
        let mut appointment = self.get_appointment(id)?;
        if !appointment
            .status
            .can_transition_to(AppointmentStatus::Completed)
        {
            return Err(Error::invalid_transition(
                "appointment",
                appointment.status,
                AppointmentStatus::Completed,
            ));
        }
        let donor = self.get_donor(appointment.donor_id)?;
        let today = now.date_naive();

        let lot_id = self.storage.insert_lot(
            donor.blood_group,
            units,
            today,
            self.expiry_for(today)?,
            LotSource::Donation { appointment_id: id },
            now,
        )?;
        self.storage.set_last_donation(donor.id, today)?;

        let report_id = match report {
            Some(mut report) => {
                report.donor_id = donor.id;
                report.appointment_id = Some(id);
                Some(self.insert_report_in_tx(&report, now)?)
            }
            None => None,
        };

        let mut request = None;
        if let Some(request_id) = appointment.request_id {
            let mut linked = self
                .storage
                .get_request(request_id)?
                .ok_or_else(|| Error::not_found("request", request_id))?;
            if linked.status == RequestStatus::Approved
                && linked.shortfall() > 0
                && donor.blood_group.can_donate_to(linked.blood_group)
            {
                let take = units.min(linked.shortfall());
                self.take_from_lot(request_id, lot_id, take, now)?;
                linked.units_allocated += take;
                linked.updated_at = now;
                self.settle_if_covered(&mut linked, now);
                self.storage.update_request(&linked)?;
            }
            request = Some(linked);
        }

        appointment.status = AppointmentStatus::Completed;
        appointment.units_collected = Some(units);
        appointment.updated_at = now;
        self.storage.update_appointment(&appointment)?;
        tx.commit()?;

        info!(
            appointment_id = id,
            donor_id = donor.id,
            lot_id,
            units,
            "Donation completed"
        );
        Ok(Completion {
            appointment,
            lot: self.get_lot(lot_id)?,
            report: report_id
                .map(|rid| {
                    self.storage
                        .get_report(rid)?
                        .ok_or_else(|| Error::not_found("report", rid))
                })
                .transpose()?,
            request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::model::{BloodGroup, NewRequest, Urgency};

    fn book(bank: &BloodBank, admin: &User, donor_id: i64, request_id: Option<i64>) -> Appointment {
        bank.schedule_appointment(
            admin,
            &NewAppointment {
                donor_id,
                request_id,
                scheduled_at: at(2024, 3, 2),
                notes: None,
            },
            at(2024, 3, 1),
        )
        .unwrap()
    }

    fn walk_in(bank: &BloodBank, id: i64) {
        bank.confirm_appointment(id, at(2024, 3, 1)).unwrap();
        bank.start_appointment(id, at(2024, 3, 2)).unwrap();
    }

    #[test]
    fn test_lifecycle_order_enforced() {
        let bank = bank();
        let admin = admin(&bank);
        let donor = donor(&bank, "Ann Lee", BloodGroup::APos);
        let appointment = book(&bank, &admin, donor.id, None);

        assert!(matches!(
            bank.start_appointment(appointment.id, at(2024, 3, 2)),
            Err(Error::InvalidTransition { .. })
        ));
        assert!(bank
            .complete_appointment(appointment.id, 1, None, at(2024, 3, 2))
            .is_err());

        walk_in(&bank, appointment.id);
        assert!(matches!(
            bank.mark_appointment_no_show(appointment.id, at(2024, 3, 2)),
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_schedule_checks() {
        let bank = bank();
        let admin = admin(&bank);
        let donor = donor(&bank, "Ann Lee", BloodGroup::APos);
        book(&bank, &admin, donor.id, None);

        // One open appointment per donor
        let second = bank.schedule_appointment(
            &admin,
            &NewAppointment {
                donor_id: donor.id,
                request_id: None,
                scheduled_at: at(2024, 3, 5),
                notes: None,
            },
            at(2024, 3, 1),
        );
        assert!(matches!(second, Err(Error::Conflict(_))));

        let mut recent = new_donor("Recent Giver", BloodGroup::APos);
        recent.last_donation_on = Some(date(2024, 2, 1));
        let recent = bank.register_donor(&recent, at(2024, 2, 2)).unwrap();
        let ineligible = bank.schedule_appointment(
            &admin,
            &NewAppointment {
                donor_id: recent.id,
                request_id: None,
                scheduled_at: at(2024, 3, 5),
                notes: None,
            },
            at(2024, 3, 1),
        );
        assert!(matches!(ineligible, Err(Error::Validation(_))));

        let hospital = hospital(&bank, &admin, "h@example.org");
        let request = bank
            .create_request(
                &hospital,
                &NewRequest {
                    hospital_name: "General Hospital".to_string(),
                    patient_name: "Pat Jones".to_string(),
                    blood_group: BloodGroup::APos,
                    units: 1,
                    urgency: Urgency::Normal,
                    reason: None,
                },
                at(2024, 3, 1),
            )
            .unwrap();
        bank.reject_request(&admin, request.id, None, at(2024, 3, 1))
            .unwrap();
        let other = bank
            .register_donor(&new_donor("Bo Chen", BloodGroup::APos), at(2024, 1, 1))
            .unwrap();
        let closed = bank.schedule_appointment(
            &admin,
            &NewAppointment {
                donor_id: other.id,
                request_id: Some(request.id),
                scheduled_at: at(2024, 3, 5),
                notes: None,
            },
            at(2024, 3, 1),
        );
        assert!(matches!(closed, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_complete_creates_lot_and_report() {
        let bank = bank();
        let admin = admin(&bank);
        let donor = donor(&bank, "Ann Lee", BloodGroup::BNeg);
        let appointment = book(&bank, &admin, donor.id, None);
        walk_in(&bank, appointment.id);

        assert!(matches!(
            bank.complete_appointment(appointment.id, 3, None, at(2024, 3, 2)),
            Err(Error::Validation(_))
        ));

        let completion = bank
            .complete_appointment(
                appointment.id,
                1,
                Some(NewReport {
                    hemoglobin_g_dl: Some(14.1),
                    blood_pressure: Some("118/76".to_string()),
                    ..NewReport::default()
                }),
                at(2024, 3, 2),
            )
            .unwrap();

        assert_eq!(completion.appointment.status, AppointmentStatus::Completed);
        assert_eq!(completion.appointment.units_collected, Some(1));
        assert_eq!(completion.lot.blood_group, BloodGroup::BNeg);
        assert_eq!(completion.lot.expires_on, date(2024, 4, 13));
        assert_eq!(
            completion.lot.source,
            LotSource::Donation {
                appointment_id: appointment.id
            }
        );
        let report = completion.report.unwrap();
        assert_eq!(report.donor_id, donor.id);
        assert_eq!(report.appointment_id, Some(appointment.id));
        assert_eq!(
            bank.get_donor(donor.id).unwrap().last_donation_on,
            Some(date(2024, 3, 2))
        );
        assert!(bank.reconcile().unwrap().is_empty());
    }

    #[test]
    fn test_complete_bad_report_rolls_back() {
        let bank = bank();
        let admin = admin(&bank);
        let donor = donor(&bank, "Ann Lee", BloodGroup::BNeg);
        let appointment = book(&bank, &admin, donor.id, None);
        walk_in(&bank, appointment.id);

        let result = bank.complete_appointment(
            appointment.id,
            1,
            Some(NewReport {
                blood_pressure: Some("high".to_string()),
                ..NewReport::default()
            }),
            at(2024, 3, 2),
        );
        assert!(result.is_err());

        assert_eq!(
            bank.get_appointment(appointment.id).unwrap().status,
            AppointmentStatus::InProgress
        );
        assert!(bank.list_lots(&Default::default()).unwrap().is_empty());
        assert!(bank.get_donor(donor.id).unwrap().last_donation_on.is_none());
    }

    #[test]
    fn test_donation_covers_linked_request() {
        let bank = bank();
        let admin = admin(&bank);
        let hospital = hospital(&bank, &admin, "h@example.org");
        let request = bank
            .create_request(
                &hospital,
                &NewRequest {
                    hospital_name: "General Hospital".to_string(),
                    patient_name: "Pat Jones".to_string(),
                    blood_group: BloodGroup::APos,
                    units: 1,
                    urgency: Urgency::Critical,
                    reason: None,
                },
                at(2024, 3, 1),
            )
            .unwrap();
        bank.approve_request(&admin, request.id, at(2024, 3, 1), false)
            .unwrap();

        let donor = donor(&bank, "Olive Neg", BloodGroup::ONeg);
        let appointment = book(&bank, &admin, donor.id, Some(request.id));
        walk_in(&bank, appointment.id);
        let completion = bank
            .complete_appointment(appointment.id, 2, None, at(2024, 3, 2))
            .unwrap();

        let linked = completion.request.unwrap();
        assert_eq!(linked.status, RequestStatus::Fulfilled);
        assert_eq!(linked.units_allocated, 1);
        assert!(linked.pickup_deadline.is_some());
        // The unit not needed by the request stays in stock
        assert_eq!(bank.get_lot(completion.lot.id).unwrap().units, 1);
        assert!(bank.reconcile().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_and_reschedule() {
        let bank = bank();
        let admin = admin(&bank);
        let (user, donor) = donor_account(&bank, "d@example.org", BloodGroup::APos);
        let (stranger, _) = donor_account(&bank, "s@example.org", BloodGroup::APos);
        let appointment = book(&bank, &admin, donor.id, None);

        assert!(bank
            .reschedule_appointment(&stranger, appointment.id, at(2024, 3, 4), at(2024, 3, 1))
            .unwrap_err()
            .is_not_found());
        let moved = bank
            .reschedule_appointment(&user, appointment.id, at(2024, 3, 4), at(2024, 3, 1))
            .unwrap();
        assert_eq!(moved.scheduled_at, at(2024, 3, 4));

        let cancelled = bank
            .cancel_appointment(&user, appointment.id, Some("travelling"), at(2024, 3, 2))
            .unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert!(cancelled.notes.unwrap().contains("travelling"));
        assert!(bank
            .reschedule_appointment(&admin, appointment.id, at(2024, 3, 5), at(2024, 3, 2))
            .is_err());

        assert_eq!(
            bank.list_appointments(&user, &AppointmentFilter::default())
                .unwrap()
                .len(),
            1
        );
        assert!(bank
            .list_appointments(&stranger, &AppointmentFilter::default())
            .unwrap()
            .is_empty());
    }
}
