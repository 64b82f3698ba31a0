//! Soliciting donors for a request and recording their answers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::BloodBank;
use crate::error::{Error, Result};
use crate::model::{
    Appointment, BloodGroup, Notification, NotificationResponse, RequestStatus, Role, User,
};
use crate::storage::NewAppointmentRow;

/// Result of a donor answering a notification.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseOutcome {
    /// The notification after the answer.
    pub notification: Notification,
    /// Appointment booked by an acceptance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment: Option<Appointment>,
}

impl BloodBank {
    /// Notify eligible donors who can cover a request's shortfall.
    ///
    /// Candidates are available donors of any group that can give to the
    /// request's group, eligible on `now`'s date and not yet notified about
    /// this request. Those who have gone longest without donating come
    /// first, up to `max_donors_notified`. Returns the notifications created
    /// so the caller can dispatch them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the request does not exist and
    /// [`Error::Conflict`] if it is closed or already covered.
    pub fn notify_donors(&self, request_id: i64, now: DateTime<Utc>) -> Result<Vec<Notification>> {
        let tx = self.storage.transaction()?;
        let request = self
            .storage
            .get_request(request_id)?
            .ok_or_else(|| Error::not_found("request", request_id))?;
        if !matches!(
            request.status,
            RequestStatus::Pending | RequestStatus::Approved
        ) {
            return Err(Error::conflict(format!(
                "request {request_id} is {}; donors are only asked for open requests",
                request.status
            )));
        }
        let shortfall = request.shortfall();
        if shortfall == 0 {
            return Err(Error::conflict(format!(
                "request {request_id} is already covered"
            )));
        }

        let today = now.date_naive();
        let limit = usize::try_from(self.config.requests.max_donors_notified).unwrap_or(usize::MAX);
        let already = self.storage.notified_donor_ids(request_id)?;
        let donors: Vec<_> = self
            .storage
            .available_donors_in(&BloodGroup::donors_for(request.blood_group))?
            .into_iter()
            .filter(|d| !already.contains(&d.id))
            .filter(|d| d.eligibility(today, &self.config.donation).eligible)
            .take(limit)
            .collect();

        let title = format!("{} blood needed", request.blood_group);
        let message = format!(
            "{} needs {shortfall} unit(s) of {} blood ({}). \
             Accept with a time that suits you to book a donation.",
            request.hospital_name, request.blood_group, request.urgency
        );

        let mut created = Vec::with_capacity(donors.len());
        for donor in &donors {
            let id = self
                .storage
                .insert_notification(donor.id, Some(request_id), &title, &message, now)?;
            debug!(notification_id = id, donor_id = donor.id, "Notified donor");
            created.push(id);
        }
        tx.commit()?;

        info!(request_id, donors = created.len(), "Solicited donors");
        created
            .into_iter()
            .map(|id| self.get_notification(id))
            .collect()
    }

    fn get_notification(&self, id: i64) -> Result<Notification> {
        self.storage
            .get_notification(id)?
            .ok_or_else(|| Error::not_found("notification", id))
    }

    /// Load a notification addressed to the viewer's donor profile.
    fn own_notification(&self, viewer: &User, id: i64) -> Result<Notification> {
        let notification = self.get_notification(id)?;
        if viewer.is_admin() {
            return Ok(notification);
        }
        let donor = self.donor_for_user(viewer.id)?;
        if notification.donor_id == donor.id {
            Ok(notification)
        } else {
            Err(Error::not_found("notification", id))
        }
    }

    /// Record a donor's answer to a notification.
    ///
    /// Accepting requires `scheduled_at` and books a Scheduled appointment
    /// linked to the notification and its request. A "maybe" can later be
    /// changed; accept and decline are final.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the notification is not the donor's,
    /// [`Error::Conflict`] if it was already answered or an acceptance
    /// names a request that has since closed, and
    /// [`Error::Validation`] for a missing or unacceptable time.
    pub fn respond(
        &self,
        donor_user: &User,
        notification_id: i64,
        response: NotificationResponse,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<ResponseOutcome> {
        if donor_user.role != Role::Donor {
            return Err(Error::forbidden("only donors answer notifications"));
        }
        let donor = self.donor_for_user(donor_user.id)?;

        let tx = self.storage.transaction()?;
        let notification = self.own_notification(donor_user, notification_id)?;
        if !notification.accepts_response() {
            return Err(Error::conflict(format!(
                "notification {notification_id} was already answered"
            )));
        }

        let appointment_id = if response == NotificationResponse::Accept {
            let at = scheduled_at.ok_or_else(|| {
                Error::validation("accepting requires a time for the appointment")
            })?;
            if let Some(request_id) = notification.request_id {
                self.ensure_request_open(request_id)?;
            }
            self.check_slot(&donor, at, now, None)?;
            Some(self.storage.insert_appointment(
                &NewAppointmentRow {
                    donor_id: donor.id,
                    request_id: notification.request_id,
                    notification_id: Some(notification_id),
                    notes: None,
                },
                at,
                now,
            )?)
        } else {
            None
        };

        self.storage
            .set_notification_response(notification_id, response, now)?;
        tx.commit()?;

        info!(
            notification_id,
            donor_id = donor.id,
            response = %response,
            "Donor responded"
        );
        Ok(ResponseOutcome {
            notification: self.get_notification(notification_id)?,
            appointment: appointment_id
                .map(|id| self.get_appointment(id))
                .transpose()?,
        })
    }

    /// Mark one of the viewer's notifications read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the notification is not the viewer's.
    pub fn mark_read(&self, viewer: &User, id: i64, now: DateTime<Utc>) -> Result<Notification> {
        self.own_notification(viewer, id)?;
        self.storage.mark_notification_read(id, now)?;
        self.get_notification(id)
    }

    /// List notifications: a donor's own, or for admins any donor's or all.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] for hospital accounts.
    pub fn list_notifications(
        &self,
        viewer: &User,
        donor_id: Option<i64>,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let donor_id = match viewer.role {
            Role::Admin => donor_id,
            Role::Donor => Some(self.donor_for_user(viewer.id)?.id),
            Role::Hospital => {
                return Err(Error::forbidden("hospital accounts have no notifications"))
            }
        };
        self.storage
            .list_notifications(donor_id, None, unread_only)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::model::{AppointmentFilter, AppointmentStatus, NewRequest, Urgency};
    use chrono::TimeDelta;

    fn open_request(bank: &BloodBank, admin: &User, group: BloodGroup) -> i64 {
        let hospital = hospital(bank, admin, &format!("h{}@example.org", uuid::Uuid::new_v4().simple()));
        let request = bank
            .create_request(
                &hospital,
                &NewRequest {
                    hospital_name: "General Hospital".to_string(),
                    patient_name: "Pat Jones".to_string(),
                    blood_group: group,
                    units: 2,
                    urgency: Urgency::Critical,
                    reason: None,
                },
                at(2024, 3, 1),
            )
            .unwrap();
        bank.approve_request(admin, request.id, at(2024, 3, 1), false)
            .unwrap();
        request.id
    }

    #[test]
    fn test_notify_orders_and_skips() {
        let bank = bank();
        let admin = admin(&bank);

        let mut recent = new_donor("Recent Giver", BloodGroup::ONeg);
        recent.last_donation_on = Some(date(2023, 11, 1));
        let recent = bank.register_donor(&recent, at(2024, 1, 1)).unwrap();
        let mut long_ago = new_donor("Long Ago", BloodGroup::APos);
        long_ago.last_donation_on = Some(date(2022, 5, 1));
        let long_ago = bank.register_donor(&long_ago, at(2024, 1, 1)).unwrap();
        let mut too_soon = new_donor("Too Soon", BloodGroup::APos);
        too_soon.last_donation_on = Some(date(2024, 2, 1));
        bank.register_donor(&too_soon, at(2024, 2, 2)).unwrap();
        donor(&bank, "Wrong Group", BloodGroup::BPos);

        let request = open_request(&bank, &admin, BloodGroup::APos);
        let sent = bank.notify_donors(request, at(2024, 3, 1)).unwrap();
        let donors: Vec<i64> = sent.iter().map(|n| n.donor_id).collect();
        assert_eq!(donors, vec![long_ago.id, recent.id]);
        assert!(sent[0].title.contains("A+"));

        // Nobody is asked twice
        assert!(bank.notify_donors(request, at(2024, 3, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_notify_respects_limit() {
        let mut bank = bank();
        bank.config.requests.max_donors_notified = 2;
        let admin = admin(&bank);
        for name in ["One Donor", "Two Donor", "Three Donor"] {
            donor(&bank, name, BloodGroup::ONeg);
        }

        let request = open_request(&bank, &admin, BloodGroup::ONeg);
        assert_eq!(bank.notify_donors(request, at(2024, 3, 1)).unwrap().len(), 2);
        assert_eq!(bank.notify_donors(request, at(2024, 3, 1)).unwrap().len(), 1);
    }

    #[test]
    fn test_notify_closed_request() {
        let bank = bank();
        let admin = admin(&bank);
        let request = open_request(&bank, &admin, BloodGroup::ONeg);
        bank.reject_request(&admin, request, None, at(2024, 3, 1))
            .unwrap();

        assert!(matches!(
            bank.notify_donors(request, at(2024, 3, 1)),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_accept_books_appointment() {
        let bank = bank();
        let admin = admin(&bank);
        let (user, donor) = donor_account(&bank, "d@example.org", BloodGroup::ONeg);
        let request = open_request(&bank, &admin, BloodGroup::ONeg);
        let notification = bank.notify_donors(request, at(2024, 3, 1)).unwrap()[0].clone();

        // Accepting needs a time
        assert!(matches!(
            bank.respond(&user, notification.id, NotificationResponse::Accept, None, at(2024, 3, 1)),
            Err(Error::Validation(_))
        ));

        let slot = at(2024, 3, 3);
        let outcome = bank
            .respond(
                &user,
                notification.id,
                NotificationResponse::Accept,
                Some(slot),
                at(2024, 3, 1),
            )
            .unwrap();
        let appointment = outcome.appointment.unwrap();
        assert_eq!(appointment.donor_id, donor.id);
        assert_eq!(appointment.request_id, Some(request));
        assert_eq!(appointment.notification_id, Some(notification.id));
        assert_eq!(appointment.status, AppointmentStatus::Scheduled);
        assert_eq!(outcome.notification.response, Some(NotificationResponse::Accept));

        assert!(matches!(
            bank.respond(&user, notification.id, NotificationResponse::Decline, None, at(2024, 3, 1)),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_accept_after_request_closed() {
        let bank = bank();
        let admin = admin(&bank);
        let (user, _) = donor_account(&bank, "d@example.org", BloodGroup::ONeg);
        let request = open_request(&bank, &admin, BloodGroup::ONeg);
        let notification = bank.notify_donors(request, at(2024, 3, 1)).unwrap()[0].clone();
        bank.reject_request(&admin, request, Some("patient transferred"), at(2024, 3, 2))
            .unwrap();

        assert!(matches!(
            bank.respond(
                &user,
                notification.id,
                NotificationResponse::Accept,
                Some(at(2024, 3, 3)),
                at(2024, 3, 2),
            ),
            Err(Error::Conflict(_))
        ));
        assert!(bank
            .list_appointments(&admin, &AppointmentFilter::default())
            .unwrap()
            .is_empty());

        // Nothing was recorded, so a decline still goes through
        let declined = bank
            .respond(&user, notification.id, NotificationResponse::Decline, None, at(2024, 3, 2))
            .unwrap();
        assert_eq!(declined.notification.response, Some(NotificationResponse::Decline));
    }

    #[test]
    fn test_maybe_then_decline() {
        let bank = bank();
        let admin = admin(&bank);
        let (user, _) = donor_account(&bank, "d@example.org", BloodGroup::ONeg);
        let request = open_request(&bank, &admin, BloodGroup::ONeg);
        let id = bank.notify_donors(request, at(2024, 3, 1)).unwrap()[0].id;

        let maybe = bank
            .respond(&user, id, NotificationResponse::Maybe, None, at(2024, 3, 1))
            .unwrap();
        assert!(maybe.appointment.is_none());
        assert!(maybe.notification.read_at.is_some());

        let declined = bank
            .respond(&user, id, NotificationResponse::Decline, None, at(2024, 3, 1))
            .unwrap();
        assert_eq!(declined.notification.response, Some(NotificationResponse::Decline));
    }

    #[test]
    fn test_accept_rejects_bad_slots() {
        let bank = bank();
        let admin = admin(&bank);
        let (user, _) = donor_account(&bank, "d@example.org", BloodGroup::ONeg);
        let request = open_request(&bank, &admin, BloodGroup::ONeg);
        let id = bank.notify_donors(request, at(2024, 3, 1)).unwrap()[0].id;

        for slot in [at(2024, 2, 28), at(2024, 3, 1) + TimeDelta::days(31)] {
            assert!(matches!(
                bank.respond(&user, id, NotificationResponse::Accept, Some(slot), at(2024, 3, 1)),
                Err(Error::Validation(_))
            ));
        }
    }

    #[test]
    fn test_notifications_are_private() {
        let bank = bank();
        let admin = admin(&bank);
        let (owner, _) = donor_account(&bank, "owner@example.org", BloodGroup::ONeg);
        let (stranger, _) = donor_account(&bank, "stranger@example.org", BloodGroup::ONeg);
        let request = open_request(&bank, &admin, BloodGroup::ONeg);
        let sent = bank.notify_donors(request, at(2024, 3, 1)).unwrap();
        let owner_donor = bank.donor_for_user(owner.id).unwrap();
        let mine = sent.iter().find(|n| n.donor_id == owner_donor.id).unwrap();

        assert!(bank
            .mark_read(&stranger, mine.id, at(2024, 3, 1))
            .unwrap_err()
            .is_not_found());
        let read = bank.mark_read(&owner, mine.id, at(2024, 3, 1)).unwrap();
        assert!(read.read_at.is_some());

        assert_eq!(bank.list_notifications(&owner, None, false).unwrap().len(), 1);
        assert!(bank.list_notifications(&owner, None, true).unwrap().is_empty());
        assert_eq!(bank.list_notifications(&admin, None, false).unwrap().len(), 2);
    }
}
