//! Blood requests: creation, approval with FIFO allocation, and closing.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::info;

use super::{require_admin, require_role, BloodBank};
use crate::error::{Error, Result};
use crate::model::{
    BloodRequest, NewRequest, Notification, RequestFilter, RequestStatus, Role, User,
};
use crate::validation::{validate_name, validate_organisation};

/// Result of approving a request.
#[derive(Debug, Clone, Serialize)]
pub struct Approval {
    /// The request after approval.
    pub request: BloodRequest,
    /// Units taken from stock by this approval.
    pub allocated_now: u32,
    /// Donors solicited for the remaining shortfall.
    pub notifications: Vec<Notification>,
}

impl BloodBank {
    fn pickup_deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + TimeDelta::hours(i64::from(self.config.requests.pickup_window_hours))
    }

    /// Move a request to Fulfilled once its allocation covers it.
    pub(crate) fn settle_if_covered(&self, request: &mut BloodRequest, now: DateTime<Utc>) {
        if request.is_fully_allocated() && request.status.can_transition_to(RequestStatus::Fulfilled)
        {
            request.status = RequestStatus::Fulfilled;
            request.pickup_deadline = Some(self.pickup_deadline(now));
        }
    }

    /// File a request for blood.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] for donor accounts and
    /// [`Error::Validation`] for bad names or a unit count outside
    /// `1..=max_units_per_request`.
    pub fn create_request(
        &self,
        requester: &User,
        new: &NewRequest,
        now: DateTime<Utc>,
    ) -> Result<BloodRequest> {
        require_role(requester, &[Role::Hospital, Role::Admin])?;
        validate_organisation(&new.hospital_name)?;
        validate_name(&new.patient_name)?;

        let max = self.config.requests.max_units_per_request;
        if !(1..=max).contains(&new.units) {
            return Err(Error::validation(format!(
                "units must be between 1 and {max}, got {}",
                new.units
            )));
        }

        let id = self.storage.insert_request(requester.id, new, now)?;
        info!(
            request_id = id,
            blood_group = %new.blood_group,
            units = new.units,
            urgency = %new.urgency,
            "Request created"
        );
        self.storage
            .get_request(id)?
            .ok_or_else(|| Error::not_found("request", id))
    }

    fn load_request(&self, id: i64) -> Result<BloodRequest> {
        self.storage
            .get_request(id)?
            .ok_or_else(|| Error::not_found("request", id))
    }

    /// Get a request the viewer may see.
    ///
    /// Hospitals see their own requests, donors the ones they were asked to
    /// give for, admins all of them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the request does not exist or is not
    /// visible to the viewer.
    pub fn get_request(&self, viewer: &User, id: i64) -> Result<BloodRequest> {
        let request = self.load_request(id)?;
        let visible = match viewer.role {
            Role::Admin => true,
            Role::Hospital => request.requester_id == viewer.id,
            Role::Donor => match self.storage.get_donor_by_user(viewer.id)? {
                Some(donor) => self.storage.notified_donor_ids(id)?.contains(&donor.id),
                None => false,
            },
        };
        if visible {
            Ok(request)
        } else {
            Err(Error::not_found("request", id))
        }
    }

    /// List requests visible to the viewer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] for donor accounts.
    pub fn list_requests(&self, viewer: &User, filter: &RequestFilter) -> Result<Vec<BloodRequest>> {
        require_role(viewer, &[Role::Hospital, Role::Admin])?;
        let mut filter = filter.clone();
        if viewer.role == Role::Hospital {
            filter.requester_id = Some(viewer.id);
        }
        self.storage.list_requests(&filter)
    }

    /// Approve a pending request and allocate stock to it.
    ///
    /// Units are taken FIFO from the request's group. A fully covered request
    /// becomes Fulfilled with a pickup deadline; otherwise it stays Approved
    /// and, with `notify_donors`, compatible donors are solicited for the
    /// shortfall.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] unless `admin` is an admin and
    /// [`Error::InvalidTransition`] unless the request is pending.
    pub fn approve_request(
        &self,
        admin: &User,
        id: i64,
        now: DateTime<Utc>,
        notify_donors: bool,
    ) -> Result<Approval> {
        require_admin(admin)?;

        let tx = self.storage.transaction()?;
        let mut request = self.load_request(id)?;
        if request.status != RequestStatus::Pending {
            return Err(Error::invalid_transition(
                "request",
                request.status,
                RequestStatus::Approved,
            ));
        }

        let allocated_now =
            self.allocate_fifo(id, request.blood_group, request.shortfall(), now)?;
        request.units_allocated += allocated_now;
        request.status = RequestStatus::Approved;
        request.approved_by = Some(admin.id);
        request.approved_at = Some(now);
        request.updated_at = now;
        self.settle_if_covered(&mut request, now);
        self.storage.update_request(&request)?;
        tx.commit()?;

        info!(
            request_id = id,
            admin_id = admin.id,
            allocated = allocated_now,
            shortfall = request.shortfall(),
            status = %request.status,
            "Request approved"
        );

        let notifications = if notify_donors && request.shortfall() > 0 {
            self.notify_donors(id, now)?
        } else {
            Vec::new()
        };

        Ok(Approval {
            request,
            allocated_now,
            notifications,
        })
    }

    /// Reject a pending or approved request, returning any allocated units.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] unless `admin` is an admin and
    /// [`Error::InvalidTransition`] from any other status.
    pub fn reject_request(
        &self,
        admin: &User,
        id: i64,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BloodRequest> {
        require_admin(admin)?;
        let request = self.close_request(id, RequestStatus::Rejected, reason, now)?;
        info!(request_id = id, admin_id = admin.id, "Request rejected");
        Ok(request)
    }

    /// Record that the hospital picked up a fulfilled request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] unless the actor is an admin or the
    /// requesting hospital, and [`Error::InvalidTransition`] unless the
    /// request is fulfilled.
    pub fn mark_collected(&self, actor: &User, id: i64, now: DateTime<Utc>) -> Result<BloodRequest> {
        let tx = self.storage.transaction()?;
        let mut request = self.load_request(id)?;
        if !(actor.is_admin() || (actor.is_active() && actor.id == request.requester_id)) {
            return Err(Error::forbidden("only the requester or an admin can confirm pickup"));
        }
        if !request.status.can_transition_to(RequestStatus::Collected) {
            return Err(Error::invalid_transition(
                "request",
                request.status,
                RequestStatus::Collected,
            ));
        }

        request.status = RequestStatus::Collected;
        request.pickup_deadline = None;
        request.updated_at = now;
        self.storage.update_request(&request)?;
        tx.commit()?;

        info!(request_id = id, units = request.units_allocated, "Request collected");
        Ok(request)
    }

    /// Mark an approved or fulfilled request as not picked up, returning its units.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] unless `admin` is an admin and
    /// [`Error::InvalidTransition`] from any other status.
    pub fn mark_no_show(&self, admin: &User, id: i64, now: DateTime<Utc>) -> Result<BloodRequest> {
        require_admin(admin)?;
        let request = self.close_request(id, RequestStatus::NoShow, None, now)?;
        info!(request_id = id, "Request marked no-show");
        Ok(request)
    }

    fn close_request(
        &self,
        id: i64,
        to: RequestStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BloodRequest> {
        let tx = self.storage.transaction()?;
        let request = self.close_request_in_tx(id, to, reason, now)?;
        tx.commit()?;
        Ok(request)
    }

    pub(crate) fn close_request_in_tx(
        &self,
        id: i64,
        to: RequestStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BloodRequest> {
        let mut request = self.load_request(id)?;
        if !request.status.can_transition_to(to) {
            return Err(Error::invalid_transition("request", request.status, to));
        }

        self.release_allocations(id, now)?;
        request.units_allocated = 0;
        request.status = to;
        request.pickup_deadline = None;
        request.updated_at = now;
        if let Some(reason) = reason {
            request.reason = Some(reason.to_string());
        }
        self.storage.update_request(&request)?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::model::{BloodGroup, NewLot, Urgency};

    fn new_request(group: BloodGroup, units: u32) -> NewRequest {
        NewRequest {
            hospital_name: "General Hospital".to_string(),
            patient_name: "Pat Jones".to_string(),
            blood_group: group,
            units,
            urgency: Urgency::Urgent,
            reason: None,
        }
    }

    fn stock(bank: &BloodBank, group: BloodGroup, units: u32) -> i64 {
        bank.add_lot(
            &NewLot {
                blood_group: group,
                units,
                collected_on: date(2024, 2, 20),
                expires_on: None,
            },
            at(2024, 3, 1),
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_create_request_rules() {
        let bank = bank();
        let admin = admin(&bank);
        let hospital = hospital(&bank, &admin, "h@example.org");
        let (donor_user, _) = donor_account(&bank, "d@example.org", BloodGroup::APos);

        let request = bank
            .create_request(&hospital, &new_request(BloodGroup::APos, 2), at(2024, 3, 1))
            .unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.requester_id, hospital.id);

        assert!(matches!(
            bank.create_request(&donor_user, &new_request(BloodGroup::APos, 2), at(2024, 3, 1)),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            bank.create_request(&hospital, &new_request(BloodGroup::APos, 0), at(2024, 3, 1)),
            Err(Error::Validation(_))
        ));
        assert!(bank
            .create_request(&hospital, &new_request(BloodGroup::APos, 21), at(2024, 3, 1))
            .is_err());
    }

    #[test]
    fn test_full_approval_fulfils() {
        let bank = bank();
        let admin = admin(&bank);
        let hospital = hospital(&bank, &admin, "h@example.org");
        stock(&bank, BloodGroup::APos, 5);
        let request = bank
            .create_request(&hospital, &new_request(BloodGroup::APos, 3), at(2024, 3, 1))
            .unwrap();

        let approval = bank
            .approve_request(&admin, request.id, at(2024, 3, 1), true)
            .unwrap();
        assert_eq!(approval.allocated_now, 3);
        assert_eq!(approval.request.status, RequestStatus::Fulfilled);
        assert_eq!(
            approval.request.pickup_deadline,
            Some(at(2024, 3, 1) + TimeDelta::hours(48))
        );
        assert!(approval.notifications.is_empty());
        assert_eq!(
            bank.available_units(BloodGroup::APos, date(2024, 3, 1))
                .unwrap(),
            2
        );

        let again = bank.approve_request(&admin, request.id, at(2024, 3, 1), false);
        assert!(matches!(again, Err(Error::InvalidTransition { .. })));
    }

    #[test]
    fn test_partial_approval_solicits_donors() {
        let bank = bank();
        let admin = admin(&bank);
        let hospital = hospital(&bank, &admin, "h@example.org");
        stock(&bank, BloodGroup::ONeg, 1);
        let universal = donor(&bank, "Olive Neg", BloodGroup::ONeg);
        donor(&bank, "Abe Pos", BloodGroup::AbPos);
        let request = bank
            .create_request(&hospital, &new_request(BloodGroup::ONeg, 3), at(2024, 3, 1))
            .unwrap();

        let approval = bank
            .approve_request(&admin, request.id, at(2024, 3, 1), true)
            .unwrap();
        assert_eq!(approval.request.status, RequestStatus::Approved);
        assert_eq!(approval.request.units_allocated, 1);
        assert_eq!(approval.request.shortfall(), 2);
        assert_eq!(approval.notifications.len(), 1);
        assert_eq!(approval.notifications[0].donor_id, universal.id);
    }

    #[test]
    fn test_reject_releases_units() {
        let bank = bank();
        let admin = admin(&bank);
        let hospital = hospital(&bank, &admin, "h@example.org");
        let lot = stock(&bank, BloodGroup::BPos, 2);
        let request = bank
            .create_request(&hospital, &new_request(BloodGroup::BPos, 4), at(2024, 3, 1))
            .unwrap();
        bank.approve_request(&admin, request.id, at(2024, 3, 1), false)
            .unwrap();
        assert_eq!(bank.get_lot(lot).unwrap().units, 0);

        let rejected = bank
            .reject_request(&admin, request.id, Some("patient transferred"), at(2024, 3, 2))
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.units_allocated, 0);
        assert_eq!(rejected.reason.as_deref(), Some("patient transferred"));
        assert_eq!(bank.get_lot(lot).unwrap().units, 2);
        assert!(bank.reconcile().unwrap().is_empty());
    }

    #[test]
    fn test_collect_and_no_show() {
        let bank = bank();
        let admin = admin(&bank);
        let requester = hospital(&bank, &admin, "h@example.org");
        let other = hospital(&bank, &admin, "other@example.org");
        let lot = stock(&bank, BloodGroup::APos, 4);

        let first = bank
            .create_request(&requester, &new_request(BloodGroup::APos, 2), at(2024, 3, 1))
            .unwrap();
        bank.approve_request(&admin, first.id, at(2024, 3, 1), false)
            .unwrap();
        assert!(matches!(
            bank.mark_collected(&other, first.id, at(2024, 3, 2)),
            Err(Error::Forbidden(_))
        ));
        let collected = bank.mark_collected(&requester, first.id, at(2024, 3, 2)).unwrap();
        assert_eq!(collected.status, RequestStatus::Collected);
        assert!(bank
            .mark_no_show(&admin, first.id, at(2024, 3, 2))
            .is_err());

        let second = bank
            .create_request(&requester, &new_request(BloodGroup::APos, 2), at(2024, 3, 1))
            .unwrap();
        assert!(bank
            .mark_collected(&requester, second.id, at(2024, 3, 2))
            .is_err());
        bank.approve_request(&admin, second.id, at(2024, 3, 1), false)
            .unwrap();
        let no_show = bank.mark_no_show(&admin, second.id, at(2024, 3, 4)).unwrap();
        assert_eq!(no_show.status, RequestStatus::NoShow);
        assert_eq!(bank.get_lot(lot).unwrap().units, 2);
    }

    #[test]
    fn test_visibility() {
        let bank = bank();
        let admin = admin(&bank);
        let requester = hospital(&bank, &admin, "h@example.org");
        let other = hospital(&bank, &admin, "other@example.org");
        let (donor_user, _) = donor_account(&bank, "d@example.org", BloodGroup::APos);
        let request = bank
            .create_request(&requester, &new_request(BloodGroup::APos, 1), at(2024, 3, 1))
            .unwrap();

        assert!(bank.get_request(&requester, request.id).is_ok());
        assert!(bank.get_request(&admin, request.id).is_ok());
        assert!(bank.get_request(&other, request.id).unwrap_err().is_not_found());
        assert!(bank.get_request(&donor_user, request.id).is_err());

        assert_eq!(
            bank.list_requests(&requester, &RequestFilter::default())
                .unwrap()
                .len(),
            1
        );
        assert!(bank
            .list_requests(&other, &RequestFilter::default())
            .unwrap()
            .is_empty());
        assert!(matches!(
            bank.list_requests(&donor_user, &RequestFilter::default()),
            Err(Error::Forbidden(_))
        ));
    }
}
