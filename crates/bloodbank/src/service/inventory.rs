//! Stock intake, adjustment, expiry and FIFO allocation.

use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::{debug, info, warn};

use super::BloodBank;
use crate::error::{Error, Result};
use crate::model::{
    BloodGroup, GroupStock, InventoryLot, InventorySummary, LedgerMismatch, LotFilter, LotSource,
    Movement, MovementReason, NewLot,
};
use crate::storage::LotChange;

/// Lots and units removed by one expiry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Expired {
    pub lots: u32,
    pub units: u32,
}

impl BloodBank {
    /// Default expiry for a lot collected on `collected_on`.
    pub(crate) fn expiry_for(&self, collected_on: NaiveDate) -> Result<NaiveDate> {
        collected_on
            .checked_add_days(Days::new(u64::from(self.config.donation.shelf_life_days)))
            .ok_or_else(|| Error::validation(format!("collection date {collected_on} out of range")))
    }

    /// Add a manually received lot.
    ///
    /// Without an explicit expiry the lot expires `shelf_life_days` after
    /// collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for zero units, a future collection date
    /// or an expiry before collection.
    pub fn add_lot(&self, new: &NewLot, now: DateTime<Utc>) -> Result<InventoryLot> {
        if new.units == 0 {
            return Err(Error::validation("a lot must hold at least one unit"));
        }
        if new.collected_on > now.date_naive() {
            return Err(Error::validation(format!(
                "collection date {} is in the future",
                new.collected_on
            )));
        }
        let expires_on = match new.expires_on {
            Some(day) => day,
            None => self.expiry_for(new.collected_on)?,
        };
        if expires_on < new.collected_on {
            return Err(Error::validation("expiry date is before collection date"));
        }

        let tx = self.storage.transaction()?;
        let id = self.storage.insert_lot(
            new.blood_group,
            new.units,
            new.collected_on,
            expires_on,
            LotSource::Manual,
            now,
        )?;
        tx.commit()?;

        info!(lot_id = id, blood_group = %new.blood_group, units = new.units, "Added lot");
        self.get_lot(id)
    }

    /// Correct a lot's quantity (breakage, recount).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a zero delta and [`Error::Conflict`]
    /// if the lot would go below zero.
    pub fn adjust_lot(
        &self,
        id: i64,
        delta: i64,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<InventoryLot> {
        if delta == 0 {
            return Err(Error::validation("adjustment must change the quantity"));
        }

        let tx = self.storage.transaction()?;
        self.storage.apply_movement(
            &LotChange::new(id, delta, MovementReason::Adjustment).with_note(note),
            now,
        )?;
        tx.commit()?;

        info!(lot_id = id, delta, "Adjusted lot");
        self.get_lot(id)
    }

    /// Write off every lot that expired before `now`'s date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn expire_lots(&self, now: DateTime<Utc>) -> Result<(u32, u32)> {
        let tx = self.storage.transaction()?;
        let expired = self.expire_lots_in_tx(now)?;
        tx.commit()?;
        Ok((expired.lots, expired.units))
    }

    pub(crate) fn expire_lots_in_tx(&self, now: DateTime<Utc>) -> Result<Expired> {
        let mut expired = Expired::default();
        for lot in self.storage.expired_lots(now.date_naive())? {
            self.storage.apply_movement(
                &LotChange::new(lot.id, -i64::from(lot.units), MovementReason::Expiry),
                now,
            )?;
            debug!(lot_id = lot.id, units = lot.units, "Expired lot");
            expired.lots += 1;
            expired.units += lot.units;
        }
        if expired.lots > 0 {
            info!(lots = expired.lots, units = expired.units, "Expired lots");
        }
        Ok(expired)
    }

    /// Usable units of one group on `today`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn available_units(&self, blood_group: BloodGroup, today: NaiveDate) -> Result<u32> {
        self.storage.available_units(blood_group, today)
    }

    /// Usable stock of every group on `today`, zero rows included.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn inventory_summary(&self, today: NaiveDate) -> Result<InventorySummary> {
        let stock = self.storage.stock_by_group(today)?;
        let groups = BloodGroup::ALL
            .iter()
            .map(|&group| {
                stock
                    .iter()
                    .find(|s| s.blood_group == group)
                    .cloned()
                    .unwrap_or(GroupStock {
                        blood_group: group,
                        units: 0,
                        lots: 0,
                        next_expiry: None,
                    })
            })
            .collect();
        Ok(InventorySummary {
            as_of: today,
            groups,
        })
    }

    /// List lots.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_lots(&self, filter: &LotFilter) -> Result<Vec<InventoryLot>> {
        self.storage.list_lots(filter.blood_group, filter.usable_on)
    }

    /// Get a lot by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the lot does not exist.
    pub fn get_lot(&self, id: i64) -> Result<InventoryLot> {
        self.storage
            .get_lot(id)?
            .ok_or_else(|| Error::not_found("lot", id))
    }

    /// Recent ledger rows, optionally for one lot.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn movements(&self, lot_id: Option<i64>, limit: usize) -> Result<Vec<Movement>> {
        self.storage.list_movements(lot_id, limit)
    }

    /// Lots whose quantity disagrees with their ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn reconcile(&self) -> Result<Vec<LedgerMismatch>> {
        let mismatches = self.storage.ledger_mismatches()?;
        for m in &mismatches {
            warn!(
                lot_id = m.lot_id,
                units = m.units,
                ledger_units = m.ledger_units,
                "Lot disagrees with its ledger"
            );
        }
        Ok(mismatches)
    }

    /// Take up to `units` of `blood_group` for a request, earliest expiry first.
    ///
    /// Only lots usable on `now`'s date are touched. Each lot drawn from gets
    /// an allocation row and an Allocation movement. Returns the units taken,
    /// which is less than asked when stock runs out. Runs inside the caller's
    /// transaction; the request row itself is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn allocate_fifo(
        &self,
        request_id: i64,
        blood_group: BloodGroup,
        units: u32,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        let mut remaining = units;
        for lot in self
            .storage
            .list_lots(Some(blood_group), Some(now.date_naive()))?
        {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(lot.units);
            self.take_from_lot(request_id, lot.id, take, now)?;
            remaining -= take;
        }
        Ok(units - remaining)
    }

    pub(crate) fn take_from_lot(
        &self,
        request_id: i64,
        lot_id: i64,
        units: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.storage.apply_movement(
            &LotChange::new(lot_id, -i64::from(units), MovementReason::Allocation)
                .for_request(request_id),
            now,
        )?;
        self.storage.add_allocation(request_id, lot_id, units)?;
        debug!(request_id, lot_id, units, "Allocated units");
        Ok(())
    }

    /// Return a request's allocated units to their lots. Runs inside the
    /// caller's transaction.
    pub(crate) fn release_allocations(&self, request_id: i64, now: DateTime<Utc>) -> Result<u32> {
        let mut released = 0;
        for allocation in self.storage.allocations_for_request(request_id)? {
            self.storage.apply_movement(
                &LotChange::new(
                    allocation.lot_id,
                    i64::from(allocation.units),
                    MovementReason::Release,
                )
                .for_request(request_id),
                now,
            )?;
            released += allocation.units;
        }
        self.storage.clear_allocations(request_id)?;
        if released > 0 {
            info!(request_id, units = released, "Released allocation");
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    fn lot(bank: &BloodBank, group: BloodGroup, units: u32, collected_on: NaiveDate) -> InventoryLot {
        bank.add_lot(
            &NewLot {
                blood_group: group,
                units,
                collected_on,
                expires_on: None,
            },
            at(2024, 3, 1),
        )
        .unwrap()
    }

    #[test]
    fn test_add_lot_default_expiry() {
        let bank = bank();
        let added = lot(&bank, BloodGroup::APos, 3, date(2024, 2, 1));

        assert_eq!(added.expires_on, date(2024, 3, 14));
        assert_eq!(added.units, 3);
        assert_eq!(added.source, LotSource::Manual);
        assert_eq!(bank.movements(Some(added.id), 10).unwrap().len(), 1);
    }

    #[test]
    fn test_add_lot_validation() {
        let bank = bank();
        let zero = NewLot {
            blood_group: BloodGroup::APos,
            units: 0,
            collected_on: date(2024, 2, 1),
            expires_on: None,
        };
        assert!(bank.add_lot(&zero, at(2024, 3, 1)).is_err());

        let future = NewLot {
            units: 1,
            collected_on: date(2024, 4, 1),
            ..zero.clone()
        };
        assert!(bank.add_lot(&future, at(2024, 3, 1)).is_err());

        let backwards = NewLot {
            units: 1,
            expires_on: Some(date(2024, 1, 1)),
            ..zero
        };
        assert!(bank.add_lot(&backwards, at(2024, 3, 1)).is_err());
    }

    #[test]
    fn test_adjust_lot() {
        let bank = bank();
        let added = lot(&bank, BloodGroup::APos, 3, date(2024, 2, 1));

        let adjusted = bank
            .adjust_lot(added.id, -1, Some("bag damaged"), at(2024, 3, 2))
            .unwrap();
        assert_eq!(adjusted.units, 2);

        assert!(matches!(
            bank.adjust_lot(added.id, -5, None, at(2024, 3, 2)),
            Err(Error::Conflict(_))
        ));
        assert!(bank.adjust_lot(added.id, 0, None, at(2024, 3, 2)).is_err());
        assert!(bank.reconcile().unwrap().is_empty());

        let last = &bank.movements(Some(added.id), 1).unwrap()[0];
        assert_eq!(last.reason, MovementReason::Adjustment);
        assert_eq!(last.note.as_deref(), Some("bag damaged"));
    }

    #[test]
    fn test_fifo_takes_earliest_expiry_first() {
        let bank = bank();
        let late = lot(&bank, BloodGroup::OPos, 2, date(2024, 2, 20));
        let early = lot(&bank, BloodGroup::OPos, 2, date(2024, 2, 1));
        lot(&bank, BloodGroup::ONeg, 9, date(2024, 2, 1));

        let admin = admin(&bank);
        let hospital = hospital(&bank, &admin, "h@example.org");
        let request = bank
            .create_request(
                &hospital,
                &crate::model::NewRequest {
                    hospital_name: "General".to_string(),
                    patient_name: "Pat".to_string(),
                    blood_group: BloodGroup::OPos,
                    units: 3,
                    urgency: crate::model::Urgency::Normal,
                    reason: None,
                },
                at(2024, 3, 1),
            )
            .unwrap();

        let tx = bank.storage.transaction().unwrap();
        let taken = bank
            .allocate_fifo(request.id, BloodGroup::OPos, 3, at(2024, 3, 1))
            .unwrap();
        tx.commit().unwrap();

        assert_eq!(taken, 3);
        assert_eq!(bank.get_lot(early.id).unwrap().units, 0);
        assert_eq!(bank.get_lot(late.id).unwrap().units, 1);
        assert_eq!(
            bank.available_units(BloodGroup::ONeg, date(2024, 3, 1))
                .unwrap(),
            9
        );
        assert!(bank.reconcile().unwrap().is_empty());
    }

    #[test]
    fn test_expire_lots() {
        let bank = bank();
        let old = lot(&bank, BloodGroup::BNeg, 4, date(2024, 1, 1));
        let fresh = lot(&bank, BloodGroup::BNeg, 2, date(2024, 2, 25));

        // collected 2024-01-01, expires 2024-02-12
        let (lots, units) = bank.expire_lots(at(2024, 2, 13)).unwrap();
        assert_eq!((lots, units), (1, 4));
        assert_eq!(bank.get_lot(old.id).unwrap().units, 0);
        assert_eq!(bank.get_lot(fresh.id).unwrap().units, 2);

        assert_eq!(bank.expire_lots(at(2024, 2, 13)).unwrap(), (0, 0));
        assert!(bank.reconcile().unwrap().is_empty());
    }

    #[test]
    fn test_summary_includes_every_group() {
        let bank = bank();
        lot(&bank, BloodGroup::AbPos, 2, date(2024, 2, 20));

        let summary = bank.inventory_summary(date(2024, 3, 1)).unwrap();
        assert_eq!(summary.groups.len(), 8);
        assert_eq!(summary.total_units(), 2);
        assert_eq!(summary.group(BloodGroup::AbPos).unwrap().lots, 1);
        assert_eq!(summary.group(BloodGroup::ONeg).unwrap().units, 0);
    }
}
