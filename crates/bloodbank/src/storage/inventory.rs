//! Inventory lots, the movement ledger and request allocations.
//!
//! Lot quantities only change through [`Storage::apply_movement`], which
//! writes the new quantity and its ledger row together. The sum of a lot's
//! movements therefore always equals its units; [`Storage::ledger_mismatches`]
//! reports any lot where that no longer holds.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{parsed, sql_limit, ts, Storage};
use crate::error::{Error, Result};
use crate::model::{
    Allocation, BloodGroup, GroupStock, InventoryLot, LedgerMismatch, LotSource, Movement,
    MovementReason,
};

const LOT_COLUMNS: &str =
    "id, blood_group, units, initial_units, collected_on, expires_on, source_appointment_id, created_at";

const MOVEMENT_COLUMNS: &str = "id, lot_id, delta, reason, request_id, appointment_id, note, at";

/// A change to one lot's quantity, recorded in the ledger.
#[derive(Debug, Clone, Copy)]
pub struct LotChange<'a> {
    /// Lot being changed.
    pub lot_id: i64,
    /// Signed change in units.
    pub delta: i64,
    /// Why the quantity changed.
    pub reason: MovementReason,
    /// Request the units were allocated to or released from.
    pub request_id: Option<i64>,
    /// Appointment that produced the units.
    pub appointment_id: Option<i64>,
    /// Operator note.
    pub note: Option<&'a str>,
}

impl<'a> LotChange<'a> {
    /// A change with no references or note.
    #[must_use]
    pub fn new(lot_id: i64, delta: i64, reason: MovementReason) -> Self {
        Self {
            lot_id,
            delta,
            reason,
            request_id: None,
            appointment_id: None,
            note: None,
        }
    }

    /// Attach the request this change belongs to.
    #[must_use]
    pub fn for_request(mut self, request_id: i64) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Attach an operator note.
    #[must_use]
    pub fn with_note(mut self, note: Option<&'a str>) -> Self {
        self.note = note;
        self
    }
}

fn row_to_lot(row: &Row<'_>) -> rusqlite::Result<InventoryLot> {
    let source_appointment: Option<i64> = row.get(6)?;
    Ok(InventoryLot {
        id: row.get(0)?,
        blood_group: parsed(row, 1)?,
        units: row.get(2)?,
        initial_units: row.get(3)?,
        collected_on: parsed(row, 4)?,
        expires_on: parsed(row, 5)?,
        source: source_appointment.map_or(LotSource::Manual, |appointment_id| {
            LotSource::Donation { appointment_id }
        }),
        created_at: parsed(row, 7)?,
    })
}

fn row_to_movement(row: &Row<'_>) -> rusqlite::Result<Movement> {
    Ok(Movement {
        id: row.get(0)?,
        lot_id: row.get(1)?,
        delta: row.get(2)?,
        reason: parsed(row, 3)?,
        request_id: row.get(4)?,
        appointment_id: row.get(5)?,
        note: row.get(6)?,
        at: parsed(row, 7)?,
    })
}

impl Storage {
    /// Insert a lot and its intake movement, returning the lot id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_lot(
        &self,
        blood_group: BloodGroup,
        units: u32,
        collected_on: NaiveDate,
        expires_on: NaiveDate,
        source: LotSource,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let appointment_id = match source {
            LotSource::Manual => None,
            LotSource::Donation { appointment_id } => Some(appointment_id),
        };

        self.conn.execute(
            "INSERT INTO inventory_lots (blood_group, units, initial_units, collected_on,
                                         expires_on, source_appointment_id, created_at)
             VALUES (?1, 0, ?2, ?3, ?4, ?5, ?6)",
            params![
                blood_group.as_str(),
                units,
                collected_on.to_string(),
                expires_on.to_string(),
                appointment_id,
                ts(&now),
            ],
        )?;
        let lot_id = self.conn.last_insert_rowid();

        let mut intake = LotChange::new(lot_id, i64::from(units), MovementReason::Intake);
        intake.appointment_id = appointment_id;
        self.apply_movement(&intake, now)?;
        Ok(lot_id)
    }

    /// Change a lot's quantity and append the matching ledger row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the lot does not exist, or
    /// [`Error::Conflict`] if the change would take it below zero.
    pub fn apply_movement(&self, change: &LotChange<'_>, now: DateTime<Utc>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE inventory_lots SET units = units + ?1 WHERE id = ?2 AND units + ?1 >= 0",
            params![change.delta, change.lot_id],
        )?;
        if changed == 0 {
            let lot = self
                .get_lot(change.lot_id)?
                .ok_or_else(|| Error::not_found("lot", change.lot_id))?;
            return Err(Error::conflict(format!(
                "lot {} holds {} units, cannot apply {}",
                lot.id, lot.units, change.delta
            )));
        }

        self.conn.execute(
            "INSERT INTO inventory_movements (lot_id, delta, reason, request_id, appointment_id, note, at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                change.lot_id,
                change.delta,
                change.reason.as_str(),
                change.request_id,
                change.appointment_id,
                change.note,
                ts(&now),
            ],
        )?;
        Ok(())
    }

    /// Get a lot by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_lot(&self, id: i64) -> Result<Option<InventoryLot>> {
        let sql = format!("SELECT {LOT_COLUMNS} FROM inventory_lots WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], row_to_lot).optional()?)
    }

    /// List lots, oldest expiry first.
    ///
    /// With `usable_on` set, only lots holding units and not yet expired on
    /// that day are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_lots(
        &self,
        blood_group: Option<BloodGroup>,
        usable_on: Option<NaiveDate>,
    ) -> Result<Vec<InventoryLot>> {
        let sql = format!(
            "SELECT {LOT_COLUMNS} FROM inventory_lots
             WHERE (?1 IS NULL OR blood_group = ?1)
               AND (?2 IS NULL OR (units > 0 AND expires_on >= ?2))
             ORDER BY expires_on, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let lots = stmt
            .query_map(
                params![
                    blood_group.map(BloodGroup::as_str),
                    usable_on.map(|d| d.to_string())
                ],
                row_to_lot,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(lots)
    }

    /// Lots past their expiry on `today` that still hold units.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn expired_lots(&self, today: NaiveDate) -> Result<Vec<InventoryLot>> {
        let sql = format!(
            "SELECT {LOT_COLUMNS} FROM inventory_lots
             WHERE units > 0 AND expires_on < ?1
             ORDER BY expires_on, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let lots = stmt
            .query_map([today.to_string()], row_to_lot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(lots)
    }

    /// Usable units of one group on `today`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn available_units(&self, blood_group: BloodGroup, today: NaiveDate) -> Result<u32> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(SUM(units), 0) FROM inventory_lots
             WHERE blood_group = ?1 AND units > 0 AND expires_on >= ?2",
            params![blood_group.as_str(), today.to_string()],
            |row| row.get(0),
        )?)
    }

    /// Usable stock per group on `today`. Groups with no stock are omitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stock_by_group(&self, today: NaiveDate) -> Result<Vec<GroupStock>> {
        let mut stmt = self.conn.prepare(
            "SELECT blood_group, SUM(units), COUNT(*), MIN(expires_on) FROM inventory_lots
             WHERE units > 0 AND expires_on >= ?1
             GROUP BY blood_group",
        )?;
        let stock = stmt
            .query_map([today.to_string()], |row| {
                Ok(GroupStock {
                    blood_group: parsed(row, 0)?,
                    units: row.get(1)?,
                    lots: row.get(2)?,
                    next_expiry: Some(parsed(row, 3)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stock)
    }

    /// Ledger rows, newest first, optionally for one lot.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_movements(&self, lot_id: Option<i64>, limit: usize) -> Result<Vec<Movement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements
             WHERE (?1 IS NULL OR lot_id = ?1)
             ORDER BY id DESC LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let movements = stmt
            .query_map(params![lot_id, sql_limit(limit)], row_to_movement)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(movements)
    }

    /// Lots whose units differ from the sum of their ledger rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn ledger_mismatches(&self) -> Result<Vec<LedgerMismatch>> {
        let mut stmt = self.conn.prepare(
            "SELECT l.id, l.units, COALESCE(SUM(m.delta), 0) AS ledger
             FROM inventory_lots l
             LEFT JOIN inventory_movements m ON m.lot_id = l.id
             GROUP BY l.id
             HAVING l.units != ledger
             ORDER BY l.id",
        )?;
        let mismatches = stmt
            .query_map([], |row| {
                Ok(LedgerMismatch {
                    lot_id: row.get(0)?,
                    units: row.get(1)?,
                    ledger_units: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(mismatches)
    }

    /// Add units to a request's allocation from one lot.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn add_allocation(&self, request_id: i64, lot_id: i64, units: u32) -> Result<()> {
        self.conn.execute(
            "INSERT INTO allocations (request_id, lot_id, units) VALUES (?1, ?2, ?3)
             ON CONFLICT (request_id, lot_id) DO UPDATE SET units = units + excluded.units",
            params![request_id, lot_id, units],
        )?;
        Ok(())
    }

    /// Allocations held by a request, in lot order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn allocations_for_request(&self, request_id: i64) -> Result<Vec<Allocation>> {
        let mut stmt = self.conn.prepare(
            "SELECT request_id, lot_id, units FROM allocations WHERE request_id = ?1 ORDER BY lot_id",
        )?;
        let allocations = stmt
            .query_map([request_id], |row| {
                Ok(Allocation {
                    request_id: row.get(0)?,
                    lot_id: row.get(1)?,
                    units: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(allocations)
    }

    /// Drop a request's allocation rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn clear_allocations(&self, request_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM allocations WHERE request_id = ?1", [request_id])?;
        Ok(())
    }
}
