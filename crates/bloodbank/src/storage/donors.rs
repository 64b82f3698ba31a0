//! Donor queries.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{parsed, parsed_opt, ts, Storage};
use crate::error::{Error, Result};
use crate::model::{BloodGroup, Donor, NewDonor};

const DONOR_COLUMNS: &str = "id, user_id, name, email, phone, blood_group, date_of_birth, \
     weight_kg, city, last_donation_on, is_available, created_at";

fn row_to_donor(row: &Row<'_>) -> rusqlite::Result<Donor> {
    Ok(Donor {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        blood_group: parsed(row, 5)?,
        date_of_birth: parsed(row, 6)?,
        weight_kg: row.get(7)?,
        city: row.get(8)?,
        last_donation_on: parsed_opt(row, 9)?,
        is_available: row.get(10)?,
        created_at: parsed(row, 11)?,
    })
}

impl Storage {
    /// Insert a donor profile and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the account already has a profile.
    pub fn insert_donor(&self, donor: &NewDonor, now: DateTime<Utc>) -> Result<i64> {
        if let Some(user_id) = donor.user_id {
            if self.get_donor_by_user(user_id)?.is_some() {
                return Err(Error::conflict(format!(
                    "user {user_id} already has a donor profile"
                )));
            }
        }

        self.conn.execute(
            "INSERT INTO donors (user_id, name, email, phone, blood_group, date_of_birth,
                                 weight_kg, city, last_donation_on, is_available, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10)",
            params![
                donor.user_id,
                donor.name,
                donor.email,
                donor.phone,
                donor.blood_group.as_str(),
                donor.date_of_birth.to_string(),
                donor.weight_kg,
                donor.city,
                donor.last_donation_on.map(|d| d.to_string()),
                ts(&now),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get a donor by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_donor(&self, id: i64) -> Result<Option<Donor>> {
        let sql = format!("SELECT {DONOR_COLUMNS} FROM donors WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], row_to_donor).optional()?)
    }

    /// Get the donor profile linked to an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_donor_by_user(&self, user_id: i64) -> Result<Option<Donor>> {
        let sql = format!("SELECT {DONOR_COLUMNS} FROM donors WHERE user_id = ?1");
        Ok(self.conn.query_row(&sql, [user_id], row_to_donor).optional()?)
    }

    /// List donors matching the given column filters, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_donors(
        &self,
        blood_group: Option<BloodGroup>,
        available: Option<bool>,
        city: Option<&str>,
    ) -> Result<Vec<Donor>> {
        let sql = format!(
            "SELECT {DONOR_COLUMNS} FROM donors
             WHERE (?1 IS NULL OR blood_group = ?1)
               AND (?2 IS NULL OR is_available = ?2)
               AND (?3 IS NULL OR city = ?3 COLLATE NOCASE)
             ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let donors = stmt
            .query_map(
                params![blood_group.map(BloodGroup::as_str), available, city],
                row_to_donor,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(donors)
    }

    /// Available donors whose group is one of `groups`, longest since their
    /// last donation first (never-donated donors lead).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn available_donors_in(&self, groups: &[BloodGroup]) -> Result<Vec<Donor>> {
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; groups.len()].join(", ");
        let sql = format!(
            "SELECT {DONOR_COLUMNS} FROM donors
             WHERE is_available = 1 AND blood_group IN ({placeholders})
             ORDER BY last_donation_on IS NOT NULL, last_donation_on, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let donors = stmt
            .query_map(params_from_iter(groups.iter().map(|g| g.as_str())), row_to_donor)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(donors)
    }

    /// Write back the mutable fields of a donor profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the donor does not exist.
    pub fn update_donor(&self, donor: &Donor) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE donors SET name = ?1, email = ?2, phone = ?3, weight_kg = ?4, city = ?5,
                               last_donation_on = ?6, is_available = ?7
             WHERE id = ?8",
            params![
                donor.name,
                donor.email,
                donor.phone,
                donor.weight_kg,
                donor.city,
                donor.last_donation_on.map(|d| d.to_string()),
                donor.is_available,
                donor.id,
            ],
        )?;
        if changed == 0 {
            return Err(Error::not_found("donor", donor.id));
        }
        Ok(())
    }

    /// Record a donation day on a donor profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the donor does not exist.
    pub fn set_last_donation(&self, donor_id: i64, day: NaiveDate) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE donors SET last_donation_on = ?1 WHERE id = ?2",
            params![day.to_string(), donor_id],
        )?;
        if changed == 0 {
            return Err(Error::not_found("donor", donor_id));
        }
        Ok(())
    }

    /// Ids of donors already notified about a request.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn notified_donor_ids(&self, request_id: i64) -> Result<HashSet<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT donor_id FROM notifications WHERE request_id = ?1")?;
        let ids = stmt
            .query_map([request_id], |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<i64>>>()?;
        Ok(ids)
    }
}
