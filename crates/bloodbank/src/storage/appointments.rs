//! Appointment queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{parsed, ts, Storage};
use crate::error::{Error, Result};
use crate::model::{Appointment, AppointmentFilter, AppointmentStatus};

const APPOINTMENT_COLUMNS: &str = "id, donor_id, request_id, notification_id, scheduled_at, \
     status, units_collected, notes, created_at, updated_at";

fn row_to_appointment(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: row.get(0)?,
        donor_id: row.get(1)?,
        request_id: row.get(2)?,
        notification_id: row.get(3)?,
        scheduled_at: parsed(row, 4)?,
        status: parsed(row, 5)?,
        units_collected: row.get(6)?,
        notes: row.get(7)?,
        created_at: parsed(row, 8)?,
        updated_at: parsed(row, 9)?,
    })
}

/// Fields of a new appointment.
#[derive(Debug, Clone, Default)]
pub struct NewAppointmentRow<'a> {
    /// Donor attending.
    pub donor_id: i64,
    /// Request the donation is for.
    pub request_id: Option<i64>,
    /// Notification the donor accepted.
    pub notification_id: Option<i64>,
    /// Free-form notes.
    pub notes: Option<&'a str>,
}

impl Storage {
    /// Insert a scheduled appointment and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_appointment(
        &self,
        row: &NewAppointmentRow<'_>,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let now = ts(&now);
        self.conn.execute(
            "INSERT INTO appointments (donor_id, request_id, notification_id, scheduled_at,
                                       status, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                row.donor_id,
                row.request_id,
                row.notification_id,
                ts(&scheduled_at),
                AppointmentStatus::Scheduled.as_str(),
                row.notes,
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get an appointment by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_appointment(&self, id: i64) -> Result<Option<Appointment>> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [id], row_to_appointment)
            .optional()?)
    }

    /// List appointments in schedule order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE (?1 IS NULL OR donor_id = ?1)
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR request_id = ?3)
             ORDER BY scheduled_at, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let appointments = stmt
            .query_map(
                params![
                    filter.donor_id,
                    filter.status.map(AppointmentStatus::as_str),
                    filter.request_id,
                ],
                row_to_appointment,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(appointments)
    }

    /// Write back an appointment's mutable fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the appointment does not exist.
    pub fn update_appointment(&self, appointment: &Appointment) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE appointments SET scheduled_at = ?1, status = ?2, units_collected = ?3,
                                     notes = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                ts(&appointment.scheduled_at),
                appointment.status.as_str(),
                appointment.units_collected,
                appointment.notes,
                ts(&appointment.updated_at),
                appointment.id,
            ],
        )?;
        if changed == 0 {
            return Err(Error::not_found("appointment", appointment.id));
        }
        Ok(())
    }

    /// Scheduled or confirmed appointments whose slot started before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stale_appointments(&self, cutoff: DateTime<Utc>) -> Result<Vec<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE status IN (?1, ?2) AND scheduled_at < ?3
             ORDER BY scheduled_at, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let appointments = stmt
            .query_map(
                params![
                    AppointmentStatus::Scheduled.as_str(),
                    AppointmentStatus::Confirmed.as_str(),
                    ts(&cutoff),
                ],
                row_to_appointment,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(appointments)
    }

    /// Whether the donor holds an appointment that is not finished.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn has_open_appointment(&self, donor_id: i64, except: Option<i64>) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM appointments
                 WHERE donor_id = ?1 AND status IN (?2, ?3, ?4) AND (?5 IS NULL OR id != ?5)
                 LIMIT 1",
                params![
                    donor_id,
                    AppointmentStatus::Scheduled.as_str(),
                    AppointmentStatus::Confirmed.as_str(),
                    AppointmentStatus::InProgress.as_str(),
                    except,
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Number of appointments in each status, for every status that has any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn appointment_counts(&self) -> Result<Vec<(AppointmentStatus, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM appointments GROUP BY status ORDER BY status",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((parsed(row, 0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }
}
