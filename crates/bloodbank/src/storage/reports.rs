//! Medical report queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{parsed, ts, Storage};
use crate::error::{Error, Result};
use crate::model::{Attachment, MedicalReport, NewReport};

const REPORT_COLUMNS: &str = "id, donor_id, appointment_id, hemoglobin_g_dl, blood_pressure, \
     pulse_bpm, temperature_c, notes, attachment_name, attachment_type, attachment_size, \
     attachment_checksum, created_at";

fn row_to_report(row: &Row<'_>) -> rusqlite::Result<MedicalReport> {
    let file_name: Option<String> = row.get(8)?;
    let attachment = match file_name {
        Some(file_name) => {
            let size: i64 = row.get(10)?;
            Some(Attachment {
                file_name,
                content_type: row.get(9)?,
                size_bytes: u64::try_from(size).unwrap_or(0),
                checksum: row.get(11)?,
            })
        }
        None => None,
    };

    Ok(MedicalReport {
        id: row.get(0)?,
        donor_id: row.get(1)?,
        appointment_id: row.get(2)?,
        hemoglobin_g_dl: row.get(3)?,
        blood_pressure: row.get(4)?,
        pulse_bpm: row.get(5)?,
        temperature_c: row.get(6)?,
        notes: row.get(7)?,
        attachment,
        created_at: parsed(row, 12)?,
    })
}

impl Storage {
    /// Insert a report and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_report(&self, report: &NewReport, now: DateTime<Utc>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO medical_reports (donor_id, appointment_id, hemoglobin_g_dl,
                                          blood_pressure, pulse_bpm, temperature_c, notes,
                                          created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                report.donor_id,
                report.appointment_id,
                report.hemoglobin_g_dl,
                report.blood_pressure,
                report.pulse_bpm,
                report.temperature_c,
                report.notes,
                ts(&now),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get a report by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_report(&self, id: i64) -> Result<Option<MedicalReport>> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM medical_reports WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], row_to_report).optional()?)
    }

    /// A donor's reports, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn reports_for_donor(&self, donor_id: i64) -> Result<Vec<MedicalReport>> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM medical_reports
             WHERE donor_id = ?1 ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let reports = stmt
            .query_map([donor_id], row_to_report)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reports)
    }

    /// Record (or replace) a report's attachment metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the report does not exist.
    pub fn set_report_attachment(&self, id: i64, attachment: &Attachment) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE medical_reports SET attachment_name = ?1, attachment_type = ?2,
                                        attachment_size = ?3, attachment_checksum = ?4
             WHERE id = ?5",
            params![
                attachment.file_name,
                attachment.content_type,
                i64::try_from(attachment.size_bytes).unwrap_or(i64::MAX),
                attachment.checksum,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(Error::not_found("report", id));
        }
        Ok(())
    }
}
