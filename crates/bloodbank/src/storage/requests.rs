//! Blood request queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{parsed, parsed_opt, ts, Storage};
use crate::error::{Error, Result};
use crate::model::{BloodGroup, BloodRequest, NewRequest, RequestFilter, RequestStatus};

const REQUEST_COLUMNS: &str = "id, requester_id, hospital_name, patient_name, blood_group, \
     units_requested, units_allocated, urgency, status, reason, approved_by, approved_at, \
     pickup_deadline, created_at, updated_at";

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<BloodRequest> {
    Ok(BloodRequest {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        hospital_name: row.get(2)?,
        patient_name: row.get(3)?,
        blood_group: parsed(row, 4)?,
        units_requested: row.get(5)?,
        units_allocated: row.get(6)?,
        urgency: parsed(row, 7)?,
        status: parsed(row, 8)?,
        reason: row.get(9)?,
        approved_by: row.get(10)?,
        approved_at: parsed_opt(row, 11)?,
        pickup_deadline: parsed_opt(row, 12)?,
        created_at: parsed(row, 13)?,
        updated_at: parsed(row, 14)?,
    })
}

impl Storage {
    /// Insert a pending request and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_request(
        &self,
        requester_id: i64,
        request: &NewRequest,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let now = ts(&now);
        self.conn.execute(
            "INSERT INTO requests (requester_id, hospital_name, patient_name, blood_group,
                                   units_requested, units_allocated, urgency, status, reason,
                                   created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?9, ?9)",
            params![
                requester_id,
                request.hospital_name,
                request.patient_name,
                request.blood_group.as_str(),
                request.units,
                request.urgency.as_str(),
                RequestStatus::Pending.as_str(),
                request.reason,
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get a request by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_request(&self, id: i64) -> Result<Option<BloodRequest>> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], row_to_request).optional()?)
    }

    /// List requests, most urgent first and oldest first within an urgency.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<BloodRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM requests
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR blood_group = ?2)
               AND (?3 IS NULL OR requester_id = ?3)
             ORDER BY CASE urgency WHEN 'critical' THEN 0 WHEN 'urgent' THEN 1 ELSE 2 END,
                      created_at, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let requests = stmt
            .query_map(
                params![
                    filter.status.map(RequestStatus::as_str),
                    filter.blood_group.map(BloodGroup::as_str),
                    filter.requester_id,
                ],
                row_to_request,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(requests)
    }

    /// Write back a request's lifecycle fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the request does not exist.
    pub fn update_request(&self, request: &BloodRequest) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE requests SET units_allocated = ?1, status = ?2, reason = ?3, approved_by = ?4,
                                 approved_at = ?5, pickup_deadline = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                request.units_allocated,
                request.status.as_str(),
                request.reason,
                request.approved_by,
                request.approved_at.as_ref().map(ts),
                request.pickup_deadline.as_ref().map(ts),
                ts(&request.updated_at),
                request.id,
            ],
        )?;
        if changed == 0 {
            return Err(Error::not_found("request", request.id));
        }
        Ok(())
    }

    /// Fulfilled requests whose pickup deadline passed before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn overdue_pickups(&self, now: DateTime<Utc>) -> Result<Vec<BloodRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM requests
             WHERE status = ?1 AND pickup_deadline IS NOT NULL AND pickup_deadline < ?2
             ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let requests = stmt
            .query_map(
                params![RequestStatus::Fulfilled.as_str(), ts(&now)],
                row_to_request,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(requests)
    }

    /// Number of requests in each status, for every status that has any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn request_counts(&self) -> Result<Vec<(RequestStatus, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM requests GROUP BY status ORDER BY status")?;
        let counts = stmt
            .query_map([], |row| Ok((parsed(row, 0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }
}
