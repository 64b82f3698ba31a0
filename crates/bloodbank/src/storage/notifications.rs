//! Notification queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{parsed, parsed_opt, ts, Storage};
use crate::error::{Error, Result};
use crate::model::{Notification, NotificationResponse};

const NOTIFICATION_COLUMNS: &str =
    "id, donor_id, request_id, title, message, response, responded_at, read_at, created_at";

fn row_to_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        donor_id: row.get(1)?,
        request_id: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        response: parsed_opt(row, 5)?,
        responded_at: parsed_opt(row, 6)?,
        read_at: parsed_opt(row, 7)?,
        created_at: parsed(row, 8)?,
    })
}

impl Storage {
    /// Insert a notification and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_notification(
        &self,
        donor_id: i64,
        request_id: Option<i64>,
        title: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO notifications (donor_id, request_id, title, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![donor_id, request_id, title, message, ts(&now)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get a notification by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_notification(&self, id: i64) -> Result<Option<Notification>> {
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [id], row_to_notification)
            .optional()?)
    }

    /// List notifications, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_notifications(
        &self,
        donor_id: Option<i64>,
        request_id: Option<i64>,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE (?1 IS NULL OR donor_id = ?1)
               AND (?2 IS NULL OR request_id = ?2)
               AND (?3 = 0 OR read_at IS NULL)
             ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let notifications = stmt
            .query_map(params![donor_id, request_id, unread_only], row_to_notification)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notifications)
    }

    /// Record a donor's response. Responding also marks the notification read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the notification does not exist.
    pub fn set_notification_response(
        &self,
        id: i64,
        response: NotificationResponse,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let now = ts(&now);
        let changed = self.conn.execute(
            "UPDATE notifications SET response = ?1, responded_at = ?2,
                                      read_at = COALESCE(read_at, ?2)
             WHERE id = ?3",
            params![response.as_str(), now, id],
        )?;
        if changed == 0 {
            return Err(Error::not_found("notification", id));
        }
        Ok(())
    }

    /// Mark a notification read. Already-read notifications keep their first read time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the notification does not exist.
    pub fn mark_notification_read(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE notifications SET read_at = COALESCE(read_at, ?1) WHERE id = ?2",
            params![ts(&now), id],
        )?;
        if changed == 0 {
            return Err(Error::not_found("notification", id));
        }
        Ok(())
    }

    /// Count responses of one kind to a request's notifications.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_responses(&self, request_id: i64, response: NotificationResponse) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE request_id = ?1 AND response = ?2",
            params![request_id, response.as_str()],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BloodGroup, NewDonor};
    use chrono::{Duration, NaiveDate};

    fn setup() -> (Storage, i64) {
        let storage = Storage::open_in_memory().unwrap();
        let donor = storage
            .insert_donor(
                &NewDonor {
                    user_id: None,
                    name: "Ann".to_string(),
                    email: None,
                    phone: "555".to_string(),
                    blood_group: BloodGroup::ONeg,
                    date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                    weight_kg: 60.0,
                    city: None,
                    last_donation_on: None,
                },
                Utc::now(),
            )
            .unwrap();
        (storage, donor)
    }

    #[test]
    fn test_insert_and_list_newest_first() {
        let (storage, donor) = setup();
        let now = Utc::now();
        let first = storage
            .insert_notification(donor, None, "Hello", "First", now)
            .unwrap();
        let second = storage
            .insert_notification(donor, None, "Hello", "Second", now + Duration::seconds(1))
            .unwrap();

        let ids: Vec<i64> = storage
            .list_notifications(Some(donor), None, false)
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![second, first]);
        assert!(storage
            .list_notifications(Some(donor + 1), None, false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_mark_read_keeps_first_time() {
        let (storage, donor) = setup();
        let now = Utc::now();
        let id = storage
            .insert_notification(donor, None, "Hello", "Body", now)
            .unwrap();

        storage.mark_notification_read(id, now).unwrap();
        storage
            .mark_notification_read(id, now + Duration::hours(1))
            .unwrap();

        let n = storage.get_notification(id).unwrap().unwrap();
        assert_eq!(n.read_at.map(|t| t.timestamp()), Some(now.timestamp()));
        assert!(storage
            .list_notifications(Some(donor), None, true)
            .unwrap()
            .is_empty());
        assert!(storage
            .mark_notification_read(99, now)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_response_marks_read() {
        let (storage, donor) = setup();
        let id = storage
            .insert_notification(donor, None, "Hello", "Body", Utc::now())
            .unwrap();

        storage
            .set_notification_response(id, NotificationResponse::Maybe, Utc::now())
            .unwrap();
        let n = storage.get_notification(id).unwrap().unwrap();
        assert_eq!(n.response, Some(NotificationResponse::Maybe));
        assert!(n.read_at.is_some());
        assert!(n.responded_at.is_some());
    }
}
