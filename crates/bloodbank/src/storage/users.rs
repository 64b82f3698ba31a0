//! Account queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{parsed, ts, Storage};
use crate::error::{Error, Result};
use crate::model::{Role, User, UserStatus};

const USER_COLUMNS: &str = "id, name, email, role, status, approved_by, created_at";

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: parsed(row, 3)?,
        status: parsed(row, 4)?,
        approved_by: row.get(5)?,
        created_at: parsed(row, 6)?,
    })
}

impl Storage {
    /// Insert an account and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the email is already registered.
    pub fn insert_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
        status: UserStatus,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        if self.email_taken(email)? {
            return Err(Error::conflict(format!("email {email} is already registered")));
        }

        self.conn.execute(
            "INSERT INTO users (name, email, password_hash, role, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![name, email, password_hash, role.as_str(), status.as_str(), ts(&now)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn email_taken(&self, email: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE email = ?1 COLLATE NOCASE",
                [email],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Get an account by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], row_to_user).optional()?)
    }

    /// Get an account and its password hash by email (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_user_credentials(&self, email: &str) -> Result<Option<(User, String)>> {
        let sql = format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1 COLLATE NOCASE"
        );
        Ok(self
            .conn
            .query_row(&sql, [email], |row| Ok((row_to_user(row)?, row.get(7)?)))
            .optional()?)
    }

    /// List accounts, optionally restricted to one status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_users(&self, status: Option<UserStatus>) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE (?1 IS NULL OR status = ?1) ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let users = stmt
            .query_map([status.map(UserStatus::as_str)], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Set an account's status and the admin who decided it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the account does not exist.
    pub fn set_user_status(
        &self,
        id: i64,
        status: UserStatus,
        decided_by: Option<i64>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE users SET status = ?1, approved_by = ?2 WHERE id = ?3",
            params![status.as_str(), decided_by, id],
        )?;
        if changed == 0 {
            return Err(Error::not_found("user", id));
        }
        Ok(())
    }

    /// Count accounts with a role, optionally restricted to one status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_users(&self, role: Role, status: Option<UserStatus>) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE role = ?1 AND (?2 IS NULL OR status = ?2)",
            params![role.as_str(), status.map(UserStatus::as_str)],
            |row| row.get(0),
        )?)
    }
}
