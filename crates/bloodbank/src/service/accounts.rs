//! Registration, login and account approval.

use chrono::{DateTime, Utc};
use tracing::info;

use super::{require_admin, BloodBank};
use crate::auth::{hash_password, verify_password};
use crate::error::{Error, Result};
use crate::model::{NewUser, Role, User, UserStatus};
use crate::validation::{validate_email, validate_name};

impl BloodBank {
    /// Register an account.
    ///
    /// Donor accounts are active at once; hospital and admin accounts wait
    /// for an admin's approval.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for bad input or [`Error::Conflict`] if
    /// the e-mail is already registered.
    pub fn register(&self, new: &NewUser, now: DateTime<Utc>) -> Result<User> {
        let status = if new.role.requires_approval() {
            UserStatus::Pending
        } else {
            UserStatus::Active
        };
        let user = self.create_user(new, status, now)?;
        info!(user_id = user.id, role = %user.role, status = %user.status, "Registered account");
        Ok(user)
    }

    /// Create the first admin account, active immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if an active admin already exists.
    pub fn bootstrap_admin(
        &self,
        name: &str,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<User> {
        if self
            .storage
            .count_users(Role::Admin, Some(UserStatus::Active))?
            > 0
        {
            return Err(Error::conflict("an active admin already exists"));
        }

        let new = NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role: Role::Admin,
        };
        let user = self.create_user(&new, UserStatus::Active, now)?;
        info!(user_id = user.id, "Bootstrapped admin account");
        Ok(user)
    }

    fn create_user(&self, new: &NewUser, status: UserStatus, now: DateTime<Utc>) -> Result<User> {
        validate_name(&new.name)?;
        validate_email(&new.email)?;
        let password_hash = hash_password(&new.password)?;

        let id = self.storage.insert_user(
            new.name.trim(),
            &new.email.to_ascii_lowercase(),
            &password_hash,
            new.role,
            status,
            now,
        )?;
        self.get_user(id)
    }

    /// Check credentials and issue a token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] for unknown e-mails or wrong passwords
    /// and [`Error::Forbidden`] for accounts that are not active.
    pub fn login(&self, email: &str, password: &str, now: DateTime<Utc>) -> Result<(User, String)> {
        let invalid = || Error::unauthorized("invalid email or password");

        let (user, password_hash) = self
            .storage
            .get_user_credentials(email.trim())?
            .ok_or_else(invalid)?;
        if !verify_password(password, &password_hash) {
            return Err(invalid());
        }
        if !user.is_active() {
            return Err(Error::forbidden(format!("account is {}", user.status)));
        }

        let token = self.signer.issue(&user, now);
        info!(user_id = user.id, "Issued token");
        Ok((user, token))
    }

    /// Resolve a bearer token to its active account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] for invalid tokens or deleted accounts
    /// and [`Error::Forbidden`] for accounts that are no longer active.
    pub fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<User> {
        let claims = self.signer.verify(token, now)?;
        let user = self
            .storage
            .get_user(claims.user_id)?
            .ok_or_else(|| Error::unauthorized("account no longer exists"))?;
        if !user.is_active() {
            return Err(Error::forbidden(format!("account is {}", user.status)));
        }
        Ok(user)
    }

    /// Get an account by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the account does not exist.
    pub fn get_user(&self, id: i64) -> Result<User> {
        self.storage
            .get_user(id)?
            .ok_or_else(|| Error::not_found("user", id))
    }

    /// Find an account by e-mail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if no account uses the e-mail.
    pub fn user_by_email(&self, email: &str) -> Result<User> {
        self.storage
            .get_user_credentials(email.trim())?
            .map(|(user, _)| user)
            .ok_or_else(|| Error::validation(format!("no account for {email}")))
    }

    /// Approve a pending account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] unless `admin` is an active admin other
    /// than the account itself, and [`Error::InvalidTransition`] unless the
    /// account is pending.
    pub fn approve_user(&self, admin: &User, id: i64) -> Result<User> {
        self.decide_user(admin, id, UserStatus::Active)
    }

    /// Reject a pending account.
    ///
    /// # Errors
    ///
    /// As for [`BloodBank::approve_user`].
    pub fn reject_user(&self, admin: &User, id: i64) -> Result<User> {
        self.decide_user(admin, id, UserStatus::Rejected)
    }

    fn decide_user(&self, admin: &User, id: i64, decision: UserStatus) -> Result<User> {
        require_admin(admin)?;
        if admin.id == id {
            return Err(Error::forbidden("admins cannot decide on their own account"));
        }

        let user = self.get_user(id)?;
        if user.status != UserStatus::Pending {
            return Err(Error::invalid_transition("user", user.status, decision));
        }

        self.storage.set_user_status(id, decision, Some(admin.id))?;
        info!(user_id = id, admin_id = admin.id, status = %decision, "Account decided");
        self.get_user(id)
    }

    /// List accounts, optionally only those in one status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_users(&self, status: Option<UserStatus>) -> Result<Vec<User>> {
        self.storage.list_users(status)
    }
}
