//! User accounts, roles and account status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// What a user is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Blood bank staff; approves accounts and requests, manages inventory.
    Admin,
    /// A hospital or other party that requests blood.
    Hospital,
    /// A person who gives blood.
    Donor,
}

impl Role {
    /// Stable name used in storage and tokens.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Hospital => "hospital",
            Self::Donor => "donor",
        }
    }

    /// Whether a fresh registration for this role needs an admin approval.
    #[must_use]
    pub fn requires_approval(self) -> bool {
        !matches!(self, Self::Donor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "hospital" => Ok(Self::Hospital),
            "donor" => Ok(Self::Donor),
            _ => Err(Error::validation(format!("unknown role: '{s}'"))),
        }
    }
}

/// Lifecycle of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Waiting for an admin to approve it.
    Pending,
    /// May log in.
    Active,
    /// Registration was turned down.
    Rejected,
    /// Access withdrawn after activation.
    Suspended,
}

impl UserStatus {
    /// Stable name used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Suspended => "suspended",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "rejected" => Ok(Self::Rejected),
            "suspended" => Ok(Self::Suspended),
            _ => Err(Error::validation(format!("unknown user status: '{s}'"))),
        }
    }
}

/// A registered account. Password material stays in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Row id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Login e-mail, stored lowercase.
    pub email: String,
    /// Account role.
    pub role: Role,
    /// Account status.
    pub status: UserStatus,
    /// Admin who approved or rejected the account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<i64>,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether this user may log in.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Whether this user is an active admin.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin && self.is_active()
    }
}

/// Input for creating an account.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    /// Display name.
    pub name: String,
    /// Login e-mail.
    pub email: String,
    /// Plain-text password; hashed before storage.
    pub password: String,
    /// Requested role.
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_names() {
        for role in [Role::Admin, Role::Hospital, Role::Donor] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("nurse".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_requires_approval() {
        assert!(Role::Admin.requires_approval());
        assert!(Role::Hospital.requires_approval());
        assert!(!Role::Donor.requires_approval());
    }

    #[test]
    fn test_user_status_parse() {
        assert_eq!("Pending".parse::<UserStatus>().unwrap(), UserStatus::Pending);
        assert!("gone".parse::<UserStatus>().is_err());
    }

    #[test]
    fn test_user_is_admin() {
        let mut user = User {
            id: 1,
            name: "Ada".to_string(),
            email: "ada@example.org".to_string(),
            role: Role::Admin,
            status: UserStatus::Pending,
            approved_by: None,
            created_at: Utc::now(),
        };
        assert!(!user.is_admin());

        user.status = UserStatus::Active;
        assert!(user.is_admin());
    }

    #[test]
    fn test_user_serialization_omits_missing_approver() {
        let user = User {
            id: 2,
            name: "Ben".to_string(),
            email: "ben@example.org".to_string(),
            role: Role::Donor,
            status: UserStatus::Active,
            approved_by: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains("\"role\":\"donor\""));
        assert!(!json.contains("approved_by"));
    }
}
