//! Business operations for the blood bank.
//!
//! [`BloodBank`] owns the [`Storage`] handle and the configured policy, and
//! exposes every operation the API and CLI perform. Operations that touch
//! more than one row run inside a single IMMEDIATE transaction, so a failed
//! step leaves nothing behind.
//!
//! Operations taking an acting [`User`] enforce role and ownership rules
//! themselves; callers only need to authenticate.

mod accounts;
mod appointments;
mod donors;
mod inventory;
mod maintenance;
mod notifications;
mod reports;
mod requests;

pub use appointments::{Completion, NewAppointment};
pub use maintenance::{Dashboard, MaintenanceReport, LOW_STOCK_UNITS};
pub use notifications::ResponseOutcome;
pub use requests::Approval;

use crate::auth::TokenSigner;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Role, User};
use crate::storage::Storage;

/// The blood bank: storage plus policy.
#[derive(Debug)]
pub struct BloodBank {
    storage: Storage,
    config: Config,
    signer: TokenSigner,
}

impl BloodBank {
    /// Create a blood bank over an open storage handle.
    #[must_use]
    pub fn new(storage: Storage, config: Config) -> Self {
        let signer = TokenSigner::new(config.auth.token_secret.as_deref(), config.token_ttl());
        Self {
            storage,
            config,
            signer,
        }
    }

    /// Open the database named by `config` and create a blood bank over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(config: Config) -> Result<Self> {
        let storage = Storage::open(config.database_path())?;
        Ok(Self::new(storage, config))
    }

    /// The underlying storage.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn require_admin(user: &User) -> Result<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(Error::forbidden("admin access required"))
    }
}

fn require_role(user: &User, roles: &[Role]) -> Result<()> {
    if user.is_active() && roles.contains(&user.role) {
        Ok(())
    } else {
        Err(Error::forbidden(format!(
            "{} accounts cannot perform this action",
            user.role
        )))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the service tests.

    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    use super::BloodBank;
    use crate::config::Config;
    use crate::model::{BloodGroup, Donor, NewDonor, NewUser, Role, User};
    use crate::storage::Storage;

    /// Noon UTC on the given day.
    pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn bank() -> BloodBank {
        let mut config = Config::default();
        config.storage.reports_dir = Some(std::env::temp_dir().join(format!(
            "bloodbank_reports_{}_{}",
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        )));
        BloodBank::new(Storage::open_in_memory().unwrap(), config)
    }

    pub fn admin(bank: &BloodBank) -> User {
        bank.bootstrap_admin("Ada Admin", "admin@example.org", "admin-password", at(2024, 1, 1))
            .unwrap()
    }

    pub fn hospital(bank: &BloodBank, admin: &User, email: &str) -> User {
        let user = bank
            .register(
                &NewUser {
                    name: "General Hospital".to_string(),
                    email: email.to_string(),
                    password: "hospital-password".to_string(),
                    role: Role::Hospital,
                },
                at(2024, 1, 1),
            )
            .unwrap();
        bank.approve_user(admin, user.id).unwrap()
    }

    pub fn new_donor(name: &str, group: BloodGroup) -> NewDonor {
        NewDonor {
            user_id: None,
            name: name.to_string(),
            email: None,
            phone: "+44 20 7946 0000".to_string(),
            blood_group: group,
            date_of_birth: date(1990, 1, 1),
            weight_kg: 70.0,
            city: Some("Leeds".to_string()),
            last_donation_on: None,
        }
    }

    pub fn donor(bank: &BloodBank, name: &str, group: BloodGroup) -> Donor {
        bank.register_donor(&new_donor(name, group), at(2024, 1, 1))
            .unwrap()
    }

    /// A donor with a login account.
    pub fn donor_account(bank: &BloodBank, email: &str, group: BloodGroup) -> (User, Donor) {
        let user = bank
            .register(
                &NewUser {
                    name: "Dana Donor".to_string(),
                    email: email.to_string(),
                    password: "donor-password".to_string(),
                    role: Role::Donor,
                },
                at(2024, 1, 1),
            )
            .unwrap();
        let mut profile = new_donor("Dana Donor", group);
        profile.user_id = Some(user.id);
        let donor = bank.register_donor(&profile, at(2024, 1, 1)).unwrap();
        (user, donor)
    }
}
