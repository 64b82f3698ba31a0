//! Configuration management for bloodbank.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "bloodbank";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "bloodbank.db";

/// Default directory name for report attachments.
const REPORTS_DIR_NAME: &str = "reports";

/// Shortest accepted token secret.
const MIN_SECRET_LEN: usize = 16;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `BLOODBANK_`, `__` between sections)
/// 2. TOML config file at `~/.config/bloodbank/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Donor eligibility and collection rules.
    pub donation: DonationConfig,
    /// Blood request rules.
    pub requests: RequestConfig,
    /// Medical report attachment rules.
    pub reports: ReportConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/bloodbank/bloodbank.db`
    pub database_path: Option<PathBuf>,
    /// Directory where report attachments are stored.
    /// Defaults to `~/.local/share/bloodbank/reports`
    pub reports_dir: Option<PathBuf>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the API listens on.
    pub bind_address: String,
    /// Requests per minute per client on the `/api/auth` routes.
    /// Zero disables limiting.
    pub auth_requests_per_minute: u32,
    /// Minutes between maintenance sweeps.
    pub maintenance_interval_minutes: u32,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

/// Authentication configuration.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Secret used to sign access tokens.
    /// When unset a random secret is generated at startup.
    /// Never serialized or printed.
    #[serde(skip_serializing)]
    pub token_secret: Option<String>,
    /// Token lifetime in hours.
    pub token_ttl_hours: u32,
}

/// Donor eligibility and collection rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DonationConfig {
    /// Days a donor must wait between donations.
    pub waiting_period_days: u32,
    /// Youngest donor age in years.
    pub min_age_years: u32,
    /// Oldest donor age in years.
    pub max_age_years: u32,
    /// Lightest accepted donor weight.
    pub min_weight_kg: f64,
    /// Days a collected unit stays usable.
    pub shelf_life_days: u32,
    /// Most units recorded for a single donation.
    pub max_units_per_donation: u32,
    /// How far ahead an appointment may be booked.
    pub max_schedule_ahead_days: u32,
    /// Hours after the scheduled time before an appointment is a no-show.
    pub no_show_grace_hours: u32,
}

/// Blood request rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Most units a single request may ask for.
    pub max_units_per_request: u32,
    /// Hours a fulfilled request may wait for pickup.
    pub pickup_window_hours: u32,
    /// Most donors solicited per notification round.
    pub max_donors_notified: u32,
}

/// Medical report attachment rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Largest accepted attachment.
    pub max_attachment_bytes: usize,
    /// Lowercase file extensions accepted for attachments.
    pub allowed_extensions: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            auth_requests_per_minute: 20,
            maintenance_interval_minutes: 15,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "token_secret",
                &self.token_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("token_ttl_hours", &self.token_ttl_hours)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_ttl_hours: 24,
        }
    }
}

impl Default for DonationConfig {
    fn default() -> Self {
        Self {
            waiting_period_days: 90,
            min_age_years: 18,
            max_age_years: 65,
            min_weight_kg: 50.0,
            shelf_life_days: 42,
            max_units_per_donation: 2,
            max_schedule_ahead_days: 30,
            no_show_grace_hours: 2,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_units_per_request: 20,
            pickup_window_hours: 48,
            max_donors_notified: 20,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_attachment_bytes: 5 * 1024 * 1024,
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

/// Attachment types accepted by default.
fn default_allowed_extensions() -> Vec<String> {
    ["pdf", "png", "jpg", "jpeg"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("BLOODBANK_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        self.bind_address()?;

        if self.server.maintenance_interval_minutes == 0 {
            return Err(invalid("maintenance_interval_minutes must be greater than 0"));
        }

        if let Some(secret) = &self.auth.token_secret {
            if secret.len() < MIN_SECRET_LEN {
                return Err(invalid(format!(
                    "token_secret must be at least {MIN_SECRET_LEN} characters"
                )));
            }
        }
        if self.auth.token_ttl_hours == 0 {
            return Err(invalid("token_ttl_hours must be greater than 0"));
        }

        let donation = &self.donation;
        if donation.min_age_years >= donation.max_age_years {
            return Err(invalid(format!(
                "min_age_years ({}) must be less than max_age_years ({})",
                donation.min_age_years, donation.max_age_years
            )));
        }
        if donation.shelf_life_days == 0 {
            return Err(invalid("shelf_life_days must be greater than 0"));
        }
        if donation.max_units_per_donation == 0 {
            return Err(invalid("max_units_per_donation must be greater than 0"));
        }
        if donation.max_schedule_ahead_days == 0 {
            return Err(invalid("max_schedule_ahead_days must be greater than 0"));
        }
        if !donation.min_weight_kg.is_finite() || donation.min_weight_kg < 0.0 {
            return Err(invalid("min_weight_kg must be a non-negative number"));
        }

        if self.requests.max_units_per_request == 0 {
            return Err(invalid("max_units_per_request must be greater than 0"));
        }
        if self.requests.pickup_window_hours == 0 {
            return Err(invalid("pickup_window_hours must be greater than 0"));
        }

        if self.reports.allowed_extensions.is_empty() {
            return Err(invalid("allowed_extensions cannot be empty"));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the attachment directory, resolving defaults if not set.
    #[must_use]
    pub fn reports_dir(&self) -> PathBuf {
        self.storage
            .reports_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(REPORTS_DIR_NAME))
    }

    /// Parse the configured bind address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid socket address.
    pub fn bind_address(&self) -> Result<SocketAddr> {
        self.server
            .bind_address
            .parse()
            .map_err(|_| invalid(format!("invalid bind_address: {}", self.server.bind_address)))
    }

    /// Get the maintenance interval as a Duration.
    #[must_use]
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.server.maintenance_interval_minutes) * 60)
    }

    /// Get the token lifetime as a Duration.
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.auth.token_ttl_hours) * 60 * 60)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
