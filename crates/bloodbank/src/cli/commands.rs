//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};

use crate::model::BloodGroup;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to listen on (overrides `server.bind_address`)
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<String>,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Admin account commands.
#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    /// Create the first admin account
    Bootstrap {
        /// Display name
        #[arg(long, default_value = "Administrator")]
        name: String,

        /// Login e-mail
        #[arg(long)]
        email: String,

        /// Login password (at least 8 characters)
        #[arg(long)]
        password: String,
    },
}

/// Account review commands.
#[derive(Debug, Subcommand)]
pub enum UsersCommand {
    /// List accounts
    List {
        /// Only accounts waiting for approval
        #[arg(long)]
        pending: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Approve a pending account
    Approve {
        /// Account id
        id: i64,

        /// E-mail of the admin making the decision
        #[arg(long = "as", value_name = "EMAIL")]
        admin: String,
    },

    /// Reject a pending account
    Reject {
        /// Account id
        id: i64,

        /// E-mail of the admin making the decision
        #[arg(long = "as", value_name = "EMAIL")]
        admin: String,
    },
}

/// Inventory commands.
#[derive(Debug, Subcommand)]
pub enum InventoryCommand {
    /// List lots with units left
    List {
        /// Only lots of this blood group (e.g. "O-", "a_pos")
        #[arg(short, long, value_parser = parse_blood_group)]
        group: Option<BloodGroup>,

        /// Hide lots expired before today
        #[arg(long)]
        usable: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Usable units per blood group
    Summary {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Record a received lot
    Add {
        /// Blood group of the lot
        #[arg(value_parser = parse_blood_group)]
        group: BloodGroup,

        /// Units received
        units: u32,

        /// Collection date (defaults to today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        collected: Option<NaiveDate>,

        /// Expiry date (defaults to collection plus shelf life)
        #[arg(long, value_name = "YYYY-MM-DD")]
        expires: Option<NaiveDate>,
    },

    /// Discard expired units
    Expire,

    /// Compare lot counts with the movement ledger
    Reconcile,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}

fn parse_blood_group(s: &str) -> Result<BloodGroup, String> {
    s.parse::<BloodGroup>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Plain);
    }

    #[test]
    fn test_parse_blood_group_arg() {
        assert_eq!(parse_blood_group("o_neg"), Ok(BloodGroup::ONeg));
        assert_eq!(parse_blood_group("AB+"), Ok(BloodGroup::AbPos));
        assert!(parse_blood_group("C+").is_err());
    }

    #[test]
    fn test_users_command_debug() {
        let cmd = UsersCommand::Approve {
            id: 3,
            admin: "root@example.org".to_string(),
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Approve"));
        assert!(debug_str.contains("root@example.org"));
    }
}
