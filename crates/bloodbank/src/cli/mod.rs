//! Command-line interface for bloodbank.
//!
//! This module provides the CLI structure for the `bbank` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AdminCommand, ConfigCommand, InventoryCommand, OutputFormat, ServeCommand, StatusCommand,
    UsersCommand,
};

/// bbank - Blood bank operations
///
/// Runs the blood bank HTTP API and gives operators direct access to
/// accounts, stock and maintenance.
#[derive(Debug, Parser)]
#[command(name = "bbank")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API
    Serve(ServeCommand),

    /// Show database and stock status
    Status(StatusCommand),

    /// Manage admin accounts
    #[command(subcommand)]
    Admin(AdminCommand),

    /// Review user accounts
    #[command(subcommand)]
    Users(UsersCommand),

    /// Inspect and change blood stock
    #[command(subcommand)]
    Inventory(InventoryCommand),

    /// Run one maintenance sweep now
    Maintenance,

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Verbosity;
    use crate::model::BloodGroup;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), "bbank");
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(parse(&["bbank", "-q", "status"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["bbank", "status"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["bbank", "-v", "status"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["bbank", "-vv", "status"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["bbank", "-c", "/custom/config.toml", "maintenance"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
        assert!(matches!(cli.command, Command::Maintenance));
    }

    #[test]
    fn test_parse_serve_bind() {
        let cli = parse(&["bbank", "serve", "--bind", "0.0.0.0:9000"]);
        match cli.command {
            Command::Serve(cmd) => assert_eq!(cmd.bind.as_deref(), Some("0.0.0.0:9000")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_inventory_add() {
        let cli = parse(&[
            "bbank",
            "inventory",
            "add",
            "o_neg",
            "4",
            "--collected",
            "2024-03-01",
        ]);
        match cli.command {
            Command::Inventory(InventoryCommand::Add {
                group,
                units,
                collected,
                expires,
            }) => {
                assert_eq!(group, BloodGroup::ONeg);
                assert_eq!(units, 4);
                assert_eq!(collected.map(|d| d.to_string()).as_deref(), Some("2024-03-01"));
                assert!(expires.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_users_approve_requires_admin() {
        assert!(Cli::try_parse_from(["bbank", "users", "approve", "3"]).is_err());
        let cli = parse(&["bbank", "users", "approve", "3", "--as", "root@example.org"]);
        assert!(matches!(
            cli.command,
            Command::Users(UsersCommand::Approve { id: 3, .. })
        ));
    }

    #[test]
    fn test_parse_list_formats() {
        let cli = parse(&["bbank", "users", "list", "--pending", "-f", "json"]);
        assert!(matches!(
            cli.command,
            Command::Users(UsersCommand::List {
                pending: true,
                format: OutputFormat::Json
            })
        ));
    }
}
