//! `bbank` - CLI for bloodbank
//!
//! This binary runs the HTTP API and gives operators direct access to the
//! database for account review, stock handling and maintenance.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;

use bloodbank::cli::{
    AdminCommand, Cli, Command, ConfigCommand, InventoryCommand, OutputFormat, UsersCommand,
};
use bloodbank::model::{LotFilter, NewLot, UserStatus};
use bloodbank::{init_logging, BloodBank, Config};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match cli.command {
        // Config commands must work on a broken config file
        Command::Config(config_cmd) => handle_config(cli.config, config_cmd),
        command => run(cli.config, command),
    }
}

fn run(config_path: Option<PathBuf>, command: Command) -> anyhow::Result<()> {
    let mut config = Config::load_from(config_path).context("loading configuration")?;

    match command {
        Command::Serve(serve_cmd) => {
            if let Some(bind) = serve_cmd.bind {
                config.server.bind_address = bind;
            }
            let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
            runtime.block_on(bloodbank::api::serve(config))?;
            Ok(())
        }
        Command::Status(status_cmd) => handle_status(config, status_cmd.json),
        Command::Admin(admin_cmd) => handle_admin(config, admin_cmd),
        Command::Users(users_cmd) => handle_users(config, users_cmd),
        Command::Inventory(inventory_cmd) => handle_inventory(config, inventory_cmd),
        Command::Maintenance => handle_maintenance(config),
        Command::Config(config_cmd) => handle_config(None, config_cmd),
    }
}

fn open(config: Config) -> anyhow::Result<BloodBank> {
    let path = config.database_path();
    BloodBank::open(config).with_context(|| format!("opening database {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_status(config: Config, json: bool) -> anyhow::Result<()> {
    let bank = open(config)?;
    let stats = bank.storage().stats()?;
    let summary = bank.inventory_summary(Utc::now().date_naive())?;

    if json {
        let status = serde_json::json!({
            "database_path": bank.storage().path(),
            "storage": stats,
            "inventory": summary,
        });
        return print_json(&status);
    }

    println!("bbank status");
    println!("------------");
    println!("Database:      {}", bank.storage().path().display());
    println!("Schema:        v{}", stats.schema_version);
    println!("Size:          {} bytes", stats.db_size_bytes);
    println!("Users:         {}", stats.users);
    println!("Donors:        {}", stats.donors);
    println!("Requests:      {}", stats.requests);
    println!("Appointments:  {}", stats.appointments);
    println!("Reports:       {}", stats.reports);
    println!();
    println!("Usable units as of {}:", summary.as_of);
    for group in &summary.groups {
        println!("  {:<4} {:>5}", group.blood_group.to_string(), group.units);
    }
    println!("  {:<4} {:>5}", "all", summary.total_units());
    Ok(())
}

fn handle_admin(config: Config, cmd: AdminCommand) -> anyhow::Result<()> {
    match cmd {
        AdminCommand::Bootstrap {
            name,
            email,
            password,
        } => {
            let bank = open(config)?;
            let user = bank.bootstrap_admin(&name, &email, &password, Utc::now())?;
            println!("Created admin {} (id {})", user.email, user.id);
        }
    }
    Ok(())
}

fn handle_users(config: Config, cmd: UsersCommand) -> anyhow::Result<()> {
    let bank = open(config)?;
    match cmd {
        UsersCommand::List { pending, format } => {
            let users = bank.list_users(pending.then_some(UserStatus::Pending))?;
            match format {
                OutputFormat::Json => print_json(&users)?,
                OutputFormat::Table => {
                    println!("{:>5}  {:<8}  {:<9}  {:<30}  NAME", "ID", "ROLE", "STATUS", "EMAIL");
                    for u in &users {
                        println!(
                            "{:>5}  {:<8}  {:<9}  {:<30}  {}",
                            u.id,
                            u.role.to_string(),
                            u.status.to_string(),
                            u.email,
                            u.name
                        );
                    }
                }
                OutputFormat::Plain => {
                    for u in &users {
                        println!("{} {} {} {}", u.id, u.role, u.status, u.email);
                    }
                }
            }
        }
        UsersCommand::Approve { id, admin } => {
            let admin = bank.user_by_email(&admin)?;
            let user = bank.approve_user(&admin, id)?;
            println!("Approved {} ({})", user.email, user.role);
        }
        UsersCommand::Reject { id, admin } => {
            let admin = bank.user_by_email(&admin)?;
            let user = bank.reject_user(&admin, id)?;
            println!("Rejected {} ({})", user.email, user.role);
        }
    }
    Ok(())
}

fn handle_inventory(config: Config, cmd: InventoryCommand) -> anyhow::Result<()> {
    let bank = open(config)?;
    let now = Utc::now();
    let today = now.date_naive();

    match cmd {
        InventoryCommand::List {
            group,
            usable,
            format,
        } => {
            let lots = bank.list_lots(&LotFilter {
                blood_group: group,
                usable_on: usable.then_some(today),
            })?;
            match format {
                OutputFormat::Json => print_json(&lots)?,
                OutputFormat::Table => {
                    println!(
                        "{:>5}  {:<4}  {:>5}  {:<10}  {:<10}  STATE",
                        "ID", "GRP", "UNITS", "COLLECTED", "EXPIRES"
                    );
                    for lot in &lots {
                        println!(
                            "{:>5}  {:<4}  {:>5}  {:<10}  {:<10}  {:?}",
                            lot.id,
                            lot.blood_group.to_string(),
                            lot.units,
                            lot.collected_on,
                            lot.expires_on,
                            lot.state(today)
                        );
                    }
                }
                OutputFormat::Plain => {
                    for lot in &lots {
                        println!(
                            "{} {} {} units, expires {}",
                            lot.id, lot.blood_group, lot.units, lot.expires_on
                        );
                    }
                }
            }
        }
        InventoryCommand::Summary { format } => {
            let summary = bank.inventory_summary(today)?;
            match format {
                OutputFormat::Json => print_json(&summary)?,
                OutputFormat::Table => {
                    println!("{:<4}  {:>5}  {:>4}  NEXT EXPIRY", "GRP", "UNITS", "LOTS");
                    for g in &summary.groups {
                        let next = g
                            .next_expiry
                            .map_or_else(|| "-".to_string(), |d| d.to_string());
                        println!(
                            "{:<4}  {:>5}  {:>4}  {next}",
                            g.blood_group.to_string(),
                            g.units,
                            g.lots
                        );
                    }
                }
                OutputFormat::Plain => {
                    for g in &summary.groups {
                        println!("{} {}", g.blood_group, g.units);
                    }
                }
            }
        }
        InventoryCommand::Add {
            group,
            units,
            collected,
            expires,
        } => {
            let lot = bank.add_lot(
                &NewLot {
                    blood_group: group,
                    units,
                    collected_on: collected.unwrap_or(today),
                    expires_on: expires,
                },
                now,
            )?;
            println!(
                "Added lot {}: {} units of {}, expires {}",
                lot.id, lot.units, lot.blood_group, lot.expires_on
            );
        }
        InventoryCommand::Expire => {
            let (lots, units) = bank.expire_lots(now)?;
            println!("Expired {units} units in {lots} lots");
        }
        InventoryCommand::Reconcile => {
            let mismatches = bank.reconcile()?;
            if mismatches.is_empty() {
                println!("Ledger and lots agree.");
            } else {
                for m in &mismatches {
                    println!(
                        "lot {}: {} units on hand, ledger says {}",
                        m.lot_id, m.units, m.ledger_units
                    );
                }
                bail!("{} lots disagree with the movement ledger", mismatches.len());
            }
        }
    }
    Ok(())
}

fn handle_maintenance(config: Config) -> anyhow::Result<()> {
    let bank = open(config)?;
    let report = bank.run_maintenance(Utc::now())?;
    if report.is_empty() {
        println!("Nothing to do.");
    } else {
        println!(
            "Expired {} units in {} lots; {} pickups and {} appointments marked no-show",
            report.expired_units,
            report.expired_lots,
            report.request_no_shows,
            report.appointment_no_shows
        );
    }
    Ok(())
}

fn handle_config(path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(path).context("loading configuration")?;
            if json {
                print_json(&config)?;
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Reports dir:        {}", config.reports_dir().display());
                println!();
                println!("[Server]");
                println!("  Bind address:       {}", config.server.bind_address);
                println!(
                    "  Auth requests/min:  {}",
                    config.server.auth_requests_per_minute
                );
                println!(
                    "  Maintenance (min):  {}",
                    config.server.maintenance_interval_minutes
                );
                println!();
                println!("[Auth]");
                println!(
                    "  Token secret:       {}",
                    if config.auth.token_secret.is_some() {
                        "set"
                    } else {
                        "random per process"
                    }
                );
                println!("  Token TTL (hours):  {}", config.auth.token_ttl_hours);
                println!();
                println!("[Donation]");
                println!(
                    "  Waiting period:     {} days",
                    config.donation.waiting_period_days
                );
                println!(
                    "  Age range:          {}-{}",
                    config.donation.min_age_years, config.donation.max_age_years
                );
                println!("  Shelf life:         {} days", config.donation.shelf_life_days);
                println!();
                println!("[Requests]");
                println!(
                    "  Max units:          {}",
                    config.requests.max_units_per_request
                );
                println!(
                    "  Pickup window:      {} hours",
                    config.requests.pickup_window_hours
                );
            }
        }
        ConfigCommand::Path => {
            println!(
                "{}",
                path.unwrap_or_else(Config::default_config_path).display()
            );
        }
        ConfigCommand::Validate { file } => {
            let path = file.or(path).unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
