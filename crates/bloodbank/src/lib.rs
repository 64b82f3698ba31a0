//! `bloodbank` - Blood bank management service
//!
//! This library provides donor registration and eligibility, FIFO blood
//! inventory with a movement ledger, hospital blood requests, donor
//! notifications, donation appointments and medical reports, exposed over
//! an HTTP API and the `bbank` command-line tool.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod model;
pub mod service;
pub mod storage;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use service::BloodBank;
pub use storage::{Storage, StorageStats};
