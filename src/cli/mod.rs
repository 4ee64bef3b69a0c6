//! CLI module for realmkit
//!
//! Provides command-line interface for:
//! - verify: Compare the stored layout with the declared schema
//! - migrate: Reconcile the store with the declared schema
//! - inspect: Dump the stored layout

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{inspect, migrate, run, run_command, verify};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_response, write_response_to};
