//! CLI argument definitions using clap
//!
//! Commands:
//! - realmkit verify --config <path>
//! - realmkit migrate --config <path>
//! - realmkit inspect --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// realmkit - schema reconciliation for record stores
#[derive(Parser, Debug)]
#[command(name = "realmkit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compare the store layout with the declared schema without writing
    Verify {
        /// Path to configuration file
        #[arg(long, default_value = "./realmkit.json")]
        config: PathBuf,
    },

    /// Reconcile the store with the declared schema and version
    Migrate {
        /// Path to configuration file
        #[arg(long, default_value = "./realmkit.json")]
        config: PathBuf,
    },

    /// Dump the stored layout as JSON
    Inspect {
        /// Path to configuration file
        #[arg(long, default_value = "./realmkit.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
