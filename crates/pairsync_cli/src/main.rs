//! PairSync CLI
//!
//! Cron-friendly driver for reconciling pairs of record stores.
//!
//! # Commands
//!
//! - `sync` - Run a reconciliation pass over configured relations
//! - `force-update` - Re-push one side over its correlated counterparts
//! - `reset` - Rebuild one side from the other
//! - `unlock` - Recover a relation left locked by a crashed run

mod commands;
mod config;
mod endpoint_fs;
mod runner;

use clap::{Parser, Subcommand, ValueEnum};
use pairsync_engine::Side;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PairSync command-line driver.
#[derive(Parser)]
#[command(name = "pairsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the relations configuration file
    #[arg(global = true, short, long, default_value = "pairsync.json")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which endpoint acts as the source of a one-sided operation.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    /// The left endpoint.
    Left,
    /// The right endpoint.
    Right,
}

impl From<SourceArg> for Side {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Left => Side::Left,
            SourceArg::Right => Side::Right,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a reconciliation pass over all relations (or one)
    Sync {
        /// Only reconcile this relation
        #[arg(short, long)]
        relation: Option<String>,

        /// Discard the map first and re-run initial sync
        #[arg(long)]
        rebuild: bool,
    },

    /// Re-push one side's records over their correlated counterparts
    ForceUpdate {
        /// Relation name
        relation: String,

        /// Side whose records are pushed
        #[arg(short, long, value_enum)]
        source: SourceArg,
    },

    /// Delete and recreate one side's counterparts from the other side
    Reset {
        /// Relation name
        relation: String,

        /// Side whose records are the template
        #[arg(short, long, value_enum)]
        source: SourceArg,
    },

    /// Remove the lock marker left by a crashed run
    Unlock {
        /// Relation name
        relation: String,

        /// Restore the map to the pre-run snapshot first
        #[arg(long)]
        rollback: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Sync { relation, rebuild } => {
            commands::sync::run(&cli.config, relation.as_deref(), rebuild)?;
        }
        Commands::ForceUpdate { relation, source } => {
            commands::force_update::run(&cli.config, &relation, source.into())?;
        }
        Commands::Reset { relation, source } => {
            commands::reset::run(&cli.config, &relation, source.into())?;
        }
        Commands::Unlock { relation, rollback } => {
            commands::unlock::run(&cli.config, &relation, rollback)?;
        }
    }

    Ok(())
}
