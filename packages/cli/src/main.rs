#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch driver for council diversity scoring and ranking.
//!
//! Opens the `DuckDB` store (`COUNCIL_DIVERSITY_DB` or
//! `data/diversity.duckdb`), loads the TOML configuration, and runs the
//! requested step. Without a subcommand it asks interactively which steps
//! to run.

mod interactive;
mod pipeline;

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use council_diversity::config::DiversityConfig;
use council_diversity_models::{CouncilorType, Factor, LocalityId};
use council_diversity_store::DuckDbStore;

#[derive(Parser)]
#[command(
    name = "council_diversity",
    about = "Council diversity index calculator"
)]
struct Cli {
    /// TOML configuration file (defaults to the built-in configuration)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load councilor records and age histograms from JSON files
    Import {
        /// JSON array of councilor records
        #[arg(long)]
        councilors: Option<PathBuf>,
        /// JSON array of age histogram documents
        #[arg(long)]
        histograms: Option<PathBuf>,
    },
    /// Compute current-council diversity indices
    Snapshot {
        /// Comma-separated locality ids (overrides the configured range)
        #[arg(long)]
        localities: Option<String>,
        /// Comma-separated factors (e.g., "age,gender")
        #[arg(long)]
        factors: Option<String>,
    },
    /// Recompute global ranks from the stored snapshot indices
    Rank {
        /// Comma-separated factors (e.g., "party")
        #[arg(long)]
        factors: Option<String>,
    },
    /// Score and rank the historical age histograms
    History {
        /// Comma-separated councilor types ("elected", "candidate")
        #[arg(long)]
        councilor_types: Option<String>,
    },
    /// Snapshot, rank, then history
    All,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = council_diversity_cli_utils::init_logger();
    let cli = Cli::parse();

    let mut config = DiversityConfig::load_or_embedded(cli.config.as_deref())?;
    let store = DuckDbStore::open_default()?;

    let Some(command) = cli.command else {
        return interactive::run(&store, &config, &multi);
    };

    match command {
        Commands::Import {
            councilors,
            histograms,
        } => {
            if councilors.is_none() && histograms.is_none() {
                return Err("Nothing to import: pass --councilors and/or --histograms".into());
            }
            pipeline::run_import(&store, councilors.as_deref(), histograms.as_deref())?;
        }
        Commands::Snapshot {
            localities,
            factors,
        } => {
            let localities = match localities {
                Some(list) => parse_list::<LocalityId>(&list)?,
                None => pipeline::configured_localities(&store, &config)?,
            };
            if let Some(list) = factors {
                config.snapshot.factors = parse_list::<Factor>(&list)?;
            }
            pipeline::run_snapshot(&store, &localities, &config.snapshot, &multi)?;
        }
        Commands::Rank { factors } => {
            let factors = match factors {
                Some(list) => parse_list::<Factor>(&list)?,
                None => config.snapshot.factors.clone(),
            };
            pipeline::run_rank(&store, &factors, &multi)?;
        }
        Commands::History { councilor_types } => {
            if let Some(list) = councilor_types {
                config.history.councilor_types = parse_list::<CouncilorType>(&list)?;
            }
            pipeline::run_history(&store, config.localities, &config.history, &multi)?;
        }
        Commands::All => {
            pipeline::run_all(&store, &config, &multi)?;
        }
    }

    Ok(())
}

/// Parses a comma-separated list, ignoring blank entries.
fn parse_list<T>(list: &str) -> Result<Vec<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| item.parse::<T>().map_err(|e| format!("Invalid value {item:?}: {e}")))
        .collect()
}
