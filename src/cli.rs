// src/cli.rs
// =============================================================================
// Command-line interface, built with clap's derive API.
//
// Subcommands:
// - crawl:  seed the queue (first run only), crawl, then export results
// - export: write the results CSV from the current database
// - status: show queue and results counts
//
// Every subcommand reads the same TOML config file.
// =============================================================================

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "parcel-frontier",
    version,
    about = "Discover adjacent land parcels outward from seed coordinates",
    long_about = "parcel-frontier starts from seed coordinates, looks up the parcel under each one, \
                  and keeps probing just outside every parcel it finds until the region is covered. \
                  Progress lives in a SQLite database, so an interrupted crawl can be resumed."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Seed, crawl and export in one go
    ///
    /// Example: parcel-frontier crawl --config parcel-frontier.toml
    Crawl {
        /// Path to the TOML configuration file
        #[arg(long, default_value = "parcel-frontier.toml")]
        config: PathBuf,

        /// Print the crawl report as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Skip writing the results CSV after the crawl
        #[arg(long)]
        no_export: bool,
    },

    /// Export stored parcels to the configured CSV file
    Export {
        /// Path to the TOML configuration file
        #[arg(long, default_value = "parcel-frontier.toml")]
        config: PathBuf,

        /// Write to this file instead of the configured output_path
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show how many jobs are in each state
    Status {
        /// Path to the TOML configuration file
        #[arg(long, default_value = "parcel-frontier.toml")]
        config: PathBuf,

        /// Output counts as JSON
        #[arg(long)]
        json: bool,
    },
}
