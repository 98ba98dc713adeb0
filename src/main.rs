// src/main.rs
// =============================================================================
// Entry point of the parcel-frontier CLI.
//
// What happens here:
// 1. Set up logging (RUST_LOG overrides the default "info")
// 2. Parse command-line arguments using clap
// 3. Load the config and open the database
// 4. Dispatch to the subcommand handler
// 5. Exit with a proper code (0 = success, 2 = error)
//
// The crawl itself is sequential, so a current-thread runtime is enough.
// =============================================================================

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parcel_frontier::store::QueueCounts;
use parcel_frontier::tabular::{export_results, import_seed_file};
use parcel_frontier::{
    BoundaryRegion, CrawlReport, Crawler, CrawlerConfig, Database, HttpParcelFetcher,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let exit_code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e:#}");
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl {
            config,
            json,
            no_export,
        } => handle_crawl(&config, json, no_export).await,
        Commands::Export { config, output } => {
            let config = load_config(&config)?;
            let db = open_database(&config)?;
            let path = output.unwrap_or(config.output_path);
            let rows = export_results(&db.results(), &path)?;
            println!("📄 Exported {} parcel(s) to {}", rows, path.display());
            Ok(())
        }
        Commands::Status { config, json } => {
            let config = load_config(&config)?;
            let db = open_database(&config)?;
            let counts = db.jobs().counts()?;
            let records = db.results().count()?;
            print_status(&counts, records, json)
        }
    }
}

// Seeds the queue on first run, crawls, then exports
async fn handle_crawl(config_path: &Path, json: bool, no_export: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let db = open_database(&config)?;

    let region = BoundaryRegion::load(&config.region_path).with_context(|| {
        format!("loading region from {}", config.region_path.display())
    })?;

    let seeded = import_seed_file(&config.seeds_path, &db.jobs(), &region)
        .with_context(|| format!("importing seeds from {}", config.seeds_path.display()))?;
    if !seeded.resumed_existing {
        println!(
            "🌱 Seeded {} job(s), {} outside the region",
            seeded.imported, seeded.outside_region
        );
    }

    let fetcher = HttpParcelFetcher::new(&config.fetcher)?;
    let crawler = Crawler::new(&db, &region, &fetcher, &config.crawl)?;
    let report = crawler.run().await.context("crawl aborted")?;

    if !no_export {
        let rows = export_results(&db.results(), &config.output_path)?;
        println!(
            "📄 Exported {} parcel(s) to {}",
            rows,
            config.output_path.display()
        );
    }

    print_report(&report, json)
}

fn load_config(path: &Path) -> Result<CrawlerConfig> {
    CrawlerConfig::load(path).with_context(|| format!("loading config {}", path.display()))
}

fn open_database(config: &CrawlerConfig) -> Result<Database> {
    if let Some(parent) = config
        .database_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Database::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path.display()))
}

fn print_report(report: &CrawlReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{:<24} {:>10}", "METRIC", "VALUE");
    println!("{}", "=".repeat(35));
    let rows = [
        ("rounds", report.rounds),
        ("drain passes", report.drain_passes),
        ("jobs processed", report.jobs_processed),
        ("jobs skipped", report.jobs_skipped),
        ("lookups", report.fetches),
        ("failed lookups", report.fetch_failures),
        ("parcels recorded", report.records_inserted),
        ("duplicates", report.duplicates),
        ("frontier jobs queued", report.probes_enqueued),
    ];
    for (name, value) in rows {
        println!("{:<24} {:>10}", name, value);
    }
    println!();

    if report.drained {
        println!("✅ Queue drained");
    } else {
        println!("⏸️  Stopped with jobs still queued; rerun to continue");
    }
    Ok(())
}

fn print_status(counts: &QueueCounts, records: usize, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "jobs": counts,
            "records": records,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("📊 Queue:");
    println!("   TODO:       {}", counts.todo);
    println!("   PROCESSING: {}", counts.processing);
    println!("   DONE:       {}", counts.done);
    println!("   Total:      {}", counts.total());
    println!("📋 Parcels recorded: {}", records);
    Ok(())
}
