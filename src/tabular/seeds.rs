// src/tabular/seeds.rs
// =============================================================================
// Loading seed coordinates into the work queue.
//
// The seed file is a CSV with `lat` and `lng` columns (extra columns are
// ignored). Seeding only happens into an empty queue: on a rerun the existing
// queue is resumed as-is instead of being seeded a second time.
// =============================================================================

use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::error::CrawlError;
use crate::geometry::BoundaryRegion;
use crate::store::WorkQueueStore;

#[derive(Debug, Deserialize)]
struct SeedRow {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedImport {
    pub imported: usize,
    pub outside_region: usize,
    /// True when the queue already had jobs and nothing was imported
    pub resumed_existing: bool,
}

/// Reads `(lat, lng)` pairs from CSV
pub fn read_seeds<R: Read>(reader: R) -> Result<Vec<(f64, f64)>, csv::Error> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
        .deserialize::<SeedRow>()
        .map(|row| row.map(|r| (r.lat, r.lng)))
        .collect()
}

// Seeds the queue from a CSV file, but only on the very first run.
//
// Parameters:
//   path:   CSV with `lat` and `lng` headers
//   jobs:   the queue to fill
//   region: seeds outside it are counted and dropped
//
// Returns: how many seeds were queued or dropped, or `resumed_existing` when
// the queue already had jobs and the file was not read at all.
pub fn import_seed_file(
    path: &Path,
    jobs: &WorkQueueStore<'_>,
    region: &BoundaryRegion,
) -> Result<SeedImport, CrawlError> {
    if !jobs.is_empty()? {
        info!("queue already populated; resuming without seeding");
        return Ok(SeedImport {
            resumed_existing: true,
            ..SeedImport::default()
        });
    }
    let seeds = read_seeds(std::fs::File::open(path)?)?;
    seed_queue(seeds, jobs, region)
}

/// Enqueues every seed inside the region as a TODO job
pub fn seed_queue(
    seeds: impl IntoIterator<Item = (f64, f64)>,
    jobs: &WorkQueueStore<'_>,
    region: &BoundaryRegion,
) -> Result<SeedImport, CrawlError> {
    let mut summary = SeedImport::default();
    for (lat, lng) in seeds {
        if !region.contains_lat_lng(lat, lng) {
            debug!(lat, lng, "seed outside region; dropped");
            summary.outside_region += 1;
            continue;
        }
        jobs.enqueue(lat, lng)?;
        summary.imported += 1;
    }
    info!(
        imported = summary.imported,
        outside_region = summary.outside_region,
        "seeded queue"
    );
    Ok(summary)
}
