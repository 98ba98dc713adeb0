// src/crawl/dedup.rs
// =============================================================================
// Keeps the frontier from revisiting known territory.
//
// Two questions are answered against the results table:
// - "Do we already have this exact parcel?"  (geometry key equality)
// - "Is this probe point inside a parcel we already have?"  (bbox + exact test)
//
// Insertion goes through here too: a known key skips the write, and every
// attempt is logged whether it lands as a new record or is a duplicate.
// =============================================================================

use geo::Point;
use tracing::{debug, info};

use crate::error::{CrawlError, StoreError};
use crate::fetch::ParcelHit;
use crate::geometry::{BoundaryRegion, ProbeGate};
use crate::store::{InsertOutcome, ResultStore};

#[derive(Debug, Clone, Copy)]
pub struct Deduplicator<'a> {
    results: ResultStore<'a>,
}

impl<'a> Deduplicator<'a> {
    pub fn new(results: ResultStore<'a>) -> Self {
        Self { results }
    }

    pub fn is_known(&self, geometry_key: &str) -> Result<bool, StoreError> {
        self.results.is_known(geometry_key)
    }

    pub fn covers_known_parcel(&self, point: Point<f64>) -> Result<bool, StoreError> {
        self.results.covers(point)
    }

    // Stores the parcel unless its geometry is already recorded.
    //
    // Parameters:
    //   origin_job_id: the job whose lookup (own or probe) found the parcel
    //   hit:           the parcel as returned by the fetcher
    //
    // Returns: Inserted(record id), or Duplicate when the key was known.
    //
    // Known keys are answered from the key lookup without attempting a write;
    // the unique index still catches a key that appears in between.
    pub fn record(&self, origin_job_id: i64, hit: &ParcelHit) -> Result<InsertOutcome, StoreError> {
        let geometry_key = hit.geometry_key();
        let outcome = if self.is_known(&geometry_key)? {
            InsertOutcome::Duplicate
        } else {
            self.results
                .insert_unique(origin_job_id, hit.geometry(), hit.payload())?
        };

        match outcome {
            InsertOutcome::Inserted(record_id) => {
                info!(record_id, origin_job_id, "recorded new parcel");
            }
            InsertOutcome::Duplicate => {
                debug!(origin_job_id, %geometry_key, "parcel already recorded; skipped");
            }
        }
        Ok(outcome)
    }
}

/// Admits probes that are inside the region and outside every known parcel
#[derive(Debug, Clone, Copy)]
pub struct FrontierGate<'a> {
    region: &'a BoundaryRegion,
    dedup: &'a Deduplicator<'a>,
}

impl<'a> FrontierGate<'a> {
    pub fn new(region: &'a BoundaryRegion, dedup: &'a Deduplicator<'a>) -> Self {
        Self { region, dedup }
    }
}

impl ProbeGate for FrontierGate<'_> {
    fn admits(&self, probe: Point<f64>) -> Result<bool, CrawlError> {
        if !self.region.contains_point(probe) {
            return Ok(false);
        }
        Ok(!self.dedup.covers_known_parcel(probe)?)
    }
}
