// src/crawl/orchestrator.rs
// =============================================================================
// The frontier crawl: bounded breadth-first rounds, then a drain phase.
//
// How it works:
// 1. Take a snapshot of every TODO job
// 2. For each job: claim it, look up its parcel, record the parcel, sample
//    probe points around it, look up and record what each probe hits
// 3. Mark the job DONE (always, even when it was skipped) and enqueue its
//    probes as new jobs, both in one commit
// 4. New jobs are not in the snapshot, so round N's discoveries are explored
//    in round N+1
// 5. Repeat for `rounds` rounds, then keep going ("drain") until no TODO
//    jobs remain or the optional drain cap is hit
//
// Politeness:
// - Every lookup is followed by a fixed pause
// - Lookups run strictly one after another
//
// Failures:
// - A failed lookup is logged and treated as "no parcel there"
// - A malformed parcel shape skips that job's expansion only
// - Store errors stop the crawl; the queue on disk stays consistent, and a
//   rerun picks up every frontier job already committed
// =============================================================================

use geo::Point;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::dedup::{Deduplicator, FrontierGate};
use crate::config::{BufferSpec, CrawlSettings};
use crate::error::{ConfigError, CrawlError};
use crate::fetch::{ParcelFetcher, ParcelHit};
use crate::geometry::{BoundaryRegion, BufferPointGenerator};
use crate::store::{Database, InsertOutcome, Job};

/// What a crawl run did, for the final summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub rounds: usize,
    pub drain_passes: usize,
    pub jobs_processed: usize,
    pub jobs_skipped: usize,
    pub fetches: usize,
    pub fetch_failures: usize,
    pub records_inserted: usize,
    pub duplicates: usize,
    pub probes_enqueued: usize,
    /// True when the run ended with no TODO jobs left
    pub drained: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Round(usize),
    Drain(usize),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Round(n) => write!(f, "round {n}"),
            Phase::Drain(n) => write!(f, "drain pass {n}"),
        }
    }
}

pub struct Crawler<'a, F> {
    db: &'a Database,
    region: &'a BoundaryRegion,
    fetcher: &'a F,
    dedup: Deduplicator<'a>,
    buffers: BufferSpec,
    num_points: usize,
    rounds: usize,
    request_delay: Duration,
    drain_pass_limit: Option<usize>,
}

impl<'a, F: ParcelFetcher> Crawler<'a, F> {
    pub fn new(
        db: &'a Database,
        region: &'a BoundaryRegion,
        fetcher: &'a F,
        settings: &CrawlSettings,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            db,
            region,
            fetcher,
            dedup: Deduplicator::new(db.results()),
            buffers: settings.buffer_spec()?,
            num_points: settings.num_points,
            rounds: settings.rounds,
            request_delay: settings.request_delay(),
            drain_pass_limit: settings.drain_pass_limit,
        })
    }

    /// Runs the bounded rounds and the drain phase over the current queue
    pub async fn run(&self) -> Result<CrawlReport, CrawlError> {
        let mut report = CrawlReport::default();

        let stalled = self.db.jobs().stalled()?;
        if !stalled.is_empty() {
            warn!(
                count = stalled.len(),
                "jobs left in PROCESSING by an earlier run; they will not be retried"
            );
        }

        for round in 1..=self.rounds {
            if !self.run_pass(Phase::Round(round), &mut report).await? {
                info!(round, "queue empty; ending rounds early");
                break;
            }
            report.rounds += 1;
        }

        loop {
            if self
                .drain_pass_limit
                .is_some_and(|limit| report.drain_passes >= limit)
            {
                info!(passes = report.drain_passes, "drain pass limit reached");
                break;
            }
            if !self
                .run_pass(Phase::Drain(report.drain_passes + 1), &mut report)
                .await?
            {
                break;
            }
            report.drain_passes += 1;
        }

        report.drained = self.db.jobs().counts()?.todo == 0;
        info!(
            rounds = report.rounds,
            drain_passes = report.drain_passes,
            jobs = report.jobs_processed,
            records = report.records_inserted,
            drained = report.drained,
            "crawl finished"
        );
        Ok(report)
    }

    // Processes one TODO snapshot. Returns false if there was nothing to do.
    async fn run_pass(&self, phase: Phase, report: &mut CrawlReport) -> Result<bool, CrawlError> {
        let jobs = self.db.jobs();
        let pending = jobs.list_pending()?;
        if pending.is_empty() {
            return Ok(false);
        }
        info!(%phase, pending = pending.len(), "starting pass");

        let queued_before = report.probes_enqueued;
        for job in &pending {
            if !jobs.claim(job.id)? {
                debug!(job_id = job.id, "job already claimed; skipping");
                continue;
            }

            let probes = self.process_job(job, report).await?;
            self.finish(job, &probes, report)?;
        }

        info!(%phase, new_jobs = report.probes_enqueued - queued_before, "pass finished");
        Ok(true)
    }

    // Everything for one claimed job.
    //
    // Parameters:
    //   job:    a job this pass has just claimed
    //   report: counters to bump
    //
    // Returns: the probe points to enqueue as the job's frontier (empty when
    // the job was skipped or produced nothing new).
    async fn process_job(
        &self,
        job: &Job,
        report: &mut CrawlReport,
    ) -> Result<Vec<Point<f64>>, CrawlError> {
        if !self.region.contains_lat_lng(job.lat, job.lng) {
            debug!(job_id = job.id, lat = job.lat, lng = job.lng, "job outside region");
            report.jobs_skipped += 1;
            return Ok(Vec::new());
        }

        let Some(parcel) = self.lookup(job.lat, job.lng, report).await else {
            debug!(job_id = job.id, "no parcel at job location");
            report.jobs_skipped += 1;
            return Ok(Vec::new());
        };
        self.record(job.id, &parcel, report)?;

        if !self.region.contains_polygon(parcel.polygon()) {
            debug!(job_id = job.id, "parcel crosses the region outline; not expanding");
            return Ok(Vec::new());
        }

        let gate = FrontierGate::new(self.region, &self.dedup);
        let generator = BufferPointGenerator::new(&self.buffers, self.num_points);
        let probes = match generator.generate(parcel.polygon(), &gate) {
            Ok(Some(probes)) => probes,
            Ok(None) => {
                debug!(job_id = job.id, "no new frontier around parcel");
                return Ok(Vec::new());
            }
            Err(CrawlError::Geometry(e)) => {
                warn!(job_id = job.id, error = %e, "cannot buffer parcel; skipping expansion");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let probes = self.region.retain_inside(probes);
        let mut frontier = Vec::with_capacity(probes.len());
        for probe in probes {
            // An earlier probe of this job may have just recorded this spot
            if self.dedup.covers_known_parcel(probe)? {
                debug!(job_id = job.id, x = probe.x(), y = probe.y(), "probe inside a recorded parcel");
                continue;
            }
            if let Some(hit) = self.lookup(probe.y(), probe.x(), report).await {
                // Attributed to the job that produced the probe
                self.record(job.id, &hit, report)?;
            }
            frontier.push(probe);
        }

        Ok(frontier)
    }

    // Marks the job DONE together with its frontier.
    //
    // Parameters:
    //   job:    the claimed job
    //   probes: the points it produced, as (x, y) = (lng, lat)
    //
    // The job must not reach DONE without its probes being queued: its probe
    // parcels are already recorded, so nothing would ever queue them again.
    fn finish(
        &self,
        job: &Job,
        probes: &[Point<f64>],
        report: &mut CrawlReport,
    ) -> Result<(), CrawlError> {
        let jobs = self.db.jobs();
        if probes.is_empty() {
            jobs.complete(job.id)?;
        } else {
            let frontier: Vec<(f64, f64)> = probes.iter().map(|p| (p.y(), p.x())).collect();
            for queued in jobs.complete_with_frontier(job.id, &frontier)? {
                debug!(
                    job_id = queued.id,
                    origin_job_id = job.id,
                    lat = queued.lat,
                    lng = queued.lng,
                    "frontier job queued"
                );
            }
            report.probes_enqueued += frontier.len();
        }
        report.jobs_processed += 1;
        Ok(())
    }

    // One call to the parcel service, followed by the politeness pause.
    //
    // Returns: the parcel under (lat, lng), or None when there is none or the
    // call failed. Failures are counted and logged, never propagated.
    async fn lookup(&self, lat: f64, lng: f64, report: &mut CrawlReport) -> Option<ParcelHit> {
        report.fetches += 1;
        let result = self.fetcher.fetch(lat, lng).await;

        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        match result {
            Ok(hit) => hit,
            Err(e) => {
                report.fetch_failures += 1;
                warn!(lat, lng, kind = e.kind(), error = %e, "parcel lookup failed");
                None
            }
        }
    }

    fn record(
        &self,
        origin_job_id: i64,
        hit: &ParcelHit,
        report: &mut CrawlReport,
    ) -> Result<(), CrawlError> {
        match self.dedup.record(origin_job_id, hit)? {
            InsertOutcome::Inserted(_) => report.records_inserted += 1,
            InsertOutcome::Duplicate => report.duplicates += 1,
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. How do rounds stay breadth-first if probes are queued right away?
//    - list_pending() returns a Vec, a snapshot taken before the pass starts
//    - Jobs queued during the pass are not in that Vec, so they wait for the
//      next pass even though they are already on disk
//
// 2. Why queue the frontier in the same commit as DONE?
//    - The probe parcels are recorded the moment they are fetched
//    - If DONE landed but the frontier did not, the gate would reject those
//      parcels forever and the crawl would stop short of them
//    - With one commit a crash leaves the job in PROCESSING instead
//
// 3. Why is the job marked DONE even when it was skipped?
//    - A job that stays in PROCESSING would never be looked at again
//    - DONE means "handled", not "produced something"
//
// 4. Why &mut CrawlReport instead of returning counts?
//    - Several helpers bump different counters; one mutable borrow threads
//      through them without extra plumbing
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::geometry::parse_multipolygon;
    use crate::store::JobStatus;
    use geo::{Contains, MultiPolygon};
    use serde_json::json;
    use std::cell::Cell;
    use std::collections::HashSet;

    // A 3x3 grid of unit parcels covering [0,3] x [0,3]
    struct GridFetcher {
        cells: Vec<MultiPolygon<f64>>,
        calls: Cell<usize>,
    }

    impl GridFetcher {
        fn new() -> Self {
            let mut cells = Vec::new();
            for x in 0..3 {
                for y in 0..3 {
                    let (x0, y0, x1, y1) = (x as f64, y as f64, x as f64 + 1.0, y as f64 + 1.0);
                    let wkt = format!("POLYGON(({x0} {y0},{x0} {y1},{x1} {y1},{x1} {y0},{x0} {y0}))");
                    cells.push(parse_multipolygon(&wkt).unwrap());
                }
            }
            Self {
                cells,
                calls: Cell::new(0),
            }
        }
    }

    impl ParcelFetcher for GridFetcher {
        async fn fetch(&self, lat: f64, lng: f64) -> Result<Option<ParcelHit>, FetchError> {
            self.calls.set(self.calls.get() + 1);
            let point = Point::new(lng, lat);
            let hit = self
                .cells
                .iter()
                .find(|cell| cell.contains(&point))
                .map(|cell| {
                    ParcelHit::new(
                        cell.clone(),
                        json!({"parcel_data": {"cell": format!("{:?}", cell.0[0].exterior().0[0])}}),
                    )
                })
                .transpose()?;
            Ok(hit)
        }
    }

    struct FailingFetcher {
        calls: Cell<usize>,
    }

    impl ParcelFetcher for FailingFetcher {
        async fn fetch(&self, _lat: f64, _lng: f64) -> Result<Option<ParcelHit>, FetchError> {
            self.calls.set(self.calls.get() + 1);
            Err(FetchError::Status(503))
        }
    }

    fn region() -> BoundaryRegion {
        BoundaryRegion::from_wkt("POLYGON((-0.5 -0.5,-0.5 3.5,3.5 3.5,3.5 -0.5,-0.5 -0.5))").unwrap()
    }

    fn settings(num_points: usize) -> CrawlSettings {
        CrawlSettings {
            rounds: 3,
            buffer_distances: vec![0.0001, 0.0002, 0.01],
            num_points,
            request_delay_ms: 0,
            drain_pass_limit: None,
        }
    }

    #[tokio::test]
    async fn test_seed_outside_region_does_nothing() {
        let db = Database::open_in_memory().unwrap();
        let region = region();
        let fetcher = GridFetcher::new();
        let seed = db.jobs().enqueue(34.000, -101.500).unwrap();

        let report = Crawler::new(&db, &region, &fetcher, &settings(4))
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(fetcher.calls.get(), 0);
        assert_eq!(report.jobs_skipped, 1);
        assert_eq!(report.probes_enqueued, 0);
        let jobs = db.jobs().all().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(db.jobs().get(seed.id).unwrap().unwrap().status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_grid_crawl_terminates_and_drains() {
        let db = Database::open_in_memory().unwrap();
        let region = region();
        let fetcher = GridFetcher::new();
        db.jobs().enqueue(0.5, 0.5).unwrap();

        let mut budget = settings(8);
        budget.drain_pass_limit = Some(10);

        let report = Crawler::new(&db, &region, &fetcher, &budget)
            .unwrap()
            .run()
            .await
            .unwrap();

        // Finished inside the budget, not stopped by it
        assert!(report.drained);
        assert!(report.rounds <= 3);
        assert!(report.drain_passes < 10, "used {} drain passes", report.drain_passes);

        let counts = db.jobs().counts().unwrap();
        assert_eq!(counts.todo, 0);
        assert_eq!(counts.processing, 0);
        assert_eq!(counts.done, report.jobs_processed);

        // Every cell of the grid is found exactly once
        let records = db.results().all().unwrap();
        assert_eq!(records.len(), 9);
        assert_eq!(report.records_inserted, 9);

        let keys: HashSet<_> = records.iter().map(|r| r.geometry_key.clone()).collect();
        assert_eq!(keys.len(), records.len(), "geometry keys must be unique");
    }

    // Wraps the grid and takes the results table offline (via a trigger from
    // a second connection) the first time it is asked about `fail_at`
    struct FailingStoreFetcher {
        grid: GridFetcher,
        db_path: std::path::PathBuf,
        fail_at: (f64, f64),
        tripped: Cell<bool>,
    }

    impl ParcelFetcher for FailingStoreFetcher {
        async fn fetch(&self, lat: f64, lng: f64) -> Result<Option<ParcelHit>, FetchError> {
            if !self.tripped.get() && (lat, lng) == self.fail_at {
                self.tripped.set(true);
                rusqlite::Connection::open(&self.db_path)
                    .unwrap()
                    .execute_batch(
                        "CREATE TRIGGER results_offline BEFORE INSERT ON results
                         BEGIN SELECT RAISE(ABORT, 'results offline'); END;",
                    )
                    .unwrap();
            }
            self.grid.fetch(lat, lng).await
        }
    }

    #[tokio::test]
    async fn test_interrupted_pass_keeps_finished_frontier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.db");
        let db = Database::open(&path).unwrap();
        let region = region();
        let first = db.jobs().enqueue(0.5, 0.5).unwrap();
        let second = db.jobs().enqueue(2.5, 2.5).unwrap();

        // The second job's own parcel cannot be stored, so the pass aborts
        let fetcher = FailingStoreFetcher {
            grid: GridFetcher::new(),
            db_path: path.clone(),
            fail_at: (2.5, 2.5),
            tripped: Cell::new(false),
        };
        let err = Crawler::new(&db, &region, &fetcher, &settings(8))
            .unwrap()
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Store(_)), "unexpected error {err:?}");

        // The first job finished with its frontier; the second is stuck
        assert_eq!(db.jobs().get(first.id).unwrap().unwrap().status, JobStatus::Done);
        assert_eq!(db.jobs().get(second.id).unwrap().unwrap().status, JobStatus::Processing);
        assert!(db.jobs().counts().unwrap().todo > 0, "finished job lost its frontier");
        let found_before = db.results().count().unwrap();
        assert!(found_before < 9);

        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("DROP TRIGGER results_offline;")
            .unwrap();

        // A rerun explores the rest of the grid from the committed frontier
        let fetcher = GridFetcher::new();
        let report = Crawler::new(&db, &region, &fetcher, &settings(8))
            .unwrap()
            .run()
            .await
            .unwrap();
        assert!(report.drained);
        assert!(report.fetches > 0);
        assert_eq!(db.results().count().unwrap(), 9);
        assert_eq!(db.jobs().stalled().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_probes_outside_region_never_enqueued() {
        let db = Database::open_in_memory().unwrap();
        // Region hugs the grid, so rings around edge parcels leave it
        let region = BoundaryRegion::from_wkt(
            "POLYGON((-0.00005 -0.00005,-0.00005 3.00005,3.00005 3.00005,3.00005 -0.00005,-0.00005 -0.00005))",
        )
        .unwrap();
        let fetcher = GridFetcher::new();
        db.jobs().enqueue(1.5, 1.5).unwrap();

        Crawler::new(&db, &region, &fetcher, &settings(8))
            .unwrap()
            .run()
            .await
            .unwrap();

        for job in db.jobs().all().unwrap() {
            assert!(
                region.contains_lat_lng(job.lat, job.lng),
                "job {} at ({}, {}) is outside the region",
                job.id,
                job.lat,
                job.lng
            );
        }
    }

    #[tokio::test]
    async fn test_known_parcels_block_the_frontier() {
        let db = Database::open_in_memory().unwrap();
        let region = region();
        let fetcher = GridFetcher::new();
        let seed = db.jobs().enqueue(1.5, 1.5).unwrap();

        // Every parcel is already recorded
        for cell in &fetcher.cells {
            db.results().insert_unique(seed.id, cell, &json!({})).unwrap();
        }

        let report = Crawler::new(&db, &region, &fetcher, &settings(4))
            .unwrap()
            .run()
            .await
            .unwrap();

        // Only the seed's own lookup happened, and it was a duplicate
        assert_eq!(fetcher.calls.get(), 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.probes_enqueued, 0);
        assert_eq!(db.jobs().all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_new_jobs_wait_for_next_round() {
        let db = Database::open_in_memory().unwrap();
        let region = region();
        let fetcher = GridFetcher::new();
        db.jobs().enqueue(0.5, 0.5).unwrap();

        let mut one_round = settings(4);
        one_round.rounds = 1;
        one_round.drain_pass_limit = Some(0);

        let report = Crawler::new(&db, &region, &fetcher, &one_round)
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(report.rounds, 1);
        assert_eq!(report.jobs_processed, 1);
        assert!(report.probes_enqueued > 0);
        assert!(!report.drained);
        assert_eq!(db.jobs().counts().unwrap().todo, report.probes_enqueued);
    }

    #[tokio::test]
    async fn test_fetch_failures_do_not_stop_the_crawl() {
        let db = Database::open_in_memory().unwrap();
        let region = region();
        let fetcher = FailingFetcher { calls: Cell::new(0) };
        db.jobs().enqueue(0.5, 0.5).unwrap();
        db.jobs().enqueue(1.5, 1.5).unwrap();

        let report = Crawler::new(&db, &region, &fetcher, &settings(4))
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(fetcher.calls.get(), 2);
        assert_eq!(report.fetch_failures, 2);
        assert_eq!(report.jobs_skipped, 2);
        assert_eq!(db.jobs().counts().unwrap().done, 2);
        assert_eq!(db.results().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_queue_finishes_immediately() {
        let db = Database::open_in_memory().unwrap();
        let region = region();
        let fetcher = GridFetcher::new();

        let report = Crawler::new(&db, &region, &fetcher, &settings(4))
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(report.rounds, 0);
        assert_eq!(report.drain_passes, 0);
        assert!(report.drained);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let db = Database::open_in_memory().unwrap();
        let region = region();
        let fetcher = GridFetcher::new();
        let mut bad = settings(4);
        bad.buffer_distances = vec![0.01, 0.0001];
        assert!(Crawler::new(&db, &region, &fetcher, &bad).is_err());
    }
}
