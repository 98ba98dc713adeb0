// src/lib.rs
// =============================================================================
// parcel-frontier: discover adjacent land parcels outward from seed points.
//
// Starting from seed coordinates, the crawler asks a lookup service for the
// parcel under each point, samples probe points on rings just outside that
// parcel, and queues the probes that land in unexplored territory. Rounds
// repeat until the frontier inside the region is exhausted.
//
// Modules:
// - config: TOML configuration
// - error: error types for every layer
// - geometry: WKT, the region filter and probe generation
// - store: SQLite job queue and results
// - fetch: the parcel lookup (trait + HTTP client)
// - crawl: deduplication and the round/drain loop
// - tabular: seed CSV import and results CSV export
// =============================================================================

pub mod config;
pub mod crawl;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod store;
pub mod tabular;

pub use config::{BufferSpec, CrawlSettings, CrawlerConfig, FetcherConfig};
pub use crawl::{CrawlReport, Crawler};
pub use error::{ConfigError, CrawlError, FetchError, GeometryError, StoreError};
pub use fetch::{HttpParcelFetcher, ParcelFetcher, ParcelHit};
pub use geometry::{BoundaryRegion, BufferPointGenerator};
pub use store::{Database, Job, JobStatus, ParcelRecord, WorkQueueStore};
