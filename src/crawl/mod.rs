// src/crawl/mod.rs
// =============================================================================
// The frontier crawl.
//
// Features:
// - Breadth-first expansion outward from seed coordinates
// - Stays inside one fixed region
// - Skips parcels (and probe points inside parcels) already recorded
// - Bounded rounds, then a drain phase until the queue is empty
// - Polite crawling with a fixed delay between lookups
//
// Submodules:
// - dedup: known-geometry checks and gated insertion
// - orchestrator: the round/drain loop
// =============================================================================

mod dedup;
mod orchestrator;

pub use dedup::{Deduplicator, FrontierGate};
pub use orchestrator::{CrawlReport, Crawler};
