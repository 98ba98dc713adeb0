// src/tabular/mod.rs
// =============================================================================
// CSV in and out of the crawl.
//
// Submodules:
// - seeds: reading seed coordinates into an empty queue
// - export: flattening parcel payloads into one wide CSV
// =============================================================================

mod export;
mod seeds;

pub use export::{export_results, flatten_record, normalize_field_name, write_records};
pub use seeds::{import_seed_file, read_seeds, seed_queue, SeedImport};
