// src/store/mod.rs
// =============================================================================
// SQLite-backed persistence.
//
// Submodules:
// - schema: opening the database and creating the tables
// - jobs: the work queue and its TODO -> PROCESSING -> DONE state machine
// - results: append-only parcel records keyed by canonical geometry
//
// `Database` owns the connection; `jobs()` and `results()` hand out cheap
// borrowed views so both tables share one connection.
// =============================================================================

mod jobs;
mod results;
mod schema;

pub use jobs::{Job, JobStatus, QueueCounts, WorkQueueStore};
pub use results::{InsertOutcome, ParcelRecord, ResultStore};
pub use schema::Database;
