// src/store/schema.rs
// =============================================================================
// Opens the SQLite database and makes sure both tables exist.
//
// Tables:
// - jobs:    one row per coordinate to explore (TODO -> PROCESSING -> DONE)
// - results: one row per distinct parcel geometry, with its bounding box so
//            "is this point inside a parcel we already have" is an index scan
//            instead of a pass over every stored shape
//
// The connection stays in autocommit mode: every claim and every insert is
// its own transaction. The one exception is finishing a job, where the DONE
// status and the job's frontier commit together. A crash therefore loses at
// most the job that was being worked on.
// =============================================================================

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use super::jobs::WorkQueueStore;
use super::results::ResultStore;
use crate::error::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lat REAL NOT NULL,
    lng REAL NOT NULL,
    status TEXT NOT NULL CHECK(status IN ('TODO', 'PROCESSING', 'DONE'))
);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status, id);

CREATE TABLE IF NOT EXISTS results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    origin_job_id INTEGER NOT NULL REFERENCES jobs (id),
    geometry_key TEXT NOT NULL UNIQUE,
    min_x REAL NOT NULL,
    min_y REAL NOT NULL,
    max_x REAL NOT NULL,
    max_y REAL NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_results_bbox ON results (min_x, max_x, min_y, max_y);
";

// Lets a second connection wait out a claim in progress instead of failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::bootstrap(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn jobs(&self) -> WorkQueueStore<'_> {
        WorkQueueStore::new(&self.conn)
    }

    pub fn results(&self) -> ResultStore<'_> {
        ResultStore::new(&self.conn)
    }
}
