// src/store/jobs.rs
// =============================================================================
// The durable work queue.
//
// A job is a coordinate waiting to be explored. Its status only ever moves
// forward:
//
//     TODO  --claim-->  PROCESSING  --complete-->  DONE
//
// Jobs are never deleted and never put back to TODO. New frontier points
// become new jobs instead.
//
// `claim` is a conditional UPDATE (only if the row is still TODO), so two
// connections racing for the same job cannot both win.
// =============================================================================

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, Row, ToSql};
use serde::Serialize;
use std::fmt;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Todo,
    Processing,
    Done,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Todo => "TODO",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Done => "DONE",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for JobStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for JobStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "TODO" => Ok(JobStatus::Todo),
            "PROCESSING" => Ok(JobStatus::Processing),
            "DONE" => Ok(JobStatus::Done),
            other => Err(FromSqlError::Other(
                format!("unknown job status '{other}'").into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: i64,
    pub lat: f64,
    pub lng: f64,
    pub status: JobStatus,
}

impl Job {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            lat: row.get(1)?,
            lng: row.get(2)?,
            status: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub todo: usize,
    pub processing: usize,
    pub done: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.todo + self.processing + self.done
    }
}

/// Borrowed view over the `jobs` table
#[derive(Debug, Clone, Copy)]
pub struct WorkQueueStore<'a> {
    conn: &'a Connection,
}

impl<'a> WorkQueueStore<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// All TODO jobs in insertion order
    pub fn list_pending(&self) -> Result<Vec<Job>, StoreError> {
        self.list_with_status(JobStatus::Todo)
    }

    /// Jobs left in PROCESSING, e.g. by a crash mid-round
    pub fn stalled(&self) -> Result<Vec<Job>, StoreError> {
        self.list_with_status(JobStatus::Processing)
    }

    fn list_with_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, lat, lng, status FROM jobs WHERE status = ?1 ORDER BY id")?;
        let jobs = stmt
            .query_map(params![status], Job::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// TODO -> PROCESSING. Returns false if someone else already holds it.
    pub fn claim(&self, job_id: i64) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE jobs SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![JobStatus::Processing, job_id, JobStatus::Todo],
        )?;
        Ok(changed == 1)
    }

    /// PROCESSING -> DONE
    pub fn complete(&self, job_id: i64) -> Result<(), StoreError> {
        mark_done(self.conn, job_id)
    }

    pub fn enqueue(&self, lat: f64, lng: f64) -> Result<Job, StoreError> {
        insert_todo(self.conn, lat, lng)
    }

    // Finishes a job and queues its frontier in one transaction.
    //
    // Parameters:
    //   job_id:   the PROCESSING job being finished
    //   frontier: (lat, lng) of every probe the job produced
    //
    // Returns: the new TODO jobs, in frontier order.
    //
    // Either the job is DONE and all its probes are queued, or nothing changed
    // and the job is still PROCESSING. A crash can never leave a DONE job whose
    // frontier went missing.
    pub fn complete_with_frontier(
        &self,
        job_id: i64,
        frontier: &[(f64, f64)],
    ) -> Result<Vec<Job>, StoreError> {
        // The view only borrows the connection, hence unchecked
        let tx = self.conn.unchecked_transaction()?;
        let queued = frontier
            .iter()
            .map(|&(lat, lng)| insert_todo(&tx, lat, lng))
            .collect::<Result<Vec<_>, _>>()?;
        mark_done(&tx, job_id)?;
        tx.commit()?;
        Ok(queued)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        let any: bool = self
            .conn
            .query_row("SELECT EXISTS(SELECT 1 FROM jobs)", [], |row| row.get(0))?;
        Ok(!any)
    }

    pub fn counts(&self) -> Result<QueueCounts, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, JobStatus>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let (status, count) = row?;
            let count = count as usize;
            match status {
                JobStatus::Todo => counts.todo = count,
                JobStatus::Processing => counts.processing = count,
                JobStatus::Done => counts.done = count,
            }
        }
        Ok(counts)
    }
}

fn mark_done(conn: &Connection, job_id: i64) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = ?1 WHERE id = ?2 AND status = ?3",
        params![JobStatus::Done, job_id, JobStatus::Processing],
    )?;
    if changed == 1 {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            job_id,
            expected: JobStatus::Processing.as_str(),
        })
    }
}

fn insert_todo(conn: &Connection, lat: f64, lng: f64) -> Result<Job, StoreError> {
    conn.execute(
        "INSERT INTO jobs (lat, lng, status) VALUES (?1, ?2, ?3)",
        params![lat, lng, JobStatus::Todo],
    )?;
    Ok(Job {
        id: conn.last_insert_rowid(),
        lat,
        lng,
        status: JobStatus::Todo,
    })
}

// Lookups only the tests need
#[cfg(test)]
impl WorkQueueStore<'_> {
    pub fn get(&self, job_id: i64) -> Result<Option<Job>, StoreError> {
        use rusqlite::OptionalExtension;

        let job = self
            .conn
            .query_row(
                "SELECT id, lat, lng, status FROM jobs WHERE id = ?1",
                params![job_id],
                Job::from_row,
            )
            .optional()?;
        Ok(job)
    }

    pub fn all(&self) -> Result<Vec<Job>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, lat, lng, status FROM jobs ORDER BY id")?;
        let jobs = stmt
            .query_map([], Job::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }
}
