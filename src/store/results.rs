// src/store/results.rs
// =============================================================================
// Append-only table of discovered parcels.
//
// Each row holds the canonical geometry key (UNIQUE), the job that led to the
// parcel, the parcel's bounding box and the raw JSON payload returned by the
// lookup service. Rows are never updated or removed.
// =============================================================================

use geo::{BoundingRect, Intersects, MultiPolygon, Point};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::error::{GeometryError, StoreError};
use crate::geometry::{canonical_key, parse_multipolygon};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParcelRecord {
    pub id: i64,
    pub origin_job_id: i64,
    pub geometry_key: String,
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    /// A record with the same geometry key already exists
    Duplicate,
}

#[derive(Debug, Clone, Copy)]
pub struct ResultStore<'a> {
    conn: &'a Connection,
}

impl<'a> ResultStore<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Inserts unless the geometry key is already stored.
    ///
    /// The UNIQUE constraint does the check, so there is no window between
    /// "is it known" and "insert it".
    pub fn insert_unique(
        &self,
        origin_job_id: i64,
        geometry: &MultiPolygon<f64>,
        attributes: &serde_json::Value,
    ) -> Result<InsertOutcome, StoreError> {
        let key = canonical_key(geometry);
        let bbox = geometry
            .bounding_rect()
            .ok_or_else(|| GeometryError::Malformed("geometry has no extent".into()))?;
        let data = serde_json::to_string(attributes)?;

        let changed = self.conn.execute(
            "INSERT INTO results (origin_job_id, geometry_key, min_x, min_y, max_x, max_y, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (geometry_key) DO NOTHING",
            params![
                origin_job_id,
                key,
                bbox.min().x,
                bbox.min().y,
                bbox.max().x,
                bbox.max().y,
                data
            ],
        )?;

        if changed == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted(self.conn.last_insert_rowid()))
        }
    }

    pub fn is_known(&self, geometry_key: &str) -> Result<bool, StoreError> {
        let known = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM results WHERE geometry_key = ?1)",
            params![geometry_key],
            |row| row.get(0),
        )?;
        Ok(known)
    }

    /// True when the point lies inside (or on the edge of) any stored parcel.
    ///
    /// The bounding-box columns narrow the candidates; the exact test runs on
    /// the parsed geometry of each candidate.
    pub fn covers(&self, point: Point<f64>) -> Result<bool, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT geometry_key FROM results
             WHERE min_x <= ?1 AND max_x >= ?1 AND min_y <= ?2 AND max_y >= ?2",
        )?;
        let mut rows = stmt.query(params![point.x(), point.y()])?;

        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let shape = parse_multipolygon(&key)?;
            if shape.intersects(&point) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn all(&self) -> Result<Vec<ParcelRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, origin_job_id, geometry_key, data FROM results ORDER BY id")?;
        let raw = stmt
            .query_map([], raw_record)?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, origin_job_id, geometry_key, data)| {
                Ok(ParcelRecord {
                    id,
                    origin_job_id,
                    geometry_key,
                    attributes: serde_json::from_str(&data)?,
                })
            })
            .collect()
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn raw_record(row: &Row<'_>) -> rusqlite::Result<(i64, i64, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}
