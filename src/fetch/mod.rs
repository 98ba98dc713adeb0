// src/fetch/mod.rs
// =============================================================================
// Resolving a coordinate to the parcel that covers it.
//
// The crawler only knows the `ParcelFetcher` trait. The real implementation
// (http.rs) talks to the lookup service; tests use an in-memory grid.
//
// Rust concepts:
// - async fn in traits: each call is one request, awaited in sequence
// - Result<Option<T>, E>: "failed" and "nothing there" are different answers
// =============================================================================

mod http;

pub use http::{parse_lookup_response, HttpParcelFetcher};

use geo::{MultiPolygon, Polygon};

use crate::error::{FetchError, GeometryError};
use crate::geometry::{canonical_key, validate_multipolygon};

/// A parcel found at a coordinate: its outline plus the raw payload
#[derive(Debug, Clone)]
pub struct ParcelHit {
    geometry: MultiPolygon<f64>,
    // First member of `geometry`, kept separately so it is always present
    polygon: Polygon<f64>,
    payload: serde_json::Value,
}

impl ParcelHit {
    pub fn new(
        geometry: MultiPolygon<f64>,
        payload: serde_json::Value,
    ) -> Result<Self, GeometryError> {
        validate_multipolygon(&geometry)?;
        let polygon = geometry
            .0
            .first()
            .cloned()
            .ok_or_else(|| GeometryError::Malformed("parcel has no polygons".into()))?;
        Ok(Self {
            geometry,
            polygon,
            payload,
        })
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// The polygon used for buffering and region checks
    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn geometry_key(&self) -> String {
        canonical_key(&self.geometry)
    }
}

/// Looks up the parcel at a coordinate. `Ok(None)` means the service has no
/// parcel there.
#[allow(async_fn_in_trait)]
pub trait ParcelFetcher {
    async fn fetch(&self, lat: f64, lng: f64) -> Result<Option<ParcelHit>, FetchError>;
}
