// src/geometry/region.rs
// =============================================================================
// The administrative region that bounds the whole crawl, plus the boundary
// filter built on top of it.
//
// The region is loaded once (from a WKT file) and then only read. Every
// containment test uses the exact region outline; nothing is simplified or
// buffered, because these tests decide which points the crawl may visit.
//
// Points are (x, y) = (longitude, latitude), matching how parcels come back
// from the lookup service.
// =============================================================================

use geo::{Contains, MultiPolygon, Point, Polygon};
use std::path::Path;

use super::codec::parse_multipolygon;
use crate::error::{CrawlError, GeometryError};

#[derive(Debug, Clone)]
pub struct BoundaryRegion {
    shape: MultiPolygon<f64>,
}

impl BoundaryRegion {
    pub fn from_wkt(text: &str) -> Result<Self, GeometryError> {
        parse_multipolygon(text).map(|shape| Self { shape })
    }

    /// Reads a file holding a single POLYGON or MULTIPOLYGON
    pub fn load(path: &Path) -> Result<Self, CrawlError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_wkt(&text)?)
    }

    /// Strict containment: points on the region outline are outside
    pub fn contains_point(&self, point: Point<f64>) -> bool {
        self.shape.contains(&point)
    }

    pub fn contains_lat_lng(&self, lat: f64, lng: f64) -> bool {
        self.contains_point(Point::new(lng, lat))
    }

    /// Subset test: every vertex of the polygon's outline is inside the region
    pub fn contains_polygon(&self, polygon: &Polygon<f64>) -> bool {
        polygon
            .exterior()
            .points()
            .all(|vertex| self.contains_point(vertex))
    }

    /// Drops every point outside the region, keeping the order of the rest
    pub fn retain_inside(&self, mut points: Vec<Point<f64>>) -> Vec<Point<f64>> {
        points.retain(|p| self.contains_point(*p));
        points
    }
}
