// src/geometry/buffer.rs
// =============================================================================
// Probe point generation around a parcel.
//
// How it works:
// 1. Take the buffer distances in order (finest first)
// 2. Offset the parcel outward by the distance (round joins)
// 3. Walk the outline of the offset shape and drop `num_points` samples at
//    arc-length fractions 0, 1/n, 2/n, ...
// 4. Ask the gate about every sample (region + "already known parcel")
// 5. The first distance with at least one admitted sample wins; coarser
//    distances are never tried once a finer ring produced something
//
// A fine ring finds the direct neighbours cheaply. The coarse ring is a last
// resort that can hop over a gap (a road, a canal) before we give up.
// =============================================================================

use geo::{Buffer, Coord, LineString, Point, Polygon};
use tracing::debug;

use super::codec::validate_polygon;
use crate::config::BufferSpec;
use crate::error::{CrawlError, GeometryError};

/// Decides whether a sampled probe point is worth visiting.
///
/// The crawler combines the region filter with the known-parcel lookup;
/// tests plug in simple closures over fixed shapes.
pub trait ProbeGate {
    fn admits(&self, probe: Point<f64>) -> Result<bool, CrawlError>;
}

impl<F> ProbeGate for F
where
    F: Fn(Point<f64>) -> Result<bool, CrawlError>,
{
    fn admits(&self, probe: Point<f64>) -> Result<bool, CrawlError> {
        self(probe)
    }
}

#[derive(Debug, Clone)]
pub struct BufferPointGenerator<'a> {
    spec: &'a BufferSpec,
    num_points: usize,
}

impl<'a> BufferPointGenerator<'a> {
    pub fn new(spec: &'a BufferSpec, num_points: usize) -> Self {
        Self { spec, num_points }
    }

    // Tries each buffer distance, finest first, and stops at the first ring
    // that has anything the gate admits.
    //
    // Parameters:
    //   polygon: the parcel to probe around (validated before buffering)
    //   gate:    decides which sampled points are worth a lookup
    //
    // Returns: the admitted probes from the finest productive ring, or None
    // when every ring came back empty.
    pub fn generate<G>(
        &self,
        polygon: &Polygon<f64>,
        gate: &G,
    ) -> Result<Option<Vec<Point<f64>>>, CrawlError>
    where
        G: ProbeGate + ?Sized,
    {
        validate_polygon(polygon)?;

        for &distance in self.spec.distances() {
            // Coarser rings are only sampled if this one produced nothing
            let samples = sample_ring(polygon, distance, self.num_points)?;
            let sampled = samples.len();

            let mut admitted = Vec::with_capacity(sampled);
            for probe in samples {
                if gate.admits(probe)? {
                    admitted.push(probe);
                }
            }

            debug!(distance, sampled, admitted = admitted.len(), "buffer ring sampled");
            if !admitted.is_empty() {
                return Ok(Some(admitted));
            }
        }

        Ok(None)
    }
}

// Samples points evenly (by arc length) along a buffered outline.
//
// Parameters:
//   polygon:    the source shape
//   distance:   outward buffer distance, in the polygon's units (degrees)
//   num_points: how many points to place; point i sits at fraction i/n
//
// Returns: the points in outline order, or Malformed when the buffer has no
// usable outline.
pub fn sample_ring(
    polygon: &Polygon<f64>,
    distance: f64,
    num_points: usize,
) -> Result<Vec<Point<f64>>, GeometryError> {
    let buffered = polygon.buffer(distance);

    // The outline of a buffer result: every exterior ring, then any holes
    let rings: Vec<&LineString<f64>> = buffered
        .0
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
        .collect();

    let total: f64 = rings.iter().map(|ring| ring_length(ring)).sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(GeometryError::Malformed(format!(
            "buffer at distance {distance} has an empty outline"
        )));
    }

    Ok((0..num_points)
        .map(|i| interpolate(&rings, total * i as f64 / num_points as f64))
        .collect())
}

fn ring_length(ring: &LineString<f64>) -> f64 {
    ring.lines().map(|line| segment_length(line.start, line.end)).sum()
}

fn segment_length(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

// Walks the rings segment by segment until `target` length is used up
fn interpolate(rings: &[&LineString<f64>], target: f64) -> Point<f64> {
    let mut remaining = target;
    let mut last = Coord { x: 0.0, y: 0.0 };

    for ring in rings {
        for line in ring.lines() {
            let length = segment_length(line.start, line.end);
            if remaining <= length && length > 0.0 {
                let t = remaining / length;
                return Point::new(
                    line.start.x + (line.end.x - line.start.x) * t,
                    line.start.y + (line.end.y - line.start.y) * t,
                );
            }
            remaining -= length;
            last = line.end;
        }
    }

    // Rounding can leave a sliver past the final vertex
    Point::from(last)
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why a trait for the gate instead of a plain closure argument?
//    - The crawler's gate borrows the database and the region
//    - A trait lets it be a named struct with its own logging
//    - The blanket impl still allows closures in tests
//
// 2. What does ?Sized on G mean?
//    - Generic parameters are Sized by default
//    - ?Sized also accepts `dyn ProbeGate`
//
// 3. Why return Option<Vec<_>> and not an empty Vec?
//    - None means "every distance was tried and nothing survived"
//    - The caller logs that differently from a productive ring
// -----------------------------------------------------------------------------
