// src/geometry/mod.rs
// =============================================================================
// Everything that touches shapes.
//
// Submodules:
// - codec: WKT parsing, validation and the canonical geometry key
// - region: the fixed search region and the boundary filter
// - buffer: escalating buffer rings and probe point sampling
// =============================================================================

mod buffer;
mod codec;
mod region;

pub use buffer::{sample_ring, BufferPointGenerator, ProbeGate};
pub use codec::{canonical_key, parse_multipolygon, validate_multipolygon, validate_polygon};
#[cfg(test)]
pub use codec::polygon_from_vertices;
pub use region::BoundaryRegion;
