// src/geometry/codec.rs
// =============================================================================
// WKT parsing and the canonical geometry key.
//
// The lookup service hands us parcel outlines as WKT text. Before a shape is
// used anywhere (buffering, containment, dedup) it goes through here, so the
// rest of the crate only ever sees validated multipolygons.
//
// The canonical key is the WKT re-emitted by the `wkt` crate. Two parcels are
// "the same" when their keys are byte-equal.
// =============================================================================

use geo::{Area, Geometry, MultiPolygon, Polygon};
use wkt::{ToWkt, TryFromWkt};

use crate::error::GeometryError;

/// Parses POLYGON or MULTIPOLYGON text into a validated multipolygon.
///
/// Surrounding whitespace and double quotes are tolerated since CSV exports
/// often quote the WKT column.
pub fn parse_multipolygon(text: &str) -> Result<MultiPolygon<f64>, GeometryError> {
    let cleaned = text.trim().trim_matches('"');
    let geometry = Geometry::<f64>::try_from_wkt_str(cleaned)
        .map_err(|e| GeometryError::Parse(e.to_string()))?;

    let multi = match geometry {
        Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
        Geometry::MultiPolygon(multi) => multi,
        other => return Err(GeometryError::UnsupportedType(type_name(&other))),
    };

    validate_multipolygon(&multi)?;
    Ok(multi)
}

/// Builds a polygon from `(x, y)` vertices; the ring is closed automatically
#[cfg(test)]
pub fn polygon_from_vertices(vertices: &[(f64, f64)]) -> Result<Polygon<f64>, GeometryError> {
    let polygon = Polygon::new(geo::LineString::from(vertices.to_vec()), vec![]);
    validate_polygon(&polygon)?;
    Ok(polygon)
}

pub fn validate_multipolygon(multi: &MultiPolygon<f64>) -> Result<(), GeometryError> {
    if multi.0.is_empty() {
        return Err(GeometryError::Malformed("multipolygon has no members".into()));
    }
    multi.0.iter().try_for_each(validate_polygon)
}

/// Rejects shapes that would poison a buffer: too few vertices, NaN or
/// infinite coordinates, or zero area.
pub fn validate_polygon(polygon: &Polygon<f64>) -> Result<(), GeometryError> {
    let exterior = polygon.exterior();
    // A closed triangle has four coordinates
    if exterior.0.len() < 4 {
        return Err(GeometryError::Malformed(format!(
            "exterior ring has {} coordinates",
            exterior.0.len()
        )));
    }

    let all_finite = exterior
        .coords()
        .chain(polygon.interiors().iter().flat_map(|ring| ring.coords()))
        .all(|c| c.x.is_finite() && c.y.is_finite());
    if !all_finite {
        return Err(GeometryError::Malformed("non-finite coordinate".into()));
    }

    if polygon.unsigned_area() <= 0.0 {
        return Err(GeometryError::Malformed("polygon has zero area".into()));
    }
    Ok(())
}

/// Canonical text used for equality/dedup. Single-member multipolygons are
/// written as plain POLYGONs so both input spellings share one key.
pub fn canonical_key(multi: &MultiPolygon<f64>) -> String {
    match multi.0.as_slice() {
        [single] => single.wkt_string(),
        _ => multi.wkt_string(),
    }
}

fn type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "POINT",
        Geometry::Line(_) | Geometry::LineString(_) => "LINESTRING",
        Geometry::MultiPoint(_) => "MULTIPOINT",
        Geometry::MultiLineString(_) => "MULTILINESTRING",
        Geometry::GeometryCollection(_) => "GEOMETRYCOLLECTION",
        _ => "OTHER",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> String {
        canonical_key(&parse_multipolygon(text).unwrap())
    }

    #[test]
    fn test_parse_polygon() {
        let multi = parse_multipolygon("POLYGON((0 0,0 1,1 1,1 0,0 0))").unwrap();
        assert_eq!(multi.0.len(), 1);
        assert!((multi.unsigned_area() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_quoted_multipolygon() {
        let text = "\"MULTIPOLYGON(((0 0,0 1,1 1,1 0,0 0)),((2 2,2 3,3 3,3 2,2 2)))\"";
        let multi = parse_multipolygon(text).unwrap();
        assert_eq!(multi.0.len(), 2);
    }

    #[test]
    fn test_rejects_point() {
        let err = parse_multipolygon("POINT(1 2)").unwrap_err();
        assert!(matches!(err, GeometryError::UnsupportedType("POINT")));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            parse_multipolygon("POLYGON((oops"),
            Err(GeometryError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_degenerate_polygon() {
        let err = polygon_from_vertices(&[(0.0, 0.0), (1.0, 1.0)]).unwrap_err();
        assert!(matches!(err, GeometryError::Malformed(_)));

        let flat = polygon_from_vertices(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]).unwrap_err();
        assert!(matches!(flat, GeometryError::Malformed(_)));
    }

    #[test]
    fn test_canonical_key_ignores_spelling() {
        let a = key("POLYGON ((0 0, 0 1, 1 1, 1 0, 0 0))");
        let b = key("MULTIPOLYGON(((0 0,0 1,1 1,1 0,0 0)))");
        assert_eq!(a, b);
        assert!(a.starts_with("POLYGON"));
    }

    #[test]
    fn test_canonical_key_distinguishes_shapes() {
        let a = key("POLYGON((0 0,0 1,1 1,1 0,0 0))");
        let b = key("POLYGON((0 0,0 2,2 2,2 0,0 0))");
        assert_ne!(a, b);
    }
}
