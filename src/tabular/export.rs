// src/tabular/export.rs
// =============================================================================
// Flattens stored parcel records into one CSV.
//
// Columns:
// - id, origin_id, geometry_key (always present, in that order)
// - every key under `parcel_data` (geom_as_wkt included)
// - `field_data_<name>` for every `field_data` entry, where <name> is
//   lowercased with spaces turned into underscores
//
// The column set is the union over all records, in first-seen order. Cells a
// record has no value for are left empty.
// =============================================================================

use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::error::CrawlError;
use crate::store::{ParcelRecord, ResultStore};

pub fn normalize_field_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// One record as ordered (column, value) pairs
pub fn flatten_record(record: &ParcelRecord) -> Vec<(String, String)> {
    let mut cells = vec![
        ("id".to_string(), record.id.to_string()),
        ("origin_id".to_string(), record.origin_job_id.to_string()),
        ("geometry_key".to_string(), record.geometry_key.clone()),
    ];

    if let Some(parcel_data) = record.attributes.get("parcel_data").and_then(Value::as_object) {
        for (key, value) in parcel_data {
            cells.push((key.clone(), cell_text(value)));
        }
    }

    if let Some(fields) = record.attributes.get("field_data").and_then(Value::as_array) {
        for entry in fields {
            let name = entry.get("name").and_then(Value::as_str);
            let value = entry.get("value").filter(|v| !v.is_null());
            if let (Some(name), Some(value)) = (name, value) {
                cells.push((
                    format!("field_data_{}", normalize_field_name(name)),
                    cell_text(value),
                ));
            }
        }
    }

    cells
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Writes all records; returns how many rows were written
pub fn write_records<W: Write>(records: &[ParcelRecord], writer: W) -> Result<usize, CrawlError> {
    let rows: Vec<HashMap<String, String>> = records
        .iter()
        .map(|record| flatten_record(record).into_iter().collect())
        .collect();

    let mut columns: Vec<String> = vec!["id".into(), "origin_id".into(), "geometry_key".into()];
    for record in records {
        for (column, _) in flatten_record(record) {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }

    let mut out = csv::Writer::from_writer(writer);
    out.write_record(&columns)?;
    for row in &rows {
        out.write_record(
            columns
                .iter()
                .map(|c| row.get(c).map(String::as_str).unwrap_or("")),
        )?;
    }
    out.flush()?;

    Ok(rows.len())
}

pub fn export_results(results: &ResultStore<'_>, path: &Path) -> Result<usize, CrawlError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let records = results.all()?;
    let written = write_records(&records, std::fs::File::create(path)?)?;
    info!(rows = written, path = %path.display(), "exported parcel records");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: i64, attributes: Value) -> ParcelRecord {
        ParcelRecord {
            id,
            origin_job_id: 1,
            geometry_key: format!("POLYGON((0 0,0 {id},{id} {id},{id} 0,0 0))"),
            attributes,
        }
    }

    #[test]
    fn test_normalize_field_name() {
        assert_eq!(normalize_field_name("Land Use Code"), "land_use_code");
        assert_eq!(normalize_field_name("OWNER"), "owner");
    }

    #[test]
    fn test_flatten_record() {
        let rec = record(
            3,
            json!({
                "parcel_data": {"geom_as_wkt": "POLYGON((0 0,0 1,1 1,1 0,0 0))", "acres": 2.5},
                "field_data": [
                    {"name": "Land Use", "value": "Ranch"},
                    {"name": "Skipped", "value": null},
                    {"value": "no name"}
                ]
            }),
        );
        let cells = flatten_record(&rec);
        let map: HashMap<_, _> = cells.iter().cloned().collect();

        assert_eq!(cells[0], ("id".to_string(), "3".to_string()));
        assert_eq!(map["origin_id"], "1");
        assert_eq!(cells[2], ("geometry_key".to_string(), rec.geometry_key.clone()));
        assert_eq!(map["acres"], "2.5");
        assert_eq!(map["field_data_land_use"], "Ranch");
        assert!(!map.contains_key("field_data_skipped"));
        assert_eq!(cells.len(), 6);
    }

    #[test]
    fn test_write_records_unions_columns() {
        let records = vec![
            record(1, json!({"parcel_data": {"owner": "A"}})),
            record(2, json!({"parcel_data": {"zoning": "R1"},
                             "field_data": [{"name": "Tax Year", "value": 2023}]})),
        ];
        let mut buffer = Vec::new();
        let written = write_records(&records, &mut buffer).unwrap();
        assert_eq!(written, 2);

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,origin_id,geometry_key,owner,zoning,field_data_tax_year");
        assert_eq!(lines[1], "1,1,\"POLYGON((0 0,0 1,1 1,1 0,0 0))\",A,,");
        assert_eq!(lines[2], "2,1,\"POLYGON((0 0,0 2,2 2,2 0,0 0))\",,R1,2023");
    }

    #[test]
    fn test_export_results_creates_parent_dir() {
        let db = crate::store::Database::open_in_memory().unwrap();
        let origin = db.jobs().enqueue(0.5, 0.5).unwrap().id;
        let shape = crate::geometry::parse_multipolygon("POLYGON((0 0,0 1,1 1,1 0,0 0))").unwrap();
        db.results()
            .insert_unique(origin, &shape, &json!({"parcel_data": {"owner": "A"}}))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output").join("parcels.csv");
        assert_eq!(export_results(&db.results(), &path).unwrap(), 1);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("id,origin_id,geometry_key,owner"));
        // Shape is exported even though the payload carries no WKT
        assert!(text.lines().nth(1).unwrap().contains("POLYGON"));
    }
}
