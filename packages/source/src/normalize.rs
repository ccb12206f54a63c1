//! Flattening of nested API payloads into flat rows, plus projection,
//! deduplication, and CSV decoding.
//!
//! The manufacturer listing nests a variable-length list of vehicle-type
//! sub-records inside each parent record. Flattening cross-joins each
//! parent against its children; a parent whose nested list is empty gets a
//! placeholder child first, so every input record contributes at least one
//! output row instead of silently vanishing.

use std::collections::HashSet;

use serde_json::Value;

use crate::{Row, SourceError};

/// Flattens nested records into flat rows.
///
/// For each record, the array under `nested_field` is cross-joined against
/// the record's `parent_fields`: every child becomes one output row carrying
/// its own fields plus the listed parent fields (missing parent fields are
/// filled with JSON null). A record whose nested array is empty, missing,
/// or contains no objects is given a single `placeholder` child before the
/// join, so it still contributes exactly one row.
///
/// Output row count per record is therefore `max(1, k)` for `k` nested
/// object children, and row order follows input order.
#[must_use]
pub fn flatten_nested(
    records: &[Value],
    nested_field: &str,
    parent_fields: &[&str],
    placeholder: &Row,
) -> Vec<Row> {
    let mut rows = Vec::new();

    for record in records {
        let Some(parent) = record.as_object() else {
            log::warn!("Skipping non-object record during flattening");
            continue;
        };

        let mut children: Vec<Row> = match parent.get(nested_field) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect(),
            _ => Vec::new(),
        };

        if children.is_empty() {
            children.push(placeholder.clone());
        }

        for mut child in children {
            for field in parent_fields {
                child.insert(
                    (*field).to_owned(),
                    parent.get(*field).cloned().unwrap_or(Value::Null),
                );
            }
            rows.push(child);
        }
    }

    rows
}

/// Restricts rows to `columns` and removes duplicates.
///
/// Two rows are duplicates iff they are equal on every kept column; the
/// first occurrence wins and surviving rows keep first-occurrence order.
/// Columns a row lacks are kept as JSON null, so "missing" and "null"
/// compare equal.
#[must_use]
pub fn project_and_dedup(rows: &[Row], columns: &[&str]) -> Vec<Row> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for row in rows {
        let mut projected = Row::new();
        for column in columns {
            projected.insert(
                (*column).to_owned(),
                row.get(*column).cloned().unwrap_or(Value::Null),
            );
        }

        // Map keys are sorted, so serialization is a stable dedup key.
        let key = Value::Object(projected.clone()).to_string();
        if seen.insert(key) {
            out.push(projected);
        }
    }

    out
}

/// Parses a delimited-text response body into rows keyed by the column
/// headers in the first line.
///
/// Every value stays a string — this is what keeps numeric-looking WMI
/// codes and model names from being type-coerced. A body with no header
/// line yields zero rows.
///
/// # Errors
///
/// Returns [`SourceError::Csv`] if the body is not well-formed CSV.
pub fn csv_records(text: &str) -> Result<Vec<Row>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;

        let mut row = Row::new();
        for (i, header) in headers.iter().enumerate() {
            let value = record.get(i).unwrap_or("").trim().to_owned();
            row.insert(header.clone(), Value::String(value));
        }
        records.push(row);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn placeholder() -> Row {
        let mut row = Row::new();
        row.insert("IsPrimary".to_owned(), Value::Null);
        row.insert("Name".to_owned(), Value::Null);
        row
    }

    fn manufacturer(id: i64, vehicle_types: Value) -> Value {
        json!({
            "Mfr_ID": id,
            "Mfr_Name": format!("Maker {id}"),
            "VehicleTypes": vehicle_types,
        })
    }

    #[test]
    fn empty_nested_list_still_yields_one_row() {
        let records = vec![manufacturer(7, json!([]))];

        let rows = flatten_nested(
            &records,
            "VehicleTypes",
            &["Mfr_ID", "Mfr_Name"],
            &placeholder(),
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Mfr_ID"], 7);
        assert_eq!(rows[0]["IsPrimary"], Value::Null);
        assert_eq!(rows[0]["Name"], Value::Null);
    }

    #[test]
    fn k_children_yield_k_rows() {
        let records = vec![
            manufacturer(
                1,
                json!([{"Name": "Passenger Car"}, {"Name": "Truck"}, {"Name": "Bus"}]),
            ),
            manufacturer(2, json!([{"Name": "Motorcycle"}])),
        ];

        let rows = flatten_nested(&records, "VehicleTypes", &["Mfr_ID"], &placeholder());

        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows.iter().filter(|r| r["Mfr_ID"] == 1).count(),
            3,
            "parent 1 has three children"
        );
        assert_eq!(rows.iter().filter(|r| r["Mfr_ID"] == 2).count(), 1);
        assert_eq!(rows[0]["Name"], "Passenger Car");
    }

    #[test]
    fn missing_nested_field_counts_as_empty() {
        let records = vec![json!({"Mfr_ID": 3, "Mfr_Name": "No types"})];

        let rows = flatten_nested(&records, "VehicleTypes", &["Mfr_ID"], &placeholder());

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Mfr_ID"], 3);
    }

    #[test]
    fn missing_parent_field_becomes_null() {
        let records = vec![json!({"Mfr_ID": 4, "VehicleTypes": [{"Name": "Truck"}]})];

        let rows = flatten_nested(
            &records,
            "VehicleTypes",
            &["Mfr_ID", "Country"],
            &placeholder(),
        );

        assert_eq!(rows[0]["Country"], Value::Null);
    }

    #[test]
    fn dedup_keeps_first_occurrence_in_order() {
        let rows: Vec<Row> = [
            json!({"id": 1, "name": "a", "extra": "x"}),
            json!({"id": 2, "name": "b", "extra": "y"}),
            json!({"id": 1, "name": "a", "extra": "z"}),
            json!({"id": 3, "name": "c", "extra": "x"}),
        ]
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect();

        let deduped = project_and_dedup(&rows, &["id", "name"]);

        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[0]["id"], 1);
        assert_eq!(deduped[1]["id"], 2);
        assert_eq!(deduped[2]["id"], 3);
        assert!(
            !deduped[0].contains_key("extra"),
            "projection drops unlisted columns"
        );
    }

    #[test]
    fn dedup_is_idempotent() {
        let rows: Vec<Row> = [
            json!({"id": 1, "name": "a"}),
            json!({"id": 1, "name": "a"}),
            json!({"id": 2, "name": "b"}),
        ]
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect();

        let once = project_and_dedup(&rows, &["id", "name"]);
        let twice = project_and_dedup(&once, &["id", "name"]);

        assert_eq!(once, twice);
    }

    #[test]
    fn csv_values_stay_text() {
        let text = "wmi,manufacturer\n000,Example Corp\n1C3,Other Corp\n";

        let rows = csv_records(text).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["wmi"], "000");
        assert_eq!(rows[1]["wmi"], "1C3");
    }

    #[test]
    fn csv_header_only_yields_zero_rows() {
        let rows = csv_records("make_id,make_name\n").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn csv_empty_body_yields_zero_rows() {
        let rows = csv_records("").unwrap();
        assert!(rows.is_empty());
    }
}
