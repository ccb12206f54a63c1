//! Validation of dynamic rows into the typed table rows.
//!
//! Every pipeline calls one of these at its normalization boundary, after
//! flattening/tagging and before publishing, so downstream stages can
//! assume a fixed shape. A row missing a required field yields `None` and
//! is counted and logged by the caller.
//!
//! Numeric fields accept both JSON numbers and numeric strings, since the
//! CSV endpoints deliver everything as text. Text fields accept numbers
//! and render them back as strings, never the other way around — WMI codes
//! and model names must stay text.

use std::str::FromStr as _;

use serde_json::Value;
use vpic_harvest_registry_models::{
    MakeRow, ManufacturerRow, ModelRow, VehicleTypeFilter, WmiByMfrRow, WmiMakeRow,
};

use crate::Row;

/// Reads a non-empty text field. Numbers are rendered as text; empty and
/// null values are treated as absent.
#[must_use]
pub fn text_field(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads an integer field from a JSON number or a numeric string.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn int_field(row: &Row, key: &str) -> Option<i64> {
    match row.get(key)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

/// Validates a projected manufacturer row.
#[must_use]
pub fn manufacturer_from_row(row: &Row) -> Option<ManufacturerRow> {
    Some(ManufacturerRow {
        mfr_id: int_field(row, "Mfr_ID")?,
        mfr_name: text_field(row, "Mfr_Name")?,
        mfr_common_name: text_field(row, "Mfr_CommonName"),
        country: text_field(row, "Country"),
    })
}

/// Validates a make-listing row.
#[must_use]
pub fn make_from_row(row: &Row) -> Option<MakeRow> {
    Some(MakeRow {
        make_id: int_field(row, "make_id")?,
        make_name: text_field(row, "make_name")?,
    })
}

/// Validates a WMI-by-manufacturer row (CSV fields plus the tagged
/// `mfr_id`).
#[must_use]
pub fn wmi_by_mfr_from_row(row: &Row) -> Option<WmiByMfrRow> {
    Some(WmiByMfrRow {
        wmi: text_field(row, "wmi")?,
        mfr_id: int_field(row, "mfr_id")?,
        manufacturer: text_field(row, "manufacturer"),
        country: text_field(row, "country"),
        vehicle_type: text_field(row, "vehicletype"),
        created_on: text_field(row, "createdon"),
        updated_on: text_field(row, "updatedon"),
        date_available_to_public: text_field(row, "dateavailabletopublic"),
    })
}

/// Validates a WMI decode row (JSON fields plus the tagged `wmi`).
#[must_use]
pub fn wmi_make_from_row(row: &Row) -> Option<WmiMakeRow> {
    Some(WmiMakeRow {
        wmi: text_field(row, "wmi")?,
        make: text_field(row, "Make"),
        manufacturer_name: text_field(row, "ManufacturerName"),
        common_name: text_field(row, "CommonName"),
        parent_company_name: text_field(row, "ParentCompanyName"),
        vehicle_type: text_field(row, "VehicleType"),
        created_on: text_field(row, "CreatedOn"),
        updated_on: text_field(row, "UpdatedOn"),
    })
}

/// Validates a model-listing row (CSV fields plus the tagged key columns).
#[must_use]
pub fn model_from_row(row: &Row) -> Option<ModelRow> {
    Some(ModelRow {
        make_id: int_field(row, "make_id")?,
        make_name: text_field(row, "make_name"),
        model_id: int_field(row, "model_id"),
        model_name: text_field(row, "model_name")?,
        year: i32::try_from(int_field(row, "year")?).ok()?,
        vehicle_type: VehicleTypeFilter::from_str(&text_field(row, "vehicle_type")?).ok()?,
    })
}
