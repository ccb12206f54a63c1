#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Library for harvesting vPIC reference data into the `DuckDB` store.
//!
//! Three independent pipelines, each a strict chain of
//! fetch → normalize/dedup → publish stages:
//!
//! 1. manufacturer + make listings → `manufacturers`, `makes`;
//! 2. WMI codes per manufacturer → `wmi_by_mfr`, then a decode per WMI →
//!    `wmi_by_make`;
//! 3. model names per `(make, year, vehicle type)` → `models`.
//!
//! Keyed stages seed their key lists by reading distinct values back out
//! of the table the previous stage published, so each `harvest_*` call
//! must only run after its upstream table landed. The pipelines share no
//! state beyond the store itself.

use std::sync::Arc;

use chrono::Datelike as _;
use serde_json::Value;
use vpic_harvest_database::{Connection, DbError, store};
use vpic_harvest_registry_models::VehicleTypeFilter;
use vpic_harvest_source::keyed::fetch_by_keys;
use vpic_harvest_source::normalize::{flatten_nested, project_and_dedup};
use vpic_harvest_source::progress::ProgressCallback;
use vpic_harvest_source::vpic::{MfrIdKey, ModelKey, WmiKey};
use vpic_harvest_source::{RegistryApi, Row, SourceError, parsing};

/// Published table: manufacturer reference data.
pub const MANUFACTURERS_TABLE: &str = "manufacturers";
/// Published table: make reference data.
pub const MAKES_TABLE: &str = "makes";
/// Published table: WMI codes per manufacturer.
pub const WMI_BY_MFR_TABLE: &str = "wmi_by_mfr";
/// Published table: make fields decoded per WMI.
pub const WMI_BY_MAKE_TABLE: &str = "wmi_by_make";
/// Published table: model names.
pub const MODELS_TABLE: &str = "models";

/// Number of model years harvested, counting the current year.
pub const MODEL_YEAR_SPAN: i32 = 15;

/// Parent fields preserved when flattening the manufacturer listing.
const MANUFACTURER_FIELDS: &[&str] = &["Country", "Mfr_CommonName", "Mfr_ID", "Mfr_Name"];

/// Errors that can occur while running a harvest pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Fetching or normalizing upstream data failed.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// A store operation failed.
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

/// Placeholder vehicle-type child substituted for manufacturers whose
/// nested list is empty, so flattening never drops the parent record.
fn vehicle_types_placeholder() -> Row {
    let mut row = Row::new();
    row.insert("IsPrimary".to_owned(), Value::Null);
    row.insert("Name".to_owned(), Value::Null);
    row
}

/// Validates dynamic rows into typed rows, logging how many were dropped.
fn validated<T>(rows: &[Row], parse: impl Fn(&Row) -> Option<T>, what: &str) -> Vec<T> {
    let parsed: Vec<T> = rows.iter().filter_map(parse).collect();
    if parsed.len() < rows.len() {
        log::warn!(
            "Dropped {} of {} {what} rows missing required fields",
            rows.len() - parsed.len(),
            rows.len()
        );
    }
    parsed
}

fn non_empty<T>(rows: Vec<T>, context: &str) -> Result<Vec<T>, IngestError> {
    if rows.is_empty() {
        return Err(SourceError::EmptyResult {
            context: context.to_owned(),
        }
        .into());
    }
    Ok(rows)
}

fn apply_limit<T>(mut values: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        values.truncate(limit);
    }
    values
}

/// Harvests the paginated manufacturer listing and publishes the
/// `manufacturers` table.
///
/// Nested vehicle-type records are kept only long enough to flatten
/// without losing parents, then projected away; the duplicates the
/// cross-join introduced are removed so `mfr_id` ends up unique.
///
/// # Errors
///
/// Returns [`IngestError`] if fetching fails, the listing is empty, or
/// the publish fails.
#[allow(clippy::future_not_send)]
pub async fn harvest_manufacturers(
    api: &dyn RegistryApi,
    conn: &Connection,
) -> Result<u64, IngestError> {
    let raw = api.manufacturers().await?;
    log::info!("Fetched {} manufacturer records", raw.len());

    let flat = flatten_nested(
        &raw,
        "VehicleTypes",
        MANUFACTURER_FIELDS,
        &vehicle_types_placeholder(),
    );
    let projected = project_and_dedup(&flat, MANUFACTURER_FIELDS);
    let rows = non_empty(
        validated(&projected, parsing::manufacturer_from_row, "manufacturer"),
        "manufacturer listing",
    )?;

    Ok(store::publish(conn, MANUFACTURERS_TABLE, &rows)?)
}

/// Harvests the flat make listing and publishes the `makes` table.
///
/// # Errors
///
/// Returns [`IngestError`] if fetching fails, the listing is empty, or
/// the publish fails.
#[allow(clippy::future_not_send)]
pub async fn harvest_makes(api: &dyn RegistryApi, conn: &Connection) -> Result<u64, IngestError> {
    let raw = api.all_makes().await?;
    log::info!("Fetched {} make records", raw.len());

    let rows = non_empty(validated(&raw, parsing::make_from_row, "make"), "make listing")?;

    Ok(store::publish(conn, MAKES_TABLE, &rows)?)
}

/// Harvests WMI codes for every known manufacturer and publishes the
/// `wmi_by_mfr` table.
///
/// Seeds its key list from the `manufacturers` table, so
/// [`harvest_manufacturers`] must have published first.
///
/// # Errors
///
/// Returns [`IngestError`] if the upstream table is missing, the batch
/// fails fatally or comes up empty, or the publish fails.
#[allow(clippy::future_not_send)]
pub async fn harvest_wmi_by_manufacturer(
    api: &dyn RegistryApi,
    conn: &Connection,
    limit: Option<usize>,
    progress: Option<&Arc<dyn ProgressCallback>>,
) -> Result<u64, IngestError> {
    let mfr_ids: Vec<i64> = store::read_distinct(conn, MANUFACTURERS_TABLE, "mfr_id")?;
    let keys: Vec<MfrIdKey> = apply_limit(mfr_ids, limit).into_iter().map(MfrIdKey).collect();
    log::info!("Fetching WMI codes for {} manufacturers", keys.len());

    let raw = fetch_by_keys(
        &keys,
        "WMI listing by manufacturer",
        |key| {
            let mfr_id = key.0;
            async move { api.wmis_for_manufacturer(mfr_id).await }
        },
        progress,
    )
    .await?;

    let rows = validated(&raw, parsing::wmi_by_mfr_from_row, "WMI");

    Ok(store::publish(conn, WMI_BY_MFR_TABLE, &rows)?)
}

/// Decodes every known WMI into its make fields and publishes the
/// `wmi_by_make` table.
///
/// Seeds its key list from the `wmi_by_mfr` table, so
/// [`harvest_wmi_by_manufacturer`] must have published first. A WMI that
/// yields 404, a malformed body, or a timeout is skipped, not fatal.
///
/// # Errors
///
/// Returns [`IngestError`] if the upstream table is missing, the batch
/// fails fatally or comes up empty, or the publish fails.
#[allow(clippy::future_not_send)]
pub async fn harvest_makes_from_wmi(
    api: &dyn RegistryApi,
    conn: &Connection,
    limit: Option<usize>,
    progress: Option<&Arc<dyn ProgressCallback>>,
) -> Result<u64, IngestError> {
    let wmis: Vec<String> = store::read_distinct(conn, WMI_BY_MFR_TABLE, "wmi")?;
    let keys: Vec<WmiKey> = apply_limit(wmis, limit).into_iter().map(WmiKey).collect();
    log::info!("Decoding {} WMI codes", keys.len());

    let raw = fetch_by_keys(
        &keys,
        "WMI decode",
        |key| {
            let wmi = key.0.clone();
            async move { api.decode_wmi(&wmi).await }
        },
        progress,
    )
    .await?;

    let rows = validated(&raw, parsing::wmi_make_from_row, "WMI decode");

    Ok(store::publish(conn, WMI_BY_MAKE_TABLE, &rows)?)
}

/// Harvests model names for every `(make, year, vehicle type)`
/// combination over the last [`MODEL_YEAR_SPAN`] years and publishes the
/// `models` table.
///
/// Seeds its make IDs from the `makes` table, so [`harvest_makes`] must
/// have published first. `limit` caps the number of make IDs, not the
/// number of requests.
///
/// # Errors
///
/// Returns [`IngestError`] if the upstream table is missing, the batch
/// fails fatally or comes up empty, or the publish fails.
#[allow(clippy::future_not_send)]
pub async fn harvest_models(
    api: &dyn RegistryApi,
    conn: &Connection,
    limit: Option<usize>,
    progress: Option<&Arc<dyn ProgressCallback>>,
) -> Result<u64, IngestError> {
    let make_ids: Vec<i64> = store::read_distinct(conn, MAKES_TABLE, "make_id")?;
    let make_ids = apply_limit(make_ids, limit);

    let current_year = chrono::Utc::now().year();
    let keys = model_keys(&make_ids, current_year - (MODEL_YEAR_SPAN - 1), current_year);
    log::info!(
        "Fetching models for {} makes across {MODEL_YEAR_SPAN} years ({} requests)",
        make_ids.len(),
        keys.len()
    );

    let raw = fetch_by_keys(
        &keys,
        "model listing",
        |key| {
            let key = *key;
            async move { api.models_for(&key).await }
        },
        progress,
    )
    .await?;

    let rows = validated(&raw, parsing::model_from_row, "model");

    Ok(store::publish(conn, MODELS_TABLE, &rows)?)
}

/// Builds the cartesian key list for the model harvest: every year in
/// `[start_year, end_year]` × every make × every vehicle-type filter.
fn model_keys(make_ids: &[i64], start_year: i32, end_year: i32) -> Vec<ModelKey> {
    let mut keys = Vec::new();
    for year in start_year..=end_year {
        for &make_id in make_ids {
            for vehicle_type in VehicleTypeFilter::ALL {
                keys.push(ModelKey {
                    make_id,
                    year,
                    vehicle_type,
                });
            }
        }
    }
    keys
}
