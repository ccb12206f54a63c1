#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Typed rows for the published vPIC reference tables.
//!
//! Every harvest stage validates its dynamic API payloads into one of these
//! row types before publishing. Each struct corresponds one-to-one with a
//! table in the analytical store; column order in the store follows field
//! order here.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The vehicle-type filter accepted by the model-listing endpoint.
///
/// Also stored verbatim (lowercase) in the `models` table so rows remain
/// traceable to the request that produced them.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VehicleTypeFilter {
    /// Passenger cars.
    Passenger,
    /// Trucks.
    Truck,
}

impl VehicleTypeFilter {
    /// Every filter value the model harvest iterates over.
    pub const ALL: [Self; 2] = [Self::Passenger, Self::Truck];
}

/// A row of the `manufacturers` table.
///
/// The upstream listing nests zero-or-more vehicle-type sub-records per
/// manufacturer; those are discarded during projection, so `mfr_id` is
/// unique here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturerRow {
    /// Upstream manufacturer ID.
    pub mfr_id: i64,
    /// Full registered name.
    pub mfr_name: String,
    /// Common (trade) name, when the registry has one.
    pub mfr_common_name: Option<String>,
    /// Country of registration.
    pub country: Option<String>,
}

/// A row of the `makes` table, from the flat make listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakeRow {
    /// Upstream make ID.
    pub make_id: i64,
    /// Make name (e.g. "TESLA").
    pub make_name: String,
}

/// A row of the `wmi_by_mfr` table: one WMI code owned by one manufacturer.
///
/// `wmi` is always text — codes like `"000"` or `"1C3"` must never be
/// type-coerced to numbers. `mfr_id` is the key the batch fetch tagged the
/// row with; the remaining columns are source metadata carried as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WmiByMfrRow {
    /// World Manufacturer Identifier code.
    pub wmi: String,
    /// Manufacturer ID that owns this code (the originating batch key).
    pub mfr_id: i64,
    /// Manufacturer name as reported by the WMI listing.
    pub manufacturer: Option<String>,
    /// Country associated with the code.
    pub country: Option<String>,
    /// Vehicle type the code covers.
    pub vehicle_type: Option<String>,
    /// Source metadata: when the code was created upstream.
    pub created_on: Option<String>,
    /// Source metadata: when the code was last updated upstream.
    pub updated_on: Option<String>,
    /// Source metadata: when the code became public.
    pub date_available_to_public: Option<String>,
}

/// A row of the `wmi_by_make` table: make fields decoded from one WMI.
///
/// A WMI whose decode request fails in a skippable way (not found,
/// malformed body, timeout) simply contributes no row here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WmiMakeRow {
    /// World Manufacturer Identifier code (the originating batch key).
    pub wmi: String,
    /// Decoded make name.
    pub make: Option<String>,
    /// Decoded manufacturer name.
    pub manufacturer_name: Option<String>,
    /// Decoded common name.
    pub common_name: Option<String>,
    /// Decoded parent company name.
    pub parent_company_name: Option<String>,
    /// Vehicle type the code decodes to.
    pub vehicle_type: Option<String>,
    /// Source metadata: when the code was created upstream.
    pub created_on: Option<String>,
    /// Source metadata: when the code was last updated upstream.
    pub updated_on: Option<String>,
}

/// A row of the `models` table.
///
/// One row per model returned for a `(make, year, vehicle type)` request.
/// `model_name` is forced to text for the same reason as WMI codes: names
/// like `"300"` must survive as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRow {
    /// Upstream make ID (the originating batch key).
    pub make_id: i64,
    /// Make name as reported by the model listing.
    pub make_name: Option<String>,
    /// Upstream model ID, when reported.
    pub model_id: Option<i64>,
    /// Model name, always text.
    pub model_name: String,
    /// Model year the row was requested for.
    pub year: i32,
    /// Vehicle-type filter the row was requested with.
    pub vehicle_type: VehicleTypeFilter,
}
