//! NHTSA vPIC API client.
//!
//! Endpoints: a paginated manufacturer listing, a flat make listing (CSV),
//! per-manufacturer WMI listings (CSV), per-WMI decodes (JSON, with a fixed
//! request budget), and per-`(make, year, vehicle type)` model listings
//! (CSV). No authentication.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use vpic_harvest_registry_models::VehicleTypeFilter;

use crate::keyed::BatchKey;
use crate::paginate::{Page, PagedSource, fetch_all_pages};
use crate::{RegistryApi, Row, SourceError, normalize, retry};

/// Production base URL of the vPIC vehicle API.
pub const DEFAULT_BASE_URL: &str = "https://vpic.nhtsa.dot.gov/api/vehicles";

/// Per-request budget for WMI decode calls. Some WMI codes hang the
/// decoder upstream; exceeding the budget skips the code instead of
/// stalling the batch.
const DECODE_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the vPIC API.
#[derive(Debug, Clone)]
pub struct VpicClient {
    client: reqwest::Client,
    base_url: String,
}

impl VpicClient {
    /// Creates a client against the production API.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a client against a custom base URL.
    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Returns the paginated manufacturer listing as a [`PagedSource`].
    #[must_use]
    pub const fn manufacturer_listing(&self) -> ManufacturerListing<'_> {
        ManufacturerListing { client: self }
    }

    fn manufacturers_url(&self, page: u32) -> String {
        format!(
            "{}/getallmanufacturers?ManufacturerType=&format=json&page={page}",
            self.base_url
        )
    }

    fn all_makes_url(&self) -> String {
        format!("{}/GetAllMakes?format=csv", self.base_url)
    }

    fn wmis_for_manufacturer_url(&self, mfr_id: i64) -> String {
        format!(
            "{}/GetWMIsForManufacturer/{mfr_id}?format=csv",
            self.base_url
        )
    }

    fn decode_wmi_url(&self, wmi: &str) -> String {
        format!("{}/decodewmi/{wmi}?format=json", self.base_url)
    }

    fn models_url(&self, key: &ModelKey) -> String {
        format!(
            "{}/GetModelsForMakeIdYear/makeId/{}/modelyear/{}/vehicletype/{}?format=csv",
            self.base_url, key.make_id, key.year, key.vehicle_type
        )
    }
}

impl Default for VpicClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Shape of the wrapped listing responses: a reported record count plus
/// the records themselves.
#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(rename = "Count")]
    count: i64,
    #[serde(rename = "Results", default)]
    results: Vec<Value>,
}

/// The paginated `getallmanufacturers` endpoint.
#[derive(Debug)]
pub struct ManufacturerListing<'a> {
    client: &'a VpicClient,
}

impl PagedSource for ManufacturerListing<'_> {
    async fn fetch_page(&self, page: u32) -> Result<Page, SourceError> {
        let url = self.client.manufacturers_url(page);
        let body = retry::get_json(&self.client.client, &url, None).await?;
        let listing: ListingResponse = serde_json::from_value(body)?;

        Ok(Page {
            count: listing.count,
            records: listing.results,
        })
    }
}

#[async_trait]
impl RegistryApi for VpicClient {
    async fn manufacturers(&self) -> Result<Vec<Value>, SourceError> {
        fetch_all_pages(&self.manufacturer_listing()).await
    }

    async fn all_makes(&self) -> Result<Vec<Row>, SourceError> {
        let text = retry::get_text(&self.client, &self.all_makes_url(), None).await?;
        normalize::csv_records(&text)
    }

    async fn wmis_for_manufacturer(&self, mfr_id: i64) -> Result<Vec<Row>, SourceError> {
        let url = self.wmis_for_manufacturer_url(mfr_id);
        let text = retry::get_text(&self.client, &url, None).await?;
        normalize::csv_records(&text)
    }

    async fn decode_wmi(&self, wmi: &str) -> Result<Vec<Row>, SourceError> {
        let url = self.decode_wmi_url(wmi);
        let body = retry::get_json(&self.client, &url, Some(DECODE_TIMEOUT)).await?;
        let listing: ListingResponse = serde_json::from_value(body)?;

        Ok(listing
            .results
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    async fn models_for(&self, key: &ModelKey) -> Result<Vec<Row>, SourceError> {
        let text = retry::get_text(&self.client, &self.models_url(key), None).await?;
        normalize::csv_records(&text)
    }
}

/// Batch key for the per-manufacturer WMI listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MfrIdKey(pub i64);

impl fmt::Display for MfrIdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mfr {}", self.0)
    }
}

impl BatchKey for MfrIdKey {
    fn tag(&self, row: &mut Row) {
        row.insert("mfr_id".to_owned(), Value::from(self.0));
    }
}

/// Batch key for the per-WMI decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WmiKey(pub String);

impl fmt::Display for WmiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wmi {}", self.0)
    }
}

impl BatchKey for WmiKey {
    fn tag(&self, row: &mut Row) {
        row.insert("wmi".to_owned(), Value::String(self.0.clone()));
    }
}

/// Batch key for the model listing: one `(make, year, vehicle type)`
/// combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelKey {
    /// Upstream make ID.
    pub make_id: i64,
    /// Model year.
    pub year: i32,
    /// Vehicle-type filter.
    pub vehicle_type: VehicleTypeFilter,
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "make {} year {} type {}",
            self.make_id, self.year, self.vehicle_type
        )
    }
}

impl BatchKey for ModelKey {
    fn tag(&self, row: &mut Row) {
        row.insert("make_id".to_owned(), Value::from(self.make_id));
        row.insert("year".to_owned(), Value::from(i64::from(self.year)));
        row.insert(
            "vehicle_type".to_owned(),
            Value::String(self.vehicle_type.to_string()),
        );
    }
}
