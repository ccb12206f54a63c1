#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! vPIC API client and the generic fetch/normalize machinery.
//!
//! The harvest pipeline is built from a small number of reusable stages:
//! paginated fetching ([`paginate`]), nested-record flattening and
//! projection ([`normalize`]), keyed batch fetching with per-key failure
//! isolation ([`keyed`]), and payload validation into typed rows
//! ([`parsing`]). The concrete NHTSA vPIC endpoints live in [`vpic`].
//!
//! This crate fetches and normalises records into
//! [`serde_json::Map`] rows; persisting them is the store crate's job.

pub mod keyed;
pub mod normalize;
pub mod paginate;
pub mod parsing;
pub mod progress;
pub mod retry;
pub mod vpic;

use async_trait::async_trait;

use crate::vpic::ModelKey;

/// A dynamic row: one flat record keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Errors that can occur during data source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The HTTP request failed at the connection level.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("HTTP {status} from {url}")]
    Status {
        /// The status code returned by the server.
        status: reqwest::StatusCode,
        /// The URL that was requested.
        url: String,
    },

    /// The request exceeded its time budget.
    #[error("request timed out: {url}")]
    Timeout {
        /// The URL that was requested.
        url: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing failed.
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    /// A stage accumulated zero rows, so publishing its result would be
    /// meaningless.
    #[error("empty result: {context}")]
    EmptyResult {
        /// Which stage came up empty.
        context: String,
    },

    /// Data normalization error.
    #[error("Normalization error: {message}")]
    Normalization {
        /// Description of what went wrong.
        message: String,
    },
}

impl SourceError {
    /// Returns the reason this error may be skipped for a single key of a
    /// keyed batch fetch, or `None` if it must abort the whole batch.
    ///
    /// Skippable: the resource does not exist (HTTP 404), the response body
    /// cannot be decoded, or the request timed out. Timeouts only arise on
    /// requests that carry an explicit time budget; everywhere else they
    /// surface as connection errors and stay fatal.
    #[must_use]
    pub fn key_skip_reason(&self) -> Option<&'static str> {
        match self {
            Self::Status { status, .. } if *status == reqwest::StatusCode::NOT_FOUND => {
                Some("resource not found")
            }
            Self::Json(_) | Self::Csv(_) => Some("undecodable response body"),
            Self::Timeout { .. } => Some("request timed out"),
            Self::Http(e) if e.is_timeout() => Some("request timed out"),
            _ => None,
        }
    }
}

/// The upstream vehicle-registry API, seen as a set of listing and
/// per-key detail fetches.
///
/// [`vpic::VpicClient`] is the production implementation; tests substitute
/// their own to drive the pipelines without a network.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Fetches every page of the manufacturer listing, in page order.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if any page fails to fetch or decode — a
    /// mid-sequence failure leaves the listing logically incomplete, so
    /// there is no per-page recovery.
    async fn manufacturers(&self) -> Result<Vec<serde_json::Value>, SourceError>;

    /// Fetches the flat (unpaginated) make listing.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request or CSV decode fails.
    async fn all_makes(&self) -> Result<Vec<Row>, SourceError>;

    /// Fetches the WMI codes owned by one manufacturer.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request or CSV decode fails.
    async fn wmis_for_manufacturer(&self, mfr_id: i64) -> Result<Vec<Row>, SourceError>;

    /// Decodes one WMI into its make fields. Carries a fixed per-request
    /// time budget, so a hung decode surfaces as [`SourceError::Timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request or JSON decode fails.
    async fn decode_wmi(&self, wmi: &str) -> Result<Vec<Row>, SourceError>;

    /// Fetches the models for one `(make, year, vehicle type)` combination.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request or CSV decode fails.
    async fn models_for(&self, key: &ModelKey) -> Result<Vec<Row>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(status: u16) -> SourceError {
        SourceError::Status {
            status: reqwest::StatusCode::from_u16(status).unwrap(),
            url: "http://example.invalid/x".to_owned(),
        }
    }

    #[test]
    fn not_found_is_skippable() {
        assert_eq!(
            status_error(404).key_skip_reason(),
            Some("resource not found")
        );
    }

    #[test]
    fn other_statuses_are_fatal() {
        assert!(status_error(500).key_skip_reason().is_none());
        assert!(status_error(403).key_skip_reason().is_none());
    }

    #[test]
    fn decode_failures_are_skippable() {
        let err: SourceError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert_eq!(err.key_skip_reason(), Some("undecodable response body"));
    }

    #[test]
    fn timeouts_are_skippable() {
        let err = SourceError::Timeout {
            url: "http://example.invalid/x".to_owned(),
        };
        assert_eq!(err.key_skip_reason(), Some("request timed out"));
    }

    #[test]
    fn empty_result_is_fatal() {
        let err = SourceError::EmptyResult {
            context: "wmi decode".to_owned(),
        };
        assert!(err.key_skip_reason().is_none());
    }
}
