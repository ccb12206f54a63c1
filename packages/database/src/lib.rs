#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `DuckDB` store access for the harvest pipeline.
//!
//! Each pipeline stage publishes its result as a named table
//! ([`store::publish`], a full atomic replace) and downstream stages seed
//! their key lists by reading a column back out
//! ([`store::read_distinct`]). The store file is the only state shared
//! between stages.

pub mod paths;
pub mod store;

pub use duckdb::Connection;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A dependent read targeted a table that has not been published yet
    /// — the stages ran out of order.
    #[error("table '{table}' has not been published yet")]
    MissingTable {
        /// The table that was requested.
        table: String,
    },

    /// A table or column name is not a plain identifier and cannot be
    /// interpolated into SQL.
    #[error("invalid identifier: '{name}'")]
    InvalidIdentifier {
        /// The offending name.
        name: String,
    },
}
