//! Table publishing and key read-back against the harvest `DuckDB` file.
//!
//! Publishing is a full replace: rows are staged into a temp table with
//! chunked multi-row inserts, then swapped in with a single
//! `CREATE OR REPLACE TABLE … AS SELECT`, all inside one transaction —
//! a reader observes the old table or the new one, never a partial state.

use std::path::Path;

use duckdb::Connection;
use duckdb::types::FromSql;
use vpic_harvest_registry_models::{MakeRow, ManufacturerRow, ModelRow, WmiByMfrRow, WmiMakeRow};

use crate::DbError;

/// Number of rows per INSERT chunk (`DuckDB` handles large batches well).
const CHUNK_SIZE: usize = 5_000;

/// A typed row that knows its table schema and how to bind itself into a
/// prepared statement.
pub trait TableRecord {
    /// Column names and `DuckDB` types, in insert order.
    fn columns() -> &'static [(&'static str, &'static str)];

    /// Binds this record's values starting at the 1-based parameter
    /// index `idx`.
    ///
    /// # Errors
    ///
    /// Returns [`duckdb::Error`] if a bind fails.
    fn bind(&self, stmt: &mut duckdb::Statement<'_>, idx: usize) -> Result<(), duckdb::Error>;
}

/// Opens (or creates) the harvest database.
///
/// # Errors
///
/// Returns [`DbError`] if the parent directory cannot be created or the
/// connection fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;

    // Enable performance optimizations
    conn.execute_batch(
        "SET threads = 4;
         SET memory_limit = '512MB';",
    )?;

    Ok(conn)
}

/// Rejects names that cannot be safely interpolated into SQL.
fn check_identifier(name: &str) -> Result<(), DbError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier {
            name: name.to_owned(),
        })
    }
}

/// Atomically replaces `table` with exactly the given rows.
///
/// The previous contents (if any) are gone on success; an empty `rows`
/// slice publishes an empty table with the record type's schema. On
/// failure the transaction is rolled back and the previous table is left
/// untouched.
///
/// Returns the number of rows published.
///
/// # Errors
///
/// Returns [`DbError`] if the name is not a plain identifier or any
/// database operation fails.
pub fn publish<R: TableRecord>(
    conn: &Connection,
    table: &str,
    rows: &[R],
) -> Result<u64, DbError> {
    check_identifier(table)?;
    let stage = format!("_stage_{table}");

    conn.execute_batch("BEGIN TRANSACTION")?;
    match stage_and_swap(conn, table, &stage, rows) {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            log::info!("Published {} rows to table '{table}'", rows.len());
            Ok(u64::try_from(rows.len()).unwrap_or(0))
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

fn stage_and_swap<R: TableRecord>(
    conn: &Connection,
    table: &str,
    stage: &str,
    rows: &[R],
) -> Result<(), DbError> {
    let columns = R::columns();

    let column_defs = columns
        .iter()
        .map(|(name, sql_type)| format!("\"{name}\" {sql_type}"))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute_batch(&format!(
        "CREATE OR REPLACE TEMP TABLE \"{stage}\" ({column_defs})"
    ))?;

    let row_placeholder = format!(
        "({})",
        columns.iter().map(|_| "?").collect::<Vec<_>>().join(", ")
    );

    for chunk in rows.chunks(CHUNK_SIZE) {
        let mut sql = format!("INSERT INTO \"{stage}\" VALUES ");
        for (i, _) in chunk.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&row_placeholder);
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut idx = 1usize;
        for row in chunk {
            row.bind(&mut stmt, idx)?;
            idx += columns.len();
        }
        stmt.raw_execute()?;
    }

    conn.execute_batch(&format!(
        "CREATE OR REPLACE TABLE \"{table}\" AS SELECT * FROM \"{stage}\";
         DROP TABLE \"{stage}\";"
    ))?;

    Ok(())
}

/// Returns whether `table` exists in the store.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, DbError> {
    let mut stmt =
        conn.prepare("SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?")?;
    let count: i64 = stmt.query_row([table], |row| row.get(0))?;
    Ok(count > 0)
}

/// Reads the distinct values of one column from a previously published
/// table, to seed the next stage's key list.
///
/// # Errors
///
/// Returns [`DbError::MissingTable`] if the table has not been published
/// yet (a stage-ordering defect), or [`DbError`] if the query fails.
pub fn read_distinct<T: FromSql>(
    conn: &Connection,
    table: &str,
    column: &str,
) -> Result<Vec<T>, DbError> {
    check_identifier(table)?;
    check_identifier(column)?;

    if !table_exists(conn, table)? {
        return Err(DbError::MissingTable {
            table: table.to_owned(),
        });
    }

    let mut stmt = conn.prepare(&format!("SELECT DISTINCT \"{column}\" FROM \"{table}\""))?;
    let values = stmt.query_map([], |row| row.get(0))?;

    let mut out = Vec::new();
    for value in values {
        out.push(value?);
    }

    log::debug!("Read {} distinct '{column}' values from '{table}'", out.len());
    Ok(out)
}

impl TableRecord for ManufacturerRow {
    fn columns() -> &'static [(&'static str, &'static str)] {
        &[
            ("mfr_id", "BIGINT"),
            ("mfr_name", "TEXT"),
            ("mfr_common_name", "TEXT"),
            ("country", "TEXT"),
        ]
    }

    fn bind(&self, stmt: &mut duckdb::Statement<'_>, idx: usize) -> Result<(), duckdb::Error> {
        stmt.raw_bind_parameter(idx, self.mfr_id)?;
        stmt.raw_bind_parameter(idx + 1, &self.mfr_name)?;
        stmt.raw_bind_parameter(idx + 2, self.mfr_common_name.as_deref())?;
        stmt.raw_bind_parameter(idx + 3, self.country.as_deref())?;
        Ok(())
    }
}

impl TableRecord for MakeRow {
    fn columns() -> &'static [(&'static str, &'static str)] {
        &[("make_id", "BIGINT"), ("make_name", "TEXT")]
    }

    fn bind(&self, stmt: &mut duckdb::Statement<'_>, idx: usize) -> Result<(), duckdb::Error> {
        stmt.raw_bind_parameter(idx, self.make_id)?;
        stmt.raw_bind_parameter(idx + 1, &self.make_name)?;
        Ok(())
    }
}

impl TableRecord for WmiByMfrRow {
    fn columns() -> &'static [(&'static str, &'static str)] {
        &[
            ("wmi", "TEXT"),
            ("mfr_id", "BIGINT"),
            ("manufacturer", "TEXT"),
            ("country", "TEXT"),
            ("vehicle_type", "TEXT"),
            ("created_on", "TEXT"),
            ("updated_on", "TEXT"),
            ("date_available_to_public", "TEXT"),
        ]
    }

    fn bind(&self, stmt: &mut duckdb::Statement<'_>, idx: usize) -> Result<(), duckdb::Error> {
        stmt.raw_bind_parameter(idx, &self.wmi)?;
        stmt.raw_bind_parameter(idx + 1, self.mfr_id)?;
        stmt.raw_bind_parameter(idx + 2, self.manufacturer.as_deref())?;
        stmt.raw_bind_parameter(idx + 3, self.country.as_deref())?;
        stmt.raw_bind_parameter(idx + 4, self.vehicle_type.as_deref())?;
        stmt.raw_bind_parameter(idx + 5, self.created_on.as_deref())?;
        stmt.raw_bind_parameter(idx + 6, self.updated_on.as_deref())?;
        stmt.raw_bind_parameter(idx + 7, self.date_available_to_public.as_deref())?;
        Ok(())
    }
}

impl TableRecord for WmiMakeRow {
    fn columns() -> &'static [(&'static str, &'static str)] {
        &[
            ("wmi", "TEXT"),
            ("make", "TEXT"),
            ("manufacturer_name", "TEXT"),
            ("common_name", "TEXT"),
            ("parent_company_name", "TEXT"),
            ("vehicle_type", "TEXT"),
            ("created_on", "TEXT"),
            ("updated_on", "TEXT"),
        ]
    }

    fn bind(&self, stmt: &mut duckdb::Statement<'_>, idx: usize) -> Result<(), duckdb::Error> {
        stmt.raw_bind_parameter(idx, &self.wmi)?;
        stmt.raw_bind_parameter(idx + 1, self.make.as_deref())?;
        stmt.raw_bind_parameter(idx + 2, self.manufacturer_name.as_deref())?;
        stmt.raw_bind_parameter(idx + 3, self.common_name.as_deref())?;
        stmt.raw_bind_parameter(idx + 4, self.parent_company_name.as_deref())?;
        stmt.raw_bind_parameter(idx + 5, self.vehicle_type.as_deref())?;
        stmt.raw_bind_parameter(idx + 6, self.created_on.as_deref())?;
        stmt.raw_bind_parameter(idx + 7, self.updated_on.as_deref())?;
        Ok(())
    }
}

impl TableRecord for ModelRow {
    fn columns() -> &'static [(&'static str, &'static str)] {
        &[
            ("make_id", "BIGINT"),
            ("make_name", "TEXT"),
            ("model_id", "BIGINT"),
            ("model_name", "TEXT"),
            ("year", "INTEGER"),
            ("vehicle_type", "TEXT"),
        ]
    }

    fn bind(&self, stmt: &mut duckdb::Statement<'_>, idx: usize) -> Result<(), duckdb::Error> {
        stmt.raw_bind_parameter(idx, self.make_id)?;
        stmt.raw_bind_parameter(idx + 1, self.make_name.as_deref())?;
        stmt.raw_bind_parameter(idx + 2, self.model_id)?;
        stmt.raw_bind_parameter(idx + 3, &self.model_name)?;
        stmt.raw_bind_parameter(idx + 4, self.year)?;
        stmt.raw_bind_parameter(idx + 5, self.vehicle_type.as_ref())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(id: i64, name: &str) -> MakeRow {
        MakeRow {
            make_id: id,
            make_name: name.to_owned(),
        }
    }

    fn wmi(code: &str, mfr_id: i64) -> WmiByMfrRow {
        WmiByMfrRow {
            wmi: code.to_owned(),
            mfr_id,
            manufacturer: None,
            country: None,
            vehicle_type: None,
            created_on: None,
            updated_on: None,
            date_available_to_public: None,
        }
    }

    fn row_count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn publish_then_read_back() {
        let conn = Connection::open_in_memory().unwrap();

        publish(&conn, "makes", &[make(440, "ASTON MARTIN"), make(441, "TESLA")]).unwrap();

        let mut ids: Vec<i64> = read_distinct(&conn, "makes", "make_id").unwrap();
        ids.sort_unstable();
        assert_eq!(ids, [440, 441]);
    }

    #[test]
    fn publish_fully_replaces_prior_contents() {
        let conn = Connection::open_in_memory().unwrap();

        publish(
            &conn,
            "makes",
            &[make(1, "A"), make(2, "B"), make(3, "C")],
        )
        .unwrap();
        publish(&conn, "makes", &[make(9, "Z")]).unwrap();

        assert_eq!(row_count(&conn, "makes"), 1, "no row from the first publish survives");
        let ids: Vec<i64> = read_distinct(&conn, "makes", "make_id").unwrap();
        assert_eq!(ids, [9]);
    }

    #[test]
    fn publish_empty_creates_the_schema() {
        let conn = Connection::open_in_memory().unwrap();

        publish::<MakeRow>(&conn, "makes", &[]).unwrap();

        assert!(table_exists(&conn, "makes").unwrap());
        assert_eq!(row_count(&conn, "makes"), 0);
        let ids: Vec<i64> = read_distinct(&conn, "makes", "make_id").unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn read_before_publish_is_a_missing_table() {
        let conn = Connection::open_in_memory().unwrap();

        let err = read_distinct::<i64>(&conn, "makes", "make_id").unwrap_err();
        assert!(matches!(err, DbError::MissingTable { table } if table == "makes"));
    }

    #[test]
    fn distinct_collapses_duplicate_keys() {
        let conn = Connection::open_in_memory().unwrap();

        publish(
            &conn,
            "wmi_by_mfr",
            &[wmi("1FA", 7), wmi("1FD", 7), wmi("1FA", 8)],
        )
        .unwrap();

        let mut codes: Vec<String> = read_distinct(&conn, "wmi_by_mfr", "wmi").unwrap();
        codes.sort();
        assert_eq!(codes, ["1FA", "1FD"]);
    }

    #[test]
    fn numeric_looking_wmi_stays_text() {
        let conn = Connection::open_in_memory().unwrap();

        publish(&conn, "wmi_by_mfr", &[wmi("000", 7)]).unwrap();

        let codes: Vec<String> = read_distinct(&conn, "wmi_by_mfr", "wmi").unwrap();
        assert_eq!(codes, ["000"]);
    }

    #[test]
    fn hostile_table_names_are_rejected() {
        let conn = Connection::open_in_memory().unwrap();

        let err = publish(&conn, "makes; DROP TABLE x", &[make(1, "A")]).unwrap_err();
        assert!(matches!(err, DbError::InvalidIdentifier { .. }));

        let err = read_distinct::<i64>(&conn, "makes", "id\"").unwrap_err();
        assert!(matches!(err, DbError::InvalidIdentifier { .. }));
    }

    #[test]
    fn publish_spans_multiple_chunks() {
        let conn = Connection::open_in_memory().unwrap();

        let rows: Vec<MakeRow> = (0..CHUNK_SIZE as i64 + 10)
            .map(|i| make(i, "M"))
            .collect();
        let published = publish(&conn, "makes", &rows).unwrap();

        assert_eq!(published, rows.len() as u64);
        assert_eq!(row_count(&conn, "makes"), rows.len() as i64);
    }
}
