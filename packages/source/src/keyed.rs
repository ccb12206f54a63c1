//! Keyed batch fetching with per-key failure isolation.
//!
//! One request per key, sequentially. A key whose request fails in a
//! skippable way (not found, undecodable body, timed out) is logged and
//! contributes zero rows; any other failure aborts the whole batch. Rows
//! for a given key are tagged with that key and stay contiguous in the
//! output.

use std::fmt;
use std::sync::Arc;

use crate::progress::ProgressCallback;
use crate::{Row, SourceError};

/// A key of a keyed batch fetch.
///
/// `tag` stamps the originating key onto every row it produced, so the
/// published table keeps the join column even when the upstream payload
/// omits it.
pub trait BatchKey: fmt::Display {
    /// Inserts this key's column(s) into a fetched row.
    fn tag(&self, row: &mut Row);
}

/// Fetches one batch of rows per key and concatenates the results.
///
/// For each key in order: issue the request via `fetch_one`, tag the
/// resulting rows with the key, and append them. Per-key failure policy:
///
/// - resource not found (HTTP 404): logged at debug, key skipped;
/// - undecodable response body: logged at debug, key skipped;
/// - request timeout (only on requests with a time budget): logged at
///   debug, key skipped;
/// - anything else: propagated, aborting the batch.
///
/// Skipped keys are never retried — they simply contribute zero rows.
///
/// # Errors
///
/// Returns the first fatal [`SourceError`], or
/// [`SourceError::EmptyResult`] if every key was skipped or empty and the
/// batch accumulated no rows at all.
#[allow(clippy::future_not_send)]
pub async fn fetch_by_keys<K, F, Fut>(
    keys: &[K],
    context: &str,
    fetch_one: F,
    progress: Option<&Arc<dyn ProgressCallback>>,
) -> Result<Vec<Row>, SourceError>
where
    K: BatchKey,
    F: Fn(&K) -> Fut,
    Fut: Future<Output = Result<Vec<Row>, SourceError>>,
{
    let mut rows = Vec::new();
    let mut skipped: usize = 0;

    if let Some(progress) = progress {
        progress.set_total(keys.len() as u64);
    }

    for key in keys {
        match fetch_one(key).await {
            Ok(batch) => {
                log::debug!("Fetched {} rows for key {key}", batch.len());
                for mut row in batch {
                    key.tag(&mut row);
                    rows.push(row);
                }
            }
            Err(e) => {
                let Some(reason) = e.key_skip_reason() else {
                    return Err(e);
                };
                log::debug!("Skipping key {key} ({reason}): {e}");
                skipped += 1;
            }
        }

        if let Some(progress) = progress {
            progress.inc(1);
        }
    }

    if rows.is_empty() {
        return Err(SourceError::EmptyResult {
            context: context.to_owned(),
        });
    }

    log::info!(
        "{context}: {} rows from {} keys ({skipped} skipped)",
        rows.len(),
        keys.len()
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::{Value, json};

    use super::*;

    struct TestKey(&'static str);

    impl fmt::Display for TestKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl BatchKey for TestKey {
        fn tag(&self, row: &mut Row) {
            row.insert("key".to_owned(), Value::String(self.0.to_owned()));
        }
    }

    fn one_row(field: &str) -> Vec<Row> {
        vec![json!({"field": field}).as_object().unwrap().clone()]
    }

    fn not_found() -> SourceError {
        SourceError::Status {
            status: reqwest::StatusCode::NOT_FOUND,
            url: "http://example.invalid/missing".to_owned(),
        }
    }

    fn server_error() -> SourceError {
        SourceError::Status {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            url: "http://example.invalid/broken".to_owned(),
        }
    }

    #[tokio::test]
    async fn not_found_key_is_isolated() {
        let keys = [
            TestKey("a"),
            TestKey("b"),
            TestKey("c"),
            TestKey("d"),
            TestKey("e"),
        ];

        let rows = fetch_by_keys(
            &keys,
            "test batch",
            |key| {
                let key = key.0;
                async move {
                    if key == "c" {
                        Err(not_found())
                    } else {
                        Ok(one_row(key))
                    }
                }
            },
            None,
        )
        .await
        .unwrap();

        let tagged: Vec<&str> = rows
            .iter()
            .map(|row| row["key"].as_str().unwrap())
            .collect();
        assert_eq!(tagged, ["a", "b", "d", "e"], "key c contributes no rows");
    }

    #[tokio::test]
    async fn rows_for_a_key_stay_contiguous() {
        let keys = [TestKey("a"), TestKey("b")];

        let rows = fetch_by_keys(
            &keys,
            "test batch",
            |_| async {
                Ok(vec![
                    json!({"n": 1}).as_object().unwrap().clone(),
                    json!({"n": 2}).as_object().unwrap().clone(),
                ])
            },
            None,
        )
        .await
        .unwrap();

        let keys_in_order: Vec<&str> = rows
            .iter()
            .map(|row| row["key"].as_str().unwrap())
            .collect();
        assert_eq!(keys_in_order, ["a", "a", "b", "b"]);
    }

    #[tokio::test]
    async fn fatal_error_short_circuits() {
        let keys = [TestKey("a"), TestKey("b"), TestKey("c")];
        let calls = Cell::new(0u32);

        let err = fetch_by_keys(
            &keys,
            "test batch",
            |key| {
                calls.set(calls.get() + 1);
                let key = key.0;
                async move {
                    if key == "b" {
                        Err(server_error())
                    } else {
                        Ok(one_row(key))
                    }
                }
            },
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SourceError::Status { status, .. }
            if status == reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(calls.get(), 2, "key c is never requested");
    }

    #[tokio::test]
    async fn all_keys_skipped_is_an_empty_result() {
        let keys = [TestKey("a"), TestKey("b")];

        let err = fetch_by_keys(
            &keys,
            "wmi decode",
            |_| async { Err::<Vec<Row>, _>(not_found()) },
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SourceError::EmptyResult { context } if context == "wmi decode"));
    }

    #[tokio::test]
    async fn timeouts_are_skipped() {
        let keys = [TestKey("slow"), TestKey("fast")];

        let rows = fetch_by_keys(
            &keys,
            "test batch",
            |key| {
                let key = key.0;
                async move {
                    if key == "slow" {
                        Err(SourceError::Timeout {
                            url: "http://example.invalid/slow".to_owned(),
                        })
                    } else {
                        Ok(one_row(key))
                    }
                }
            },
            None,
        )
        .await
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["key"], "fast");
    }
}
