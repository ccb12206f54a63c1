//! Sequential page-by-page fetching for listing endpoints.
//!
//! The upstream listing reports a record count per page; a page whose count
//! is zero signals the end of the listing. Pages are fetched strictly in
//! order — pagination state is sequential, so a failure on a middle page
//! leaves the accumulated result logically incomplete and aborts the stage
//! rather than retrying around a hole.

use crate::SourceError;

/// A single page of a listing.
#[derive(Debug, Clone)]
pub struct Page {
    /// The record count the source reported for this page.
    pub count: i64,
    /// The raw records on this page.
    pub records: Vec<serde_json::Value>,
}

/// Trait for endpoints that serve a listing one page at a time.
pub trait PagedSource: Send + Sync {
    /// Fetches the page with the given 1-based page number.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the HTTP request or response parsing
    /// fails.
    fn fetch_page(
        &self,
        page: u32,
    ) -> impl std::future::Future<Output = Result<Page, SourceError>> + Send;
}

/// Fetches pages 1, 2, 3, … until the source reports an empty page, and
/// returns the accumulated records in page order. The terminating empty
/// page is discarded, not appended.
///
/// There is no upper bound on the page count: a source that never reports
/// an empty page iterates indefinitely.
///
/// # Errors
///
/// Returns the first [`SourceError`] encountered — any failure aborts the
/// whole listing.
pub async fn fetch_all_pages(
    source: &(impl PagedSource + ?Sized),
) -> Result<Vec<serde_json::Value>, SourceError> {
    let mut all_records = Vec::new();
    let mut page: u32 = 1;

    loop {
        log::debug!("Fetching page {page}");
        let result = source.fetch_page(page).await?;

        if result.count == 0 {
            log::debug!("Page {page} reported count 0, stopping");
            break;
        }

        all_records.extend(result.records);
        page += 1;
    }

    log::info!(
        "Paged fetch complete — {} records over {} pages",
        all_records.len(),
        page - 1
    );
    Ok(all_records)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Serves `pages` in order, then an endless run of empty pages.
    struct FixedPages {
        pages: Vec<Vec<serde_json::Value>>,
    }

    impl PagedSource for FixedPages {
        async fn fetch_page(&self, page: u32) -> Result<Page, SourceError> {
            let records = self
                .pages
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_default();
            Ok(Page {
                count: records.len() as i64,
                records,
            })
        }
    }

    /// Fails on the given page, serves one record on every other page.
    struct FailsAt {
        failing_page: u32,
    }

    impl PagedSource for FailsAt {
        async fn fetch_page(&self, page: u32) -> Result<Page, SourceError> {
            if page == self.failing_page {
                return Err(SourceError::Normalization {
                    message: format!("boom on page {page}"),
                });
            }
            Ok(Page {
                count: 1,
                records: vec![json!({"page": page})],
            })
        }
    }

    #[tokio::test]
    async fn stops_at_first_empty_page() {
        let source = FixedPages {
            pages: vec![
                vec![json!({"id": 1}), json!({"id": 2})],
                vec![json!({"id": 3})],
            ],
        };

        let records = fetch_all_pages(&source).await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["id"], 1);
        assert_eq!(records[2]["id"], 3);
    }

    #[tokio::test]
    async fn empty_first_page_yields_no_records() {
        let source = FixedPages { pages: vec![] };
        let records = fetch_all_pages(&source).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn mid_sequence_failure_aborts_the_stage() {
        let source = FailsAt { failing_page: 3 };
        let err = fetch_all_pages(&source).await.unwrap_err();
        assert!(matches!(err, SourceError::Normalization { .. }));
    }
}
