//! HTTP GET helpers with defensive backoff for transient errors.
//!
//! The upstream registry documents no rate-limiting behavior, so every
//! fetch goes through [`get_json`] or [`get_text`], which retry HTTP 429,
//! 5xx, and connection-level failures a bounded number of times with
//! exponential backoff.
//!
//! Deliberately narrow: 404 and other client errors surface immediately as
//! [`SourceError::Status`], decode failures as [`SourceError::Json`] /
//! [`SourceError::Csv`] upstream, and budgeted timeouts as
//! [`SourceError::Timeout`] — none of those are retried, since the keyed
//! batch fetcher's skip-or-abort policy owns what happens to them.

use std::time::Duration;

use crate::SourceError;

/// Maximum number of retry attempts for transient HTTP errors.
///
/// With exponential backoff (2s, 4s, 8s) the total wait before giving up
/// is 14 seconds.
const MAX_RETRIES: u32 = 3;

/// Backoff delay before retry `attempt` (1-based).
const fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt)
}

/// Sends a GET request, retrying transient failures, and returns the
/// response once the server answers with a success status.
///
/// `timeout` is an optional whole-request budget; exceeding it yields
/// [`SourceError::Timeout`] without retry.
///
/// # Errors
///
/// Returns [`SourceError::Status`] for a non-success status (after
/// retries, for 429/5xx), [`SourceError::Timeout`] for an exceeded
/// budget, or [`SourceError::Http`] for connection failures.
pub async fn get_with_retry(
    client: &reqwest::Client,
    url: &str,
    timeout: Option<Duration>,
) -> Result<reqwest::Response, SourceError> {
    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            log::warn!("  retry {attempt}/{MAX_RETRIES} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.get(url);
        if let Some(budget) = timeout {
            request = request.timeout(budget);
        }

        match request.send().await {
            Err(e) if e.is_timeout() => {
                return Err(SourceError::Timeout {
                    url: url.to_owned(),
                });
            }
            Err(e) => {
                if e.is_connect() && attempt < MAX_RETRIES {
                    log::warn!("  transient connection error: {e}");
                    continue;
                }
                return Err(SourceError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                // 429 and 5xx are worth another attempt; everything else
                // non-success is permanent.
                if (status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error())
                    && attempt < MAX_RETRIES
                {
                    log::warn!("  HTTP {status} from {url}");
                    continue;
                }

                if !status.is_success() {
                    return Err(SourceError::Status {
                        status,
                        url: url.to_owned(),
                    });
                }

                return Ok(response);
            }
        }
    }

    unreachable!("retry loop exited without returning")
}

/// GET a URL and parse the response body as JSON.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails or the body is not valid
/// JSON.
pub async fn get_json(
    client: &reqwest::Client,
    url: &str,
    timeout: Option<Duration>,
) -> Result<serde_json::Value, SourceError> {
    let text = get_text(client, url, timeout).await?;
    Ok(serde_json::from_str(&text)?)
}

/// GET a URL and return the response body as a `String`.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails or the body cannot be
/// read.
pub async fn get_text(
    client: &reqwest::Client,
    url: &str,
    timeout: Option<Duration>,
) -> Result<String, SourceError> {
    let response = get_with_retry(client, url, timeout).await?;
    let url = response.url().to_string();

    response.text().await.map_err(|e| {
        if e.is_timeout() {
            SourceError::Timeout { url }
        } else {
            SourceError::Http(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
    }
}
