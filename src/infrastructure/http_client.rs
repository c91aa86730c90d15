//! JSON-over-HTTP client shared by the Wildberries and Evirma clients
//!
//! Wraps a single `reqwest::Client` (connection pool, timeouts, user agent)
//! and classifies every failure into a [`SourceError`] so the callers can make
//! retry decisions without looking at reqwest types.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{
    Client, RequestBuilder, StatusCode,
    header::{ACCEPT, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT},
};
use serde::{Serialize, de::DeserializeOwned};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::SourceError;
use crate::infrastructure::config::HttpConfig;

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<T, SourceError> {
        self.execute(self.client.get(url), url, cancel).await
    }

    pub async fn post_json<B, T>(
        &self,
        url: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<T, SourceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(self.client.post(url).json(body), url, cancel).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<T, SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }

        debug!("Fetching URL: {}", url);

        let response = tokio::select! {
            result = request.send() => result.map_err(|e| map_transport_error(&e, url))?,
            () = cancel.cancelled() => {
                warn!("🛑 HTTP request cancelled for URL: {}", url);
                return Err(SourceError::Cancelled);
            }
        };

        if let Some(error) = classify_status(response.status(), response.headers(), url) {
            return Err(error);
        }

        let body = tokio::select! {
            result = response.bytes() => result.map_err(|e| map_transport_error(&e, url))?,
            () = cancel.cancelled() => {
                warn!("🛑 Response reading cancelled for URL: {}", url);
                return Err(SourceError::Cancelled);
            }
        };

        debug!("Successfully fetched: {} ({} bytes)", url, body.len());
        decode_json(&body, url)
    }
}

/// `None` for success statuses, otherwise the classified error
pub(crate) fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    url: &str,
) -> Option<SourceError> {
    if status.is_success() {
        return None;
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        return Some(SourceError::RateLimited {
            url: url.to_string(),
            retry_after,
        });
    }
    Some(SourceError::HttpStatus {
        status: status.as_u16(),
        url: url.to_string(),
    })
}

/// Only the delta-seconds form is honoured; HTTP dates fall back to the
/// configured cooldown.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

pub(crate) fn decode_json<T: DeserializeOwned>(body: &[u8], url: &str) -> Result<T, SourceError> {
    serde_json::from_slice(body).map_err(|e| SourceError::Malformed {
        url: url.to_string(),
        message: e.to_string(),
    })
}

fn map_transport_error(error: &reqwest::Error, url: &str) -> SourceError {
    if error.is_timeout() {
        SourceError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_decode() {
        SourceError::Malformed {
            url: url.to_string(),
            message: error.to_string(),
        }
    } else {
        SourceError::Transport {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://catalog.wb.ru/catalog/x/catalog";

    #[test]
    fn client_builds_from_default_config() {
        assert!(HttpClient::new(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn success_status_is_not_an_error() {
        assert_eq!(classify_status(StatusCode::OK, &HeaderMap::new(), URL), None);
    }

    #[test]
    fn too_many_requests_carries_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        let error = classify_status(StatusCode::TOO_MANY_REQUESTS, &headers, URL).unwrap();
        assert_eq!(error.retry_after(), Some(Duration::from_secs(7)));
        assert!(error.is_transient());
    }

    #[test]
    fn http_date_retry_after_is_ignored() {
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after(" 12 "), Some(Duration::from_secs(12)));
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let server = classify_status(StatusCode::BAD_GATEWAY, &HeaderMap::new(), URL).unwrap();
        let client = classify_status(StatusCode::NOT_FOUND, &HeaderMap::new(), URL).unwrap();
        assert!(server.is_transient());
        assert!(!client.is_transient());
    }

    #[test]
    fn undecodable_body_is_malformed() {
        let result: Result<serde_json::Value, _> = decode_json(b"<html>", URL);
        assert!(matches!(result, Err(SourceError::Malformed { .. })));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let client = HttpClient::new(&HttpConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<serde_json::Value, _> = client.get_json(URL, &cancel).await;
        assert_eq!(result, Err(SourceError::Cancelled));
    }
}
