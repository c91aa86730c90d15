//! Evirma keyword API client
//!
//! One POST per query. The raw payload is validated here and turned into a
//! [`ProviderResponse`]; nothing downstream sees the JSON shape.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{FrequencyProvider, ProviderResponse, SourceError};
use crate::infrastructure::http_client::HttpClient;

#[derive(Debug, Serialize)]
struct KeywordRequest<'a> {
    keywords: [&'a str; 1],
    an: bool,
}

pub struct EvirmaClient {
    http: HttpClient,
    api_url: String,
}

impl EvirmaClient {
    pub fn new(http: HttpClient, api_url: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl FrequencyProvider for EvirmaClient {
    async fn lookup(&self, query: &str, cancel: &CancellationToken) -> ProviderResponse {
        let body = KeywordRequest {
            keywords: [query],
            an: false,
        };
        match self.http.post_json::<_, Value>(&self.api_url, &body, cancel).await {
            Ok(payload) => {
                let response = interpret_payload(query, &payload);
                debug!("Evirma answer for '{}': {:?}", query, response);
                response
            }
            Err(error) => classify_source_error(&error),
        }
    }
}

pub(crate) fn classify_source_error(error: &SourceError) -> ProviderResponse {
    match error {
        SourceError::RateLimited { retry_after, .. } => ProviderResponse::RateLimited {
            retry_after: *retry_after,
        },
        SourceError::Timeout { .. } | SourceError::Transport { .. } => {
            ProviderResponse::transient(error.to_string())
        }
        SourceError::HttpStatus { status, .. } if *status >= 500 => {
            ProviderResponse::transient(error.to_string())
        }
        SourceError::HttpStatus { .. } | SourceError::Malformed { .. } | SourceError::Cancelled => {
            ProviderResponse::permanent(error.to_string())
        }
    }
}

/// `data.keywords[query].cluster` holds the numbers; a null cluster or a
/// missing keyword means the provider has not indexed the query.
pub(crate) fn interpret_payload(query: &str, payload: &Value) -> ProviderResponse {
    let Some(data) = payload.get("data") else {
        return ProviderResponse::permanent("malformed payload: missing 'data'");
    };
    let keywords = match data.get("keywords") {
        None | Some(Value::Null) => return ProviderResponse::NotFound,
        Some(Value::Object(keywords)) => keywords,
        Some(_) => return ProviderResponse::permanent("malformed payload: 'keywords' is not an object"),
    };

    let entry = keywords.get(query).or_else(|| {
        // The provider may normalise the key; accept a single unambiguous entry
        let mut values = keywords.values();
        match (values.next(), values.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    });
    let Some(entry) = entry else {
        return ProviderResponse::NotFound;
    };

    let cluster = match entry.get("cluster") {
        None | Some(Value::Null) => return ProviderResponse::NotFound,
        Some(cluster @ Value::Object(_)) => cluster,
        Some(_) => return ProviderResponse::permanent("malformed payload: 'cluster' is not an object"),
    };

    let frequency = match count_field(cluster.get("freq_syn").and_then(|f| f.get("monthly"))) {
        Ok(value) => value,
        Err(detail) => return ProviderResponse::permanent(format!("malformed frequency: {detail}")),
    };
    let product_count = match count_field(cluster.get("product_count")) {
        Ok(value) => value,
        Err(detail) => {
            return ProviderResponse::permanent(format!("malformed product count: {detail}"));
        }
    };

    ProviderResponse::Ok {
        frequency,
        product_count,
    }
}

/// Absent or null counts are zero; anything else must be a non-negative integer
fn count_field(value: Option<&Value>) -> Result<u64, String> {
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(number)) => number
            .as_u64()
            .ok_or_else(|| format!("{number} is not a non-negative integer")),
        Some(other) => Err(format!("unexpected value {other}")),
    }
}
