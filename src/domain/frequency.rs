//! Frequency lookup results and the validated provider response variants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::product::ProductId;

/// Outcome of a single product's frequency lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchStatus {
    Ok,
    /// Provider has no data for the query (not indexed)
    NotFound,
    /// Lookup failed after retries or with a permanent error
    Error,
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ok => "ok",
            Self::NotFound => "not_found",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyResult {
    pub product_id: ProductId,
    pub primary_query: String,
    pub frequency_count: u64,
    /// How many marketplace products answer the query
    pub product_count: u64,
    pub status: FetchStatus,
    pub detail: Option<String>,
}

impl FrequencyResult {
    pub fn ok(
        product_id: ProductId,
        primary_query: impl Into<String>,
        frequency_count: u64,
        product_count: u64,
    ) -> Self {
        Self {
            product_id,
            primary_query: primary_query.into(),
            frequency_count,
            product_count,
            status: FetchStatus::Ok,
            detail: None,
        }
    }

    pub fn not_found(product_id: ProductId, primary_query: impl Into<String>) -> Self {
        Self {
            product_id,
            primary_query: primary_query.into(),
            frequency_count: 0,
            product_count: 0,
            status: FetchStatus::NotFound,
            detail: None,
        }
    }

    pub fn error(
        product_id: ProductId,
        primary_query: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            primary_query: primary_query.into(),
            frequency_count: 0,
            product_count: 0,
            status: FetchStatus::Error,
            detail: Some(detail.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == FetchStatus::Error
    }
}

/// Provider answer validated at the transport boundary.
///
/// Nothing past the provider client inspects raw payload shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResponse {
    Ok { frequency: u64, product_count: u64 },
    NotFound,
    RateLimited { retry_after: Option<Duration> },
    Error { detail: String, transient: bool },
}

impl ProviderResponse {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self::Error {
            detail: detail.into(),
            transient: true,
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self::Error {
            detail: detail.into(),
            transient: false,
        }
    }

    /// Worth another attempt under the retry policy
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Error { transient, .. } => *transient,
            Self::Ok { .. } | Self::NotFound => false,
        }
    }
}
