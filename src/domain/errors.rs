//! Transport and export error types shared by the service seams.

use std::time::Duration;
use thiserror::Error;

/// Classified failure of a single outbound request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Request timed out: {url}")]
    Timeout { url: String },

    #[error("Rate limited by {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },

    #[error("HTTP error {status}: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Malformed payload from {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("Request cancelled")]
    Cancelled,
}

impl SourceError {
    /// Timeouts, rate limits, connection failures and 5xx are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::Transport { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            Self::Malformed { .. } | Self::Cancelled => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Failure of the report serializer; surfaced to the caller verbatim
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to create output directory {path}: {source}")]
    OutputDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write report: {0}")]
    Write(#[from] csv::Error),

    #[error("Failed to build workbook: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    #[error("Failed to flush report: {0}")]
    Io(#[from] std::io::Error),
}
