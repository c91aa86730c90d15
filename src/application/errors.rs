//! Error types of the parse pipeline
//!
//! Each stage has its own error enum; [`PipelineError`] is what the calling
//! layer sees. It always names the stage and, once known, the category.

use thiserror::Error;

use crate::domain::{ExportError, FrequencyResult, ParseStage, ProductListing, SourceError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Invalid catalog URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported category '{category_id}': {reason}")]
    UnsupportedCategory { category_id: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaginationError {
    /// Page fetch failed for good; products collected before it are kept
    #[error("Catalog unavailable at page {page} ({} products collected): {reason}", .partial.len())]
    CatalogUnavailable {
        partial: Vec<ProductListing>,
        page: u32,
        reason: SourceError,
    },

    #[error("Pagination cancelled")]
    Cancelled,
}

/// Results of a fetch batch, one per input listing and in input order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchOutcome {
    pub results: Vec<FrequencyResult>,
    pub failed_count: usize,
}

impl FetchOutcome {
    pub fn new(results: Vec<FrequencyResult>) -> Self {
        let failed_count = results.iter().filter(|r| r.is_failed()).count();
        Self {
            results,
            failed_count,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Share of failed lookups; 0 for an empty batch
    pub fn failure_rate(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.failed_count as f64 / self.results.len() as f64
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Too many lookups failed; the outcome is attached so the caller can
    /// still proceed without refetching
    #[error(
        "Frequency fetch degraded: {failed} of {total} lookups failed (threshold {threshold})",
        failed = .outcome.failed_count,
        total = .outcome.total()
    )]
    Degraded { outcome: FetchOutcome, threshold: f64 },

    #[error("Frequency fetch cancelled")]
    Cancelled,
}

/// Caller-facing error of a parse request
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid catalog URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported category '{category_id}': {reason}")]
    UnsupportedCategory { category_id: String, reason: String },

    #[error("Catalog unavailable for '{category_id}' at page {page}: {reason}")]
    CatalogUnavailable {
        category_id: String,
        page: u32,
        collected: usize,
        reason: SourceError,
    },

    #[error("Frequency data unreliable for '{category_id}': {failed_count} of {total} lookups failed")]
    FetchDegraded {
        category_id: String,
        failed_count: usize,
        total: usize,
    },

    #[error("Failed to export report for '{category_id}': {source}")]
    SerializationFailed {
        category_id: String,
        #[source]
        source: ExportError,
    },

    #[error("Parse cancelled during {}", .stage.label())]
    Cancelled {
        category_id: Option<String>,
        stage: ParseStage,
    },

    #[error("Parse timed out during {}", .stage.label())]
    TimedOut {
        category_id: Option<String>,
        stage: ParseStage,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    /// Stage the run was in when it failed. Resolution and configuration
    /// failures report `Resolved`, the first stage.
    pub fn stage(&self) -> ParseStage {
        match self {
            Self::InvalidUrl { .. } | Self::UnsupportedCategory { .. } | Self::Configuration(_) => {
                ParseStage::Resolved
            }
            Self::CatalogUnavailable { .. } => ParseStage::Paginating,
            Self::FetchDegraded { .. } => ParseStage::Fetching,
            Self::SerializationFailed { .. } => ParseStage::Exporting,
            Self::Cancelled { stage, .. } | Self::TimedOut { stage, .. } => stage.clone(),
        }
    }

    pub fn category_id(&self) -> Option<&str> {
        match self {
            Self::UnsupportedCategory { category_id, .. }
            | Self::CatalogUnavailable { category_id, .. }
            | Self::FetchDegraded { category_id, .. }
            | Self::SerializationFailed { category_id, .. } => Some(category_id),
            Self::Cancelled { category_id, .. } | Self::TimedOut { category_id, .. } => {
                category_id.as_deref()
            }
            Self::InvalidUrl { .. } | Self::Configuration(_) => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<ResolveError> for PipelineError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::InvalidUrl { url, reason } => Self::InvalidUrl { url, reason },
            ResolveError::UnsupportedCategory {
                category_id,
                reason,
            } => Self::UnsupportedCategory {
                category_id,
                reason,
            },
        }
    }
}
