//! Service seams between the pipeline and the outside world
//!
//! The pipeline only talks to these traits; the reqwest-backed clients in
//! `infrastructure` implement them for production and tests use fakes.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use super::category::{Category, CatalogNode};
use super::errors::{ExportError, SourceError};
use super::frequency::ProviderResponse;
use super::product::CatalogItem;
use super::report::Report;

/// Wildberries catalog: menu lookup and paged listings
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Find the main-menu node for a category; `Ok(None)` when the menu has no
    /// product-listing node for it.
    async fn locate(
        &self,
        category: &Category,
        cancel: &CancellationToken,
    ) -> Result<Option<CatalogNode>, SourceError>;

    /// Fetch one listing page (1-based)
    async fn fetch_page(
        &self,
        node: &CatalogNode,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<CatalogItem>, SourceError>;
}

/// Search-frequency provider (Evirma)
#[async_trait]
pub trait FrequencyProvider: Send + Sync {
    /// Look up one query. Every outcome, transport failures included, comes
    /// back as a tagged response.
    async fn lookup(&self, query: &str, cancel: &CancellationToken) -> ProviderResponse;
}

/// Pure serializer: report in, file out
pub trait ReportExporter: Send + Sync {
    fn export(&self, report: &Report) -> Result<PathBuf, ExportError>;
}
