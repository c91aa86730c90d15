use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::frequency::FetchStatus;
use super::product::ProductId;

/// How products whose lookup failed are treated when ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedFetchPolicy {
    /// Failed products are counted in metadata but not ranked
    #[default]
    Exclude,
    /// Failed products are ranked with a frequency of 0
    ZeroFill,
}

/// One ranked line of the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub rank: u32,
    pub product_id: ProductId,
    pub name: String,
    pub primary_query: String,
    pub frequency_count: u64,
    pub product_count: u64,
    pub status: FetchStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub category_id: String,
    pub category_name: String,
    pub requested_by: String,
    pub generated_at: DateTime<Utc>,
    pub total_products: usize,
    pub failed_count: usize,
    /// False when pagination stopped early and the run proceeded on partial data
    pub catalog_complete: bool,
    /// True when the caller chose to proceed past a degraded fetch batch
    pub degraded: bool,
}

/// Ranked frequency table for one category; built once per request, never retained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub rows: Vec<AggregatedRow>,
}

impl Report {
    pub const HEADERS: [&'static str; 7] = [
        "rank",
        "product_id",
        "name",
        "primary_query",
        "frequency",
        "product_count",
        "status",
    ];

    /// Ranked product ids, in rank order
    pub fn ranked_ids(&self) -> Vec<ProductId> {
        self.rows.iter().map(|row| row.product_id).collect()
    }
}
