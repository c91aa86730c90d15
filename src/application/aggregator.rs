//! Ranking of frequency results into a report
//!
//! Pure: the same listings, results, policy and timestamp always produce the
//! same report.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::{
    AggregatedRow, FailedFetchPolicy, FetchStatus, FrequencyResult, ProductId, ProductListing,
    Report, ReportMetadata,
};

/// Run facts that end up in the report metadata
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReportContext {
    pub category_id: String,
    pub category_name: String,
    pub requested_by: String,
    pub catalog_complete: bool,
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    policy: FailedFetchPolicy,
}

impl Aggregator {
    pub fn new(policy: FailedFetchPolicy) -> Self {
        Self { policy }
    }

    pub fn aggregate(
        &self,
        listings: &[ProductListing],
        results: &[FrequencyResult],
        context: ReportContext,
        generated_at: DateTime<Utc>,
    ) -> Report {
        let names: HashMap<ProductId, &str> = listings
            .iter()
            .map(|listing| (listing.product_id, listing.name.as_str()))
            .collect();

        let mut seen = HashSet::new();
        let mut failed_count = 0;
        let mut ranked: Vec<&FrequencyResult> = Vec::with_capacity(results.len());
        for result in results {
            if !names.contains_key(&result.product_id) {
                warn!("Result for unknown product {} skipped", result.product_id);
                continue;
            }
            if !seen.insert(result.product_id) {
                warn!("Duplicate result for product {}, keeping the first", result.product_id);
                continue;
            }
            if result.is_failed() {
                failed_count += 1;
                if self.policy == FailedFetchPolicy::Exclude {
                    continue;
                }
            }
            ranked.push(result);
        }

        ranked.sort_by_key(|result| (Reverse(ranking_frequency(result)), result.product_id));

        let rows = ranked
            .into_iter()
            .zip(1u32..)
            .map(|(result, rank)| AggregatedRow {
                rank,
                product_id: result.product_id,
                name: names
                    .get(&result.product_id)
                    .map(|name| (*name).to_string())
                    .unwrap_or_default(),
                primary_query: result.primary_query.clone(),
                frequency_count: ranking_frequency(result),
                product_count: result.product_count,
                status: result.status,
            })
            .collect();

        Report {
            metadata: ReportMetadata {
                category_id: context.category_id,
                category_name: context.category_name,
                requested_by: context.requested_by,
                generated_at,
                total_products: seen.len(),
                failed_count,
                catalog_complete: context.catalog_complete,
                degraded: context.degraded,
            },
            rows,
        }
    }
}

/// Failed and not-found lookups rank with zero
fn ranking_frequency(result: &FrequencyResult) -> u64 {
    match result.status {
        FetchStatus::Ok => result.frequency_count,
        FetchStatus::NotFound | FetchStatus::Error => 0,
    }
}
