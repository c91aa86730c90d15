//! Ranking and fan-out throughput for category-sized batches
//!
//! Large Wildberries categories run to a few thousand distinct products, so
//! both benchmarks sweep 100..5000 listings.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use wb_category_analyzer_lib::application::{
    Aggregator, FetchCoordinator, FrequencyClient, ReportContext,
};
use wb_category_analyzer_lib::domain::{
    FailedFetchPolicy, FrequencyProvider, FrequencyResult, PagePosition, ProductListing,
    ProgressSink, ProviderResponse,
};
use wb_category_analyzer_lib::infrastructure::{ProviderThrottle, RetryPolicy};

const SIZES: [u64; 3] = [100, 1_000, 5_000];

/// Answers instantly so the benchmark measures coordination only
struct InstantProvider;

#[async_trait]
impl FrequencyProvider for InstantProvider {
    async fn lookup(&self, query: &str, _cancel: &CancellationToken) -> ProviderResponse {
        ProviderResponse::Ok {
            frequency: query.len() as u64 * 7 % 1_000,
            product_count: 1,
        }
    }
}

fn listings(count: u64) -> Vec<ProductListing> {
    (0..count)
        .map(|id| {
            let page = u32::try_from(id / 100).unwrap_or(u32::MAX) + 1;
            let index = u32::try_from(id % 100).unwrap_or(0);
            ProductListing::new(id, format!("Платье летнее {id}"), PagePosition::new(page, index))
        })
        .collect()
}

/// Every seventh lookup failed, frequencies spread with plenty of ties
fn results(listings: &[ProductListing]) -> Vec<FrequencyResult> {
    listings
        .iter()
        .map(|listing| {
            let id = listing.product_id;
            if id % 7 == 0 {
                FrequencyResult::error(id, listing.primary_query(), "502 Bad Gateway")
            } else {
                FrequencyResult::ok(id, listing.primary_query(), id * 31 % 500, 10)
            }
        })
        .collect()
}

fn aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    for size in SIZES {
        let listings = listings(size);
        let results = results(&listings);

        for policy in [FailedFetchPolicy::Exclude, FailedFetchPolicy::ZeroFill] {
            let aggregator = Aggregator::new(policy);
            group.bench_with_input(
                BenchmarkId::new(format!("{policy:?}"), size),
                &size,
                |b, _| {
                    b.iter(|| {
                        aggregator.aggregate(
                            black_box(&listings),
                            black_box(&results),
                            ReportContext::default(),
                            Utc::now(),
                        )
                    });
                },
            );
        }
    }
    group.finish();
}

fn fetch_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = Arc::new(FrequencyClient::new(
        Arc::new(InstantProvider),
        Arc::new(ProviderThrottle::unthrottled()),
        RetryPolicy::immediate(1),
    ));
    let coordinator = FetchCoordinator::new(client, 8, 0.5);

    let mut group = c.benchmark_group("fetch_all");
    for size in SIZES {
        let listings = listings(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(&rt).iter(|| async {
                coordinator
                    .fetch_all(
                        black_box(&listings),
                        &CancellationToken::new(),
                        &ProgressSink::disabled(),
                    )
                    .await
            });
        });
    }
    group.finish();
}

criterion_group!(benches, aggregation, fetch_fan_out);
criterion_main!(benches);
