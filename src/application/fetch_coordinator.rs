//! Concurrent frequency fetching over a product batch
//!
//! One task per product, at most `max_concurrent` in flight (semaphore).
//! Request spacing and cooldown come from the shared throttle inside the
//! [`FrequencyClient`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::errors::{FetchError, FetchOutcome};
use crate::application::frequency_client::{FrequencyClient, LookupCancelled};
use crate::domain::{FrequencyResult, ProductListing, ProgressEvent, ProgressSink};

pub struct FetchCoordinator {
    client: Arc<FrequencyClient>,
    max_concurrent: usize,
    failure_threshold: f64,
}

impl FetchCoordinator {
    pub fn new(client: Arc<FrequencyClient>, max_concurrent: usize, failure_threshold: f64) -> Self {
        Self {
            client,
            max_concurrent: max_concurrent.max(1),
            failure_threshold,
        }
    }

    /// Fetch every listing. The outcome holds exactly one result per listing,
    /// in input order.
    pub async fn fetch_all(
        &self,
        listings: &[ProductListing],
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> Result<FetchOutcome, FetchError> {
        let total = listings.len();
        info!(
            "🔍 Fetching frequency for {} products ({} concurrent)",
            total, self.max_concurrent
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let completed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = listings
            .iter()
            .cloned()
            .map(|listing| {
                let client = Arc::clone(&self.client);
                let semaphore = Arc::clone(&semaphore);
                let completed = Arc::clone(&completed);
                let cancel = cancel.clone();
                let progress = progress.clone();

                tokio::spawn(async move {
                    let _permit = tokio::select! {
                        permit = semaphore.acquire_owned() => permit.map_err(|_| LookupCancelled)?,
                        () = cancel.cancelled() => return Err(LookupCancelled),
                    };

                    let result = client.fetch(&listing, &cancel, &progress).await?;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress.emit(ProgressEvent::FetchProgress {
                        completed: done,
                        total,
                    });
                    Ok(result)
                })
            })
            .collect();

        let joined = join_all(handles).await;

        let mut results = Vec::with_capacity(total);
        let mut cancelled = false;
        for (listing, joined) in listings.iter().zip(joined) {
            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(LookupCancelled)) => cancelled = true,
                Err(join_error) => {
                    error!(
                        "Frequency worker for product {} failed: {}",
                        listing.product_id, join_error
                    );
                    results.push(FrequencyResult::error(
                        listing.product_id,
                        listing.primary_query(),
                        format!("worker failed: {join_error}"),
                    ));
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress.emit(ProgressEvent::FetchProgress {
                        completed: done,
                        total,
                    });
                }
            }
        }

        if cancelled || cancel.is_cancelled() {
            warn!("🛑 Frequency fetch cancelled");
            return Err(FetchError::Cancelled);
        }

        let outcome = FetchOutcome::new(results);
        info!(
            "✅ Frequency fetch finished: {} products, {} failed",
            outcome.total(),
            outcome.failed_count
        );

        if outcome.failure_rate() > self.failure_threshold {
            warn!(
                "Frequency fetch degraded: {:.0}% failed (threshold {:.0}%)",
                outcome.failure_rate() * 100.0,
                self.failure_threshold * 100.0
            );
            return Err(FetchError::Degraded {
                outcome,
                threshold: self.failure_threshold,
            });
        }

        Ok(outcome)
    }
}
