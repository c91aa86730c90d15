//! Per-product frequency lookup with retry and shared cooldown
//!
//! Every outcome except cancellation becomes a [`FrequencyResult`], so one
//! product never aborts the batch.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::{
    FrequencyProvider, FrequencyResult, ProductListing, ProgressEvent, ProgressSink,
    ProviderResponse,
};
use crate::infrastructure::provider_throttle::ProviderThrottle;
use crate::infrastructure::retry_policy::{RetryDecision, RetryError, RetryPolicy};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("frequency lookup cancelled")]
pub struct LookupCancelled;

/// Why a single attempt did not produce an answer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
enum AttemptFailure {
    #[error("rate limited by provider")]
    RateLimited,

    #[error("{detail}")]
    Provider { detail: String, transient: bool },

    #[error("cancelled")]
    Cancelled,
}

impl AttemptFailure {
    fn decision(&self) -> RetryDecision {
        match self {
            // The throttle already holds the cooldown; the next attempt waits on it
            Self::RateLimited => RetryDecision::Retry { after: None },
            Self::Provider {
                transient: true, ..
            } => RetryDecision::Retry { after: None },
            Self::Provider { .. } | Self::Cancelled => RetryDecision::Stop,
        }
    }
}

pub struct FrequencyClient {
    provider: Arc<dyn FrequencyProvider>,
    throttle: Arc<ProviderThrottle>,
    retry: RetryPolicy,
}

impl FrequencyClient {
    pub fn new(
        provider: Arc<dyn FrequencyProvider>,
        throttle: Arc<ProviderThrottle>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            throttle,
            retry,
        }
    }

    pub fn throttle(&self) -> &Arc<ProviderThrottle> {
        &self.throttle
    }

    /// Look up the frequency of one product's primary query
    pub async fn fetch(
        &self,
        listing: &ProductListing,
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> Result<FrequencyResult, LookupCancelled> {
        let product_id = listing.product_id;
        let query = listing.primary_query();
        if query.is_empty() {
            warn!("Product {} has an empty primary query", product_id);
            return Ok(FrequencyResult::error(product_id, query, "empty primary query"));
        }

        let label = format!("frequency lookup for {product_id}");
        let provider = &self.provider;
        let throttle = &self.throttle;

        let outcome = self
            .retry
            .run(&label, cancel, AttemptFailure::decision, move |attempt| async move {
                if throttle.acquire(cancel).await.is_err() {
                    return Err(AttemptFailure::Cancelled);
                }
                debug!("Looking up '{}' (product {}, attempt {})", query, product_id, attempt);

                match provider.lookup(query, cancel).await {
                    response @ (ProviderResponse::Ok { .. } | ProviderResponse::NotFound) => {
                        Ok(response)
                    }
                    ProviderResponse::RateLimited { retry_after } => {
                        let cooldown = throttle.trip(retry_after);
                        progress.emit(ProgressEvent::CooldownStarted {
                            millis: u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX),
                        });
                        Err(AttemptFailure::RateLimited)
                    }
                    ProviderResponse::Error { detail, transient } => {
                        Err(AttemptFailure::Provider { detail, transient })
                    }
                }
            })
            .await;

        match outcome {
            Ok(ProviderResponse::Ok {
                frequency,
                product_count,
            }) => Ok(FrequencyResult::ok(product_id, query, frequency, product_count)),
            Ok(_) => Ok(FrequencyResult::not_found(product_id, query)),
            Err(RetryError::Cancelled)
            | Err(RetryError::Permanent {
                error: AttemptFailure::Cancelled,
                ..
            }) => Err(LookupCancelled),
            Err(_) if cancel.is_cancelled() => Err(LookupCancelled),
            Err(RetryError::Exhausted { attempts, last }) => Ok(FrequencyResult::error(
                product_id,
                query,
                format!("{last} (after {attempts} attempts)"),
            )),
            Err(RetryError::Permanent { error, .. }) => {
                warn!("Permanent lookup failure for product {}: {}", product_id, error);
                Ok(FrequencyResult::error(product_id, query, error.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FetchStatus, PagePosition};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Replays scripted responses; the last one repeats
    struct ScriptedProvider {
        responses: Mutex<Vec<ProviderResponse>>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ProviderResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl FrequencyProvider for ScriptedProvider {
        async fn lookup(&self, _query: &str, _cancel: &CancellationToken) -> ProviderResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            }
        }
    }

    fn listing(name: &str) -> ProductListing {
        ProductListing::new(11, name, PagePosition::new(1, 0))
    }

    fn client(provider: Arc<ScriptedProvider>) -> FrequencyClient {
        FrequencyClient::new(
            provider,
            Arc::new(ProviderThrottle::unthrottled()),
            RetryPolicy::immediate(3),
        )
    }

    async fn fetch(provider: Arc<ScriptedProvider>, name: &str) -> Result<FrequencyResult, LookupCancelled> {
        client(provider)
            .fetch(&listing(name), &CancellationToken::new(), &ProgressSink::disabled())
            .await
    }

    #[tokio::test]
    async fn ok_response_becomes_ok_result() {
        let provider = ScriptedProvider::new(vec![ProviderResponse::Ok {
            frequency: 120,
            product_count: 9,
        }]);
        let result = fetch(provider, " Платье ").await.unwrap();
        assert_eq!(result, FrequencyResult::ok(11, "Платье", 120, 9));
    }

    #[tokio::test]
    async fn not_found_is_distinct_from_error() {
        let provider = ScriptedProvider::new(vec![ProviderResponse::NotFound]);
        let result = fetch(provider, "Платье").await.unwrap();
        assert_eq!(result.status, FetchStatus::NotFound);
        assert_eq!(result.frequency_count, 0);
    }

    #[tokio::test]
    async fn transient_errors_exhaust_into_error_status() {
        let provider = ScriptedProvider::new(vec![ProviderResponse::transient("502 Bad Gateway")]);
        let result = fetch(provider.clone(), "Платье").await.unwrap();
        assert_eq!(result.status, FetchStatus::Error);
        assert!(result.detail.unwrap().contains("after 3 attempts"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let provider = ScriptedProvider::new(vec![ProviderResponse::permanent("400 Bad Request")]);
        let result = fetch(provider.clone(), "Платье").await.unwrap();
        assert_eq!(result.status, FetchStatus::Error);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_query_fails_without_a_request() {
        let provider = ScriptedProvider::new(vec![ProviderResponse::NotFound]);
        let result = fetch(provider.clone(), "   ").await.unwrap();
        assert_eq!(result.status, FetchStatus::Error);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rate_limit_trips_shared_cooldown_then_recovers() {
        let provider = ScriptedProvider::new(vec![
            ProviderResponse::RateLimited {
                retry_after: Some(Duration::from_millis(40)),
            },
            ProviderResponse::Ok {
                frequency: 5,
                product_count: 1,
            },
        ]);
        let client = client(provider.clone());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let started = std::time::Instant::now();
        let result = client
            .fetch(&listing("Платье"), &CancellationToken::new(), &ProgressSink::new(tx))
            .await
            .unwrap();

        assert_eq!(result.status, FetchStatus::Ok);
        assert!(started.elapsed() >= Duration::from_millis(35));
        assert_eq!(client.throttle().trip_count(), 1);
        assert_eq!(rx.recv().await, Some(ProgressEvent::CooldownStarted { millis: 40 }));
    }

    #[tokio::test]
    async fn cancellation_is_not_an_error_result() {
        let provider = ScriptedProvider::new(vec![ProviderResponse::NotFound]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = client(provider)
            .fetch(&listing("Платье"), &cancel, &ProgressSink::disabled())
            .await;
        assert_eq!(result, Err(LookupCancelled));
    }
}
