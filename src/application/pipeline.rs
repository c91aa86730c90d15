//! Parse pipeline: one category URL in, one exported report out
//!
//! Resolved → Paginating → Fetching → Aggregating → Exporting → Done, with
//! `Failed` reachable from every live stage. Each request owns its pipeline
//! state; only the provider throttle is shared between concurrent requests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::application::aggregator::{Aggregator, ReportContext};
use crate::application::catalog_paginator::{CatalogPaginator, retry_decision};
use crate::application::category_resolver::CategoryResolver;
use crate::application::errors::{FetchError, PaginationError, PipelineError};
use crate::application::fetch_coordinator::FetchCoordinator;
use crate::application::frequency_client::FrequencyClient;
use crate::domain::{
    CatalogNode, CatalogSource, Category, ExportError, FailedFetchPolicy, FrequencyProvider,
    ParseStage, ProgressEvent, ProgressSink, ReportExporter, ReportMetadata, SourceError,
};
use crate::infrastructure::config::{AppConfig, ReportFormat};
use crate::infrastructure::evirma_client::EvirmaClient;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::provider_throttle::ProviderThrottle;
use crate::infrastructure::report_exporter::{CsvReportExporter, XlsxReportExporter};
use crate::infrastructure::retry_policy::{RetryError, RetryPolicy};
use crate::infrastructure::wildberries_client::WildberriesClient;

/// One parse request from the calling layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRequest {
    pub url: String,
    /// Opaque identity of whoever asked (chat id, CLI user)
    pub requested_by: String,
}

impl ParseRequest {
    pub fn new(url: impl Into<String>, requested_by: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            requested_by: requested_by.into(),
        }
    }
}

/// What a successful run hands back; the report itself is not retained
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub path: PathBuf,
    pub metadata: ReportMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub max_pages: u32,
    pub max_concurrent: usize,
    pub failure_threshold: f64,
    pub failed_fetch_policy: FailedFetchPolicy,
    pub proceed_on_partial_catalog: bool,
    pub proceed_on_degraded: bool,
    pub run_timeout: Duration,
    pub catalog_retry: RetryPolicy,
    pub frequency_retry: RetryPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_pages: config.catalog.max_pages,
            max_concurrent: config.frequency.max_concurrent,
            failure_threshold: config.frequency.failure_threshold,
            failed_fetch_policy: config.pipeline.failed_fetch_policy,
            proceed_on_partial_catalog: config.pipeline.proceed_on_partial_catalog,
            proceed_on_degraded: config.pipeline.proceed_on_degraded,
            run_timeout: Duration::from_secs(config.pipeline.run_timeout_seconds),
            catalog_retry: RetryPolicy::from_config(&config.catalog.retry),
            frequency_retry: RetryPolicy::from_config(&config.frequency.retry),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// External collaborators of the pipeline
#[derive(Clone)]
pub struct PipelineServices {
    pub catalog: Arc<dyn CatalogSource>,
    pub provider: Arc<dyn FrequencyProvider>,
    pub exporter: Arc<dyn ReportExporter>,
    pub throttle: Arc<ProviderThrottle>,
}

impl PipelineServices {
    /// Production wiring: Wildberries + Evirma over one HTTP client, CSV export
    pub fn from_config(config: &AppConfig, throttle: Arc<ProviderThrottle>) -> anyhow::Result<Self> {
        let http = HttpClient::new(&config.http)?;
        Ok(Self {
            catalog: Arc::new(WildberriesClient::new(http.clone(), config.catalog.clone())),
            provider: Arc::new(EvirmaClient::new(http, config.frequency.api_url.clone())),
            exporter: match config.export.format {
                ReportFormat::Xlsx => Arc::new(XlsxReportExporter::new(config.export.output_dir.clone())),
                ReportFormat::Csv => Arc::new(CsvReportExporter::new(config.export.output_dir.clone())),
            },
            throttle,
        })
    }
}

/// Validated stage transitions plus `StageChanged` notifications
struct StageTracker {
    current: Mutex<ParseStage>,
    progress: ProgressSink,
}

impl StageTracker {
    fn start(progress: ProgressSink) -> Self {
        progress.emit(ProgressEvent::StageChanged {
            stage: ParseStage::Resolved,
        });
        Self {
            current: Mutex::new(ParseStage::Resolved),
            progress,
        }
    }

    fn current(&self) -> ParseStage {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn advance(&self, next: ParseStage) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if !current.can_transition_to(&next) {
            warn!("Ignoring stage transition {} -> {}", current.label(), next.label());
            return;
        }
        info!("📍 Stage: {} -> {}", current.label(), next.label());
        *current = next.clone();
        drop(current);
        self.progress.emit(ProgressEvent::StageChanged { stage: next });
    }
}

pub struct ParsePipeline {
    resolver: CategoryResolver,
    catalog: Arc<dyn CatalogSource>,
    exporter: Arc<dyn ReportExporter>,
    paginator: CatalogPaginator,
    coordinator: FetchCoordinator,
    aggregator: Aggregator,
    settings: PipelineSettings,
}

impl ParsePipeline {
    pub fn new(services: PipelineServices, settings: PipelineSettings) -> Result<Self, PipelineError> {
        let resolver =
            CategoryResolver::new().map_err(|e| PipelineError::Configuration(e.to_string()))?;
        let client = FrequencyClient::new(
            services.provider,
            services.throttle,
            settings.frequency_retry.clone(),
        );

        Ok(Self {
            resolver,
            paginator: CatalogPaginator::new(
                Arc::clone(&services.catalog),
                settings.catalog_retry.clone(),
                settings.max_pages,
            ),
            coordinator: FetchCoordinator::new(
                Arc::new(client),
                settings.max_concurrent,
                settings.failure_threshold,
            ),
            aggregator: Aggregator::new(settings.failed_fetch_policy),
            catalog: services.catalog,
            exporter: services.exporter,
            settings,
        })
    }

    /// Validate the configuration and wire the production services
    pub fn from_config(config: &AppConfig, throttle: Arc<ProviderThrottle>) -> anyhow::Result<Self> {
        config.validate()?;
        let services = PipelineServices::from_config(config, throttle)?;
        Ok(Self::new(services, PipelineSettings::from_config(config))?)
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one parse request to completion, failure, cancellation or timeout
    pub async fn run(
        &self,
        request: &ParseRequest,
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> Result<ParseOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let category = match self.resolver.resolve(&request.url) {
            Ok(category) => category,
            Err(resolve_error) => {
                let error = PipelineError::from(resolve_error);
                warn!("Rejected parse request from {}: {}", request.requested_by, error);
                progress.emit(ProgressEvent::StageChanged {
                    stage: ParseStage::Failed(error.to_string()),
                });
                return Err(error);
            }
        };

        let span = info_span!(
            "parse_run",
            %run_id,
            category_id = %category.id(),
            requested_by = %request.requested_by
        );

        async {
            info!("🚀 Parse started for {}", category.raw_url());
            let tracker = StageTracker::start(progress.clone());
            let run_cancel = cancel.child_token();

            let result = match tokio::time::timeout(
                self.settings.run_timeout,
                self.execute(&category, request, &run_cancel, &tracker, progress),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => {
                    run_cancel.cancel();
                    Err(PipelineError::TimedOut {
                        category_id: Some(category.id().to_string()),
                        stage: tracker.current(),
                    })
                }
            };

            match &result {
                Ok(outcome) => info!(
                    "🎉 Parse finished: {} ranked from {} products ({} failed) -> {}",
                    category.id(),
                    outcome.metadata.total_products,
                    outcome.metadata.failed_count,
                    outcome.path.display()
                ),
                Err(error) if error.is_cancelled() => warn!("🛑 Parse cancelled: {}", error),
                Err(error) => error!("❌ Parse failed: {}", error),
            }
            if let Err(error) = &result {
                tracker.advance(ParseStage::Failed(error.to_string()));
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        category: &Category,
        request: &ParseRequest,
        cancel: &CancellationToken,
        tracker: &StageTracker,
        progress: &ProgressSink,
    ) -> Result<ParseOutcome, PipelineError> {
        let category_id = category.id().to_string();
        let cancelled = |stage: ParseStage| PipelineError::Cancelled {
            category_id: Some(category_id.clone()),
            stage,
        };

        let node = self.locate(category, cancel).await?;

        tracker.advance(ParseStage::Paginating);
        let (listings, catalog_complete) =
            match self.paginator.collect(&node, cancel, progress).await {
                Ok(listings) => (listings, true),
                Err(PaginationError::Cancelled) => return Err(cancelled(ParseStage::Paginating)),
                Err(PaginationError::CatalogUnavailable {
                    partial,
                    page,
                    reason,
                }) => {
                    if self.settings.proceed_on_partial_catalog && !partial.is_empty() {
                        warn!(
                            "Proceeding with {} products collected before page {} failed",
                            partial.len(),
                            page
                        );
                        (partial, false)
                    } else {
                        return Err(PipelineError::CatalogUnavailable {
                            category_id: category_id.clone(),
                            page,
                            collected: partial.len(),
                            reason,
                        });
                    }
                }
            };
        info!("📦 Collected {} distinct products", listings.len());

        tracker.advance(ParseStage::Fetching);
        let (outcome, degraded) = match self.coordinator.fetch_all(&listings, cancel, progress).await {
            Ok(outcome) => (outcome, false),
            Err(FetchError::Cancelled) => return Err(cancelled(ParseStage::Fetching)),
            Err(FetchError::Degraded { outcome, .. }) if self.settings.proceed_on_degraded => {
                warn!(
                    "Proceeding with degraded frequency data: {} of {} lookups failed",
                    outcome.failed_count,
                    outcome.total()
                );
                (outcome, true)
            }
            Err(FetchError::Degraded { outcome, .. }) => {
                return Err(PipelineError::FetchDegraded {
                    category_id: category_id.clone(),
                    failed_count: outcome.failed_count,
                    total: outcome.total(),
                });
            }
        };

        tracker.advance(ParseStage::Aggregating);
        let report = self.aggregator.aggregate(
            &listings,
            &outcome.results,
            ReportContext {
                category_id: category_id.clone(),
                category_name: node.name.clone(),
                requested_by: request.requested_by.clone(),
                catalog_complete,
                degraded,
            },
            Utc::now(),
        );

        tracker.advance(ParseStage::Exporting);
        if cancel.is_cancelled() {
            return Err(cancelled(ParseStage::Exporting));
        }

        let exporter = Arc::clone(&self.exporter);
        let metadata = report.metadata.clone();
        let path = tokio::task::spawn_blocking(move || exporter.export(&report))
            .await
            .map_err(|join_error| ExportError::Io(std::io::Error::other(join_error.to_string())))
            .and_then(|exported| exported)
            .map_err(|source| PipelineError::SerializationFailed {
                category_id: category_id.clone(),
                source,
            })?;

        tracker.advance(ParseStage::Done);
        Ok(ParseOutcome { path, metadata })
    }

    /// Main-menu lookup; a category without a listing node is unsupported
    async fn locate(
        &self,
        category: &Category,
        cancel: &CancellationToken,
    ) -> Result<CatalogNode, PipelineError> {
        let catalog = &self.catalog;
        let located = self
            .settings
            .catalog_retry
            .run("main menu lookup", cancel, retry_decision, move |_| {
                catalog.locate(category, cancel)
            })
            .await;

        match located {
            Ok(Some(node)) => Ok(node),
            Ok(None) => Err(PipelineError::UnsupportedCategory {
                category_id: category.id().to_string(),
                reason: "category is not a product listing in the Wildberries catalog".to_string(),
            }),
            Err(RetryError::Cancelled)
            | Err(RetryError::Permanent {
                error: SourceError::Cancelled,
                ..
            }) => Err(PipelineError::Cancelled {
                category_id: Some(category.id().to_string()),
                stage: ParseStage::Resolved,
            }),
            Err(RetryError::Exhausted { last: reason, .. })
            | Err(RetryError::Permanent { error: reason, .. }) => {
                Err(PipelineError::CatalogUnavailable {
                    category_id: category.id().to_string(),
                    page: 0,
                    collected: 0,
                    reason,
                })
            }
        }
    }
}
