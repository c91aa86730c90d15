//! Configuration infrastructure
//!
//! Configuration is layered, lowest priority first:
//! 1. Built-in defaults (see [`defaults`])
//! 2. Optional config file (JSON or TOML, picked by extension)
//! 3. Environment variables prefixed `WBCA`, sections separated by `__`
//!    (e.g. `WBCA__FREQUENCY__MAX_CONCURRENT=8`)

#![allow(clippy::derivable_impls)]

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

use crate::domain::FailedFetchPolicy;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub catalog: CatalogConfig,
    pub frequency: FrequencyConfig,
    pub pipeline: PipelineConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

/// Shared HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,

    /// Per-request timeout (short ceiling)
    pub request_timeout_seconds: u64,

    pub connect_timeout_seconds: u64,
}

/// Retry/backoff settings for one call site
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Upper bound of the random jitter added to each delay
    pub jitter_ms: u64,
}

/// Wildberries catalog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Main-menu JSON listing every category node
    pub menu_url: String,

    /// Listing API base; `{shard}` is substituted per category
    pub listing_url_template: String,

    /// Delivery region id used by the listing API
    pub dest: i64,

    /// Listing sort order
    pub sort: String,

    /// Page cap for a single run
    pub max_pages: u32,

    pub retry: RetryConfig,
}

/// Evirma frequency provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    pub api_url: String,

    /// Simultaneous lookups
    pub max_concurrent: usize,

    /// Global minimum spacing between two provider requests
    pub min_request_interval_ms: u64,

    /// Cooldown applied after a rate-limit response without `Retry-After`
    pub rate_limit_cooldown_ms: u64,

    /// Batch fails as degraded when `failed / total` exceeds this
    pub failure_threshold: f64,

    pub retry: RetryConfig,
}

/// Per-request pipeline behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ceiling for a whole parse run
    pub run_timeout_seconds: u64,

    pub failed_fetch_policy: FailedFetchPolicy,

    /// Continue with already collected products when pagination fails midway
    pub proceed_on_partial_catalog: bool,

    /// Continue to a report when the fetch batch is degraded
    pub proceed_on_degraded: bool,
}

/// Report output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub format: ReportFormat,
}

/// File format of the exported report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Excel workbook
    #[default]
    Xlsx,
    Csv,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs (file output only)
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Directory for the log file; defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    pub file_name: String,

    /// Module-specific level filters (e.g., "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            catalog: CatalogConfig::default(),
            frequency: FrequencyConfig::default(),
            pipeline: PipelineConfig::default(),
            export: ExportConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::USER_AGENT.to_string(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            connect_timeout_seconds: defaults::CONNECT_TIMEOUT_SECONDS,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            backoff_multiplier: defaults::RETRY_BACKOFF_MULTIPLIER,
            jitter_ms: defaults::RETRY_JITTER_MS,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            menu_url: defaults::WB_MENU_URL.to_string(),
            listing_url_template: defaults::WB_LISTING_URL_TEMPLATE.to_string(),
            dest: defaults::WB_DEST,
            sort: defaults::WB_SORT.to_string(),
            max_pages: defaults::MAX_PAGES,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::EVIRMA_API_URL.to_string(),
            max_concurrent: defaults::FREQUENCY_MAX_CONCURRENT,
            min_request_interval_ms: defaults::MIN_REQUEST_INTERVAL_MS,
            rate_limit_cooldown_ms: defaults::RATE_LIMIT_COOLDOWN_MS,
            failure_threshold: defaults::FAILURE_THRESHOLD,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_timeout_seconds: defaults::RUN_TIMEOUT_SECONDS,
            failed_fetch_policy: FailedFetchPolicy::default(),
            proceed_on_partial_catalog: defaults::PROCEED_ON_PARTIAL_CATALOG,
            proceed_on_degraded: defaults::PROCEED_ON_DEGRADED,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(defaults::OUTPUT_DIR),
            format: ReportFormat::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("h2".to_string(), "warn".to_string());
                filters.insert("tokio".to_string(), "info".to_string());
                filters
            },
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl AppConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.catalog.max_pages == 0 {
            bail!("catalog.max_pages must be greater than 0");
        }
        if self.frequency.max_concurrent == 0 {
            bail!("frequency.max_concurrent must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.frequency.failure_threshold) {
            bail!(
                "frequency.failure_threshold must be within [0, 1], got {}",
                self.frequency.failure_threshold
            );
        }
        for (name, retry) in [
            ("catalog.retry", &self.catalog.retry),
            ("frequency.retry", &self.frequency.retry),
        ] {
            if retry.max_attempts == 0 {
                bail!("{name}.max_attempts must be greater than 0");
            }
            if retry.backoff_multiplier < 1.0 {
                bail!("{name}.backoff_multiplier must be at least 1.0");
            }
        }
        if self.http.request_timeout_seconds == 0 {
            bail!("http.request_timeout_seconds must be greater than 0");
        }
        if self.pipeline.run_timeout_seconds == 0 {
            bail!("pipeline.run_timeout_seconds must be greater than 0");
        }
        Ok(())
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("wb-category-analyzer");

        Ok(config_dir)
    }

    /// Configuration manager pointing at the per-user default file
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("config.json");
        Ok(Self { config_path })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load defaults, then the file (if present), then `WBCA__*` environment overrides
    pub fn load(&self) -> Result<AppConfig> {
        let settings = config::Config::builder()
            .add_source(config::File::from(self.config_path.as_path()).required(false))
            .add_source(
                config::Environment::with_prefix("WBCA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {:?}", self.config_path))?;

        let app_config: AppConfig = settings
            .try_deserialize()
            .context("Configuration has invalid values")?;
        app_config.validate()?;

        info!("Loaded configuration (file: {:?})", self.config_path);
        Ok(app_config)
    }

    /// Write a starter file with the default values
    pub async fn save_default(&self) -> Result<AppConfig> {
        let default_config = AppConfig::default();
        self.save_config(&default_config).await?;
        Ok(default_config)
    }

    pub async fn save_config(&self, app_config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(app_config)
            .context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Default configuration values
pub mod defaults {
    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    pub const CONNECT_TIMEOUT_SECONDS: u64 = 10;

    pub const RETRY_MAX_ATTEMPTS: u32 = 3;

    pub const RETRY_BASE_DELAY_MS: u64 = 1000;

    pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

    pub const RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;

    pub const RETRY_JITTER_MS: u64 = 500;

    pub const WB_MENU_URL: &str =
        "https://static-basket-01.wbbasket.ru/vol0/data/main-menu-ru-ru-v3.json";

    pub const WB_LISTING_URL_TEMPLATE: &str = "https://catalog.wb.ru/catalog/{shard}/catalog";

    /// Moscow delivery region
    pub const WB_DEST: i64 = -1_257_786;

    pub const WB_SORT: &str = "popular";

    /// Default page cap per run
    pub const MAX_PAGES: u32 = 10;

    pub const EVIRMA_API_URL: &str = "https://evirma.ru/api/v1/keyword/list";

    pub const FREQUENCY_MAX_CONCURRENT: usize = 4;

    pub const MIN_REQUEST_INTERVAL_MS: u64 = 250;

    pub const RATE_LIMIT_COOLDOWN_MS: u64 = 10_000;

    /// More than half failed means the report is unreliable
    pub const FAILURE_THRESHOLD: f64 = 0.5;

    pub const RUN_TIMEOUT_SECONDS: u64 = 900;

    pub const PROCEED_ON_PARTIAL_CATALOG: bool = true;

    pub const PROCEED_ON_DEGRADED: bool = false;

    pub const OUTPUT_DIR: &str = "output";

    pub const LOG_LEVEL: &str = "info";

    pub const LOG_JSON_FORMAT: bool = false;

    pub const LOG_CONSOLE_OUTPUT: bool = true;

    pub const LOG_FILE_OUTPUT: bool = true;

    pub const LOG_FILE_NAME: &str = "wb_parser.log";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.catalog.max_pages, 10);
        assert!((config.frequency.failure_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.pipeline.failed_fetch_policy, FailedFetchPolicy::Exclude);
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let mut config = AppConfig::default();
        config.frequency.failure_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_concurrency_and_zero_attempts() {
        let mut config = AppConfig::default();
        config.frequency.max_concurrent = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.catalog.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("absent.json"));
        let config = manager.load().unwrap();
        assert_eq!(config.frequency.max_concurrent, defaults::FREQUENCY_MAX_CONCURRENT);
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "catalog": { "max_pages": 3 }, "pipeline": { "failed_fetch_policy": "zero_fill" } }"#,
        )
        .unwrap();

        let config = ConfigManager::with_path(&path).load().unwrap();
        assert_eq!(config.catalog.max_pages, 3);
        assert_eq!(config.catalog.menu_url, defaults::WB_MENU_URL);
        assert_eq!(config.pipeline.failed_fetch_policy, FailedFetchPolicy::ZeroFill);
        assert_eq!(config.export.format, ReportFormat::Xlsx);
    }

    #[test]
    fn report_format_is_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "export": { "format": "csv" } }"#).unwrap();

        let config = ConfigManager::with_path(&path).load().unwrap();
        assert_eq!(config.export.format, ReportFormat::Csv);
        assert_eq!(config.export.output_dir, PathBuf::from(defaults::OUTPUT_DIR));
    }

    #[test]
    fn invalid_file_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "catalog": { "max_pages": 0 } }"#).unwrap();

        assert!(ConfigManager::with_path(&path).load().is_err());
    }

    #[tokio::test]
    async fn saved_default_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested").join("config.json"));
        manager.save_default().await.unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded.catalog.max_pages, defaults::MAX_PAGES);
        assert_eq!(loaded.export.output_dir, PathBuf::from(defaults::OUTPUT_DIR));
    }
}
