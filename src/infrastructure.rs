//! Infrastructure layer: configuration, logging, HTTP transport and the
//! concrete Wildberries, Evirma and xlsx/CSV implementations of the domain seams.

pub mod config;
pub mod evirma_client;
pub mod http_client;
pub mod logging;
pub mod provider_throttle;
pub mod report_exporter;
pub mod retry_policy;
pub mod wildberries_client;

pub use config::{AppConfig, ConfigManager, ReportFormat};
pub use evirma_client::EvirmaClient;
pub use http_client::HttpClient;
pub use logging::{get_log_directory, init_logging_with_config};
pub use provider_throttle::{ProviderThrottle, ThrottleCancelled};
pub use report_exporter::{CsvReportExporter, XlsxReportExporter};
pub use retry_policy::{RetryDecision, RetryError, RetryPolicy};
pub use wildberries_client::WildberriesClient;
