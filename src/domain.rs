//! Domain module - Core business types
//!
//! This module contains the entities, value objects and service seams
//! that describe a category analysis run independently of transport.

pub mod category;
pub mod errors;
pub mod events;
pub mod frequency;
pub mod product;
pub mod report;
pub mod services;

// Re-export commonly used items
pub use category::{Category, CatalogNode};
pub use errors::{ExportError, SourceError};
pub use events::{ParseStage, ProgressEvent, ProgressSink};
pub use frequency::{FetchStatus, FrequencyResult, ProviderResponse};
pub use product::{CatalogItem, PagePosition, ProductId, ProductListing};
pub use report::{AggregatedRow, FailedFetchPolicy, Report, ReportMetadata};
pub use services::{CatalogSource, FrequencyProvider, ReportExporter};
