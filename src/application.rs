//! Application layer - the parse pipeline and its stages
//!
//! Leaf-first: resolver, paginator, frequency client, fetch coordinator,
//! aggregator, and the pipeline that strings them together.

pub mod aggregator;
pub mod catalog_paginator;
pub mod category_resolver;
pub mod errors;
pub mod fetch_coordinator;
pub mod frequency_client;
pub mod pipeline;

// Re-export commonly used items
pub use aggregator::{Aggregator, ReportContext};
pub use catalog_paginator::{CatalogPaginator, PageFailure};
pub use category_resolver::CategoryResolver;
pub use errors::{FetchError, FetchOutcome, PaginationError, PipelineError, ResolveError};
pub use fetch_coordinator::FetchCoordinator;
pub use frequency_client::{FrequencyClient, LookupCancelled};
pub use pipeline::{ParseOutcome, ParsePipeline, ParseRequest, PipelineServices, PipelineSettings};
