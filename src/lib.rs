//! Wildberries category frequency analyzer
//!
//! Collects the products of a Wildberries catalog category, looks up the
//! search frequency of each product's name via Evirma, and exports a ranked
//! frequency table.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{ParseOutcome, ParsePipeline, ParseRequest, PipelineError};
pub use domain::{ParseStage, ProgressEvent, ProgressSink};
pub use infrastructure::{AppConfig, ConfigManager};
