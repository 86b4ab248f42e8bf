//! # catset-core: category dataset generation
//!
//! Turns a product category tree and a set of category-matched records into a
//! labelled, versioned train/validate/test dataset for a classification model.
//!
//! - [`data`]: leaf resolution, splitting and row building
//! - [`store`]: the storage port plus SQLite and in-memory implementations
//! - [`pipeline`]: fetch → split → cleanup → insert for one dataset version
//! - [`trigger`]: queued-message batches, one pipeline run per message

pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod store;
pub mod trigger;

pub use config::{CatsetConfig, SplitConfig, load_config};
pub use data::{CategoryLeaf, CategoryLeaves, CategoryNode, DatasetRow, MatchedRecord, SplitLabel};
pub use error::{Result, StoreError, TransformError};
pub use pipeline::{DatasetPipeline, DatasetSummary, PipelineStage};
pub use store::{CategoryStore, MemoryCategoryStore, SqliteCategoryStore};
pub use trigger::{QueueEvent, QueueHandler, QueueMessage};
