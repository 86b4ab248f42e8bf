//! Storage port for the dataset pipeline.
//!
//! The pipeline only talks to storage through [`CategoryStore`]. The SQLite
//! adapter backs real runs; the in-memory store backs tests and dry runs.

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryCategoryStore, StoreOp, StoreOpKind};
pub use sqlite::SqliteCategoryStore;

use crate::data::{CategoryLeaves, DatasetRow, MatchedRecord};
use crate::error::StoreError;
use async_trait::async_trait;

/// Source of category data and sink for dataset rows.
///
/// Implementations own their timeouts. Nothing here is transactional across
/// calls: deleting a version and inserting its new rows are two operations.
#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// Leaf categories keyed by id, each with its full ancestor path.
    async fn fetch_leaf_categories(&self) -> Result<CategoryLeaves, StoreError>;

    /// Records that have a match id. Unmatched records are never returned.
    async fn fetch_matched_records(&self) -> Result<Vec<MatchedRecord>, StoreError>;

    /// Remove every dataset row of `version`, returning how many were removed.
    async fn delete_dataset_version(&self, version: &str) -> Result<usize, StoreError>;

    /// Persist `rows`. An empty slice is a successful no-op.
    async fn insert_dataset_rows(&self, rows: &[DatasetRow]) -> Result<(), StoreError>;
}
