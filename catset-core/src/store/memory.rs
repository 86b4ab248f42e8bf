//! In-memory [`CategoryStore`] with an operation journal and failure injection.

use crate::data::{CategoryLeaves, CategoryNode, DatasetRow, MatchedRecord, resolve_leaves};
use crate::error::StoreError;
use crate::store::CategoryStore;
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

/// A storage call observed by [`MemoryCategoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    FetchLeaves,
    FetchMatches,
    Delete { version: String },
    Insert { rows: usize },
}

#[derive(Debug, Default)]
struct State {
    nodes: Vec<CategoryNode>,
    records: Vec<MatchedRecord>,
    dataset: Vec<DatasetRow>,
    journal: Vec<StoreOp>,
    failing: Vec<StoreOpKind>,
}

/// Which operation to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOpKind {
    FetchLeaves,
    FetchMatches,
    Delete,
    Insert,
}

/// Category store held entirely in memory.
///
/// Leaves are resolved from the stored nodes on every fetch, and records with
/// no match id are filtered out, mirroring what the SQLite adapter's queries do.
#[derive(Debug, Default)]
pub struct MemoryCategoryStore {
    state: Mutex<State>,
}

impl MemoryCategoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(nodes: Vec<CategoryNode>, records: Vec<MatchedRecord>) -> Self {
        Self {
            state: Mutex::new(State {
                nodes,
                records,
                ..State::default()
            }),
        }
    }

    /// Make every subsequent call of `kind` fail with a backend error.
    pub fn fail_on(&self, kind: StoreOpKind) -> Result<(), StoreError> {
        self.lock()?.failing.push(kind);
        Ok(())
    }

    /// Dataset rows currently stored for `version`.
    pub fn dataset_rows(&self, version: &str) -> Result<Vec<DatasetRow>, StoreError> {
        Ok(self
            .lock()?
            .dataset
            .iter()
            .filter(|row| row.version == version)
            .cloned()
            .collect())
    }

    /// Every call made so far, in order.
    pub fn journal(&self) -> Result<Vec<StoreOp>, StoreError> {
        Ok(self.lock()?.journal.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::backend(format!("memory store poisoned: {e}")))
    }

    fn record(&self, op: StoreOp, kind: StoreOpKind) -> Result<MutexGuard<'_, State>, StoreError> {
        let mut state = self.lock()?;
        state.journal.push(op);
        if state.failing.contains(&kind) {
            return Err(StoreError::backend(format!("injected {kind:?} failure")));
        }
        Ok(state)
    }
}

#[async_trait]
impl CategoryStore for MemoryCategoryStore {
    async fn fetch_leaf_categories(&self) -> Result<CategoryLeaves, StoreError> {
        let state = self.record(StoreOp::FetchLeaves, StoreOpKind::FetchLeaves)?;
        Ok(resolve_leaves(&state.nodes))
    }

    async fn fetch_matched_records(&self) -> Result<Vec<MatchedRecord>, StoreError> {
        let state = self.record(StoreOp::FetchMatches, StoreOpKind::FetchMatches)?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.matched_category_id.is_some())
            .cloned()
            .collect())
    }

    async fn delete_dataset_version(&self, version: &str) -> Result<usize, StoreError> {
        let mut state = self.record(
            StoreOp::Delete {
                version: version.to_string(),
            },
            StoreOpKind::Delete,
        )?;
        let before = state.dataset.len();
        state.dataset.retain(|row| row.version != version);
        Ok(before - state.dataset.len())
    }

    async fn insert_dataset_rows(&self, rows: &[DatasetRow]) -> Result<(), StoreError> {
        let mut state = self.record(StoreOp::Insert { rows: rows.len() }, StoreOpKind::Insert)?;
        state.dataset.extend_from_slice(rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SplitLabel;

    fn row(version: &str) -> DatasetRow {
        DatasetRow {
            features: Default::default(),
            full_path_out: "Root > A".into(),
            name_out: "A".into(),
            version: version.into(),
            label: SplitLabel::Train,
        }
    }

    #[tokio::test]
    async fn test_unmatched_records_are_filtered() {
        let store = MemoryCategoryStore::with_data(
            vec![CategoryNode::root(1, "Root")],
            vec![
                MatchedRecord::from_levels(["a"], Some(1)),
                MatchedRecord::from_levels(["b"], None),
            ],
        );
        let records = store.fetch_matched_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].features[0], "a");
    }

    #[tokio::test]
    async fn test_delete_only_touches_one_version() {
        let store = MemoryCategoryStore::new();
        store
            .insert_dataset_rows(&[row("v1"), row("v2"), row("v1")])
            .await
            .unwrap();
        assert_eq!(store.delete_dataset_version("v1").await.unwrap(), 2);
        assert!(store.dataset_rows("v1").unwrap().is_empty());
        assert_eq!(store.delete_dataset_version("v1").await.unwrap(), 0);
        assert_eq!(store.dataset_rows("v2").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_insert_is_ok() {
        let store = MemoryCategoryStore::new();
        store.insert_dataset_rows(&[]).await.unwrap();
        assert_eq!(store.journal().unwrap(), vec![StoreOp::Insert { rows: 0 }]);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryCategoryStore::new();
        store.fail_on(StoreOpKind::Delete).unwrap();
        let err = store.delete_dataset_version("v1").await.unwrap_err();
        assert!(err.to_string().contains("injected"));
        assert_eq!(
            store.journal().unwrap(),
            vec![StoreOp::Delete {
                version: "v1".into()
            }]
        );
    }
}
