//! Dataset generation pipeline.
//!
//! One run walks a fixed sequence of stages:
//!
//! ```text
//! ValidateConfig → FetchLeaves → FetchMatches → Shuffle (optional)
//!   → SplitAndBuild → Cleanup → Insert → Done
//! ```
//!
//! The first failing stage aborts the run. Nothing is rolled back: if the insert
//! fails after the cleanup succeeded, the version is left empty.

use crate::config::SplitConfig;
use crate::data::{SplitCounts, build_dataset, shuffle_seeded};
use crate::error::{Result, TransformError};
use crate::store::CategoryStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, Span};
use uuid::Uuid;

/// Stages of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    ValidateConfig,
    FetchLeaves,
    FetchMatches,
    Shuffle,
    SplitAndBuild,
    Cleanup,
    Insert,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidateConfig => "validate_config",
            Self::FetchLeaves => "fetch_leaves",
            Self::FetchMatches => "fetch_matches",
            Self::Shuffle => "shuffle",
            Self::SplitAndBuild => "split_and_build",
            Self::Cleanup => "cleanup",
            Self::Insert => "insert",
            Self::Done => "done",
        }
    }

    /// Stage at which `err` aborts a run.
    pub fn of_error(err: &TransformError) -> Self {
        match err {
            TransformError::InvalidConfig(_) | TransformError::ConfigDecode(_) => {
                Self::ValidateConfig
            }
            TransformError::FetchLeaves(_) => Self::FetchLeaves,
            TransformError::FetchMatches(_) => Self::FetchMatches,
            TransformError::CategoryLookup { .. } => Self::SplitAndBuild,
            TransformError::Cleanup { .. } => Self::Cleanup,
            TransformError::Insert { .. } => Self::Insert,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub run_id: Uuid,
    pub version: String,
    pub leaf_categories: usize,
    pub records: usize,
    pub counts: SplitCounts,
    /// Rows of the previous generation of this version that were removed.
    pub replaced: usize,
    /// Seed used for the shuffle, `None` when shuffling was off.
    pub seed: Option<u64>,
    pub generated_at: DateTime<Utc>,
}

/// Generates one dataset version from a [`CategoryStore`].
pub struct DatasetPipeline {
    store: Arc<dyn CategoryStore>,
    config: SplitConfig,
    run_id: Uuid,
    span: Span,
}

impl DatasetPipeline {
    /// Create a pipeline with its own `transform` span.
    pub fn new(store: Arc<dyn CategoryStore>, config: SplitConfig) -> Self {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "transform",
            run_id = %run_id,
            version = %config.version
        );
        Self {
            store,
            config,
            run_id,
            span,
        }
    }

    /// Log the run under `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Run every stage in order and persist the new dataset version.
    pub async fn generate_dataset(&self) -> Result<DatasetSummary> {
        let result = self.run().instrument(self.span.clone()).await;
        if let Err(e) = &result {
            let _enter = self.span.enter();
            tracing::error!(
                stage = %PipelineStage::of_error(e),
                error = %e,
                "Dataset generation failed"
            );
        }
        result
    }

    async fn run(&self) -> Result<DatasetSummary> {
        let version = self.config.version.as_str();
        self.config.validate()?;

        let leaves = self
            .store
            .fetch_leaf_categories()
            .await
            .map_err(TransformError::FetchLeaves)?;
        tracing::info!(
            stage = %PipelineStage::FetchLeaves,
            count = leaves.len(),
            "Fetched leaf categories"
        );

        let mut records = self
            .store
            .fetch_matched_records()
            .await
            .map_err(TransformError::FetchMatches)?;
        tracing::info!(
            stage = %PipelineStage::FetchMatches,
            count = records.len(),
            "Fetched matched records"
        );

        let seed = if self.config.shuffle {
            let seed = self.config.seed.unwrap_or_else(rand::random);
            shuffle_seeded(&mut records, seed);
            tracing::info!(
                stage = %PipelineStage::Shuffle,
                count = records.len(),
                seed,
                "Shuffled matched records"
            );
            Some(seed)
        } else {
            None
        };

        let (rows, counts) = build_dataset(&records, &leaves, version, &self.config.ratios())?;
        tracing::info!(
            stage = %PipelineStage::SplitAndBuild,
            count = rows.len(),
            train = counts.train,
            validate = counts.validate,
            test = counts.test,
            "Built dataset rows"
        );

        let deleted = self
            .store
            .delete_dataset_version(version)
            .await
            .map_err(|source| TransformError::Cleanup {
                version: version.to_string(),
                source,
            })?;
        tracing::info!(
            stage = %PipelineStage::Cleanup,
            count = deleted,
            "Cleaned up previous dataset version"
        );

        self.store
            .insert_dataset_rows(&rows)
            .await
            .map_err(|source| TransformError::Insert {
                version: version.to_string(),
                source,
            })?;
        tracing::info!(
            stage = %PipelineStage::Insert,
            count = rows.len(),
            "Inserted dataset rows"
        );

        let summary = DatasetSummary {
            run_id: self.run_id,
            version: version.to_string(),
            leaf_categories: leaves.len(),
            records: records.len(),
            counts,
            replaced: deleted,
            seed,
            generated_at: Utc::now(),
        };
        tracing::info!(stage = %PipelineStage::Done, "Dataset generated");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CategoryNode, MatchedRecord, SplitLabel};
    use crate::error::StoreError;
    use crate::store::{MemoryCategoryStore, StoreOp, StoreOpKind};

    fn config(shuffle: bool) -> SplitConfig {
        SplitConfig {
            version: "v1".into(),
            shuffle,
            train_ratio: 60,
            validate_ratio: 20,
            test_ratio: 20,
            seed: None,
        }
    }

    fn store() -> Arc<MemoryCategoryStore> {
        Arc::new(MemoryCategoryStore::with_data(
            vec![
                CategoryNode::root(10, "Root"),
                CategoryNode::child(1, 10, "A"),
                CategoryNode::child(2, 10, "B"),
            ],
            vec![
                MatchedRecord::from_levels(std::iter::repeat_n("x", 8), Some(1)),
                MatchedRecord::from_levels(std::iter::repeat_n("y", 8), Some(2)),
            ],
        ))
    }

    #[tokio::test]
    async fn test_two_records_without_shuffle() {
        let store = store();
        let pipeline = DatasetPipeline::new(store.clone(), config(false));
        let summary = pipeline.generate_dataset().await.unwrap();

        assert_eq!(summary.records, 2);
        assert_eq!(summary.leaf_categories, 2);
        assert_eq!(summary.seed, None);
        assert_eq!(summary.run_id, pipeline.run_id());

        let rows = store.dataset_rows("v1").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, SplitLabel::Train);
        assert_eq!(rows[0].full_path_out, "Root > A");
        assert_eq!(rows[0].features[0], "x");
        assert_eq!(rows[1].label, SplitLabel::Test);
        assert_eq!(rows[1].full_path_out, "Root > B");
        assert_eq!(rows[1].name_out, "B");
    }

    #[tokio::test]
    async fn test_stage_order() {
        let store = store();
        DatasetPipeline::new(store.clone(), config(true))
            .generate_dataset()
            .await
            .unwrap();
        assert_eq!(
            store.journal().unwrap(),
            vec![
                StoreOp::FetchLeaves,
                StoreOp::FetchMatches,
                StoreOp::Delete {
                    version: "v1".into()
                },
                StoreOp::Insert { rows: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_seeded_shuffle_is_replayable() {
        let seeded = SplitConfig {
            seed: Some(1234),
            ..config(true)
        };
        let first = store();
        let second = store();
        let summary = DatasetPipeline::new(first.clone(), seeded.clone())
            .generate_dataset()
            .await
            .unwrap();
        DatasetPipeline::new(second.clone(), seeded)
            .generate_dataset()
            .await
            .unwrap();
        assert_eq!(summary.seed, Some(1234));
        assert_eq!(
            first.dataset_rows("v1").unwrap(),
            second.dataset_rows("v1").unwrap()
        );
    }

    #[tokio::test]
    async fn test_regeneration_reports_replaced_rows() {
        let store = store();
        let first = DatasetPipeline::new(store.clone(), config(false))
            .generate_dataset()
            .await
            .unwrap();
        assert_eq!(first.replaced, 0);

        let second = DatasetPipeline::new(store.clone(), config(false))
            .generate_dataset()
            .await
            .unwrap();
        assert_eq!(second.replaced, 2);
        assert_eq!(store.dataset_rows("v1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_ratios_are_clamped() {
        let store = Arc::new(MemoryCategoryStore::with_data(
            vec![CategoryNode::root(1, "Root")],
            (0..10)
                .map(|i| MatchedRecord::from_levels([format!("r{i}")], Some(1)))
                .collect(),
        ));
        let oversized = SplitConfig {
            train_ratio: 80,
            validate_ratio: 30,
            test_ratio: 0,
            ..config(false)
        };
        let summary = DatasetPipeline::new(store.clone(), oversized)
            .generate_dataset()
            .await
            .unwrap();
        assert_eq!(
            (summary.counts.train, summary.counts.validate, summary.counts.test),
            (8, 2, 0)
        );
        let labels: Vec<SplitLabel> = store
            .dataset_rows("v1")
            .unwrap()
            .iter()
            .map(|row| row.label)
            .collect();
        assert_eq!(
            labels,
            [vec![SplitLabel::Train; 8], vec![SplitLabel::Validate; 2]].concat()
        );
    }

    #[tokio::test]
    async fn test_invalid_config_touches_no_storage() {
        let store = store();
        let bad = SplitConfig {
            version: String::new(),
            ..config(false)
        };
        let err = DatasetPipeline::new(store.clone(), bad)
            .generate_dataset()
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidConfig(_)));
        assert_eq!(PipelineStage::of_error(&err), PipelineStage::ValidateConfig);
        assert!(store.journal().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_category_aborts_before_cleanup() {
        let store = Arc::new(MemoryCategoryStore::with_data(
            vec![CategoryNode::root(1, "Root")],
            vec![MatchedRecord::from_levels(["x"], Some(99))],
        ));
        let err = DatasetPipeline::new(store.clone(), config(false))
            .generate_dataset()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransformError::CategoryLookup {
                index: 0,
                category_id: Some(99)
            }
        ));
        assert_eq!(
            store.journal().unwrap(),
            vec![StoreOp::FetchLeaves, StoreOp::FetchMatches]
        );
    }

    #[tokio::test]
    async fn test_fetch_leaves_failure_stops_run() {
        let store = store();
        store.fail_on(StoreOpKind::FetchLeaves).unwrap();
        let err = DatasetPipeline::new(store.clone(), config(false))
            .generate_dataset()
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::FetchLeaves(StoreError::Backend(_))));
        assert_eq!(PipelineStage::of_error(&err), PipelineStage::FetchLeaves);
        assert_eq!(store.journal().unwrap(), vec![StoreOp::FetchLeaves]);
    }

    #[tokio::test]
    async fn test_fetch_matches_failure_stops_run() {
        let store = store();
        store.fail_on(StoreOpKind::FetchMatches).unwrap();
        let err = DatasetPipeline::new(store.clone(), config(false))
            .generate_dataset()
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::FetchMatches(StoreError::Backend(_))));
        assert_eq!(PipelineStage::of_error(&err), PipelineStage::FetchMatches);
        assert_eq!(
            store.journal().unwrap(),
            vec![StoreOp::FetchLeaves, StoreOp::FetchMatches]
        );
    }

    #[tokio::test]
    async fn test_cleanup_failure_never_inserts() {
        let store = store();
        DatasetPipeline::new(store.clone(), config(false))
            .generate_dataset()
            .await
            .unwrap();
        let previous = store.dataset_rows("v1").unwrap();

        let ops_before = store.journal().unwrap().len();
        store.fail_on(StoreOpKind::Delete).unwrap();
        let err = DatasetPipeline::new(store.clone(), config(true))
            .generate_dataset()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransformError::Cleanup {
                ref version,
                source: StoreError::Backend(_),
            } if version == "v1"
        ));
        assert_eq!(PipelineStage::of_error(&err), PipelineStage::Cleanup);
        assert_eq!(
            store.journal().unwrap()[ops_before..],
            [
                StoreOp::FetchLeaves,
                StoreOp::FetchMatches,
                StoreOp::Delete {
                    version: "v1".into()
                },
            ]
        );
        assert_eq!(store.dataset_rows("v1").unwrap(), previous);
    }

    #[tokio::test]
    async fn test_insert_failure_leaves_version_empty() {
        let store = store();
        DatasetPipeline::new(store.clone(), config(false))
            .generate_dataset()
            .await
            .unwrap();
        assert_eq!(store.dataset_rows("v1").unwrap().len(), 2);

        store.fail_on(StoreOpKind::Insert).unwrap();
        let err = DatasetPipeline::new(store.clone(), config(false))
            .generate_dataset()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransformError::Insert {
                source: StoreError::Backend(_),
                ..
            }
        ));
        assert_eq!(PipelineStage::of_error(&err), PipelineStage::Insert);
        assert!(store.dataset_rows("v1").unwrap().is_empty());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(PipelineStage::SplitAndBuild.to_string(), "split_and_build");
        assert_eq!(
            serde_json::to_string(&PipelineStage::FetchLeaves).unwrap(),
            "\"fetch_leaves\""
        );
    }
}
