//! Dataset model: category hierarchy, matched records, splitting and row building.

pub mod category;
pub mod record;
pub mod split;

pub use category::{CategoryLeaf, CategoryLeaves, CategoryNode, PATH_SEPARATOR, resolve_leaves};
pub use record::{DatasetRow, FEATURE_COUNT, Features, MatchedRecord, SplitLabel};
pub use split::{SplitCounts, SplitRatios, build_dataset, build_row, shuffle_seeded};
