//! Train/validate/test splitting and dataset row building.
//!
//! Records are labelled by position: the first `floor(n * train / 100)` are
//! `train`, the next `floor(n * validate / 100)` are `validate`, and whatever
//! remains (integer truncation included) is `test`. Ratios need not sum to 100;
//! `train` and `validate` are clamped so together they never exceed the record
//! count. There is no stratification by category.

use crate::data::category::CategoryLeaves;
use crate::data::record::{DatasetRow, MatchedRecord, SplitLabel};
use crate::error::{Result, TransformError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Percentages of records assigned to each partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: u8,
    pub validate: u8,
    pub test: u8,
}

impl SplitRatios {
    pub fn new(train: u8, validate: u8, test: u8) -> Self {
        Self {
            train,
            validate,
            test,
        }
    }
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self::new(60, 20, 20)
    }
}

/// Number of records in each partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitCounts {
    pub train: usize,
    pub validate: usize,
    pub test: usize,
}

impl SplitCounts {
    pub fn compute(total: usize, ratios: &SplitRatios) -> Self {
        let train = portion(total, ratios.train).min(total);
        let validate = portion(total, ratios.validate).min(total - train);
        Self {
            train,
            validate,
            test: total - train - validate,
        }
    }

    pub fn total(&self) -> usize {
        self.train + self.validate + self.test
    }

    /// Label of the record at `index` in the (possibly shuffled) sequence.
    pub fn label_for(&self, index: usize) -> SplitLabel {
        if index < self.train {
            SplitLabel::Train
        } else if index < self.train + self.validate {
            SplitLabel::Validate
        } else {
            SplitLabel::Test
        }
    }
}

fn portion(total: usize, percent: u8) -> usize {
    (total as u128 * u128::from(percent) / 100) as usize
}

/// Uniformly permute `items` with a generator seeded from `seed`.
pub fn shuffle_seeded<T>(items: &mut [T], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
}

/// Join a matched record with its leaf category into a labelled row.
pub fn build_row(
    index: usize,
    record: &MatchedRecord,
    leaves: &CategoryLeaves,
    version: &str,
    label: SplitLabel,
) -> Result<DatasetRow> {
    let leaf = record
        .matched_category_id
        .and_then(|id| leaves.get(id))
        .ok_or(TransformError::CategoryLookup {
            index,
            category_id: record.matched_category_id,
        })?;

    Ok(DatasetRow {
        features: record.features.clone(),
        full_path_out: leaf.path.clone(),
        name_out: leaf.name.clone(),
        version: version.to_string(),
        label,
    })
}

/// Label every record by position and build its dataset row.
///
/// Fails on the first record whose match id is not a known leaf.
pub fn build_dataset(
    records: &[MatchedRecord],
    leaves: &CategoryLeaves,
    version: &str,
    ratios: &SplitRatios,
) -> Result<(Vec<DatasetRow>, SplitCounts)> {
    let counts = SplitCounts::compute(records.len(), ratios);
    let rows = records
        .iter()
        .enumerate()
        .map(|(i, record)| build_row(i, record, leaves, version, counts.label_for(i)))
        .collect::<Result<Vec<_>>>()?;
    Ok((rows, counts))
}
