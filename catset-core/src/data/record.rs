//! Matched input records and labelled dataset rows.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of raw category levels (`L1`..`L8`) carried by every record.
pub const FEATURE_COUNT: usize = 8;

/// Raw category levels of a record, `L1` first.
pub type Features = [String; FEATURE_COUNT];

/// A raw record whose target is a leaf category id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedRecord {
    pub features: Features,
    #[serde(default)]
    pub matched_category_id: Option<i64>,
}

impl MatchedRecord {
    pub fn new(features: Features, matched_category_id: i64) -> Self {
        Self {
            features,
            matched_category_id: Some(matched_category_id),
        }
    }

    /// Build a record from up to eight levels; missing levels are empty.
    pub fn from_levels<I, S>(levels: I, matched_category_id: Option<i64>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut features = Features::default();
        for (slot, level) in features.iter_mut().zip(levels) {
            *slot = level.into();
        }
        Self {
            features,
            matched_category_id,
        }
    }
}

/// Partition a dataset row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitLabel {
    Train,
    Validate,
    Test,
}

impl SplitLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Validate => "validate",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for SplitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Self::Train),
            "validate" => Ok(Self::Validate),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown split label '{other}'")),
        }
    }
}

/// One labelled output row of a dataset version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub features: Features,
    pub full_path_out: String,
    pub name_out: String,
    pub version: String,
    pub label: SplitLabel,
}
