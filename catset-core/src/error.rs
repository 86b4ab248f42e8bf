//! Error types for the catset-core crate.

use thiserror::Error;

/// Errors raised by a [`CategoryStore`](crate::store::CategoryStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage task join error: {0}")]
    Join(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Top-level error for a dataset generation run.
///
/// Every variant aborts the run. Storage failures keep the underlying
/// [`StoreError`] as their source.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Invalid split configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to fetch leaf categories: {0}")]
    FetchLeaves(#[source] StoreError),

    #[error("Failed to fetch matched records: {0}")]
    FetchMatches(#[source] StoreError),

    #[error("Failed to clean up dataset version '{version}': {source}")]
    Cleanup {
        version: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to insert dataset version '{version}': {source}")]
    Insert {
        version: String,
        #[source]
        source: StoreError,
    },

    #[error("No leaf category for record {index} (match id {category_id:?})")]
    CategoryLookup {
        index: usize,
        category_id: Option<i64>,
    },

    #[error("Failed to decode split config: {0}")]
    ConfigDecode(#[from] serde_json::Error),
}

impl TransformError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

pub type Result<T, E = TransformError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_is_kept_as_source() {
        let err = TransformError::Cleanup {
            version: "v1".into(),
            source: StoreError::backend("connection reset"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to clean up dataset version 'v1': Storage backend error: connection reset"
        );
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Storage backend error: connection reset");
    }

    #[test]
    fn test_category_lookup_message() {
        let err = TransformError::CategoryLookup {
            index: 3,
            category_id: Some(42),
        };
        assert_eq!(
            err.to_string(),
            "No leaf category for record 3 (match id Some(42))"
        );
    }
}
