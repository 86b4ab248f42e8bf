//! SQLite-backed [`CategoryStore`].
//!
//! Leaf resolution is pushed down into a recursive query; matched records are
//! filtered on a non-null match id by the query as well. All blocking calls run
//! on the tokio blocking pool against one connection per store.

use crate::data::{
    CategoryLeaf, CategoryLeaves, CategoryNode, DatasetRow, Features, MatchedRecord,
    PATH_SEPARATOR, SplitLabel,
};
use crate::error::StoreError;
use crate::store::CategoryStore;
use async_trait::async_trait;
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS category (
    id        INTEGER PRIMARY KEY,
    parent_id INTEGER REFERENCES category(id),
    name      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_category_parent ON category(parent_id);

CREATE TABLE IF NOT EXISTS match_category (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    l1       TEXT,
    l2       TEXT,
    l3       TEXT,
    l4       TEXT,
    l5       TEXT,
    l6       TEXT,
    l7       TEXT,
    l8       TEXT,
    match_id INTEGER REFERENCES category(id)
);

CREATE TABLE IF NOT EXISTS category_dataset (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    l1_in         TEXT NOT NULL,
    l2_in         TEXT NOT NULL,
    l3_in         TEXT NOT NULL,
    l4_in         TEXT NOT NULL,
    l5_in         TEXT NOT NULL,
    l6_in         TEXT NOT NULL,
    l7_in         TEXT NOT NULL,
    l8_in         TEXT NOT NULL,
    full_path_out TEXT NOT NULL,
    name_out      TEXT NOT NULL,
    version       TEXT NOT NULL,
    label         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_category_dataset_version ON category_dataset(version);
";

const LEAF_QUERY: &str = "
WITH RECURSIVE category_path(id, name, path) AS (
    SELECT id, name, name FROM category WHERE parent_id IS NULL
    UNION ALL
    SELECT c.id, c.name, cp.path || ?1 || c.name
    FROM category c
    JOIN category_path cp ON c.parent_id = cp.id
)
SELECT cp.id, cp.name, cp.path
FROM category_path cp
WHERE NOT EXISTS (SELECT 1 FROM category child WHERE child.parent_id = cp.id)
ORDER BY cp.id
";

const MATCHED_QUERY: &str = "
SELECT l1, l2, l3, l4, l5, l6, l7, l8, match_id
FROM match_category
WHERE match_id IS NOT NULL
ORDER BY id
";

const INSERT_ROW: &str = "
INSERT INTO category_dataset (
    l1_in, l2_in, l3_in, l4_in, l5_in, l6_in, l7_in, l8_in,
    full_path_out, name_out, version, label
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
";

/// Category store over a SQLite database.
pub struct SqliteCategoryStore {
    conn: Arc<Mutex<Connection>>,
    location: String,
}

impl SqliteCategoryStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::from_connection(conn, path.display().to_string())
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn from_connection(conn: Connection, location: String) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(location = %location, "Opened category store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Add category nodes to the hierarchy.
    pub async fn insert_categories(&self, nodes: &[CategoryNode]) -> Result<(), StoreError> {
        let nodes = nodes.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare("INSERT INTO category (id, parent_id, name) VALUES (?1, ?2, ?3)")?;
                for node in &nodes {
                    stmt.execute(params![node.id, node.parent_id, node.name])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Add raw records, matched or not.
    pub async fn insert_records(&self, records: &[MatchedRecord]) -> Result<(), StoreError> {
        let records = records.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO match_category (l1, l2, l3, l4, l5, l6, l7, l8, match_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )?;
                for record in &records {
                    let [l1, l2, l3, l4, l5, l6, l7, l8] = &record.features;
                    stmt.execute(params![
                        l1,
                        l2,
                        l3,
                        l4,
                        l5,
                        l6,
                        l7,
                        l8,
                        record.matched_category_id
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Read back the stored rows of one dataset version, in insertion order.
    pub async fn dataset_rows(&self, version: &str) -> Result<Vec<DatasetRow>, StoreError> {
        let version = version.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT l1_in, l2_in, l3_in, l4_in, l5_in, l6_in, l7_in, l8_in,
                        full_path_out, name_out, version, label
                 FROM category_dataset WHERE version = ?1 ORDER BY id",
            )?;
            let raw = stmt
                .query_map(params![version], |row| {
                    Ok((
                        features_from_row(row)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, String>(9)?,
                        row.get::<_, String>(10)?,
                        row.get::<_, String>(11)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut rows = Vec::with_capacity(raw.len());
            for (features, full_path_out, name_out, version, label) in raw {
                let label = label.parse::<SplitLabel>().map_err(StoreError::Backend)?;
                rows.push(DatasetRow {
                    features,
                    full_path_out,
                    name_out,
                    version,
                    label,
                });
            }
            Ok(rows)
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::backend(format!("connection lock poisoned: {e}")))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

fn features_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Features> {
    let mut features = Features::default();
    for (i, slot) in features.iter_mut().enumerate() {
        *slot = row.get::<_, Option<String>>(i)?.unwrap_or_default();
    }
    Ok(features)
}

#[async_trait]
impl CategoryStore for SqliteCategoryStore {
    async fn fetch_leaf_categories(&self) -> Result<CategoryLeaves, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(LEAF_QUERY)?;
            let leaves = stmt
                .query_map(params![PATH_SEPARATOR], |row| {
                    Ok(CategoryLeaf {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        path: row.get(2)?,
                    })
                })?
                .collect::<Result<CategoryLeaves, _>>()?;
            Ok(leaves)
        })
        .await
    }

    async fn fetch_matched_records(&self) -> Result<Vec<MatchedRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(MATCHED_QUERY)?;
            let records = stmt
                .query_map([], |row| {
                    Ok(MatchedRecord {
                        features: features_from_row(row)?,
                        matched_category_id: row.get(8)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }

    async fn delete_dataset_version(&self, version: &str) -> Result<usize, StoreError> {
        let version = version.to_string();
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM category_dataset WHERE version = ?1",
                params![version],
            )?;
            tracing::debug!(version = %version, deleted, "Deleted dataset rows");
            Ok(deleted)
        })
        .await
    }

    async fn insert_dataset_rows(&self, rows: &[DatasetRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let rows = rows.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(INSERT_ROW)?;
                for row in &rows {
                    let [l1, l2, l3, l4, l5, l6, l7, l8] = &row.features;
                    stmt.execute(params![
                        l1,
                        l2,
                        l3,
                        l4,
                        l5,
                        l6,
                        l7,
                        l8,
                        row.full_path_out,
                        row.name_out,
                        row.version,
                        row.label.as_str()
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
