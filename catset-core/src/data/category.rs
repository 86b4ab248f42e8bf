//! Category hierarchy resolution.
//!
//! The store holds categories as an adjacency list (`id`, `parent_id`, `name`).
//! Training only cares about the leaves, each labelled with the full chain of
//! ancestor names from its root, e.g. `Electronics > Phones > Smartphones`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Separator placed between ancestor names in a leaf path.
pub const PATH_SEPARATOR: &str = " > ";

/// A raw category node as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    pub name: String,
}

impl CategoryNode {
    pub fn root(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            parent_id: None,
            name: name.into(),
        }
    }

    pub fn child(id: i64, parent_id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            parent_id: Some(parent_id),
            name: name.into(),
        }
    }
}

/// A category without children, with its resolved ancestor path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLeaf {
    pub id: i64,
    pub name: String,
    pub path: String,
}

/// Mapping of leaf category id to its name and path, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLeaves {
    leaves: BTreeMap<i64, CategoryLeaf>,
}

impl CategoryLeaves {
    pub fn new() -> Self {
        Self {
            leaves: BTreeMap::new(),
        }
    }

    /// Add a leaf, replacing any previous leaf with the same id.
    pub fn insert(&mut self, leaf: CategoryLeaf) {
        self.leaves.insert(leaf.id, leaf);
    }

    pub fn get(&self, id: i64) -> Option<&CategoryLeaf> {
        self.leaves.get(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.leaves.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryLeaf> {
        self.leaves.values()
    }
}

impl FromIterator<CategoryLeaf> for CategoryLeaves {
    fn from_iter<I: IntoIterator<Item = CategoryLeaf>>(iter: I) -> Self {
        let mut leaves = Self::new();
        for leaf in iter {
            leaves.insert(leaf);
        }
        leaves
    }
}

/// Flatten a category tree into its leaves.
///
/// Walks every root (a node without a parent) depth-first, building each
/// node's path as `parent path + " > " + name`. Only nodes without children
/// are kept. Nodes whose parent is missing from `nodes` are never reached.
pub fn resolve_leaves(nodes: &[CategoryNode]) -> CategoryLeaves {
    let mut children: HashMap<i64, Vec<&CategoryNode>> = HashMap::new();
    let mut roots = Vec::new();
    for node in nodes {
        match node.parent_id {
            Some(parent) => children.entry(parent).or_default().push(node),
            None => roots.push(node),
        }
    }

    let mut leaves = CategoryLeaves::new();
    let mut stack: Vec<(&CategoryNode, String)> = roots
        .into_iter()
        .rev()
        .map(|root| (root, root.name.clone()))
        .collect();

    while let Some((node, path)) = stack.pop() {
        match children.get(&node.id) {
            Some(kids) => {
                for kid in kids.iter().rev() {
                    stack.push((kid, format!("{path}{PATH_SEPARATOR}{}", kid.name)));
                }
            }
            None => leaves.insert(CategoryLeaf {
                id: node.id,
                name: node.name.clone(),
                path,
            }),
        }
    }

    tracing::debug!(nodes = nodes.len(), leaves = leaves.len(), "Resolved category leaves");
    leaves
}
