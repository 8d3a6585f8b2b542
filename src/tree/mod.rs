//! Nested request value trees.
//!
//! Flat field names such as `options[0][name]` are split into index paths
//! (see [`key`]) and mounted into a [`Tree`], producing the same nesting PHP
//! builds for `$_POST` and `$_FILES`. The same algorithm serves plain string
//! values and upload references; the leaf type decides how empty values and
//! repeated submissions are treated through the [`Leaf`] trait.

pub mod key;
mod mount;

pub use key::{Path, fetch_indexes};

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Maximum tree depth for incoming request data and files.
/// Fields nested deeper than this are ignored.
pub const MAX_LEVEL: usize = 127;

/// Tree of plain form values.
pub type DataTree = Tree<String>;

/// Which value of a repeated submission is kept for a flat key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// The most recently submitted value replaces earlier ones.
    LastWins,
    /// The first stored value is kept, later ones are dropped.
    FirstWins,
}

impl DuplicatePolicy {
    /// Select the value stored for a flat key out of a submitted group.
    pub fn pick<T>(self, values: &[T]) -> Option<&T> {
        match self {
            Self::LastWins => values.last(),
            Self::FirstWins => values.first(),
        }
    }
}

/// Value type that can sit at the leaves of a [`Tree`].
pub trait Leaf: Clone + fmt::Debug {
    /// Policy applied when a flat key receives several values.
    const DUPLICATES: DuplicatePolicy;

    /// Whether the value is an empty placeholder (an empty string, a file
    /// input submitted without a file). Blank leaves may later be replaced by
    /// structured data under the same key.
    fn is_blank(&self) -> bool;
}

impl Leaf for String {
    const DUPLICATES: DuplicatePolicy = DuplicatePolicy::LastWins;

    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

/// One entry of a [`Tree`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node<T> {
    /// Nested values (`a[b]=...`).
    Branch(Tree<T>),
    /// Single value (`a=...`).
    Scalar(T),
    /// Value group of an unindexed array (`a[]=...`), or of a flat key
    /// submitted without any value.
    Array(Vec<T>),
}

impl<T: Leaf> Node<T> {
    /// Empty scalars and empty groups can be promoted to branches.
    pub fn is_blank(&self) -> bool {
        match self {
            Node::Branch(_) => false,
            Node::Scalar(value) => value.is_blank(),
            Node::Array(values) => values.is_empty(),
        }
    }
}

impl<T> Node<T> {
    pub fn as_branch(&self) -> Option<&Tree<T>> {
        match self {
            Node::Branch(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&T> {
        match self {
            Node::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[T]> {
        match self {
            Node::Array(values) => Some(values),
            _ => None,
        }
    }
}

impl<T: Serialize> Serialize for Node<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Branch(tree) => tree.serialize(serializer),
            Node::Scalar(value) => value.serialize(serializer),
            Node::Array(values) => values.serialize(serializer),
        }
    }
}

/// Insertion-ordered mapping from index segment to [`Node`].
#[derive(Clone, PartialEq)]
pub struct Tree<T> {
    map: IndexMap<String, Node<T>>,
}

impl<T> Tree<T> {
    pub fn new() -> Self {
        Self {
            map: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Direct child under `key`.
    pub fn get(&self, key: &str) -> Option<&Node<T>> {
        self.map.get(key)
    }

    /// Walk `path` from this tree, one segment per level.
    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Option<&Node<T>> {
        let (head, rest) = path.split_first()?;
        let node = self.map.get(head.as_ref())?;
        if rest.is_empty() {
            return Some(node);
        }
        node.as_branch()?.find(rest)
    }

    /// Resolve a bracketed field name (`a[0][b]`) against this tree.
    pub fn lookup(&self, name: &str) -> Option<&Node<T>> {
        self.find(&fetch_indexes(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node<T>)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Tree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.map.iter()).finish()
    }
}

impl<T: Serialize> Serialize for Tree<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.map.iter())
    }
}

/// A key is needed both as a container and as a plain value.
///
/// Raised when structured fields (`a[b]`) and a concrete value (`a`) are
/// submitted for the same key and neither side is an empty placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("conflicting value for key `{key}`")]
pub struct KeyConflict {
    /// Segment at which the conflict was detected.
    pub key: String,
    /// Incoming values, rendered for diagnostics.
    pub values: String,
    /// Tree level holding `key`, rendered for diagnostics.
    pub tree: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(fields: &[(&str, &[&str])]) -> DataTree {
        let mut tree = DataTree::new();
        for (name, values) in fields {
            let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            tree.push(name, &values).unwrap();
        }
        tree
    }

    #[test]
    fn test_find_walks_branches() {
        let tree = tree_of(&[("a[b][c]", &["1"])]);
        assert_eq!(
            tree.find(&["a", "b", "c"]).and_then(Node::as_scalar),
            Some(&"1".to_string())
        );
        assert!(tree.find(&["a", "b"]).and_then(Node::as_branch).is_some());
        assert!(tree.find(&["a", "x"]).is_none());
        assert!(tree.find::<&str>(&[]).is_none());
    }

    #[test]
    fn test_find_stops_at_leaf() {
        let tree = tree_of(&[("a", &["1"])]);
        assert!(tree.find(&["a", "b"]).is_none());
    }

    #[test]
    fn test_blank_nodes() {
        assert!(Node::Scalar(String::new()).is_blank());
        assert!(Node::<String>::Array(Vec::new()).is_blank());
        assert!(!Node::Array(vec![String::new()]).is_blank());
        assert!(!Node::Scalar("x".to_string()).is_blank());
        assert!(!Node::<String>::Branch(Tree::new()).is_blank());
    }

    #[test]
    fn test_serialize_shapes() {
        let tree = tree_of(&[
            ("name", &["john"]),
            ("tags[]", &["a", "b"]),
            ("options[0][id]", &["7"]),
        ]);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "john",
                "tags": ["a", "b"],
                "options": {"0": {"id": "7"}},
            })
        );
    }

    #[test]
    fn test_serialize_keeps_insertion_order() {
        let tree = tree_of(&[("b", &["1"]), ("a", &["2"]), ("c", &["3"])]);
        assert_eq!(serde_json::to_string(&tree).unwrap(), r#"{"b":"1","a":"2","c":"3"}"#);
    }

    #[test]
    fn test_duplicate_policy_pick() {
        let values = [1, 2, 3];
        assert_eq!(DuplicatePolicy::LastWins.pick(&values), Some(&3));
        assert_eq!(DuplicatePolicy::FirstWins.pick(&values), Some(&1));
        assert_eq!(DuplicatePolicy::FirstWins.pick::<i32>(&[]), None);
    }

    #[test]
    fn test_conflict_message_names_key() {
        let err = KeyConflict {
            key: "options".to_string(),
            values: "[\"x\"]".to_string(),
            tree: "{}".to_string(),
        };
        assert_eq!(err.to_string(), "conflicting value for key `options`");
    }
}
