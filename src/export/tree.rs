//! Key-path tree builder.
//!
//! Expands flat `(key, content)` pairs into the nested structure front-end
//! i18n libraries expect: `home.title = "Welcome"` becomes
//! `{"home": {"title": "Welcome"}}`.
//!
//! When one key is a strict path-prefix of another (`a.b` and `a.b.c`) the
//! two cannot coexist. The later pair wins: a branch replaces an earlier leaf
//! and a leaf replaces an earlier branch. Nothing is rejected here; empty
//! segments (`a..b`, `""`) are kept as empty-string keys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A node of the exported tree: either a translated string or a nested mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Leaf(String),
    Branch(BTreeMap<String, Node>),
}

impl Node {
    /// Borrow this node as a branch, replacing a leaf with an empty branch first.
    fn make_branch(&mut self) -> &mut BTreeMap<String, Node> {
        if let Node::Leaf(_) = self {
            *self = Node::Branch(BTreeMap::new());
        }
        match self {
            Node::Branch(children) => children,
            Node::Leaf(_) => unreachable!("leaf was replaced by a branch"),
        }
    }
}

/// Nested export of one locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tree {
    root: BTreeMap<String, Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from pairs, applied in iteration order.
    pub fn build<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut tree = Self::new();
        for (key, content) in pairs {
            tree.insert(key.as_ref(), content.into());
        }
        tree
    }

    /// Place `content` at the dotted `path`, creating branches on demand.
    pub fn insert(&mut self, path: &str, content: String) {
        let mut segments: Vec<&str> = path.split('.').collect();
        // split always yields at least one segment
        let last = segments.pop().unwrap_or_default();

        let mut current = &mut self.root;
        for segment in segments {
            current = current
                .entry(segment.to_string())
                .or_insert_with(|| Node::Branch(BTreeMap::new()))
                .make_branch();
        }
        current.insert(last.to_string(), Node::Leaf(content));
    }

    pub fn get(&self, segment: &str) -> Option<&Node> {
        self.root.get(segment)
    }

    /// Look up a node by dotted path.
    pub fn lookup(&self, path: &str) -> Option<&Node> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut node = self.root.get(first)?;
        for segment in segments {
            match node {
                Node::Branch(children) => node = children.get(segment)?,
                Node::Leaf(_) => return None,
            }
        }
        Some(node)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// Flatten back into `(path, content)` pairs, sorted by path segments.
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        flatten_into(&self.root, None, &mut pairs);
        pairs
    }
}

fn flatten_into(children: &BTreeMap<String, Node>, prefix: Option<&str>, out: &mut Vec<(String, String)>) {
    for (segment, node) in children {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, segment),
            None => segment.clone(),
        };
        match node {
            Node::Leaf(content) => out.push((path, content.clone())),
            Node::Branch(nested) => flatten_into(nested, Some(&path), out),
        }
    }
}
