//! The Schema Descriptor.
//!
//! A recursive tree mirroring the shape of an exposed function collection.
//! On the wire a leaf is the string `"function"` or `"generator"` and a
//! branch is a JSON object of named children:
//!
//! ```json
//! {"greet": "function", "math": {"add": "function"}, "countTo": "generator"}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How a leaf is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafKind {
    /// Single request, single reply.
    Function,
    /// Streaming call driven by the start/next/result sub-protocol.
    Generator,
}

impl LeafKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LeafKind::Function => "function",
            LeafKind::Generator => "generator",
        }
    }
}

impl std::fmt::Display for LeafKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the descriptor tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaNode {
    Leaf(LeafKind),
    Branch(Schema),
}

/// A branch of the descriptor tree: child name to node.
///
/// The tree shape and the leaf tags are fixed for the lifetime of a
/// connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    entries: BTreeMap<String, SchemaNode>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, node: SchemaNode) {
        self.entries.insert(name.into(), node);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, node: SchemaNode) -> Self {
        self.insert(name, node);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SchemaNode)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Resolves a dot-joined path such as `math.add`.
    pub fn lookup(&self, path: &str) -> Option<&SchemaNode> {
        let mut segments = path.split('.');
        let mut node = self.get(segments.next()?)?;
        for segment in segments {
            match node {
                SchemaNode::Branch(schema) => node = schema.get(segment)?,
                SchemaNode::Leaf(_) => return None,
            }
        }
        Some(node)
    }

    /// Every leaf with its fully-qualified path, depth first.
    pub fn leaves(&self) -> Vec<(String, LeafKind)> {
        let mut leaves = Vec::new();
        self.collect_leaves(None, &mut leaves);
        leaves
    }

    fn collect_leaves(&self, prefix: Option<&str>, out: &mut Vec<(String, LeafKind)>) {
        for (name, node) in &self.entries {
            let path = qualify(prefix, name);
            match node {
                SchemaNode::Leaf(kind) => out.push((path, *kind)),
                SchemaNode::Branch(schema) => schema.collect_leaves(Some(&path), out),
            }
        }
    }

    /// Number of branch levels; a flat schema has depth 1, an empty one 0.
    pub fn depth(&self) -> usize {
        self.entries
            .values()
            .map(|node| match node {
                SchemaNode::Leaf(_) => 1,
                SchemaNode::Branch(schema) => 1 + schema.depth(),
            })
            .max()
            .unwrap_or(0)
    }
}

/// Joins a child name onto an optional parent path with `.`.
pub fn qualify(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}.{}", prefix, name),
        None => name.to_string(),
    }
}
