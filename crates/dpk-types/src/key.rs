use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::Node;

/// Lookup key for a stored revision.
///
/// A key is a [`Node`] optionally qualified by the logical path of the file
/// it belongs to, for stores that are namespaced by path. Equality and
/// ordering are byte-wise: node first, then path bytes, with path-less keys
/// ordered before any qualified key sharing the same node.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    node: Node,
    path: Option<String>,
}

impl Key {
    /// A key qualified by a file path.
    pub fn new(path: impl Into<String>, node: Node) -> Self {
        Self {
            node,
            path: Some(path.into()),
        }
    }

    /// A key without a path qualifier.
    pub fn from_node(node: Node) -> Self {
        Self { node, path: None }
    }

    /// The node this key refers to.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// The path qualifier, if any.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// A key in the same namespace as `self` pointing at another node.
    ///
    /// Delta bases always live under the same path as the delta itself.
    pub fn with_node(&self, node: Node) -> Self {
        Self {
            node,
            path: self.path.clone(),
        }
    }

    /// Returns `true` if the node is the null sentinel.
    pub fn is_null(&self) -> bool {
        self.node.is_null()
    }
}

impl From<Node> for Key {
    fn from(node: Node) -> Self {
        Self::from_node(node)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{path}@{}", self.node.short_hex()),
            None => write!(f, "{}", self.node.short_hex()),
        }
    }
}
