use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length in bytes of a [`Node`].
pub const NODE_LEN: usize = 32;

/// Content/history hash identifying one revision of a blob.
///
/// Nodes are opaque to the store: they are compared byte-wise and never
/// recomputed on read. The all-zero node is reserved as the "no base"
/// sentinel that terminates a delta chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node([u8; NODE_LEN]);

impl Node {
    /// Derive a node from content bytes using BLAKE3.
    ///
    /// Stores never call this on the read path; it exists for building
    /// fixtures and for callers that want content-derived nodes.
    pub fn for_content(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create a `Node` from a pre-computed hash.
    pub const fn from_hash(hash: [u8; NODE_LEN]) -> Self {
        Self(hash)
    }

    /// Create a `Node` from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; NODE_LEN] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: NODE_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The null node (all zeros). Marks a full snapshot's missing base.
    pub const fn null() -> Self {
        Self([0u8; NODE_LEN])
    }

    /// Returns `true` if this is the null node.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; NODE_LEN]
    }

    /// The raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; NODE_LEN] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 12 characters), used in logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..6])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.short_hex())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; NODE_LEN]> for Node {
    fn from(bytes: [u8; NODE_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Node> for [u8; NODE_LEN] {
    fn from(node: Node) -> Self {
        node.0
    }
}
