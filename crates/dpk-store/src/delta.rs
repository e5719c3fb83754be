use dpk_types::Key;

/// Per-entry metadata carried alongside a delta.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeltaMetadata {
    /// Length of the full text this entry reconstructs to, when recorded.
    pub size: Option<u64>,
    /// Opaque revision flags, passed through untouched.
    pub flags: u64,
}

impl DeltaMetadata {
    /// Metadata recording only the full-text size.
    pub fn with_size(size: u64) -> Self {
        Self {
            size: Some(size),
            flags: 0,
        }
    }
}

/// One link of a delta chain.
///
/// `data` is either a full snapshot of the revision (when `base` is `None`)
/// or an encoded delta against the full text of `base`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delta {
    /// The key this entry describes.
    pub key: Key,
    /// The key whose full text `data` is a delta against.
    pub base: Option<Key>,
    /// Snapshot bytes or encoded delta.
    pub data: Vec<u8>,
    /// Entry metadata.
    pub metadata: DeltaMetadata,
}

impl Delta {
    /// A full snapshot: the chain terminator.
    pub fn full(key: Key, data: Vec<u8>) -> Self {
        let metadata = DeltaMetadata::with_size(data.len() as u64);
        Self {
            key,
            base: None,
            data,
            metadata,
        }
    }

    /// A delta against `base`.
    pub fn against(key: Key, base: Key, data: Vec<u8>) -> Self {
        Self {
            key,
            base: Some(base),
            data,
            metadata: DeltaMetadata::default(),
        }
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: DeltaMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns `true` if this entry terminates its chain.
    pub fn is_full_snapshot(&self) -> bool {
        self.base.is_none()
    }
}

/// Normalize a stored base reference: a null node means "no base".
pub fn base_from_node(key: &Key, base: dpk_types::Node) -> Option<Key> {
    if base.is_null() {
        None
    } else {
        Some(key.with_node(base))
    }
}
