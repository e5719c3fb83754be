use dpk_types::Key;

/// Errors from data store operations.
///
/// This is the taxonomy every store reports in, whatever backs it. Per-store
/// failures ([`Corrupt`](Self::Corrupt), [`Unavailable`](Self::Unavailable),
/// [`Io`](Self::Io)) are soft: a union of stores absorbs them and moves on
/// to the next member. Chain failures are hard and reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No consulted store holds the key.
    #[error("key not found: {0}")]
    NotFound(Key),

    /// The entry exists but cannot be decoded.
    #[error("corrupt entry{}: {reason}", .key.as_ref().map(|k| format!(" for {k}")).unwrap_or_default())]
    Corrupt { key: Option<Key>, reason: String },

    /// A delta names a base that no store can provide.
    #[error("broken delta chain for {key}: base {missing} not found")]
    BrokenChain { key: Key, missing: Key },

    /// The chain exceeds the configured maximum length.
    #[error("delta chain for {key} exceeds {limit} entries")]
    ChainTooLong { key: Key, limit: usize },

    /// The chain revisits a key it already passed through.
    #[error("delta chain for {key} cycles back to {repeated}")]
    DeltaCycle { key: Key, repeated: Key },

    /// The store could not be reached or opened.
    #[error("store {store} unavailable: {reason}")]
    Unavailable { store: String, reason: String },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Shorthand for a corruption error tied to a key.
    pub fn corrupt(key: &Key, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: Some(key.clone()),
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Per-store failures that a union absorbs instead of surfacing.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::Corrupt { .. } | Self::Unavailable { .. } | Self::Io(_)
        )
    }

    /// Chain inconsistencies that no refresh is expected to fix.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            Self::BrokenChain { .. } | Self::ChainTooLong { .. } | Self::DeltaCycle { .. }
        )
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use dpk_types::Node;

    #[test]
    fn classification() {
        let key = Key::new("f", Node::for_content(b"k"));
        assert!(StoreError::NotFound(key.clone()).is_not_found());
        assert!(StoreError::corrupt(&key, "bad crc").is_soft());
        assert!(StoreError::Unavailable {
            store: "host".into(),
            reason: "gone".into()
        }
        .is_soft());
        let broken = StoreError::BrokenChain {
            key: key.clone(),
            missing: key.clone(),
        };
        assert!(broken.is_hard() && !broken.is_soft());
        assert!(!StoreError::NotFound(key).is_hard());
    }

    #[test]
    fn corrupt_message_names_key() {
        let key = Key::new("f", Node::for_content(b"k"));
        let msg = StoreError::corrupt(&key, "bad crc").to_string();
        assert!(msg.contains("for f@"), "{msg}");
        let anon = StoreError::Corrupt {
            key: None,
            reason: "bad header".into(),
        };
        assert_eq!(anon.to_string(), "corrupt entry: bad header");
    }
}
