use std::fmt::Debug;
use std::sync::Arc;

use dpk_types::Key;

use crate::delta::{Delta, DeltaMetadata};
use crate::error::StoreResult;

/// Read-only delta store.
///
/// The capability set shared by every store a union can hold, whether it is
/// backed by a pack file, memory, or an object supplied by a host runtime.
/// All implementations must satisfy these invariants:
/// - Entries are immutable: the same key always yields the same delta.
/// - Concurrent reads are safe.
/// - Failures are reported in the [`StoreError`](crate::StoreError)
///   taxonomy; no foreign error type escapes.
/// - Malformed data never panics; it is reported as `Corrupt`.
pub trait DataStore: Send + Sync + Debug {
    /// Human-readable name used in logs and `Unavailable` errors.
    fn name(&self) -> &str;

    /// Check whether the store holds `key`.
    ///
    /// Must not validate payload integrity; existence is an index question.
    fn exists(&self, key: &Key) -> StoreResult<bool>;

    /// Fetch the delta stored for `key`.
    ///
    /// Returns `NotFound` if the key is absent and `Corrupt` if the entry
    /// cannot be decoded.
    fn get_delta(&self, key: &Key) -> StoreResult<Delta>;

    /// Fetch only the base of the delta stored for `key`.
    ///
    /// `Ok(None)` means the entry is a full snapshot. Implementations should
    /// avoid materializing the payload.
    fn get_delta_chain_base(&self, key: &Key) -> StoreResult<Option<Key>>;

    /// Fetch the metadata stored for `key`.
    ///
    /// Default implementation reads the whole delta. Backends may override
    /// to avoid decoding the payload.
    fn get_metadata(&self, key: &Key) -> StoreResult<DeltaMetadata> {
        self.get_delta(key).map(|delta| delta.metadata)
    }
}

/// Source of stores that may appear after a union was built.
///
/// Each call to [`discover`](Self::discover) returns only stores not
/// returned before, in the order they should be consulted.
pub trait StoreDiscovery: Send + Debug {
    fn discover(&mut self) -> StoreResult<Vec<Arc<dyn DataStore>>>;
}
