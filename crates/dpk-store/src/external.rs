//! Adapter for stores implemented outside the engine.
//!
//! A host runtime (a scripting-language binding, a remote cache client, ...)
//! implements [`HostStore`] in its own terms. [`ExternalStoreAdapter`] wraps
//! it behind [`DataStore`] so a union treats it exactly like a pack store.
//!
//! The adapter owns a strong `Arc` to the host object for its entire
//! lifetime. The host may drop its own handle at any time; the object stays
//! alive until the adapter itself is dropped.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use dpk_types::Key;

use crate::delta::{Delta, DeltaMetadata};
use crate::error::{StoreError, StoreResult};
use crate::traits::DataStore;

/// Failure reported by a host store.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The host does not have the key.
    #[error("missing key")]
    Missing,

    /// The host returned data it could not make sense of.
    #[error("malformed data: {0}")]
    Malformed(String),

    /// The host's backing service could not be reached.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// Any other host-side failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// A delta as handed over by a host store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostDelta {
    pub base: Option<Key>,
    pub data: Vec<u8>,
    pub size: Option<u64>,
    pub flags: u64,
}

/// Capability set a host-supplied store must provide.
pub trait HostStore: Send + Sync {
    fn contains(&self, key: &Key) -> Result<bool, HostError>;

    fn get_delta(&self, key: &Key) -> Result<HostDelta, HostError>;

    fn get_delta_chain_base(&self, key: &Key) -> Result<Option<Key>, HostError>;
}

/// [`DataStore`] view of a [`HostStore`].
pub struct ExternalStoreAdapter<H: HostStore + ?Sized> {
    name: String,
    host: Arc<H>,
}

impl<H: HostStore + ?Sized> ExternalStoreAdapter<H> {
    /// Wrap `host`, taking a keep-alive reference to it.
    pub fn new(name: impl Into<String>, host: Arc<H>) -> Self {
        Self {
            name: name.into(),
            host,
        }
    }

    /// The wrapped host store.
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    fn translate(&self, key: &Key, err: HostError) -> StoreError {
        match err {
            HostError::Missing => StoreError::NotFound(key.clone()),
            HostError::Malformed(reason) => StoreError::corrupt(key, reason),
            HostError::Unreachable(reason) => StoreError::Unavailable {
                store: self.name.clone(),
                reason,
            },
            HostError::Other(source) => StoreError::Unavailable {
                store: self.name.clone(),
                reason: source.to_string(),
            },
        }
    }

    fn check_base(&self, key: &Key, base: Option<Key>) -> StoreResult<Option<Key>> {
        match base {
            Some(base) if base == *key => Err(StoreError::corrupt(key, "delta is its own base")),
            Some(base) if base.is_null() => Ok(None),
            other => Ok(other),
        }
    }
}

impl<H: HostStore + ?Sized> DataStore for ExternalStoreAdapter<H> {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self, key: &Key) -> StoreResult<bool> {
        match self.host.contains(key) {
            Ok(found) => Ok(found),
            Err(HostError::Missing) => Ok(false),
            Err(err) => Err(self.translate(key, err)),
        }
    }

    fn get_delta(&self, key: &Key) -> StoreResult<Delta> {
        let host_delta = self
            .host
            .get_delta(key)
            .map_err(|err| self.translate(key, err))?;
        let base = self.check_base(key, host_delta.base)?;
        Ok(Delta {
            key: key.clone(),
            base,
            data: host_delta.data,
            metadata: DeltaMetadata {
                size: host_delta.size,
                flags: host_delta.flags,
            },
        })
    }

    fn get_delta_chain_base(&self, key: &Key) -> StoreResult<Option<Key>> {
        let base = self
            .host
            .get_delta_chain_base(key)
            .map_err(|err| self.translate(key, err))?;
        self.check_base(key, base)
    }
}

impl<H: HostStore + ?Sized> fmt::Debug for ExternalStoreAdapter<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalStoreAdapter")
            .field("name", &self.name)
            .field("host_refs", &Arc::strong_count(&self.host))
            .finish()
    }
}

impl<H: HostStore + ?Sized> Drop for ExternalStoreAdapter<H> {
    fn drop(&mut self) {
        debug!(store = %self.name, "releasing host store");
    }
}
