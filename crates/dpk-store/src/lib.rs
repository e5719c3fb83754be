//! Store capability interface for the datapack store.
//!
//! Every source of deltas a union can hold implements [`DataStore`]:
//!
//! - pack-backed stores (in `dpk-pack`)
//! - [`InMemoryDataStore`] -- `HashMap`-based store for tests and embedding
//! - [`ExternalStoreAdapter`] -- stores supplied by a host runtime
//!
//! # Design Rules
//!
//! 1. Stores are read-only and entries are immutable.
//! 2. Concurrent reads are always safe.
//! 3. Every failure is expressed as a [`StoreError`]; foreign error types are
//!    translated at the store boundary.
//! 4. Malformed data is reported as `Corrupt`, never as a panic.

pub mod delta;
pub mod error;
pub mod external;
pub mod memory;
pub mod traits;

pub use delta::{base_from_node, Delta, DeltaMetadata};
pub use error::{StoreError, StoreResult};
pub use external::{ExternalStoreAdapter, HostDelta, HostError, HostStore};
pub use memory::InMemoryDataStore;
pub use traits::{DataStore, StoreDiscovery};
