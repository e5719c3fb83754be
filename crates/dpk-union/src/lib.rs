//! Union of datapack stores.
//!
//! A [`UnionStore`] holds an ordered list of [`DataStore`](dpk_store::DataStore)s
//! (pack files, in-memory stores, host-supplied stores) and answers lookups
//! by asking them in order. Full texts are rebuilt by
//! [`DeltaChainResolver`], which follows each delta to its base in whichever
//! store holds it, so one chain may span several packs.
//!
//! # Lookup policy
//!
//! - The first store that can serve a key wins.
//! - Per-store failures (`Corrupt`, `Unavailable`, I/O) are logged, counted in
//!   [`UnionStats`], and skipped. A delta that will not apply is treated the
//!   same way: the next store holding that key is tried.
//! - A miss in every store refreshes the store list once and retries.
//! - Broken, cyclic, and overlong chains are returned immediately.
//!
//! # Example
//!
//! ```no_run
//! use dpk_types::{Key, Node};
//! use dpk_union::UnionStore;
//!
//! let union = UnionStore::builder().pack_dir("/var/cache/packs").build()?;
//! let key = Key::new("src/main.rs", Node::from_hex(&"ab".repeat(32))?);
//! let text = union.get(&key)?;
//! # let _ = text;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod resolver;
pub mod union;

pub use builder::UnionStoreBuilder;
pub use config::{ConfigError, UnionConfig};
pub use error::UnionError;
pub use resolver::DeltaChainResolver;
pub use union::{UnionStats, UnionStore};
