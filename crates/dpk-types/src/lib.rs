//! Foundation types for the datapack store.
//!
//! Every other `dpk-*` crate depends on `dpk-types`.
//!
//! # Key Types
//!
//! - [`Node`] -- fixed-size content/history hash of one blob revision
//! - [`Key`] -- a node plus an optional path qualifier; the sole lookup key

pub mod error;
pub mod key;
pub mod node;

pub use error::TypeError;
pub use key::Key;
pub use node::{Node, NODE_LEN};
