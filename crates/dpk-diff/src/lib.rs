//! Delta codec for the datapack store.
//!
//! A delta is a sorted list of fragments, each replacing a byte range of the
//! base text with new bytes:
//!
//! ```text
//! [start: u32 BE][end: u32 BE][len: u32 BE][len bytes of replacement]
//! ```
//!
//! A delta always transforms its base's full text into the full text of the
//! revision that owns it. Chains are therefore replayed from the terminating
//! snapshot outward, applying the delta closest to the snapshot first.
//!
//! # Key Items
//!
//! - [`apply_delta`] -- rebuild a text from its base and a delta (read path)
//! - [`compute_delta`] -- produce a delta with the `similar` crate (fixtures, tooling)
//! - [`Fragments`] -- validating iterator over a delta's fragments

pub mod error;
pub mod patch;

pub use error::{DeltaError, DeltaResult};
pub use patch::{apply_delta, compute_delta, fragments, patched_len, Fragment, Fragments};
