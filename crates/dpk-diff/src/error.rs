//! Error types for the delta codec.

/// Errors raised while decoding or applying a delta.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeltaError {
    /// The fragment stream ended in the middle of a fragment.
    #[error("truncated delta at byte {offset}")]
    Truncated { offset: usize },

    /// A fragment starts before the previous fragment ended.
    #[error("fragment at byte {offset} overlaps the previous fragment")]
    Overlap { offset: usize },

    /// A fragment addresses bytes outside the base text.
    #[error("fragment {start}..{end} is out of range for base of {base_len} bytes")]
    OutOfRange {
        start: usize,
        end: usize,
        base_len: usize,
    },
}

/// Convenience alias for delta results.
pub type DeltaResult<T> = Result<T, DeltaError>;
