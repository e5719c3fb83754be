//! Fragment-level delta parsing, application and computation.
//!
//! Computation uses the `similar` crate (Myers diff over bytes); adjacent
//! edits are merged so a replaced run becomes one fragment.

use similar::{Algorithm, DiffTag};

use crate::error::{DeltaError, DeltaResult};

/// Size of a fragment header: start, end and length as big-endian u32.
const FRAGMENT_HEADER: usize = 12;

/// One replacement in a delta: `base[start..end]` becomes `data`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment<'a> {
    pub start: usize,
    pub end: usize,
    pub data: &'a [u8],
}

impl Fragment<'_> {
    /// Append the encoded fragment to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.start as u32).to_be_bytes());
        buf.extend_from_slice(&(self.end as u32).to_be_bytes());
        buf.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        buf.extend_from_slice(self.data);
    }
}

/// Iterator over the fragments of an encoded delta.
///
/// Yields an error once and then stops if the stream is truncated or the
/// fragments are not sorted and disjoint.
pub struct Fragments<'a> {
    delta: &'a [u8],
    pos: usize,
    last_end: usize,
    failed: bool,
}

/// Parse the fragments of `delta`.
pub fn fragments(delta: &[u8]) -> Fragments<'_> {
    Fragments {
        delta,
        pos: 0,
        last_end: 0,
        failed: false,
    }
}

impl<'a> Iterator for Fragments<'a> {
    type Item = DeltaResult<Fragment<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.delta.len() {
            return None;
        }
        let offset = self.pos;
        let result = self.parse_one(offset);
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

impl<'a> Fragments<'a> {
    fn parse_one(&mut self, offset: usize) -> DeltaResult<Fragment<'a>> {
        let header = self
            .delta
            .get(offset..offset + FRAGMENT_HEADER)
            .ok_or(DeltaError::Truncated { offset })?;
        let start = read_u32(&header[0..4]);
        let end = read_u32(&header[4..8]);
        let len = read_u32(&header[8..12]);

        let data_start = offset + FRAGMENT_HEADER;
        let data = self
            .delta
            .get(data_start..data_start + len)
            .ok_or(DeltaError::Truncated { offset })?;

        if start < self.last_end {
            return Err(DeltaError::Overlap { offset });
        }
        if end < start {
            return Err(DeltaError::OutOfRange {
                start,
                end,
                base_len: 0,
            });
        }

        self.pos = data_start + len;
        self.last_end = end;
        Ok(Fragment { start, end, data })
    }
}

fn read_u32(bytes: &[u8]) -> usize {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(bytes);
    u32::from_be_bytes(arr) as usize
}

/// Apply `delta` to `base`, returning the patched text.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> DeltaResult<Vec<u8>> {
    let mut out = Vec::with_capacity(base.len() + delta.len());
    let mut copied = 0usize;

    for fragment in fragments(delta) {
        let fragment = fragment?;
        if fragment.end > base.len() {
            return Err(DeltaError::OutOfRange {
                start: fragment.start,
                end: fragment.end,
                base_len: base.len(),
            });
        }
        out.extend_from_slice(&base[copied..fragment.start]);
        out.extend_from_slice(fragment.data);
        copied = fragment.end;
    }

    out.extend_from_slice(&base[copied..]);
    Ok(out)
}

/// Length of the text `delta` would produce from a base of `base_len` bytes.
pub fn patched_len(base_len: usize, delta: &[u8]) -> DeltaResult<usize> {
    let mut len = base_len;
    for fragment in fragments(delta) {
        let fragment = fragment?;
        if fragment.end > base_len {
            return Err(DeltaError::OutOfRange {
                start: fragment.start,
                end: fragment.end,
                base_len,
            });
        }
        len = len - (fragment.end - fragment.start) + fragment.data.len();
    }
    Ok(len)
}

/// Compute a delta that turns `base` into `target`.
pub fn compute_delta(base: &[u8], target: &[u8]) -> Vec<u8> {
    let ops = similar::capture_diff_slices(Algorithm::Myers, base, target);

    // (start, end, target range) with adjacent edits merged.
    let mut pending: Vec<(usize, usize, std::ops::Range<usize>)> = Vec::new();
    for op in ops {
        let (tag, old, new) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            continue;
        }
        match pending.last_mut() {
            Some((_, end, range)) if *end == old.start && range.end == new.start => {
                *end = old.end;
                range.end = new.end;
            }
            _ => pending.push((old.start, old.end, new)),
        }
    }

    let mut delta = Vec::new();
    for (start, end, range) in pending {
        Fragment {
            start,
            end,
            data: &target[range],
        }
        .encode_into(&mut delta);
    }
    delta
}
