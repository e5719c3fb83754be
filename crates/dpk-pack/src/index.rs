use std::cmp::Ordering;

use dpk_types::{Key, NODE_LEN};

use crate::error::{PackError, PackResult};
use crate::reader::PackBytes;

pub(crate) const INDEX_MAGIC: &[u8; 4] = b"DPKI";
pub(crate) const INDEX_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;
const FANOUT_LEN: usize = 256 * 4;
pub(crate) const ENTRY_LEN: usize = NODE_LEN + 8 + 8 + 8;
const CHECKSUM_LEN: usize = 32;

/// Location of one entry in the data file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: u64,
    pub length: u64,
}

/// Pack index for fast random-access lookups.
///
/// Layout, modelled on git's pack index:
/// - Header: `DPKI` + version
/// - Fan-out table: 256 entries counting keys whose first node byte <= index
/// - Sorted entries: node, path tag, offset, length
/// - Pack checksum (BLAKE3 of the data file body)
///
/// Lookups read straight from the (usually memory-mapped) bytes; nothing is
/// copied into owned tables.
#[derive(Debug)]
pub struct PackIndex {
    bytes: PackBytes,
    count: usize,
}

/// Tag distinguishing keys that share a node but not a path.
///
/// Path-less keys use tag 0; qualified keys use the first 8 bytes of the
/// path's BLAKE3 hash with the low bit forced on.
pub fn path_tag(path: Option<&str>) -> u64 {
    match path {
        None => 0,
        Some(path) => {
            let hash = blake3::hash(path.as_bytes());
            let mut tag = [0u8; 8];
            tag.copy_from_slice(&hash.as_bytes()[..8]);
            u64::from_be_bytes(tag) | 1
        }
    }
}

impl PackIndex {
    /// Validate and wrap index bytes.
    pub fn from_bytes(bytes: impl Into<PackBytes>) -> PackResult<Self> {
        let bytes = bytes.into();
        let data: &[u8] = &bytes;
        if data.len() < HEADER_LEN {
            return Err(PackError::IndexCorrupted("too short".into()));
        }
        if &data[0..4] != INDEX_MAGIC {
            return Err(PackError::InvalidMagic {
                file: "index",
                expected: "DPKI".into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = read_u32(&data[4..8]);
        if version != INDEX_VERSION {
            return Err(PackError::UnsupportedVersion {
                file: "index",
                version,
            });
        }
        if data.len() < HEADER_LEN + FANOUT_LEN {
            return Err(PackError::IndexCorrupted("fan-out truncated".into()));
        }

        let mut previous = 0u32;
        for slot in 0..256 {
            let count = fanout_at(data, slot);
            if count < previous {
                return Err(PackError::IndexCorrupted(format!(
                    "fan-out decreases at slot {slot}"
                )));
            }
            previous = count;
        }

        let count = previous as usize;
        let expected = count
            .checked_mul(ENTRY_LEN)
            .and_then(|n| n.checked_add(HEADER_LEN + FANOUT_LEN + CHECKSUM_LEN))
            .ok_or_else(|| PackError::IndexCorrupted("entry count overflows".into()))?;
        if data.len() != expected {
            return Err(PackError::IndexCorrupted(format!(
                "expected {expected} bytes for {count} entries, found {}",
                data.len()
            )));
        }

        Ok(Self { bytes, count })
    }

    /// Look up where `key` lives in the data file.
    pub fn locate(&self, key: &Key) -> Option<IndexEntry> {
        let node = key.node().as_bytes();
        let tag = path_tag(key.path());
        let first = node[0] as usize;
        let mut lo = if first == 0 {
            0
        } else {
            fanout_at(&self.bytes, first - 1) as usize
        };
        let mut hi = fanout_at(&self.bytes, first) as usize;

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entry = self.entry_bytes(mid);
            let ordering = entry[..NODE_LEN]
                .cmp(&node[..])
                .then_with(|| read_u64(&entry[NODE_LEN..NODE_LEN + 8]).cmp(&tag));
            match ordering {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => {
                    return Some(IndexEntry {
                        offset: read_u64(&entry[NODE_LEN + 8..NODE_LEN + 16]),
                        length: read_u64(&entry[NODE_LEN + 16..NODE_LEN + 24]),
                    })
                }
            }
        }
        None
    }

    /// Check if a key is indexed.
    pub fn contains(&self, key: &Key) -> bool {
        self.locate(key).is_some()
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Checksum of the data file this index was built for.
    pub fn pack_checksum(&self) -> [u8; 32] {
        let start = self.bytes.len() - CHECKSUM_LEN;
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&self.bytes[start..]);
        checksum
    }

    fn entry_bytes(&self, i: usize) -> &[u8] {
        let start = HEADER_LEN + FANOUT_LEN + i * ENTRY_LEN;
        &self.bytes[start..start + ENTRY_LEN]
    }
}

fn fanout_at(data: &[u8], slot: usize) -> u32 {
    let start = HEADER_LEN + slot * 4;
    read_u32(&data[start..start + 4])
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(bytes);
    u32::from_be_bytes(arr)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(bytes);
    u64::from_be_bytes(arr)
}

/// Serialize an index from `(key, entry)` pairs.
///
/// Pairs are sorted here; two keys with the same node and path tag are
/// rejected since lookups could not tell them apart.
#[cfg(any(test, feature = "writer"))]
pub(crate) fn build_index(
    mut entries: Vec<(Key, IndexEntry)>,
    pack_checksum: [u8; 32],
) -> PackResult<Vec<u8>> {
    let sort_key = |key: &Key| (*key.node().as_bytes(), path_tag(key.path()));
    entries.sort_by_key(|(key, _)| sort_key(key));
    for pair in entries.windows(2) {
        if sort_key(&pair[0].0) == sort_key(&pair[1].0) {
            return Err(PackError::DuplicateEntry(pair[1].0.clone()));
        }
    }

    let mut fanout = [0u32; 256];
    for (key, _) in &entries {
        fanout[key.node().as_bytes()[0] as usize] += 1;
    }
    let mut running = 0u32;
    for slot in fanout.iter_mut() {
        running += *slot;
        *slot = running;
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + FANOUT_LEN + entries.len() * ENTRY_LEN + CHECKSUM_LEN);
    buf.extend_from_slice(INDEX_MAGIC);
    buf.extend_from_slice(&INDEX_VERSION.to_be_bytes());
    for count in fanout {
        buf.extend_from_slice(&count.to_be_bytes());
    }
    for (key, entry) in &entries {
        buf.extend_from_slice(key.node().as_bytes());
        buf.extend_from_slice(&path_tag(key.path()).to_be_bytes());
        buf.extend_from_slice(&entry.offset.to_be_bytes());
        buf.extend_from_slice(&entry.length.to_be_bytes());
    }
    buf.extend_from_slice(&pack_checksum);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpk_types::Node;

    fn make_keys(n: usize) -> Vec<Key> {
        (0..n)
            .map(|i| {
                let mut hash = [0u8; 32];
                hash[0] = (i % 256) as u8;
                hash[1] = (i / 256) as u8;
                Key::new("file", Node::from_hash(hash))
            })
            .collect()
    }

    fn build(keys: &[Key]) -> PackIndex {
        let entries = keys
            .iter()
            .enumerate()
            .map(|(i, k)| {
                (
                    k.clone(),
                    IndexEntry {
                        offset: (i * 100) as u64,
                        length: 10 + i as u64,
                    },
                )
            })
            .collect();
        PackIndex::from_bytes(build_index(entries, [0xAB; 32]).unwrap()).unwrap()
    }

    #[test]
    fn build_empty_index() {
        let idx = build(&[]);
        assert!(idx.is_empty());
        assert!(!idx.contains(&Key::from_node(Node::null())));
    }

    #[test]
    fn build_and_locate_single() {
        let key = Key::new("a.txt", Node::for_content(b"hello"));
        let idx = build(std::slice::from_ref(&key));
        assert_eq!(idx.len(), 1);
        assert_eq!(
            idx.locate(&key),
            Some(IndexEntry {
                offset: 0,
                length: 10
            })
        );
    }

    #[test]
    fn locate_missing_returns_none() {
        let idx = build(&[Key::new("a", Node::for_content(b"present"))]);
        assert!(idx.locate(&Key::new("a", Node::for_content(b"missing"))).is_none());
    }

    #[test]
    fn path_is_part_of_the_lookup() {
        let node = Node::for_content(b"shared");
        let idx = build(&[Key::new("a", node)]);
        assert!(idx.contains(&Key::new("a", node)));
        assert!(!idx.contains(&Key::new("b", node)));
        assert!(!idx.contains(&Key::from_node(node)));
    }

    #[test]
    fn locate_many_across_fanout_slots() {
        let keys = make_keys(600);
        let idx = build(&keys);
        assert_eq!(idx.len(), 600);
        for (i, key) in keys.iter().enumerate() {
            let entry = idx.locate(key).unwrap_or_else(|| panic!("missing key {i}"));
            assert_eq!(entry.offset, (i * 100) as u64);
        }
    }

    #[test]
    fn checksum_is_preserved() {
        let idx = build(&make_keys(3));
        assert_eq!(idx.pack_checksum(), [0xAB; 32]);
    }

    #[test]
    fn duplicate_keys_rejected() {
        let key = Key::new("a", Node::for_content(b"x"));
        let entry = IndexEntry {
            offset: 0,
            length: 1,
        };
        let err = build_index(vec![(key.clone(), entry), (key, entry)], [0; 32]).unwrap_err();
        assert!(matches!(err, PackError::DuplicateEntry(_)));
    }

    #[test]
    fn from_bytes_bad_magic() {
        let err = PackIndex::from_bytes(b"BADMxxxxxxxx".to_vec()).unwrap_err();
        assert!(matches!(err, PackError::InvalidMagic { .. }));
    }

    #[test]
    fn from_bytes_bad_version() {
        let mut data = Vec::new();
        data.extend_from_slice(b"DPKI");
        data.extend_from_slice(&99u32.to_be_bytes());
        let err = PackIndex::from_bytes(data).unwrap_err();
        assert!(matches!(
            err,
            PackError::UnsupportedVersion { version: 99, .. }
        ));
    }

    #[test]
    fn from_bytes_truncated() {
        let err = PackIndex::from_bytes(b"DPKI".to_vec()).unwrap_err();
        assert!(matches!(err, PackError::IndexCorrupted(_)));

        let mut full = build_index(vec![], [0; 32]).unwrap();
        full.pop();
        assert!(matches!(
            PackIndex::from_bytes(full),
            Err(PackError::IndexCorrupted(_))
        ));
    }

    #[test]
    fn decreasing_fanout_rejected() {
        let mut data = build_index(vec![], [0; 32]).unwrap();
        data[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&5u32.to_be_bytes());
        let err = PackIndex::from_bytes(data).unwrap_err();
        assert!(matches!(err, PackError::IndexCorrupted(_)));
    }
}
