use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::debug;

use dpk_store::{base_from_node, Delta};
use dpk_types::Key;

use crate::entry::EntryHeader;
use crate::error::{PackError, PackResult};
use crate::index::{IndexEntry, PackIndex};

pub(crate) const DATA_MAGIC: &[u8; 4] = b"DPKD";
pub(crate) const DATA_VERSION: u32 = 1;
pub(crate) const DATA_HEADER_LEN: usize = 12;
pub(crate) const CHECKSUM_LEN: usize = 32;

/// Extension of pack data files.
pub const DATA_EXTENSION: &str = "datapack";
/// Extension of pack index files.
pub const INDEX_EXTENSION: &str = "dataidx";

/// Read-only bytes backing a pack file: mapped from disk or owned.
pub enum PackBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl PackBytes {
    /// Map `path` read-only.
    pub fn map(path: &Path) -> PackResult<Self> {
        let file = File::open(path)?;
        // Safety: pack files are immutable once written; the mapping is
        // read-only and never outlives this value.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self::Mapped(mmap))
    }
}

impl Deref for PackBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(mmap) => &mmap[..],
            Self::Owned(bytes) => &bytes[..],
        }
    }
}

impl From<Vec<u8>> for PackBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Owned(bytes)
    }
}

impl std::fmt::Debug for PackBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Mapped(_) => "mapped",
            Self::Owned(_) => "owned",
        };
        write!(f, "PackBytes({kind}, {} bytes)", self.len())
    }
}

/// Paths of the data and index files sharing a base path.
pub fn pack_paths(base: &Path) -> (PathBuf, PathBuf) {
    let with_ext = |ext: &str| {
        let mut path = base.as_os_str().to_owned();
        path.push(".");
        path.push(ext);
        PathBuf::from(path)
    };
    (with_ext(DATA_EXTENSION), with_ext(INDEX_EXTENSION))
}

/// Reads entries from one pack using its index for random access.
#[derive(Debug)]
pub struct PackReader {
    data: PackBytes,
    index: PackIndex,
}

impl PackReader {
    /// Open from in-memory data and index bytes.
    pub fn from_bytes(data: Vec<u8>, index: Vec<u8>) -> PackResult<Self> {
        Self::from_parts(data.into(), PackIndex::from_bytes(index)?)
    }

    /// Open and map the pack pair at `base` (`<base>.datapack`, `<base>.dataidx`).
    pub fn open(base: &Path) -> PackResult<Self> {
        let (data_path, index_path) = pack_paths(base);
        let index = PackIndex::from_bytes(PackBytes::map(&index_path)?)?;
        let reader = Self::from_parts(PackBytes::map(&data_path)?, index)?;
        debug!(pack = %base.display(), entries = reader.entry_count(), "opened pack");
        Ok(reader)
    }

    fn from_parts(data: PackBytes, index: PackIndex) -> PackResult<Self> {
        if data.len() < DATA_HEADER_LEN + CHECKSUM_LEN {
            return Err(PackError::CorruptEntry {
                offset: 0,
                reason: "pack data too short".into(),
            });
        }
        if &data[0..4] != DATA_MAGIC {
            return Err(PackError::InvalidMagic {
                file: "pack",
                expected: "DPKD".into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != DATA_VERSION {
            return Err(PackError::UnsupportedVersion {
                file: "pack",
                version,
            });
        }
        let count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]) as usize;
        if count != index.len() {
            return Err(PackError::IndexCorrupted(format!(
                "index has {} entries, pack declares {count}",
                index.len()
            )));
        }
        Ok(Self { data, index })
    }

    /// Check containment.
    pub fn contains(&self, key: &Key) -> bool {
        self.index.contains(key)
    }

    /// Number of entries.
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// Access the index.
    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// Read only the entry header for `key`, without touching the payload.
    pub fn read_header(&self, key: &Key) -> PackResult<Option<EntryHeader>> {
        let Some(location) = self.index.locate(key) else {
            return Ok(None);
        };
        let (entry, _) = self.entry_slice(location)?;
        let (header, _) = self.checked_header(key, entry, location.offset)?;
        Ok(Some(header))
    }

    /// Read and decode the delta for `key`.
    pub fn read_delta(&self, key: &Key) -> PackResult<Option<Delta>> {
        let Some(location) = self.index.locate(key) else {
            return Ok(None);
        };
        let (entry, offset) = self.entry_slice(location)?;
        let (header, payload_start) = self.checked_header(key, entry, offset)?;

        let compressed = &entry[payload_start..];
        if compressed.len() as u64 != header.compressed_len {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!(
                    "payload is {} bytes, header says {}",
                    compressed.len(),
                    header.compressed_len
                ),
            });
        }
        if crc32fast::hash(compressed) != header.crc32 {
            return Err(PackError::CrcMismatch { key: key.clone() });
        }

        let data = zstd::decode_all(compressed)
            .map_err(|e| PackError::DecompressionFailed(e.to_string()))?;
        if data.len() as u64 != header.raw_len {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!(
                    "size mismatch: expected {}, got {}",
                    header.raw_len,
                    data.len()
                ),
            });
        }

        Ok(Some(Delta {
            base: base_from_node(key, header.base),
            key: header.key,
            data,
            metadata: header.metadata,
        }))
    }

    /// Recompute the data checksum and compare it with the trailer and index.
    pub fn verify(&self) -> PackResult<()> {
        let body_end = self.data.len() - CHECKSUM_LEN;
        let computed = *blake3::hash(&self.data[..body_end]).as_bytes();
        if computed[..] != self.data[body_end..] || computed != self.index.pack_checksum() {
            return Err(PackError::ChecksumMismatch);
        }
        Ok(())
    }

    fn entry_slice(&self, location: IndexEntry) -> PackResult<(&[u8], u64)> {
        let offset = location.offset;
        let body_end = (self.data.len() - CHECKSUM_LEN) as u64;
        let end = offset
            .checked_add(location.length)
            .filter(|&end| offset >= DATA_HEADER_LEN as u64 && end <= body_end)
            .ok_or_else(|| PackError::CorruptEntry {
                offset,
                reason: format!("entry of {} bytes lies outside pack data", location.length),
            })?;
        Ok((&self.data[offset as usize..end as usize], offset))
    }

    fn checked_header(
        &self,
        key: &Key,
        entry: &[u8],
        offset: u64,
    ) -> PackResult<(EntryHeader, usize)> {
        let (header, payload_start) = EntryHeader::parse(entry, offset)?;
        if header.key != *key {
            return Err(PackError::KeyMismatch {
                offset,
                found: header.key,
            });
        }
        if header.base == *key.node() {
            return Err(PackError::CorruptEntry {
                offset,
                reason: "entry is its own delta base".into(),
            });
        }
        Ok((header, payload_start))
    }
}
