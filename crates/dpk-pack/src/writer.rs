use std::path::{Path, PathBuf};

use tracing::debug;

use dpk_store::{Delta, DeltaMetadata};
use dpk_types::{Key, Node};

use crate::entry::{EntryHeader, NO_PATH};
use crate::error::{PackError, PackResult};
use crate::index::{build_index, IndexEntry};
use crate::reader::{pack_paths, CHECKSUM_LEN, DATA_MAGIC, DATA_VERSION};

const ZSTD_LEVEL: i32 = 3;

/// Result of writing a pack pair.
#[derive(Clone, Debug)]
pub struct PackFile {
    pub data_path: PathBuf,
    pub index_path: PathBuf,
    pub entry_count: usize,
    pub checksum: [u8; 32],
}

/// Builds a pack pair from a collection of deltas.
pub struct PackWriter {
    base: PathBuf,
    entries: Vec<Delta>,
}

impl PackWriter {
    /// Create a writer targeting `<base>.datapack` and `<base>.dataidx`.
    pub fn new(base: &Path) -> Self {
        Self {
            base: base.to_path_buf(),
            entries: Vec::new(),
        }
    }

    /// Queue a delta.
    ///
    /// The base must share the key's path, since entries store only the base
    /// node, and may not be the key itself.
    pub fn add(&mut self, delta: &Delta) -> PackResult<()> {
        let invalid = |reason: &str| PackError::InvalidEntry {
            key: delta.key.clone(),
            reason: reason.into(),
        };
        if let Some(path) = delta.key.path() {
            if path.len() >= NO_PATH as usize {
                return Err(invalid("path too long"));
            }
        }
        if delta.key.is_null() {
            return Err(invalid("null node"));
        }
        if let Some(base) = &delta.base {
            if base.path() != delta.key.path() {
                return Err(invalid("base has a different path"));
            }
            if base.node() == delta.key.node() {
                return Err(invalid("entry is its own base"));
            }
            if base.is_null() {
                return Err(invalid("base has a null node"));
            }
        }
        self.entries.push(delta.clone());
        Ok(())
    }

    /// Queue a full snapshot of `data`.
    pub fn add_full(&mut self, key: Key, data: &[u8]) -> PackResult<()> {
        self.add(&Delta::full(key, data.to_vec()))
    }

    /// Queue a delta against `base`, recording the reconstructed size.
    pub fn add_delta(&mut self, key: Key, base: Key, delta: &[u8], size: u64) -> PackResult<()> {
        self.add(
            &Delta::against(key, base, delta.to_vec())
                .with_metadata(DeltaMetadata::with_size(size)),
        )
    }

    /// Number of deltas queued.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the pack pair to disk.
    pub fn finish(self) -> PackResult<PackFile> {
        let (data_path, index_path) = pack_paths(&self.base);
        let entry_count = self.entries.len();
        let (data, index) = self.build()?;
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&data[data.len() - CHECKSUM_LEN..]);

        // Data first: a reader only looks for packs through their index.
        std::fs::write(&data_path, &data)?;
        std::fs::write(&index_path, &index)?;
        debug!(pack = %data_path.display(), entries = entry_count, "wrote pack");

        Ok(PackFile {
            data_path,
            index_path,
            entry_count,
            checksum,
        })
    }

    /// Build data and index bytes in memory (no disk I/O).
    pub fn finish_to_bytes(self) -> PackResult<(Vec<u8>, Vec<u8>)> {
        self.build()
    }

    fn build(self) -> PackResult<(Vec<u8>, Vec<u8>)> {
        let mut data = Vec::new();
        let mut index_entries = Vec::with_capacity(self.entries.len());

        data.extend_from_slice(DATA_MAGIC);
        data.extend_from_slice(&DATA_VERSION.to_be_bytes());
        data.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        for delta in self.entries {
            let offset = data.len() as u64;
            let compressed = zstd::encode_all(delta.data.as_slice(), ZSTD_LEVEL)
                .map_err(|e| PackError::CompressionFailed(e.to_string()))?;

            let header = EntryHeader {
                base: delta.base.as_ref().map_or(Node::null(), |b| *b.node()),
                metadata: delta.metadata,
                raw_len: delta.data.len() as u64,
                compressed_len: compressed.len() as u64,
                crc32: crc32fast::hash(&compressed),
                key: delta.key,
            };
            header.encode_into(&mut data);
            data.extend_from_slice(&compressed);

            let length = data.len() as u64 - offset;
            index_entries.push((header.key, IndexEntry { offset, length }));
        }

        let checksum = *blake3::hash(&data).as_bytes();
        data.extend_from_slice(&checksum);

        let index = build_index(index_entries, checksum)?;
        Ok((data, index))
    }
}
