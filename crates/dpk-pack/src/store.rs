use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing::debug;

use dpk_store::{base_from_node, DataStore, Delta, DeltaMetadata, StoreError, StoreResult};
use dpk_types::Key;

use crate::error::PackResult;
use crate::reader::PackReader;

/// A [`DataStore`] serving one immutable pack pair.
///
/// Construction only records the base path. The index and data files are
/// opened and mapped on first access and stay mapped until the store is
/// dropped. A failed open is reported as a store error and retried on the
/// next access.
pub struct DatapackStore {
    name: String,
    base: PathBuf,
    pack: OnceCell<PackReader>,
}

impl DatapackStore {
    /// A store for the pack pair at `base`, opened lazily.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let name = base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| base.display().to_string());
        Self {
            name,
            base,
            pack: OnceCell::new(),
        }
    }

    /// A store for the pack pair at `base`, opened and validated now.
    pub fn open(base: impl Into<PathBuf>) -> PackResult<Self> {
        let store = Self::new(base);
        let reader = PackReader::open(&store.base)?;
        // Freshly created cell; cannot already be set.
        let _ = store.pack.set(reader);
        Ok(store)
    }

    /// A store over an already opened reader (in-memory packs).
    pub fn from_reader(name: impl Into<String>, reader: PackReader) -> Self {
        Self {
            name: name.into(),
            base: PathBuf::new(),
            pack: OnceCell::with_value(reader),
        }
    }

    /// Base path of the pack pair.
    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Returns `true` once the pack has been opened.
    pub fn is_open(&self) -> bool {
        self.pack.get().is_some()
    }

    /// Number of entries in the pack, opening it if needed.
    pub fn entry_count(&self) -> StoreResult<usize> {
        Ok(self.reader()?.entry_count())
    }

    /// Check the pack's full-content checksum.
    pub fn verify(&self) -> StoreResult<()> {
        self.reader()?
            .verify()
            .map_err(|e| e.into_store_error(&self.name, None))
    }

    fn reader(&self) -> StoreResult<&PackReader> {
        self.pack
            .get_or_try_init(|| PackReader::open(&self.base))
            .map_err(|e| e.into_store_error(&self.name, None))
    }
}

impl DataStore for DatapackStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self, key: &Key) -> StoreResult<bool> {
        Ok(self.reader()?.contains(key))
    }

    fn get_delta(&self, key: &Key) -> StoreResult<Delta> {
        self.reader()?
            .read_delta(key)
            .map_err(|e| e.into_store_error(&self.name, Some(key)))?
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    fn get_delta_chain_base(&self, key: &Key) -> StoreResult<Option<Key>> {
        let header = self
            .reader()?
            .read_header(key)
            .map_err(|e| e.into_store_error(&self.name, Some(key)))?
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        Ok(base_from_node(key, header.base))
    }

    fn get_metadata(&self, key: &Key) -> StoreResult<DeltaMetadata> {
        let header = self
            .reader()?
            .read_header(key)
            .map_err(|e| e.into_store_error(&self.name, Some(key)))?
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        Ok(header.metadata)
    }
}

impl std::fmt::Debug for DatapackStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatapackStore")
            .field("name", &self.name)
            .field("base", &self.base)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for DatapackStore {
    fn drop(&mut self) {
        if self.is_open() {
            debug!(pack = %self.name, "closing pack");
        }
    }
}
