use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};

use dpk_store::{DataStore, StoreDiscovery, StoreResult};

use crate::reader::{pack_paths, INDEX_EXTENSION};
use crate::store::DatapackStore;

/// Finds pack pairs in a directory, remembering the ones already handed out.
///
/// A pack is recognized by its index file; an index without a matching data
/// file is left for a later scan, since writers put the data file down
/// first. New packs are returned in path order so repeated scans of the same
/// directory consult packs in a stable order.
#[derive(Debug)]
pub struct PackDirectory {
    dir: PathBuf,
    seen: HashSet<PathBuf>,
}

impl PackDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seen: HashSet::new(),
        }
    }

    /// The scanned directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Base paths of every pack returned so far.
    pub fn known(&self) -> impl Iterator<Item = &Path> {
        self.seen.iter().map(PathBuf::as_path)
    }

    /// Look for packs not returned by an earlier scan.
    ///
    /// A missing directory holds no packs. Returned stores are opened lazily.
    pub fn scan(&mut self) -> std::io::Result<Vec<DatapackStore>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(dir = %self.dir.display(), "pack directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut bases = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != INDEX_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem() else {
                continue;
            };
            let base = self.dir.join(stem);
            if self.seen.contains(&base) {
                continue;
            }
            let (data_path, _) = pack_paths(&base);
            if !data_path.is_file() {
                trace!(pack = %base.display(), "index without data file, skipping");
                continue;
            }
            bases.push(base);
        }
        bases.sort();

        for base in &bases {
            debug!(pack = %base.display(), "discovered pack");
            self.seen.insert(base.clone());
        }
        Ok(bases.into_iter().map(DatapackStore::new).collect())
    }
}

impl StoreDiscovery for PackDirectory {
    fn discover(&mut self) -> StoreResult<Vec<Arc<dyn DataStore>>> {
        Ok(self
            .scan()?
            .into_iter()
            .map(|store| Arc::new(store) as Arc<dyn DataStore>)
            .collect())
    }
}
