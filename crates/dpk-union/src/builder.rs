use std::path::PathBuf;
use std::sync::Arc;

use dpk_pack::{DatapackStore, PackDirectory};
use dpk_store::{DataStore, ExternalStoreAdapter, HostStore, StoreDiscovery};

use crate::config::UnionConfig;
use crate::error::UnionError;
use crate::union::UnionStore;

/// Assembles a [`UnionStore`] from packs, pack directories, and host stores.
///
/// Stores are consulted in the order they are added here.
///
/// ```no_run
/// use dpk_union::{UnionConfig, UnionStore};
///
/// let union = UnionStore::builder()
///     .pack_dir("/var/cache/packs")
///     .pack("/srv/shared/base")
///     .config(UnionConfig::default())
///     .build()?;
/// # Ok::<(), dpk_union::UnionError>(())
/// ```
#[derive(Default)]
pub struct UnionStoreBuilder {
    members: Vec<Member>,
    config: UnionConfig,
}

enum Member {
    Store(Arc<dyn DataStore>),
    Directory(PathBuf),
    Discovery(Box<dyn StoreDiscovery>),
}

impl UnionStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the pack pair at `base` (`<base>.datapack` + `<base>.dataidx`).
    ///
    /// The pack is opened on first use.
    pub fn pack(self, base: impl Into<PathBuf>) -> Self {
        self.store(Arc::new(DatapackStore::new(base)))
    }

    /// Add every pack currently in `dir`, and watch it for new packs on
    /// refresh.
    pub fn pack_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.members.push(Member::Directory(dir.into()));
        self
    }

    /// Add an already constructed store.
    pub fn store(mut self, store: Arc<dyn DataStore>) -> Self {
        self.members.push(Member::Store(store));
        self
    }

    /// Add a host-supplied store, keeping `host` alive as long as the union.
    pub fn host_store<H>(self, name: impl Into<String>, host: Arc<H>) -> Self
    where
        H: HostStore + ?Sized + 'static,
    {
        self.store(Arc::new(ExternalStoreAdapter::new(name, host)))
    }

    /// Add a custom discovery source. Whatever it finds now is added in
    /// place; later finds are appended on refresh.
    pub fn discovery(mut self, source: Box<dyn StoreDiscovery>) -> Self {
        self.members.push(Member::Discovery(source));
        self
    }

    pub fn config(mut self, config: UnionConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and run every discovery source once.
    ///
    /// Fails if the configuration is invalid or a directory cannot be read.
    pub fn build(self) -> Result<UnionStore, UnionError> {
        self.config.validate()?;

        let mut stores = Vec::new();
        let mut sources: Vec<Box<dyn StoreDiscovery>> = Vec::new();
        for member in self.members {
            let mut source = match member {
                Member::Store(store) => {
                    stores.push(store);
                    continue;
                }
                Member::Directory(dir) => Box::new(PackDirectory::new(dir)) as Box<dyn StoreDiscovery>,
                Member::Discovery(source) => source,
            };
            stores.extend(source.discover()?);
            sources.push(source);
        }

        tracing::debug!(stores = stores.len(), sources = sources.len(), "union built");
        Ok(UnionStore::with_parts(stores, sources, self.config))
    }
}

impl std::fmt::Debug for UnionStoreBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnionStoreBuilder")
            .field("members", &self.members.len())
            .field("config", &self.config)
            .finish()
    }
}
