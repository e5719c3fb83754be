use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use dpk_store::{DataStore, Delta, DeltaMetadata, StoreDiscovery, StoreError, StoreResult};
use dpk_types::Key;

use crate::builder::UnionStoreBuilder;
use crate::config::{ConfigError, UnionConfig};
use crate::resolver::DeltaChainResolver;

type StoreList = Arc<Vec<Arc<dyn DataStore>>>;

/// Counters describing a union's activity so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnionStats {
    /// Refreshes actually performed (rate-limited attempts are not counted).
    pub refreshes: u64,
    /// Per-store failures absorbed during lookups and refreshes.
    pub soft_failures: u64,
    /// Stores currently in the list.
    pub stores: usize,
}

struct RefreshState {
    sources: Vec<Box<dyn StoreDiscovery>>,
    last: Option<Instant>,
}

/// An ordered union of stores with refresh on miss.
///
/// Stores are consulted in the order they were added. The list only ever
/// grows: [`add_store`](Self::add_store) and [`refresh`](Self::refresh)
/// append, nothing removes. Each lookup works on the list as it was when
/// the call began, so a concurrent refresh never changes the stores an
/// in-flight chain resolution sees.
///
/// The union owns its stores. Dropping it drops every pack store it opened
/// and releases every host handle held by an adapter.
pub struct UnionStore {
    stores: RwLock<StoreList>,
    refresh: Mutex<RefreshState>,
    force_refresh: AtomicBool,
    config: UnionConfig,
    refreshes: AtomicU64,
    soft_failures: AtomicU64,
}

impl UnionStore {
    /// An empty union with no discovery sources.
    pub fn new(config: UnionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_parts(Vec::new(), Vec::new(), config))
    }

    pub fn builder() -> UnionStoreBuilder {
        UnionStoreBuilder::new()
    }

    pub(crate) fn with_parts(
        stores: Vec<Arc<dyn DataStore>>,
        sources: Vec<Box<dyn StoreDiscovery>>,
        config: UnionConfig,
    ) -> Self {
        Self {
            stores: RwLock::new(Arc::new(stores)),
            refresh: Mutex::new(RefreshState {
                sources,
                last: None,
            }),
            force_refresh: AtomicBool::new(false),
            config,
            refreshes: AtomicU64::new(0),
            soft_failures: AtomicU64::new(0),
        }
    }

    /// Full text of `key`, following its delta chain across stores.
    ///
    /// A miss everywhere triggers one refresh and one retry; a second miss
    /// is `NotFound`. Broken, cyclic, and overlong chains are reported
    /// immediately.
    pub fn get(&self, key: &Key) -> StoreResult<Vec<u8>> {
        self.retry_on_miss(|resolver| resolver.resolve(key))
    }

    /// The delta chain for `key`, from `key` down to its full snapshot.
    pub fn get_delta_chain(&self, key: &Key) -> StoreResult<Vec<Delta>> {
        self.retry_on_miss(|resolver| resolver.resolve_chain(key))
    }

    /// The single delta stored for `key` by the first store holding it.
    pub fn get_delta(&self, key: &Key) -> StoreResult<Delta> {
        self.retry_on_miss(|resolver| {
            resolver
                .find_delta(key)?
                .ok_or_else(|| StoreError::NotFound(key.clone()))
        })
    }

    /// Base of the delta stored for `key`, read without decoding payloads.
    ///
    /// `None` means the entry is a full snapshot.
    pub fn get_delta_chain_base(&self, key: &Key) -> StoreResult<Option<Key>> {
        self.retry_on_miss(|resolver| {
            resolver
                .find_chain_base(key)?
                .ok_or_else(|| StoreError::NotFound(key.clone()))
        })
    }

    /// Metadata for `key` from the first store holding it.
    pub fn get_metadata(&self, key: &Key) -> StoreResult<DeltaMetadata> {
        self.retry_on_miss(|resolver| {
            resolver
                .find_metadata(key)?
                .ok_or_else(|| StoreError::NotFound(key.clone()))
        })
    }

    /// Returns `true` if any store holds `key`.
    ///
    /// Store errors count as "not here". Never refreshes.
    pub fn exists(&self, key: &Key) -> bool {
        self.snapshot()
            .iter()
            .any(|store| match store.exists(key) {
                Ok(found) => found,
                Err(err) => {
                    self.record_soft_failure(store.as_ref(), key, &err);
                    false
                }
            })
    }

    /// The subset of `keys` that no store holds, in input order.
    ///
    /// If anything is missing the store list is refreshed once and the
    /// missing keys are checked again.
    pub fn get_missing(&self, keys: &[Key]) -> Vec<Key> {
        let missing: Vec<Key> = keys.iter().filter(|k| !self.exists(k)).cloned().collect();
        if missing.is_empty() || !self.config.refresh_on_miss || self.refresh() == 0 {
            return missing;
        }
        missing.into_iter().filter(|k| !self.exists(k)).collect()
    }

    /// Append `store` after every store already in the union.
    pub fn add_store(&self, store: Arc<dyn DataStore>) {
        debug!(store = store.name(), "store added");
        self.append(vec![store]);
    }

    /// Ask every discovery source for new stores and append them.
    ///
    /// Returns the number of stores added. Skipped (returning 0) when the
    /// previous refresh is more recent than `min_refresh_interval_ms`,
    /// unless [`mark_for_refresh`](Self::mark_for_refresh) was called.
    /// Discovery failures are logged and counted, never returned.
    pub fn refresh(&self) -> usize {
        let mut state = self.refresh.lock().expect("lock poisoned");

        let forced = self.force_refresh.swap(false, Ordering::AcqRel);
        let interval = Duration::from_millis(self.config.min_refresh_interval_ms);
        if !forced && !interval.is_zero() {
            if let Some(last) = state.last {
                if last.elapsed() < interval {
                    debug!("refresh skipped, rate limited");
                    return 0;
                }
            }
        }

        let mut found = Vec::new();
        for source in state.sources.iter_mut() {
            match source.discover() {
                Ok(stores) => found.extend(stores),
                Err(err) => {
                    warn!(source = ?source, error = %err, "store discovery failed");
                    self.soft_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        state.last = Some(Instant::now());
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        let added = found.len();
        if added > 0 {
            for store in &found {
                info!(store = store.name(), "refresh found store");
            }
            self.append(found);
        } else {
            debug!("refresh found no new stores");
        }
        added
    }

    /// Let the next refresh run even if it is inside the rate limit.
    pub fn mark_for_refresh(&self) {
        self.force_refresh.store(true, Ordering::Release);
    }

    pub fn stats(&self) -> UnionStats {
        UnionStats {
            refreshes: self.refreshes.load(Ordering::Relaxed),
            soft_failures: self.soft_failures.load(Ordering::Relaxed),
            stores: self.store_count(),
        }
    }

    /// Number of stores in the union.
    pub fn store_count(&self) -> usize {
        self.snapshot().len()
    }

    pub fn config(&self) -> &UnionConfig {
        &self.config
    }

    fn snapshot(&self) -> StoreList {
        Arc::clone(&self.stores.read().expect("lock poisoned"))
    }

    fn append(&self, new: Vec<Arc<dyn DataStore>>) {
        let mut stores = self.stores.write().expect("lock poisoned");
        let mut next = Vec::with_capacity(stores.len() + new.len());
        next.extend(stores.iter().cloned());
        next.extend(new);
        *stores = Arc::new(next);
    }

    fn retry_on_miss<T>(
        &self,
        op: impl Fn(&DeltaChainResolver<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let attempt = || {
            let stores = self.snapshot();
            let resolver = DeltaChainResolver::new(&stores, self.config.max_chain_length)
                .with_failure_counter(&self.soft_failures);
            op(&resolver)
        };
        match attempt() {
            Err(err) if err.is_not_found() && self.config.refresh_on_miss => {
                debug!(error = %err, "miss, refreshing store list");
                self.refresh();
                attempt()
            }
            result => result,
        }
    }

    fn record_soft_failure(&self, store: &dyn DataStore, key: &Key, err: &StoreError) {
        warn!(store = store.name(), key = %key, error = %err, "skipping store");
        self.soft_failures.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for UnionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnionStore")
            .field("stores", &self.store_count())
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
