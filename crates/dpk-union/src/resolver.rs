use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{trace, warn};

use dpk_store::{DataStore, Delta, DeltaMetadata, StoreError, StoreResult};
use dpk_types::Key;

/// `(key, store index)` pairs that must not serve a hop again.
type Excluded = HashSet<(Key, usize)>;

/// Walks delta chains across an ordered set of stores.
///
/// Each hop of a chain is looked up independently, so a delta in one store
/// may name a base that lives in another. Stores are consulted in slice
/// order and the first one able to serve a hop wins. Per-store failures are
/// logged, counted, and skipped.
pub struct DeltaChainResolver<'a> {
    stores: &'a [Arc<dyn DataStore>],
    max_chain_length: usize,
    soft_failures: Option<&'a AtomicU64>,
}

impl<'a> DeltaChainResolver<'a> {
    pub fn new(stores: &'a [Arc<dyn DataStore>], max_chain_length: usize) -> Self {
        Self {
            stores,
            max_chain_length,
            soft_failures: None,
        }
    }

    /// Count absorbed per-store failures in `counter`.
    pub fn with_failure_counter(mut self, counter: &'a AtomicU64) -> Self {
        self.soft_failures = Some(counter);
        self
    }

    /// Fetch the delta for `key` from the first store that can serve it.
    ///
    /// Returns `Ok(None)` when no store can.
    pub fn find_delta(&self, key: &Key) -> StoreResult<Option<Delta>> {
        Ok(self
            .find_delta_excluding(key, &Excluded::new())?
            .map(|(_, delta)| delta))
    }

    /// Fetch the metadata for `key` from the first store that has it.
    pub fn find_metadata(&self, key: &Key) -> StoreResult<Option<DeltaMetadata>> {
        for store in self.stores {
            match store.get_metadata(key) {
                Ok(metadata) => return Ok(Some(metadata)),
                Err(err) => self.absorb(store.as_ref(), key, err)?,
            }
        }
        Ok(None)
    }

    /// Fetch the base of `key`'s delta from the first store that has it,
    /// without decoding any payload.
    ///
    /// The outer `Option` is `None` when no store holds `key`; the inner one
    /// is `None` when the entry is a full snapshot.
    pub fn find_chain_base(&self, key: &Key) -> StoreResult<Option<Option<Key>>> {
        for store in self.stores {
            match store.get_delta_chain_base(key) {
                Ok(Some(base)) if base == *key => {
                    let err = StoreError::corrupt(key, "entry is its own delta base");
                    self.absorb(store.as_ref(), key, err)?;
                }
                Ok(base) => return Ok(Some(base)),
                Err(err) => self.absorb(store.as_ref(), key, err)?,
            }
        }
        Ok(None)
    }

    /// Collect the chain for `key`, from `key` itself down to the full
    /// snapshot that terminates it.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no store has `key` itself.
    /// - `BrokenChain` if a base further down is missing everywhere.
    /// - `DeltaCycle` if the chain returns to a key it already passed.
    /// - `ChainTooLong` if more than `max_chain_length` entries are needed.
    pub fn resolve_chain(&self, key: &Key) -> StoreResult<Vec<Delta>> {
        Ok(self
            .chain_excluding(key, &Excluded::new())?
            .into_iter()
            .map(|(_, delta)| delta)
            .collect())
    }

    /// Reconstruct the full text of `key`.
    ///
    /// Starts from the snapshot at the end of the chain and applies each
    /// delta on top of its base's text, ending at `key`. A hop whose delta
    /// does not apply, or whose text disagrees with its recorded size, is
    /// treated like any other per-store failure: that store is dropped for
    /// that key and the chain is walked again. `Corrupt` is returned only
    /// when no other store can serve the hop.
    pub fn resolve(&self, key: &Key) -> StoreResult<Vec<u8>> {
        let mut excluded = Excluded::new();
        let mut corruption: Option<StoreError> = None;

        loop {
            let chain = match self.chain_excluding(key, &excluded) {
                Ok(chain) => chain,
                Err(err) => {
                    let exhausted = missing_key(&err)
                        .is_some_and(|missing| excluded.iter().any(|(k, _)| k == missing));
                    return Err(match corruption {
                        Some(corrupt) if exhausted => corrupt,
                        _ => err,
                    });
                }
            };

            match rebuild(&chain) {
                Ok(text) => return Ok(text),
                Err((hop, err)) => {
                    let (index, delta) = &chain[hop];
                    self.record(self.stores[*index].as_ref(), &delta.key, &err);
                    excluded.insert((delta.key.clone(), *index));
                    corruption = Some(err);
                }
            }
        }
    }

    /// First store (not excluded for `key`) able to serve `key`, with its index.
    fn find_delta_excluding(
        &self,
        key: &Key,
        excluded: &Excluded,
    ) -> StoreResult<Option<(usize, Delta)>> {
        for (index, store) in self.stores.iter().enumerate() {
            if excluded.contains(&(key.clone(), index)) {
                continue;
            }
            match store.exists(key) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    self.absorb(store.as_ref(), key, err)?;
                    continue;
                }
            }
            match store.get_delta(key) {
                Ok(delta) if delta.key != *key => {
                    let err = StoreError::corrupt(key, format!("store returned {}", delta.key));
                    self.absorb(store.as_ref(), key, err)?;
                }
                Ok(delta) if delta.base.as_ref() == Some(key) => {
                    let err = StoreError::corrupt(key, "entry is its own delta base");
                    self.absorb(store.as_ref(), key, err)?;
                }
                Ok(delta) => {
                    trace!(store = store.name(), key = %key, "delta found");
                    return Ok(Some((index, delta)));
                }
                Err(err) => self.absorb(store.as_ref(), key, err)?,
            }
        }
        Ok(None)
    }

    fn chain_excluding(&self, key: &Key, excluded: &Excluded) -> StoreResult<Vec<(usize, Delta)>> {
        let mut chain: Vec<(usize, Delta)> = Vec::new();
        let mut seen = HashSet::new();
        let mut current = key.clone();

        loop {
            if !seen.insert(current.clone()) {
                return Err(StoreError::DeltaCycle {
                    key: key.clone(),
                    repeated: current,
                });
            }
            if chain.len() >= self.max_chain_length {
                return Err(StoreError::ChainTooLong {
                    key: key.clone(),
                    limit: self.max_chain_length,
                });
            }

            let Some((index, delta)) = self.find_delta_excluding(&current, excluded)? else {
                return Err(if chain.is_empty() {
                    StoreError::NotFound(current)
                } else {
                    StoreError::BrokenChain {
                        key: key.clone(),
                        missing: current,
                    }
                });
            };

            let next = delta.base.clone();
            chain.push((index, delta));
            match next {
                Some(base) => current = base,
                None => {
                    trace!(key = %key, length = chain.len(), "chain resolved");
                    return Ok(chain);
                }
            }
        }
    }

    /// Skip past a per-store failure, or hand back anything harder.
    fn absorb(&self, store: &dyn DataStore, key: &Key, err: StoreError) -> StoreResult<()> {
        if err.is_not_found() {
            return Ok(());
        }
        if !err.is_soft() {
            return Err(err);
        }
        self.record(store, key, &err);
        Ok(())
    }

    fn record(&self, store: &dyn DataStore, key: &Key, err: &StoreError) {
        warn!(store = store.name(), key = %key, error = %err, "skipping store");
        if let Some(counter) = self.soft_failures {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Replay `chain` from its snapshot outward.
///
/// On failure returns the position in `chain` of the hop that could not be
/// rebuilt.
fn rebuild(chain: &[(usize, Delta)]) -> Result<Vec<u8>, (usize, StoreError)> {
    let Some(((_, snapshot), deltas)) = chain.split_last() else {
        return Ok(Vec::new());
    };

    let mut text = snapshot.data.clone();
    check_size(snapshot, &text).map_err(|e| (deltas.len(), e))?;
    for (hop, (_, delta)) in deltas.iter().enumerate().rev() {
        text = dpk_diff::apply_delta(&text, &delta.data).map_err(|e| {
            (
                hop,
                StoreError::corrupt(&delta.key, format!("cannot apply delta: {e}")),
            )
        })?;
        check_size(delta, &text).map_err(|e| (hop, e))?;
    }
    Ok(text)
}

/// The key whose absence an error reports, if any.
fn missing_key(err: &StoreError) -> Option<&Key> {
    match err {
        StoreError::NotFound(key) => Some(key),
        StoreError::BrokenChain { missing, .. } => Some(missing),
        _ => None,
    }
}

fn check_size(delta: &Delta, text: &[u8]) -> StoreResult<()> {
    match delta.metadata.size {
        Some(size) if size != text.len() as u64 => Err(StoreError::corrupt(
            &delta.key,
            format!("reconstructed {} bytes, metadata says {size}", text.len()),
        )),
        _ => Ok(()),
    }
}
