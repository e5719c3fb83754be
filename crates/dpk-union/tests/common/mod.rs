//! Shared fixtures: real pack files in a temp directory, delta helpers, and a
//! fake host store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};

use dpk_diff::compute_delta;
use dpk_pack::{pack_paths, PackWriter};
use dpk_store::{HostDelta, HostError, HostStore};
use dpk_types::{Key, Node};

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Key for one revision of `path`, named after its full text.
pub fn rev(path: &str, text: &str) -> Key {
    Key::new(path, Node::for_content(text.as_bytes()))
}

/// One entry to put in a pack.
pub enum Entry<'a> {
    /// Full snapshot of `text`.
    Full(&'a str),
    /// `text` stored as a delta against `base`.
    Delta { base: &'a str, text: &'a str },
}

/// Write `<dir>/<name>.datapack` and `.dataidx` holding `entries` for `path`.
pub fn write_pack(dir: &Path, name: &str, path: &str, entries: &[Entry<'_>]) -> PathBuf {
    let base = dir.join(name);
    let mut writer = PackWriter::new(&base);
    for entry in entries {
        match *entry {
            Entry::Full(text) => writer.add_full(rev(path, text), text.as_bytes()).unwrap(),
            Entry::Delta { base, text } => writer
                .add_delta(
                    rev(path, text),
                    rev(path, base),
                    &compute_delta(base.as_bytes(), text.as_bytes()),
                    text.len() as u64,
                )
                .unwrap(),
        }
    }
    writer.finish().unwrap();
    base
}

/// Overwrite the data file of the pack at `base` with garbage of equal length.
pub fn scramble_data(base: &Path) {
    let (data_path, _) = pack_paths(base);
    let len = std::fs::metadata(&data_path).unwrap().len() as usize;
    std::fs::write(&data_path, vec![0xEE; len]).unwrap();
}

/// Host store backed by a map, with a switch to simulate an unreachable host.
#[derive(Default)]
pub struct FakeHost {
    entries: Mutex<HashMap<Key, HostDelta>>,
    offline: Mutex<bool>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_full(&self, key: Key, text: &str) {
        self.entries.lock().unwrap().insert(
            key,
            HostDelta {
                base: None,
                data: text.as_bytes().to_vec(),
                size: Some(text.len() as u64),
                flags: 0,
            },
        );
    }

    pub fn insert_delta(&self, key: Key, base: Key, base_text: &str, text: &str) {
        self.entries.lock().unwrap().insert(
            key,
            HostDelta {
                base: Some(base),
                data: compute_delta(base_text.as_bytes(), text.as_bytes()),
                size: Some(text.len() as u64),
                flags: 0,
            },
        );
    }

    pub fn insert_raw(&self, key: Key, delta: HostDelta) {
        self.entries.lock().unwrap().insert(key, delta);
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    fn check(&self) -> Result<(), HostError> {
        if *self.offline.lock().unwrap() {
            Err(HostError::Unreachable("host went away".into()))
        } else {
            Ok(())
        }
    }
}

impl HostStore for FakeHost {
    fn contains(&self, key: &Key) -> Result<bool, HostError> {
        self.check()?;
        Ok(self.entries.lock().unwrap().contains_key(key))
    }

    fn get_delta(&self, key: &Key) -> Result<HostDelta, HostError> {
        self.check()?;
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(HostError::Missing)
    }

    fn get_delta_chain_base(&self, key: &Key) -> Result<Option<Key>, HostError> {
        Ok(self.get_delta(key)?.base)
    }
}
