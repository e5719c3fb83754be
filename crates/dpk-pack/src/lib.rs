//! Immutable pack files for the datapack store.
//!
//! A pack is a pair of files sharing a base path: a data file of
//! zstd-compressed, CRC-checked delta entries, and an index mapping keys to
//! entry locations. Both are memory-mapped and read in place.
//!
//! # Architecture
//!
//! - **Data file** (`.datapack`): header, concatenated entries, BLAKE3 checksum
//! - **Index file** (`.dataidx`): fan-out table + sorted keys for O(log n) lookups
//! - **PackReader**: random-access reading using the index
//! - **DatapackStore**: a lazily opened pack exposed as a [`DataStore`](dpk_store::DataStore)
//! - **PackDirectory**: discovers packs dropped into a directory
//! - **PackWriter** (feature `writer`): builds pack pairs

pub mod directory;
pub mod entry;
pub mod error;
pub mod index;
pub mod reader;
pub mod store;
#[cfg(any(test, feature = "writer"))]
pub mod writer;

pub use directory::PackDirectory;
pub use entry::EntryHeader;
pub use error::{PackError, PackResult};
pub use index::{path_tag, IndexEntry, PackIndex};
pub use reader::{pack_paths, PackBytes, PackReader, DATA_EXTENSION, INDEX_EXTENSION};
pub use store::DatapackStore;
#[cfg(any(test, feature = "writer"))]
pub use writer::{PackFile, PackWriter};

#[cfg(test)]
mod tests {
    use super::*;
    use dpk_store::{DataStore, Delta, StoreError};
    use dpk_types::{Key, Node};
    use std::path::Path;

    fn key(path: &str, content: &[u8]) -> Key {
        Key::new(path, Node::for_content(content))
    }

    fn in_memory(writer: PackWriter) -> PackReader {
        let (data, index) = writer.finish_to_bytes().unwrap();
        PackReader::from_bytes(data, index).unwrap()
    }

    #[test]
    fn write_read_roundtrip_single() {
        let k = key("a.txt", b"hello world");
        let mut writer = PackWriter::new(Path::new("unused"));
        writer.add_full(k.clone(), b"hello world").unwrap();

        let reader = in_memory(writer);
        assert_eq!(reader.entry_count(), 1);
        assert!(reader.contains(&k));

        let delta = reader.read_delta(&k).unwrap().unwrap();
        assert_eq!(delta.key, k);
        assert!(delta.is_full_snapshot());
        assert_eq!(delta.data, b"hello world");
        assert_eq!(delta.metadata.size, Some(11));
    }

    #[test]
    fn write_read_roundtrip_multiple() {
        let keys: Vec<Key> = (0..10)
            .map(|i| key(&format!("f{i}"), format!("entry-{i}").as_bytes()))
            .collect();
        let mut writer = PackWriter::new(Path::new("unused"));
        for (i, k) in keys.iter().enumerate() {
            writer.add_full(k.clone(), format!("entry-{i}").as_bytes()).unwrap();
        }
        assert_eq!(writer.len(), 10);

        let reader = in_memory(writer);
        assert_eq!(reader.entry_count(), 10);
        for (i, k) in keys.iter().enumerate() {
            let delta = reader.read_delta(k).unwrap().unwrap();
            assert_eq!(delta.data, format!("entry-{i}").as_bytes());
        }
        reader.verify().unwrap();
    }

    #[test]
    fn delta_entries_keep_base_and_metadata() {
        let base = key("f", b"v1");
        let child = key("f", b"v2");
        let mut writer = PackWriter::new(Path::new("unused"));
        writer.add_full(base.clone(), b"v1").unwrap();
        writer
            .add_delta(child.clone(), base.clone(), b"\x00\x00\x00\x00\x00\x00\x00\x02\x00\x00\x00\x02v2", 2)
            .unwrap();

        let reader = in_memory(writer);
        let header = reader.read_header(&child).unwrap().unwrap();
        assert_eq!(header.base, *base.node());
        let delta = reader.read_delta(&child).unwrap().unwrap();
        assert_eq!(delta.base, Some(base));
        assert_eq!(delta.metadata.size, Some(2));
    }

    #[test]
    fn pathless_keys_are_separate_from_qualified() {
        let node = Node::for_content(b"shared");
        let mut writer = PackWriter::new(Path::new("unused"));
        writer.add_full(Key::from_node(node), b"bare").unwrap();
        writer.add_full(Key::new("p", node), b"qualified").unwrap();

        let reader = in_memory(writer);
        let bare = reader.read_delta(&Key::from_node(node)).unwrap().unwrap();
        let qualified = reader.read_delta(&Key::new("p", node)).unwrap().unwrap();
        assert_eq!(bare.data, b"bare");
        assert_eq!(qualified.data, b"qualified");
    }

    #[test]
    fn empty_pack() {
        let writer = PackWriter::new(Path::new("unused"));
        assert!(writer.is_empty());
        let reader = in_memory(writer);
        assert_eq!(reader.entry_count(), 0);
        assert!(reader.read_delta(&key("a", b"missing")).unwrap().is_none());
    }

    #[test]
    fn pack_bad_magic() {
        let mut data = vec![0u8; 100];
        data[0..4].copy_from_slice(b"BADM");
        let idx = index::build_index(vec![], [0u8; 32]).unwrap();
        let err = PackReader::from_bytes(data, idx).unwrap_err();
        assert!(matches!(err, PackError::InvalidMagic { .. }));
    }

    #[test]
    fn pack_bad_version() {
        let mut data = vec![0u8; 100];
        data[0..4].copy_from_slice(b"DPKD");
        data[4..8].copy_from_slice(&99u32.to_be_bytes());
        let idx = index::build_index(vec![], [0u8; 32]).unwrap();
        let err = PackReader::from_bytes(data, idx).unwrap_err();
        assert!(matches!(
            err,
            PackError::UnsupportedVersion { version: 99, .. }
        ));
    }

    #[test]
    fn pack_too_short() {
        let idx = index::build_index(vec![], [0u8; 32]).unwrap();
        let err = PackReader::from_bytes(vec![1, 2, 3], idx).unwrap_err();
        assert!(matches!(err, PackError::CorruptEntry { .. }));
    }

    #[test]
    fn index_from_another_pack_is_rejected() {
        let mut one = PackWriter::new(Path::new("unused"));
        one.add_full(key("a", b"1"), b"1").unwrap();
        let (data, _) = one.finish_to_bytes().unwrap();
        let (_, empty_index) = PackWriter::new(Path::new("unused")).finish_to_bytes().unwrap();
        let err = PackReader::from_bytes(data, empty_index).unwrap_err();
        assert!(matches!(err, PackError::IndexCorrupted(_)));
    }

    #[test]
    fn flipped_payload_byte_is_detected() {
        let k = key("a", b"payload");
        let mut writer = PackWriter::new(Path::new("unused"));
        writer.add_full(k.clone(), &[0x5A; 256]).unwrap();
        let (mut data, index) = writer.finish_to_bytes().unwrap();
        // Last byte of the only entry's payload, just before the checksum.
        let at = data.len() - 33;
        data[at] ^= 0xFF;

        let reader = PackReader::from_bytes(data, index).unwrap();
        assert!(reader.contains(&k));
        assert!(matches!(
            reader.read_delta(&k),
            Err(PackError::CrcMismatch { .. })
        ));
        assert!(matches!(reader.verify(), Err(PackError::ChecksumMismatch)));
    }

    #[test]
    fn large_entry_roundtrip() {
        let large = vec![0xABu8; 100_000];
        let k = key("big", &large);
        let mut writer = PackWriter::new(Path::new("unused"));
        writer.add_full(k.clone(), &large).unwrap();
        let (data, index) = writer.finish_to_bytes().unwrap();

        assert!(data.len() < large.len());

        let reader = PackReader::from_bytes(data, index).unwrap();
        assert_eq!(reader.read_delta(&k).unwrap().unwrap().data, large);
    }

    #[test]
    fn disk_roundtrip_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("pack-1");
        let k = key("src/lib.rs", b"disk");

        let mut writer = PackWriter::new(&base);
        writer.add_full(k.clone(), b"disk roundtrip").unwrap();
        let pack = writer.finish().unwrap();
        assert_eq!(pack.entry_count, 1);
        assert!(pack.data_path.ends_with("pack-1.datapack"));
        assert!(pack.index_path.ends_with("pack-1.dataidx"));

        let store = DatapackStore::new(&base);
        assert_eq!(store.name(), "pack-1");
        assert!(!store.is_open());
        assert!(store.exists(&k).unwrap());
        assert!(store.is_open());
        assert_eq!(store.get_delta(&k).unwrap().data, b"disk roundtrip");
        assert_eq!(store.get_delta_chain_base(&k).unwrap(), None);
        assert_eq!(store.get_metadata(&k).unwrap().size, Some(14));
        assert_eq!(store.entry_count().unwrap(), 1);
        store.verify().unwrap();
    }

    #[test]
    fn store_reports_missing_keys_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("pack");
        let mut writer = PackWriter::new(&base);
        writer.add_full(key("a", b"1"), b"1").unwrap();
        writer.finish().unwrap();

        let store = DatapackStore::open(&base).unwrap();
        let missing = key("a", b"2");
        assert!(!store.exists(&missing).unwrap());
        assert!(matches!(
            store.get_delta(&missing),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.get_delta_chain_base(&missing),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn store_chain_base_without_payload() {
        let base = key("f", b"v1");
        let child = key("f", b"v2");
        let mut writer = PackWriter::new(Path::new("unused"));
        writer.add_full(base.clone(), b"v1").unwrap();
        writer.add_delta(child.clone(), base.clone(), b"garbage", 2).unwrap();
        let store = DatapackStore::from_reader("mem", in_memory(writer));
        assert_eq!(store.get_delta_chain_base(&child).unwrap(), Some(base));
    }

    #[test]
    fn missing_files_make_store_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatapackStore::new(dir.path().join("absent"));
        assert!(matches!(
            store.exists(&key("a", b"1")),
            Err(StoreError::Unavailable { .. })
        ));
        assert!(!store.is_open());
        assert!(DatapackStore::open(dir.path().join("absent")).is_err());
    }

    #[test]
    fn garbage_files_make_store_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("junk");
        let (data_path, index_path) = pack_paths(&base);
        std::fs::write(data_path, b"not a pack at all, just some bytes padding it out to length").unwrap();
        std::fs::write(index_path, b"not an index").unwrap();

        let store = DatapackStore::new(&base);
        assert!(matches!(
            store.get_delta(&key("a", b"1")),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn full_delta_from_store_matches_written() {
        let k = key("x", b"x");
        let written = Delta::full(k.clone(), b"contents".to_vec());
        let mut writer = PackWriter::new(Path::new("unused"));
        writer.add(&written).unwrap();
        let store = DatapackStore::from_reader("mem", in_memory(writer));
        assert_eq!(store.get_delta(&k).unwrap(), written);
    }
}
