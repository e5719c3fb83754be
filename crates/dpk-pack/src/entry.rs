use dpk_store::DeltaMetadata;
use dpk_types::{Key, Node, NODE_LEN};

use crate::error::{PackError, PackResult};

/// Path length marker for keys without a path qualifier.
pub(crate) const NO_PATH: u16 = u16::MAX;

/// Decoded header of one data-file entry.
///
/// On-disk layout:
/// ```text
/// [u16 BE: path length, 0xFFFF = no path][path bytes]
/// [32 bytes: node][32 bytes: base node, zero = full snapshot]
/// [varint: flags][u8: has size][varint: size, if present]
/// [varint: raw length][varint: compressed length][u32 BE: CRC32 of payload]
/// [zstd payload]
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryHeader {
    pub key: Key,
    pub base: Node,
    pub metadata: DeltaMetadata,
    pub raw_len: u64,
    pub compressed_len: u64,
    pub crc32: u32,
}

impl EntryHeader {
    /// Parse a header from the start of `entry`.
    ///
    /// Returns the header and the position where the payload starts.
    /// `offset` is only used for error reporting.
    pub fn parse(entry: &[u8], offset: u64) -> PackResult<(Self, usize)> {
        let mut cursor = Cursor {
            data: entry,
            pos: 0,
            offset,
        };

        let path_len = u16::from_be_bytes(cursor.array::<2>("path length")?);
        let path = if path_len == NO_PATH {
            None
        } else {
            let bytes = cursor.take(path_len as usize, "path")?;
            let path = std::str::from_utf8(bytes).map_err(|_| corrupt(offset, "path is not UTF-8"))?;
            Some(path.to_string())
        };

        let node = Node::from_hash(cursor.array::<NODE_LEN>("node")?);
        let base = Node::from_hash(cursor.array::<NODE_LEN>("base node")?);

        let flags = cursor.varint("flags")?;
        let size = match cursor.array::<1>("size marker")?[0] {
            0 => None,
            1 => Some(cursor.varint("size")?),
            other => return Err(corrupt(offset, format!("bad size marker {other}"))),
        };

        let raw_len = cursor.varint("raw length")?;
        let compressed_len = cursor.varint("compressed length")?;
        let crc32 = u32::from_be_bytes(cursor.array::<4>("crc")?);

        let key = match path {
            Some(path) => Key::new(path, node),
            None => Key::from_node(node),
        };

        Ok((
            Self {
                key,
                base,
                metadata: DeltaMetadata { size, flags },
                raw_len,
                compressed_len,
                crc32,
            },
            cursor.pos,
        ))
    }

    /// Append the encoded header to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self.key.path() {
            Some(path) => {
                buf.extend_from_slice(&(path.len() as u16).to_be_bytes());
                buf.extend_from_slice(path.as_bytes());
            }
            None => buf.extend_from_slice(&NO_PATH.to_be_bytes()),
        }
        buf.extend_from_slice(self.key.node().as_bytes());
        buf.extend_from_slice(self.base.as_bytes());
        encode_varint(buf, self.metadata.flags);
        match self.metadata.size {
            Some(size) => {
                buf.push(1);
                encode_varint(buf, size);
            }
            None => buf.push(0),
        }
        encode_varint(buf, self.raw_len);
        encode_varint(buf, self.compressed_len);
        buf.extend_from_slice(&self.crc32.to_be_bytes());
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    offset: u64,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize, what: &str) -> PackResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| corrupt(self.offset, format!("truncated {what}")))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self, what: &str) -> PackResult<[u8; N]> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N, what)?);
        Ok(arr)
    }

    fn varint(&mut self, what: &str) -> PackResult<u64> {
        let (value, consumed) = decode_varint(&self.data[self.pos..])
            .map_err(|_| corrupt(self.offset, format!("bad varint for {what}")))?;
        self.pos += consumed;
        Ok(value)
    }
}

fn corrupt(offset: u64, reason: impl Into<String>) -> PackError {
    PackError::CorruptEntry {
        offset,
        reason: reason.into(),
    }
}

/// Encode a u64 as a variable-length integer.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a variable-length integer. Returns (value, bytes_consumed).
pub(crate) fn decode_varint(data: &[u8]) -> PackResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        if shift >= 64 {
            return Err(corrupt(0, "varint overflow"));
        }
    }
    Err(corrupt(0, "truncated varint"))
}
