//! On-disk archive layout
//!
//! An archive file is laid out as:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Fixed header (36 bytes)                     │
//! │  - Magic: "ARCV\x00\x01\x00\x00"            │
//! │  - Version, alignment, counts               │
//! │  - Table length + table CRC32               │
//! ├─────────────────────────────────────────────┤
//! │ Dictionary table                            │
//! │  - (id: u16, len: u32, bytes)               │
//! ├─────────────────────────────────────────────┤
//! │ Entry table (insertion order)               │
//! │  - path, offset, sizes, codec, dict, crc    │
//! ├─────────────────────────────────────────────┤
//! │ Payload region                              │
//! │  - compressed bytes, each entry starting    │
//! │    at an alignment-padded offset            │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The table CRC covers the dictionary and
//! entry tables so that a damaged table is reported as a broken archive,
//! distinct from a damaged asset payload.

use crate::codec::Codec;
use crate::error::{ArchiveError, Result};

pub const MAGIC: [u8; 8] = *b"ARCV\x00\x01\x00\x00";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

/// Size of the fixed header preceding the table.
pub const HEADER_SIZE: usize = 36;

/// Dictionary id meaning "no dictionary".
pub const NO_DICTIONARY: u16 = u16::MAX;

/// Default payload alignment. Larger values trade file size for aligned
/// reads and more stable offsets across rebuilds.
pub const DEFAULT_ALIGNMENT: u32 = 64;

/// Fixed archive header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version_major: u16,
    pub version_minor: u16,

    /// Payload alignment in bytes (power of two).
    pub alignment: u32,

    /// Number of embedded dictionaries.
    pub dictionary_count: u32,

    /// Number of asset entries.
    pub entry_count: u32,

    /// Length in bytes of the dictionary + entry tables.
    pub table_len: u64,

    /// CRC32 over the serialized tables.
    pub table_crc32: u32,
}

impl Header {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&self.version_major.to_le_bytes());
        bytes.extend_from_slice(&self.version_minor.to_le_bytes());
        bytes.extend_from_slice(&self.alignment.to_le_bytes());
        bytes.extend_from_slice(&self.dictionary_count.to_le_bytes());
        bytes.extend_from_slice(&self.entry_count.to_le_bytes());
        bytes.extend_from_slice(&self.table_len.to_le_bytes());
        bytes.extend_from_slice(&self.table_crc32.to_le_bytes());
        debug_assert_eq!(bytes.len(), HEADER_SIZE);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ArchiveError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Insufficient bytes for header",
            )));
        }

        if bytes[0..8] != MAGIC {
            return Err(ArchiveError::InvalidMagic);
        }

        let version_major = u16::from_le_bytes([bytes[8], bytes[9]]);
        let version_minor = u16::from_le_bytes([bytes[10], bytes[11]]);
        if version_major != VERSION_MAJOR {
            return Err(ArchiveError::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
            });
        }

        let alignment = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        if !alignment.is_power_of_two() {
            return Err(ArchiveError::InvalidAlignment(alignment));
        }

        Ok(Header {
            version_major,
            version_minor,
            alignment,
            dictionary_count: u32::from_le_bytes(bytes[16..20].try_into().unwrap()),
            entry_count: u32::from_le_bytes(bytes[20..24].try_into().unwrap()),
            table_len: u64::from_le_bytes(bytes[24..32].try_into().unwrap()),
            table_crc32: u32::from_le_bytes(bytes[32..36].try_into().unwrap()),
        })
    }
}

/// One asset entry in the archive table.
///
/// Immutable once the archive is built; the checksum covers the compressed
/// payload bytes so storage corruption is caught before decompression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    /// Logical path, unique within an archive. Forward slashes.
    pub path: String,

    /// Absolute byte offset of the compressed payload (aligned).
    pub offset: u64,

    /// Compressed payload size in bytes.
    pub compressed_size: u64,

    /// Uncompressed size in bytes; decompression must produce exactly this.
    pub uncompressed_size: u64,

    /// Payload codec.
    pub codec: Codec,

    /// Dictionary id, or [`NO_DICTIONARY`].
    pub dictionary_id: u16,

    /// CRC32 of the compressed payload bytes.
    pub checksum: u32,
}

impl AssetEntry {
    /// Serialized size of this entry's table record.
    pub fn record_len(path: &str) -> usize {
        2 + path.len() + 8 + 8 + 8 + 1 + 2 + 4
    }

    pub fn write_record(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.path.len() as u16).to_le_bytes());
        out.extend_from_slice(self.path.as_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.compressed_size.to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        out.push(self.codec as u8);
        out.extend_from_slice(&self.dictionary_id.to_le_bytes());
        out.extend_from_slice(&self.checksum.to_le_bytes());
    }

    /// Parse one record at `cursor`, advancing it past the record.
    ///
    /// Returns a plain string describing the problem on malformed input;
    /// the caller attaches archive identity.
    pub fn read_record(bytes: &[u8], cursor: &mut usize) -> std::result::Result<Self, String> {
        let path_len = read_u16(bytes, cursor)? as usize;
        if bytes.len() < *cursor + path_len {
            return Err("truncated entry path".into());
        }
        let path = std::str::from_utf8(&bytes[*cursor..*cursor + path_len])
            .map_err(|_| "entry path is not valid UTF-8".to_string())?
            .to_string();
        *cursor += path_len;

        let offset = read_u64(bytes, cursor)?;
        let compressed_size = read_u64(bytes, cursor)?;
        let uncompressed_size = read_u64(bytes, cursor)?;
        let codec_tag = read_u8(bytes, cursor)?;
        let codec =
            Codec::from_u8(codec_tag).ok_or_else(|| format!("unknown codec tag {}", codec_tag))?;
        let dictionary_id = read_u16(bytes, cursor)?;
        let checksum = read_u32(bytes, cursor)?;

        Ok(AssetEntry {
            path,
            offset,
            compressed_size,
            uncompressed_size,
            codec,
            dictionary_id,
            checksum,
        })
    }
}

/// Embedded dictionary record: id plus raw dictionary bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    pub id: u16,
    pub bytes: Vec<u8>,
}

impl Dictionary {
    pub fn record_len(&self) -> usize {
        2 + 4 + self.bytes.len()
    }

    pub fn write_record(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&(self.bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.bytes);
    }

    pub fn read_record(bytes: &[u8], cursor: &mut usize) -> std::result::Result<Self, String> {
        let id = read_u16(bytes, cursor)?;
        let len = read_u32(bytes, cursor)? as usize;
        if bytes.len() < *cursor + len {
            return Err("truncated dictionary bytes".into());
        }
        let dict = bytes[*cursor..*cursor + len].to_vec();
        *cursor += len;
        Ok(Dictionary { id, bytes: dict })
    }
}

/// Round `offset` up to the next multiple of `alignment`.
pub fn align_up(offset: u64, alignment: u32) -> u64 {
    let a = alignment as u64;
    (offset + a - 1) & !(a - 1)
}

fn read_u8(bytes: &[u8], cursor: &mut usize) -> std::result::Result<u8, String> {
    if bytes.len() < *cursor + 1 {
        return Err("truncated table".into());
    }
    let v = bytes[*cursor];
    *cursor += 1;
    Ok(v)
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> std::result::Result<u16, String> {
    if bytes.len() < *cursor + 2 {
        return Err("truncated table".into());
    }
    let v = u16::from_le_bytes(bytes[*cursor..*cursor + 2].try_into().unwrap());
    *cursor += 2;
    Ok(v)
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> std::result::Result<u32, String> {
    if bytes.len() < *cursor + 4 {
        return Err("truncated table".into());
    }
    let v = u32::from_le_bytes(bytes[*cursor..*cursor + 4].try_into().unwrap());
    *cursor += 4;
    Ok(v)
}

fn read_u64(bytes: &[u8], cursor: &mut usize) -> std::result::Result<u64, String> {
    if bytes.len() < *cursor + 8 {
        return Err("truncated table".into());
    }
    let v = u64::from_le_bytes(bytes[*cursor..*cursor + 8].try_into().unwrap());
    *cursor += 8;
    Ok(v)
}
