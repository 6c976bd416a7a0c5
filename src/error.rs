use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Invalid magic number in header")]
    InvalidMagic,

    #[error("Unsupported format version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Invalid alignment: {0} (must be a non-zero power of two)")]
    InvalidAlignment(u32),

    #[error("Corrupt archive header in {archive}: {detail}")]
    CorruptArchiveHeader { archive: PathBuf, detail: String },

    #[error("Corrupt asset '{path}' in {archive}: {detail}")]
    CorruptAsset {
        archive: PathBuf,
        path: String,
        detail: String,
    },

    #[error("Missing dictionary {dictionary_id} for asset '{path}' in {archive}")]
    MissingDictionary {
        archive: PathBuf,
        path: String,
        dictionary_id: u16,
    },

    #[error("Duplicate asset path: {0}")]
    DuplicatePath(String),

    #[error("Duplicate dictionary id: {0}")]
    DuplicateDictionary(u16),

    #[error("Unknown dictionary id: {0}")]
    UnknownDictionary(u16),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
