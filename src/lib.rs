//! Archivist Asset Archive Format
//!
//! A compressed, checksummed asset archive format paired with an adaptive
//! memory-budgeted decompression cache, built for streaming game engines.
//!
//! ## Features
//!
//! - **Four payload codecs**: store, LZ4, Zstd, and Zstd with embedded
//!   dictionaries for families of small similar files
//! - **CRC32 checksums** on every compressed payload and on the table
//!   itself, so disk corruption is distinguishable from packaging bugs
//! - **Aligned payloads** with a configurable power-of-two boundary
//! - **Patch-by-override**: patch archives layered over a base archive
//!   shadow whole assets by logical path, flattened to an O(1) index
//! - **Adaptive cache**: decompressed bytes memoized under a budget derived
//!   from system memory queries, LRU eviction, single-flight loads
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use archivist::{ArchiveSet, ArchiveWriter, AssetCache, Codec};
//! use std::sync::Arc;
//!
//! // Build an archive.
//! let mut writer = ArchiveWriter::new(64)?;
//! writer.add_asset("readme.txt", b"hello".to_vec(), Codec::Zstd, None)?;
//! writer.write_to("base.arcv")?;
//!
//! // Open it (optionally with patch overlays) behind a cache.
//! let set = Arc::new(ArchiveSet::open(&["base.arcv"])?);
//! let cache = AssetCache::new(set, 64 * 1024 * 1024);
//!
//! if let Some(bytes) = cache.get("readme.txt")? {
//!     assert_eq!(&bytes[..], b"hello");
//! }
//! # Ok::<(), archivist::ArchiveError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! caller ──► AssetCache ──► ArchiveSet ──► Archive ──► codec
//!            (budget,        (patch          (lazy       (store/lz4/
//!             single-flight)  shadowing)      payloads)   zstd/dict)
//! ```

pub mod budget;
pub mod cache;
pub mod codec;
pub mod error;
pub mod format;
pub mod policy;
pub mod reader;
pub mod set;
pub mod writer;

// Re-export commonly used types
pub use budget::BudgetConfig;
pub use cache::{AssetBytes, AssetCache, CacheStats};
pub use codec::{Codec, CodecError};
pub use error::{ArchiveError, Result};
pub use format::{AssetEntry, Header, DEFAULT_ALIGNMENT, NO_DICTIONARY};
pub use policy::CodecPolicy;
pub use reader::Archive;
pub use set::ArchiveSet;
pub use writer::ArchiveWriter;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Archive format magic number
pub const MAGIC: &[u8; 8] = &format::MAGIC;
