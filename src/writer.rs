//! Archive builder
//!
//! Collects (path, bytes, codec) tuples plus embedded dictionaries and
//! produces a single archive file. The entry table preserves insertion
//! order and the output is byte-deterministic for identical inputs, so
//! rebuilds diff cleanly and delta patches stay small.

use crate::codec::{self, Codec};
use crate::error::{ArchiveError, Result};
use crate::format::{
    align_up, AssetEntry, Dictionary, Header, HEADER_SIZE, NO_DICTIONARY, VERSION_MAJOR,
    VERSION_MINOR,
};
use std::collections::HashMap;
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

struct PendingAsset {
    path: String,
    data: Vec<u8>,
    codec: Codec,
    dictionary_id: u16,
}

/// Builds one archive file from in-memory inputs.
pub struct ArchiveWriter {
    alignment: u32,
    dictionaries: Vec<Dictionary>,
    dictionary_ids: HashMap<u16, usize>,
    assets: Vec<PendingAsset>,
    paths: HashSet<String>,
}

impl ArchiveWriter {
    /// Create a writer with the given payload alignment (power of two).
    pub fn new(alignment: u32) -> Result<Self> {
        if !alignment.is_power_of_two() {
            return Err(ArchiveError::InvalidAlignment(alignment));
        }
        Ok(ArchiveWriter {
            alignment,
            dictionaries: Vec::new(),
            dictionary_ids: HashMap::new(),
            assets: Vec::new(),
            paths: HashSet::new(),
        })
    }

    /// Embed a dictionary. Ids must be unique and not [`NO_DICTIONARY`].
    pub fn add_dictionary(&mut self, id: u16, bytes: Vec<u8>) -> Result<()> {
        if id == NO_DICTIONARY || self.dictionary_ids.contains_key(&id) {
            return Err(ArchiveError::DuplicateDictionary(id));
        }
        self.dictionary_ids.insert(id, self.dictionaries.len());
        self.dictionaries.push(Dictionary { id, bytes });
        Ok(())
    }

    /// Queue an asset for packing.
    ///
    /// `dictionary_id` must name a previously added dictionary when the
    /// codec requires one, and must be `None` otherwise.
    pub fn add_asset(
        &mut self,
        path: &str,
        data: Vec<u8>,
        codec: Codec,
        dictionary_id: Option<u16>,
    ) -> Result<()> {
        if self.paths.contains(path) {
            return Err(ArchiveError::DuplicatePath(path.to_string()));
        }

        // Validate the codec/dictionary pairing before reserving the path,
        // so a rejected add can be retried under the same path.
        let dictionary_id = match (codec.needs_dictionary(), dictionary_id) {
            (true, Some(id)) => {
                if !self.dictionary_ids.contains_key(&id) {
                    return Err(ArchiveError::UnknownDictionary(id));
                }
                id
            }
            (true, None) => {
                return Err(ArchiveError::Codec(format!(
                    "codec '{}' requires a dictionary for '{}'",
                    codec.name(),
                    path
                )))
            }
            (false, Some(id)) => return Err(ArchiveError::UnknownDictionary(id)),
            (false, None) => NO_DICTIONARY,
        };

        self.paths.insert(path.to_string());
        self.assets.push(PendingAsset {
            path: path.to_string(),
            data,
            codec,
            dictionary_id,
        });
        Ok(())
    }

    /// Number of queued assets.
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Compress all payloads, lay out the file, and write it.
    pub fn write_to<P: AsRef<Path>>(self, path: P) -> Result<()> {
        let bytes = self.into_bytes()?;
        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    }

    /// Assemble the complete archive image in memory.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let ArchiveWriter {
            alignment,
            dictionaries,
            dictionary_ids,
            assets,
            ..
        } = self;

        // Compress every payload up front; offsets depend on the table size,
        // which depends only on paths and dictionary lengths.
        let mut payloads = Vec::with_capacity(assets.len());
        for asset in &assets {
            let dict = (asset.dictionary_id != NO_DICTIONARY).then(|| {
                dictionaries[dictionary_ids[&asset.dictionary_id]]
                    .bytes
                    .as_slice()
            });
            let compressed = codec::compress(&asset.data, asset.codec, dict)
                .map_err(|e| ArchiveError::Codec(format!("'{}': {}", asset.path, e)))?;
            payloads.push(compressed);
        }

        let table_len: usize = dictionaries.iter().map(|d| d.record_len()).sum::<usize>()
            + assets
                .iter()
                .map(|a| AssetEntry::record_len(&a.path))
                .sum::<usize>();

        // Assign aligned payload offsets in insertion order.
        let mut offset = align_up((HEADER_SIZE + table_len) as u64, alignment);
        let mut entries = Vec::with_capacity(assets.len());
        for (asset, compressed) in assets.iter().zip(&payloads) {
            entries.push(AssetEntry {
                path: asset.path.clone(),
                offset,
                compressed_size: compressed.len() as u64,
                uncompressed_size: asset.data.len() as u64,
                codec: asset.codec,
                dictionary_id: asset.dictionary_id,
                checksum: crc32fast::hash(compressed),
            });
            offset = align_up(offset + compressed.len() as u64, alignment);
        }

        let mut table = Vec::with_capacity(table_len);
        for dict in &dictionaries {
            dict.write_record(&mut table);
        }
        for entry in &entries {
            entry.write_record(&mut table);
        }
        debug_assert_eq!(table.len(), table_len);

        let header = Header {
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            alignment,
            dictionary_count: dictionaries.len() as u32,
            entry_count: entries.len() as u32,
            table_len: table_len as u64,
            table_crc32: crc32fast::hash(&table),
        };

        let total = entries
            .last()
            .map(|e| e.offset + e.compressed_size)
            .unwrap_or((HEADER_SIZE + table_len) as u64) as usize;

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&table);
        for (entry, compressed) in entries.iter().zip(&payloads) {
            // Zero padding up to the aligned offset.
            out.resize(entry.offset as usize, 0);
            out.extend_from_slice(compressed);
        }

        Ok(out)
    }
}
