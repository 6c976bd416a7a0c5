//! Single-archive reader
//!
//! Opens an archive file, parses the header and tables into memory, and
//! leaves payload bytes on disk until an entry is actually requested. The
//! file handle is read-only; seek+read runs as one logical operation under
//! a narrow lock, and checksum verification plus decompression happen
//! outside it.

use crate::codec;
use crate::error::{ArchiveError, Result};
use crate::format::{AssetEntry, Dictionary, Header, HEADER_SIZE, NO_DICTIONARY};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Read-only view of one archive file.
#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    file: Mutex<File>,
    header: Header,
    entries: Vec<AssetEntry>,
    index: HashMap<String, usize>,
    dictionaries: HashMap<u16, Vec<u8>>,
}

impl Archive {
    /// Open an archive and parse its header and tables.
    ///
    /// Payload bytes are not read here. A damaged header or table fails
    /// with [`ArchiveError::CorruptArchiveHeader`] so callers can tell a
    /// broken archive file from a broken asset inside an intact one.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;

        let mut header_bytes = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_bytes).map_err(|e| corrupt_header(&path, e))?;
        let header = Header::from_bytes(&header_bytes)?;

        let file_len = file.metadata()?.len();
        if header.table_len > file_len.saturating_sub(HEADER_SIZE as u64) {
            return Err(ArchiveError::CorruptArchiveHeader {
                archive: path,
                detail: format!(
                    "table length {} exceeds file size {}",
                    header.table_len, file_len
                ),
            });
        }

        let mut table = vec![0u8; header.table_len as usize];
        file.read_exact(&mut table).map_err(|e| corrupt_header(&path, e))?;

        if crc32fast::hash(&table) != header.table_crc32 {
            return Err(ArchiveError::CorruptArchiveHeader {
                archive: path,
                detail: "table checksum mismatch".to_string(),
            });
        }

        let mut cursor = 0;
        let mut dictionaries = HashMap::with_capacity(header.dictionary_count as usize);
        for _ in 0..header.dictionary_count {
            let dict = Dictionary::read_record(&table, &mut cursor)
                .map_err(|detail| ArchiveError::CorruptArchiveHeader {
                    archive: path.clone(),
                    detail,
                })?;
            dictionaries.insert(dict.id, dict.bytes);
        }

        let mut entries = Vec::with_capacity(header.entry_count as usize);
        let mut index = HashMap::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            let entry = AssetEntry::read_record(&table, &mut cursor)
                .map_err(|detail| ArchiveError::CorruptArchiveHeader {
                    archive: path.clone(),
                    detail,
                })?;
            index.insert(entry.path.clone(), entries.len());
            entries.push(entry);
        }

        tracing::debug!(
            archive = %path.display(),
            entries = entries.len(),
            dictionaries = dictionaries.len(),
            "opened archive"
        );

        Ok(Archive {
            path,
            file: Mutex::new(file),
            header,
            entries,
            index,
            dictionaries,
        })
    }

    /// Path of the underlying archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Archive header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Entries in table (insertion) order.
    pub fn entries(&self) -> &[AssetEntry] {
        &self.entries
    }

    /// Find an entry by logical path.
    pub fn lookup(&self, path: &str) -> Option<&AssetEntry> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    /// Embedded dictionary bytes by id.
    pub fn dictionary(&self, id: u16) -> Option<&[u8]> {
        self.dictionaries.get(&id).map(Vec::as_slice)
    }

    /// Read an entry's payload, verify its checksum, and decompress it.
    pub fn read_and_decompress(&self, entry: &AssetEntry) -> Result<Vec<u8>> {
        let compressed = self.read_payload(entry)?;

        if crc32fast::hash(&compressed) != entry.checksum {
            return Err(ArchiveError::CorruptAsset {
                archive: self.path.clone(),
                path: entry.path.clone(),
                detail: "checksum mismatch on compressed payload".to_string(),
            });
        }

        let dict = if entry.dictionary_id != NO_DICTIONARY {
            Some(self.dictionary(entry.dictionary_id).ok_or_else(|| {
                ArchiveError::MissingDictionary {
                    archive: self.path.clone(),
                    path: entry.path.clone(),
                    dictionary_id: entry.dictionary_id,
                }
            })?)
        } else {
            None
        };

        codec::decompress(
            &compressed,
            entry.codec,
            entry.uncompressed_size as usize,
            dict,
        )
        .map_err(|e| ArchiveError::CorruptAsset {
            archive: self.path.clone(),
            path: entry.path.clone(),
            detail: e.to_string(),
        })
    }

    /// Verify every entry's payload checksum without decompressing.
    ///
    /// Returns the paths that failed, empty if the archive is clean.
    pub fn verify(&self) -> Result<Vec<String>> {
        let mut bad = Vec::new();
        for entry in &self.entries {
            let compressed = self.read_payload(entry)?;
            if crc32fast::hash(&compressed) != entry.checksum {
                bad.push(entry.path.clone());
            }
        }
        Ok(bad)
    }

    fn read_payload(&self, entry: &AssetEntry) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; entry.compressed_size as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(entry.offset))?;
            file.read_exact(&mut buffer)?;
        }
        Ok(buffer)
    }
}

fn corrupt_header(path: &Path, err: std::io::Error) -> ArchiveError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ArchiveError::CorruptArchiveHeader {
            archive: path.to_path_buf(),
            detail: "file truncated before end of table".to_string(),
        }
    } else {
        ArchiveError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use crate::writer::ArchiveWriter;
    use tempfile::TempDir;

    fn build_sample(dir: &TempDir) -> PathBuf {
        let mut writer = ArchiveWriter::new(64).unwrap();
        writer.add_dictionary(1, b"shader shader shader".to_vec()).unwrap();
        writer
            .add_asset("a.txt", b"hello archive".to_vec(), Codec::Store, None)
            .unwrap();
        writer
            .add_asset("b.bin", vec![42u8; 9000], Codec::Lz4, None)
            .unwrap();
        writer
            .add_asset("s.bin", b"shader shader main".to_vec(), Codec::ZstdDict, Some(1))
            .unwrap();

        let path = dir.path().join("sample.arcv");
        writer.write_to(&path).unwrap();
        path
    }

    #[test]
    fn test_open_and_lookup() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::open(build_sample(&dir)).unwrap();

        assert_eq!(archive.entries().len(), 3);
        assert!(archive.lookup("a.txt").is_some());
        assert!(archive.lookup("missing.txt").is_none());

        // Insertion order preserved in the table.
        let order: Vec<_> = archive.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(order, ["a.txt", "b.bin", "s.bin"]);
    }

    #[test]
    fn test_read_and_decompress() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::open(build_sample(&dir)).unwrap();

        let entry = archive.lookup("b.bin").unwrap();
        assert_eq!(entry.codec, Codec::Lz4);
        let bytes = archive.read_and_decompress(entry).unwrap();
        assert_eq!(bytes, vec![42u8; 9000]);

        let entry = archive.lookup("s.bin").unwrap();
        assert_eq!(entry.codec, Codec::ZstdDict);
        assert_eq!(entry.dictionary_id, 1);
        let bytes = archive.read_and_decompress(entry).unwrap();
        assert_eq!(bytes, b"shader shader main");
    }

    #[test]
    fn test_archive_is_debuggable() {
        // Callers routinely format open results, e.g. unwrap_err() in
        // error-path assertions.
        let dir = TempDir::new().unwrap();
        let archive = Archive::open(build_sample(&dir)).unwrap();
        let rendered = format!("{:?}", archive);
        assert!(rendered.contains("Archive"));
    }

    #[test]
    fn test_verify_clean_archive() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::open(build_sample(&dir)).unwrap();
        assert!(archive.verify().unwrap().is_empty());
    }

    #[test]
    fn test_missing_dictionary_is_distinct() {
        // Hand-build an entry referencing a dictionary the archive lacks.
        let dir = TempDir::new().unwrap();
        let archive = Archive::open(build_sample(&dir)).unwrap();

        let mut entry = archive.lookup("s.bin").unwrap().clone();
        entry.dictionary_id = 99;
        let err = archive.read_and_decompress(&entry).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MissingDictionary { dictionary_id: 99, .. }
        ));
    }
}
