//! Patch resolution across ordered archive overlays
//!
//! An [`ArchiveSet`] opens a base archive plus any number of patch archives
//! in increasing priority. Shadowing is file-granular: a patch ships the
//! complete replacement asset, never a binary diff. The override chain is
//! flattened once at open time into a single path index, so lookups stay
//! O(1) amortized instead of walking the chain per request.

use crate::error::Result;
use crate::format::AssetEntry;
use crate::reader::Archive;
use std::collections::HashMap;
use std::path::Path;

/// Ordered collection of archives, later entries overriding earlier ones.
pub struct ArchiveSet {
    archives: Vec<Archive>,
    /// Logical path -> (archive index, entry index), highest priority wins.
    resolved: HashMap<String, (usize, usize)>,
}

impl ArchiveSet {
    /// Open archives in priority order (base first, patches after).
    ///
    /// Fails outright if any archive's header or table is unreadable; a
    /// partial set would silently un-shadow stale assets.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut archives = Vec::with_capacity(paths.len());
        for path in paths {
            archives.push(Archive::open(path)?);
        }

        let mut resolved = HashMap::new();
        for (archive_idx, archive) in archives.iter().enumerate() {
            for (entry_idx, entry) in archive.entries().iter().enumerate() {
                // Later archives win; iteration order makes the last write
                // the highest-priority one.
                resolved.insert(entry.path.clone(), (archive_idx, entry_idx));
            }
        }

        tracing::debug!(
            archives = archives.len(),
            assets = resolved.len(),
            "resolved archive set"
        );

        Ok(ArchiveSet { archives, resolved })
    }

    /// Number of archives in the set.
    pub fn archive_count(&self) -> usize {
        self.archives.len()
    }

    /// Number of distinct logical paths after shadowing.
    pub fn asset_count(&self) -> usize {
        self.resolved.len()
    }

    /// Archives in priority order.
    pub fn archives(&self) -> &[Archive] {
        &self.archives
    }

    /// Resolve a logical path to its winning entry and owning archive.
    pub fn lookup(&self, path: &str) -> Option<(&Archive, &AssetEntry)> {
        self.resolved.get(path).map(|&(archive_idx, entry_idx)| {
            let archive = &self.archives[archive_idx];
            (archive, &archive.entries()[entry_idx])
        })
    }

    /// Read and decompress the winning entry for `path`.
    ///
    /// `Ok(None)` means no archive contains the path, which is a normal
    /// result for the caller to handle, distinct from a corrupt asset.
    pub fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.lookup(path) {
            Some((archive, entry)) => archive.read_and_decompress(entry).map(Some),
            None => Ok(None),
        }
    }

    /// All resolved logical paths, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.resolved.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use crate::writer::ArchiveWriter;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn build(dir: &TempDir, name: &str, assets: &[(&str, &[u8])]) -> PathBuf {
        let mut writer = ArchiveWriter::new(64).unwrap();
        for (path, data) in assets {
            writer
                .add_asset(path, data.to_vec(), Codec::Store, None)
                .unwrap();
        }
        let path = dir.path().join(name);
        writer.write_to(&path).unwrap();
        path
    }

    #[test]
    fn test_patch_shadows_base() {
        let dir = TempDir::new().unwrap();
        let base = build(&dir, "base.arcv", &[("p.txt", b"X"), ("only_base.txt", b"B")]);
        let patch = build(&dir, "patch.arcv", &[("p.txt", b"Y")]);

        let set = ArchiveSet::open(&[&base, &patch]).unwrap();
        assert_eq!(set.archive_count(), 2);
        assert_eq!(set.asset_count(), 2);

        let (archive, entry) = set.lookup("p.txt").unwrap();
        assert_eq!(archive.path(), patch.as_path());
        assert_eq!(entry.uncompressed_size, 1);
        assert_eq!(set.read("p.txt").unwrap().unwrap(), b"Y");

        // Un-shadowed assets still resolve to the base.
        assert_eq!(set.read("only_base.txt").unwrap().unwrap(), b"B");
    }

    #[test]
    fn test_later_patch_wins() {
        let dir = TempDir::new().unwrap();
        let a = build(&dir, "a.arcv", &[("p.txt", b"1")]);
        let b = build(&dir, "b.arcv", &[("p.txt", b"2")]);
        let c = build(&dir, "c.arcv", &[("p.txt", b"3")]);

        let set = ArchiveSet::open(&[&a, &b, &c]).unwrap();
        assert_eq!(set.read("p.txt").unwrap().unwrap(), b"3");
    }

    #[test]
    fn test_patch_only_asset() {
        let dir = TempDir::new().unwrap();
        let base = build(&dir, "base.arcv", &[("a.txt", b"A")]);
        let patch = build(&dir, "patch.arcv", &[("new.txt", b"N")]);

        let set = ArchiveSet::open(&[&base, &patch]).unwrap();
        assert_eq!(set.read("new.txt").unwrap().unwrap(), b"N");
    }

    #[test]
    fn test_not_found_is_none() {
        let dir = TempDir::new().unwrap();
        let base = build(&dir, "base.arcv", &[("a.txt", b"A")]);

        let set = ArchiveSet::open(&[&base]).unwrap();
        assert!(set.lookup("nope.txt").is_none());
        assert!(set.read("nope.txt").unwrap().is_none());
    }

    #[test]
    fn test_open_fails_on_broken_archive() {
        let dir = TempDir::new().unwrap();
        let base = build(&dir, "base.arcv", &[("a.txt", b"A")]);
        let broken = dir.path().join("broken.arcv");
        std::fs::write(&broken, b"not an archive").unwrap();

        assert!(ArchiveSet::open(&[&base, &broken]).is_err());
    }
}
