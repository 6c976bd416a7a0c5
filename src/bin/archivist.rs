//! Archivist build tool
//!
//! Thin CLI over the archive writer/reader: pack a directory tree into an
//! archive under a codec policy, extract an archive back to files, verify
//! checksums, and print per-entry metadata.

use anyhow::{bail, Context};
use archivist::{Archive, ArchiveWriter, CodecPolicy, NO_DICTIONARY};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "archivist", version, about = "Asset archive build tool")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an archive from a directory tree
    Pack {
        /// Directory to pack
        input: PathBuf,
        /// Output archive file
        output: PathBuf,
        /// Codec policy TOML file (default policy otherwise)
        #[arg(short, long)]
        policy: Option<PathBuf>,
    },
    /// Extract an archive's contents to a directory
    Unpack {
        /// Archive file
        archive: PathBuf,
        /// Output directory
        output: PathBuf,
    },
    /// Verify every payload checksum and report corruption
    Verify {
        /// Archive file
        archive: PathBuf,
    },
    /// Print per-entry metadata
    List {
        /// Archive file
        archive: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("archivist=warn"),
        1 => EnvFilter::new("archivist=info"),
        _ => EnvFilter::new("archivist=debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Commands::Pack {
            input,
            output,
            policy,
        } => pack(&input, &output, policy.as_deref()),
        Commands::Unpack { archive, output } => unpack(&archive, &output),
        Commands::Verify { archive } => verify(&archive),
        Commands::List { archive } => list(&archive),
    }
}

fn pack(input: &Path, output: &Path, policy_path: Option<&Path>) -> anyhow::Result<()> {
    let policy = match policy_path {
        Some(path) => CodecPolicy::load(path)
            .with_context(|| format!("loading policy {}", path.display()))?,
        None => CodecPolicy::default(),
    };

    let mut writer = ArchiveWriter::new(policy.alignment)?;
    for dict in &policy.dictionaries {
        let bytes = std::fs::read(&dict.path)
            .with_context(|| format!("reading dictionary {}", dict.path.display()))?;
        writer.add_dictionary(dict.id, bytes)?;
    }

    let mut files = Vec::new();
    collect_files(input, &mut files)?;
    // Stable input order keeps rebuilds byte-identical.
    files.sort();

    for file in &files {
        let logical = file
            .strip_prefix(input)
            .expect("collected under input root")
            .to_string_lossy()
            .replace('\\', "/");
        let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
        let (codec, dictionary) = policy.rule_for(&logical);
        writer.add_asset(&logical, data, codec, dictionary)?;
    }

    let count = writer.asset_count();
    writer.write_to(output)?;
    println!("packed {} assets into {}", count, output.display());
    Ok(())
}

fn unpack(archive_path: &Path, output: &Path) -> anyhow::Result<()> {
    let archive = Archive::open(archive_path)?;
    for entry in archive.entries() {
        if !is_safe_extract_path(&entry.path) {
            bail!(
                "refusing to extract '{}' from {}: path escapes the output directory",
                entry.path,
                archive_path.display()
            );
        }
        let bytes = archive.read_and_decompress(entry)?;
        let dest = output.join(&entry.path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, bytes).with_context(|| format!("writing {}", dest.display()))?;
    }
    println!(
        "extracted {} assets into {}",
        archive.entries().len(),
        output.display()
    );
    Ok(())
}

fn verify(archive_path: &Path) -> anyhow::Result<()> {
    let archive = Archive::open(archive_path)?;
    let bad = archive.verify()?;
    if bad.is_empty() {
        println!(
            "{}: {} entries, all checksums OK",
            archive_path.display(),
            archive.entries().len()
        );
        Ok(())
    } else {
        for path in &bad {
            eprintln!("CORRUPT: {}", path);
        }
        bail!("{} corrupt entries in {}", bad.len(), archive_path.display());
    }
}

fn list(archive_path: &Path) -> anyhow::Result<()> {
    let archive = Archive::open(archive_path)?;
    let header = archive.header();
    println!(
        "{}: {} entries, {} dictionaries, alignment {}",
        archive_path.display(),
        header.entry_count,
        header.dictionary_count,
        header.alignment
    );
    println!(
        "{:<40} {:>12} {:>12} {:>10} {:>6} {:>10}",
        "path", "compressed", "raw", "codec", "dict", "offset"
    );
    for entry in archive.entries() {
        let dict = if entry.dictionary_id == NO_DICTIONARY {
            "-".to_string()
        } else {
            entry.dictionary_id.to_string()
        };
        println!(
            "{:<40} {:>12} {:>12} {:>10} {:>6} {:>10}",
            entry.path,
            entry.compressed_size,
            entry.uncompressed_size,
            entry.codec.name(),
            dict,
            entry.offset
        );
    }
    Ok(())
}

/// True if a logical path stays inside the extraction root: non-empty,
/// relative, and free of parent-directory components. Archives from
/// untrusted sources must not write outside the output directory.
fn is_safe_extract_path(logical: &str) -> bool {
    use std::path::Component;
    !logical.is_empty()
        && Path::new(logical)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for dir_entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = dir_entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_extract_paths() {
        assert!(is_safe_extract_path("a.txt"));
        assert!(is_safe_extract_path("textures/stone.dds"));
        assert!(is_safe_extract_path("./nested/ok.bin"));
    }

    #[test]
    fn test_unsafe_extract_paths_rejected() {
        assert!(!is_safe_extract_path(""));
        assert!(!is_safe_extract_path("../evil"));
        assert!(!is_safe_extract_path("a/../../evil"));
        assert!(!is_safe_extract_path("/etc/passwd"));
    }
}
