//! Codec policy for the pack tool
//!
//! A TOML file maps file extensions to codecs so a whole directory tree can
//! be packed with sensible per-type choices: store already-compressed
//! formats, LZ4 for bulk data, Zstd where ratio matters, and dictionary
//! Zstd for families of small similar files (shaders, JSON).
//!
//! ```toml
//! default = "lz4"
//! alignment = 64
//!
//! [extensions]
//! png = "store"
//! ogg = "store"
//! txt = "zstd"
//! shader = { codec = "zstd-dict", dictionary = 1 }
//!
//! [[dictionaries]]
//! id = 1
//! path = "dictionaries/shaders.dict"
//! ```

use crate::codec::Codec;
use crate::error::{ArchiveError, Result};
use crate::format::DEFAULT_ALIGNMENT;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Codec name as written in policy files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodecChoice {
    Store,
    Lz4,
    Zstd,
    ZstdDict,
}

impl From<CodecChoice> for Codec {
    fn from(choice: CodecChoice) -> Codec {
        match choice {
            CodecChoice::Store => Codec::Store,
            CodecChoice::Lz4 => Codec::Lz4,
            CodecChoice::Zstd => Codec::Zstd,
            CodecChoice::ZstdDict => Codec::ZstdDict,
        }
    }
}

/// Per-extension rule: either a bare codec name or a codec plus dictionary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionRule {
    Codec(CodecChoice),
    WithDictionary { codec: CodecChoice, dictionary: u16 },
}

impl ExtensionRule {
    pub fn codec(&self) -> Codec {
        match self {
            ExtensionRule::Codec(c) => (*c).into(),
            ExtensionRule::WithDictionary { codec, .. } => (*codec).into(),
        }
    }

    pub fn dictionary(&self) -> Option<u16> {
        match self {
            ExtensionRule::Codec(_) => None,
            ExtensionRule::WithDictionary { dictionary, .. } => Some(*dictionary),
        }
    }
}

/// Pack-time codec policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecPolicy {
    /// Codec for files no extension rule matches.
    #[serde(default = "default_codec")]
    pub default: CodecChoice,

    /// Payload alignment for the produced archive.
    #[serde(default = "default_alignment")]
    pub alignment: u32,

    /// Extension (without dot, lowercase) -> rule.
    #[serde(default)]
    pub extensions: HashMap<String, ExtensionRule>,

    /// Dictionaries to embed, each sourced from a file of raw bytes.
    #[serde(default)]
    pub dictionaries: Vec<DictionarySource>,
}

/// One dictionary to embed in the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionarySource {
    pub id: u16,
    pub path: PathBuf,
}

fn default_codec() -> CodecChoice {
    CodecChoice::Lz4
}

fn default_alignment() -> u32 {
    DEFAULT_ALIGNMENT
}

impl Default for CodecPolicy {
    fn default() -> Self {
        CodecPolicy {
            default: default_codec(),
            alignment: default_alignment(),
            extensions: HashMap::new(),
            dictionaries: Vec::new(),
        }
    }
}

impl CodecPolicy {
    /// Load a policy from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| ArchiveError::Codec(format!("bad policy file: {}", e)))
    }

    /// Codec and dictionary for a logical path, by extension.
    pub fn rule_for(&self, logical_path: &str) -> (Codec, Option<u16>) {
        let ext = Path::new(logical_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match ext.and_then(|e| self.extensions.get(&e)) {
            Some(rule) => (rule.codec(), rule.dictionary()),
            None => (self.default.into(), None),
        }
    }
}
