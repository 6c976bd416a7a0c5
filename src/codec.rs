//! Compression codecs for archive payloads
//!
//! Four variants: raw passthrough, LZ4 block compression, Zstd, and Zstd
//! with a pre-trained dictionary bound at build time. Decompression is
//! exact: the output must be precisely the recorded uncompressed size, and
//! any mismatch is treated as corruption by the caller, never truncated or
//! padded.

use thiserror::Error;

/// Zstd compression level used at build time.
const ZSTD_LEVEL: i32 = 3;

/// Payload codec tag, stored per entry in the archive table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Codec {
    /// No compression
    Store = 0,
    /// LZ4 block compression (fast, moderate ratio)
    Lz4 = 1,
    /// Zstd compression (slower, better ratio)
    Zstd = 2,
    /// Zstd with an embedded dictionary (many small, similar files)
    ZstdDict = 3,
}

impl Codec {
    /// Convert from the on-disk tag byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Codec::Store),
            1 => Some(Codec::Lz4),
            2 => Some(Codec::Zstd),
            3 => Some(Codec::ZstdDict),
            _ => None,
        }
    }

    /// True if this codec requires a dictionary to be resolvable by id.
    pub fn needs_dictionary(&self) -> bool {
        matches!(self, Codec::ZstdDict)
    }

    /// Short name for logging and tooling output.
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Store => "store",
            Codec::Lz4 => "lz4",
            Codec::Zstd => "zstd",
            Codec::ZstdDict => "zstd-dict",
        }
    }
}

/// Codec-level failure, independent of any archive context.
///
/// The reader maps these into `CorruptAsset` with the owning archive and
/// logical path attached; the writer maps compression failures into
/// `ArchiveError::Codec`.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("LZ4: {0}")]
    Lz4(String),

    #[error("Zstd: {0}")]
    Zstd(String),

    #[error("Decompressed size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Codec '{0}' requires a dictionary")]
    DictionaryRequired(&'static str),
}

/// Compress `data` with the given codec.
///
/// `dictionary` must be `Some` for [`Codec::ZstdDict`] and is ignored by the
/// other variants.
pub fn compress(
    data: &[u8],
    codec: Codec,
    dictionary: Option<&[u8]>,
) -> Result<Vec<u8>, CodecError> {
    match codec {
        Codec::Store => Ok(data.to_vec()),
        Codec::Lz4 => Ok(lz4_flex::compress(data)),
        Codec::Zstd => {
            zstd::bulk::compress(data, ZSTD_LEVEL).map_err(|e| CodecError::Zstd(e.to_string()))
        }
        Codec::ZstdDict => {
            let dict = dictionary.ok_or(CodecError::DictionaryRequired("zstd-dict"))?;
            let mut compressor = zstd::bulk::Compressor::with_dictionary(ZSTD_LEVEL, dict)
                .map_err(|e| CodecError::Zstd(e.to_string()))?;
            compressor
                .compress(data)
                .map_err(|e| CodecError::Zstd(e.to_string()))
        }
    }
}

/// Decompress `data`, producing exactly `uncompressed_size` bytes.
pub fn decompress(
    data: &[u8],
    codec: Codec,
    uncompressed_size: usize,
    dictionary: Option<&[u8]>,
) -> Result<Vec<u8>, CodecError> {
    let out = match codec {
        Codec::Store => data.to_vec(),
        Codec::Lz4 => lz4_flex::decompress(data, uncompressed_size)
            .map_err(|e| CodecError::Lz4(e.to_string()))?,
        Codec::Zstd => zstd::bulk::decompress(data, uncompressed_size)
            .map_err(|e| CodecError::Zstd(e.to_string()))?,
        Codec::ZstdDict => {
            let dict = dictionary.ok_or(CodecError::DictionaryRequired("zstd-dict"))?;
            let mut decompressor = zstd::bulk::Decompressor::with_dictionary(dict)
                .map_err(|e| CodecError::Zstd(e.to_string()))?;
            decompressor
                .decompress(data, uncompressed_size)
                .map_err(|e| CodecError::Zstd(e.to_string()))?
        }
    };

    if out.len() != uncompressed_size {
        return Err(CodecError::SizeMismatch {
            expected: uncompressed_size,
            actual: out.len(),
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dictionary() -> Vec<u8> {
        // Raw content dictionary: zstd accepts arbitrary bytes without the
        // trained-dictionary magic.
        b"uniform mat4 projection; uniform mat4 view; varying vec2 uv;"
            .repeat(8)
            .to_vec()
    }

    #[test]
    fn test_codec_tag_conversion() {
        assert_eq!(Codec::from_u8(0), Some(Codec::Store));
        assert_eq!(Codec::from_u8(1), Some(Codec::Lz4));
        assert_eq!(Codec::from_u8(2), Some(Codec::Zstd));
        assert_eq!(Codec::from_u8(3), Some(Codec::ZstdDict));
        assert_eq!(Codec::from_u8(99), None);
    }

    #[test]
    fn test_round_trip_all_codecs() {
        let data = b"Hello, archive! ".repeat(200);
        let dict = sample_dictionary();

        for codec in [Codec::Store, Codec::Lz4, Codec::Zstd, Codec::ZstdDict] {
            let d = codec.needs_dictionary().then(|| dict.as_slice());
            let compressed = compress(&data, codec, d).unwrap();
            let decompressed = decompress(&compressed, codec, data.len(), d).unwrap();
            assert_eq!(data.as_slice(), decompressed.as_slice(), "{}", codec.name());
        }
    }

    #[test]
    fn test_round_trip_empty_and_single_byte() {
        let dict = sample_dictionary();
        for codec in [Codec::Store, Codec::Lz4, Codec::Zstd, Codec::ZstdDict] {
            let d = codec.needs_dictionary().then(|| dict.as_slice());
            for input in [&b""[..], &b"x"[..]] {
                let compressed = compress(input, codec, d).unwrap();
                let decompressed = decompress(&compressed, codec, input.len(), d).unwrap();
                assert_eq!(input, decompressed.as_slice());
            }
        }
    }

    #[test]
    fn test_round_trip_larger_than_dictionary() {
        let dict = sample_dictionary();
        let data: Vec<u8> = (0..dict.len() * 4).map(|i| (i * 31) as u8).collect();

        let compressed = compress(&data, Codec::ZstdDict, Some(&dict)).unwrap();
        let decompressed = decompress(&compressed, Codec::ZstdDict, data.len(), Some(&dict)).unwrap();
        assert_eq!(data, decompressed);
    }

    #[test]
    fn test_size_mismatch_is_an_error() {
        let data = b"exactly sized payload".to_vec();
        let compressed = compress(&data, Codec::Store, None).unwrap();

        // Store passthrough with a wrong recorded size must fail, not pad.
        let err = decompress(&compressed, Codec::Store, data.len() + 5, None).unwrap_err();
        assert!(matches!(err, CodecError::SizeMismatch { .. }));
    }

    #[test]
    fn test_dictionary_required() {
        let err = compress(b"data", Codec::ZstdDict, None).unwrap_err();
        assert!(matches!(err, CodecError::DictionaryRequired(_)));

        let err = decompress(b"data", Codec::ZstdDict, 4, None).unwrap_err();
        assert!(matches!(err, CodecError::DictionaryRequired(_)));
    }

    #[test]
    fn test_dictionary_improves_small_file_ratio() {
        let dict = sample_dictionary();
        let data = b"uniform mat4 projection; varying vec2 uv; void main() {}".to_vec();

        let plain = compress(&data, Codec::Zstd, None).unwrap();
        let with_dict = compress(&data, Codec::ZstdDict, Some(&dict)).unwrap();
        assert!(with_dict.len() <= plain.len());
    }
}
