//! Compression kinds, detection, and the decompression primitive.
//!
//! Sources may arrive compressed. This module decides, per kind, how a
//! compressed source reports its size before anything is decompressed, and
//! provides the one-shot [`decompress`] call that the compressed source adapter
//! uses when it finally needs the bytes.
//!
//! ## Codec table
//!
//! Every kind has one entry in a static table ([`CodecSpec`]) holding its
//! file extensions, magic bytes, and [`SizeStrategy`]. Adding a kind means
//! adding a row and a `decompress` arm.
//!
//! | Kind   | Extensions       | Strategy   | Feature              |
//! |--------|------------------|------------|----------------------|
//! | Gzip   | `.gz`, `.gzip`   | `Estimate` | `compression-gzip`   |
//! | Zip    | `.zip`           | `Estimate` | `compression-zip`    |
//! | Snappy | `.snappy`        | `Estimate` | `compression-snappy` |
//! | Zstd   | `.zst`, `.zstd`  | `Eager`    | `compression-zstd`   |
//! | Bzip2  | `.bz2`, `.bzip2` | `Eager`    | `compression-bzip2`  |
//! | Xz     | `.xz`            | `Eager`    | `compression-xz`     |
//!
//! ## Detection
//!
//! [`CompressionKind::Auto`] resolves per source: file extensions are checked
//! first, then magic bytes at the start of the data. Raw snappy has no magic
//! bytes, so it is only detected by extension.

use crate::error::{ReadError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Compression format of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    #[default]
    None,
    /// Detect per source from extension or magic bytes.
    Auto,
    Gzip,
    Zip,
    Snappy,
    Zstd,
    Bzip2,
    Xz,
}

/// How a compressed source reports its size before it is decompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeStrategy {
    /// Report `compressed_len * ratio` and defer decompression.
    Estimate,
    /// Decompress at construction and report the exact size.
    Eager,
}

/// One row of the codec table.
#[derive(Debug)]
pub struct CodecSpec {
    pub kind: CompressionKind,
    pub name: &'static str,
    /// Lowercase, with the leading dot.
    pub extensions: &'static [&'static str],
    pub magic: Option<&'static [u8]>,
    pub strategy: SizeStrategy,
}

static CODECS: &[CodecSpec] = &[
    CodecSpec {
        kind: CompressionKind::Gzip,
        name: "gzip",
        extensions: &[".gz", ".gzip"],
        magic: Some(&[0x1f, 0x8b]),
        strategy: SizeStrategy::Estimate,
    },
    CodecSpec {
        kind: CompressionKind::Zip,
        name: "zip",
        extensions: &[".zip"],
        magic: Some(&[0x50, 0x4b, 0x03, 0x04]),
        strategy: SizeStrategy::Estimate,
    },
    CodecSpec {
        kind: CompressionKind::Snappy,
        name: "snappy",
        extensions: &[".snappy"],
        magic: None,
        strategy: SizeStrategy::Estimate,
    },
    CodecSpec {
        kind: CompressionKind::Zstd,
        name: "zstd",
        extensions: &[".zst", ".zstd"],
        magic: Some(&[0x28, 0xb5, 0x2f, 0xfd]),
        strategy: SizeStrategy::Eager,
    },
    CodecSpec {
        kind: CompressionKind::Bzip2,
        name: "bzip2",
        extensions: &[".bz2", ".bzip2"],
        magic: Some(&[0x42, 0x5a, 0x68]),
        strategy: SizeStrategy::Eager,
    },
    CodecSpec {
        kind: CompressionKind::Xz,
        name: "xz",
        extensions: &[".xz"],
        magic: Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]),
        strategy: SizeStrategy::Eager,
    },
];

/// All known codecs, in detection order.
#[must_use]
pub fn codecs() -> &'static [CodecSpec] {
    CODECS
}

impl CompressionKind {
    /// The codec table row for this kind, if it is a real compression format.
    #[must_use]
    pub fn spec(self) -> Option<&'static CodecSpec> {
        CODECS.iter().find(|c| c.kind == self)
    }

    /// Size strategy for this kind. `None` and `Auto` report [`SizeStrategy::Eager`]
    /// since their size is known without decompression.
    #[must_use]
    pub fn size_strategy(self) -> SizeStrategy {
        self.spec().map_or(SizeStrategy::Eager, |c| c.strategy)
    }

    #[must_use]
    pub fn is_compressed(self) -> bool {
        !matches!(self, Self::None | Self::Auto)
    }
}

/// Detect compression from a path's extension.
///
/// Matching is case-insensitive and uses the last extension only, so
/// `logs.jsonl.gz` is gzip.
#[must_use]
pub fn detect_from_extension(path: impl AsRef<Path>) -> Option<CompressionKind> {
    let path_str = path.as_ref().to_string_lossy().to_lowercase();
    CODECS
        .iter()
        .find(|c| c.extensions.iter().any(|ext| path_str.ends_with(ext)))
        .map(|c| c.kind)
}

/// Detect compression from the leading bytes of a source.
#[must_use]
pub fn detect_from_magic(head: &[u8]) -> Option<CompressionKind> {
    if head.is_empty() {
        return None;
    }
    CODECS
        .iter()
        .find(|c| c.magic.is_some_and(|magic| head.starts_with(magic)))
        .map(|c| c.kind)
}

/// Heuristic decompressed size for a ratio-estimable source.
#[must_use]
pub fn estimate_uncompressed_size(compressed_len: usize, ratio: usize) -> usize {
    compressed_len.saturating_mul(ratio)
}

/// Decompress a whole compressed region into a host buffer.
///
/// # Errors
/// Returns [`ReadError::UnsupportedCompression`] for `None`/`Auto` or for a kind
/// whose codec feature is disabled, and [`ReadError::Decompression`] if the
/// data is corrupt.
pub fn decompress(kind: CompressionKind, compressed: &[u8]) -> Result<Vec<u8>> {
    let failed = |e: std::io::Error| ReadError::Decompression {
        kind,
        message: e.to_string(),
    };
    match kind {
        #[cfg(feature = "compression-gzip")]
        CompressionKind::Gzip => {
            use std::io::Read;
            let mut out = Vec::new();
            flate2::read::MultiGzDecoder::new(compressed)
                .read_to_end(&mut out)
                .map_err(failed)?;
            Ok(out)
        }
        #[cfg(feature = "compression-zip")]
        CompressionKind::Zip => zip::first_entry(compressed),
        #[cfg(feature = "compression-snappy")]
        CompressionKind::Snappy => snap::raw::Decoder::new()
            .decompress_vec(compressed)
            .map_err(|e| ReadError::Decompression {
                kind,
                message: e.to_string(),
            }),
        #[cfg(feature = "compression-zstd")]
        CompressionKind::Zstd => zstd::decode_all(compressed).map_err(failed),
        #[cfg(feature = "compression-bzip2")]
        CompressionKind::Bzip2 => {
            use std::io::Read;
            let mut out = Vec::new();
            bzip2::read::MultiBzDecoder::new(compressed)
                .read_to_end(&mut out)
                .map_err(failed)?;
            Ok(out)
        }
        #[cfg(feature = "compression-xz")]
        CompressionKind::Xz => {
            use std::io::Read;
            let mut out = Vec::new();
            xz2::read::XzDecoder::new_multi_decoder(compressed)
                .read_to_end(&mut out)
                .map_err(failed)?;
            Ok(out)
        }
        other => Err(ReadError::UnsupportedCompression(other)),
    }
}

/// Single-entry ZIP archives: the JSON payload is the first local file entry.
#[cfg(feature = "compression-zip")]
mod zip {
    use super::CompressionKind;
    use crate::error::{ReadError, Result};
    use std::io::Read;

    const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
    const LOCAL_HEADER_LEN: usize = 30;
    const METHOD_STORED: u16 = 0;
    const METHOD_DEFLATE: u16 = 8;
    const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
    const ZIP64_EXTRA_ID: u16 = 0x0001;
    const SIZE_IN_ZIP64: u32 = u32::MAX;

    fn corrupt(message: impl Into<String>) -> ReadError {
        ReadError::Decompression {
            kind: CompressionKind::Zip,
            message: message.into(),
        }
    }

    fn u16_at(b: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([b[at], b[at + 1]])
    }

    fn u32_at(b: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
    }

    /// Compressed size from a Zip64 extended-information extra field. In a
    /// local header the field holds the uncompressed then the compressed size.
    fn zip64_compressed_len(mut extra: &[u8]) -> Option<u64> {
        while extra.len() >= 4 {
            let id = u16_at(extra, 0);
            let len = u16_at(extra, 2) as usize;
            let body = extra.get(4..4 + len)?;
            if id == ZIP64_EXTRA_ID && body.len() >= 16 {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&body[8..16]);
                return Some(u64::from_le_bytes(bytes));
            }
            extra = &extra[4 + len..];
        }
        None
    }

    pub(super) fn first_entry(archive: &[u8]) -> Result<Vec<u8>> {
        if archive.len() < LOCAL_HEADER_LEN || u32_at(archive, 0) != LOCAL_HEADER_SIG {
            return Err(corrupt("missing local file header"));
        }
        let flags = u16_at(archive, 6);
        let method = u16_at(archive, 8);
        let name_len = u16_at(archive, 26) as usize;
        let extra_len = u16_at(archive, 28) as usize;
        let extra_start = LOCAL_HEADER_LEN + name_len;
        let data_start = extra_start + extra_len;
        let data = archive
            .get(data_start..)
            .ok_or_else(|| corrupt("truncated local file header"))?;
        let compressed_len = match u32_at(archive, 18) {
            SIZE_IN_ZIP64 => {
                let extra = &archive[extra_start..data_start];
                let len = zip64_compressed_len(extra)
                    .ok_or_else(|| corrupt("zip64 size without a zip64 extra field"))?;
                usize::try_from(len).map_err(|_| corrupt("zip64 entry too large"))?
            }
            len => len as usize,
        };

        match method {
            METHOD_STORED => {
                if flags & FLAG_DATA_DESCRIPTOR != 0 {
                    return Err(corrupt("stored entry without a size in its header"));
                }
                data.get(..compressed_len)
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| corrupt("truncated stored entry"))
            }
            // Deflate streams terminate themselves, so a data descriptor is fine.
            METHOD_DEFLATE => {
                let mut out = Vec::new();
                flate2::read::DeflateDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(|e| corrupt(e.to_string()))?;
                Ok(out)
            }
            other => Err(corrupt(format!("unsupported zip method {other}"))),
        }
    }
}
