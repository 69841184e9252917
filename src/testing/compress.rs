//! Build compressed fixtures with the same codec crates the reader uses.

use crate::io::compression::CompressionKind;
use anyhow::{Result, bail};
#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-zip",
    feature = "compression-bzip2",
    feature = "compression-xz"
))]
use std::io::Write;

/// Compress `data` as `kind`.
///
/// ZIP output is a single stored entry. Kinds whose feature is disabled, and
/// `None`/`Auto`, are errors.
///
/// # Errors
///
/// Returns an error if the encoder fails or the kind is unavailable.
pub fn compress(kind: CompressionKind, data: &[u8]) -> Result<Vec<u8>> {
    match kind {
        #[cfg(feature = "compression-gzip")]
        CompressionKind::Gzip => {
            let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(data)?;
            Ok(enc.finish()?)
        }
        #[cfg(feature = "compression-zip")]
        CompressionKind::Zip => Ok(stored_zip("data.jsonl", data)),
        #[cfg(feature = "compression-snappy")]
        CompressionKind::Snappy => Ok(snap::raw::Encoder::new().compress_vec(data)?),
        #[cfg(feature = "compression-zstd")]
        CompressionKind::Zstd => Ok(zstd::encode_all(data, 3)?),
        #[cfg(feature = "compression-bzip2")]
        CompressionKind::Bzip2 => {
            let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            enc.write_all(data)?;
            Ok(enc.finish()?)
        }
        #[cfg(feature = "compression-xz")]
        CompressionKind::Xz => {
            let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
            enc.write_all(data)?;
            Ok(enc.finish()?)
        }
        other => bail!("cannot build a {other:?} fixture"),
    }
}

/// A ZIP archive holding one stored (uncompressed) entry.
#[cfg(feature = "compression-zip")]
#[must_use]
pub fn stored_zip(name: &str, data: &[u8]) -> Vec<u8> {
    let crc = {
        let mut hasher = flate2::Crc::new();
        hasher.update(data);
        hasher.sum()
    };
    let size = u32::try_from(data.len()).unwrap_or(u32::MAX);
    let name_len = u16::try_from(name.len()).unwrap_or(u16::MAX);

    let mut out = Vec::with_capacity(data.len() + 128);
    out.extend_from_slice(b"PK\x03\x04");
    out.extend_from_slice(&20u16.to_le_bytes()); // version needed
    out.extend_from_slice(&0u16.to_le_bytes()); // flags
    out.extend_from_slice(&0u16.to_le_bytes()); // stored
    out.extend_from_slice(&[0; 4]); // mod time/date
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&name_len.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(data);
    out
}
