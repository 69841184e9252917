//! Copy a logical byte range from many sources into one device buffer.
//!
//! [`ingest_raw_input`] walks the sources of a [`SourceSet`] in order, copies
//! the part of each that overlaps the requested range, and writes one record
//! delimiter after every source whose content ends inside the range. Two
//! sources therefore never fuse into a single record, even when the first
//! lacks a trailing newline.

use crate::device::DeviceBuffer;
use crate::error::{ReadError, Result};
use crate::io::source::{ByteRange, SourceSet};
use tracing::trace;

/// Buffer capacity that always fits an ingest of `size` bytes over `sources`.
#[must_use]
pub fn ingest_capacity(size: usize, sources: usize) -> usize {
    size.saturating_add(sources)
}

/// Fill `buffer` with the logical bytes `[range.offset, range.end())`.
///
/// The buffer is cleared first. Device-capable sources are copied with
/// [`Source::device_read`](crate::io::source::Source::device_read); the rest
/// are read on the host and transferred. The returned length is the number of
/// bytes now in `buffer`, which can exceed `range.size` by the number of
/// delimiters inserted. Compressed sources are decompressed on demand; the
/// set's [`compression`](SourceSet::compression) was applied when it was built.
///
/// # Errors
/// Returns [`ReadError::SourceExhausted`] when the sources hold fewer than
/// `range.offset` bytes, and propagates read and decompression failures.
pub fn ingest_raw_input(
    buffer: &mut DeviceBuffer,
    sources: &mut SourceSet<'_>,
    range: ByteRange,
    delimiter: u8,
) -> Result<usize> {
    buffer.clear();
    let compression = sources.compression();
    let sources = sources.sources_mut();
    let mut prefix = 0usize;
    let mut remaining = range.size;

    for idx in 0..sources.len() {
        if remaining == 0 && prefix >= range.offset {
            break;
        }
        // An estimate cannot be trusted to skip or seek into a source.
        let size = if range.offset > prefix {
            sources[idx].exact_size()?
        } else {
            sources[idx].size()
        };
        if prefix + size <= range.offset {
            prefix += size;
            continue;
        }

        let local = range.offset.saturating_sub(prefix);
        let source = &mut sources[idx];
        let copied = if source.supports_device_read() {
            source.device_read(local, remaining, buffer)?
        } else {
            let host = source.host_read(local, remaining)?;
            buffer.copy_from_host(&host);
            host.len()
        };
        remaining -= copied;
        // The host read may have replaced an estimate with the exact size.
        let size = source.size();
        prefix += size;
        trace!(source = idx, local, copied, ?compression, "ingested source fragment");

        let reached_end = local + copied >= size;
        let more_data = sources[idx + 1..].iter().any(|s| s.size() > 0);
        if copied > 0 && reached_end && remaining > 0 && more_data {
            buffer.push(delimiter);
        }
    }

    if prefix < range.offset {
        return Err(ReadError::SourceExhausted {
            offset: range.offset,
            available: prefix,
        });
    }
    Ok(buffer.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::compression::CompressionKind;
    use crate::io::source::Source;

    fn set<'a>(parts: &[&'a [u8]]) -> SourceSet<'a> {
        SourceSet::new(
            parts.iter().map(|p| Source::host(*p)).collect(),
            CompressionKind::None,
            4,
        )
        .unwrap()
    }

    #[test]
    fn inserts_delimiter_between_sources() {
        let mut sources = set(&[b"{\"a\":1}", b"{\"a\":2}"]);
        let mut buf = DeviceBuffer::with_capacity(ingest_capacity(14, 2));
        let n = ingest_raw_input(&mut buf, &mut sources, ByteRange::new(0, 14), b'\n').unwrap();
        assert_eq!(n, 15);
        assert_eq!(buf.as_bytes(), b"{\"a\":1}\n{\"a\":2}");
    }

    #[test]
    fn no_delimiter_when_range_ends_at_source_boundary() {
        let mut sources = set(&[b"abc\n", b"def\n"]);
        let mut buf = DeviceBuffer::default();
        ingest_raw_input(&mut buf, &mut sources, ByteRange::new(0, 4), b'\n').unwrap();
        assert_eq!(buf.as_bytes(), b"abc\n");

        ingest_raw_input(&mut buf, &mut sources, ByteRange::new(4, 4), b'\n').unwrap();
        assert_eq!(buf.as_bytes(), b"def\n");
    }

    #[test]
    fn mid_range_read_spans_three_sources() {
        let mut sources = set(&[b"aaaa", b"bb", b"cccc"]);
        let mut buf = DeviceBuffer::default();
        let n = ingest_raw_input(&mut buf, &mut sources, ByteRange::between(2, 8), b'|').unwrap();
        assert_eq!(buf.as_bytes(), b"aa|bb|cc");
        assert_eq!(n, 8);
    }

    #[test]
    fn offset_past_all_sources_is_exhausted() {
        let mut sources = set(&[b"abc", b"de"]);
        let mut buf = DeviceBuffer::default();
        let err = ingest_raw_input(&mut buf, &mut sources, ByteRange::new(9, 1), b'\n').unwrap_err();
        assert!(matches!(
            err,
            ReadError::SourceExhausted { offset: 9, available: 5 }
        ));
    }

    #[test]
    fn empty_range_checks_offset_only() {
        let mut sources = set(&[b"abc", b"de"]);
        let mut buf = DeviceBuffer::default();
        assert_eq!(ingest_raw_input(&mut buf, &mut sources, ByteRange::new(5, 0), b'\n').unwrap(), 0);
        assert!(ingest_raw_input(&mut buf, &mut sources, ByteRange::new(6, 0), b'\n').is_err());
    }

    #[test]
    fn read_to_end_stops_at_last_source() {
        let mut sources = set(&[b"x", b"", b"y"]);
        let mut buf = DeviceBuffer::default();
        ingest_raw_input(&mut buf, &mut sources, ByteRange::to_end(0), b'\n').unwrap();
        assert_eq!(buf.as_bytes(), b"x\ny");
    }
}
