//! Input sources behind one capability interface.
//!
//! A [`Source`] is one ordered input of a read call: a file, a host buffer, a
//! buffer already resident on the device, or a compressed region. All of them
//! answer the same three questions: how big are you ([`Source::size`]), can
//! you copy straight to the device ([`Source::supports_device_read`]), and
//! what bytes live in `[offset, offset + size)` ([`Source::host_read`]).
//!
//! The sources of a read call are held together in a [`SourceSet`], which owns
//! the ordering and exposes the *logical byte stream*: the concatenation of
//! every source's bytes addressed by one [`ByteRange`] coordinate space.
//!
//! ## Compressed sources
//!
//! [`CompressedSource`] reports an estimated size for ratio-estimable kinds
//! (see [`SizeStrategy`]) and decompresses on first read. A first read that
//! reaches the end of the content takes the decompressed allocation with it
//! instead of caching it, which is the common case for a single-batch read.

use crate::device::DeviceBuffer;
use crate::error::{ReadError, Result};
use crate::io::compression::{
    CompressionKind, SizeStrategy, decompress, detect_from_extension, detect_from_magic,
    estimate_uncompressed_size,
};
use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A sub-interval `[offset, offset + size)` of the logical byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ByteRange {
    pub offset: usize,
    pub size: usize,
}

impl ByteRange {
    #[must_use]
    pub const fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// The range `[start, end)`. An inverted pair yields an empty range at `start`.
    #[must_use]
    pub const fn between(start: usize, end: usize) -> Self {
        Self {
            offset: start,
            size: end.saturating_sub(start),
        }
    }

    /// Everything from `offset` to the end of the stream, whatever its size.
    #[must_use]
    pub const fn to_end(offset: usize) -> Self {
        Self {
            offset,
            size: usize::MAX - offset,
        }
    }

    /// Exclusive end offset.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset.saturating_add(self.size)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Overlap with `other`, if any.
    #[must_use]
    pub fn intersect(&self, other: &ByteRange) -> Option<ByteRange> {
        let start = self.offset.max(other.offset);
        let end = self.end().min(other.end());
        (start < end).then(|| ByteRange::between(start, end))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

/// The part of a logical range that falls inside one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFragment {
    /// Index of the source in its [`SourceSet`].
    pub source: usize,
    /// Range local to that source.
    pub range: ByteRange,
}

/// Bytes returned by [`Source::host_read`].
///
/// Either a view into memory the source already holds, or an allocation the
/// read produced and handed over (a file read, or a compressed source's
/// decompressed content).
#[derive(Debug)]
pub enum HostBuffer<'s> {
    Borrowed(&'s [u8]),
    Owned { data: Vec<u8>, start: usize, len: usize },
}

impl HostBuffer<'_> {
    fn owned(data: Vec<u8>) -> Self {
        let len = data.len();
        HostBuffer::Owned { data, start: 0, len }
    }

    /// Whether this buffer owns its allocation.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        matches!(self, HostBuffer::Owned { .. })
    }
}

impl Deref for HostBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            HostBuffer::Borrowed(bytes) => bytes,
            HostBuffer::Owned { data, start, len } => &data[*start..*start + *len],
        }
    }
}

fn clamp_read(offset: usize, size: usize, available: usize) -> Result<usize> {
    if offset > available {
        return Err(ReadError::OutOfRange {
            offset,
            size: available,
        });
    }
    Ok(size.min(available - offset))
}

/// A file read by seeking, never held in memory as a whole.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: File,
    size: usize,
}

impl FileSource {
    /// Open `path` and record its length.
    ///
    /// # Errors
    /// Returns [`ReadError::Io`] if the file cannot be opened or stat'ed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len() as usize;
        Ok(Self { path, file, size })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_range(&mut self, offset: usize, size: usize) -> Result<Vec<u8>> {
        let count = clamp_read(offset, size, self.size)?;
        self.file.seek(SeekFrom::Start(offset as u64))?;
        let mut buf = Vec::with_capacity(count);
        (&mut self.file).take(count as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        self.read_range(0, self.size)
    }
}

/// A compressed region presented as an ordinary source.
#[derive(Debug)]
pub struct CompressedSource<'a> {
    compressed: Cow<'a, [u8]>,
    kind: CompressionKind,
    size: usize,
    exact: bool,
    decompressed: Option<Vec<u8>>,
}

impl<'a> CompressedSource<'a> {
    /// Wrap `compressed` bytes of `kind`.
    ///
    /// Ratio-estimable kinds report `compressed.len() * ratio` until first read;
    /// every other kind is decompressed here.
    ///
    /// # Errors
    /// Propagates [`decompress`] failures for eagerly decompressed kinds, and
    /// rejects `None`/`Auto` with [`ReadError::UnsupportedCompression`].
    pub fn new(compressed: impl Into<Cow<'a, [u8]>>, kind: CompressionKind, ratio: usize) -> Result<Self> {
        if !kind.is_compressed() {
            return Err(ReadError::UnsupportedCompression(kind));
        }
        let compressed = compressed.into();
        match kind.size_strategy() {
            SizeStrategy::Estimate => Ok(Self {
                size: estimate_uncompressed_size(compressed.len(), ratio),
                compressed,
                kind,
                exact: false,
                decompressed: None,
            }),
            SizeStrategy::Eager => {
                let data = decompress(kind, &compressed)?;
                Ok(Self {
                    size: data.len(),
                    compressed,
                    kind,
                    exact: true,
                    decompressed: Some(data),
                })
            }
        }
    }

    #[must_use]
    pub fn kind(&self) -> CompressionKind {
        self.kind
    }

    #[must_use]
    pub fn compressed_len(&self) -> usize {
        self.compressed.len()
    }

    /// Current size: an estimate until the content has been decompressed once.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_size_exact(&self) -> bool {
        self.exact
    }

    /// Whether a decompressed copy is cached for later reads.
    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.decompressed.is_some()
    }

    fn decompress_now(&mut self) -> Result<Vec<u8>> {
        let data = decompress(self.kind, &self.compressed)?;
        debug!(
            kind = ?self.kind,
            compressed = self.compressed.len(),
            estimated = self.size,
            actual = data.len(),
            "decompressed source"
        );
        self.size = data.len();
        self.exact = true;
        Ok(data)
    }

    /// Decompress and cache the content if it is not cached yet; returns the
    /// exact size.
    ///
    /// # Errors
    /// Propagates [`decompress`] failures.
    pub fn materialize(&mut self) -> Result<usize> {
        if self.decompressed.is_none() {
            let data = self.decompress_now()?;
            self.decompressed = Some(data);
        }
        Ok(self.size)
    }

    /// Read up to `size` decompressed bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`ReadError::OutOfRange`] if `offset` is past the decompressed
    /// content, or a decompression error.
    pub fn host_read(&mut self, offset: usize, size: usize) -> Result<HostBuffer<'_>> {
        if self.decompressed.is_none() {
            let data = self.decompress_now()?;
            let count = clamp_read(offset, size, data.len())?;
            if offset + count == data.len() {
                // The read runs to the end: hand the allocation over, cache nothing.
                return Ok(HostBuffer::Owned {
                    data,
                    start: offset,
                    len: count,
                });
            }
            self.decompressed = Some(data);
        }
        let data = self.decompressed.as_deref().unwrap_or_default();
        let count = clamp_read(offset, size, data.len())?;
        Ok(HostBuffer::Borrowed(&data[offset..offset + count]))
    }
}

/// One input of a read call.
#[derive(Debug)]
pub enum Source<'a> {
    File(FileSource),
    Host(&'a [u8]),
    Device(&'a DeviceBuffer),
    Compressed(CompressedSource<'a>),
}

impl<'a> Source<'a> {
    /// Open a file source.
    ///
    /// # Errors
    /// Returns [`ReadError::Io`] if the file cannot be opened.
    pub fn file(path: impl AsRef<Path>) -> Result<Source<'static>> {
        Ok(Source::File(FileSource::open(path)?))
    }

    /// Borrow a host buffer.
    #[must_use]
    pub fn host(bytes: &'a [u8]) -> Self {
        Source::Host(bytes)
    }

    /// Borrow a buffer already resident on the device.
    #[must_use]
    pub fn device(buffer: &'a DeviceBuffer) -> Self {
        Source::Device(buffer)
    }

    /// Wrap compressed host bytes.
    ///
    /// # Errors
    /// See [`CompressedSource::new`].
    pub fn compressed(bytes: &'a [u8], kind: CompressionKind, ratio: usize) -> Result<Self> {
        Ok(Source::Compressed(CompressedSource::new(bytes, kind, ratio)?))
    }

    /// Logical size in bytes: exact, or the current estimate.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Source::File(f) => f.size,
            Source::Host(b) => b.len(),
            Source::Device(d) => d.len(),
            Source::Compressed(c) => c.size(),
        }
    }

    #[must_use]
    pub fn is_size_exact(&self) -> bool {
        match self {
            Source::Compressed(c) => c.is_size_exact(),
            _ => true,
        }
    }

    /// Exact logical size, decompressing if the size is still an estimate.
    ///
    /// # Errors
    /// Propagates decompression failures.
    pub fn exact_size(&mut self) -> Result<usize> {
        match self {
            Source::Compressed(c) if !c.is_size_exact() => c.materialize(),
            other => Ok(other.size()),
        }
    }

    #[must_use]
    pub fn supports_device_read(&self) -> bool {
        matches!(self, Source::Device(_))
    }

    #[must_use]
    pub fn compression(&self) -> CompressionKind {
        match self {
            Source::Compressed(c) => c.kind(),
            _ => CompressionKind::None,
        }
    }

    /// Read up to `size` bytes from `offset` into host memory. Short only when
    /// the range runs past the end of the source.
    ///
    /// # Errors
    /// Returns [`ReadError::OutOfRange`] if `offset > self.size()`.
    pub fn host_read(&mut self, offset: usize, size: usize) -> Result<HostBuffer<'_>> {
        match self {
            Source::File(f) => f.read_range(offset, size).map(HostBuffer::owned),
            Source::Host(b) => {
                let count = clamp_read(offset, size, b.len())?;
                Ok(HostBuffer::Borrowed(&b[offset..offset + count]))
            }
            Source::Device(d) => {
                // Device-to-host copy.
                let count = clamp_read(offset, size, d.len())?;
                Ok(HostBuffer::owned(d.as_bytes()[offset..offset + count].to_vec()))
            }
            Source::Compressed(c) => c.host_read(offset, size),
        }
    }

    /// Append up to `size` bytes from `offset` directly to `dst`, returning the
    /// count. Only device-resident sources support this.
    ///
    /// # Errors
    /// Returns [`ReadError::OutOfRange`] for a bad offset and
    /// [`ReadError::InvalidOptions`] when the source has no device path.
    pub fn device_read(&mut self, offset: usize, size: usize, dst: &mut DeviceBuffer) -> Result<usize> {
        match self {
            Source::Device(d) => {
                let count = clamp_read(offset, size, d.len())?;
                dst.copy_from_device(*d, offset..offset + count);
                Ok(count)
            }
            other => Err(ReadError::InvalidOptions(format!(
                "{} source does not support device reads",
                other.label()
            ))),
        }
    }

    /// Short name of the variant, for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Source::File(_) => "file",
            Source::Host(_) => "host",
            Source::Device(_) => "device",
            Source::Compressed(_) => "compressed",
        }
    }

    /// Re-wrap this source for `kind`. `Auto` detects per source; an already
    /// compressed source is left alone.
    fn with_compression(self, kind: CompressionKind, ratio: usize) -> Result<Source<'a>> {
        if matches!(kind, CompressionKind::None) {
            return Ok(self);
        }
        let kind = match kind {
            CompressionKind::Auto => match self.detect_compression()? {
                Some(detected) => detected,
                None => return Ok(self),
            },
            explicit => explicit,
        };
        debug!(source = self.label(), ?kind, "wrapping source for decompression");
        let bytes: Cow<'a, [u8]> = match self {
            Source::Compressed(c) => return Ok(Source::Compressed(c)),
            Source::File(mut f) => Cow::Owned(f.read_all()?),
            Source::Host(b) => Cow::Borrowed(b),
            Source::Device(d) => Cow::Owned(d.as_bytes().to_vec()),
        };
        Ok(Source::Compressed(CompressedSource::new(bytes, kind, ratio)?))
    }

    fn detect_compression(&self) -> Result<Option<CompressionKind>> {
        const MAGIC_PEEK: usize = 16;
        match self {
            Source::File(f) => {
                if let Some(kind) = detect_from_extension(&f.path) {
                    return Ok(Some(kind));
                }
                let mut head = [0u8; MAGIC_PEEK];
                let mut file = File::open(&f.path)?;
                let n = file.read(&mut head)?;
                Ok(detect_from_magic(&head[..n]))
            }
            Source::Host(b) => Ok(detect_from_magic(&b[..b.len().min(MAGIC_PEEK)])),
            Source::Device(d) => {
                let bytes = d.as_bytes();
                Ok(detect_from_magic(&bytes[..bytes.len().min(MAGIC_PEEK)]))
            }
            Source::Compressed(c) => Ok(Some(c.kind())),
        }
    }
}

/// The ordered sources of one read call.
#[derive(Debug)]
pub struct SourceSet<'a> {
    sources: Vec<Source<'a>>,
    compression: CompressionKind,
}

impl<'a> SourceSet<'a> {
    /// Collect `sources`, wrapping each for `compression` (see
    /// [`CompressionKind::Auto`]).
    ///
    /// # Errors
    /// Returns decompression errors for eagerly decompressed kinds and I/O
    /// errors for file sources.
    pub fn new(sources: Vec<Source<'a>>, compression: CompressionKind, ratio: usize) -> Result<Self> {
        let sources = sources
            .into_iter()
            .map(|s| s.with_compression(compression, ratio))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            sources,
            compression,
        })
    }

    /// The compression kind requested for this read.
    #[must_use]
    pub fn compression(&self) -> CompressionKind {
        self.compression
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source<'a>> {
        self.sources.iter()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Source<'a>> {
        self.sources.get(index)
    }

    pub(crate) fn sources_mut(&mut self) -> &mut [Source<'a>] {
        &mut self.sources
    }

    /// Sum of current source sizes (estimates included).
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.sources.iter().map(Source::size).sum()
    }

    #[must_use]
    pub fn sizes_are_exact(&self) -> bool {
        self.sources.iter().all(Source::is_size_exact)
    }

    /// Replace every size estimate by the exact size, decompressing sources in
    /// parallel on the host when `parallel-io` is enabled.
    ///
    /// # Errors
    /// Returns the first decompression failure.
    pub fn materialize_all(&mut self) -> Result<usize> {
        #[cfg(feature = "parallel-io")]
        {
            use rayon::prelude::*;
            self.sources
                .par_iter_mut()
                .filter(|s| !s.is_size_exact())
                .try_for_each(|s| s.exact_size().map(|_| ()))?;
        }
        #[cfg(not(feature = "parallel-io"))]
        for s in self.sources.iter_mut().filter(|s| !s.is_size_exact()) {
            s.exact_size()?;
        }
        Ok(self.total_size())
    }

    /// Exclusive logical end offset of each source.
    #[must_use]
    pub fn source_ends(&self) -> Vec<usize> {
        self.sources
            .iter()
            .scan(0usize, |acc, s| {
                *acc += s.size();
                Some(*acc)
            })
            .collect()
    }

    /// Split a logical range into the per-source ranges it touches, using the
    /// current sizes.
    #[must_use]
    pub fn fragments(&self, range: ByteRange) -> Vec<SourceFragment> {
        let mut start = 0usize;
        let mut out = Vec::new();
        for (idx, source) in self.sources.iter().enumerate() {
            let span = ByteRange::new(start, source.size());
            if let Some(hit) = span.intersect(&range) {
                out.push(SourceFragment {
                    source: idx,
                    range: ByteRange::new(hit.offset - start, hit.size),
                });
            }
            start = span.end();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_read_clamps_and_rejects_past_end() {
        let data = b"0123456789";
        let mut src = Source::host(data);
        assert_eq!(&*src.host_read(7, 100).unwrap(), b"789");
        assert_eq!(src.host_read(10, 4).unwrap().len(), 0);
        assert!(matches!(
            src.host_read(11, 1),
            Err(ReadError::OutOfRange { offset: 11, size: 10 })
        ));
    }

    #[test]
    fn fragments_split_across_sources() {
        let a = b"aaaa";
        let b = b"bb";
        let c = b"cccccc";
        let set = SourceSet::new(
            vec![Source::host(a), Source::host(b), Source::host(c)],
            CompressionKind::None,
            4,
        )
        .unwrap();
        assert_eq!(set.source_ends(), vec![4, 6, 12]);
        let frags = set.fragments(ByteRange::between(3, 8));
        assert_eq!(
            frags,
            vec![
                SourceFragment { source: 0, range: ByteRange::new(3, 1) },
                SourceFragment { source: 1, range: ByteRange::new(0, 2) },
                SourceFragment { source: 2, range: ByteRange::new(0, 2) },
            ]
        );
    }

    #[test]
    fn only_device_sources_read_to_device() {
        let resident = DeviceBuffer::from_host(b"{\"a\":1}".to_vec());
        let mut dev = Source::device(&resident);
        let mut host = Source::host(b"xyz");
        assert!(dev.supports_device_read());
        assert!(!host.supports_device_read());

        let mut dst = DeviceBuffer::with_capacity(8);
        assert_eq!(dev.device_read(1, 3, &mut dst).unwrap(), 3);
        assert_eq!(dst.as_bytes(), b"\"a\"");
        assert!(host.device_read(0, 1, &mut dst).is_err());
    }

    #[test]
    fn byte_range_helpers() {
        let r = ByteRange::between(5, 9);
        assert_eq!(r.size, 4);
        assert_eq!(r.end(), 9);
        assert_eq!(ByteRange::to_end(3).end(), usize::MAX);
        assert_eq!(
            r.intersect(&ByteRange::new(8, 10)),
            Some(ByteRange::new(8, 1))
        );
        assert_eq!(r.intersect(&ByteRange::new(9, 10)), None);
        assert_eq!(r.to_string(), "[5, 9)");
    }
}
