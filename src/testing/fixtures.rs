//! Pre-built inputs and tunings for reader tests.

use crate::config::BatchTuning;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Four JSON Lines records with mixed types and a trailing newline.
pub const SAMPLE_BLOCK: &str = concat!(
    "{\"id\":1,\"name\":\"alpha\",\"score\":0.5,\"tags\":[\"a\"]}\n",
    "{\"id\":2,\"name\":\"beta\",\"score\":1.5,\"tags\":[]}\n",
    "{\"id\":3,\"name\":null,\"score\":2.5,\"tags\":[\"b\",\"c\"]}\n",
    "{\"id\":4,\"name\":\"delta\",\"score\":null,\"tags\":null}\n",
);

/// Records in [`SAMPLE_BLOCK`].
pub const SAMPLE_BLOCK_RECORDS: usize = 4;

/// `block` doubled `doublings` times: `2^doublings` copies back to back.
///
/// # Example
///
/// ```
/// use ironjson::testing::repeat_block;
///
/// assert_eq!(repeat_block("x\n", 3), b"x\n".repeat(8));
/// ```
#[must_use]
pub fn repeat_block(block: &str, doublings: u32) -> Vec<u8> {
    let mut out = block.as_bytes().to_vec();
    for _ in 0..doublings {
        out.extend_from_within(..);
    }
    out
}

/// `count` single-column records `{"n":<i>}` numbered from `start`.
#[must_use]
pub fn numbered_records(start: usize, count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in start..start + count {
        out.extend_from_slice(format!("{{\"n\":{i}}}\n").as_bytes());
    }
    out
}

/// Default tuning with a small batch budget and sub-chunk floor, so
/// multi-batch reads happen on kilobyte-sized inputs.
///
/// # Panics
///
/// Panics if `max_batch_bytes` cannot hold two sub-chunks (below 20 bytes).
#[must_use]
pub fn small_tuning(max_batch_bytes: usize) -> BatchTuning {
    let tuning = BatchTuning {
        min_subchunk_size: 1,
        ..BatchTuning::default()
    }
    .with_max_batch_bytes(max_batch_bytes);
    tuning.validate().expect("tuning budget too small");
    tuning
}

/// Write `contents` to `dir/name_<i>.<ext>` for each item and return the paths
/// in order.
///
/// # Errors
///
/// Returns an error if a file cannot be written.
pub fn write_files<C: AsRef<[u8]>>(dir: &Path, name: &str, ext: &str, contents: &[C]) -> Result<Vec<PathBuf>> {
    contents
        .iter()
        .enumerate()
        .map(|(i, data)| {
            let path = dir.join(format!("{name}_{i:03}.{ext}"));
            fs::write(&path, data).with_context(|| format!("write {}", path.display()))?;
            Ok(path)
        })
        .collect()
}

/// [`write_files`] into a fresh temporary directory. The directory is removed
/// when the returned [`TempDir`] is dropped.
///
/// # Errors
///
/// Returns an error if the directory or a file cannot be created.
pub fn temp_files<C: AsRef<[u8]>>(name: &str, ext: &str, contents: &[C]) -> Result<(TempDir, Vec<PathBuf>)> {
    let dir = TempDir::new().context("create temp dir")?;
    let paths = write_files(dir.path(), name, ext, contents)?;
    Ok((dir, paths))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_doubles() {
        let data = repeat_block(SAMPLE_BLOCK, 4);
        assert_eq!(data.len(), SAMPLE_BLOCK.len() * 16);
        let lines = data.iter().filter(|b| **b == b'\n').count();
        assert_eq!(lines, SAMPLE_BLOCK_RECORDS * 16);
    }

    #[test]
    fn numbered_records_are_lines() {
        assert_eq!(numbered_records(3, 2), b"{\"n\":3}\n{\"n\":4}\n");
    }
}
