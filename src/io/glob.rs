//! Glob expansion into file sources.
//!
//! Multi-file reads usually start from a pattern such as `logs/*.jsonl` or
//! `events/day=*/part-*.json.gz`. The matches are sorted so the logical byte
//! stream, and therefore row order, is deterministic.
//!
//! ```no_run
//! use ironjson::io::glob::sources_from_glob;
//! use ironjson::{read_json, CompressionKind, ReaderOptions};
//!
//! let sources = sources_from_glob("events/day=*/*.jsonl.gz")?;
//! let opts = ReaderOptions::default().with_compression(CompressionKind::Auto);
//! let table = read_json(sources, &opts)?;
//! # use anyhow::Error; Ok::<(), Error>(())
//! ```

use crate::io::source::Source;
use anyhow::{Context, Result, bail};
use glob::glob;
use std::path::PathBuf;
use tracing::debug;

/// Expand a glob pattern into a sorted vector of matching file paths.
///
/// Directories are skipped. No match is an empty vector, not an error.
///
/// # Errors
///
/// Returns an error if the pattern is invalid or an entry cannot be read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            result.push(path);
        }
    }

    result.sort();
    Ok(result)
}

/// Open every file matching `pattern` as a [`Source`], in sorted path order.
///
/// # Errors
///
/// Returns an error if the pattern is invalid, nothing matches, or a matched
/// file cannot be opened.
pub fn sources_from_glob(pattern: &str) -> Result<Vec<Source<'static>>> {
    let files = expand_glob(pattern)?;
    if files.is_empty() {
        bail!("no files found matching pattern: {pattern}");
    }
    debug!(pattern, files = files.len(), "expanded glob");
    files
        .iter()
        .map(|path| Source::file(path).with_context(|| format!("open {}", path.display())))
        .collect()
}
