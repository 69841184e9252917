//! Batch planning over the logical byte stream.
//!
//! The planner decides how a read is split into batches that each fit the
//! device-memory budget in [`BatchTuning::max_batch_bytes`]. It never parses
//! JSON; it only needs to know where records may start.
//!
//! 1. **Estimate** -- sum the source sizes, using ratio estimates for lazily
//!    decompressed sources. At or under budget, the whole requested range is one
//!    batch and nothing is decompressed yet.
//! 2. **Refine** -- otherwise every estimate is replaced by an exact size
//!    ([`SourceSet::materialize_all`]), so cut offsets are real offsets.
//! 3. **Cut** -- each batch ends at a record boundary found by probing the
//!    sub-chunk just before the nominal cut (`budget - subchunk`). A source end
//!    is a record boundary, since ingestion writes a delimiter there.
//! 4. **Shift** -- if the backward probe finds nothing, the cut is pushed
//!    forward one sub-chunk and probed once more. A second miss is
//!    [`ReadError::NoSafeSplitPoint`].
//!
//! Batches are contiguous, never overlap, and cover the requested range.
//!
//! [`align_to_records`] is the related helper for user byte ranges: it widens
//! or narrows a range so it holds exactly the records that start inside it.

use crate::config::BatchTuning;
use crate::device::{DeviceBuffer, DeviceBufferPool};
use crate::error::{ReadError, Result};
use crate::io::source::{ByteRange, Source, SourceFragment, SourceSet};
use std::fmt::{Display, Formatter, Result as FormatResult};
use tracing::{debug, info};

/// Bytes read per step when scanning forward for a record start.
const SCAN_STEP: usize = 64 * 1024;

/// One planned batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position of the batch in the plan; also its processing order.
    pub index: usize,
    /// Logical range the batch ingests.
    pub range: ByteRange,
    /// Per-source pieces of `range`, using the sizes known at planning time.
    pub fragments: Vec<SourceFragment>,
}

/// Ordered batches for one read call.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub batches: Vec<Batch>,
    /// Sum of source sizes before any decompression (estimates included).
    pub estimated_size: usize,
    /// Sum of exact source sizes, when planning had to compute them.
    pub exact_size: Option<usize>,
    /// Probe width used for this plan.
    pub subchunk_size: usize,
    /// Cuts that needed the forward shift.
    pub shifted_cuts: usize,
}

impl BatchPlan {
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Batch> {
        self.batches.iter()
    }
}

impl Display for BatchPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        writeln!(
            f,
            "BatchPlan: {} batch(es), estimated {} bytes, sub-chunk {} bytes",
            self.batches.len(),
            self.estimated_size,
            self.subchunk_size
        )?;
        for batch in &self.batches {
            writeln!(
                f,
                "  [{}] {} over {} source(s)",
                batch.index,
                batch.range,
                batch.fragments.len()
            )?;
        }
        Ok(())
    }
}

/// Plan the batches for reading `range` of `sources`.
///
/// Only JSON Lines input (`lines == true`) is split; a whole-document read is
/// always one batch.
///
/// # Errors
/// - [`ReadError::InvalidOptions`] if `tuning` does not validate.
/// - [`ReadError::SourceExhausted`] if `range` starts past the exact end.
/// - [`ReadError::NoSafeSplitPoint`] if no record boundary lies within two
///   sub-chunks of a nominal cut.
/// - Decompression and I/O errors from refining sizes or probing.
pub fn plan_batches(
    sources: &mut SourceSet<'_>,
    range: ByteRange,
    delimiter: u8,
    lines: bool,
    tuning: &BatchTuning,
) -> Result<BatchPlan> {
    tuning.validate()?;
    let budget = tuning.max_batch_bytes;
    let subchunk = tuning.subchunk_size();
    let estimated_size = sources.total_size();
    let requested = range.end().min(estimated_size).saturating_sub(range.offset);

    if !lines || requested <= budget {
        let plan = BatchPlan {
            batches: vec![Batch {
                index: 0,
                range,
                fragments: sources.fragments(range),
            }],
            estimated_size,
            exact_size: sources.sizes_are_exact().then_some(estimated_size),
            subchunk_size: subchunk,
            shifted_cuts: 0,
        };
        debug!(estimated_size, budget, lines, "single batch read");
        return Ok(plan);
    }

    let total = sources.materialize_all()?;
    if range.offset > total {
        return Err(ReadError::SourceExhausted {
            offset: range.offset,
            available: total,
        });
    }
    let end = range.end().min(total);
    let ends = sources.source_ends();
    let nominal = budget - subchunk;
    let mut pool = DeviceBufferPool::new(tuning.prealloc_buffers(), subchunk);

    let mut batches = Vec::new();
    let mut shifted_cuts = 0;
    let mut start = range.offset;
    while start < end {
        let cut = if end - start <= budget {
            end
        } else {
            let target = start + nominal;
            let back_from = target.saturating_sub(subchunk).max(start);
            match last_boundary(sources, &ends, &mut pool, back_from, target, delimiter)? {
                Some(cut) => cut,
                None => {
                    let shifted_end = (target + subchunk).min(end);
                    debug!(target, shifted_end, "no boundary before cut, shifting forward");
                    shifted_cuts += 1;
                    last_boundary(sources, &ends, &mut pool, target, shifted_end, delimiter)?
                        .ok_or(ReadError::NoSafeSplitPoint {
                            offset: target,
                            searched: 2 * subchunk,
                        })?
                }
            }
        };
        let batch_range = ByteRange::between(start, cut);
        batches.push(Batch {
            index: batches.len(),
            range: batch_range,
            fragments: sources.fragments(batch_range),
        });
        start = cut;
    }

    info!(
        batches = batches.len(),
        estimated_size,
        exact_size = total,
        budget,
        subchunk,
        shifted_cuts,
        "planned multi-batch read"
    );
    Ok(BatchPlan {
        batches,
        estimated_size,
        exact_size: Some(total),
        subchunk_size: subchunk,
        shifted_cuts,
    })
}

/// Index of the source holding logical byte `pos`, and `pos` local to it.
fn locate(ends: &[usize], pos: usize) -> (usize, usize) {
    let idx = ends.partition_point(|&e| e <= pos);
    let base = if idx == 0 { 0 } else { ends[idx - 1] };
    (idx, pos - base)
}

/// Copy `[local, local + size)` of `source` into `dst`, device-to-device when
/// the source allows it.
fn stage(source: &mut Source<'_>, local: usize, size: usize, dst: &mut DeviceBuffer) -> Result<()> {
    if source.supports_device_read() {
        source.device_read(local, size, dst)?;
    } else {
        dst.copy_from_host(&source.host_read(local, size)?);
    }
    Ok(())
}

/// Largest record boundary `b` with `lo < b <= hi`: either one past a
/// delimiter byte, or a source end.
///
/// Only the bytes after the last source end in the window are scanned; they
/// always lie inside a single source.
fn last_boundary(
    sources: &mut SourceSet<'_>,
    ends: &[usize],
    pool: &mut DeviceBufferPool,
    lo: usize,
    hi: usize,
    delimiter: u8,
) -> Result<Option<usize>> {
    let source_end = ends.iter().copied().filter(|&e| e > lo && e <= hi).max();
    let scan_from = source_end.unwrap_or(lo);
    if scan_from < hi {
        let (idx, local) = locate(ends, scan_from);
        let probe = pool.next_buffer();
        stage(&mut sources.sources_mut()[idx], local, hi - scan_from, probe)?;
        if let Some(pos) = probe.as_bytes().iter().rposition(|b| *b == delimiter) {
            return Ok(Some(scan_from + pos + 1));
        }
    }
    Ok(source_end)
}

/// First record start at or after `from + 1`: one past the first delimiter at
/// or after `from`, or the end of the source holding `from`. Returns the total
/// size when no such position exists.
fn next_record_start(sources: &mut SourceSet<'_>, ends: &[usize], from: usize, delimiter: u8) -> Result<usize> {
    let total = ends.last().copied().unwrap_or(0);
    let mut pos = from;
    let mut scratch = DeviceBuffer::with_capacity(SCAN_STEP);
    while pos < total {
        let (idx, local) = locate(ends, pos);
        let step = SCAN_STEP.min(ends[idx] - pos);
        scratch.clear();
        stage(&mut sources.sources_mut()[idx], local, step, &mut scratch)?;
        if let Some(p) = scratch.as_bytes().iter().position(|b| *b == delimiter) {
            return Ok(pos + p + 1);
        }
        pos += step;
        if pos == ends[idx] {
            return Ok(pos);
        }
    }
    Ok(total)
}

/// Narrow or widen `range` to exactly the records whose first byte lies in it.
///
/// The start moves to the first record start at or after `range.offset`; the
/// end moves to the first record start at or after `range.end()`, or to the end
/// of the stream. Adjacent input ranges yield adjacent aligned ranges, so a
/// set of ranges that tiles the stream reads every record exactly once.
///
/// # Errors
/// Returns [`ReadError::SourceExhausted`] if `range.offset` is past the end,
/// plus any decompression or I/O error.
pub fn align_to_records(sources: &mut SourceSet<'_>, range: ByteRange, delimiter: u8) -> Result<ByteRange> {
    let total = sources.materialize_all()?;
    if range.offset > total {
        return Err(ReadError::SourceExhausted {
            offset: range.offset,
            available: total,
        });
    }
    let ends = sources.source_ends();
    let start = match range.offset {
        0 => 0,
        offset => next_record_start(sources, &ends, offset - 1, delimiter)?,
    };
    let end = match range.end() {
        0 => 0,
        end if end >= total => total,
        end => next_record_start(sources, &ends, end - 1, delimiter)?,
    };
    let aligned = ByteRange::between(start, end.max(start));
    debug!(requested = %range, %aligned, "aligned byte range to records");
    Ok(aligned)
}
