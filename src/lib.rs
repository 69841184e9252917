//! # ironjson
//!
//! A **batched JSON reader** that turns many JSON Lines (or whole-document JSON)
//! inputs into one Arrow [`RecordBatch`](arrow::record_batch::RecordBatch),
//! bounding the working memory of every step by a configurable byte budget.
//!
//! ## Key Features
//!
//! - **Many sources, one stream** - files, host buffers, device-resident buffers
//!   and compressed regions are read as one logical byte stream
//! - **Records never fuse across sources** - a delimiter is written between
//!   sources during ingestion
//! - **Bounded batches** - inputs larger than the budget are split at record
//!   boundaries found by sub-chunk probing
//! - **Compression** - gzip, zip, snappy, zstd, bzip2 and xz, explicit or
//!   auto-detected (each optional via feature flags)
//! - **Single-quote normalization** - `{'a':'b'}` is rewritten to strict JSON
//! - **Recovery mode** - malformed records fail the read or become null rows
//! - **Byte ranges** - read only the records starting inside a range
//!
//! ## Quick Start
//!
//! ```
//! use ironjson::{read_json, ReaderOptions, Source};
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let part1 = b"{\"id\":1,\"name\":\"a\"}\n{\"id\":2,\"name\":\"b\"}";
//! let part2 = b"{\"id\":3,\"name\":'c'}\n";
//!
//! let out = read_json(
//!     vec![Source::host(part1), Source::host(part2)],
//!     &ReaderOptions::default(),
//! )?;
//! assert_eq!(out.num_rows(), 3);
//! assert_eq!(out.column_names, vec!["id", "name"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! 1. [`SourceSet`] wraps the inputs, applying the requested compression
//! 2. [`plan_batches`](planner::plan_batches) splits the logical stream into
//!    batches that fit [`BatchTuning::max_batch_bytes`]
//! 3. For each batch, in order:
//!    [`ingest_raw_input`](io::ingest::ingest_raw_input) fills a
//!    [`DeviceBuffer`], [`normalize_quotes`](normalize::normalize_quotes)
//!    rewrites single quotes, and a [`Tokenizer`] produces a table fragment
//! 4. Fragments are checked against the first fragment's schema and
//!    concatenated
//!
//! ## Feature Flags
//!
//! - `compression-gzip`, `compression-zip`, `compression-snappy`,
//!   `compression-zstd`, `compression-bzip2`, `compression-xz` - codecs
//! - `parallel-io` - decompress sources in parallel while planning
//!
//! All are enabled by default.
//!
//! ## Module Overview
//!
//! - [`io`] - sources, compression, and raw ingestion
//! - [`planner`] - batch planning and byte-range alignment
//! - [`normalize`] - the single-quote transducer
//! - [`tokenizer`] - the tokenizer trait and its Arrow implementation
//! - [`reader`] - entry points and the batch assembler
//! - [`config`] / [`options`] - tuning and per-read options
//! - [`metrics`] - per-read statistics
//! - [`testing`] - fixtures and assertions for tests

pub mod config;
pub mod device;
pub mod error;
pub mod io;
pub mod metrics;
pub mod normalize;
pub mod options;
pub mod planner;
pub mod reader;
pub mod testing;
pub mod tokenizer;

pub use config::{BATCH_SIZE_ENV, BatchTuning};
pub use device::{DeviceBuffer, DeviceBufferPool};
pub use error::{ReadError, Result};
pub use io::compression::CompressionKind;
pub use io::glob::sources_from_glob;
pub use io::source::{ByteRange, Source, SourceSet};
pub use metrics::ReadStats;
pub use options::{ParseOptions, ReaderOptions, RecoveryMode};
pub use planner::{Batch, BatchPlan};
pub use reader::{TableWithMetadata, read_json, read_json_with};
pub use tokenizer::{ArrowJsonTokenizer, TableFragment, Tokenizer};
