//! Error types for the JSON reader.
//!
//! Every fallible operation in the crate returns [`Result<T>`], aliased to
//! `Result<T, ReadError>`. Each variant names the condition that stopped the
//! read so callers can tell a truncated input apart from a schema conflict.
//!
//! ## Categories
//!
//! - **Input bounds**: [`ReadError::SourceExhausted`], [`ReadError::OutOfRange`]
//! - **Compression**: [`ReadError::UnsupportedCompression`], [`ReadError::Decompression`]
//! - **Planning**: [`ReadError::NoSafeSplitPoint`]
//! - **Parsing**: [`ReadError::Parse`] (subject to [`RecoveryMode`](crate::RecoveryMode))
//! - **Assembly**: [`ReadError::SchemaMismatch`]
//!
//! None of these are retried by the reader; the only retry in the pipeline is
//! the single forward shift the planner makes while looking for a split point.

use crate::io::compression::CompressionKind;
use arrow::error::ArrowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("requested offset {offset} is past the end of all sources ({available} bytes available)")]
    SourceExhausted { offset: usize, available: usize },

    #[error("read at offset {offset} is out of range for a source of {size} bytes")]
    OutOfRange { offset: usize, size: usize },

    #[error("unsupported compression: {0:?}")]
    UnsupportedCompression(CompressionKind),

    #[error("{kind:?} decompression failed: {message}")]
    Decompression {
        kind: CompressionKind,
        message: String,
    },

    #[error("no record delimiter within {searched} bytes of offset {offset}; cannot split batch")]
    NoSafeSplitPoint { offset: usize, searched: usize },

    #[error("malformed JSON record {record}: {message}")]
    Parse { record: usize, message: String },

    #[error("batch {batch} does not match the schema of batch 0: {detail}")]
    SchemaMismatch { batch: usize, detail: String },

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("invalid reader options: {0}")]
    InvalidOptions(String),
}

pub type Result<T> = std::result::Result<T, ReadError>;
