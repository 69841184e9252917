//! Reader configuration.
//!
//! [`ReaderOptions`] is built by chaining `with_*` calls on the default:
//!
//! ```
//! use ironjson::{CompressionKind, ReaderOptions, RecoveryMode};
//! use arrow::datatypes::DataType;
//!
//! let opts = ReaderOptions::default()
//!     .with_lines(true)
//!     .with_compression(CompressionKind::Auto)
//!     .with_recovery_mode(RecoveryMode::RecoverWithNull)
//!     .with_dtype("id", DataType::Int64);
//! assert_eq!(opts.delimiter(), b'\n');
//! ```

use crate::config::BatchTuning;
use crate::error::Result;
use crate::io::compression::CompressionKind;
use crate::io::source::ByteRange;
use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};

/// What the tokenizer does with a record that is not valid JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    /// Fail the whole read.
    #[default]
    Fail,
    /// Emit the record as a row of nulls.
    RecoverWithNull,
}

/// Options for one [`read_json`](crate::read_json) call.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Records are newline-delimited (JSON Lines). Defaults to `true`.
    pub lines: bool,
    /// Compression of every source, or [`CompressionKind::Auto`].
    pub compression: CompressionKind,
    pub recovery_mode: RecoveryMode,
    /// Column type overrides, in the order they were added.
    pub dtypes: Vec<(String, DataType)>,
    /// Rewrite single-quoted strings before tokenizing. Defaults to `true`.
    pub normalize_single_quotes: bool,
    /// Read only the records starting inside this range of the logical stream.
    pub byte_range: Option<ByteRange>,
    pub tuning: BatchTuning,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            lines: true,
            compression: CompressionKind::None,
            recovery_mode: RecoveryMode::Fail,
            dtypes: Vec::new(),
            normalize_single_quotes: true,
            byte_range: None,
            tuning: BatchTuning::default(),
        }
    }
}

impl ReaderOptions {
    /// Defaults with the batch budget taken from
    /// [`BATCH_SIZE_ENV`](crate::config::BATCH_SIZE_ENV) when it is set.
    ///
    /// # Errors
    /// Returns [`ReadError::InvalidOptions`](crate::ReadError::InvalidOptions)
    /// if the variable does not parse.
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().with_tuning(BatchTuning::from_env()?))
    }

    #[must_use]
    pub fn with_lines(mut self, lines: bool) -> Self {
        self.lines = lines;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: CompressionKind) -> Self {
        self.compression = compression;
        self
    }

    #[must_use]
    pub fn with_recovery_mode(mut self, mode: RecoveryMode) -> Self {
        self.recovery_mode = mode;
        self
    }

    /// Force column `name` to `data_type`. A later call for the same name wins.
    #[must_use]
    pub fn with_dtype(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        self.dtypes.retain(|(n, _)| *n != name);
        self.dtypes.push((name, data_type));
        self
    }

    #[must_use]
    pub fn with_normalize_single_quotes(mut self, enabled: bool) -> Self {
        self.normalize_single_quotes = enabled;
        self
    }

    #[must_use]
    pub fn with_byte_range(mut self, offset: usize, size: usize) -> Self {
        self.byte_range = Some(ByteRange::new(offset, size));
        self
    }

    #[must_use]
    pub fn with_tuning(mut self, tuning: BatchTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Delimiter written between sources: `\n` for JSON Lines, `,` otherwise.
    #[must_use]
    pub fn delimiter(&self) -> u8 {
        if self.lines { b'\n' } else { b',' }
    }

    /// The subset of options the tokenizer sees.
    #[must_use]
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            lines: self.lines,
            delimiter: self.delimiter(),
            recovery_mode: self.recovery_mode,
            dtypes: self.dtypes.clone(),
        }
    }
}

/// Options passed to a [`Tokenizer`](crate::tokenizer::Tokenizer) with each batch.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub lines: bool,
    pub delimiter: u8,
    pub recovery_mode: RecoveryMode,
    pub dtypes: Vec<(String, DataType)>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ReaderOptions::default().parse_options()
    }
}

impl ParseOptions {
    /// Type override for `column`, if any.
    #[must_use]
    pub fn dtype(&self, column: &str) -> Option<&DataType> {
        self.dtypes
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, dt)| dt)
    }
}
