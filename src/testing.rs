//! Testing utilities for code that reads JSON with this crate.
//!
//! - **Fixtures**: repeated record blocks, multi-file layouts, small tunings
//! - **Assertions**: row counts and column values of a read table
//! - **Compression helpers**: build compressed inputs for every enabled codec
//!
//! # Quick Start
//!
//! ```
//! use ironjson::testing::*;
//! use ironjson::{read_json, ReaderOptions, Source};
//!
//! # fn main() -> anyhow::Result<()> {
//! let data = repeat_block(SAMPLE_BLOCK, 3);
//! let opts = ReaderOptions::default().with_tuning(small_tuning(1 << 20));
//! let out = read_json(vec![Source::host(&data)], &opts)?;
//! assert_row_count(&out, 4 * 8);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod compress;
pub mod fixtures;

pub use assertions::*;
pub use compress::*;
pub use fixtures::*;
