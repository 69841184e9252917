//! The read entry points and the batch assembler.
//!
//! [`read_json`] wires the stages together:
//!
//! ```text
//! sources -> SourceSet -> plan_batches -> for each batch:
//!     ingest_raw_input -> normalize_quotes -> Tokenizer::tokenize
//! -> concat_batches -> TableWithMetadata
//! ```
//!
//! Batches run strictly in plan order, and each batch's buffers are dropped
//! before the next is ingested. The first error aborts the read; no partial
//! table is returned.

use crate::device::DeviceBuffer;
use crate::error::{ReadError, Result};
use crate::io::ingest::{ingest_capacity, ingest_raw_input};
use crate::io::source::{ByteRange, Source, SourceSet};
use crate::metrics::ReadStats;
use crate::normalize::normalize_quotes;
use crate::options::{ParseOptions, ReaderOptions};
use crate::planner::{Batch, align_to_records, plan_batches};
use crate::tokenizer::{ArrowJsonTokenizer, TableFragment, Tokenizer};
use arrow::array::{ArrayRef, new_null_array};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The assembled table plus what is known about it.
#[derive(Debug, Clone)]
pub struct TableWithMetadata {
    pub table: RecordBatch,
    pub column_names: Vec<String>,
    pub stats: ReadStats,
}

impl TableWithMetadata {
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.table.schema()
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }
}

/// Read JSON from `sources` with the default tokenizer.
///
/// # Errors
/// Any [`ReadError`]; see [`read_json_with`].
pub fn read_json(sources: Vec<Source<'_>>, options: &ReaderOptions) -> Result<TableWithMetadata> {
    read_json_with(sources, options, &ArrowJsonTokenizer)
}

/// Read JSON from `sources`, tokenizing each batch with `tokenizer`.
///
/// # Errors
/// - [`ReadError::InvalidOptions`] for a byte range outside JSON Lines mode or
///   an invalid tuning.
/// - Planning, ingestion, decompression and tokenizer errors, unchanged.
/// - [`ReadError::SchemaMismatch`] if batches disagree on the schema.
pub fn read_json_with(
    sources: Vec<Source<'_>>,
    options: &ReaderOptions,
    tokenizer: &dyn Tokenizer,
) -> Result<TableWithMetadata> {
    let started = Instant::now();
    let delimiter = options.delimiter();
    let mut sources = SourceSet::new(
        sources,
        options.compression,
        options.tuning.estimated_compression_ratio,
    )?;

    let range = match options.byte_range {
        Some(_) if !options.lines => {
            return Err(ReadError::InvalidOptions(
                "byte_range requires JSON Lines input".into(),
            ));
        }
        Some(requested) => align_to_records(&mut sources, requested, delimiter)?,
        None => ByteRange::to_end(0),
    };

    let mut stats = ReadStats {
        sources: sources.len(),
        estimated_bytes: sources.total_size(),
        ..ReadStats::default()
    };
    let plan = plan_batches(&mut sources, range, delimiter, options.lines, &options.tuning)?;
    stats.shifted_cuts = plan.shifted_cuts;
    debug!(%plan, "batch plan");

    let parse = options.parse_options();
    let mut assembler = BatchAssembler::new(tokenizer, &parse, options.normalize_single_quotes);
    for batch in &plan.batches {
        assembler.process(&mut sources, batch, delimiter, &mut stats)?;
    }
    let table = assembler.finish()?;
    stats.finish(started);

    info!(
        rows = table.num_rows(),
        columns = table.num_columns(),
        batches = stats.batches,
        elapsed_ms = stats.elapsed_ms,
        "read complete"
    );
    let column_names = table
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    Ok(TableWithMetadata {
        table,
        column_names,
        stats,
    })
}

/// A tokenized batch waiting to be joined.
enum Part {
    Table(RecordBatch),
    /// Rows from a fragment with no columns (blank or all-malformed input).
    NullRows(usize),
}

/// Runs batches through ingest, normalize and tokenize, and joins the results.
///
/// The first fragment that has columns fixes the column set and order. Later
/// fragments are matched to it by column name and may refine a column's type
/// (see [`merge_type`]). Fragments without columns are filled with nulls under
/// the final schema at the end.
pub struct BatchAssembler<'t> {
    tokenizer: &'t dyn Tokenizer,
    parse: &'t ParseOptions,
    normalize: bool,
    schema: Option<SchemaRef>,
    parts: Vec<Part>,
}

impl<'t> BatchAssembler<'t> {
    #[must_use]
    pub fn new(tokenizer: &'t dyn Tokenizer, parse: &'t ParseOptions, normalize: bool) -> Self {
        Self {
            tokenizer,
            parse,
            normalize,
            schema: None,
            parts: Vec::new(),
        }
    }

    /// Ingest, normalize and tokenize one batch.
    ///
    /// # Errors
    /// Propagates stage errors; returns [`ReadError::SchemaMismatch`] when the
    /// fragment does not fit the canonical schema.
    pub fn process(
        &mut self,
        sources: &mut SourceSet<'_>,
        batch: &Batch,
        delimiter: u8,
        stats: &mut ReadStats,
    ) -> Result<()> {
        let capacity = ingest_capacity(batch.range.size.min(sources.total_size()), sources.len());
        let mut buffer = DeviceBuffer::with_capacity(capacity);
        let ingested = ingest_raw_input(&mut buffer, sources, batch.range, delimiter)?;
        // Sizes of the sources read are exact now.
        let covered = batch
            .range
            .end()
            .min(sources.total_size())
            .saturating_sub(batch.range.offset);
        debug!(batch = batch.index, range = %batch.range, ingested, "ingested batch");

        let buffer = if self.normalize {
            normalize_quotes(buffer, self.parse.lines.then_some(delimiter)).buffer
        } else {
            buffer
        };
        let normalized = buffer.len();

        let fragment = self
            .tokenizer
            .tokenize(buffer, self.parse)
            .map_err(|e| match e {
                ReadError::Parse { record, message } => ReadError::Parse {
                    record: record + stats.rows,
                    message,
                },
                other => other,
            })?;
        stats.record_batch(covered, ingested, normalized, fragment.num_rows(), fragment.malformed);
        self.push(batch.index, fragment)
    }

    fn push(&mut self, index: usize, fragment: TableFragment) -> Result<()> {
        if fragment.batch.num_columns() == 0 {
            self.parts.push(Part::NullRows(fragment.num_rows()));
            return Ok(());
        }
        let batch = match &self.schema {
            None => {
                self.schema = Some(fragment.schema());
                fragment.batch
            }
            Some(canonical) => {
                let canonical = canonical.clone();
                let (batch, merged) = conform(index, &canonical, fragment.batch)?;
                if merged != canonical {
                    debug!(batch = index, schema = %merged, "widened canonical schema");
                    self.schema = Some(merged);
                }
                batch
            }
        };
        self.parts.push(Part::Table(batch));
        Ok(())
    }

    /// Concatenate every fragment under the canonical schema.
    ///
    /// # Errors
    /// Returns an Arrow error if concatenation fails.
    pub fn finish(self) -> Result<RecordBatch> {
        let schema = self.schema.unwrap_or_else(|| Arc::new(Schema::empty()));
        let batches = self
            .parts
            .into_iter()
            .map(|part| match part {
                Part::Table(batch) => cast_to(&schema, &batch),
                Part::NullRows(rows) => null_batch(&schema, rows),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(concat_batches(&schema, &batches)?)
    }
}

fn null_batch(schema: &SchemaRef, rows: usize) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = schema
        .fields()
        .iter()
        .map(|f| new_null_array(f.data_type(), rows))
        .collect();
    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    Ok(RecordBatch::try_new_with_options(schema.clone(), columns, &options)?)
}

/// The type a column takes when one batch inferred `want` and a later one `got`.
///
/// Equal types and all-null columns are always compatible, and `Int64` widens
/// to `Float64` in either direction. Every other pair, including a number in
/// one batch and a string in another, is a conflict.
fn merge_type(want: &DataType, got: &DataType) -> Option<DataType> {
    match (want, got) {
        (w, g) if w == g => Some(w.clone()),
        (w, DataType::Null) => Some(w.clone()),
        (DataType::Null, g) => Some(g.clone()),
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            Some(DataType::Float64)
        }
        _ => None,
    }
}

/// Match `batch` to the canonical columns by name.
///
/// Returns the batch with its columns in canonical order (still carrying their
/// own types) and the canonical schema with any widened types. A missing,
/// extra or conflicting column is a [`ReadError::SchemaMismatch`].
fn conform(index: usize, canonical: &SchemaRef, batch: RecordBatch) -> Result<(RecordBatch, SchemaRef)> {
    let schema = batch.schema();
    let mismatch = |detail: String| {
        warn!(batch = index, %detail, "schema mismatch");
        ReadError::SchemaMismatch {
            batch: index,
            detail,
        }
    };
    if schema.fields().len() != canonical.fields().len() {
        return Err(mismatch(format!(
            "expected {} columns, found {}",
            canonical.fields().len(),
            schema.fields().len()
        )));
    }

    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut merged = Vec::with_capacity(schema.fields().len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    for want in canonical.fields() {
        let Ok(pos) = schema.index_of(want.name()) else {
            return Err(mismatch(format!("column {:?} is missing", want.name())));
        };
        let got = schema.field(pos);
        let Some(data_type) = merge_type(want.data_type(), got.data_type()) else {
            return Err(mismatch(format!(
                "column {:?} is {} in earlier batches but {} here",
                want.name(),
                want.data_type(),
                got.data_type()
            )));
        };
        fields.push(schema.fields()[pos].clone());
        merged.push(Arc::new(Field::clone(want).with_data_type(data_type)));
        columns.push(batch.column(pos).clone());
    }
    let reordered = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    Ok((reordered, Arc::new(Schema::new(merged))))
}

/// Cast every column of `batch` to the type `schema` gives it.
fn cast_to(schema: &SchemaRef, batch: &RecordBatch) -> Result<RecordBatch> {
    let columns = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, column)| {
            if column.data_type() == field.data_type() {
                Ok(column.clone())
            } else {
                cast(column, field.data_type())
            }
        })
        .collect::<std::result::Result<Vec<ArrayRef>, _>>()?;
    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(schema.clone(), columns, &options)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray, Float64Array, Int64Array, NullArray, StringArray};
    use arrow::datatypes::{Float64Type, Int64Type};

    fn int_batch(name: &str, values: Vec<i64>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new(name, DataType::Int64, true)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    fn fragment(batch: RecordBatch) -> TableFragment {
        TableFragment { batch, malformed: 0 }
    }

    #[test]
    fn null_column_is_cast_to_canonical_type() {
        let parse = ParseOptions::default();
        let mut assembler = BatchAssembler::new(&ArrowJsonTokenizer, &parse, false);
        let canonical = int_batch("a", vec![1]);
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Null, true)]));
        let nulls = RecordBatch::try_new(schema, vec![Arc::new(NullArray::new(2))]).unwrap();
        assembler.push(0, fragment(canonical.clone())).unwrap();
        assembler.push(1, fragment(nulls)).unwrap();
        let table = assembler.finish().unwrap();
        assert_eq!(table.schema(), canonical.schema());
        assert_eq!(table.column(0).null_count(), 2);
    }

    #[test]
    fn columns_are_matched_by_name() {
        let ab = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Utf8, true),
        ]));
        let ba = Arc::new(Schema::new(vec![
            Field::new("b", DataType::Utf8, true),
            Field::new("a", DataType::Int64, true),
        ]));
        let first = RecordBatch::try_new(
            ab.clone(),
            vec![Arc::new(Int64Array::from(vec![1])), Arc::new(StringArray::from(vec!["x"]))],
        )
        .unwrap();
        let second = RecordBatch::try_new(
            ba,
            vec![Arc::new(StringArray::from(vec!["y"])), Arc::new(Int64Array::from(vec![2]))],
        )
        .unwrap();

        let (fixed, merged) = conform(1, &ab, second).unwrap();
        assert_eq!(merged, ab);
        assert_eq!(fixed.schema().field(0).name(), "a");

        let parse = ParseOptions::default();
        let mut assembler = BatchAssembler::new(&ArrowJsonTokenizer, &parse, false);
        assembler.push(0, fragment(first)).unwrap();
        assembler.push(1, fragment(fixed)).unwrap();
        let table = assembler.finish().unwrap();
        assert_eq!(table.column(0).as_primitive::<Int64Type>().values().to_vec(), vec![1, 2]);
        let b = table.column(1).as_string::<i32>();
        assert_eq!((b.value(0), b.value(1)), ("x", "y"));
    }

    #[test]
    fn integer_column_widens_to_float() {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Float64, true)]));
        let floats = RecordBatch::try_new(schema, vec![Arc::new(Float64Array::from(vec![2.5]))]).unwrap();
        let parse = ParseOptions::default();
        let mut assembler = BatchAssembler::new(&ArrowJsonTokenizer, &parse, false);
        assembler.push(0, fragment(int_batch("a", vec![1, 2]))).unwrap();
        assembler.push(1, fragment(floats)).unwrap();
        let table = assembler.finish().unwrap();
        assert_eq!(table.schema().field(0).data_type(), &DataType::Float64);
        let a = table.column(0).as_primitive::<Float64Type>();
        assert_eq!(a.values().to_vec(), vec![1.0, 2.0, 2.5]);
    }

    #[test]
    fn string_after_integer_is_a_mismatch() {
        let canonical = int_batch("a", vec![1]).schema();
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Utf8, true)]));
        let strings = RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec!["one"]))]).unwrap();
        let err = conform(2, &canonical, strings).unwrap_err();
        assert!(matches!(err, ReadError::SchemaMismatch { batch: 2, .. }));
    }

    #[test]
    fn columnless_fragment_becomes_null_rows() {
        let parse = ParseOptions::default();
        let mut assembler = BatchAssembler::new(&ArrowJsonTokenizer, &parse, false);
        let empty = ArrowJsonTokenizer
            .tokenize(DeviceBuffer::from_host(b"\n".to_vec()), &parse)
            .unwrap();
        assembler.push(0, empty).unwrap();
        assembler
            .push(1, fragment(int_batch("a", vec![4, 5])))
            .unwrap();
        let table = assembler.finish().unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.schema().field(0).name(), "a");
    }

    #[test]
    fn renamed_column_is_a_mismatch() {
        let canonical = int_batch("a", vec![1]).schema();
        let err = conform(3, &canonical, int_batch("b", vec![2])).unwrap_err();
        assert!(matches!(err, ReadError::SchemaMismatch { batch: 3, .. }));
    }

    #[test]
    fn single_source_reads_every_line() {
        let data = b"{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n";
        let out = read_json(vec![Source::host(data)], &ReaderOptions::default()).unwrap();
        assert_eq!(out.num_rows(), 3);
        assert_eq!(out.column_names, vec!["a"]);
        assert_eq!(out.stats.batches, 1);
        let a = out.table.column(0).as_primitive::<Int64Type>();
        assert_eq!(a.values().to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn parse_error_reports_stream_row() {
        let data = b"{\"a\":1}\n{\"a\":2}\nnope\n";
        let err = read_json(vec![Source::host(data)], &ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, ReadError::Parse { record: 2, .. }));
    }

    #[test]
    fn byte_range_needs_lines_mode() {
        let options = ReaderOptions::default().with_lines(false).with_byte_range(0, 4);
        let err = read_json(vec![Source::host(b"[]")], &options).unwrap_err();
        assert!(matches!(err, ReadError::InvalidOptions(_)));
    }

    #[test]
    fn no_sources_is_an_empty_table() {
        let out = read_json(Vec::new(), &ReaderOptions::default()).unwrap();
        assert_eq!(out.num_rows(), 0);
        assert!(out.column_names.is_empty());
    }
}
