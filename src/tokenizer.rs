//! The tokenizer boundary: one normalized batch in, one table fragment out.
//!
//! The reader only needs something implementing [`Tokenizer`]. The default,
//! [`ArrowJsonTokenizer`], splits the buffer into records, validates each with
//! `serde_json`, infers an Arrow schema over the valid ones, applies any type
//! overrides from [`ParseOptions`], and decodes the rows with `arrow::json`.
//!
//! Under [`RecoveryMode::RecoverWithNull`] a malformed record still produces a
//! row, with every column null. Under [`RecoveryMode::Fail`] the first
//! malformed record is returned as [`ReadError::Parse`].

use crate::device::DeviceBuffer;
use crate::error::{ReadError, Result};
use crate::options::{ParseOptions, RecoveryMode};
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::json::ReaderBuilder;
use arrow::json::reader::infer_json_schema_from_iterator;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Tokenizer output for one batch.
#[derive(Debug, Clone)]
pub struct TableFragment {
    pub batch: RecordBatch,
    /// Records that were malformed and materialized as null rows.
    pub malformed: usize,
}

impl TableFragment {
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }
}

/// Turns a normalized batch buffer into a table fragment.
pub trait Tokenizer: Send + Sync {
    /// Tokenize and materialize one batch. Takes ownership of the buffer.
    ///
    /// # Errors
    /// Returns [`ReadError::Parse`] for malformed input under
    /// [`RecoveryMode::Fail`], or an Arrow error if decoding fails.
    fn tokenize(&self, buffer: DeviceBuffer, options: &ParseOptions) -> Result<TableFragment>;
}

/// `serde_json` validation plus `arrow::json` materialization.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArrowJsonTokenizer;

impl Tokenizer for ArrowJsonTokenizer {
    fn tokenize(&self, buffer: DeviceBuffer, options: &ParseOptions) -> Result<TableFragment> {
        let mut records = Records::new(options.recovery_mode);
        if options.lines {
            split_lines(buffer.as_bytes(), options.delimiter, &mut records)?;
        } else {
            split_values(buffer.as_bytes(), options.delimiter, &mut records)?;
        }
        drop(buffer);

        let schema = infer_schema(&records.rows, options)?;
        let batch = materialize(&records.rows, schema)?;
        debug!(
            rows = batch.num_rows(),
            columns = batch.num_columns(),
            malformed = records.malformed,
            "tokenized batch"
        );
        Ok(TableFragment {
            batch,
            malformed: records.malformed,
        })
    }
}

/// Parsed rows of one batch; `None` marks a recovered malformed record.
struct Records {
    rows: Vec<Option<Value>>,
    malformed: usize,
    mode: RecoveryMode,
}

impl Records {
    fn new(mode: RecoveryMode) -> Self {
        Self {
            rows: Vec::new(),
            malformed: 0,
            mode,
        }
    }

    fn push(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Object(_) => {
                self.rows.push(Some(value));
                Ok(())
            }
            other => self.malformed(format!("expected a JSON object, found {}", json_kind(&other))),
        }
    }

    fn malformed(&mut self, message: String) -> Result<()> {
        match self.mode {
            RecoveryMode::Fail => Err(ReadError::Parse {
                record: self.rows.len(),
                message,
            }),
            RecoveryMode::RecoverWithNull => {
                debug!(record = self.rows.len(), %message, "recovering malformed record as nulls");
                self.rows.push(None);
                self.malformed += 1;
                Ok(())
            }
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// JSON Lines: one record per delimiter-separated line; blank lines are skipped.
fn split_lines(bytes: &[u8], delimiter: u8, records: &mut Records) -> Result<()> {
    for line in bytes.split(|b| *b == delimiter) {
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<Value>(line) {
            Ok(value) => records.push(value)?,
            Err(e) => records.malformed(e.to_string())?,
        }
    }
    Ok(())
}

/// Whole-document mode: top-level values separated by whitespace, commas, or
/// the source delimiter. Arrays contribute each element as a record.
fn split_values(bytes: &[u8], delimiter: u8, records: &mut Records) -> Result<()> {
    let is_separator = |b: u8| b.is_ascii_whitespace() || b == b',' || b == delimiter;
    let mut pos = 0;
    loop {
        while pos < bytes.len() && is_separator(bytes[pos]) {
            pos += 1;
        }
        if pos >= bytes.len() {
            return Ok(());
        }
        let mut stream = serde_json::Deserializer::from_slice(&bytes[pos..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Array(items))) => {
                for item in items {
                    records.push(item)?;
                }
            }
            Some(Ok(value)) => records.push(value)?,
            Some(Err(e)) => {
                records.malformed(e.to_string())?;
                // No way to resynchronize inside a document.
                warn!(offset = pos, "dropping the rest of the batch after a malformed document");
                return Ok(());
            }
            None => return Ok(()),
        }
        pos += stream.byte_offset();
    }
}

fn infer_schema(rows: &[Option<Value>], options: &ParseOptions) -> Result<SchemaRef> {
    let inferred = infer_json_schema_from_iterator(rows.iter().flatten().map(Ok::<_, ArrowError>))?;
    let mut fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|f| match options.dtype(f.name()) {
            Some(dt) => Field::new(f.name(), dt.clone(), true),
            None => f.as_ref().clone(),
        })
        .collect();
    for (name, dt) in &options.dtypes {
        if !fields.iter().any(|f| f.name() == name) {
            fields.push(Field::new(name, dt.clone(), true));
        }
    }
    Ok(Arc::new(Schema::new(fields)))
}

fn materialize(rows: &[Option<Value>], schema: SchemaRef) -> Result<RecordBatch> {
    if schema.fields().is_empty() {
        let opts = RecordBatchOptions::new().with_row_count(Some(rows.len()));
        return Ok(RecordBatch::try_new_with_options(schema, vec![], &opts)?);
    }
    let null_row = Value::Object(Map::new());
    let values: Vec<&Value> = rows.iter().map(|r| r.as_ref().unwrap_or(&null_row)).collect();
    let mut decoder = ReaderBuilder::new(Arc::clone(&schema))
        .with_batch_size(values.len().max(1))
        .with_coerce_primitive(true)
        .build_decoder()?;
    decoder.serialize(&values)?;
    Ok(decoder
        .flush()?
        .unwrap_or_else(|| RecordBatch::new_empty(schema)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{DataType, Int64Type};

    fn tokenize(input: &str, options: &ParseOptions) -> Result<TableFragment> {
        ArrowJsonTokenizer.tokenize(DeviceBuffer::from_host(input.as_bytes().to_vec()), options)
    }

    #[test]
    fn lines_become_rows_in_order() {
        let frag = tokenize("{\"a\":1,\"b\":\"x\"}\n\n{\"a\":2}\n{\"a\":3,\"b\":\"z\"}\n", &ParseOptions::default()).unwrap();
        assert_eq!(frag.num_rows(), 3);
        assert_eq!(frag.column_names(), vec!["a", "b"]);
        let a = frag.batch.column(0).as_primitive::<Int64Type>();
        assert_eq!(a.values().to_vec(), vec![1, 2, 3]);
        assert!(frag.batch.column(1).is_null(1));
    }

    #[test]
    fn malformed_line_fails_or_becomes_nulls() {
        let input = "{\"a\":1}\n{\"a\":\n{\"a\":3}";
        let err = tokenize(input, &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ReadError::Parse { record: 1, .. }));

        let options = ParseOptions {
            recovery_mode: RecoveryMode::RecoverWithNull,
            ..ParseOptions::default()
        };
        let frag = tokenize(input, &options).unwrap();
        assert_eq!(frag.num_rows(), 3);
        assert_eq!(frag.malformed, 1);
        let a = frag.batch.column(0);
        assert!(a.is_valid(0));
        assert!(a.is_null(1));
        assert!(a.is_valid(2));
    }

    #[test]
    fn type_hints_override_and_add_columns() {
        let options = ParseOptions {
            dtypes: vec![
                ("a".to_string(), DataType::Float64),
                ("missing".to_string(), DataType::Utf8),
            ],
            ..ParseOptions::default()
        };
        let frag = tokenize("{\"a\":1}\n{\"a\":2}", &options).unwrap();
        let schema = frag.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Float64);
        assert_eq!(schema.field(1).name(), "missing");
        assert_eq!(frag.batch.column(1).null_count(), 2);
    }

    #[test]
    fn document_mode_flattens_arrays() {
        let options = ParseOptions {
            lines: false,
            delimiter: b',',
            ..ParseOptions::default()
        };
        let frag = tokenize("[{\"a\":1},{\"a\":2}],[{\"a\":3}] {\"a\":4}", &options).unwrap();
        assert_eq!(frag.num_rows(), 4);
    }

    #[test]
    fn empty_buffer_is_an_empty_fragment() {
        let frag = tokenize("  \n \n", &ParseOptions::default()).unwrap();
        assert_eq!(frag.num_rows(), 0);
        assert_eq!(frag.batch.num_columns(), 0);
    }
}
