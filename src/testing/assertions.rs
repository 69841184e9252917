//! Assertion functions for checking read results.

use crate::reader::TableWithMetadata;
use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Int64Type};

/// Assert the table has exactly `expected` rows.
///
/// # Panics
///
/// Panics if the row count differs.
pub fn assert_row_count(out: &TableWithMetadata, expected: usize) {
    assert_eq!(
        out.num_rows(),
        expected,
        "Row count mismatch:\n  Expected: {expected}\n  Actual: {}\n  Stats: {:?}",
        out.num_rows(),
        out.stats
    );
}

/// Values of an `Int64` column, with nulls as `None`.
///
/// # Panics
///
/// Panics if the column is missing or is not `Int64`.
#[must_use]
pub fn int64_column(out: &TableWithMetadata, name: &str) -> Vec<Option<i64>> {
    let column = out
        .table
        .column_by_name(name)
        .unwrap_or_else(|| panic!("Missing column {name:?}; columns: {:?}", out.column_names));
    assert_eq!(
        column.data_type(),
        &DataType::Int64,
        "Column {name:?} is not Int64"
    );
    column.as_primitive::<Int64Type>().iter().collect()
}

/// Values of a `Utf8` column, with nulls as `None`.
///
/// # Panics
///
/// Panics if the column is missing or is not `Utf8`.
#[must_use]
pub fn string_column(out: &TableWithMetadata, name: &str) -> Vec<Option<String>> {
    let column = out
        .table
        .column_by_name(name)
        .unwrap_or_else(|| panic!("Missing column {name:?}; columns: {:?}", out.column_names));
    assert_eq!(
        column.data_type(),
        &DataType::Utf8,
        "Column {name:?} is not Utf8"
    );
    column
        .as_string::<i32>()
        .iter()
        .map(|v| v.map(str::to_owned))
        .collect()
}

/// Assert every column is null in row `row`.
///
/// # Panics
///
/// Panics if any column holds a value in that row.
pub fn assert_row_is_null(out: &TableWithMetadata, row: usize) {
    for (name, column) in out.column_names.iter().zip(out.table.columns()) {
        assert!(
            column.is_null(row),
            "Expected row {row} to be null, but column {name:?} holds a value"
        );
    }
}
