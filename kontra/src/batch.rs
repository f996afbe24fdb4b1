//! The in-memory columnar batch shared by the planner, materializers, and
//! the columnar-tier execution pass.

use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray, TimestampMicrosecondArray},
    compute::concat_batches
};
use indexmap::IndexMap;

/// A single cell's value, widened to one of a small set of comparable
/// shapes so that rule predicates can stay dtype-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(i64)
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Float(v) => Some(*v),
            Cell::Timestamp(v) => Some(*v as f64),
            _ => None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Str(s) => Some(s.as_str()),
            _ => None
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

/// A projection-aware, name-indexed set of Arrow arrays, all sharing one
/// row count. Produced by a [`crate::materialize::Materializer`] and
/// consumed by [`crate::plan::execute_compiled`].
#[derive(Debug, Clone)]
pub struct ColumnarBatch {
    pub row_count: usize,
    pub columns:   IndexMap<String, ArrayRef>
}

impl ColumnarBatch {
    pub fn new(row_count: usize, columns: IndexMap<String, ArrayRef>) -> Self {
        Self { row_count, columns }
    }

    pub fn empty() -> Self {
        Self {
            row_count: 0,
            columns:   IndexMap::new()
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Read a single cell, widening whatever Arrow array type backs the
    /// column to a [`Cell`]. Returns `None` if the column or row is out of
    /// range.
    pub fn cell(&self, column: &str, row: usize) -> Option<Cell> {
        let array = self.columns.get(column)?;
        if row >= array.len() {
            return None;
        }
        if array.is_null(row) {
            return Some(Cell::Null);
        }
        if let Some(a) = array.as_any().downcast_ref::<Int64Array>() {
            return Some(Cell::Int(a.value(row)));
        }
        if let Some(a) = array.as_any().downcast_ref::<Float64Array>() {
            return Some(Cell::Float(a.value(row)));
        }
        if let Some(a) = array.as_any().downcast_ref::<StringArray>() {
            return Some(Cell::Str(a.value(row).to_owned()));
        }
        if let Some(a) = array.as_any().downcast_ref::<BooleanArray>() {
            return Some(Cell::Bool(a.value(row)));
        }
        if let Some(a) = array.as_any().downcast_ref::<TimestampMicrosecondArray>() {
            return Some(Cell::Timestamp(a.value(row)));
        }
        None
    }

    pub fn null_count(&self, column: &str) -> Option<usize> {
        self.columns.get(column).map(|a| a.null_count())
    }

    /// Build a batch with a single named boolean column; used by tests and
    /// by executors translating SQL results back into columnar form.
    pub fn from_bools(row_count: usize, column: &str, values: Vec<bool>) -> Self {
        let mut columns = IndexMap::new();
        let arr: ArrayRef = Arc::new(BooleanArray::from(values));
        columns.insert(column.to_owned(), arr);
        Self { row_count, columns }
    }

    /// Merge a sequence of same-schema Arrow batches (one per Parquet
    /// row group or CSV chunk) into a single [`ColumnarBatch`].
    pub fn from_record_batches(batches: &[RecordBatch]) -> Option<Self> {
        let first = batches.first()?;
        let schema = first.schema();
        let merged = concat_batches(&schema, batches).ok()?;
        let mut columns = IndexMap::new();
        for field in schema.fields() {
            let array = merged.column_by_name(field.name())?.clone();
            columns.insert(field.name().clone(), array);
        }
        Some(Self {
            row_count: merged.num_rows(),
            columns
        })
    }
}
