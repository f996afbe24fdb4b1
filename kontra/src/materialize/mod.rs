//! Materializer registry (C5): turns a [`DatasetHandle`] into an in-memory
//! [`ColumnarBatch`], honoring column projection when possible.
//!
//! Grounded on `spec.md` §4.5's deterministic selection policy.

mod database;
mod fallback;
mod file_engine;

use compact_str::CompactString;
use serde_json::Value;

pub use database::DatabaseMaterializer;
pub use fallback::LocalFallbackMaterializer;
pub use file_engine::FileEngineMaterializer;

use crate::{
    batch::ColumnarBatch,
    error::AppResult,
    handle::{DatasetHandle, Dialect, Format}
};

pub trait Materializer {
    /// Stable label surfaced in `RunStats::engine_label` (`spec.md` §6).
    fn engine_name(&self) -> &'static str;

    /// Column names available in the dataset. Cheap — no full data scan
    /// where the backing format allows it.
    fn schema(&self) -> AppResult<Vec<String>>;

    /// Produce a batch, projected to `required_columns` when given.
    fn to_columnar(&self, required_columns: Option<&[CompactString]>) -> AppResult<ColumnarBatch>;

    /// Like [`Materializer::to_columnar`], but additionally honors a
    /// preplan-derived row-group manifest when the backing format supports
    /// it (`spec.md` §4.8 step 6). Materializers with no row-group concept
    /// (CSV, database tables) ignore `row_groups` and defer to
    /// `to_columnar`.
    fn to_columnar_with_row_groups(&self, required_columns: Option<&[CompactString]>, row_groups: Option<&[usize]>) -> AppResult<ColumnarBatch> {
        let _ = row_groups;
        self.to_columnar(required_columns)
    }

    /// Optional diagnostics surfaced in `RunStats` when `KONTRA_IO_DEBUG=1`.
    fn io_debug(&self) -> Option<Value> {
        None
    }
}

/// Reads the raw bytes backing a file-based handle (local, `s3://`, or
/// `http(s)://`), without decoding any rows — the only thing
/// [`crate::preplan`] needs before it inspects the Parquet footer.
pub fn fetch_file_bytes(handle: &DatasetHandle) -> AppResult<bytes::Bytes> {
    FileEngineMaterializer::new(handle.clone()).fetch_bytes()
}

/// Deterministic selection: remote file formats go through the file engine,
/// relational dialects go through the database materializer, everything
/// else falls back to a local parquet/csv read.
pub fn pick_materializer(handle: &DatasetHandle) -> Box<dyn Materializer> {
    let is_remote_file = matches!(handle.scheme.as_str(), "s3" | "http" | "https")
        && matches!(handle.format, Format::Parquet | Format::Csv);
    if is_remote_file {
        return Box::new(FileEngineMaterializer::new(handle.clone()));
    }

    if matches!(handle.dialect, Some(Dialect::Postgres) | Some(Dialect::SqlServer)) {
        return Box::new(DatabaseMaterializer::new(handle.clone()));
    }

    Box::new(LocalFallbackMaterializer::new(handle.clone()))
}
