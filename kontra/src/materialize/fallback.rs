//! LocalFallbackMaterializer: local parquet/csv read via the same readers
//! the file engine uses, without the file engine's network-aware transport
//! or row-group projection wiring (`spec.md` §4.5).

use std::fs;

use bytes::Bytes;
use serde_json::{Value, json};

use super::{
    Materializer,
    file_engine::{read_csv, read_parquet}
};
use crate::{
    batch::ColumnarBatch,
    error::{AppResult, resource_error},
    handle::{DatasetHandle, Format}
};

pub struct LocalFallbackMaterializer {
    handle: DatasetHandle
}

impl LocalFallbackMaterializer {
    pub fn new(handle: DatasetHandle) -> Self {
        Self { handle }
    }

    fn read_local(&self) -> AppResult<Bytes> {
        let path = self.handle.path.trim_start_matches("file://");
        fs::read(path).map(Bytes::from).map_err(|e| resource_error(format!("failed to read '{path}': {e}")))
    }
}

impl Materializer for LocalFallbackMaterializer {
    fn engine_name(&self) -> &'static str {
        "local_fallback"
    }

    fn schema(&self) -> AppResult<Vec<String>> {
        let batch = self.to_columnar(None)?;
        Ok(batch.column_names().into_iter().map(str::to_owned).collect())
    }

    fn to_columnar(&self, required_columns: Option<&[compact_str::CompactString]>) -> AppResult<ColumnarBatch> {
        let bytes = self.read_local()?;
        match self.handle.format {
            Format::Parquet => read_parquet(&bytes, required_columns),
            Format::Csv => read_csv(&bytes, required_columns),
            other => Err(resource_error(format!("local fallback cannot read format {other:?}")))
        }
    }

    fn io_debug(&self) -> Option<Value> {
        Some(json!({"engine": "local_fallback", "path": self.handle.path}))
    }
}
