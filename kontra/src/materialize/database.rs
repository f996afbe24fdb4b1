//! DatabaseMaterializer: pulls a projected result set from a relational
//! source into the same [`ColumnarBatch`] shape the file engine produces,
//! reusing the connection plumbing in [`crate::db`].

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use serde_json::{Value, json};
use sqlx::{Column, Row, TypeInfo};

use super::Materializer;
use crate::{
    batch::ColumnarBatch,
    db,
    error::{AppResult, config_error},
    handle::{DatasetHandle, Dialect}
};

pub struct DatabaseMaterializer {
    handle: DatasetHandle
}

impl DatabaseMaterializer {
    pub fn new(handle: DatasetHandle) -> Self {
        Self { handle }
    }

    fn table_ref(&self) -> AppResult<String> {
        if let Some(table) = &self.handle.table_ref {
            return Ok(table.clone());
        }
        let params = self
            .handle
            .db_params
            .as_ref()
            .ok_or_else(|| config_error("database handle has neither table_ref nor db_params"))?;
        match (&params.schema, &params.table) {
            (Some(schema), Some(table)) => Ok(format!("{schema}.{table}")),
            (None, Some(table)) => Ok(table.clone()),
            _ => Err(config_error("database handle is missing a table reference"))
        }
    }

    fn select_sql(&self, required_columns: Option<&[compact_str::CompactString]>) -> AppResult<String> {
        let table = self.table_ref()?;
        let projection = match required_columns {
            Some(cols) if !cols.is_empty() => cols.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", "),
            _ => "*".to_owned()
        };
        Ok(format!("SELECT {projection} FROM {table}"))
    }
}

impl Materializer for DatabaseMaterializer {
    fn engine_name(&self) -> &'static str {
        "database"
    }

    fn schema(&self) -> AppResult<Vec<String>> {
        let batch = self.to_columnar(None)?;
        Ok(batch.column_names().into_iter().map(str::to_owned).collect())
    }

    fn to_columnar(&self, required_columns: Option<&[compact_str::CompactString]>) -> AppResult<ColumnarBatch> {
        let sql = self.select_sql(required_columns)?;
        match self.handle.dialect {
            Some(Dialect::Postgres) => db::run_blocking(fetch_postgres(&self.handle, &sql)),
            Some(Dialect::SqlServer) => db::run_blocking(fetch_sqlserver(&self.handle, &sql)),
            None => Err(config_error("database materializer requires a resolved dialect"))
        }
    }

    fn io_debug(&self) -> Option<Value> {
        let host = self.handle.db_params.as_ref().and_then(|p| p.host.clone());
        let port = self.handle.db_params.as_ref().and_then(|p| p.port);
        let reachable = match (host.as_deref(), port) {
            (Some(h), Some(p)) => Some(db::tcp_reachable(h, p)),
            _ => None
        };
        Some(json!({"engine": "database", "dialect": format!("{:?}", self.handle.dialect), "reachable": reachable}))
    }
}

async fn fetch_postgres(handle: &DatasetHandle, sql: &str) -> AppResult<ColumnarBatch> {
    let params = handle
        .db_params
        .as_ref()
        .ok_or_else(|| config_error("postgres materializer requires db_params"))?;
    let pool = db::connect_postgres(params).await?;
    let rows = sqlx::query(sql)
        .fetch_all(&pool)
        .await
        .map_err(|e| crate::error::runtime_error(format!("postgres query failed: {e}")))?;

    let Some(first) = rows.first() else {
        return Ok(ColumnarBatch::empty());
    };

    let mut columns = indexmap::IndexMap::new();
    for (idx, col) in first.columns().iter().enumerate() {
        let array: ArrayRef = match col.type_info().name() {
            "INT2" | "INT4" | "INT8" => Arc::new(Int64Array::from(
                rows.iter().map(|r| r.try_get::<i64, _>(idx).ok()).collect::<Vec<_>>()
            )),
            "FLOAT4" | "FLOAT8" | "NUMERIC" => Arc::new(Float64Array::from(
                rows.iter().map(|r| r.try_get::<f64, _>(idx).ok()).collect::<Vec<_>>()
            )),
            _ => Arc::new(StringArray::from(
                rows.iter().map(|r| r.try_get::<String, _>(idx).ok()).collect::<Vec<_>>()
            ))
        };
        columns.insert(col.name().to_owned(), array);
    }

    Ok(ColumnarBatch::new(rows.len(), columns))
}

async fn fetch_sqlserver(handle: &DatasetHandle, sql: &str) -> AppResult<ColumnarBatch> {
    let params = handle
        .db_params
        .as_ref()
        .ok_or_else(|| config_error("sql server materializer requires db_params"))?;
    let mut client = db::connect_sqlserver(params).await?;
    let stream = client
        .query(sql, &[])
        .await
        .map_err(|e| crate::error::runtime_error(format!("sql server query failed: {e}")))?;
    let rows = stream
        .into_first_result()
        .await
        .map_err(|e| crate::error::runtime_error(format!("sql server result read failed: {e}")))?;

    let Some(first) = rows.first() else {
        return Ok(ColumnarBatch::empty());
    };

    let mut columns = indexmap::IndexMap::new();
    for (idx, col) in first.columns().iter().enumerate() {
        let array: ArrayRef = Arc::new(StringArray::from(
            rows.iter()
                .map(|r| r.try_get::<&str, _>(idx).ok().flatten().map(str::to_owned))
                .collect::<Vec<_>>()
        ));
        columns.insert(col.name().to_owned(), array);
    }

    Ok(ColumnarBatch::new(rows.len(), columns))
}
