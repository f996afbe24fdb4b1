//! RelationalDialectB: T-SQL-family executor via `tiberius`. Supports the
//! A-set minus regex (`spec.md` §4.6 item 3) — a `Regex` spec in the input
//! is simply never satisfied by `supports`, leaving it for the columnar
//! tier.

use super::{CompiledSql, DIALECT_B_SET, Introspection, SqlExecutor, SqlOutcome, build_agg_query, build_exists_queries, is_dialect, specs_within};
use crate::{
    compile::SqlSpec,
    db,
    error::{AppResult, config_error, runtime_error},
    handle::{DatasetHandle, Dialect},
    result::{ExecutionSource, RuleResult, Severity, failure_mode_for}
};

pub struct RelationalDialectB;

impl RelationalDialectB {
    fn table(&self, handle: &DatasetHandle) -> AppResult<String> {
        if let Some(table) = &handle.table_ref {
            return Ok(table.clone());
        }
        let params = handle.db_params.as_ref().ok_or_else(|| config_error("sql server executor requires db_params"))?;
        match (&params.schema, &params.table) {
            (Some(s), Some(t)) => Ok(format!("{s}.{t}")),
            (None, Some(t)) => Ok(t.clone()),
            _ => Err(config_error("sql server executor is missing a table reference"))
        }
    }
}

impl SqlExecutor for RelationalDialectB {
    fn name(&self) -> &'static str {
        "relational_dialect_b"
    }

    fn supports(&self, handle: &DatasetHandle, specs: &[SqlSpec]) -> bool {
        is_dialect(handle, Dialect::SqlServer) && specs_within(specs, DIALECT_B_SET)
    }

    fn compile(&self, specs: &[SqlSpec]) -> CompiledSql {
        let table = "__kontra_table__".to_owned();
        let exists_queries = build_exists_queries(&table, specs);
        let (agg_query, agg_rule_order) = build_agg_query(&table, specs);
        CompiledSql {
            exists_queries,
            agg_query: if agg_query.is_empty() { None } else { Some(agg_query) },
            agg_rule_order,
            specs: specs.to_vec()
        }
    }

    fn execute(&self, handle: &DatasetHandle, compiled: &CompiledSql) -> AppResult<SqlOutcome> {
        let table = self.table(handle)?;
        let params = handle.db_params.as_ref().ok_or_else(|| config_error("sql server executor requires db_params"))?;

        db::run_blocking(async {
            let mut client = db::connect_sqlserver(params).await?;
            let mut results = Vec::new();

            for (rule_id, query) in &compiled.exists_queries {
                let rendered = query.replace("__kontra_table__", &table);
                let stream = client
                    .query(&rendered, &[])
                    .await
                    .map_err(|e| runtime_error(format!("exists probe for '{rule_id}' failed: {e}")))?;
                let rows = stream
                    .into_first_result()
                    .await
                    .map_err(|e| runtime_error(format!("exists probe for '{rule_id}' failed to read: {e}")))?;
                let exists = rows.first().and_then(|r| r.get::<bool, _>(0)).unwrap_or(false);
                results.push(if exists {
                    RuleResult::fail(
                        rule_id.clone(),
                        "not_null",
                        Severity::Blocking,
                        ExecutionSource::Sql,
                        1,
                        "column has at least one null value",
                        failure_mode_for("not_null")
                    )
                } else {
                    RuleResult::pass(rule_id.clone(), "not_null", Severity::Blocking, ExecutionSource::Sql, "column has no null values")
                });
            }

            if let Some(agg_query) = &compiled.agg_query {
                let rendered = agg_query.replace("__kontra_table__", &table);
                let stream = client
                    .query(&rendered, &[])
                    .await
                    .map_err(|e| runtime_error(format!("aggregate pushdown query failed: {e}")))?;
                let rows = stream
                    .into_first_result()
                    .await
                    .map_err(|e| runtime_error(format!("aggregate pushdown result read failed: {e}")))?;
                let row = rows.first();

                for (idx, (rule_id, kind)) in compiled.agg_rule_order.iter().enumerate() {
                    let failed_count = row.and_then(|r| r.get::<i64, _>(idx)).unwrap_or(0).max(0) as u64;
                    results.push(if failed_count == 0 {
                        RuleResult::pass(rule_id.clone(), kind, Severity::Blocking, ExecutionSource::Sql, "aggregate check passed")
                    } else {
                        RuleResult::fail(
                            rule_id.clone(),
                            kind,
                            Severity::Blocking,
                            ExecutionSource::Sql,
                            failed_count,
                            format!("aggregate check reports {failed_count} violation(s)"),
                            failure_mode_for(kind)
                        )
                    });
                }
            }

            Ok(SqlOutcome {
                results,
                staged_parquet_path: None
            })
        })
    }

    fn introspect(&self, handle: &DatasetHandle) -> AppResult<Introspection> {
        let table = self.table(handle)?;
        let params = handle.db_params.as_ref().ok_or_else(|| config_error("sql server executor requires db_params"))?;
        db::run_blocking(async {
            let mut client = db::connect_sqlserver(params).await?;
            let stream = client
                .query(format!("SELECT COUNT(*) FROM {table}"), &[])
                .await
                .map_err(|e| runtime_error(format!("introspection count failed: {e}")))?;
            let rows = stream
                .into_first_result()
                .await
                .map_err(|e| runtime_error(format!("introspection count read failed: {e}")))?;
            let row_count = rows.first().and_then(|r| r.get::<i32, _>(0)).unwrap_or(0);
            Ok(Introspection {
                row_count: Some(row_count.max(0) as u64),
                available_columns: Vec::new()
            })
        })
    }
}
