//! RelationalDialectA: PG-family executor via `sqlx`.

use super::{A_SET, CompiledSql, Introspection, SqlExecutor, SqlOutcome, build_agg_query, build_exists_queries, is_dialect, specs_within};
use crate::{
    compile::SqlSpec,
    db,
    error::{AppResult, config_error, runtime_error},
    handle::{DatasetHandle, Dialect},
    result::{ExecutionSource, RuleResult, Severity, failure_mode_for}
};

pub struct RelationalDialectA;

impl RelationalDialectA {
    fn table(&self, handle: &DatasetHandle) -> AppResult<String> {
        if let Some(table) = &handle.table_ref {
            return Ok(table.clone());
        }
        let params = handle.db_params.as_ref().ok_or_else(|| config_error("postgres executor requires db_params"))?;
        match (&params.schema, &params.table) {
            (Some(s), Some(t)) => Ok(format!("{s}.{t}")),
            (None, Some(t)) => Ok(t.clone()),
            _ => Err(config_error("postgres executor is missing a table reference"))
        }
    }
}

impl SqlExecutor for RelationalDialectA {
    fn name(&self) -> &'static str {
        "relational_dialect_a"
    }

    fn supports(&self, handle: &DatasetHandle, specs: &[SqlSpec]) -> bool {
        is_dialect(handle, Dialect::Postgres) && specs_within(specs, A_SET)
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
        let params = handle.db_params.as_ref().ok_or_else(|| config_error("postgres executor requires db_params"))?;

        db::run_blocking(async {
            let pool = db::connect_postgres(params).await?;
            let mut results = Vec::new();

            for (rule_id, query) in &compiled.exists_queries {
                let rendered = query.replace("__kontra_table__", &table);
                let exists: bool = sqlx::query_scalar(&rendered)
                    .fetch_one(&pool)
                    .await
                    .map_err(|e| runtime_error(format!("exists probe for '{rule_id}' failed: {e}")))?;
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
                let row = sqlx::query(&rendered)
                    .fetch_one(&pool)
                    .await
                    .map_err(|e| runtime_error(format!("aggregate pushdown query failed: {e}")))?;
                for (rule_id, kind) in &compiled.agg_rule_order {
                    let failed_count: i64 = sqlx::Row::try_get(&row, rule_id.as_str()).unwrap_or(0);
                    let failed_count = failed_count.max(0) as u64;
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
        let params = handle.db_params.as_ref().ok_or_else(|| config_error("postgres executor requires db_params"))?;
        db::run_blocking(async {
            let pool = db::connect_postgres(params).await?;
            let row_count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&pool)
                .await
                .map_err(|e| runtime_error(format!("introspection count failed: {e}")))?;
            Ok(Introspection {
                row_count: Some(row_count.max(0) as u64),
                available_columns: Vec::new()
            })
        })
    }
}
