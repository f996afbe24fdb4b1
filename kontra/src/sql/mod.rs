//! SQL executor registry (C6): two-phase EXISTS+AGG pushdown over a
//! [`DatasetHandle`]'s non-metadata-handled [`SqlSpec`]s.
//!
//! Grounded on
//! `original_source/src/kontra/engine/executors/database_base.py`'s shared
//! `DatabaseSqlExecutor` base — expressed here as free functions shared by
//! every dialect rather than a base class, plus one thin trait per
//! dialect-specific connection concern.

mod custom_check;
mod dialect_a;
mod dialect_b;
mod file_executor;

use compact_str::CompactString;

pub use custom_check::validate_custom_sql;
pub use dialect_a::RelationalDialectA;
pub use dialect_b::RelationalDialectB;
pub use file_executor::FileSqlExecutor;

use crate::{
    compile::SqlSpec,
    db,
    error::{AppResult, config_error, runtime_error},
    handle::{DatasetHandle, Dialect, Format},
    result::{ExecutionSource, FailureMode, RuleResult, Severity},
    rules::{Rule, RuleKind}
};

/// A compiled two-phase SQL plan: Phase 1 is one EXISTS probe per `not_null`
/// rule; Phase 2 is a single aggregate query covering everything else.
pub struct CompiledSql {
    pub exists_queries: Vec<(CompactString, String)>,
    pub agg_query:      Option<String>,
    /// `(rule_id, rule_kind)` in the aggregate's column order, so `execute`
    /// can tag each result with the right `rule_name`/`failure_mode`.
    pub agg_rule_order: Vec<(CompactString, &'static str)>,
    /// The specs this plan was compiled from, kept verbatim so executors
    /// that evaluate in-process (`FileSqlExecutor`) retain full fidelity
    /// instead of re-deriving parameters from the rendered SQL text.
    pub specs:          Vec<SqlSpec>
}

pub struct SqlOutcome {
    pub results:             Vec<RuleResult>,
    pub staged_parquet_path: Option<std::path::PathBuf>
}

pub struct Introspection {
    pub row_count:        Option<u64>,
    pub available_columns: Vec<String>
}

pub trait SqlExecutor {
    /// Stable label surfaced in `RunStats::pushdown_summary` (`spec.md`
    /// §6's `{executor, ...}`).
    fn name(&self) -> &'static str;
    fn supports(&self, handle: &DatasetHandle, specs: &[SqlSpec]) -> bool;
    fn compile(&self, specs: &[SqlSpec]) -> CompiledSql;
    fn execute(&self, handle: &DatasetHandle, compiled: &CompiledSql) -> AppResult<SqlOutcome>;
    fn introspect(&self, handle: &DatasetHandle) -> AppResult<Introspection>;
}

/// Rule kinds every dialect in the A-set supports (`spec.md` §4.6 item 2).
const A_SET: &[&str] = &[
    "not_null",
    "min_rows",
    "max_rows",
    "freshness",
    "range",
    "regex",
    "compare",
    "conditional_not_null",
    "conditional_range",
    "unique",
    "allowed_values"
];

/// Rule kinds `FileSqlExecutor` supports (`spec.md` §4.6 item 1) — the A-set
/// minus `unique`/`allowed_values`.
const FILE_SET: &[&str] = &[
    "not_null",
    "min_rows",
    "max_rows",
    "freshness",
    "range",
    "regex",
    "compare",
    "conditional_not_null",
    "conditional_range"
];

/// `RelationalDialectB` supports the A-set minus regex (`spec.md` §4.6 item 3).
const DIALECT_B_SET: &[&str] = &[
    "not_null",
    "min_rows",
    "max_rows",
    "freshness",
    "range",
    "compare",
    "conditional_not_null",
    "conditional_range",
    "unique",
    "allowed_values"
];

fn specs_within(specs: &[SqlSpec], allowed: &[&str]) -> bool {
    !specs.is_empty() && specs.iter().all(|s| allowed.contains(&s.kind()))
}

/// Selects the first executor (in priority order) whose `supports` returns
/// true for `handle` and the (already metadata/earlier-tier-filtered)
/// `specs`. `spec.md` §4.8 step 5 calls this after filtering by `handled_ids`.
pub fn pick_executor(handle: &DatasetHandle, specs: &[SqlSpec]) -> Option<Box<dyn SqlExecutor>> {
    if specs.is_empty() {
        return None;
    }

    let file = FileSqlExecutor;
    if file.supports(handle, specs) {
        return Some(Box::new(file));
    }

    let dialect_a = RelationalDialectA;
    if dialect_a.supports(handle, specs) {
        return Some(Box::new(dialect_a));
    }

    let dialect_b = RelationalDialectB;
    if dialect_b.supports(handle, specs) {
        return Some(Box::new(dialect_b));
    }

    None
}

fn is_remote_file_handle(handle: &DatasetHandle) -> bool {
    matches!(handle.scheme.as_str(), "" | "file" | "s3" | "http" | "https") && matches!(handle.format, Format::Parquet | Format::Csv)
}

fn is_dialect(handle: &DatasetHandle, dialect: Dialect) -> bool {
    handle.dialect == Some(dialect)
}

/// Builds the Phase 2 aggregate SELECT for `specs`, each column aliased by
/// `rule_id`, following the aggregate contracts enumerated in `spec.md`
/// §4.6. `as_sql` lets each dialect render `CompareOp` in its own syntax
/// (all three dialects here use ANSI-compatible operators, so this is
/// shared rather than duplicated per dialect).
pub(crate) fn build_agg_query(table: &str, specs: &[SqlSpec]) -> (String, Vec<(CompactString, &'static str)>) {
    let mut exprs = Vec::with_capacity(specs.len());
    let mut order = Vec::with_capacity(specs.len());
    for spec in specs {
        if spec.kind() == "not_null" {
            continue;
        }
        let (rule_id, expr) = agg_expr(spec);
        exprs.push(format!("{expr} AS \"{rule_id}\""));
        order.push((rule_id, spec.kind()));
    }
    let query = if exprs.is_empty() {
        String::new()
    } else {
        format!("SELECT {} FROM {table}", exprs.join(", "))
    };
    (query, order)
}

fn agg_expr(spec: &SqlSpec) -> (CompactString, String) {
    use SqlSpec::*;
    match spec {
        MinRows { rule_id, threshold } => (rule_id.clone(), format!("GREATEST(0, {threshold} - COUNT(*))")),
        MaxRows { rule_id, threshold } => (rule_id.clone(), format!("GREATEST(0, COUNT(*) - {threshold})")),
        Unique { rule_id, column } => (
            rule_id.clone(),
            format!("COUNT(*) FILTER (WHERE {column} IS NOT NULL) - COUNT(DISTINCT {column}) FILTER (WHERE {column} IS NOT NULL)")
        ),
        AllowedValues { rule_id, column, values } => {
            let list = values.iter().map(|v| format!("'{v}'")).collect::<Vec<_>>().join(", ");
            (
                rule_id.clone(),
                format!("SUM(CASE WHEN {column} IS NULL OR {column} NOT IN ({list}) THEN 1 ELSE 0 END)")
            )
        }
        Freshness {
            rule_id,
            column,
            max_age_seconds
        } => (
            rule_id.clone(),
            format!("CASE WHEN MAX({column}) < NOW() - INTERVAL '{max_age_seconds} seconds' THEN 1 ELSE 0 END")
        ),
        Range { rule_id, column, min, max } => {
            let mut conds = vec![format!("{column} IS NULL")];
            if let Some(m) = min {
                conds.push(format!("{column} < {m}"));
            }
            if let Some(m) = max {
                conds.push(format!("{column} > {m}"));
            }
            (rule_id.clone(), format!("SUM(CASE WHEN {} THEN 1 ELSE 0 END)", conds.join(" OR ")))
        }
        Regex { rule_id, column, pattern } => (
            rule_id.clone(),
            format!("SUM(CASE WHEN {column} IS NULL OR {column} !~ '{pattern}' THEN 1 ELSE 0 END)")
        ),
        Compare { rule_id, left, op, right } => (
            rule_id.clone(),
            format!("SUM(CASE WHEN NOT ({left} {} {right}) THEN 1 ELSE 0 END)", op.as_sql())
        ),
        ConditionalNotNull {
            rule_id,
            column,
            when_column,
            when_op,
            when_value
        } => (
            rule_id.clone(),
            format!(
                "SUM(CASE WHEN {when_column} {} {} AND {column} IS NULL THEN 1 ELSE 0 END)",
                when_op.as_sql(),
                sql_literal(when_value)
            )
        ),
        ConditionalRange {
            rule_id,
            column,
            when_column,
            when_op,
            when_value,
            min,
            max
        } => {
            let mut conds = vec![format!("{column} IS NULL")];
            if let Some(m) = min {
                conds.push(format!("{column} < {m}"));
            }
            if let Some(m) = max {
                conds.push(format!("{column} > {m}"));
            }
            (
                rule_id.clone(),
                format!(
                    "SUM(CASE WHEN {when_column} {} {} AND ({}) THEN 1 ELSE 0 END)",
                    when_op.as_sql(),
                    sql_literal(when_value),
                    conds.join(" OR ")
                )
            )
        }
        NotNull { rule_id, column } => (rule_id.clone(), format!("SUM(CASE WHEN {column} IS NULL THEN 1 ELSE 0 END)"))
    }
}

fn sql_literal(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => format!("'{s}'"),
        other => other.to_string()
    }
}

/// Phase 1: one `EXISTS` probe per `not_null` spec (`spec.md` §4.6's default
/// EXISTS path; `failed_count` is reported as the lower bound `1`).
pub(crate) fn build_exists_queries(table: &str, specs: &[SqlSpec]) -> Vec<(CompactString, String)> {
    specs
        .iter()
        .filter_map(|s| match s {
            SqlSpec::NotNull { rule_id, column } => {
                Some((rule_id.clone(), format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE {column} IS NULL)")))
            }
            _ => None
        })
        .collect()
}

/// Executes `custom_sql_check` rules directly against a live connection
/// (`spec.md` §4.6's safety section) — the file executor never claims
/// these, since there is no real SQL engine behind it to validate against.
/// A handle with no live relational connection falls back to each rule's
/// own `config_error` result via [`crate::rules::Rule::validate`].
pub fn execute_custom_checks(handle: &DatasetHandle, checks: &[Rule]) -> AppResult<Vec<RuleResult>> {
    if checks.is_empty() {
        return Ok(Vec::new());
    }

    match handle.dialect {
        Some(Dialect::Postgres) => {
            let params = handle.db_params.as_ref().ok_or_else(|| config_error("custom_sql_check requires db_params"))?;
            db::run_blocking(async {
                let pool = db::connect_postgres(params).await?;
                let mut results = Vec::with_capacity(checks.len());
                for rule in checks {
                    results.push(run_postgres_custom_check(&pool, rule).await);
                }
                Ok(results)
            })
        }
        Some(Dialect::SqlServer) => {
            let params = handle.db_params.as_ref().ok_or_else(|| config_error("custom_sql_check requires db_params"))?;
            db::run_blocking(async {
                let mut client = db::connect_sqlserver(params).await?;
                let mut results = Vec::with_capacity(checks.len());
                for rule in checks {
                    results.push(run_sqlserver_custom_check(&mut client, rule).await);
                }
                Ok(results)
            })
        }
        None => Ok(checks.iter().map(|r| r.validate(&crate::batch::ColumnarBatch::empty())).collect())
    }
}

async fn run_postgres_custom_check(pool: &sqlx::PgPool, rule: &Rule) -> RuleResult {
    let RuleKind::CustomSqlCheck { sql } = &rule.kind else {
        return RuleResult::fail(
            rule.rule_id.clone(),
            rule.name(),
            rule.severity,
            ExecutionSource::Sql,
            1,
            "execute_custom_checks called with a non-custom_sql_check rule",
            FailureMode::ConfigError
        );
    };
    match validate_custom_sql(sql) {
        Ok(count_sql) => match sqlx::query_scalar::<_, i64>(&count_sql).fetch_one(pool).await {
            Ok(failed_count) => {
                let failed_count = failed_count.max(0) as u64;
                if failed_count == 0 {
                    RuleResult::pass(rule.rule_id.clone(), rule.name(), rule.severity, ExecutionSource::Sql, "custom SQL check reported no violations")
                } else {
                    RuleResult::fail(
                        rule.rule_id.clone(),
                        rule.name(),
                        rule.severity,
                        ExecutionSource::Sql,
                        failed_count,
                        format!("custom SQL check reports {failed_count} violation(s)"),
                        FailureMode::CustomCheckFailed
                    )
                }
            }
            Err(e) => RuleResult::fail(
                rule.rule_id.clone(),
                rule.name(),
                rule.severity,
                ExecutionSource::Sql,
                1,
                format!("custom SQL check failed to execute: {}", runtime_error(e.to_string())),
                FailureMode::ConfigError
            )
        },
        Err(e) => RuleResult::fail(rule.rule_id.clone(), rule.name(), rule.severity, ExecutionSource::Sql, 1, format!("{e}"), FailureMode::ConfigError)
    }
}

async fn run_sqlserver_custom_check(client: &mut db::SqlServerClient, rule: &Rule) -> RuleResult {
    let RuleKind::CustomSqlCheck { sql } = &rule.kind else {
        return RuleResult::fail(
            rule.rule_id.clone(),
            rule.name(),
            rule.severity,
            ExecutionSource::Sql,
            1,
            "execute_custom_checks called with a non-custom_sql_check rule",
            FailureMode::ConfigError
        );
    };
    match validate_custom_sql(sql) {
        Ok(count_sql) => {
            let outcome = async {
                let stream = client.query(&count_sql, &[]).await.map_err(|e| runtime_error(format!("custom SQL check failed: {e}")))?;
                let rows = stream
                    .into_first_result()
                    .await
                    .map_err(|e| runtime_error(format!("custom SQL check failed to read: {e}")))?;
                Ok::<_, crate::error::AppError>(rows.first().and_then(|r| r.get::<i32, _>(0)).unwrap_or(0))
            }
            .await;
            match outcome {
                Ok(failed_count) => {
                    let failed_count = failed_count.max(0) as u64;
                    if failed_count == 0 {
                        RuleResult::pass(rule.rule_id.clone(), rule.name(), rule.severity, ExecutionSource::Sql, "custom SQL check reported no violations")
                    } else {
                        RuleResult::fail(
                            rule.rule_id.clone(),
                            rule.name(),
                            rule.severity,
                            ExecutionSource::Sql,
                            failed_count,
                            format!("custom SQL check reports {failed_count} violation(s)"),
                            FailureMode::CustomCheckFailed
                        )
                    }
                }
                Err(e) => RuleResult::fail(rule.rule_id.clone(), rule.name(), rule.severity, ExecutionSource::Sql, 1, format!("{e}"), FailureMode::ConfigError)
            }
        }
        Err(e) => RuleResult::fail(rule.rule_id.clone(), rule.name(), rule.severity, ExecutionSource::Sql, 1, format!("{e}"), FailureMode::ConfigError)
    }
}
