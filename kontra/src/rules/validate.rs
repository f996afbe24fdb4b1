//! Row-count-based fallback validation for rule kinds that need
//! whole-dataset reasoning and therefore never compile to a per-row
//! predicate: `Unique`, `MinRows`, `MaxRows`, `Freshness`, `Dtype`, and
//! `CustomSqlCheck` when no SQL executor handled it.

use chrono::Utc;
use std::collections::HashSet;

use crate::{
    batch::{Cell, ColumnarBatch},
    dtype::{arrow_family, normalize_alias},
    result::{ExecutionSource, FailureMode, RuleResult},
    rules::model::{Rule, RuleKind}
};

impl Rule {
    /// Whole-frame validation for rule kinds [`crate::compile::compile_predicate`]
    /// never handles. Missing required columns produce a `config_error`
    /// result rather than a panic.
    pub fn validate(&self, batch: &ColumnarBatch) -> RuleResult {
        match &self.kind {
            RuleKind::Unique { column } => self.validate_unique(batch, column),
            RuleKind::MinRows { n } => self.validate_min_rows(batch, *n),
            RuleKind::MaxRows { n } => self.validate_max_rows(batch, *n),
            RuleKind::Freshness {
                column,
                max_age_seconds
            } => self.validate_freshness(batch, column, *max_age_seconds),
            RuleKind::Dtype {
                column,
                expected_type,
                ..
            } => self.validate_dtype(batch, column, expected_type),
            RuleKind::CustomSqlCheck { .. } => self.validate_custom_sql_check(),
            other => self.config_error_result(&format!(
                "rule kind '{}' has no fallback validation path",
                other.name()
            ))
        }
    }

    fn config_error_result(&self, message: &str) -> RuleResult {
        RuleResult::fail(
            self.rule_id.clone(),
            self.name(),
            self.severity,
            ExecutionSource::Columnar,
            batch_failed_count_unknown(),
            message,
            FailureMode::ConfigError
        )
    }

    fn validate_unique(&self, batch: &ColumnarBatch, column: &compact_str::CompactString) -> RuleResult {
        if !batch.has_column(column.as_str()) {
            return self.config_error_result(&format!("required column '{column}' missing from materialized frame"));
        }
        let mut seen: HashSet<String> = HashSet::new();
        let mut duplicates: HashSet<String> = HashSet::new();
        let mut extra_occurrences: u64 = 0;
        for row in 0..batch.row_count {
            let Some(cell) = batch.cell(column.as_str(), row) else {
                continue;
            };
            if cell.is_null() {
                continue;
            }
            let key = cell_key(&cell);
            if !seen.insert(key.clone()) {
                extra_occurrences += 1;
                duplicates.insert(key);
            }
        }
        if extra_occurrences == 0 {
            RuleResult::pass(
                self.rule_id.clone(),
                self.name(),
                self.severity,
                ExecutionSource::Columnar,
                format!("column '{column}' has no duplicate values")
            )
            .with_column(column.clone())
        } else {
            RuleResult::fail(
                self.rule_id.clone(),
                self.name(),
                self.severity,
                ExecutionSource::Columnar,
                extra_occurrences,
                format!("column '{column}' contains {extra_occurrences} duplicate value(s)"),
                FailureMode::DuplicateValues
            )
            .with_column(column.clone())
        }
    }

    fn validate_min_rows(&self, batch: &ColumnarBatch, n: u64) -> RuleResult {
        let row_count = batch.row_count as u64;
        let failed = n.saturating_sub(row_count);
        if failed == 0 {
            RuleResult::pass(
                self.rule_id.clone(),
                self.name(),
                self.severity,
                ExecutionSource::Columnar,
                format!("row count {row_count} satisfies minimum {n}")
            )
        } else {
            RuleResult::fail(
                self.rule_id.clone(),
                self.name(),
                self.severity,
                ExecutionSource::Columnar,
                1,
                format!("row count {row_count} is below minimum {n}"),
                FailureMode::RowCountLow
            )
        }
    }

    fn validate_max_rows(&self, batch: &ColumnarBatch, n: u64) -> RuleResult {
        let row_count = batch.row_count as u64;
        let failed = row_count.saturating_sub(n);
        if failed == 0 {
            RuleResult::pass(
                self.rule_id.clone(),
                self.name(),
                self.severity,
                ExecutionSource::Columnar,
                format!("row count {row_count} satisfies maximum {n}")
            )
        } else {
            RuleResult::fail(
                self.rule_id.clone(),
                self.name(),
                self.severity,
                ExecutionSource::Columnar,
                1,
                format!("row count {row_count} exceeds maximum {n}"),
                FailureMode::RowCountHigh
            )
        }
    }

    fn validate_freshness(
        &self,
        batch: &ColumnarBatch,
        column: &compact_str::CompactString,
        max_age_seconds: i64
    ) -> RuleResult {
        if !batch.has_column(column.as_str()) {
            return self.config_error_result(&format!("required column '{column}' missing from materialized frame"));
        }
        let mut max_ts: Option<i64> = None;
        for row in 0..batch.row_count {
            if let Some(Cell::Timestamp(ts)) = batch.cell(column.as_str(), row) {
                max_ts = Some(max_ts.map_or(ts, |m: i64| m.max(ts)));
            }
        }
        let now_micros = Utc::now().timestamp_micros();
        let threshold = now_micros - max_age_seconds * 1_000_000;
        match max_ts {
            Some(ts) if ts >= threshold => RuleResult::pass(
                self.rule_id.clone(),
                self.name(),
                self.severity,
                ExecutionSource::Columnar,
                format!("column '{column}' is fresh")
            )
            .with_column(column.clone()),
            Some(_) => RuleResult::fail(
                self.rule_id.clone(),
                self.name(),
                self.severity,
                ExecutionSource::Columnar,
                1,
                format!("column '{column}' exceeds the freshness threshold"),
                FailureMode::FreshnessLag
            )
            .with_column(column.clone()),
            None => self.config_error_result(&format!("column '{column}' has no timestamp values to evaluate"))
        }
    }

    fn validate_dtype(&self, batch: &ColumnarBatch, column: &compact_str::CompactString, expected_type: &str) -> RuleResult {
        let Some(array) = batch.columns.get(column.as_str()) else {
            return self.config_error_result(&format!("required column '{column}' missing from materialized frame"));
        };
        let expected = normalize_alias(expected_type);
        let actual = arrow_family(array.data_type());
        if expected == actual {
            RuleResult::pass(
                self.rule_id.clone(),
                self.name(),
                self.severity,
                ExecutionSource::Columnar,
                format!("column '{column}' matches expected type {expected_type}")
            )
            .with_column(column.clone())
        } else {
            RuleResult::fail(
                self.rule_id.clone(),
                self.name(),
                self.severity,
                ExecutionSource::Columnar,
                batch.row_count as u64,
                format!("column '{column}' expected type {expected_type:?}, found {actual:?}"),
                FailureMode::SchemaDrift
            )
            .with_column(column.clone())
            .with_details(serde_json::json!({"expected": expected_type, "actual": format!("{actual:?}")}))
        }
    }

    fn validate_custom_sql_check(&self) -> RuleResult {
        self.config_error_result(
            "custom_sql_check requires a SQL-capable executor; no executor handled this rule in the SQL tier"
        )
    }
}

fn cell_key(cell: &Cell) -> String {
    match cell {
        Cell::Null => String::new(),
        Cell::Bool(b) => b.to_string(),
        Cell::Int(i) => i.to_string(),
        Cell::Float(f) => f.to_string(),
        Cell::Str(s) => s.clone(),
        Cell::Timestamp(t) => t.to_string()
    }
}

fn batch_failed_count_unknown() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Int64Array, StringArray};
    use indexmap::IndexMap;

    use super::*;
    use crate::rules::{build_rules, RuleSpec};

    fn rule(name: &str, params: serde_json::Value) -> Rule {
        let spec = RuleSpec {
            name: name.into(),
            id: None,
            params,
            severity: None
        };
        build_rules(&[spec]).unwrap().remove(0)
    }

    #[test]
    fn min_rows_boundary_b1() {
        let mut columns = IndexMap::new();
        columns.insert("id".to_string(), Arc::new(Int64Array::from(vec![1, 2, 3])) as _);
        let batch = ColumnarBatch::new(3, columns);

        let exact = rule("min_rows", serde_json::json!({"n": 3}));
        assert!(exact.validate(&batch).passed);

        let one_short = rule("min_rows", serde_json::json!({"n": 4}));
        let result = one_short.validate(&batch);
        assert!(!result.passed);
        assert_eq!(result.failed_count, 1);
    }

    #[test]
    fn unique_all_nulls_passes_b4() {
        let mut columns = IndexMap::new();
        columns.insert(
            "email".to_string(),
            Arc::new(StringArray::from(vec![None::<&str>, None, None])) as _
        );
        let batch = ColumnarBatch::new(3, columns);
        let r = rule("unique", serde_json::json!({"column": "email"}));
        assert!(r.validate(&batch).passed);
    }

    #[test]
    fn unique_counts_duplicates() {
        let mut columns = IndexMap::new();
        columns.insert(
            "email".to_string(),
            Arc::new(StringArray::from(vec![Some("a"), Some("a"), Some("b")])) as _
        );
        let batch = ColumnarBatch::new(3, columns);
        let r = rule("unique", serde_json::json!({"column": "email"}));
        let result = r.validate(&batch);
        assert!(!result.passed);
        assert_eq!(result.failed_count, 1);
    }
}
