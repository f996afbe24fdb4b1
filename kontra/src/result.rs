//! Result types & merger (C9): the uniform per-rule result record and the
//! deterministic merge across tiers.

use std::collections::HashMap;

use compact_str::CompactString;
use serde::Serialize;
use serde_json::Value;

use crate::rules::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionSource {
    Metadata,
    Sql,
    Columnar
}

/// Closed set of failure explanations. Never extended ad hoc — a new
/// failure shape should map onto the nearest existing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    NullValues,
    DuplicateValues,
    NovelCategory,
    RangeViolation,
    SchemaDrift,
    FreshnessLag,
    RowCountLow,
    RowCountHigh,
    PatternMismatch,
    CustomCheckFailed,
    ConfigError
}

/// Stable wire shape for a single rule's verdict (`spec.md` §6).
#[derive(Debug, Clone, Serialize)]
pub struct RuleResult {
    pub rule_id:          CompactString,
    pub rule_name:        &'static str,
    pub passed:           bool,
    pub failed_count:     u64,
    pub message:          String,
    pub severity:         Severity,
    pub execution_source: ExecutionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_mode:     Option<FailureMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details:          Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column:           Option<CompactString>
}

impl RuleResult {
    pub fn pass(
        rule_id: CompactString,
        rule_name: &'static str,
        severity: Severity,
        source: ExecutionSource,
        message: impl Into<String>
    ) -> Self {
        Self {
            rule_id,
            rule_name,
            passed: true,
            failed_count: 0,
            message: message.into(),
            severity,
            execution_source: source,
            failure_mode: None,
            details: None,
            column: None
        }
    }

    pub fn fail(
        rule_id: CompactString,
        rule_name: &'static str,
        severity: Severity,
        source: ExecutionSource,
        failed_count: u64,
        message: impl Into<String>,
        failure_mode: FailureMode
    ) -> Self {
        Self {
            rule_id,
            rule_name,
            passed: failed_count == 0,
            failed_count,
            message: message.into(),
            severity,
            execution_source: source,
            failure_mode: Some(failure_mode),
            details: None,
            column: None
        }
    }

    pub fn with_column(mut self, column: CompactString) -> Self {
        self.column = Some(column);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// `summary.passed := blocking_failures == 0`; warning/info never fail the
/// run.
#[derive(Debug, Clone, Serialize, Default)]
pub struct RunSummary {
    pub passed:            bool,
    pub total_rules:       usize,
    pub rules_passed:      usize,
    pub rules_failed:      usize,
    pub blocking_failures: usize,
    pub warning_failures:  usize,
    pub info_failures:     usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count:         Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_count:      Option<usize>,
    pub dataset_name:      String
}

pub fn summarize(
    results: &[RuleResult],
    dataset_name: &str,
    row_count: Option<u64>,
    column_count: Option<usize>
) -> RunSummary {
    let mut summary = RunSummary {
        dataset_name: dataset_name.to_owned(),
        row_count,
        column_count,
        total_rules: results.len(),
        ..Default::default()
    };
    for r in results {
        if r.passed {
            summary.rules_passed += 1;
        } else {
            summary.rules_failed += 1;
            match r.severity {
                Severity::Blocking => summary.blocking_failures += 1,
                Severity::Warning => summary.warning_failures += 1,
                Severity::Info => summary.info_failures += 1
            }
        }
    }
    summary.passed = summary.blocking_failures == 0;
    summary
}

/// Maps a rule's stable name to the closed failure-mode tag used when a
/// predicate or pushed-down aggregate reports a nonzero `failed_count`.
/// Shared by the columnar tier ([`crate::plan`]) and the SQL tier
/// ([`crate::sql`]) so both produce the same taxonomy for the same rule.
pub fn failure_mode_for(rule_name: &str) -> FailureMode {
    match rule_name {
        "not_null" | "conditional_not_null" => FailureMode::NullValues,
        "unique" => FailureMode::DuplicateValues,
        "allowed_values" | "disallowed_values" => FailureMode::NovelCategory,
        "range" | "conditional_range" => FailureMode::RangeViolation,
        "regex" | "length" | "contains" | "starts_with" | "ends_with" => FailureMode::PatternMismatch,
        "min_rows" => FailureMode::RowCountLow,
        "max_rows" => FailureMode::RowCountHigh,
        "freshness" => FailureMode::FreshnessLag,
        "dtype" => FailureMode::SchemaDrift,
        "custom_sql_check" => FailureMode::CustomCheckFailed,
        _ => FailureMode::ConfigError
    }
}

/// Deterministic precedence: metadata > sql > columnar. In practice the
/// tiers are disjoint by construction (the `handled_ids` mechanism in
/// [`crate::orchestrator`]); this function enforces the invariant
/// defensively and restores contract order.
pub fn merge(
    contract_order: &[CompactString],
    metadata: Vec<RuleResult>,
    sql: Vec<RuleResult>,
    columnar: Vec<RuleResult>
) -> Vec<RuleResult> {
    let mut by_id: HashMap<CompactString, RuleResult> = HashMap::with_capacity(contract_order.len());
    for r in columnar {
        by_id.insert(r.rule_id.clone(), r);
    }
    for r in sql {
        by_id.insert(r.rule_id.clone(), r);
    }
    for r in metadata {
        by_id.insert(r.rule_id.clone(), r);
    }
    contract_order.iter().filter_map(|id| by_id.remove(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, source: ExecutionSource, passed: bool) -> RuleResult {
        RuleResult {
            rule_id: CompactString::from(id),
            rule_name: "not_null",
            passed,
            failed_count: if passed { 0 } else { 1 },
            message: String::new(),
            severity: Severity::Blocking,
            execution_source: source,
            failure_mode: None,
            details: None,
            column: None
        }
    }

    #[test]
    fn metadata_wins_over_sql_and_columnar() {
        let order = vec![CompactString::from("r1")];
        let merged = merge(
            &order,
            vec![result("r1", ExecutionSource::Metadata, true)],
            vec![result("r1", ExecutionSource::Sql, false)],
            vec![result("r1", ExecutionSource::Columnar, false)]
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].execution_source, ExecutionSource::Metadata);
        assert!(merged[0].passed);
    }

    #[test]
    fn merge_preserves_contract_order() {
        let order = vec![CompactString::from("b"), CompactString::from("a")];
        let merged = merge(
            &order,
            vec![],
            vec![],
            vec![
                result("a", ExecutionSource::Columnar, true),
                result("b", ExecutionSource::Columnar, true),
            ]
        );
        assert_eq!(merged[0].rule_id.as_str(), "b");
        assert_eq!(merged[1].rule_id.as_str(), "a");
    }

    #[test]
    fn summary_passed_ignores_warning_and_info() {
        let results = vec![
            {
                let mut r = result("w", ExecutionSource::Columnar, false);
                r.severity = Severity::Warning;
                r
            },
            {
                let mut r = result("i", ExecutionSource::Columnar, false);
                r.severity = Severity::Info;
                r
            },
        ];
        let summary = summarize(&results, "ds", None, None);
        assert!(summary.passed);
        assert_eq!(summary.warning_failures, 1);
        assert_eq!(summary.info_failures, 1);
        assert_eq!(summary.blocking_failures, 0);
    }
}
