//! Execution Plan / Planner (C3).
//!
//! `compile` walks rules in contract order, deriving predicates, SQL specs,
//! and the required-columns union; `execute_compiled` runs the vectorized
//! and fallback passes over a materialized [`ColumnarBatch`];
//! `without_ids` recomputes a residual plan after the metadata/SQL tiers
//! have claimed some rule ids.

use std::collections::{HashMap, HashSet};

use compact_str::CompactString;
use rayon::prelude::*;

use crate::{
    batch::ColumnarBatch,
    compile::{compile_predicate, to_sql_spec, Predicate, SqlSpec},
    result::{ExecutionSource, FailureMode, RuleResult, failure_mode_for},
    rules::{Rule, RuleKind, Severity}
};

pub use crate::result::summarize as summary;

#[derive(Clone, Copy)]
struct RuleMeta {
    severity: Severity,
    name:     &'static str
}

#[derive(Clone)]
pub struct CompiledPlan {
    pub predicates:     Vec<Predicate>,
    pub fallback_rules: Vec<Rule>,
    pub required_cols:  Vec<CompactString>,
    pub sql_specs:      Vec<SqlSpec>,
    pub custom_checks:  Vec<Rule>,
    pub rule_order:      Vec<CompactString>,
    rule_meta:          HashMap<CompactString, RuleMeta>
}

impl CompiledPlan {
    pub fn len(&self) -> usize {
        self.rule_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rule_order.is_empty()
    }

    pub fn has_residual_work(&self) -> bool {
        !self.predicates.is_empty() || !self.fallback_rules.is_empty()
    }
}

pub fn compile(rules: &[Rule]) -> CompiledPlan {
    let rule_order: Vec<CompactString> = rules.iter().map(|r| r.rule_id.clone()).collect();
    let rule_meta: HashMap<CompactString, RuleMeta> = rules
        .iter()
        .map(|r| {
            (
                r.rule_id.clone(),
                RuleMeta {
                    severity: r.severity,
                    name:     r.name()
                }
            )
        })
        .collect();

    let mut predicates = Vec::new();
    let mut fallback_rules = Vec::new();
    for rule in rules {
        match compile_predicate(rule) {
            Some(predicate) => {
                debug_assert_eq!(predicate.rule_id, rule.rule_id);
                predicates.push(predicate);
            }
            None => fallback_rules.push(rule.clone())
        }
    }

    let sql_specs: Vec<SqlSpec> = rules.iter().filter_map(to_sql_spec).collect();
    let custom_checks: Vec<Rule> = rules
        .iter()
        .filter(|r| matches!(r.kind, RuleKind::CustomSqlCheck { .. }))
        .cloned()
        .collect();

    let required_cols = required_cols_for(&predicates, &fallback_rules);

    CompiledPlan {
        predicates,
        fallback_rules,
        required_cols,
        sql_specs,
        custom_checks,
        rule_order,
        rule_meta
    }
}

fn required_cols_for(predicates: &[Predicate], fallback_rules: &[Rule]) -> Vec<CompactString> {
    let mut set: HashSet<CompactString> = HashSet::new();
    for p in predicates {
        set.extend(p.columns_used.iter().cloned());
    }
    for r in fallback_rules {
        set.extend(r.required_columns());
    }
    let mut cols: Vec<CompactString> = set.into_iter().collect();
    cols.sort();
    cols
}

/// Drop predicates and fallbacks whose `rule_id` is in `handled`;
/// recompute `required_cols` over the residual set only. `sql_specs` and
/// `custom_checks` are filtered the same way since a residual plan has no
/// further use for specs already claimed by an earlier tier.
pub fn without_ids(plan: &CompiledPlan, handled: &HashSet<CompactString>) -> CompiledPlan {
    let predicates: Vec<Predicate> = plan
        .predicates
        .iter()
        .filter(|p| !handled.contains(&p.rule_id))
        .cloned()
        .collect();
    let fallback_rules: Vec<Rule> = plan
        .fallback_rules
        .iter()
        .filter(|r| !handled.contains(&r.rule_id))
        .cloned()
        .collect();
    let sql_specs: Vec<SqlSpec> = plan
        .sql_specs
        .iter()
        .filter(|s| !handled.contains(s.rule_id()))
        .cloned()
        .collect();
    let custom_checks: Vec<Rule> = plan
        .custom_checks
        .iter()
        .filter(|r| !handled.contains(&r.rule_id))
        .cloned()
        .collect();
    let required_cols = required_cols_for(&predicates, &fallback_rules);

    CompiledPlan {
        predicates,
        fallback_rules,
        required_cols,
        sql_specs,
        custom_checks,
        rule_order: plan.rule_order.clone(),
        rule_meta: plan.rule_meta.clone()
    }
}

/// Vectorized pass over `predicates` plus a fallback pass over
/// `fallback_rules`. Every result is tagged `execution_source = columnar`.
pub fn execute_compiled(batch: &ColumnarBatch, plan: &CompiledPlan) -> Vec<RuleResult> {
    let mut results = Vec::with_capacity(plan.predicates.len() + plan.fallback_rules.len());

    for predicate in &plan.predicates {
        let meta = plan
            .rule_meta
            .get(&predicate.rule_id)
            .copied()
            .unwrap_or(RuleMeta {
                severity: Severity::Blocking,
                name:     "unknown"
            });

        let missing: Vec<&CompactString> = predicate
            .columns_used
            .iter()
            .filter(|c| !batch.has_column(c.as_str()))
            .collect();
        if !missing.is_empty() {
            results.push(RuleResult::fail(
                predicate.rule_id.clone(),
                meta.name,
                meta.severity,
                ExecutionSource::Columnar,
                batch.row_count as u64,
                format!(
                    "required column(s) {} missing from materialized frame",
                    missing.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
                ),
                FailureMode::ConfigError
            ));
            continue;
        }

        let failed_count = (0..batch.row_count)
            .into_par_iter()
            .filter(|&row| predicate.row_fails(batch, row))
            .count() as u64;

        results.push(if failed_count == 0 {
            RuleResult::pass(
                predicate.rule_id.clone(),
                meta.name,
                meta.severity,
                ExecutionSource::Columnar,
                predicate.message.clone()
            )
        } else {
            RuleResult::fail(
                predicate.rule_id.clone(),
                meta.name,
                meta.severity,
                ExecutionSource::Columnar,
                failed_count,
                predicate.message.clone(),
                failure_mode_for(meta.name)
            )
        });
    }

    for rule in &plan.fallback_rules {
        results.push(rule.validate(batch));
    }

    results
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::Int64Array;
    use indexmap::IndexMap;

    use super::*;
    use crate::rules::{build_rules, RuleSpec};

    fn build(name: &str, params: serde_json::Value) -> Rule {
        build_rules(&[RuleSpec {
            name: name.into(),
            id: None,
            params,
            severity: None
        }])
        .unwrap()
        .remove(0)
    }

    #[test]
    fn without_ids_is_idempotent_on_empty_set_l3() {
        let rules = vec![build("min_rows", serde_json::json!({"n": 5}))];
        let plan = compile(&rules);
        let residual = without_ids(&plan, &HashSet::new());
        assert_eq!(residual.rule_order, plan.rule_order);
        assert_eq!(residual.required_cols, plan.required_cols);
    }

    #[test]
    fn without_ids_composes_p7() {
        let rules = vec![
            build("not_null", serde_json::json!({"column": "a"})),
            build("not_null", serde_json::json!({"column": "b"})),
        ];
        let plan = compile(&rules);
        let id_a = plan.rule_order[0].clone();
        let id_b = plan.rule_order[1].clone();

        let step1 = without_ids(&plan, &HashSet::from([id_a.clone()]));
        let step2 = without_ids(&step1, &HashSet::from([id_b.clone()]));
        let combined = without_ids(&plan, &HashSet::from([id_a, id_b]));

        assert_eq!(step2.required_cols, combined.required_cols);
        assert!(combined.predicates.is_empty());
    }

    #[test]
    fn required_cols_cover_residual_predicates() {
        let rules = vec![build("not_null", serde_json::json!({"column": "id"}))];
        let plan = compile(&rules);
        assert_eq!(plan.required_cols, vec![CompactString::from("id")]);
    }

    #[test]
    fn execute_compiled_reports_config_error_for_missing_columns() {
        let rules = vec![build("not_null", serde_json::json!({"column": "ghost"}))];
        let plan = compile(&rules);
        let batch = ColumnarBatch::new(3, IndexMap::new());
        let results = execute_compiled(&batch, &plan);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].failure_mode, Some(FailureMode::ConfigError));
        assert_eq!(results[0].failed_count, 3);
    }

    #[test]
    fn execute_compiled_counts_failures_for_not_null() {
        let rules = vec![build("not_null", serde_json::json!({"column": "id"}))];
        let plan = compile(&rules);
        let mut columns = IndexMap::new();
        columns.insert("id".to_string(), Arc::new(Int64Array::from(vec![Some(1), None, Some(3)])) as _);
        let batch = ColumnarBatch::new(3, columns);
        let results = execute_compiled(&batch, &plan);
        assert_eq!(results[0].failed_count, 1);
        assert!(!results[0].passed);
    }
}
