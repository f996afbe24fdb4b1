//! Vectorizable (row-evaluable) predicate compilation.
//!
//! Not every rule compiles to a predicate: `Unique`, `MinRows`, `MaxRows`,
//! `Freshness`, `Dtype`, and `CustomSqlCheck` are whole-dataset checks and
//! stay in `fallback_rules` (see [`crate::plan`]).
//!
//! Null handling matches the compiler contract in every tier: for
//! `NotNull`, null fails. For `Regex`/`AllowedValues`/`Range` and the
//! string-shaped checks derived from them (`Length`/`Contains`/
//! `StartsWith`/`EndsWith`/`Compare`), null is treated as non-matching,
//! i.e. a violation. `DisallowedValues` is the mirror image of
//! `AllowedValues`: null is not a member of the disallowed set, so it
//! passes.

use compact_str::CompactString;
use regex::Regex;
use serde_json::Value;

use crate::{
    batch::{Cell, ColumnarBatch},
    rules::{CompareOp, Rule, RuleKind}
};

pub struct Predicate {
    pub rule_id:       CompactString,
    pub columns_used:  Vec<CompactString>,
    pub message:       String,
    expr:              PredicateExpr
}

enum PredicateExpr {
    NotNull {
        column: CompactString
    },
    Range {
        column: CompactString,
        min:    Option<f64>,
        max:    Option<f64>
    },
    AllowedValues {
        column: CompactString,
        values: Vec<CompactString>
    },
    DisallowedValues {
        column: CompactString,
        values: Vec<CompactString>
    },
    Regex {
        column: CompactString,
        regex:  Regex
    },
    Length {
        column: CompactString,
        min:    Option<usize>,
        max:    Option<usize>
    },
    Contains {
        column:    CompactString,
        substring: CompactString
    },
    StartsWith {
        column: CompactString,
        prefix: CompactString
    },
    EndsWith {
        column: CompactString,
        suffix: CompactString
    },
    Compare {
        left:  CompactString,
        op:    CompareOp,
        right: CompactString
    },
    ConditionalNotNull {
        column:      CompactString,
        when_column: CompactString,
        when_op:     CompareOp,
        when_value:  Value
    },
    ConditionalRange {
        column:      CompactString,
        when_column: CompactString,
        when_op:     CompareOp,
        when_value:  Value,
        min:         Option<f64>,
        max:         Option<f64>
    }
}

impl Predicate {
    /// `true` means row `row` violates the rule.
    pub fn row_fails(&self, batch: &ColumnarBatch, row: usize) -> bool {
        match &self.expr {
            PredicateExpr::NotNull { column } => cell_is_null(batch, column, row),
            PredicateExpr::Range { column, min, max } => match batch.cell(column, row) {
                Some(c) if !c.is_null() => match c.as_f64() {
                    Some(v) => min.is_some_and(|m| v < m) || max.is_some_and(|m| v > m),
                    None => true
                },
                _ => true
            },
            PredicateExpr::AllowedValues { column, values } => match batch.cell(column, row) {
                Some(c) if !c.is_null() => {
                    let s = c.as_str().unwrap_or_default();
                    !values.iter().any(|v| v.as_str() == s)
                }
                _ => true
            },
            PredicateExpr::DisallowedValues { column, values } => match batch.cell(column, row) {
                Some(c) if !c.is_null() => {
                    let s = c.as_str().unwrap_or_default();
                    values.iter().any(|v| v.as_str() == s)
                }
                _ => false
            },
            PredicateExpr::Regex { column, regex } => match batch.cell(column, row) {
                Some(c) if !c.is_null() => !regex.is_match(c.as_str().unwrap_or_default()),
                _ => true
            },
            PredicateExpr::Length { column, min, max } => match batch.cell(column, row) {
                Some(c) if !c.is_null() => {
                    let len = c.as_str().unwrap_or_default().chars().count();
                    min.is_some_and(|m| len < m) || max.is_some_and(|m| len > m)
                }
                _ => true
            },
            PredicateExpr::Contains { column, substring } => match batch.cell(column, row) {
                Some(c) if !c.is_null() => !c.as_str().unwrap_or_default().contains(substring.as_str()),
                _ => true
            },
            PredicateExpr::StartsWith { column, prefix } => match batch.cell(column, row) {
                Some(c) if !c.is_null() => !c.as_str().unwrap_or_default().starts_with(prefix.as_str()),
                _ => true
            },
            PredicateExpr::EndsWith { column, suffix } => match batch.cell(column, row) {
                Some(c) if !c.is_null() => !c.as_str().unwrap_or_default().ends_with(suffix.as_str()),
                _ => true
            },
            PredicateExpr::Compare { left, op, right } => {
                match (batch.cell(left, row), batch.cell(right, row)) {
                    (Some(l), Some(r)) if !l.is_null() && !r.is_null() => !compare_cells(&l, *op, &r),
                    _ => true
                }
            }
            PredicateExpr::ConditionalNotNull {
                column,
                when_column,
                when_op,
                when_value
            } => {
                if !when_holds(batch, row, when_column, *when_op, when_value) {
                    return false;
                }
                cell_is_null(batch, column, row)
            }
            PredicateExpr::ConditionalRange {
                column,
                when_column,
                when_op,
                when_value,
                min,
                max
            } => {
                if !when_holds(batch, row, when_column, *when_op, when_value) {
                    return false;
                }
                match batch.cell(column, row) {
                    Some(c) if !c.is_null() => match c.as_f64() {
                        Some(v) => min.is_some_and(|m| v < m) || max.is_some_and(|m| v > m),
                        None => true
                    },
                    _ => true
                }
            }
        }
    }
}

fn cell_is_null(batch: &ColumnarBatch, column: &str, row: usize) -> bool {
    match batch.cell(column, row) {
        Some(c) => c.is_null(),
        None => true
    }
}

fn compare_cells(l: &Cell, op: CompareOp, r: &Cell) -> bool {
    let ord = match (l.as_f64(), r.as_f64()) {
        (Some(lv), Some(rv)) => lv.partial_cmp(&rv),
        _ => match (l.as_str(), r.as_str()) {
            (Some(ls), Some(rs)) => Some(ls.cmp(rs)),
            _ => None
        }
    };
    let Some(ord) = ord else { return false };
    match op {
        CompareOp::Eq => ord.is_eq(),
        CompareOp::Ne => !ord.is_eq(),
        CompareOp::Lt => ord.is_lt(),
        CompareOp::Le => ord.is_le(),
        CompareOp::Gt => ord.is_gt(),
        CompareOp::Ge => ord.is_ge()
    }
}

fn when_holds(batch: &ColumnarBatch, row: usize, when_column: &str, when_op: CompareOp, when_value: &Value) -> bool {
    let Some(cell) = batch.cell(when_column, row) else {
        return false;
    };
    if cell.is_null() {
        return false;
    }
    let target = match when_value {
        Value::Number(n) => Cell::Float(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => Cell::Str(s.clone()),
        Value::Bool(b) => Cell::Bool(*b),
        _ => return false
    };
    compare_cells(&cell, when_op, &target)
}

/// Attempt predicate compilation for a rule. Returns `None` for variants
/// that require whole-dataset reasoning (those remain fallback rules).
pub fn compile_predicate(rule: &Rule) -> Option<Predicate> {
    let rule_id = rule.rule_id.clone();
    let (expr, columns_used, message) = match &rule.kind {
        RuleKind::NotNull { column } => (
            PredicateExpr::NotNull {
                column: column.clone()
            },
            vec![column.clone()],
            format!("column '{column}' must not contain nulls")
        ),
        RuleKind::Range { column, min, max } => (
            PredicateExpr::Range {
                column: column.clone(),
                min: *min,
                max: *max
            },
            vec![column.clone()],
            format!("column '{column}' must be within the configured range")
        ),
        RuleKind::AllowedValues { column, values } => (
            PredicateExpr::AllowedValues {
                column: column.clone(),
                values: values.clone()
            },
            vec![column.clone()],
            format!("column '{column}' contains a value outside the allowed set")
        ),
        RuleKind::DisallowedValues { column, values } => (
            PredicateExpr::DisallowedValues {
                column: column.clone(),
                values: values.clone()
            },
            vec![column.clone()],
            format!("column '{column}' contains a disallowed value")
        ),
        RuleKind::Regex { column, pattern } => {
            let regex = Regex::new(pattern.as_str()).ok()?;
            (
                PredicateExpr::Regex {
                    column: column.clone(),
                    regex
                },
                vec![column.clone()],
                format!("column '{column}' does not match the configured pattern")
            )
        }
        RuleKind::Length { column, min, max } => (
            PredicateExpr::Length {
                column: column.clone(),
                min: *min,
                max: *max
            },
            vec![column.clone()],
            format!("column '{column}' length is out of bounds")
        ),
        RuleKind::Contains { column, substring } => (
            PredicateExpr::Contains {
                column: column.clone(),
                substring: substring.clone()
            },
            vec![column.clone()],
            format!("column '{column}' does not contain '{substring}'")
        ),
        RuleKind::StartsWith { column, prefix } => (
            PredicateExpr::StartsWith {
                column: column.clone(),
                prefix: prefix.clone()
            },
            vec![column.clone()],
            format!("column '{column}' does not start with '{prefix}'")
        ),
        RuleKind::EndsWith { column, suffix } => (
            PredicateExpr::EndsWith {
                column: column.clone(),
                suffix: suffix.clone()
            },
            vec![column.clone()],
            format!("column '{column}' does not end with '{suffix}'")
        ),
        RuleKind::Compare { left, op, right } => (
            PredicateExpr::Compare {
                left: left.clone(),
                op: *op,
                right: right.clone()
            },
            vec![left.clone(), right.clone()],
            format!("'{left}' {} '{right}' does not hold", op.symbol())
        ),
        RuleKind::ConditionalNotNull {
            column,
            when_column,
            when_op,
            when_value
        } => (
            PredicateExpr::ConditionalNotNull {
                column: column.clone(),
                when_column: when_column.clone(),
                when_op: *when_op,
                when_value: when_value.clone()
            },
            vec![column.clone(), when_column.clone()],
            format!("column '{column}' must not be null when the condition on '{when_column}' holds")
        ),
        RuleKind::ConditionalRange {
            column,
            when_column,
            when_op,
            when_value,
            min,
            max
        } => (
            PredicateExpr::ConditionalRange {
                column: column.clone(),
                when_column: when_column.clone(),
                when_op: *when_op,
                when_value: when_value.clone(),
                min: *min,
                max: *max
            },
            vec![column.clone(), when_column.clone()],
            format!("column '{column}' is out of range when the condition on '{when_column}' holds")
        ),
        RuleKind::Unique { .. }
        | RuleKind::Dtype { .. }
        | RuleKind::MinRows { .. }
        | RuleKind::MaxRows { .. }
        | RuleKind::Freshness { .. }
        | RuleKind::CustomSqlCheck { .. } => return None
    };
    Some(Predicate {
        rule_id,
        columns_used,
        message,
        expr
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Int64Array, StringArray};
    use indexmap::IndexMap;

    use super::*;
    use crate::rules::{RuleSpec, build_rules};

    fn batch() -> ColumnarBatch {
        let mut columns = IndexMap::new();
        columns.insert(
            "age".to_string(),
            Arc::new(Int64Array::from(vec![Some(5), None, Some(40)])) as _
        );
        columns.insert(
            "status".to_string(),
            Arc::new(StringArray::from(vec![Some("active"), Some("bogus"), None])) as _
        );
        ColumnarBatch::new(3, columns)
    }

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
    fn range_fails_on_null_and_out_of_bounds() {
        let r = rule("range", serde_json::json!({"column": "age", "min": 10, "max": 50}));
        let p = compile_predicate(&r).unwrap();
        let b = batch();
        assert!(p.row_fails(&b, 0)); // 5 < 10
        assert!(p.row_fails(&b, 1)); // null
        assert!(!p.row_fails(&b, 2)); // 40 in range
    }

    #[test]
    fn allowed_values_null_is_a_violation() {
        let r = rule(
            "allowed_values",
            serde_json::json!({"column": "status", "values": ["active", "inactive"]})
        );
        let p = compile_predicate(&r).unwrap();
        let b = batch();
        assert!(!p.row_fails(&b, 0));
        assert!(p.row_fails(&b, 1));
        assert!(p.row_fails(&b, 2));
    }

    #[test]
    fn unique_does_not_compile_to_a_predicate() {
        let r = rule("unique", serde_json::json!({"column": "status"}));
        assert!(compile_predicate(&r).is_none());
    }
}
