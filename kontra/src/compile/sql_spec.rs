//! Dialect-agnostic descriptors sufficient for SQL generation (C6 input).
//!
//! Only the kinds in `spec.md` §4.6's capability matrix get a spec:
//! `not_null`, `unique`, `min_rows`, `max_rows`, `allowed_values`,
//! `freshness`, `range`, `regex`, `compare`, `conditional_not_null`,
//! `conditional_range`. Everything else (`dtype`, `disallowed_values`,
//! `length`, `contains`, `starts_with`, `ends_with`) has no SQL-pushdown
//! path and is always handled by the columnar tier. `custom_sql_check` is
//! handled directly by the SQL executor registry (§4.6's safety section),
//! not through this generic spec shape.

use compact_str::CompactString;
use serde::Serialize;
use serde_json::Value;

use crate::rules::{CompareOp, Rule, RuleKind};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SqlSpec {
    NotNull {
        rule_id: CompactString,
        column:  CompactString
    },
    Unique {
        rule_id: CompactString,
        column:  CompactString
    },
    MinRows {
        rule_id:   CompactString,
        threshold: u64
    },
    MaxRows {
        rule_id:   CompactString,
        threshold: u64
    },
    AllowedValues {
        rule_id: CompactString,
        column:  CompactString,
        values:  Vec<CompactString>
    },
    Freshness {
        rule_id:         CompactString,
        column:          CompactString,
        max_age_seconds: i64
    },
    Range {
        rule_id: CompactString,
        column:  CompactString,
        min:     Option<f64>,
        max:     Option<f64>
    },
    Regex {
        rule_id: CompactString,
        column:  CompactString,
        pattern: CompactString
    },
    Compare {
        rule_id: CompactString,
        left:    CompactString,
        op:      CompareOp,
        right:   CompactString
    },
    ConditionalNotNull {
        rule_id:     CompactString,
        column:      CompactString,
        when_column: CompactString,
        when_op:     CompareOp,
        when_value:  Value
    },
    ConditionalRange {
        rule_id:     CompactString,
        column:      CompactString,
        when_column: CompactString,
        when_op:     CompareOp,
        when_value:  Value,
        min:         Option<f64>,
        max:         Option<f64>
    }
}

impl SqlSpec {
    pub fn rule_id(&self) -> &CompactString {
        match self {
            SqlSpec::NotNull { rule_id, .. }
            | SqlSpec::Unique { rule_id, .. }
            | SqlSpec::MinRows { rule_id, .. }
            | SqlSpec::MaxRows { rule_id, .. }
            | SqlSpec::AllowedValues { rule_id, .. }
            | SqlSpec::Freshness { rule_id, .. }
            | SqlSpec::Range { rule_id, .. }
            | SqlSpec::Regex { rule_id, .. }
            | SqlSpec::Compare { rule_id, .. }
            | SqlSpec::ConditionalNotNull { rule_id, .. }
            | SqlSpec::ConditionalRange { rule_id, .. } => rule_id
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SqlSpec::NotNull { .. } => "not_null",
            SqlSpec::Unique { .. } => "unique",
            SqlSpec::MinRows { .. } => "min_rows",
            SqlSpec::MaxRows { .. } => "max_rows",
            SqlSpec::AllowedValues { .. } => "allowed_values",
            SqlSpec::Freshness { .. } => "freshness",
            SqlSpec::Range { .. } => "range",
            SqlSpec::Regex { .. } => "regex",
            SqlSpec::Compare { .. } => "compare",
            SqlSpec::ConditionalNotNull { .. } => "conditional_not_null",
            SqlSpec::ConditionalRange { .. } => "conditional_range"
        }
    }
}

pub fn to_sql_spec(rule: &Rule) -> Option<SqlSpec> {
    let rule_id = rule.rule_id.clone();
    Some(match &rule.kind {
        RuleKind::NotNull { column } => SqlSpec::NotNull {
            rule_id,
            column: column.clone()
        },
        RuleKind::Unique { column } => SqlSpec::Unique {
            rule_id,
            column: column.clone()
        },
        RuleKind::MinRows { n } => SqlSpec::MinRows {
            rule_id,
            threshold: *n
        },
        RuleKind::MaxRows { n } => SqlSpec::MaxRows {
            rule_id,
            threshold: *n
        },
        RuleKind::AllowedValues { column, values } => SqlSpec::AllowedValues {
            rule_id,
            column: column.clone(),
            values: values.clone()
        },
        RuleKind::Freshness {
            column,
            max_age_seconds
        } => SqlSpec::Freshness {
            rule_id,
            column: column.clone(),
            max_age_seconds: *max_age_seconds
        },
        RuleKind::Range { column, min, max } => SqlSpec::Range {
            rule_id,
            column: column.clone(),
            min: *min,
            max: *max
        },
        RuleKind::Regex { column, pattern } => SqlSpec::Regex {
            rule_id,
            column: column.clone(),
            pattern: pattern.clone()
        },
        RuleKind::Compare { left, op, right } => SqlSpec::Compare {
            rule_id,
            left: left.clone(),
            op: *op,
            right: right.clone()
        },
        RuleKind::ConditionalNotNull {
            column,
            when_column,
            when_op,
            when_value
        } => SqlSpec::ConditionalNotNull {
            rule_id,
            column: column.clone(),
            when_column: when_column.clone(),
            when_op: *when_op,
            when_value: when_value.clone()
        },
        RuleKind::ConditionalRange {
            column,
            when_column,
            when_op,
            when_value,
            min,
            max
        } => SqlSpec::ConditionalRange {
            rule_id,
            column: column.clone(),
            when_column: when_column.clone(),
            when_op: *when_op,
            when_value: when_value.clone(),
            min: *min,
            max: *max
        },
        RuleKind::Dtype { .. }
        | RuleKind::DisallowedValues { .. }
        | RuleKind::Length { .. }
        | RuleKind::Contains { .. }
        | RuleKind::StartsWith { .. }
        | RuleKind::EndsWith { .. }
        | RuleKind::CustomSqlCheck { .. } => return None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleSpec, build_rules};

    #[test]
    fn regex_rule_produces_a_spec_dialects_may_later_reject() {
        let spec = RuleSpec {
            name:     "regex".into(),
            id:       None,
            params:   serde_json::json!({"column": "email", "pattern": ".*@.*"}),
            severity: None
        };
        let rule = build_rules(&[spec]).unwrap().remove(0);
        let sql_spec = to_sql_spec(&rule).unwrap();
        assert_eq!(sql_spec.kind(), "regex");
    }

    #[test]
    fn length_rule_has_no_sql_spec() {
        let spec = RuleSpec {
            name:     "length".into(),
            id:       None,
            params:   serde_json::json!({"column": "name", "min": 1}),
            severity: None
        };
        let rule = build_rules(&[spec]).unwrap().remove(0);
        assert!(to_sql_spec(&rule).is_none());
    }
}
