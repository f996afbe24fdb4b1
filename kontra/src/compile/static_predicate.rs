//! Static predicates: `(rule_id, column, op, value)` triples usable against
//! Parquet column statistics, consumed only by [`crate::preplan`].

use compact_str::CompactString;

use crate::rules::{Rule, RuleKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    PrefixEq,
    NotNull,
    Dtype
}

#[derive(Debug, Clone, PartialEq)]
pub enum StaticValue {
    Str(String),
    Num(f64),
    None
}

#[derive(Debug, Clone)]
pub struct StaticPredicate {
    pub rule_id: CompactString,
    pub column:  CompactString,
    pub op:      StaticOp,
    pub value:   StaticValue
}

/// Extract the static predicates safe for metadata-only reasoning. Most
/// rules yield none (they need row data); `NotNull`, `Range`, `Dtype`, and
/// `StartsWith` are the cases the preplan tier can prove from stats alone.
pub fn to_static_predicates(rule: &Rule) -> Vec<StaticPredicate> {
    let rule_id = rule.rule_id.clone();
    match &rule.kind {
        RuleKind::NotNull { column } => vec![StaticPredicate {
            rule_id,
            column: column.clone(),
            op: StaticOp::NotNull,
            value: StaticValue::None
        }],
        RuleKind::Range { column, min, max } => {
            let mut out = Vec::with_capacity(2);
            if let Some(min) = min {
                out.push(StaticPredicate {
                    rule_id: rule_id.clone(),
                    column: column.clone(),
                    op: StaticOp::Ge,
                    value: StaticValue::Num(*min)
                });
            }
            if let Some(max) = max {
                out.push(StaticPredicate {
                    rule_id,
                    column: column.clone(),
                    op: StaticOp::Le,
                    value: StaticValue::Num(*max)
                });
            }
            out
        }
        RuleKind::Dtype { column, expected_type, .. } => vec![StaticPredicate {
            rule_id,
            column: column.clone(),
            op: StaticOp::Dtype,
            value: StaticValue::Str(expected_type.to_string())
        }],
        RuleKind::StartsWith { column, prefix } => vec![StaticPredicate {
            rule_id,
            column: column.clone(),
            op: StaticOp::PrefixEq,
            value: StaticValue::Str(prefix.to_string())
        }],
        _ => vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleSpec, build_rules};

    #[test]
    fn range_yields_two_bracketing_predicates() {
        let spec = RuleSpec {
            name:     "range".into(),
            id:       None,
            params:   serde_json::json!({"column": "age", "min": 0, "max": 120}),
            severity: None
        };
        let rule = build_rules(&[spec]).unwrap().remove(0);
        let preds = to_static_predicates(&rule);
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].op, StaticOp::Ge);
        assert_eq!(preds[1].op, StaticOp::Le);
    }

    #[test]
    fn unique_has_no_static_predicate() {
        let spec = RuleSpec {
            name:     "unique".into(),
            id:       None,
            params:   serde_json::json!({"column": "id"}),
            severity: None
        };
        let rule = build_rules(&[spec]).unwrap().remove(0);
        assert!(to_static_predicates(&rule).is_empty());
    }
}
