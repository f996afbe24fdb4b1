//! `build_rules(specs) -> Result<Vec<Rule>>`: the name → constructor table.
//!
//! The rule set is closed (17 variants), so the table is a plain `match`
//! rather than a dynamic registry — there is no extension point to keep
//! open at runtime.

use compact_str::CompactString;

use super::{
    model::{CompareOp, Rule, RuleKind, Severity},
    params::{parse_max_age, Params, RuleSpec}
};
use crate::error::{config_error, AppError};

pub fn build_rules(specs: &[RuleSpec]) -> Result<Vec<Rule>, AppError> {
    specs.iter().map(build_rule).collect()
}

fn build_rule(spec: &RuleSpec) -> Result<Rule, AppError> {
    let severity = match &spec.severity {
        Some(s) => parse_severity(s)?,
        None => Severity::Blocking
    };
    let p = Params::new(&spec.name, &spec.params);
    let kind = match spec.name.as_str() {
        "not_null" => RuleKind::NotNull {
            column: col(&p)?
        },
        "unique" => RuleKind::Unique {
            column: col(&p)?
        },
        "dtype" => RuleKind::Dtype {
            column:        col(&p)?,
            expected_type: CompactString::from(p.require_str("expected_type")?),
            strict:        p.get("mode").and_then(|v| v.as_str()) != Some("loose")
        },
        "range" => {
            let min = p.optional_f64("min");
            let max = p.optional_f64("max");
            if min.is_none() && max.is_none() {
                return Err(config_error("rule 'range' requires at least one of min/max"));
            }
            if let (Some(min), Some(max)) = (min, max)
                && min > max
            {
                return Err(config_error("rule 'range' requires min <= max"));
            }
            RuleKind::Range {
                column: col(&p)?,
                min,
                max
            }
        }
        "allowed_values" => RuleKind::AllowedValues {
            column: col(&p)?,
            values: str_vec(&p, "values")?
        },
        "disallowed_values" => RuleKind::DisallowedValues {
            column: col(&p)?,
            values: str_vec(&p, "values")?
        },
        "regex" => RuleKind::Regex {
            column:  col(&p)?,
            pattern: CompactString::from(p.require_str("pattern")?)
        },
        "length" => {
            let min = p.optional_usize("min");
            let max = p.optional_usize("max");
            if min.is_none() && max.is_none() {
                return Err(config_error("rule 'length' requires at least one of min/max"));
            }
            RuleKind::Length {
                column: col(&p)?,
                min,
                max
            }
        }
        "contains" => RuleKind::Contains {
            column:    col(&p)?,
            substring: CompactString::from(p.require_str("substring")?)
        },
        "starts_with" => RuleKind::StartsWith {
            column: col(&p)?,
            prefix: CompactString::from(p.require_str("prefix")?)
        },
        "ends_with" => RuleKind::EndsWith {
            column: col(&p)?,
            suffix: CompactString::from(p.require_str("suffix")?)
        },
        "min_rows" => RuleKind::MinRows {
            n: p.require_u64("n")?
        },
        "max_rows" => RuleKind::MaxRows {
            n: p.require_u64("n")?
        },
        "freshness" => {
            let raw = p.require_str("max_age")?;
            RuleKind::Freshness {
                column:          col(&p)?,
                max_age_seconds: parse_max_age(raw)?
            }
        }
        "compare" => RuleKind::Compare {
            left:  CompactString::from(p.require_str("left")?),
            op:    op(&p, "op")?,
            right: CompactString::from(p.require_str("right")?)
        },
        "conditional_not_null" => RuleKind::ConditionalNotNull {
            column:      col(&p)?,
            when_column: CompactString::from(p.require_str("when_column")?),
            when_op:     op(&p, "when_op")?,
            when_value:  p.get("when_value").cloned().unwrap_or(serde_json::Value::Null)
        },
        "conditional_range" => {
            let min = p.optional_f64("min");
            let max = p.optional_f64("max");
            if min.is_none() && max.is_none() {
                return Err(config_error(
                    "rule 'conditional_range' requires at least one of min/max"
                ));
            }
            RuleKind::ConditionalRange {
                column: col(&p)?,
                when_column: CompactString::from(p.require_str("when_column")?),
                when_op: op(&p, "when_op")?,
                when_value: p.get("when_value").cloned().unwrap_or(serde_json::Value::Null),
                min,
                max
            }
        }
        "custom_sql_check" => RuleKind::CustomSqlCheck {
            sql: p.require_str("sql")?.to_owned()
        },
        other => return Err(config_error(format!("unknown rule name '{other}'"))),
    };
    Ok(Rule::new(spec.id.as_deref(), severity, kind))
}

fn col(p: &Params<'_>) -> Result<CompactString, AppError> {
    Ok(CompactString::from(p.require_str("column")?))
}

fn str_vec(p: &Params<'_>, key: &str) -> Result<Vec<CompactString>, AppError> {
    Ok(p.require_str_vec(key)?.into_iter().map(CompactString::from).collect())
}

fn op(p: &Params<'_>, key: &str) -> Result<CompareOp, AppError> {
    let raw = p.require_str(key)?;
    CompareOp::parse(raw).ok_or_else(|| config_error(format!("unrecognized operator '{raw}' for '{key}'")))
}

fn parse_severity(s: &str) -> Result<Severity, AppError> {
    match s {
        "blocking" => Ok(Severity::Blocking),
        "warning" => Ok(Severity::Warning),
        "info" => Ok(Severity::Info),
        other => Err(config_error(format!("unrecognized severity '{other}'")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn spec(name: &str, params: serde_json::Value) -> RuleSpec {
        RuleSpec {
            name: name.to_string(),
            id: None,
            params,
            severity: None
        }
    }

    #[test]
    fn builds_not_null_with_column_rule_id() {
        let rules = build_rules(&[spec("not_null", json!({"column": "email"}))]).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].rule_id.as_str(), "COL:email:not_null");
        assert_eq!(rules[0].severity, Severity::Blocking);
    }

    #[test]
    fn range_requires_min_or_max() {
        let err = build_rules(&[spec("range", json!({"column": "age"}))]);
        assert!(err.is_err());
    }

    #[test]
    fn range_rejects_min_greater_than_max() {
        let err = build_rules(&[spec("range", json!({"column": "age", "min": 10, "max": 1}))]);
        assert!(err.is_err());
    }

    #[test]
    fn unknown_rule_name_is_config_error() {
        let err = build_rules(&[spec("not_a_rule", json!({}))]);
        assert!(err.is_err());
    }

    #[test]
    fn explicit_id_wins_over_derivation() {
        let mut s = spec("not_null", json!({"column": "email"}));
        s.id = Some("custom-id".into());
        let rules = build_rules(&[s]).unwrap();
        assert_eq!(rules[0].rule_id.as_str(), "custom-id");
    }

    #[test]
    fn explicit_severity_is_applied() {
        let mut s = spec("min_rows", json!({"n": 10}));
        s.severity = Some("warning".into());
        let rules = build_rules(&[s]).unwrap();
        assert_eq!(rules[0].severity, Severity::Warning);
        assert_eq!(rules[0].rule_id.as_str(), "DATASET:min_rows");
    }
}
