//! The rule sum type and the pure parts of its identity/severity model.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of a rule. Only `Blocking` failures flip `RunSummary::passed` to
/// `false`; `Warning`/`Info` are reported but never fail the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocking,
    Warning,
    Info
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Blocking
    }
}

/// Comparison operator shared by `Compare` and the `when_op` of conditional
/// rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge
}

impl CompareOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "==" | "eq" => Some(Self::Eq),
            "!=" | "ne" => Some(Self::Ne),
            "<" | "lt" => Some(Self::Lt),
            "<=" | "le" => Some(Self::Le),
            ">" | "gt" => Some(Self::Gt),
            ">=" | "ge" => Some(Self::Ge),
            _ => None
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">="
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">="
        }
    }
}

/// The 17 rule variants from the contract data model. Each carries only the
/// parameters specific to its check; identity, severity, and the raw
/// contract params live on [`Rule`].
#[derive(Debug, Clone)]
pub enum RuleKind {
    NotNull {
        column: CompactString
    },
    Unique {
        column: CompactString
    },
    Dtype {
        column: CompactString,
        expected_type: CompactString,
        strict: bool
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
        column:  CompactString,
        pattern: CompactString
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
    MinRows {
        n: u64
    },
    MaxRows {
        n: u64
    },
    Freshness {
        column:          CompactString,
        max_age_seconds: i64
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
    },
    CustomSqlCheck {
        sql: String
    }
}

impl RuleKind {
    /// Stable snake_case name used both for rule_id derivation and as the
    /// `kind` discriminant of `SqlSpec`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotNull { .. } => "not_null",
            Self::Unique { .. } => "unique",
            Self::Dtype { .. } => "dtype",
            Self::Range { .. } => "range",
            Self::AllowedValues { .. } => "allowed_values",
            Self::DisallowedValues { .. } => "disallowed_values",
            Self::Regex { .. } => "regex",
            Self::Length { .. } => "length",
            Self::Contains { .. } => "contains",
            Self::StartsWith { .. } => "starts_with",
            Self::EndsWith { .. } => "ends_with",
            Self::MinRows { .. } => "min_rows",
            Self::MaxRows { .. } => "max_rows",
            Self::Freshness { .. } => "freshness",
            Self::Compare { .. } => "compare",
            Self::ConditionalNotNull { .. } => "conditional_not_null",
            Self::ConditionalRange { .. } => "conditional_range",
            Self::CustomSqlCheck { .. } => "custom_sql_check"
        }
    }

    /// The rule's single "primary" column, if it has one. Used for rule_id
    /// derivation (`COL:<col>:<name>` vs `DATASET:<name>`).
    pub fn primary_column(&self) -> Option<&str> {
        match self {
            Self::NotNull { column }
            | Self::Unique { column }
            | Self::Dtype { column, .. }
            | Self::Range { column, .. }
            | Self::AllowedValues { column, .. }
            | Self::DisallowedValues { column, .. }
            | Self::Regex { column, .. }
            | Self::Length { column, .. }
            | Self::Contains { column, .. }
            | Self::StartsWith { column, .. }
            | Self::EndsWith { column, .. }
            | Self::Freshness { column, .. }
            | Self::ConditionalNotNull { column, .. }
            | Self::ConditionalRange { column, .. } => Some(column.as_str()),
            Self::Compare { left, .. } => Some(left.as_str()),
            Self::MinRows { .. } | Self::MaxRows { .. } | Self::CustomSqlCheck { .. } => None
        }
    }

    /// Columns this rule reads, independent of whether a predicate or SQL
    /// spec could be derived for it. Used as the fallback-path contribution
    /// to `CompiledPlan::required_cols`.
    pub fn required_columns(&self) -> Vec<CompactString> {
        match self {
            Self::NotNull { column }
            | Self::Unique { column }
            | Self::Dtype { column, .. }
            | Self::Range { column, .. }
            | Self::AllowedValues { column, .. }
            | Self::DisallowedValues { column, .. }
            | Self::Regex { column, .. }
            | Self::Length { column, .. }
            | Self::Contains { column, .. }
            | Self::StartsWith { column, .. }
            | Self::EndsWith { column, .. }
            | Self::Freshness { column, .. } => vec![column.clone()],
            Self::Compare { left, right, .. } => vec![left.clone(), right.clone()],
            Self::ConditionalNotNull {
                column, when_column, ..
            } => vec![column.clone(), when_column.clone()],
            Self::ConditionalRange {
                column, when_column, ..
            } => vec![column.clone(), when_column.clone()],
            Self::MinRows { .. } | Self::MaxRows { .. } | Self::CustomSqlCheck { .. } => vec![]
        }
    }
}

/// A single contract rule: identity, severity, and its typed check.
#[derive(Debug, Clone)]
pub struct Rule {
    pub rule_id:  CompactString,
    pub severity: Severity,
    pub kind:     RuleKind
}

impl Rule {
    pub fn new(explicit_id: Option<&str>, severity: Severity, kind: RuleKind) -> Self {
        let rule_id = derive_rule_id(explicit_id, kind.name(), kind.primary_column());
        Self {
            rule_id,
            severity,
            kind
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn required_columns(&self) -> Vec<CompactString> {
        self.kind.required_columns()
    }
}

/// `rule_id` identity: an explicit contract `id` always wins; otherwise
/// `COL:<col>:<name>` when the rule has a primary column, else
/// `DATASET:<name>`.
pub fn derive_rule_id(explicit_id: Option<&str>, name: &str, column: Option<&str>) -> CompactString {
    if let Some(id) = explicit_id
        && !id.is_empty()
    {
        return CompactString::from(id);
    }
    match column {
        Some(col) => CompactString::from(format!("COL:{col}:{name}")),
        None => CompactString::from(format!("DATASET:{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_id_prefers_explicit_id() {
        let id = derive_rule_id(Some("my-id"), "not_null", Some("email"));
        assert_eq!(id.as_str(), "my-id");
    }

    #[test]
    fn rule_id_uses_column_prefix() {
        let id = derive_rule_id(None, "not_null", Some("email"));
        assert_eq!(id.as_str(), "COL:email:not_null");
    }

    #[test]
    fn rule_id_uses_dataset_prefix_without_column() {
        let id = derive_rule_id(None, "min_rows", None);
        assert_eq!(id.as_str(), "DATASET:min_rows");
    }

    #[test]
    fn compare_op_parses_symbols_and_words() {
        assert_eq!(CompareOp::parse(">="), Some(CompareOp::Ge));
        assert_eq!(CompareOp::parse("ge"), Some(CompareOp::Ge));
        assert_eq!(CompareOp::parse("nonsense"), None);
    }
}
