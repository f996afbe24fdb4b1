//! Contract-facing rule spec and typed accessors over its free-form params.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{config_error, AppError};

/// One entry of `contract.rules[]`, as deserialized from the contract file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleSpec {
    pub name:     String,
    #[serde(default)]
    pub id:       Option<String>,
    #[serde(default)]
    pub params:   Value,
    #[serde(default)]
    pub severity: Option<String>
}

/// Accessor over a rule spec's `params` object with contract-appropriate
/// error messages: every miss names the rule and the parameter key, per
/// the config-error taxonomy.
pub struct Params<'a> {
    rule_name: &'a str,
    value:     &'a Value
}

impl<'a> Params<'a> {
    pub fn new(rule_name: &'a str, value: &'a Value) -> Self {
        Self { rule_name, value }
    }

    fn missing(&self, key: &str) -> AppError {
        config_error(format!(
            "rule '{}' is missing required param '{}'",
            self.rule_name, key
        ))
    }

    fn type_mismatch(&self, key: &str, expected: &str) -> AppError {
        config_error(format!(
            "rule '{}' param '{}' must be {}",
            self.rule_name, key, expected
        ))
    }

    pub fn require_str(&self, key: &str) -> Result<&'a str, AppError> {
        self.value
            .get(key)
            .ok_or_else(|| self.missing(key))?
            .as_str()
            .ok_or_else(|| self.type_mismatch(key, "a string"))
    }

    pub fn optional_str(&self, key: &str) -> Option<&'a str> {
        self.value.get(key).and_then(Value::as_str)
    }

    pub fn require_f64(&self, key: &str) -> Result<f64, AppError> {
        self.value
            .get(key)
            .ok_or_else(|| self.missing(key))?
            .as_f64()
            .ok_or_else(|| self.type_mismatch(key, "a number"))
    }

    pub fn optional_f64(&self, key: &str) -> Option<f64> {
        self.value.get(key).and_then(Value::as_f64)
    }

    pub fn optional_usize(&self, key: &str) -> Option<usize> {
        self.value.get(key).and_then(Value::as_u64).map(|v| v as usize)
    }

    pub fn require_u64(&self, key: &str) -> Result<u64, AppError> {
        self.value
            .get(key)
            .ok_or_else(|| self.missing(key))?
            .as_u64()
            .ok_or_else(|| self.type_mismatch(key, "a non-negative integer"))
    }

    pub fn require_i64(&self, key: &str) -> Result<i64, AppError> {
        self.value
            .get(key)
            .ok_or_else(|| self.missing(key))?
            .as_i64()
            .ok_or_else(|| self.type_mismatch(key, "an integer"))
    }

    pub fn require_str_vec(&self, key: &str) -> Result<Vec<String>, AppError> {
        let arr = self
            .value
            .get(key)
            .ok_or_else(|| self.missing(key))?
            .as_array()
            .ok_or_else(|| self.type_mismatch(key, "an array"))?;
        arr.iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| self.type_mismatch(key, "an array of strings"))
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.value.get(key)
    }
}

/// Parse a duration-with-suffix string (`s|m|h|d|w`) into seconds.
pub fn parse_max_age(raw: &str) -> Result<i64, AppError> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(n);
    }
    let (digits, suffix) = raw.split_at(raw.len().saturating_sub(1));
    let n: i64 = digits
        .parse()
        .map_err(|_| config_error(format!("invalid freshness duration '{raw}'")))?;
    let multiplier = match suffix {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 60 * 60 * 24,
        "w" => 60 * 60 * 24 * 7,
        other => {
            return Err(config_error(format!(
                "unrecognized freshness suffix '{other}' in '{raw}'"
            )));
        }
    };
    Ok(n * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_max_age_accepts_bare_seconds() {
        assert_eq!(parse_max_age("3600").unwrap(), 3600);
    }

    #[test]
    fn parse_max_age_accepts_suffixes() {
        assert_eq!(parse_max_age("2d").unwrap(), 172_800);
        assert_eq!(parse_max_age("1w").unwrap(), 604_800);
    }

    #[test]
    fn parse_max_age_rejects_unknown_suffix() {
        assert!(parse_max_age("3x").is_err());
    }
}
