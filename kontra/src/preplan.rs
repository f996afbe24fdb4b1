//! Preplan (C7): metadata-only row-group reasoning over a Parquet file's
//! footer statistics (`spec.md` §4.7), grounded directly on
//! `original_source/src/kontra/preplan/planner.py`'s `preplan_single_parquet`.
//!
//! Every [`StaticPredicate`] is decided dataset-wide as [`Decision::PassMeta`]
//! (provably true for every row), [`Decision::FailMeta`] (provably false for
//! at least one row), or [`Decision::Unknown`] (stats can't decide it, the
//! residual tiers must scan). Row groups are kept only if some `Unknown`
//! predicate might overlap them; an empty predicate set keeps every group.

use std::collections::HashMap;

use bytes::Bytes;
use compact_str::CompactString;
use parquet::{arrow::arrow_reader::ParquetRecordBatchReaderBuilder, file::statistics::Statistics};
use serde_json::Value;

use crate::{
    compile::{StaticOp, StaticPredicate, StaticValue},
    error::{AppResult, resource_error}
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    PassMeta,
    FailMeta,
    Unknown
}

#[derive(Debug, Clone, Default)]
pub struct PreplanStats {
    pub rg_total:   usize,
    pub rg_kept:    usize,
    pub total_rows: i64
}

#[derive(Debug, Clone)]
pub struct Preplan {
    pub manifest_columns:    Vec<CompactString>,
    pub manifest_row_groups: Vec<usize>,
    pub rule_decisions:      HashMap<CompactString, Decision>,
    pub stats:               PreplanStats,
    pub fail_details:        HashMap<CompactString, Value>
}

#[derive(Debug, Clone, Default)]
struct ColStats {
    min:        Option<StaticValue>,
    max:        Option<StaticValue>,
    null_count: Option<u64>
}

/// Metadata-only pre-plan for a single Parquet file read fully into memory
/// (the footer is all that's actually touched; row data is never decoded).
pub fn preplan_single_parquet(bytes: Bytes, required_columns: &[CompactString], predicates: &[StaticPredicate]) -> AppResult<Preplan> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes).map_err(|e| resource_error(format!("failed to read parquet footer: {e}")))?;
    let file_metadata = reader.metadata();
    let schema_descr = file_metadata.file_metadata().schema_descr();

    let column_names: Vec<String> = schema_descr.columns().iter().map(|c| c.name().to_owned()).collect();

    let row_groups = file_metadata.row_groups();
    let rg_total = row_groups.len();

    // Per-row-group, per-column stats, keyed by column name.
    let rg_stats: Vec<HashMap<String, ColStats>> = row_groups
        .iter()
        .map(|rg| {
            let mut per_col = HashMap::new();
            for (idx, name) in column_names.iter().enumerate() {
                if let Some(stats) = rg.column(idx).statistics() {
                    per_col.insert(name.clone(), extract_stats(stats));
                }
            }
            per_col
        })
        .collect();

    let schema_types: HashMap<String, crate::dtype::DtypeFamily> = schema_descr
        .columns()
        .iter()
        .map(|c| (c.name().to_owned(), crate::dtype::parquet_physical_family(c.physical_type())))
        .collect();

    let mut rule_decisions = HashMap::new();
    let mut fail_details = HashMap::new();

    for pred in predicates {
        if pred.op == StaticOp::Dtype {
            let StaticValue::Str(expected) = &pred.value else {
                rule_decisions.insert(pred.rule_id.clone(), Decision::Unknown);
                continue;
            };
            match schema_types.get(pred.column.as_str()) {
                None => {
                    rule_decisions.insert(pred.rule_id.clone(), Decision::Unknown);
                }
                Some(actual) => {
                    let expected_family = crate::dtype::normalize_alias(expected);
                    if expected_family != crate::dtype::DtypeFamily::Unknown && expected_family == *actual {
                        rule_decisions.insert(pred.rule_id.clone(), Decision::PassMeta);
                    } else {
                        rule_decisions.insert(pred.rule_id.clone(), Decision::FailMeta);
                        fail_details.insert(pred.rule_id.clone(), serde_json::json!({"expected": expected, "actual": format!("{actual:?}")}));
                    }
                }
            }
            continue;
        }

        let stats_for = |rgc: &HashMap<String, ColStats>| rgc.get(pred.column.as_str()).cloned();
        let per_rg: Vec<Option<ColStats>> = rg_stats.iter().map(stats_for).collect();

        if decide_fail(pred.op, &pred.value, &per_rg) {
            rule_decisions.insert(pred.rule_id.clone(), Decision::FailMeta);
        } else if decide_pass(pred.op, &pred.value, &per_rg) {
            rule_decisions.insert(pred.rule_id.clone(), Decision::PassMeta);
        } else {
            rule_decisions.insert(pred.rule_id.clone(), Decision::Unknown);
        }
    }

    let unknown_preds: Vec<&StaticPredicate> = predicates
        .iter()
        .filter(|p| rule_decisions.get(&p.rule_id) == Some(&Decision::Unknown) && p.op != StaticOp::Dtype)
        .collect();

    let mut keep_rg: Vec<usize> = (0..rg_total).collect();
    if !unknown_preds.is_empty() {
        let mut kept = Vec::new();
        for (i, per_col) in rg_stats.iter().enumerate() {
            let overlaps = unknown_preds
                .iter()
                .any(|p| verdict_overlaps(p.op, &p.value, per_col.get(p.column.as_str())) != Some(false));
            if overlaps {
                kept.push(i);
            }
        }
        keep_rg = if kept.is_empty() { (0..rg_total).collect() } else { kept };
    }

    let total_rows = file_metadata.file_metadata().num_rows();

    Ok(Preplan {
        manifest_columns: required_columns.to_vec(),
        rule_decisions,
        stats: PreplanStats {
            rg_total,
            rg_kept: keep_rg.len(),
            total_rows
        },
        manifest_row_groups: keep_rg,
        fail_details
    })
}

fn extract_stats(stats: &Statistics) -> ColStats {
    let null_count = stats.null_count_opt();
    let (min, max) = match stats {
        Statistics::Boolean(_) => (None, None),
        Statistics::Int32(s) => (s.min_opt().map(|v| StaticValue::Num(*v as f64)), s.max_opt().map(|v| StaticValue::Num(*v as f64))),
        Statistics::Int64(s) => (s.min_opt().map(|v| StaticValue::Num(*v as f64)), s.max_opt().map(|v| StaticValue::Num(*v as f64))),
        Statistics::Float(s) => (s.min_opt().map(|v| StaticValue::Num(*v as f64)), s.max_opt().map(|v| StaticValue::Num(*v as f64))),
        Statistics::Double(s) => (s.min_opt().map(|v| StaticValue::Num(*v)), s.max_opt().map(|v| StaticValue::Num(*v))),
        Statistics::ByteArray(s) => (
            s.min_opt().and_then(|v| std::str::from_utf8(v.data()).ok()).map(|v| StaticValue::Str(v.to_owned())),
            s.max_opt().and_then(|v| std::str::from_utf8(v.data()).ok()).map(|v| StaticValue::Str(v.to_owned()))
        ),
        _ => (None, None)
    };
    ColStats { min, max, null_count }
}

fn as_num(v: &StaticValue) -> Option<f64> {
    match v {
        StaticValue::Num(n) => Some(*n),
        _ => None
    }
}

fn as_str(v: &StaticValue) -> Option<&str> {
    match v {
        StaticValue::Str(s) => Some(s.as_str()),
        _ => None
    }
}

/// `true` -> row group may satisfy the predicate, `false` -> provably
/// disjoint, `None` -> unknown (no stats at all; keep to be safe).
fn verdict_overlaps(op: StaticOp, val: &StaticValue, stats: Option<&ColStats>) -> Option<bool> {
    let stats = stats?;
    if stats.min.is_none() && stats.max.is_none() {
        return None;
    }
    match op {
        StaticOp::Eq => match (stats.min.as_ref().and_then(as_num), stats.max.as_ref().and_then(as_num), as_num(val)) {
            (Some(mn), Some(mx), Some(v)) => Some(!(v < mn || v > mx)),
            _ => Some(true)
        },
        StaticOp::Ne => Some(true),
        StaticOp::Ge => match (stats.max.as_ref().and_then(as_num), as_num(val)) {
            (Some(mx), Some(v)) => Some(mx >= v),
            _ => Some(true)
        },
        StaticOp::Le => match (stats.min.as_ref().and_then(as_num), as_num(val)) {
            (Some(mn), Some(v)) => Some(mn <= v),
            _ => Some(true)
        },
        StaticOp::Gt => match (stats.max.as_ref().and_then(as_num), as_num(val)) {
            (Some(mx), Some(v)) => Some(mx > v),
            _ => Some(true)
        },
        StaticOp::Lt => match (stats.min.as_ref().and_then(as_num), as_num(val)) {
            (Some(mn), Some(v)) => Some(mn < v),
            _ => Some(true)
        },
        StaticOp::PrefixEq => match (stats.min.as_ref().and_then(|v| as_str(v)), stats.max.as_ref().and_then(|v| as_str(v)), as_str(val)) {
            (Some(mn), Some(mx), Some(v)) => {
                let upper = format!("{v}\u{10FFFF}");
                Some(!(upper.as_str() < mn || v > mx))
            }
            _ => None
        },
        StaticOp::NotNull | StaticOp::Dtype => None
    }
}

fn decide_pass(op: StaticOp, val: &StaticValue, per_rg: &[Option<ColStats>]) -> bool {
    for s in per_rg {
        let Some(s) = s else { return false };
        match op {
            StaticOp::Ge => {
                let Some(mn) = s.min.as_ref().and_then(as_num) else { return false };
                let Some(v) = as_num(val) else { return false };
                if mn < v {
                    return false;
                }
            }
            StaticOp::Le => {
                let Some(mx) = s.max.as_ref().and_then(as_num) else { return false };
                let Some(v) = as_num(val) else { return false };
                if mx > v {
                    return false;
                }
            }
            StaticOp::Eq => {
                let (Some(mn), Some(mx), Some(v)) = (s.min.as_ref().and_then(as_num), s.max.as_ref().and_then(as_num), as_num(val)) else {
                    return false;
                };
                if !(mn == v && mx == v) {
                    return false;
                }
            }
            StaticOp::NotNull => {
                if s.null_count != Some(0) {
                    return false;
                }
            }
            _ => return false
        }
    }
    true
}

fn decide_fail(op: StaticOp, val: &StaticValue, per_rg: &[Option<ColStats>]) -> bool {
    for s in per_rg.iter().flatten() {
        match op {
            StaticOp::Ge => {
                if let (Some(mx), Some(v)) = (s.max.as_ref().and_then(as_num), as_num(val))
                    && mx < v
                {
                    return true;
                }
            }
            StaticOp::Le => {
                if let (Some(mn), Some(v)) = (s.min.as_ref().and_then(as_num), as_num(val))
                    && mn > v
                {
                    return true;
                }
            }
            StaticOp::Eq => {
                if let (Some(mn), Some(mx), Some(v)) = (s.min.as_ref().and_then(as_num), s.max.as_ref().and_then(as_num), as_num(val))
                    && (mx < v || mn > v || (mn == mx && mn != v))
                {
                    return true;
                }
            }
            StaticOp::NotNull => {
                if let Some(nulls) = s.null_count
                    && nulls > 0
                {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_null_stat_proves_pass_when_every_rg_is_clean() {
        let per_rg = vec![
            Some(ColStats {
                min:        None,
                max:        None,
                null_count: Some(0)
            }),
            Some(ColStats {
                min:        None,
                max:        None,
                null_count: Some(0)
            }),
        ];
        assert!(decide_pass(StaticOp::NotNull, &StaticValue::None, &per_rg));
    }

    #[test]
    fn not_null_stat_proves_fail_when_any_rg_has_nulls() {
        let per_rg = vec![Some(ColStats {
            min:        None,
            max:        None,
            null_count: Some(3)
        })];
        assert!(decide_fail(StaticOp::NotNull, &StaticValue::None, &per_rg));
    }

    #[test]
    fn range_ge_proves_pass_when_min_clears_bound() {
        let per_rg = vec![Some(ColStats {
            min:        Some(StaticValue::Num(10.0)),
            max:        Some(StaticValue::Num(20.0)),
            null_count: Some(0)
        })];
        assert!(decide_pass(StaticOp::Ge, &StaticValue::Num(5.0), &per_rg));
        assert!(!decide_pass(StaticOp::Ge, &StaticValue::Num(15.0), &per_rg));
    }

    #[test]
    fn range_ge_proves_fail_when_max_below_bound() {
        let per_rg = vec![Some(ColStats {
            min:        Some(StaticValue::Num(1.0)),
            max:        Some(StaticValue::Num(2.0)),
            null_count: Some(0)
        })];
        assert!(decide_fail(StaticOp::Ge, &StaticValue::Num(5.0), &per_rg));
    }

    #[test]
    fn unknown_without_stats_defaults_to_overlap() {
        assert_eq!(verdict_overlaps(StaticOp::Ge, &StaticValue::Num(5.0), None), None);
    }
}
