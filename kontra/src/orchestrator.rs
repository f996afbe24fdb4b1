//! Orchestrator (C8): the single entry point that runs the three-tier
//! cascade — metadata preplan, SQL pushdown, columnar residual — and
//! merges their results.
//!
//! Grounded directly on `original_source/src/kontra/engine/engine.py`'s
//! `ValidationEngine.run()`: contract load, build rules, compile plan,
//! build handle, preplan, pushdown, residual, merge, stats assembly.

use std::{collections::HashSet, fs, time::Instant};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    batch::ColumnarBatch,
    compile::to_static_predicates,
    config::Config,
    error::{AppError, AppResult, config_error},
    handle::DatasetHandle,
    materialize::{fetch_file_bytes, pick_materializer},
    plan::{self, CompiledPlan},
    preplan::{self, Decision},
    result::{self, ExecutionSource, RuleResult, RunSummary},
    rules::{Rule, RuleSpec, build_rules}
};

/// One entry of a contract file (`spec.md` §6). The legacy `dataset` key is
/// accepted as a synonym for `datasource`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "dataset")]
    pub datasource: String,
    pub rules: Vec<RuleSpec>
}

impl ContractFile {
    pub fn load(path: &str) -> AppResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| config_error(format!("failed to read contract '{path}': {e}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> AppResult<Self> {
        serde_yaml::from_str(content).map_err(|e| config_error(format!("invalid contract: {e}")))
    }
}

/// Maps onto the exit codes in `spec.md` §6; the CLI wrapper is responsible
/// for the actual `process::exit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    ValidationFailed,
    ConfigError,
    RuntimeError
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Passed => 0,
            Self::ValidationFailed => 1,
            Self::ConfigError => 2,
            Self::RuntimeError => 3
        }
    }

    fn from_summary(summary: &RunSummary) -> Self {
        if summary.passed { Self::Passed } else { Self::ValidationFailed }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct PreplanSummary {
    pub rg_kept:          usize,
    pub rg_total:         usize,
    pub rules_pass_meta:  usize,
    pub rules_fail_meta:  usize,
    pub rules_unknown:    usize
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct PushdownSummary {
    pub executor:     String,
    pub rules_pushed: usize
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ProjectionStats {
    pub required_count:  usize,
    pub loaded_count:    usize,
    pub available_count: usize,
    pub effective:       bool
}

/// Observability bag (`spec.md` §6's `RunStats`). No contract on exact
/// numeric values, only on key presence and monotonic relationships.
#[derive(Debug, Clone, Serialize, Default)]
pub struct RunStats {
    pub phases_ms:         std::collections::HashMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preplan_summary:   Option<PreplanSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pushdown_summary:  Option<PushdownSummary>,
    pub projection:        ProjectionStats,
    pub engine_label:      String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub io_debug:          Option<Value>
}

/// `spec.md` §6's run output: `{dataset, results, summary, stats?}`.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub dataset: String,
    pub results: Vec<RuleResult>,
    pub summary: RunSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats:   Option<RunStats>
}

fn config_error_output(dataset_label: &str, err: &AppError) -> (RunOutput, RunStatus) {
    warn!(error = %err, "run aborted at config stage");
    let mut summary = result::summarize(&[], dataset_label, None, None);
    summary.passed = false;
    (
        RunOutput {
            dataset: dataset_label.to_owned(),
            results: Vec::new(),
            summary,
            stats:   None
        },
        RunStatus::ConfigError
    )
}

fn runtime_error_output(dataset_label: &str, err: &AppError) -> (RunOutput, RunStatus) {
    warn!(error = %err, "run aborted with a runtime error");
    let mut summary = result::summarize(&[], dataset_label, None, None);
    summary.passed = false;
    (
        RunOutput {
            dataset: dataset_label.to_owned(),
            results: Vec::new(),
            summary,
            stats:   None
        },
        RunStatus::RuntimeError
    )
}

/// Runs the full cascade for `contract_path`. `handle_override` replaces
/// `contract.datasource` when given (the CLI's `--data`/BYOC path);
/// `config` supplies the `preplan`/`sql_pushdown`/`io_debug` tunables.
pub fn run(contract_path: &str, handle_override: Option<DatasetHandle>, config: &Config) -> (RunOutput, RunStatus) {
    let mut phases_ms = std::collections::HashMap::new();

    // Step 1: load contract.
    let contract = match ContractFile::load(contract_path) {
        Ok(c) => c,
        Err(e) => return config_error_output(contract_path, &e)
    };
    let dataset_label = contract.name.clone().unwrap_or_else(|| contract.datasource.clone());

    // Step 2: build rules, compile plan.
    let t0 = Instant::now();
    let rules = match build_rules(&contract.rules) {
        Ok(r) => r,
        Err(e) => return config_error_output(&dataset_label, &e)
    };
    let base_plan = plan::compile(&rules);
    phases_ms.insert("compile".to_owned(), t0.elapsed().as_millis() as u64);

    // Step 3: build dataset handle.
    let t0 = Instant::now();
    let mut handle = match handle_override {
        Some(h) => h,
        None => match DatasetHandle::from_uri(&contract.datasource) {
            Ok(h) => h,
            Err(e) => return config_error_output(&dataset_label, &e)
        }
    };
    phases_ms.insert("handle".to_owned(), t0.elapsed().as_millis() as u64);

    let mut handled_ids: HashSet<CompactString> = HashSet::new();
    let mut metadata_results: Vec<RuleResult> = Vec::new();
    let mut sql_results: Vec<RuleResult> = Vec::new();
    let mut preplan_summary: Option<PreplanSummary> = None;
    let mut pushdown_summary: Option<PushdownSummary> = None;
    let mut manifest_row_groups: Option<Vec<usize>> = None;

    // Step 4: preplan tier, Parquet file sources only.
    if config.engine.preplan && handle.format == crate::handle::Format::Parquet {
        let t0 = Instant::now();
        match run_preplan_tier(&handle, &rules) {
            Ok((results, summary, row_groups)) => {
                for r in &results {
                    handled_ids.insert(r.rule_id.clone());
                }
                preplan_summary = Some(summary);
                manifest_row_groups = row_groups;
                metadata_results = results;
            }
            Err(e) => {
                // Benign metadata absence (no stats, unreadable footer):
                // downgrades preplan effectiveness, never fails the run.
                info!(error = %e, "preplan tier skipped");
            }
        }
        phases_ms.insert("preplan".to_owned(), t0.elapsed().as_millis() as u64);
    }

    // Step 5: SQL pushdown tier.
    if config.engine.sql_pushdown {
        let t0 = Instant::now();
        let residual_after_meta = plan::without_ids(&base_plan, &handled_ids);
        let pushable: Vec<_> = residual_after_meta.sql_specs.clone();

        if let Some(executor) = crate::sql::pick_executor(&handle, &pushable) {
            let compiled = executor.compile(&pushable);
            match executor.execute(&handle, &compiled) {
                Ok(outcome) => {
                    for r in &outcome.results {
                        handled_ids.insert(r.rule_id.clone());
                    }
                    pushdown_summary = Some(PushdownSummary {
                        executor:     executor.name().to_owned(),
                        rules_pushed: outcome.results.len()
                    });
                    sql_results = outcome.results;

                    if let Some(staged) = outcome.staged_parquet_path {
                        match DatasetHandle::from_uri(&format!("file://{}", staged.display())) {
                            Ok(staged_handle) => handle = staged_handle,
                            Err(e) => return runtime_error_output(&dataset_label, &e)
                        }
                    }
                }
                Err(e) => return runtime_error_output(&dataset_label, &e)
            }
        }

        if !residual_after_meta.custom_checks.is_empty() {
            match crate::sql::execute_custom_checks(&handle, &residual_after_meta.custom_checks) {
                Ok(results) => {
                    for r in &results {
                        handled_ids.insert(r.rule_id.clone());
                    }
                    sql_results.extend(results);
                }
                Err(e) => return runtime_error_output(&dataset_label, &e)
            }
        }
        phases_ms.insert("pushdown".to_owned(), t0.elapsed().as_millis() as u64);
    }

    // Step 6: residual tier.
    let t0 = Instant::now();
    let residual = plan::without_ids(&base_plan, &handled_ids);
    let mut columnar_results = Vec::new();
    let mut projection = ProjectionStats::default();
    let mut io_debug = None;
    let mut engine_label = "none".to_owned();
    let mut row_count = None;

    if residual.has_residual_work() {
        let materializer = pick_materializer(&handle);
        let batch_result = if let Some(row_groups) = manifest_row_groups.as_deref() {
            materializer.to_columnar_with_row_groups(Some(&residual.required_cols), Some(row_groups))
        } else {
            materializer.to_columnar(Some(&residual.required_cols))
        };

        match batch_result {
            Ok(batch) => {
                projection = projection_stats(materializer.as_ref(), &residual, &batch);
                io_debug = materializer.io_debug();
                engine_label = materializer.engine_name().to_owned();
                row_count = Some(batch.row_count as u64);
                columnar_results = plan::execute_compiled(&batch, &residual);
            }
            Err(e) => return runtime_error_output(&dataset_label, &e)
        }
    }
    phases_ms.insert("residual".to_owned(), t0.elapsed().as_millis() as u64);

    // Step 7: merge and summarize.
    let results = result::merge(&base_plan.rule_order, metadata_results, sql_results, columnar_results);
    let summary = result::summarize(&results, &dataset_label, row_count, None);

    let stats = RunStats {
        phases_ms,
        preplan_summary,
        pushdown_summary,
        projection,
        engine_label,
        io_debug
    };

    let status = RunStatus::from_summary(&summary);
    (
        RunOutput {
            dataset: dataset_label,
            results,
            summary,
            stats: Some(stats)
        },
        status
    )
}

fn projection_stats(materializer: &dyn crate::materialize::Materializer, plan: &CompiledPlan, batch: &ColumnarBatch) -> ProjectionStats {
    let available_count = materializer.schema().map(|s| s.len()).unwrap_or(batch.columns.len());
    ProjectionStats {
        required_count: plan.required_cols.len(),
        loaded_count: batch.columns.len(),
        available_count,
        effective: batch.columns.len() < available_count
    }
}

/// Runs the preplan tier (`spec.md` §4.8 step 4): extracts static
/// predicates from every rule, reads the Parquet footer once, and turns
/// every `pass_meta`/`fail_meta` decision into a `RuleResult`.
fn run_preplan_tier(handle: &DatasetHandle, rules: &[Rule]) -> AppResult<(Vec<RuleResult>, PreplanSummary, Option<Vec<usize>>)> {
    let static_preds: Vec<_> = rules.iter().flat_map(to_static_predicates).collect();
    if static_preds.is_empty() {
        return Ok((Vec::new(), PreplanSummary::default(), None));
    }

    let bytes = fetch_file_bytes(handle)?;
    let required_cols: Vec<CompactString> = rules.iter().flat_map(|r| r.required_columns()).collect();
    let preplan = preplan::preplan_single_parquet(bytes, &required_cols, &static_preds)?;

    let rule_by_id: std::collections::HashMap<&CompactString, &Rule> = rules.iter().map(|r| (&r.rule_id, r)).collect();

    let mut results = Vec::new();
    let mut rules_pass_meta = 0;
    let mut rules_fail_meta = 0;
    let mut rules_unknown = 0;

    for pred in &static_preds {
        let Some(decision) = preplan.rule_decisions.get(&pred.rule_id) else {
            continue;
        };
        let Some(rule) = rule_by_id.get(&pred.rule_id) else {
            continue;
        };

        match decision {
            Decision::PassMeta => {
                rules_pass_meta += 1;
                results.push(RuleResult::pass(
                    rule.rule_id.clone(),
                    rule.name(),
                    rule.severity,
                    ExecutionSource::Metadata,
                    "proven from column statistics"
                ));
            }
            Decision::FailMeta => {
                rules_fail_meta += 1;
                let mut r = RuleResult::fail(
                    rule.rule_id.clone(),
                    rule.name(),
                    rule.severity,
                    ExecutionSource::Metadata,
                    1,
                    "disproven from column statistics",
                    result::failure_mode_for(rule.name())
                );
                if let Some(details) = preplan.fail_details.get(&pred.rule_id) {
                    r = r.with_details(details.clone());
                }
                results.push(r);
            }
            Decision::Unknown => rules_unknown += 1
        }
    }

    let summary = PreplanSummary {
        rg_kept: preplan.stats.rg_kept,
        rg_total: preplan.stats.rg_total,
        rules_pass_meta,
        rules_fail_meta,
        rules_unknown
    };

    Ok((results, summary, Some(preplan.manifest_row_groups)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_parses_legacy_dataset_key() {
        let yaml = "name: orders\ndataset: file:///tmp/orders.parquet\nrules:\n  - name: not_null\n    params: { column: id }\n";
        let contract = ContractFile::parse(yaml).unwrap();
        assert_eq!(contract.datasource, "file:///tmp/orders.parquet");
        assert_eq!(contract.rules.len(), 1);
    }

    #[test]
    fn run_status_maps_to_spec_exit_codes() {
        assert_eq!(RunStatus::Passed.exit_code(), 0);
        assert_eq!(RunStatus::ValidationFailed.exit_code(), 1);
        assert_eq!(RunStatus::ConfigError.exit_code(), 2);
        assert_eq!(RunStatus::RuntimeError.exit_code(), 3);
    }

    #[test]
    fn malformed_contract_yields_config_error_status() {
        let (_, status) = run("/nonexistent/contract.yaml", None, &Config::default());
        assert_eq!(status, RunStatus::ConfigError);
    }
}
