//! End-to-end scenarios from `spec.md` §8 that don't require a live
//! Postgres/SQL Server connection: preplan proving pass/fail from a real
//! Parquet footer, a full contract-file run against a local file, and
//! severity aggregation across mixed outcomes.

use std::{fs, sync::Arc};

use arrow::{
    array::{Int64Array, RecordBatch},
    datatypes::{DataType, Field, Schema}
};
use kontra::{
    config::Config,
    handle::DatasetHandle,
    orchestrator::{ContractFile, RunStatus}
};
use parquet::arrow::ArrowWriter;
use tempfile::NamedTempFile;

fn write_parquet(rows_per_group: &[Vec<Option<i64>>]) -> NamedTempFile {
    let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
    let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, true)]));
    let mut writer = ArrowWriter::try_new(file.reopen().unwrap(), schema.clone(), None).unwrap();
    for group in rows_per_group {
        let array = Int64Array::from(group.clone());
        let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(array)]).unwrap();
        writer.write(&batch).unwrap();
        writer.flush().unwrap();
    }
    writer.close().unwrap();
    file
}

fn contract_for(path: &std::path::Path, rule_yaml: &str) -> NamedTempFile {
    let contract = NamedTempFile::new().unwrap();
    let yaml = format!(
        "name: orders\ndatasource: file://{}\nrules:\n{}\n",
        path.display(),
        rule_yaml
    );
    fs::write(contract.path(), yaml).unwrap();
    contract
}

#[test]
fn scenario_1_preplan_proves_pass() {
    let data = write_parquet(&[vec![Some(1), Some(2)], vec![Some(3), Some(4)]]);
    let contract = contract_for(data.path(), "  - name: not_null\n    params: { column: id }\n");

    let (output, status) = kontra::orchestrator::run(contract.path().to_str().unwrap(), None, &Config::default());

    assert_eq!(status, RunStatus::Passed);
    assert_eq!(output.results.len(), 1);
    assert!(output.results[0].passed);
    assert_eq!(output.results[0].execution_source, kontra::result::ExecutionSource::Metadata);
}

#[test]
fn scenario_2_preplan_proves_fail() {
    let data = write_parquet(&[vec![Some(1), None], vec![Some(3), Some(4)]]);
    let contract = contract_for(data.path(), "  - name: not_null\n    params: { column: id }\n");

    let (output, status) = kontra::orchestrator::run(contract.path().to_str().unwrap(), None, &Config::default());

    assert_eq!(status, RunStatus::ValidationFailed);
    assert_eq!(output.results.len(), 1);
    assert!(!output.results[0].passed);
    assert_eq!(output.results[0].execution_source, kontra::result::ExecutionSource::Metadata);
    assert_eq!(output.results[0].failure_mode, Some(kontra::result::FailureMode::NullValues));
}

#[test]
fn scenario_6_severity_aggregation() {
    let data = write_parquet(&[vec![Some(1), None, Some(3)]]);
    let rules = "  - name: min_rows\n    params: { n: 10 }\n  \
                 - name: max_rows\n    params: { n: 1 }\n    severity: warning\n  \
                 - name: not_null\n    params: { column: id }\n    severity: warning\n";
    let contract = contract_for(data.path(), rules);

    let (output, status) = kontra::orchestrator::run(contract.path().to_str().unwrap(), None, &Config::default());

    assert_eq!(status, RunStatus::ValidationFailed);
    assert!(!output.summary.passed);
    assert_eq!(output.summary.blocking_failures, 1);
    assert_eq!(output.summary.warning_failures, 1);
}

#[test]
fn malformed_rule_name_yields_config_error() {
    let data = write_parquet(&[vec![Some(1)]]);
    let contract = contract_for(data.path(), "  - name: not_a_real_rule\n    params: {}\n");

    let (_, status) = kontra::orchestrator::run(contract.path().to_str().unwrap(), None, &Config::default());

    assert_eq!(status, RunStatus::ConfigError);
}

#[test]
fn contract_file_handle_override_takes_priority_over_datasource() {
    let data = write_parquet(&[vec![Some(1), Some(2)]]);
    let contract = contract_for(std::path::Path::new("/nonexistent/does-not-matter.parquet"), "  - name: not_null\n    params: { column: id }\n");

    let handle = DatasetHandle::from_uri(&format!("file://{}", data.path().display())).unwrap();
    let (_, status) = kontra::orchestrator::run(contract.path().to_str().unwrap(), Some(handle), &Config::default());

    assert_eq!(status, RunStatus::Passed);
}

#[test]
fn legacy_dataset_key_is_accepted_as_datasource_alias() {
    let yaml = "name: legacy\ndataset: file:///tmp/does-not-exist.parquet\nrules: []\n";
    let parsed = ContractFile::parse(yaml).unwrap();
    assert_eq!(parsed.datasource, "file:///tmp/does-not-exist.parquet");
}
