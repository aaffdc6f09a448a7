//! Experiment Schema Tests
//!
//! Records, run lifecycle and the in-memory tracking store.

use elegir::experiment::{
    metric_key, ArtifactRecord, ExperimentRecord, ExperimentStore, MetricRecord, ParamRecord,
    RunRecord, RunScope, RunStatus, TrackingBackend,
};
use elegir::Error;

// =============================================================================
// ExperimentRecord Tests
// =============================================================================

#[test]
fn test_experiment_record_creation() {
    let record = ExperimentRecord::new("exp-001", "model_selection");

    assert_eq!(record.experiment_id(), "exp-001");
    assert_eq!(record.name(), "model_selection");
    assert!(record.created_at().timestamp() > 0);
    assert!(record.config().is_none());
}

#[test]
fn test_experiment_record_with_config_and_tags() {
    let config = serde_json::json!({ "threshold": 0.6, "cv_folds": 3 });

    let record = ExperimentRecord::builder("exp-002", "model_selection")
        .config(config.clone())
        .tag("dataset", "housing")
        .build();

    assert_eq!(record.config(), Some(&config));
    assert_eq!(record.tag("dataset"), Some("housing"));
    assert_eq!(record.tag("owner"), None);
}

#[test]
fn test_experiment_record_serialization() {
    let record = ExperimentRecord::new("exp-003", "Serialization Test");

    let json = serde_json::to_string(&record).expect("serialization failed");
    let deserialized: ExperimentRecord =
        serde_json::from_str(&json).expect("deserialization failed");

    assert_eq!(record.experiment_id(), deserialized.experiment_id());
    assert_eq!(record.created_at(), deserialized.created_at());
}

// =============================================================================
// RunRecord Tests
// =============================================================================

#[test]
fn test_run_record_lifecycle() {
    let mut run = RunRecord::new("run-001", "exp-001", "Best_Model_Random Forest");
    assert_eq!(run.status(), RunStatus::Pending);
    assert!(run.started_at().is_none());

    run.start();
    assert_eq!(run.status(), RunStatus::Running);
    assert!(run.started_at().is_some());
    assert!(run.duration().is_none());

    run.complete(RunStatus::Success);
    assert_eq!(run.status(), RunStatus::Success);
    assert!(run.ended_at().is_some());
    assert!(run.duration().is_some());
}

#[test]
fn test_run_status_terminal() {
    assert!(!RunStatus::Pending.is_terminal());
    assert!(!RunStatus::Running.is_terminal());
    assert!(RunStatus::Success.is_terminal());
    assert!(RunStatus::Failed.is_terminal());
    assert!(RunStatus::Cancelled.is_terminal());
}

// =============================================================================
// MetricRecord / ParamRecord / ArtifactRecord Tests
// =============================================================================

#[test]
fn test_metric_record_nan_round_trips_as_null() {
    let metric = MetricRecord::new("run-001", "Decision_Tree_r2", 0, f64::NAN);

    let json = serde_json::to_string(&metric).unwrap();
    assert!(json.contains("\"value\":null"));

    let back: MetricRecord = serde_json::from_str(&json).unwrap();
    assert!(back.value().is_nan());
    assert_eq!(back.key(), "Decision_Tree_r2");
}

#[test]
fn test_param_record_fields() {
    let param = ParamRecord::new("run-001", "model_name", "Random Forest");
    assert_eq!(param.run_id(), "run-001");
    assert_eq!(param.key(), "model_name");
    assert_eq!(param.value(), "Random Forest");
}

#[test]
fn test_artifact_record_hashes_content() {
    let a = ArtifactRecord::from_bytes("run-001", "model", b"weights");
    let b = ArtifactRecord::from_bytes("run-002", "model", b"weights");
    let c = ArtifactRecord::from_bytes("run-003", "model", b"other");

    assert!(a.cas_hash().starts_with("sha256:"));
    assert_eq!(a.cas_hash().len(), "sha256:".len() + 64);
    assert_eq!(a.cas_hash(), b.cas_hash());
    assert_ne!(a.cas_hash(), c.cas_hash());
    assert_eq!(a.size_bytes(), 7);
}

// =============================================================================
// ExperimentStore Tests
// =============================================================================

#[test]
fn test_store_run_ids_are_sequential() {
    let experiment = ExperimentRecord::new("exp-001", "model_selection");
    let mut store = ExperimentStore::new();

    let first = store.start_run(&experiment, "first").unwrap();
    let second = store.start_run(&experiment, "second").unwrap();

    assert_eq!(first, "run-000001");
    assert_eq!(second, "run-000002");
    assert_eq!(store.experiment_count(), 1);
    assert_eq!(store.get_runs_for_experiment("exp-001").len(), 2);
}

#[test]
fn test_store_params_are_write_once() {
    let experiment = ExperimentRecord::new("exp-001", "model_selection");
    let mut store = ExperimentStore::new();
    let run_id = store.start_run(&experiment, "run").unwrap();

    store.log_param(&run_id, "model_name", "Linear Regression").unwrap();
    let err = store.log_param(&run_id, "model_name", "Decision Tree").unwrap_err();

    assert!(matches!(err, Error::Tracking { .. }));
    assert_eq!(store.param(&run_id, "model_name"), Some("Linear Regression"));
}

#[test]
fn test_store_metric_steps_and_latest_value() {
    let experiment = ExperimentRecord::new("exp-001", "model_selection");
    let mut store = ExperimentStore::new();
    let run_id = store.start_run(&experiment, "run").unwrap();

    store.log_metric(&run_id, "r2_score", 0.5).unwrap();
    store.log_metric(&run_id, "r2_score", 0.7).unwrap();
    store.log_metric(&run_id, "mae", 1.2).unwrap();

    let history = store.get_metrics_for_run(&run_id, "r2_score");
    let steps: Vec<u64> = history.iter().map(MetricRecord::step).collect();
    assert_eq!(steps, vec![0, 1]);
    assert_eq!(store.metric(&run_id, "r2_score"), Some(0.7));
    assert_eq!(store.metrics_for_run(&run_id).len(), 3);
}

#[test]
fn test_store_rejects_calls_on_closed_or_unknown_run() {
    let experiment = ExperimentRecord::new("exp-001", "model_selection");
    let mut store = ExperimentStore::new();
    let run_id = store.start_run(&experiment, "run").unwrap();
    store.end_run(&run_id, RunStatus::Success).unwrap();

    assert!(store.log_metric(&run_id, "mae", 0.1).is_err());
    assert!(store.end_run(&run_id, RunStatus::Failed).is_err());
    assert!(store.log_param("run-999999", "k", "v").is_err());
    assert!(store.end_run(&run_id, RunStatus::Running).is_err());
}

#[test]
fn test_store_deduplicates_artifact_blobs() {
    let experiment = ExperimentRecord::new("exp-001", "model_selection");
    let mut store = ExperimentStore::new();
    let a = store.start_run(&experiment, "a").unwrap();
    let b = store.start_run(&experiment, "b").unwrap();

    let ra = store.log_artifact(&a, "model", b"same bytes").unwrap();
    let rb = store.log_artifact(&b, "model", b"same bytes").unwrap();

    assert_eq!(ra.cas_hash(), rb.cas_hash());
    assert_eq!(store.artifact_count(), 2);
    assert_eq!(store.blob(ra.cas_hash()), Some(&b"same bytes"[..]));
}

#[test]
fn test_store_json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runs.json");
    let experiment = ExperimentRecord::new("exp-001", "model_selection");
    let mut store = ExperimentStore::new();

    let run_id = store.start_run(&experiment, "Best_Model_Linear Regression").unwrap();
    store.log_param(&run_id, "model_name", "Linear Regression").unwrap();
    store.log_metric(&run_id, "r2_score", 0.93).unwrap();
    store.log_metric(&run_id, &metric_key("Decision Tree"), f64::NAN).unwrap();
    store.end_run(&run_id, RunStatus::Success).unwrap();

    store.save_json(&path).unwrap();
    let loaded = ExperimentStore::load_json(&path).unwrap();

    assert_eq!(loaded.run_count(), 1);
    assert_eq!(loaded.get_run(&run_id).map(RunRecord::status), Some(RunStatus::Success));
    assert_eq!(loaded.param(&run_id, "model_name"), Some("Linear Regression"));
    assert!((loaded.metric(&run_id, "r2_score").unwrap() - 0.93).abs() < 1e-12);
    assert!(loaded.metric(&run_id, "Decision_Tree_r2").unwrap().is_nan());
}

// =============================================================================
// RunScope Tests
// =============================================================================

#[test]
fn test_run_scope_finish_and_fail() {
    let experiment = ExperimentRecord::new("exp-001", "model_selection");
    let mut store = ExperimentStore::new();

    let scope = RunScope::open(&mut store, &experiment, "ok").unwrap();
    let ok = scope.finish().unwrap();
    assert_eq!(ok.status(), RunStatus::Success);

    let scope = RunScope::open(&mut store, &experiment, "bad").unwrap();
    let bad = scope.fail().unwrap();
    assert_eq!(bad.status(), RunStatus::Failed);
}

#[test]
fn test_run_scope_execute_propagates_body_error() {
    let experiment = ExperimentRecord::new("exp-001", "model_selection");
    let mut store = ExperimentStore::new();

    let scope = RunScope::open(&mut store, &experiment, "dup").unwrap();
    let run_id = scope.run_id().to_string();
    let err = scope
        .execute(|run| {
            run.log_param("model_name", "Linear Regression")?;
            run.log_param("model_name", "Linear Regression")
        })
        .unwrap_err();

    assert!(matches!(err, Error::Tracking { .. }));
    assert_eq!(store.get_run(&run_id).map(RunRecord::status), Some(RunStatus::Failed));
}
