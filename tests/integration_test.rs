//! End-to-end pipeline tests: select → record → persist
//!
//! Shapes follow the tabular fixture the trainer is built for: 100 training
//! rows and 20 test rows, 7 features plus the target in the last column.

use ndarray::{s, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use elegir::estimator::{DecisionTreeRegressor, LinearRegression, RandomForestRegressor};
use elegir::experiment::{
    ArtifactRecord, ExperimentRecord, ExperimentStore, RunRecord, RunStatus, TrackingBackend,
};
use elegir::persist::load_artifact;
use elegir::{
    Error, FamilyRegistry, ModelFamily, ModelTrainer, ParamGrid, Stage, TrainerConfig,
};

// =============================================================================
// Fixtures
// =============================================================================

/// `rows x 8` matrix; target = fixed linear combination of 7 features + noise.
fn linear_matrix(rows: usize, noise: f64, seed: u64) -> Array2<f64> {
    let weights = [3.0, -2.0, 0.5, 1.5, 0.0, -1.0, 2.5];
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut m = Array2::<f64>::zeros((rows, 8));
    for i in 0..rows {
        let mut target = 4.0;
        for (j, w) in weights.iter().enumerate() {
            let v: f64 = rng.gen_range(-5.0..5.0);
            m[[i, j]] = v;
            target += w * v;
        }
        m[[i, 7]] = target + noise * rng.gen_range(-1.0..1.0);
    }
    m
}

/// Target is pure noise: no family can reach the threshold.
fn noise_matrix(rows: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, 8), |_| rng.gen_range(-1.0..1.0))
}

fn registry() -> FamilyRegistry {
    FamilyRegistry::new()
        .with_family(ModelFamily::new(
            "Random Forest",
            || Box::new(RandomForestRegressor::default()),
            ParamGrid::new().axis("n_estimators", [8_i64, 16]),
        ))
        .and_then(|r| {
            r.with_family(ModelFamily::new(
                "Decision Tree",
                || Box::new(DecisionTreeRegressor::new()),
                ParamGrid::new().axis("criterion", ["squared_error", "friedman_mse"]),
            ))
        })
        .and_then(|r| {
            r.with_family(ModelFamily::new(
                "Linear Regression",
                || Box::new(LinearRegression::new()),
                ParamGrid::new(),
            ))
        })
        .unwrap()
}

fn trainer(dir: &std::path::Path) -> ModelTrainer {
    let config = TrainerConfig::builder()
        .artifact_path(dir.join("artifacts").join("model.json"))
        .build()
        .unwrap();
    ModelTrainer::new(config).unwrap()
}

// =============================================================================
// Happy path
// =============================================================================

#[test]
fn test_end_to_end_selects_records_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = trainer(dir.path());
    let train = linear_matrix(100, 0.1, 1);
    let test = linear_matrix(20, 0.1, 2);
    let experiment = ExperimentRecord::new("exp-1", "model_selection");
    let mut store = ExperimentStore::new();

    let summary = trainer
        .train(train.view(), test.view(), &registry(), &mut store, &experiment)
        .unwrap();

    // (a) a float r2 no greater than 1
    assert!(summary.score() <= 1.0);
    assert!(summary.score() > 0.99);
    assert_eq!(summary.best_name(), "Linear Regression");

    // (b) exactly one artifact file at the configured path
    let artifact_dir = dir.path().join("artifacts");
    let files: Vec<_> = std::fs::read_dir(&artifact_dir).unwrap().collect();
    assert_eq!(files.len(), 1);
    assert!(artifact_dir.join("model.json").is_file());
    assert_eq!(summary.artifact_path(), artifact_dir.join("model.json"));

    // (c) one closed run with a metric per family plus the headline metrics
    assert_eq!(store.run_count(), 1);
    let run = summary.run();
    assert_eq!(run.status(), RunStatus::Success);
    assert_eq!(run.run_name(), "Best_Model_Linear Regression");
    for key in [
        "r2_score",
        "mae",
        "mse",
        "rmse",
        "Random_Forest_r2",
        "Decision_Tree_r2",
        "Linear_Regression_r2",
    ] {
        assert!(store.metric(run.run_id(), key).is_some(), "missing metric {key}");
    }
    assert_eq!(store.metrics_for_run(run.run_id()).len(), 7);
    assert_eq!(store.param(run.run_id(), "model_name"), Some("Linear Regression"));
    assert_eq!(
        store.param(run.run_id(), "best_params"),
        Some(r#"{"fit_intercept":true}"#)
    );
    assert_eq!(store.artifacts_for_run(run.run_id()).len(), 1);
}

#[test]
fn test_persisted_artifact_restores_a_predicting_model() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = trainer(dir.path());
    let train = linear_matrix(100, 0.0, 3);
    let test = linear_matrix(20, 0.0, 4);
    let experiment = trainer.experiment();
    let mut store = ExperimentStore::new();
    let registry = registry();

    let summary = trainer
        .train(train.view(), test.view(), &registry, &mut store, &experiment)
        .unwrap();

    let artifact = load_artifact(summary.artifact_path()).unwrap();
    assert_eq!(artifact.family(), summary.best_name());
    assert_eq!(artifact.n_features(), 7);

    let model = registry.restore(&artifact).unwrap();
    let x_test = test.slice(s![.., ..7]);
    let pred = model.predict(x_test).unwrap();
    for (p, t) in pred.iter().zip(test.column(7).iter()) {
        assert!((p - t).abs() < 1e-6);
    }
}

#[test]
fn test_rerun_is_deterministic_and_overwrites_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = trainer(dir.path());
    let train = linear_matrix(100, 2.0, 5);
    let test = linear_matrix(20, 2.0, 6);
    let experiment = trainer.experiment();
    let mut store = ExperimentStore::new();
    let registry = registry();

    let first = trainer
        .train(train.view(), test.view(), &registry, &mut store, &experiment)
        .unwrap();
    let second = trainer
        .train(train.view(), test.view(), &registry, &mut store, &experiment)
        .unwrap();

    assert_eq!(first.best_name(), second.best_name());
    assert!((first.score() - second.score()).abs() < 1e-12);
    assert_eq!(first.report(), second.report());
    assert_eq!(store.run_count(), 2);
    assert_ne!(first.run().run_id(), second.run().run_id());
    assert!(second.artifact_path().is_file());
}

// =============================================================================
// Failure paths
// =============================================================================

#[test]
fn test_rejection_has_no_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = trainer(dir.path());
    let train = noise_matrix(100, 7);
    let test = noise_matrix(20, 8);
    let experiment = trainer.experiment();
    let mut store = ExperimentStore::new();

    let err = trainer
        .train(train.view(), test.view(), &registry(), &mut store, &experiment)
        .unwrap_err();

    let Error::NoAcceptableModel(rejection) = &err else {
        panic!("expected NoAcceptableModel, got {err:?}");
    };
    assert_eq!(err.stage(), Stage::Selection);
    assert_eq!(rejection.report.len(), 3);
    assert!(rejection.best_score < 0.6);
    assert!(store.is_empty());
    assert!(!dir.path().join("artifacts").exists());
}

#[test]
fn test_malformed_input_fails_before_search() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = trainer(dir.path());
    let train = linear_matrix(100, 0.0, 9);
    let test = Array2::<f64>::zeros((20, 6));
    let experiment = trainer.experiment();
    let mut store = ExperimentStore::new();

    let err = trainer
        .train(train.view(), test.view(), &registry(), &mut store, &experiment)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidShape(_)));
    assert_eq!(err.stage(), Stage::Validation);
    assert!(store.is_empty());
}

#[test]
fn test_persistence_error_surfaces_after_run_closed() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"occupied").unwrap();
    let config = TrainerConfig::builder()
        .artifact_path(blocker.join("model.json"))
        .build()
        .unwrap();
    let trainer = ModelTrainer::new(config).unwrap();
    let train = linear_matrix(100, 0.1, 10);
    let test = linear_matrix(20, 0.1, 11);
    let experiment = trainer.experiment();
    let mut store = ExperimentStore::new();

    let err = trainer
        .train(train.view(), test.view(), &registry(), &mut store, &experiment)
        .unwrap_err();

    assert!(matches!(err, Error::Persist { .. }));
    let runs = store.get_runs_for_experiment(experiment.experiment_id());
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status(), RunStatus::Success);
}

/// Store whose artifact sink is down.
struct NoArtifactStore(ExperimentStore);

impl TrackingBackend for NoArtifactStore {
    fn start_run(&mut self, experiment: &ExperimentRecord, run_name: &str) -> elegir::Result<String> {
        self.0.start_run(experiment, run_name)
    }
    fn log_param(&mut self, run_id: &str, key: &str, value: &str) -> elegir::Result<()> {
        self.0.log_param(run_id, key, value)
    }
    fn log_metric(&mut self, run_id: &str, key: &str, value: f64) -> elegir::Result<()> {
        self.0.log_metric(run_id, key, value)
    }
    fn log_artifact(&mut self, run_id: &str, _key: &str, _bytes: &[u8]) -> elegir::Result<ArtifactRecord> {
        Err(Error::Tracking {
            run_id: run_id.to_string(),
            message: "artifact sink unavailable".to_string(),
        })
    }
    fn end_run(&mut self, run_id: &str, status: RunStatus) -> elegir::Result<()> {
        self.0.end_run(run_id, status)
    }
    fn run(&self, run_id: &str) -> Option<RunRecord> {
        self.0.run(run_id)
    }
}

#[test]
fn test_tracking_error_closes_run_and_skips_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = trainer(dir.path());
    let train = linear_matrix(100, 0.1, 12);
    let test = linear_matrix(20, 0.1, 13);
    let experiment = trainer.experiment();
    let mut backend = NoArtifactStore(ExperimentStore::new());

    let err = trainer
        .train(train.view(), test.view(), &registry(), &mut backend, &experiment)
        .unwrap_err();

    assert!(matches!(err, Error::Tracking { .. }));
    assert_eq!(err.stage(), Stage::Recording);
    let runs = backend.0.get_runs_for_experiment(experiment.experiment_id());
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status(), RunStatus::Failed);
    // Metrics logged before the failure are kept
    assert!(backend.0.metric(runs[0].run_id(), "r2_score").is_some());
    assert!(!dir.path().join("artifacts").exists());
}

// =============================================================================
// Default registry
// =============================================================================

#[test]
#[ignore = "searches every built-in grid; run with --ignored"]
fn test_default_registry_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = trainer(dir.path());
    let train = linear_matrix(100, 0.5, 14);
    let test = linear_matrix(20, 0.5, 15);
    let experiment = trainer.experiment();
    let mut store = ExperimentStore::new();
    let registry = FamilyRegistry::default_regressors().unwrap();

    let summary = trainer
        .train(train.view(), test.view(), &registry, &mut store, &experiment)
        .unwrap();

    assert_eq!(summary.report().len(), registry.len());
    assert_eq!(store.metrics_for_run(summary.run().run_id()).len(), 4 + registry.len());
    assert!(summary.score() >= 0.6);
}
