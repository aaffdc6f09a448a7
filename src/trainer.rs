//! End-to-end training pipeline
//!
//! ```text
//! train/test matrices ─► DatasetSplit ─► ModelSelectionEngine
//!                                              │
//!                    Rejected ◄────────────────┤ (no run, no file)
//!                                              ▼
//!                            ExperimentRecorder (run Best_Model_<name>)
//!                                              ▼
//!                                  persist(artifact_path)
//!                                              ▼
//!                                      TrainingSummary
//! ```
//!
//! Recording happens before persistence, so a persistence error surfaces
//! only after the run has been closed.

use std::path::PathBuf;

use ndarray::ArrayView2;
use tracing::info;

use crate::config::TrainerConfig;
use crate::dataset::DatasetSplit;
use crate::engine::{FamilyFailure, ModelReport, ModelSelectionEngine};
use crate::experiment::{ExperimentRecord, ExperimentRecorder, RunRecord, TrackingBackend};
use crate::hyperparams::Hyperparameters;
use crate::metrics::RegressionMetrics;
use crate::persist::{persist, ModelArtifact};
use crate::registry::FamilyRegistry;
use crate::Result;

/// Outcome of a successful training invocation.
#[derive(Debug)]
pub struct TrainingSummary {
    best_name: String,
    metrics: RegressionMetrics,
    best_params: Hyperparameters,
    report: ModelReport,
    failures: Vec<FamilyFailure>,
    run: RunRecord,
    artifact: ModelArtifact,
    artifact_path: PathBuf,
    artifact_bytes: u64,
}

impl TrainingSummary {
    /// Winning held-out r2 (the pipeline's return value).
    #[must_use]
    pub const fn score(&self) -> f64 {
        self.metrics.r2
    }

    /// Winning family name.
    #[must_use]
    pub fn best_name(&self) -> &str {
        &self.best_name
    }

    /// Held-out metrics of the winner.
    #[must_use]
    pub const fn metrics(&self) -> &RegressionMetrics {
        &self.metrics
    }

    /// Winning grid combination.
    #[must_use]
    pub const fn best_params(&self) -> &Hyperparameters {
        &self.best_params
    }

    /// Every scored family, registry order.
    #[must_use]
    pub const fn report(&self) -> &ModelReport {
        &self.report
    }

    /// Families skipped under the `Skip` failure policy.
    #[must_use]
    pub fn failures(&self) -> &[FamilyFailure] {
        &self.failures
    }

    /// The closed experiment run.
    #[must_use]
    pub const fn run(&self) -> &RunRecord {
        &self.run
    }

    /// The persisted artifact.
    #[must_use]
    pub const fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Where the artifact was written.
    #[must_use]
    pub fn artifact_path(&self) -> &std::path::Path {
        &self.artifact_path
    }

    /// Size of the written artifact.
    #[must_use]
    pub const fn artifact_bytes(&self) -> u64 {
        self.artifact_bytes
    }
}

/// Select, record and persist the best model.
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: TrainerConfig,
    engine: ModelSelectionEngine,
}

impl ModelTrainer {
    /// Trainer for a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the search settings are invalid.
    pub fn new(config: TrainerConfig) -> Result<Self> {
        let engine = ModelSelectionEngine::from_config(config.threshold(), config.search())?;
        Ok(Self { config, engine })
    }

    /// Trainer configuration.
    #[must_use]
    pub const fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Experiment handle named after the configured experiment.
    #[must_use]
    pub fn experiment(&self) -> ExperimentRecord {
        ExperimentRecord::builder(self.config.experiment_name(), self.config.experiment_name())
            .config(serde_json::to_value(&self.config).unwrap_or_default())
            .build()
    }

    /// Run the pipeline on two matrices whose last column is the target.
    ///
    /// # Errors
    ///
    /// See [`ModelTrainer::train_split`]; additionally
    /// [`crate::Error::InvalidShape`] / [`crate::Error::InvalidData`] for
    /// malformed matrices.
    pub fn train<B: TrackingBackend + ?Sized>(
        &self,
        train: ArrayView2<'_, f64>,
        test: ArrayView2<'_, f64>,
        registry: &FamilyRegistry,
        backend: &mut B,
        experiment: &ExperimentRecord,
    ) -> Result<TrainingSummary> {
        info!("splitting training and test input data");
        let split = DatasetSplit::from_arrays(train, test)?;
        self.train_split(&split, registry, backend, experiment)
    }

    /// Run the pipeline on an existing split.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NoAcceptableModel`] (with no run opened and no
    /// file written) if no family meets the threshold, [`crate::Error::Fit`]
    /// under the `Abort` policy, [`crate::Error::Tracking`] after the run has
    /// been closed, and [`crate::Error::Persist`] after recording completed.
    pub fn train_split<B: TrackingBackend + ?Sized>(
        &self,
        split: &DatasetSplit,
        registry: &FamilyRegistry,
        backend: &mut B,
        experiment: &ExperimentRecord,
    ) -> Result<TrainingSummary> {
        let winner = self.engine.select(registry, split)?.into_result()?;
        info!(
            best = winner.name(),
            r2 = winner.score(),
            "best model found"
        );

        let candidate = winner.candidate;
        let artifact = ModelArtifact::from_estimator(
            candidate.name.clone(),
            candidate.model.as_ref(),
            candidate.test_score,
            split.n_features(),
        )?;

        let run_name = format!("{}{}", self.config.run_prefix(), candidate.name);
        let run = ExperimentRecorder::new(experiment).record(
            backend,
            &run_name,
            &artifact,
            &candidate.metrics,
            &winner.report,
        )?;

        let path = self.config.artifact_path().to_path_buf();
        let artifact_bytes = persist(&path, &artifact)?;

        Ok(TrainingSummary {
            best_name: candidate.name,
            metrics: candidate.metrics,
            best_params: candidate.best_params,
            report: winner.report,
            failures: winner.failures,
            run,
            artifact,
            artifact_path: path,
            artifact_bytes,
        })
    }
}
