//! Experiment Store - in-memory tracking backend
//!
//! Holds experiments, runs and everything logged to them, answers per-run
//! queries, and saves/loads JSON snapshots so an external viewer can inspect
//! past runs. Artifact bytes are kept in a content-addressed blob map that is
//! not part of the snapshot (the artifact itself lives at its persisted path).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    ArtifactRecord, ExperimentRecord, MetricRecord, ParamRecord, RunRecord, RunStatus,
    TrackingBackend,
};
use crate::persist::persist;
use crate::{Error, Result};

/// In-memory store for experiment tracking data.
///
/// Run IDs are sequential per store (`run-000001`, `run-000002`, ...), so a
/// snapshot lists runs in creation order.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExperimentStore {
    experiments: BTreeMap<String, ExperimentRecord>,
    runs: BTreeMap<String, RunRecord>,
    params: Vec<ParamRecord>,
    metrics: Vec<MetricRecord>,
    artifacts: Vec<ArtifactRecord>,
    #[serde(skip)]
    blobs: HashMap<String, Vec<u8>>,
    next_run: u64,
}

impl ExperimentStore {
    /// Create a new empty experiment store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the store is empty (no experiments, runs, or logged values).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
            && self.runs.is_empty()
            && self.params.is_empty()
            && self.metrics.is_empty()
            && self.artifacts.is_empty()
    }

    /// Get the number of experiments in the store.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Get the number of runs in the store.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Get the number of metrics in the store.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Get the number of artifacts in the store.
    #[must_use]
    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }

    /// Add an experiment to the store (replacing one with the same ID).
    pub fn add_experiment(&mut self, experiment: ExperimentRecord) {
        self.experiments
            .insert(experiment.experiment_id().to_string(), experiment);
    }

    /// Get an experiment by ID.
    #[must_use]
    pub fn get_experiment(&self, experiment_id: &str) -> Option<&ExperimentRecord> {
        self.experiments.get(experiment_id)
    }

    /// Get a run by ID.
    #[must_use]
    pub fn get_run(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    /// Get all runs for an experiment, in creation order.
    #[must_use]
    pub fn get_runs_for_experiment(&self, experiment_id: &str) -> Vec<&RunRecord> {
        self.runs
            .values()
            .filter(|run| run.experiment_id() == experiment_id)
            .collect()
    }

    /// Get metrics for a specific run and key, ordered by step.
    #[must_use]
    pub fn get_metrics_for_run(&self, run_id: &str, key: &str) -> Vec<MetricRecord> {
        let mut metrics: Vec<MetricRecord> = self
            .metrics
            .iter()
            .filter(|m| m.run_id() == run_id && m.key() == key)
            .cloned()
            .collect();
        metrics.sort_by_key(MetricRecord::step);
        metrics
    }

    /// Latest value of one metric.
    #[must_use]
    pub fn metric(&self, run_id: &str, key: &str) -> Option<f64> {
        self.get_metrics_for_run(run_id, key)
            .last()
            .map(MetricRecord::value)
    }

    /// Every metric of a run, in logging order.
    #[must_use]
    pub fn metrics_for_run(&self, run_id: &str) -> Vec<&MetricRecord> {
        self.metrics.iter().filter(|m| m.run_id() == run_id).collect()
    }

    /// Value of one parameter.
    #[must_use]
    pub fn param(&self, run_id: &str, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.run_id() == run_id && p.key() == key)
            .map(ParamRecord::value)
    }

    /// Every parameter of a run, in logging order.
    #[must_use]
    pub fn params_for_run(&self, run_id: &str) -> Vec<&ParamRecord> {
        self.params.iter().filter(|p| p.run_id() == run_id).collect()
    }

    /// Every artifact of a run, in logging order.
    #[must_use]
    pub fn artifacts_for_run(&self, run_id: &str) -> Vec<&ArtifactRecord> {
        self.artifacts.iter().filter(|a| a.run_id() == run_id).collect()
    }

    /// Artifact bytes by content hash (only for artifacts logged in this process).
    #[must_use]
    pub fn blob(&self, cas_hash: &str) -> Option<&[u8]> {
        self.blobs.get(cas_hash).map(Vec::as_slice)
    }

    /// Write a JSON snapshot of everything except artifact bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persist`] if the file cannot be written.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<u64> {
        persist(path, self)
    }

    /// Load a snapshot written by [`ExperimentStore::save_json`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persist`] if the file cannot be read and
    /// [`Error::Json`] if it is not a snapshot.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| Error::Persist {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn running(&self, run_id: &str) -> Result<()> {
        match self.runs.get(run_id).map(RunRecord::status) {
            Some(RunStatus::Running) => Ok(()),
            Some(status) => Err(tracking(run_id, format!("run is not open (status {status:?})"))),
            None => Err(tracking(run_id, "unknown run")),
        }
    }
}

fn tracking(run_id: &str, message: impl Into<String>) -> Error {
    Error::Tracking {
        run_id: run_id.to_string(),
        message: message.into(),
    }
}

impl TrackingBackend for ExperimentStore {
    fn start_run(&mut self, experiment: &ExperimentRecord, run_name: &str) -> Result<String> {
        if self.get_experiment(experiment.experiment_id()).is_none() {
            self.add_experiment(experiment.clone());
        }
        self.next_run += 1;
        let run_id = format!("run-{:06}", self.next_run);

        let mut run = RunRecord::new(run_id.clone(), experiment.experiment_id(), run_name);
        run.start();
        self.runs.insert(run_id.clone(), run);

        info!(run_id = %run_id, run_name, experiment = experiment.name(), "started run");
        Ok(run_id)
    }

    fn log_param(&mut self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.running(run_id)?;
        if self.param(run_id, key).is_some() {
            return Err(tracking(run_id, format!("param `{key}` already logged")));
        }
        self.params.push(ParamRecord::new(run_id, key, value));
        Ok(())
    }

    fn log_metric(&mut self, run_id: &str, key: &str, value: f64) -> Result<()> {
        self.running(run_id)?;
        let step = self
            .metrics
            .iter()
            .filter(|m| m.run_id() == run_id && m.key() == key)
            .count() as u64;
        debug!(run_id, key, value, step, "logged metric");
        self.metrics.push(MetricRecord::new(run_id, key, step, value));
        Ok(())
    }

    fn log_artifact(&mut self, run_id: &str, key: &str, bytes: &[u8]) -> Result<ArtifactRecord> {
        self.running(run_id)?;
        let record = ArtifactRecord::from_bytes(run_id, key, bytes);
        self.blobs
            .entry(record.cas_hash().to_string())
            .or_insert_with(|| bytes.to_vec());
        self.artifacts.push(record.clone());
        Ok(record)
    }

    fn end_run(&mut self, run_id: &str, status: RunStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(tracking(run_id, format!("{status:?} is not a closing status")));
        }
        self.running(run_id)?;
        if let Some(run) = self.runs.get_mut(run_id) {
            run.complete(status);
        }
        info!(run_id, ?status, "closed run");
        Ok(())
    }

    fn run(&self, run_id: &str) -> Option<RunRecord> {
        self.get_run(run_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(store: &mut ExperimentStore) -> String {
        let experiment = ExperimentRecord::new("exp-1", "model_selection");
        store.start_run(&experiment, "Best_Model_OLS").unwrap()
    }

    #[test]
    fn test_store_default() {
        let store = ExperimentStore::new();
        assert!(store.is_empty());
        assert_eq!(store.experiment_count(), 0);
        assert_eq!(store.run_count(), 0);
        assert_eq!(store.metric_count(), 0);
    }

    #[test]
    fn test_sequential_run_ids() {
        let mut store = ExperimentStore::new();
        assert_eq!(open(&mut store), "run-000001");
        assert_eq!(open(&mut store), "run-000002");
        assert_eq!(store.experiment_count(), 1);
        assert_eq!(store.get_runs_for_experiment("exp-1").len(), 2);
    }

    #[test]
    fn test_metric_steps_increment_per_key() {
        let mut store = ExperimentStore::new();
        let run = open(&mut store);
        store.log_metric(&run, "loss", 0.2).unwrap();
        store.log_metric(&run, "loss", 0.1).unwrap();
        store.log_metric(&run, "r2_score", 0.9).unwrap();

        let loss = store.get_metrics_for_run(&run, "loss");
        assert_eq!(loss.iter().map(MetricRecord::step).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(store.metric(&run, "loss"), Some(0.1));
        assert_eq!(store.metrics_for_run(&run).len(), 3);
    }

    #[test]
    fn test_closed_run_rejects_logging() {
        let mut store = ExperimentStore::new();
        let run = open(&mut store);
        store.end_run(&run, RunStatus::Success).unwrap();

        let err = store.log_metric(&run, "r2_score", 0.9).unwrap_err();
        assert!(matches!(err, Error::Tracking { .. }));
        assert!(store.end_run(&run, RunStatus::Failed).is_err());
        assert!(store.log_param("run-999999", "k", "v").is_err());
    }

    #[test]
    fn test_params_are_write_once() {
        let mut store = ExperimentStore::new();
        let run = open(&mut store);
        store.log_param(&run, "model_name", "OLS").unwrap();
        assert!(store.log_param(&run, "model_name", "Tree").is_err());
        assert_eq!(store.param(&run, "model_name"), Some("OLS"));
    }

    #[test]
    fn test_artifact_blob_addressed_by_hash() {
        let mut store = ExperimentStore::new();
        let run = open(&mut store);
        let record = store.log_artifact(&run, "model", b"weights").unwrap();
        assert_eq!(store.blob(record.cas_hash()), Some(&b"weights"[..]));
        assert_eq!(store.artifacts_for_run(&run).len(), 1);
    }

    #[test]
    fn test_end_run_requires_terminal_status() {
        let mut store = ExperimentStore::new();
        let run = open(&mut store);
        assert!(store.end_run(&run, RunStatus::Running).is_err());
        assert_eq!(store.run(&run).map(|r| r.status()), Some(RunStatus::Running));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");
        let mut store = ExperimentStore::new();
        let run = open(&mut store);
        store.log_param(&run, "model_name", "OLS").unwrap();
        store.log_metric(&run, "Decision_Tree_r2", f64::NAN).unwrap();
        store.end_run(&run, RunStatus::Success).unwrap();
        store.save_json(&path).unwrap();

        let mut loaded = ExperimentStore::load_json(&path).unwrap();
        assert_eq!(loaded.get_run(&run), store.get_run(&run));
        assert_eq!(loaded.param(&run, "model_name"), Some("OLS"));
        assert!(loaded.metric(&run, "Decision_Tree_r2").is_some_and(f64::is_nan));
        // Counter survives, so new runs do not reuse IDs
        assert_eq!(open(&mut loaded), "run-000002");
    }
}
