//! Experiment tracking
//!
//! Records the trail of each training invocation: which family won, with
//! which hyperparameters, how every family scored, and the fitted artifact.
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< RunRecord (N)
//!                              │
//!                              ├──< ParamRecord (N)    [write-once keys]
//!                              ├──< MetricRecord (N)   [step per key]
//!                              └──< ArtifactRecord (N) [CAS, sha256]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use elegir::experiment::{ExperimentRecord, ExperimentStore, RunScope};
//!
//! # fn main() -> elegir::Result<()> {
//! let experiment = ExperimentRecord::new("exp-001", "model_selection");
//! let mut store = ExperimentStore::new();
//!
//! let mut run = RunScope::open(&mut store, &experiment, "Best_Model_Linear Regression")?;
//! run.log_metric("r2_score", 0.93)?;
//! let run_id = run.run_id().to_string();
//! run.finish()?;
//!
//! assert_eq!(store.metric(&run_id, "r2_score"), Some(0.93));
//! # Ok(())
//! # }
//! ```

mod artifact_record;
mod experiment_record;
mod metric_record;
mod param_record;
mod recorder;
mod run_record;
mod store;

pub use artifact_record::ArtifactRecord;
pub use experiment_record::{ExperimentRecord, ExperimentRecordBuilder};
pub use metric_record::MetricRecord;
pub use param_record::ParamRecord;
pub use recorder::{metric_key, ExperimentRecorder, RunScope};
pub use run_record::{RunRecord, RunStatus};
pub use store::ExperimentStore;

use crate::Result;

/// Sink for experiment runs.
///
/// Every logging call targets an open run; implementations reject calls on a
/// closed or unknown run with [`crate::Error::Tracking`].
pub trait TrackingBackend {
    /// Open a new run under `experiment` and return its ID.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Tracking`] if the backend cannot create the run.
    fn start_run(&mut self, experiment: &ExperimentRecord, run_name: &str) -> Result<String>;

    /// Log a string parameter.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Tracking`] if the run is not open.
    fn log_param(&mut self, run_id: &str, key: &str, value: &str) -> Result<()>;

    /// Log a numeric metric.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Tracking`] if the run is not open.
    fn log_metric(&mut self, run_id: &str, key: &str, value: f64) -> Result<()>;

    /// Store artifact bytes under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Tracking`] if the run is not open.
    fn log_artifact(&mut self, run_id: &str, key: &str, bytes: &[u8]) -> Result<ArtifactRecord>;

    /// Close the run with a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Tracking`] if the run is not open or the status
    /// is not terminal.
    fn end_run(&mut self, run_id: &str, status: RunStatus) -> Result<()>;

    /// Snapshot of a run, if it exists.
    fn run(&self, run_id: &str) -> Option<RunRecord>;
}
