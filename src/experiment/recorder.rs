//! Scoped run logging
//!
//! [`RunScope`] owns an open run for as long as it lives: it is closed
//! exactly once, with `Success` when the body finishes, `Failed` when a
//! logging call errors, and `Failed` on drop if nobody closed it.

use tracing::{info, warn};

use super::{ArtifactRecord, ExperimentRecord, RunRecord, RunStatus, TrackingBackend};
use crate::engine::ModelReport;
use crate::metrics::RegressionMetrics;
use crate::persist::ModelArtifact;
use crate::{Error, Result};

/// Per-family metric key: whitespace becomes `_`, suffixed with `_r2`.
///
/// ```rust
/// assert_eq!(elegir::experiment::metric_key("Random Forest"), "Random_Forest_r2");
/// ```
#[must_use]
pub fn metric_key(family: &str) -> String {
    let mut key: String = family
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    key.push_str("_r2");
    key
}

/// Guard over one open run.
pub struct RunScope<'b, B: TrackingBackend + ?Sized> {
    backend: &'b mut B,
    run_id: String,
    closed: bool,
}

impl<B: TrackingBackend + ?Sized> std::fmt::Debug for RunScope<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunScope")
            .field("run_id", &self.run_id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<'b, B: TrackingBackend + ?Sized> RunScope<'b, B> {
    /// Start a run and take responsibility for closing it.
    ///
    /// # Errors
    ///
    /// Propagates the backend's `start_run` error; nothing is left open then.
    pub fn open(backend: &'b mut B, experiment: &ExperimentRecord, run_name: &str) -> Result<Self> {
        let run_id = backend.start_run(experiment, run_name)?;
        Ok(Self {
            backend,
            run_id,
            closed: false,
        })
    }

    /// ID of the open run.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Log a string parameter.
    ///
    /// # Errors
    ///
    /// Propagates the backend error.
    pub fn log_param(&mut self, key: &str, value: &str) -> Result<()> {
        self.backend.log_param(&self.run_id, key, value)
    }

    /// Log a numeric metric.
    ///
    /// # Errors
    ///
    /// Propagates the backend error.
    pub fn log_metric(&mut self, key: &str, value: f64) -> Result<()> {
        self.backend.log_metric(&self.run_id, key, value)
    }

    /// Store artifact bytes.
    ///
    /// # Errors
    ///
    /// Propagates the backend error.
    pub fn log_artifact(&mut self, key: &str, bytes: &[u8]) -> Result<ArtifactRecord> {
        self.backend.log_artifact(&self.run_id, key, bytes)
    }

    /// Close the run as `Success`.
    ///
    /// # Errors
    ///
    /// Returns the backend's `end_run` error; the run is then closed as
    /// `Failed` if the backend allows it.
    pub fn finish(mut self) -> Result<RunRecord> {
        self.close(RunStatus::Success)
    }

    /// Close the run as `Failed`.
    ///
    /// # Errors
    ///
    /// Returns the backend's `end_run` error.
    pub fn fail(mut self) -> Result<RunRecord> {
        self.close(RunStatus::Failed)
    }

    /// Run `body` inside the scope and close according to its outcome.
    ///
    /// A body error wins over a close error: the close error is logged and
    /// the body's error is returned.
    ///
    /// # Errors
    ///
    /// Returns the body's error, or the close error after a successful body.
    pub fn execute<T>(
        mut self,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<(T, RunRecord)> {
        match body(&mut self) {
            Ok(value) => {
                let record = self.close(RunStatus::Success)?;
                Ok((value, record))
            }
            Err(error) => {
                if let Err(close_error) = self.close(RunStatus::Failed) {
                    warn!(run_id = %self.run_id, error = %close_error, "failed to close run");
                }
                Err(error)
            }
        }
    }

    fn close(&mut self, status: RunStatus) -> Result<RunRecord> {
        self.closed = true;
        if let Err(error) = self.backend.end_run(&self.run_id, status) {
            if status != RunStatus::Failed {
                if let Err(fallback) = self.backend.end_run(&self.run_id, RunStatus::Failed) {
                    warn!(run_id = %self.run_id, error = %fallback, "failed to close run as failed");
                }
            }
            return Err(error);
        }
        self.backend.run(&self.run_id).ok_or_else(|| Error::Tracking {
            run_id: self.run_id.clone(),
            message: "run vanished after close".to_string(),
        })
    }
}

impl<B: TrackingBackend + ?Sized> Drop for RunScope<'_, B> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(error) = self.backend.end_run(&self.run_id, RunStatus::Failed) {
                warn!(run_id = %self.run_id, error = %error, "failed to close abandoned run");
            }
        }
    }
}

/// Logs a selection outcome to an explicit experiment.
#[derive(Debug, Clone, Copy)]
pub struct ExperimentRecorder<'e> {
    experiment: &'e ExperimentRecord,
}

impl<'e> ExperimentRecorder<'e> {
    /// Recorder bound to `experiment`.
    #[must_use]
    pub const fn new(experiment: &'e ExperimentRecord) -> Self {
        Self { experiment }
    }

    /// Experiment every run is filed under.
    #[must_use]
    pub const fn experiment(&self) -> &'e ExperimentRecord {
        self.experiment
    }

    /// Record one run for the winning model.
    ///
    /// Logs params `model_name` and `best_params`, metrics `r2_score`, `mae`,
    /// `mse`, `rmse`, artifact `model`, and one [`metric_key`] metric per
    /// report entry. The run is closed on every path.
    ///
    /// # Errors
    ///
    /// Returns the first tracking error after the run has been closed as
    /// `Failed`. An artifact that cannot be encoded is also reported as a
    /// tracking error, before any run is opened.
    pub fn record<B: TrackingBackend + ?Sized>(
        &self,
        backend: &mut B,
        run_name: &str,
        artifact: &ModelArtifact,
        metrics: &RegressionMetrics,
        report: &ModelReport,
    ) -> Result<RunRecord> {
        let bytes = artifact
            .to_json_bytes()
            .map_err(|e| encode_failure(run_name, &e))?;
        let scope = RunScope::open(backend, self.experiment, run_name)?;

        let ((), run) = scope.execute(|run| {
            run.log_param("model_name", artifact.family())?;
            run.log_param("best_params", &artifact.hyperparameters().to_string())?;

            run.log_metric("r2_score", metrics.r2)?;
            run.log_metric("mae", metrics.mae)?;
            run.log_metric("mse", metrics.mse)?;
            run.log_metric("rmse", metrics.rmse)?;

            run.log_artifact("model", &bytes)?;

            for entry in report.iter() {
                run.log_metric(&metric_key(&entry.name), entry.score)?;
            }
            Ok(())
        })?;

        info!(
            run_id = run.run_id(),
            run_name,
            families = report.len(),
            "recorded experiment run"
        );
        Ok(run)
    }
}

fn encode_failure(run_name: &str, error: &Error) -> Error {
    Error::Tracking {
        run_id: run_name.to_string(),
        message: format!("cannot encode artifact: {error}"),
    }
}
