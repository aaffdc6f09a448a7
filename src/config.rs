//! Trainer and search configuration
//!
//! Every field has a default, so a JSON config only needs the keys it
//! overrides:
//!
//! ```json
//! { "threshold": 0.75, "search": { "cv_folds": 5, "failure_policy": "skip" } }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::{FailurePolicy, DEFAULT_THRESHOLD};
use crate::search::DEFAULT_CV_FOLDS;
use crate::{Error, Result};

/// Inner search and outer fan-out settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    cv_folds: usize,
    failure_policy: FailurePolicy,
    parallel: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cv_folds: DEFAULT_CV_FOLDS,
            failure_policy: FailurePolicy::Abort,
            parallel: false,
        }
    }
}

impl SearchConfig {
    /// Number of cross-validation folds.
    #[must_use]
    pub const fn cv_folds(&self) -> usize {
        self.cv_folds
    }

    /// What to do when one family fails.
    #[must_use]
    pub const fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Whether families are searched concurrently.
    #[must_use]
    pub const fn parallel(&self) -> bool {
        self.parallel
    }

    /// Set the fold count.
    #[must_use]
    pub const fn with_cv_folds(mut self, cv_folds: usize) -> Self {
        self.cv_folds = cv_folds;
        self
    }

    /// Set the failure policy.
    #[must_use]
    pub const fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Enable or disable concurrent family search.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.cv_folds < 2 {
            return Err(Error::Config(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        Ok(())
    }
}

/// End-to-end trainer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainerConfig {
    threshold: f64,
    artifact_path: PathBuf,
    experiment_name: String,
    run_prefix: String,
    search: SearchConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            artifact_path: PathBuf::from("artifacts").join("model.json"),
            experiment_name: "model_selection".to_string(),
            run_prefix: "Best_Model_".to_string(),
            search: SearchConfig::default(),
        }
    }
}

impl TrainerConfig {
    /// Create a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> TrainerConfigBuilder {
        TrainerConfigBuilder::default()
    }

    /// Load and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read, does not parse,
    /// or holds an out-of-range value.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&text).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Parse and validate a JSON config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed input or an out-of-range value.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| Error::Config(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Minimum held-out r2 for a winner to be accepted.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Destination of the persisted winner.
    #[must_use]
    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Experiment name used when the caller does not supply a handle.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// Prefix of the tracked run name (followed by the winning family).
    #[must_use]
    pub fn run_prefix(&self) -> &str {
        &self.run_prefix
    }

    /// Search settings.
    #[must_use]
    pub const fn search(&self) -> &SearchConfig {
        &self.search
    }

    fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() {
            return Err(Error::Config(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        if self.artifact_path.as_os_str().is_empty() {
            return Err(Error::Config("artifact_path must not be empty".to_string()));
        }
        if self.experiment_name.trim().is_empty() {
            return Err(Error::Config("experiment_name must not be empty".to_string()));
        }
        self.search.validate()
    }
}

/// Builder for `TrainerConfig`.
#[derive(Debug, Default)]
pub struct TrainerConfigBuilder {
    config: TrainerConfig,
}

impl TrainerConfigBuilder {
    /// Set the acceptance threshold.
    #[must_use]
    pub const fn threshold(mut self, threshold: f64) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Set the artifact destination.
    #[must_use]
    pub fn artifact_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.artifact_path = path.into();
        self
    }

    /// Set the experiment name.
    #[must_use]
    pub fn experiment_name(mut self, name: impl Into<String>) -> Self {
        self.config.experiment_name = name.into();
        self
    }

    /// Set the run name prefix.
    #[must_use]
    pub fn run_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.run_prefix = prefix.into();
        self
    }

    /// Set the search settings.
    #[must_use]
    pub const fn search(mut self, search: SearchConfig) -> Self {
        self.config.search = search;
        self
    }

    /// Validate and build the `TrainerConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the threshold is not finite, a name or
    /// path is empty, or `cv_folds < 2`.
    pub fn build(self) -> Result<TrainerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
