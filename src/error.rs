//! Error types for elegir
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Every variant maps to the pipeline [`Stage`] that produced it, so callers can
//! branch on "tune more" ([`Error::NoAcceptableModel`]) versus "something is
//! broken" (everything else) without inspecting message strings.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::Rejection;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Input arrays and registry validation, before any search.
    Validation,
    /// Per-family hyperparameter search and fitting.
    Search,
    /// Outer comparison and acceptance gate.
    Selection,
    /// Experiment-run logging.
    Recording,
    /// Artifact serialization and write.
    Persistence,
    /// Configuration loading or validation.
    Configuration,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Search => "search",
            Self::Selection => "selection",
            Self::Recording => "recording",
            Self::Persistence => "persistence",
            Self::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

/// elegir error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or empty train/test arrays
    #[error("Invalid dataset shape: {0}")]
    InvalidShape(String),

    /// Non-finite or otherwise unusable values
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Hyperparameter name or value rejected by an estimator
    #[error("Invalid hyperparameter `{name}`: {reason}")]
    InvalidHyperparameter {
        /// Parameter name
        name: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Two registry entries share a name
    #[error("Duplicate model family: {0}")]
    DuplicateFamily(String),

    /// Lookup of a family that is not registered
    #[error("Unknown model family: {0}")]
    UnknownFamily(String),

    /// `predict` called before `fit`
    #[error("Model is not fitted\nCall fit() before predict()")]
    NotFitted,

    /// Numerical breakdown inside an estimator (singular system, overflow)
    #[error("Numerical failure: {0}")]
    Numerical(String),

    /// A single family failed during search or refit
    #[error("Fitting failed for family `{family}`: {source}")]
    Fit {
        /// Family name from the registry
        family: String,
        /// Underlying estimator error
        #[source]
        source: Box<Error>,
    },

    /// Every candidate scored below the acceptance threshold
    #[error("No acceptable model found: {0}")]
    NoAcceptableModel(Rejection),

    /// Failure while writing to an experiment run
    #[error("Tracking error in run `{run_id}`: {message}")]
    Tracking {
        /// Run the failing call targeted
        run_id: String,
        /// Backend message
        message: String,
    },

    /// Failure writing the final artifact
    #[error("Failed to persist artifact to {}: {source}", path.display())]
    Persist {
        /// Destination path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an estimator error with the family it came from.
    #[must_use]
    pub fn fit(family: impl Into<String>, source: Self) -> Self {
        Self::Fit {
            family: family.into(),
            source: Box::new(source),
        }
    }

    /// Stage of the pipeline that produced this error.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::InvalidShape(_)
            | Self::InvalidData(_)
            | Self::DuplicateFamily(_)
            | Self::UnknownFamily(_) => Stage::Validation,
            Self::InvalidHyperparameter { .. }
            | Self::NotFitted
            | Self::Numerical(_)
            | Self::Fit { .. } => Stage::Search,
            Self::NoAcceptableModel(_) => Stage::Selection,
            Self::Tracking { .. } => Stage::Recording,
            Self::Persist { .. } | Self::Json(_) | Self::Io(_) => Stage::Persistence,
            Self::Config(_) => Stage::Configuration,
        }
    }

    /// Family name carried by a [`Error::Fit`], if any.
    #[must_use]
    pub fn family(&self) -> Option<&str> {
        match self {
            Self::Fit { family, .. } => Some(family),
            _ => None,
        }
    }
}
