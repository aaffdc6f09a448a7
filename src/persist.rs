//! Artifact persistence
//!
//! The winner is written as a self-describing JSON [`ModelArtifact`]; the
//! family name and `kind` let [`crate::FamilyRegistry::restore`] rebuild a
//! predicting estimator without knowing the concrete type up front.
//!
//! Writes go through a buffered file handle scoped to [`persist`], so the
//! handle is closed on every exit path. Parent directories are created as
//! needed and an existing file is overwritten.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::estimator::Estimator;
use crate::hyperparams::Hyperparameters;
use crate::{Error, Result};

/// Serialized winning model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    family: String,
    kind: String,
    hyperparameters: Hyperparameters,
    test_r2: f64,
    n_features: usize,
    created_at: DateTime<Utc>,
    state: serde_json::Value,
}

impl ModelArtifact {
    /// Snapshot a fitted estimator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the estimator state cannot be serialized.
    pub fn from_estimator(
        family: impl Into<String>,
        estimator: &dyn Estimator,
        test_r2: f64,
        n_features: usize,
    ) -> Result<Self> {
        Ok(Self {
            family: family.into(),
            kind: estimator.kind().to_string(),
            hyperparameters: estimator.hyperparameters(),
            test_r2,
            n_features,
            created_at: Utc::now(),
            state: estimator.state()?,
        })
    }

    /// Family name the artifact was selected from.
    #[must_use]
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Estimator type tag.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Full hyperparameter assignment of the fitted model.
    #[must_use]
    pub const fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    /// Held-out r2 at selection time.
    #[must_use]
    pub const fn test_r2(&self) -> f64 {
        self.test_r2
    }

    /// Feature count the model expects.
    #[must_use]
    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Learned state as produced by [`Estimator::state`].
    #[must_use]
    pub const fn state(&self) -> &serde_json::Value {
        &self.state
    }

    /// Pretty JSON encoding (the on-disk form).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// `sha256:<hex>` digest of some bytes.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}

/// Serialize `object` as JSON to `path`, replacing any existing file.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// Returns [`Error::Persist`] if the directory or file cannot be written and
/// [`Error::Json`] if serialization fails.
pub fn persist<T: Serialize + ?Sized>(path: impl AsRef<Path>, object: &T) -> Result<u64> {
    let path = path.as_ref();
    let bytes = serde_json::to_vec_pretty(object)?;
    let persist_err = |source| Error::Persist {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(persist_err)?;
    }
    let mut writer = BufWriter::new(File::create(path).map_err(persist_err)?);
    writer.write_all(&bytes).map_err(persist_err)?;
    writer.flush().map_err(persist_err)?;

    info!(path = %path.display(), bytes = bytes.len(), "persisted artifact");
    Ok(bytes.len() as u64)
}

/// Read a [`ModelArtifact`] written by [`persist`].
///
/// # Errors
///
/// Returns [`Error::Persist`] if the file cannot be read and [`Error::Json`]
/// if it is not an artifact.
pub fn load_artifact(path: impl AsRef<Path>) -> Result<ModelArtifact> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| Error::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}
