//! # Elegir: Two-Level Model Selection Engine
//!
//! **Version**: 0.1.0
//!
//! Elegir picks, tunes and persists the best regression model for a tabular
//! task. Every registered model family is grid-searched with K-fold
//! cross-validation on the training set (inner level), refit, and scored on
//! held-out data; the families are then compared (outer level) and the winner
//! is accepted only if it clears an absolute r2 threshold.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: A winner below the acceptance threshold is rejected, never
//!   deployed "because it beat the others"
//! - **Poka-Yoke**: Grids are checked against their estimator at
//!   registration, malformed data is rejected before any search
//! - **Genchi Genbutsu**: Every family's score is recorded, not only the
//!   winner's, so the comparison can be audited later
//! - **Heijunka**: Seeded estimators and order-preserving fan-out make
//!   repeated runs produce the same winner
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use elegir::experiment::ExperimentStore;
//! use elegir::{FamilyRegistry, ModelTrainer, TrainerConfig};
//! use ndarray::Array2;
//!
//! # fn main() -> elegir::Result<()> {
//! // Last column is the target
//! let train = Array2::<f64>::zeros((100, 8));
//! let test = Array2::<f64>::zeros((20, 8));
//!
//! let trainer = ModelTrainer::new(TrainerConfig::builder().build()?)?;
//! let registry = FamilyRegistry::default_regressors()?;
//! let experiment = trainer.experiment();
//! let mut store = ExperimentStore::new();
//!
//! let summary = trainer.train(train.view(), test.view(), &registry, &mut store, &experiment)?;
//! println!("{}: r2 = {:.4}", summary.best_name(), summary.score());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod experiment;
pub mod hyperparams;
pub mod metrics;
pub mod persist;
pub mod registry;
pub mod search;
pub mod trainer;

pub use config::{SearchConfig, TrainerConfig};
pub use dataset::DatasetSplit;
pub use engine::{FailurePolicy, ModelReport, ModelSelectionEngine, Rejection, Selection, Winner};
pub use error::{Error, Result, Stage};
pub use estimator::Estimator;
pub use hyperparams::{Hyperparameters, ParamGrid, ParamValue};
pub use metrics::RegressionMetrics;
pub use persist::ModelArtifact;
pub use registry::{FamilyRegistry, ModelFamily};
pub use search::{CandidateResult, GridSearch};
pub use trainer::{ModelTrainer, TrainingSummary};
