//! Estimator capability and built-in regression families
//!
//! Any model the selection engine compares implements [`Estimator`]. The trait
//! is object-safe so a registry can hold heterogeneous families behind
//! `Box<dyn Estimator>`; learned state round-trips through JSON so the winner
//! can be persisted and restored without knowing its concrete type.
//!
//! ## Built-in families
//!
//! ```text
//! LinearRegression            OLS via normal equations
//! DecisionTreeRegressor       CART, four split criteria
//! RandomForestRegressor       bagged CART
//! GradientBoostingRegressor   least-squares boosting
//! RegularizedBoostingRegressor second-order boosting, L2 leaf penalty
//! AdaBoostRegressor           AdaBoost.R2
//! ObliviousBoostingRegressor  symmetric trees (feature `oblivious`)
//! ```

mod adaboost;
mod boosting;
mod forest;
mod linear;
#[cfg(feature = "oblivious")]
mod oblivious;
mod regularized;
mod tree;

pub use adaboost::AdaBoostRegressor;
pub use boosting::GradientBoostingRegressor;
pub use forest::RandomForestRegressor;
pub use linear::LinearRegression;
#[cfg(feature = "oblivious")]
pub use oblivious::ObliviousBoostingRegressor;
pub use regularized::RegularizedBoostingRegressor;
pub use tree::{Criterion, DecisionTreeRegressor};

use std::fmt::Debug;

use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::hyperparams::Hyperparameters;
use crate::{Error, Result};

/// Capability every model family must provide.
///
/// `fit` may be called repeatedly; each call discards previously learned state.
pub trait Estimator: Debug + Send + Sync {
    /// Stable type tag (e.g. `"linear_regression"`), recorded in artifacts.
    fn kind(&self) -> &'static str;

    /// Learn parameters from training data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is malformed for this estimator or the
    /// configured hyperparameters are infeasible for it.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()>;

    /// Predict one target value per row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFitted`] before `fit`, or [`Error::InvalidShape`]
    /// if the column count differs from training.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>>;

    /// Full current hyperparameter assignment.
    fn hyperparameters(&self) -> Hyperparameters;

    /// Apply a (possibly partial) assignment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHyperparameter`] for unknown names or invalid
    /// values; the estimator is left unchanged in that case.
    fn set_hyperparameters(&mut self, params: &Hyperparameters) -> Result<()>;

    /// JSON snapshot of hyperparameters and learned state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    fn state(&self) -> Result<serde_json::Value>;

    /// Replace this estimator with a snapshot produced by [`Estimator::state`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the snapshot does not describe this kind.
    fn restore(&mut self, state: serde_json::Value) -> Result<()>;
}

/// Check that training inputs agree in length and are non-empty.
pub(crate) fn check_fit_input(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(Error::InvalidShape(format!(
            "cannot fit on an empty {}x{} matrix",
            x.nrows(),
            x.ncols()
        )));
    }
    if x.nrows() != y.len() {
        return Err(Error::InvalidShape(format!(
            "{} rows but {} targets",
            x.nrows(),
            y.len()
        )));
    }
    Ok(())
}

/// Check that prediction input has the trained column count.
pub(crate) fn check_predict_input(x: ArrayView2<'_, f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(Error::InvalidShape(format!(
            "model was fitted on {n_features} features, got {}",
            x.ncols()
        )));
    }
    Ok(())
}
