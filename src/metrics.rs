//! Regression metrics (held-out scoring)
//!
//! Pure functions of `(y_true, y_pred)`. The coefficient of determination is
//! reported as-is even when it is degenerate: a constant `y_true` makes the
//! denominator zero, and the resulting NaN or infinity is propagated rather
//! than raised, so the caller sees exactly what the formula yields.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Held-out metrics for one set of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Coefficient of determination (1.0 is perfect, may be negative or NaN)
    pub r2: f64,
    /// Mean absolute error
    pub mae: f64,
    /// Mean squared error
    pub mse: f64,
    /// Root mean squared error
    pub rmse: f64,
}

impl RegressionMetrics {
    /// Compute all four metrics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if the vectors are empty or differ in length.
    pub fn compute(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> Result<Self> {
        check_lengths(y_true, y_pred)?;
        let mse = mean_squared_error(y_true, y_pred);
        Ok(Self {
            r2: r2_unchecked(y_true, y_pred),
            mae: mean_absolute_error(y_true, y_pred),
            mse,
            rmse: mse.sqrt(),
        })
    }
}

/// Compute `{r2, mae, mse, rmse}` for predictions against ground truth.
///
/// # Errors
///
/// Returns [`Error::InvalidShape`] if the vectors are empty or differ in length.
pub fn score(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> Result<RegressionMetrics> {
    RegressionMetrics::compute(y_true, y_pred)
}

/// Coefficient of determination alone (used for cross-validation folds).
///
/// # Errors
///
/// Returns [`Error::InvalidShape`] if the vectors are empty or differ in length.
pub fn r2_score(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    Ok(r2_unchecked(y_true, y_pred))
}

fn check_lengths(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> Result<()> {
    if y_true.is_empty() {
        return Err(Error::InvalidShape("cannot score an empty target vector".to_string()));
    }
    if y_true.len() != y_pred.len() {
        return Err(Error::InvalidShape(format!(
            "y_true has {} values, y_pred has {}",
            y_true.len(),
            y_pred.len()
        )));
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn r2_unchecked(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
    let mean = y_true.sum() / y_true.len() as f64;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    // Zero variance: 0/0 = NaN for a perfect fit, -inf otherwise
    1.0 - ss_res / ss_tot
}

#[allow(clippy::cast_precision_loss)]
fn mean_absolute_error(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / y_true.len() as f64
}

#[allow(clippy::cast_precision_loss)]
fn mean_squared_error(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y_true.len() as f64
}
