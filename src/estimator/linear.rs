//! Ordinary least squares

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{check_fit_input, check_predict_input, Estimator};
use crate::hyperparams::{extract, Hyperparameters};
use crate::{Error, Result};

/// Linear regression fitted through the normal equations.
///
/// Solves `(XᵀX) w = Xᵀy` on centred data with a Cholesky factorisation. A
/// rank-deficient Gram matrix (constant or duplicated columns) is retried once
/// with a tiny ridge term before giving up with [`Error::Numerical`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    fit_intercept: bool,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    /// Create an unfitted model with an intercept term.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fit_intercept: true,
            coefficients: None,
            intercept: 0.0,
        }
    }

    /// Fitted weights, if any.
    #[must_use]
    pub const fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    /// Fitted intercept (0.0 when disabled or unfitted).
    #[must_use]
    pub const fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Estimator for LinearRegression {
    fn kind(&self) -> &'static str {
        "linear_regression"
    }

    #[allow(clippy::cast_precision_loss)]
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;

        let (x_mean, y_mean) = if self.fit_intercept {
            let n = x.nrows() as f64;
            (x.sum_axis(Axis(0)) / n, y.sum() / n)
        } else {
            (Array1::zeros(x.ncols()), 0.0)
        };

        let xc = &x - &x_mean;
        let yc = &y - y_mean;
        let gram = xc.t().dot(&xc);
        let moment = xc.t().dot(&yc);

        let weights = solve_normal_equations(&gram, &moment).ok_or_else(|| {
            Error::Numerical("normal equations are singular even with ridge damping".to_string())
        })?;

        self.intercept = if self.fit_intercept {
            y_mean - x_mean.dot(&weights)
        } else {
            0.0
        };
        self.coefficients = Some(weights);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let weights = self.coefficients.as_ref().ok_or(Error::NotFitted)?;
        check_predict_input(x, weights.len())?;
        Ok(x.dot(weights) + self.intercept)
    }

    fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::new().with("fit_intercept", self.fit_intercept)
    }

    fn set_hyperparameters(&mut self, params: &Hyperparameters) -> Result<()> {
        let mut fit_intercept = self.fit_intercept;
        for (name, value) in params.iter() {
            match name {
                "fit_intercept" => fit_intercept = extract::boolean(name, value)?,
                other => return Err(extract::unknown(other)),
            }
        }
        self.fit_intercept = fit_intercept;
        Ok(())
    }

    fn state(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn restore(&mut self, state: serde_json::Value) -> Result<()> {
        *self = serde_json::from_value(state)?;
        Ok(())
    }
}

/// Cholesky solve, retried once with a ridge proportional to the mean diagonal.
#[allow(clippy::cast_precision_loss)]
fn solve_normal_equations(gram: &Array2<f64>, moment: &Array1<f64>) -> Option<Array1<f64>> {
    if let Some(w) = cholesky_solve(gram, moment) {
        return Some(w);
    }

    let n = gram.nrows();
    let mean_diag = gram.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
    let ridge = (1e-8 * mean_diag).max(1e-12);
    let mut damped = gram.clone();
    for i in 0..n {
        damped[[i, i]] += ridge;
    }
    cholesky_solve(&damped, moment)
}

fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L y = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * z[j]).sum();
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: Lᵀ x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (z[i] - sum) / l[[i, i]];
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_recovers_exact_linear_relation() {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 5.0], [4.0, 3.0], [5.0, 7.0]];
        let y = x.column(0).mapv(|v| 2.0 * v) + x.column(1).mapv(|v| -3.0 * v) + 4.0;

        let mut model = LinearRegression::new();
        model.fit(x.view(), y.view()).unwrap();

        let w = model.coefficients().unwrap();
        assert!((w[0] - 2.0).abs() < 1e-8);
        assert!((w[1] + 3.0).abs() < 1e-8);
        assert!((model.intercept() - 4.0).abs() < 1e-8);
    }

    #[test]
    fn test_constant_column_uses_ridge_fallback() {
        let x = array![[1.0, 7.0], [2.0, 7.0], [3.0, 7.0], [4.0, 7.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];

        let mut model = LinearRegression::new();
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(x.view()).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-6);
        }
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LinearRegression::new();
        let x = array![[1.0]];
        assert!(matches!(model.predict(x.view()), Err(Error::NotFitted)));
    }

    #[test]
    fn test_unknown_hyperparameter() {
        let mut model = LinearRegression::new();
        let params = Hyperparameters::new().with("alpha", 1.0);
        assert!(model.set_hyperparameters(&params).is_err());
        assert_eq!(model.hyperparameters().get("fit_intercept").and_then(|v| v.as_bool()), Some(true));
    }
}
