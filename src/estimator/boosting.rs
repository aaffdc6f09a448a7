//! Least-squares gradient boosting

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::tree::{Criterion, RegressionTree, TreeParams};
use super::{check_fit_input, check_predict_input, Estimator};
use crate::hyperparams::{extract, Hyperparameters};
use crate::{Error, Result};

/// Gradient boosting with squared loss.
///
/// Starts from the target mean and fits each stage to the current residuals
/// on a row subsample (stochastic gradient boosting when `subsample < 1`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    n_estimators: usize,
    learning_rate: f64,
    subsample: f64,
    max_depth: usize,
    random_state: u64,
    initial_prediction: f64,
    trees: Vec<RegressionTree>,
}

impl Default for GradientBoostingRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl GradientBoostingRegressor {
    /// 100 depth-3 stages at learning rate 0.1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            subsample: 1.0,
            max_depth: 3,
            random_state: 42,
            initial_prediction: 0.0,
            trees: Vec::new(),
        }
    }

    /// Number of fitted stages.
    #[must_use]
    pub fn n_stages(&self) -> usize {
        self.trees.len()
    }
}

/// Row subsample without replacement, sorted; all rows when `fraction >= 1`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub(crate) fn subsample_rows(n: usize, fraction: f64, rng: &mut ChaCha8Rng) -> Vec<usize> {
    if fraction >= 1.0 {
        return (0..n).collect();
    }
    let size = ((n as f64) * fraction).ceil().max(1.0) as usize;
    let mut rows = rand::seq::index::sample(rng, n, size.min(n)).into_vec();
    rows.sort_unstable();
    rows
}

impl Estimator for GradientBoostingRegressor {
    fn kind(&self) -> &'static str {
        "gradient_boosting"
    }

    #[allow(clippy::cast_precision_loss)]
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n = x.nrows();
        let params = TreeParams::with_depth(Criterion::FriedmanMse, self.max_depth);
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);

        self.initial_prediction = y.sum() / n as f64;
        let mut predictions = Array1::from_elem(n, self.initial_prediction);
        let mut trees = Vec::with_capacity(self.n_estimators);

        for _ in 0..self.n_estimators {
            let residuals = &y - &predictions;
            let rows = subsample_rows(n, self.subsample, &mut rng);
            let tree = RegressionTree::grow(x, residuals.view(), &rows, &params, Some(&mut rng))?;
            predictions.scaled_add(self.learning_rate, &tree.predict(x));
            trees.push(tree);
        }

        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let first = self.trees.first().ok_or(Error::NotFitted)?;
        check_predict_input(x, first.n_features())?;

        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for tree in &self.trees {
            predictions.scaled_add(self.learning_rate, &tree.predict(x));
        }
        Ok(predictions)
    }

    fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::new()
            .with("n_estimators", self.n_estimators)
            .with("learning_rate", self.learning_rate)
            .with("subsample", self.subsample)
            .with("max_depth", self.max_depth)
            .with("random_state", self.random_state)
    }

    fn set_hyperparameters(&mut self, params: &Hyperparameters) -> Result<()> {
        let mut next = self.clone();
        for (name, value) in params.iter() {
            match name {
                "n_estimators" => next.n_estimators = extract::positive_usize(name, value)?,
                "learning_rate" => next.learning_rate = extract::float_in(name, value, 0.0, f64::MAX)?,
                "subsample" => next.subsample = extract::float_in(name, value, 0.0, 1.0)?,
                "max_depth" => next.max_depth = extract::positive_usize(name, value)?,
                "random_state" => next.random_state = extract::seed(name, value)?,
                other => return Err(extract::unknown(other)),
            }
        }
        *self = next;
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

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn sine() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 1), |(i, _)| i as f64 / 10.0);
        let y = x.column(0).mapv(f64::sin);
        (x, y)
    }

    #[test]
    fn test_more_stages_reduce_training_error() {
        let (x, y) = sine();
        let mut few = GradientBoostingRegressor::new();
        few.set_hyperparameters(&Hyperparameters::new().with("n_estimators", 2_i64))
            .unwrap();
        let mut many = GradientBoostingRegressor::new();
        few.fit(x.view(), y.view()).unwrap();
        many.fit(x.view(), y.view()).unwrap();

        let r2_few = crate::metrics::r2_score(y.view(), few.predict(x.view()).unwrap().view()).unwrap();
        let r2_many = crate::metrics::r2_score(y.view(), many.predict(x.view()).unwrap().view()).unwrap();
        assert!(r2_many > r2_few);
        assert!(r2_many > 0.95, "r2 = {r2_many}");
        assert_eq!(many.n_stages(), 100);
    }

    #[test]
    fn test_subsample_bounds() {
        let mut model = GradientBoostingRegressor::new();
        let too_big = Hyperparameters::new().with("subsample", 1.5);
        assert!(model.set_hyperparameters(&too_big).is_err());
        let zero = Hyperparameters::new().with("subsample", 0.0);
        assert!(model.set_hyperparameters(&zero).is_err());
    }

    #[test]
    fn test_subsample_rows_sorted_and_sized() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let rows = subsample_rows(10, 0.6, &mut rng);
        assert_eq!(rows.len(), 6);
        assert!(rows.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(subsample_rows(4, 1.0, &mut rng), vec![0, 1, 2, 3]);
    }
}
