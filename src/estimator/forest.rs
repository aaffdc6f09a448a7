//! Random forest (bagged CART trees)

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::tree::{apply_tree_param, tree_hyperparameters, RegressionTree, TreeParams};
use super::{check_fit_input, check_predict_input, Estimator};
use crate::hyperparams::{extract, Hyperparameters};
use crate::{Error, Result};

/// Random forest regressor.
///
/// Per-tree seeds are drawn up front from `random_state`, so the fitted forest
/// is identical whether trees are grown sequentially or in parallel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    n_estimators: usize,
    bootstrap: bool,
    random_state: u64,
    tree_params: TreeParams,
    trees: Vec<RegressionTree>,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForestRegressor {
    /// Create an unfitted forest.
    #[must_use]
    pub fn new(n_estimators: usize) -> Self {
        Self {
            n_estimators,
            bootstrap: true,
            random_state: 42,
            tree_params: TreeParams::default(),
            trees: Vec::new(),
        }
    }

    /// Number of fitted trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn grow_one(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        seed: u64,
    ) -> Result<RegressionTree> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let n = x.nrows();
        let rows: Vec<usize> = if self.bootstrap {
            (0..n).map(|_| rng.gen_range(0..n)).collect()
        } else {
            (0..n).collect()
        };
        RegressionTree::grow(x, y, &rows, &self.tree_params, Some(&mut rng))
    }
}

impl Estimator for RandomForestRegressor {
    fn kind(&self) -> &'static str {
        "random_forest"
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let seeds: Vec<u64> = (0..self.n_estimators).map(|_| rng.next_u64()).collect();

        #[cfg(feature = "rayon")]
        let trees: Result<Vec<RegressionTree>> = seeds
            .par_iter()
            .map(|&seed| self.grow_one(x, y, seed))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let trees: Result<Vec<RegressionTree>> = seeds
            .iter()
            .map(|&seed| self.grow_one(x, y, seed))
            .collect();

        self.trees = trees?;
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let first = self.trees.first().ok_or(Error::NotFitted)?;
        check_predict_input(x, first.n_features())?;

        let mut total = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            total += &tree.predict(x);
        }
        Ok(total / self.trees.len() as f64)
    }

    fn hyperparameters(&self) -> Hyperparameters {
        let mut params = tree_hyperparameters(&self.tree_params);
        params.insert("n_estimators", self.n_estimators);
        params.insert("bootstrap", self.bootstrap);
        params.insert("random_state", self.random_state);
        params
    }

    fn set_hyperparameters(&mut self, params: &Hyperparameters) -> Result<()> {
        let mut next = self.clone();
        for (name, value) in params.iter() {
            match name {
                "n_estimators" => next.n_estimators = extract::positive_usize(name, value)?,
                "bootstrap" => next.bootstrap = extract::boolean(name, value)?,
                "random_state" => next.random_state = extract::seed(name, value)?,
                other => {
                    if !apply_tree_param(&mut next.tree_params, other, value)? {
                        return Err(extract::unknown(other));
                    }
                }
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
