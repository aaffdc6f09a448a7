//! Boosting over oblivious (symmetric) trees
//!
//! Every level of an oblivious tree applies the same `(feature, border)` test
//! to all of its nodes, so a depth-`d` tree is just `d` tests plus `2^d` leaf
//! values and a row's leaf index is the bit pattern of its test outcomes.
//! Candidate borders are quantiles of each feature, computed once per fit.

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{check_fit_input, check_predict_input, Estimator};
use crate::hyperparams::{extract, Hyperparameters};
use crate::{Error, Result};

/// Deepest tree accepted; leaves grow as `2^depth`.
const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObliviousTree {
    splits: Vec<(usize, f64)>,
    leaves: Vec<f64>,
}

impl ObliviousTree {
    fn leaf_index(&self, row: ArrayView1<'_, f64>) -> usize {
        self.splits.iter().fold(0, |idx, &(feature, border)| {
            (idx << 1) | usize::from(row[feature] > border)
        })
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.leaves[self.leaf_index(row)]
    }
}

/// Quantile borders per feature, at most `border_count` each.
fn quantile_borders(x: ArrayView2<'_, f64>, border_count: usize) -> Vec<Vec<f64>> {
    x.columns()
        .into_iter()
        .map(|column| {
            let mut values = column.to_vec();
            values.sort_by(f64::total_cmp);
            values.dedup();
            let midpoints: Vec<f64> = values.windows(2).map(|w| w[0] / 2.0 + w[1] / 2.0).collect();
            if midpoints.len() <= border_count {
                return midpoints;
            }
            let mut picked: Vec<f64> = (0..border_count)
                .map(|k| midpoints[k * midpoints.len() / border_count])
                .collect();
            picked.dedup();
            picked
        })
        .collect()
}

/// CatBoost-style gradient boosting with symmetric trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObliviousBoostingRegressor {
    iterations: usize,
    learning_rate: f64,
    depth: usize,
    l2_leaf_reg: f64,
    border_count: usize,
    base_prediction: f64,
    n_features: usize,
    trees: Vec<ObliviousTree>,
}

impl Default for ObliviousBoostingRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl ObliviousBoostingRegressor {
    /// 100 depth-6 trees at learning rate 0.03.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            iterations: 100,
            learning_rate: 0.03,
            depth: 6,
            l2_leaf_reg: 3.0,
            border_count: 32,
            base_prediction: 0.0,
            n_features: 0,
            trees: Vec::new(),
        }
    }

    /// Number of fitted trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn grow_tree(
        &self,
        x: ArrayView2<'_, f64>,
        residuals: &[f64],
        borders: &[Vec<f64>],
    ) -> ObliviousTree {
        let n = x.nrows();
        let mut leaf_of = vec![0_usize; n];
        let mut splits = Vec::with_capacity(self.depth);

        // Scratch per-leaf sums; only leaves that hold rows are touched and reset
        let mut sums = vec![0.0; 1_usize << self.depth];
        let mut counts = vec![0.0; 1_usize << self.depth];
        let mut touched: Vec<usize> = Vec::with_capacity(n);

        for _ in 0..self.depth {
            let mut best: Option<(usize, f64, f64)> = None;

            for (feature, candidates) in borders.iter().enumerate() {
                for &border in candidates {
                    for row in 0..n {
                        let child = (leaf_of[row] << 1) | usize::from(x[[row, feature]] > border);
                        if counts[child] == 0.0 {
                            touched.push(child);
                        }
                        sums[child] += residuals[row];
                        counts[child] += 1.0;
                    }
                    let mut score = 0.0;
                    for &leaf in &touched {
                        score -= sums[leaf] * sums[leaf] / (counts[leaf] + self.l2_leaf_reg);
                        sums[leaf] = 0.0;
                        counts[leaf] = 0.0;
                    }
                    touched.clear();
                    if best.map_or(true, |(_, _, b)| score < b) {
                        best = Some((feature, border, score));
                    }
                }
            }

            let Some((feature, border, _)) = best else {
                break;
            };
            for row in 0..n {
                leaf_of[row] = (leaf_of[row] << 1) | usize::from(x[[row, feature]] > border);
            }
            splits.push((feature, border));
        }

        let n_leaves = 1_usize << splits.len();
        let mut sums = vec![0.0; n_leaves];
        let mut counts = vec![0.0; n_leaves];
        for (leaf, r) in leaf_of.iter().zip(residuals) {
            sums[*leaf] += r;
            counts[*leaf] += 1.0;
        }
        let leaves = sums
            .iter()
            .zip(&counts)
            .map(|(s, c)| self.learning_rate * s / (c + self.l2_leaf_reg))
            .collect();

        ObliviousTree { splits, leaves }
    }
}

impl Estimator for ObliviousBoostingRegressor {
    fn kind(&self) -> &'static str {
        "oblivious_boosting"
    }

    #[allow(clippy::cast_precision_loss)]
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let borders = quantile_borders(x, self.border_count);
        let base_prediction = y.sum() / x.nrows() as f64;
        let mut predictions = vec![base_prediction; x.nrows()];
        let mut trees = Vec::with_capacity(self.iterations);

        for _ in 0..self.iterations {
            let residuals: Vec<f64> = y.iter().zip(&predictions).map(|(t, p)| t - p).collect();
            let tree = self.grow_tree(x, &residuals, &borders);
            for (row, p) in x.rows().into_iter().zip(predictions.iter_mut()) {
                *p += tree.predict_row(row);
            }
            trees.push(tree);
        }

        self.base_prediction = base_prediction;
        self.n_features = x.ncols();
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(Error::NotFitted);
        }
        check_predict_input(x, self.n_features)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                self.base_prediction + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
            })
            .collect())
    }

    fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::new()
            .with("iterations", self.iterations)
            .with("learning_rate", self.learning_rate)
            .with("depth", self.depth)
            .with("l2_leaf_reg", self.l2_leaf_reg)
            .with("border_count", self.border_count)
    }

    fn set_hyperparameters(&mut self, params: &Hyperparameters) -> Result<()> {
        let mut next = self.clone();
        for (name, value) in params.iter() {
            match name {
                "iterations" => next.iterations = extract::positive_usize(name, value)?,
                "learning_rate" => next.learning_rate = extract::float_in(name, value, 0.0, f64::MAX)?,
                "depth" => {
                    let depth = extract::positive_usize(name, value)?;
                    if depth > MAX_DEPTH {
                        return Err(Error::InvalidHyperparameter {
                            name: name.to_string(),
                            reason: format!("must be at most {MAX_DEPTH}"),
                        });
                    }
                    next.depth = depth;
                }
                "l2_leaf_reg" => next.l2_leaf_reg = extract::non_negative(name, value)?,
                "border_count" => next.border_count = extract::positive_usize(name, value)?,
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
    use ndarray::{array, Array2};

    #[test]
    fn test_borders_capped_and_sorted() {
        let x = Array2::from_shape_fn((100, 1), |(i, _)| i as f64);
        let borders = quantile_borders(x.view(), 8);
        assert_eq!(borders[0].len(), 8);
        assert!(borders[0].windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_constant_feature_has_no_borders() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0]];
        let borders = quantile_borders(x.view(), 32);
        assert!(borders[0].is_empty());
        assert_eq!(borders[1], vec![0.5, 1.5]);
    }

    #[test]
    fn test_leaf_index_follows_split_bits() {
        let tree = ObliviousTree {
            splits: vec![(0, 0.5), (1, 0.5)],
            leaves: vec![0.0, 1.0, 2.0, 3.0],
        };
        assert_eq!(tree.predict_row(array![1.0, 0.0].view()), 2.0);
        assert_eq!(tree.predict_row(array![0.0, 1.0].view()), 1.0);
    }

    #[test]
    fn test_fits_training_data() {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| ((i * (j + 3)) % 60) as f64);
        let y = x.column(0).mapv(|v| v * 0.5) + x.column(1).mapv(f64::sqrt);
        let mut model = ObliviousBoostingRegressor::new();
        model
            .set_hyperparameters(&Hyperparameters::new().with("learning_rate", 0.1))
            .unwrap();
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(x.view()).unwrap();
        let r2 = crate::metrics::r2_score(y.view(), pred.view()).unwrap();
        assert!(r2 > 0.9, "r2 = {r2}");
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut model = ObliviousBoostingRegressor::new();
        let params = Hyperparameters::new().with("depth", 40_i64);
        assert!(model.set_hyperparameters(&params).is_err());
    }
}
