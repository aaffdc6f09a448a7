//! AdaBoost.R2 over shallow regression trees

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::tree::{Criterion, RegressionTree, TreeParams};
use super::{check_fit_input, check_predict_input, Estimator};
use crate::hyperparams::{extract, Hyperparameters};
use crate::{Error, Result};

/// Per-sample loss used to reweight the training set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostLoss {
    /// `|e| / max|e|`
    Linear,
    /// `(|e| / max|e|)²`
    Square,
    /// `1 - exp(-|e| / max|e|)`
    Exponential,
}

impl BoostLoss {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "linear" => Some(Self::Linear),
            "square" => Some(Self::Square),
            "exponential" => Some(Self::Exponential),
            _ => None,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Square => "square",
            Self::Exponential => "exponential",
        }
    }

    fn apply(self, normalized: f64) -> f64 {
        match self {
            Self::Linear => normalized,
            Self::Square => normalized * normalized,
            Self::Exponential => 1.0 - (-normalized).exp(),
        }
    }
}

/// AdaBoost.R2 regressor (Drucker, 1997).
///
/// Each round fits a depth-3 tree on a weighted bootstrap sample, then raises
/// the weight of rows it predicted poorly. Prediction is the weighted median
/// of the stage predictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostRegressor {
    n_estimators: usize,
    learning_rate: f64,
    loss: BoostLoss,
    max_depth: usize,
    random_state: u64,
    stages: Vec<(RegressionTree, f64)>,
}

impl Default for AdaBoostRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaBoostRegressor {
    /// 50 rounds, learning rate 1.0, linear loss.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 1.0,
            loss: BoostLoss::Linear,
            max_depth: 3,
            random_state: 42,
            stages: Vec::new(),
        }
    }

    /// Number of stages kept after early stopping.
    #[must_use]
    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }
}

/// Draw `n` row indices with probability proportional to `weights`.
fn weighted_bootstrap(weights: &[f64], rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut cumulative = Vec::with_capacity(weights.len());
    let mut total = 0.0;
    for w in weights {
        total += w;
        cumulative.push(total);
    }
    (0..weights.len())
        .map(|_| {
            let u = rng.gen::<f64>() * total;
            cumulative
                .partition_point(|&c| c <= u)
                .min(weights.len() - 1)
        })
        .collect()
}

fn weighted_median(values: &mut [(f64, f64)]) -> f64 {
    values.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total: f64 = values.iter().map(|(_, w)| w).sum();
    let mut running = 0.0;
    for &(value, weight) in values.iter() {
        running += weight;
        if running >= 0.5 * total {
            return value;
        }
    }
    values.last().map_or(f64::NAN, |(v, _)| *v)
}

impl Estimator for AdaBoostRegressor {
    fn kind(&self) -> &'static str {
        "adaboost"
    }

    #[allow(clippy::cast_precision_loss)]
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n = x.nrows();
        let params = TreeParams::with_depth(Criterion::SquaredError, self.max_depth);
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut weights = vec![1.0 / n as f64; n];
        let mut stages = Vec::with_capacity(self.n_estimators);

        for round in 0..self.n_estimators {
            let rows = weighted_bootstrap(&weights, &mut rng);
            let tree = RegressionTree::grow(x, y, &rows, &params, Some(&mut rng))?;
            let errors: Vec<f64> = (&tree.predict(x) - &y).mapv(f64::abs).to_vec();
            let max_error = errors.iter().copied().fold(0.0, f64::max);

            let losses: Vec<f64> = errors
                .iter()
                .map(|&e| {
                    let normalized = if max_error > 0.0 { e / max_error } else { 0.0 };
                    self.loss.apply(normalized)
                })
                .collect();
            let estimator_error: f64 = losses.iter().zip(&weights).map(|(l, w)| l * w).sum();

            if estimator_error <= 0.0 {
                stages.push((tree, 1.0));
                break;
            }
            if estimator_error >= 0.5 {
                if round == 0 {
                    stages.push((tree, 1.0));
                }
                break;
            }

            let beta = estimator_error / (1.0 - estimator_error);
            let stage_weight = self.learning_rate * (1.0 / beta).ln();
            for (w, l) in weights.iter_mut().zip(&losses) {
                *w *= beta.powf((1.0 - l) * self.learning_rate);
            }
            let total: f64 = weights.iter().sum();
            if total <= 0.0 || !total.is_finite() {
                stages.push((tree, stage_weight));
                break;
            }
            for w in &mut weights {
                *w /= total;
            }
            stages.push((tree, stage_weight));
        }

        self.stages = stages;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let (first, _) = self.stages.first().ok_or(Error::NotFitted)?;
        check_predict_input(x, first.n_features())?;

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mut votes: Vec<(f64, f64)> = self
                    .stages
                    .iter()
                    .map(|(tree, weight)| (tree.predict_row(row), *weight))
                    .collect();
                weighted_median(&mut votes)
            })
            .collect())
    }

    fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::new()
            .with("n_estimators", self.n_estimators)
            .with("learning_rate", self.learning_rate)
            .with("loss", self.loss.as_str())
            .with("max_depth", self.max_depth)
            .with("random_state", self.random_state)
    }

    fn set_hyperparameters(&mut self, params: &Hyperparameters) -> Result<()> {
        let mut next = self.clone();
        for (name, value) in params.iter() {
            match name {
                "n_estimators" => next.n_estimators = extract::positive_usize(name, value)?,
                "learning_rate" => next.learning_rate = extract::float_in(name, value, 0.0, f64::MAX)?,
                "loss" => {
                    let text = extract::text(name, value)?;
                    next.loss = BoostLoss::parse(text).ok_or_else(|| Error::InvalidHyperparameter {
                        name: name.to_string(),
                        reason: format!("unknown loss `{text}`"),
                    })?;
                }
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
