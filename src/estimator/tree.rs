//! CART regression trees
//!
//! [`RegressionTree`] is the shared growing/prediction core; the ensembles in
//! this module tree reuse it on bootstrap samples or residuals.
//! [`DecisionTreeRegressor`] is the standalone family.
//!
//! Split search sorts node rows once per candidate feature and sweeps prefix
//! statistics, so squared-error, Friedman and Poisson criteria are
//! `O(n log n)` per feature. Absolute error needs medians of both children and
//! falls back to a direct evaluation per threshold.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{check_fit_input, check_predict_input, Estimator};
use crate::hyperparams::{extract, Hyperparameters, ParamValue};
use crate::{Error, Result};

/// Split quality criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Sum of squared deviations from the child mean
    SquaredError,
    /// Friedman's improvement score (difference of child means, weighted)
    FriedmanMse,
    /// Sum of absolute deviations from the child median
    AbsoluteError,
    /// Half Poisson deviance (non-negative targets only)
    Poisson,
}

impl Criterion {
    /// Parse the hyperparameter spelling.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "squared_error" => Some(Self::SquaredError),
            "friedman_mse" => Some(Self::FriedmanMse),
            "absolute_error" => Some(Self::AbsoluteError),
            "poisson" => Some(Self::Poisson),
            _ => None,
        }
    }

    /// Hyperparameter spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SquaredError => "squared_error",
            Self::FriedmanMse => "friedman_mse",
            Self::AbsoluteError => "absolute_error",
            Self::Poisson => "poisson",
        }
    }
}

/// Growth limits shared by every tree-based family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TreeParams {
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            criterion: Criterion::SquaredError,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

impl TreeParams {
    pub(crate) fn with_depth(criterion: Criterion, max_depth: usize) -> Self {
        Self {
            criterion,
            max_depth: Some(max_depth),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Fitted tree stored as a node arena (root at index 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RegressionTree {
    nodes: Vec<Node>,
    n_features: usize,
}

impl RegressionTree {
    /// Grow a tree on the given rows (duplicates allowed for bootstrap samples).
    pub(crate) fn grow(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        rows: &[usize],
        params: &TreeParams,
        rng: Option<&mut ChaCha8Rng>,
    ) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::InvalidShape("cannot grow a tree on zero rows".to_string()));
        }
        if params.criterion == Criterion::Poisson {
            if rows.iter().any(|&r| y[r] < 0.0) {
                return Err(Error::InvalidData(
                    "poisson criterion requires non-negative targets".to_string(),
                ));
            }
            if rows.iter().map(|&r| y[r]).sum::<f64>() <= 0.0 {
                return Err(Error::InvalidData(
                    "poisson criterion requires a positive target sum".to_string(),
                ));
            }
        }

        let mut grower = Grower {
            x,
            y,
            params,
            rng,
            nodes: Vec::new(),
        };
        grower.build(rows.to_vec());
        Ok(Self {
            nodes: grower.nodes,
            n_features: x.ncols(),
        })
    }

    pub(crate) const fn n_features(&self) -> usize {
        self.n_features
    }

    pub(crate) fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub(crate) fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    /// Number of nodes (leaves and splits).
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

struct Grower<'x, 'y, 'p, 'r> {
    x: ArrayView2<'x, f64>,
    y: ArrayView1<'y, f64>,
    params: &'p TreeParams,
    rng: Option<&'r mut ChaCha8Rng>,
    nodes: Vec<Node>,
}

/// Pending node: its rows, depth, and the split slot that must point at it.
struct Pending {
    rows: Vec<usize>,
    depth: usize,
    parent: Option<(usize, bool)>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    cost: f64,
}

impl Grower<'_, '_, '_, '_> {
    /// Grow depth-first in pre-order on an explicit stack, so unbounded
    /// `max_depth` cannot exhaust the call stack.
    fn build(&mut self, rows: Vec<usize>) {
        let mut stack = vec![Pending {
            rows,
            depth: 0,
            parent: None,
        }];

        while let Some(Pending { rows, depth, parent }) = stack.pop() {
            let idx = self.nodes.len();
            self.nodes.push(Node::Leaf {
                value: leaf_value(self.params.criterion, self.y, &rows),
            });
            if let Some((parent, is_left)) = parent {
                if let Node::Split { left, right, .. } = &mut self.nodes[parent] {
                    if is_left {
                        *left = idx;
                    } else {
                        *right = idx;
                    }
                }
            }

            let n = rows.len();
            let depth_reached = self.params.max_depth.is_some_and(|d| depth >= d);
            if depth_reached
                || n < self.params.min_samples_split
                || n < 2 * self.params.min_samples_leaf
                || is_constant(self.y, &rows)
            {
                continue;
            }
            let Some(best) = self.find_split(&rows) else {
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                .iter()
                .copied()
                .partition(|&r| self.x[[r, best.feature]] <= best.threshold);
            self.nodes[idx] = Node::Split {
                feature: best.feature,
                threshold: best.threshold,
                left: idx,
                right: idx,
            };
            // Right first so the left subtree is grown (and numbered) first
            stack.push(Pending {
                rows: right_rows,
                depth: depth + 1,
                parent: Some((idx, false)),
            });
            stack.push(Pending {
                rows: left_rows,
                depth: depth + 1,
                parent: Some((idx, true)),
            });
        }
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let n_features = self.x.ncols();
        match (self.params.max_features, self.rng.as_deref_mut()) {
            (Some(k), Some(rng)) if k < n_features => {
                let mut picked = rand::seq::index::sample(rng, n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n_features).collect(),
        }
    }

    fn find_split(&mut self, rows: &[usize]) -> Option<BestSplit> {
        let features = self.candidate_features();
        let mut best: Option<BestSplit> = None;
        let mut sorted = rows.to_vec();

        for feature in features {
            sorted.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
            if let Some((threshold, cost)) = self.sweep(feature, &sorted) {
                if best.as_ref().map_or(true, |b| cost < b.cost) {
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        cost,
                    });
                }
            }
        }
        best
    }

    /// Best `(threshold, cost)` along one feature; rows must be sorted by it.
    #[allow(clippy::cast_precision_loss)]
    fn sweep(&self, feature: usize, sorted: &[usize]) -> Option<(f64, f64)> {
        let n = sorted.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let criterion = self.params.criterion;

        let total = Stats::over(self.y, sorted);
        let mut left = Stats::default();
        let mut best: Option<(f64, f64)> = None;

        for i in 1..n {
            left.push(self.y[sorted[i - 1]]);
            let lo = self.x[[sorted[i - 1], feature]];
            let hi = self.x[[sorted[i], feature]];
            if lo >= hi || i < min_leaf || n - i < min_leaf {
                continue;
            }
            let right = total.minus(&left);

            let cost = match criterion {
                Criterion::SquaredError => left.sse() + right.sse(),
                Criterion::FriedmanMse => {
                    let (nl, nr) = (left.count as f64, right.count as f64);
                    let diff = left.mean() - right.mean();
                    -(nl * nr / (nl + nr)) * diff * diff
                }
                Criterion::Poisson => {
                    if left.sum <= 0.0 || right.sum <= 0.0 {
                        continue;
                    }
                    left.poisson_deviance() + right.poisson_deviance()
                }
                Criterion::AbsoluteError => {
                    absolute_deviation(self.y, &sorted[..i]) + absolute_deviation(self.y, &sorted[i..])
                }
            };

            if best.map_or(true, |(_, c)| cost < c) {
                // Midpoint, guarded against rounding up to `hi`
                let mut threshold = lo / 2.0 + hi / 2.0;
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some((threshold, cost));
            }
        }
        best
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Stats {
    count: usize,
    sum: f64,
    sum_sq: f64,
    sum_ylny: f64,
}

impl Stats {
    fn over(y: ArrayView1<'_, f64>, rows: &[usize]) -> Self {
        let mut s = Self::default();
        for &r in rows {
            s.push(y[r]);
        }
        s
    }

    fn push(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.sum_sq += v * v;
        if v > 0.0 {
            self.sum_ylny += v * v.ln();
        }
    }

    fn minus(&self, other: &Self) -> Self {
        Self {
            count: self.count - other.count,
            sum: self.sum - other.sum,
            sum_sq: self.sum_sq - other.sum_sq,
            sum_ylny: self.sum_ylny - other.sum_ylny,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }

    #[allow(clippy::cast_precision_loss)]
    fn sse(&self) -> f64 {
        (self.sum_sq - self.sum * self.sum / self.count as f64).max(0.0)
    }

    /// `Σ y ln(y / ȳ)`; the `Σ (ȳ - y)` term vanishes at the mean.
    fn poisson_deviance(&self) -> f64 {
        self.sum_ylny - self.sum * self.mean().ln()
    }
}

fn is_constant(y: ArrayView1<'_, f64>, rows: &[usize]) -> bool {
    let first = y[rows[0]];
    rows.iter().all(|&r| (y[r] - first).abs() <= 1e-12)
}

#[allow(clippy::cast_precision_loss)]
fn leaf_value(criterion: Criterion, y: ArrayView1<'_, f64>, rows: &[usize]) -> f64 {
    if criterion == Criterion::AbsoluteError {
        let mut values: Vec<f64> = rows.iter().map(|&r| y[r]).collect();
        median(&mut values)
    } else {
        rows.iter().map(|&r| y[r]).sum::<f64>() / rows.len() as f64
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    }
}

fn absolute_deviation(y: ArrayView1<'_, f64>, rows: &[usize]) -> f64 {
    let mut values: Vec<f64> = rows.iter().map(|&r| y[r]).collect();
    let m = median(&mut values);
    values.iter().map(|v| (v - m).abs()).sum()
}

/// Standalone CART regression tree family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    params: TreeParams,
    random_state: u64,
    tree: Option<RegressionTree>,
}

impl Default for DecisionTreeRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTreeRegressor {
    /// Unbounded squared-error tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            params: TreeParams::default(),
            random_state: 42,
            tree: None,
        }
    }

    /// Set the split criterion.
    #[must_use]
    pub const fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.params.criterion = criterion;
        self
    }

    /// Set the maximum depth.
    #[must_use]
    pub const fn with_max_depth(mut self, depth: usize) -> Self {
        self.params.max_depth = Some(depth);
        self
    }

    /// Number of nodes in the fitted tree.
    #[must_use]
    pub fn node_count(&self) -> Option<usize> {
        self.tree.as_ref().map(RegressionTree::node_count)
    }
}

impl Estimator for DecisionTreeRegressor {
    fn kind(&self) -> &'static str {
        "decision_tree"
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let rows: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        self.tree = Some(RegressionTree::grow(x, y, &rows, &self.params, Some(&mut rng))?);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let tree = self.tree.as_ref().ok_or(Error::NotFitted)?;
        check_predict_input(x, tree.n_features())?;
        Ok(tree.predict(x))
    }

    fn hyperparameters(&self) -> Hyperparameters {
        tree_hyperparameters(&self.params).with("random_state", self.random_state)
    }

    fn set_hyperparameters(&mut self, params: &Hyperparameters) -> Result<()> {
        let mut tree = self.params.clone();
        let mut seed = self.random_state;
        for (name, value) in params.iter() {
            if name == "random_state" {
                seed = extract::seed(name, value)?;
            } else if !apply_tree_param(&mut tree, name, value)? {
                return Err(extract::unknown(name));
            }
        }
        self.params = tree;
        self.random_state = seed;
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

fn optional(value: Option<usize>) -> ParamValue {
    value.map_or_else(|| ParamValue::from("none"), ParamValue::from)
}

/// Current growth limits as hyperparameters.
pub(crate) fn tree_hyperparameters(params: &TreeParams) -> Hyperparameters {
    Hyperparameters::new()
        .with("criterion", params.criterion.as_str())
        .with("max_depth", optional(params.max_depth))
        .with("min_samples_split", params.min_samples_split)
        .with("min_samples_leaf", params.min_samples_leaf)
        .with("max_features", optional(params.max_features))
}

/// Apply one growth-limit parameter; `Ok(false)` if the name is not one.
pub(crate) fn apply_tree_param(
    params: &mut TreeParams,
    name: &str,
    value: &ParamValue,
) -> Result<bool> {
    match name {
        "criterion" => {
            let text = extract::text(name, value)?;
            params.criterion = Criterion::parse(text).ok_or_else(|| Error::InvalidHyperparameter {
                name: name.to_string(),
                reason: format!("unknown criterion `{text}`"),
            })?;
        }
        "max_depth" => params.max_depth = extract::optional_usize(name, value)?,
        "min_samples_split" => {
            let v = extract::positive_usize(name, value)?;
            if v < 2 {
                return Err(Error::InvalidHyperparameter {
                    name: name.to_string(),
                    reason: "must be at least 2".to_string(),
                });
            }
            params.min_samples_split = v;
        }
        "min_samples_leaf" => params.min_samples_leaf = extract::positive_usize(name, value)?,
        "max_features" => params.max_features = extract::optional_usize(name, value)?,
        _ => return Ok(false),
    }
    Ok(true)
}
