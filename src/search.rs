//! Candidate search: inner level of the two-level model search
//!
//! For one family, every grid combination is ranked by its mean K-fold
//! cross-validated r2 on the training set only. The winner is refit on the
//! full training set from a fresh factory instance and scored once on the
//! held-out set.
//!
//! ## Ranking rules
//!
//! - Folds are contiguous and unshuffled; the first `n % k` folds get one
//!   extra row.
//! - A combination that fails to fit on any fold scores NaN and keeps the
//!   search going; NaN ranks below every finite score.
//! - Ties keep the first combination in grid order.
//! - Only the final refit can fail the family.

use std::time::Instant;

use ndarray::{ArrayView1, ArrayView2, Axis};
use tracing::{debug, info, warn};

use crate::dataset::DatasetSplit;
use crate::estimator::Estimator;
use crate::hyperparams::Hyperparameters;
use crate::metrics::{r2_score, RegressionMetrics};
use crate::registry::ModelFamily;
use crate::{Error, Result};

/// Default number of cross-validation folds.
pub const DEFAULT_CV_FOLDS: usize = 3;

/// Unshuffled K-fold splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    n_splits: usize,
}

impl KFold {
    /// Create a splitter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `n_splits < 2`.
    pub fn new(n_splits: usize) -> Result<Self> {
        if n_splits < 2 {
            return Err(Error::Config(format!(
                "cross-validation needs at least 2 folds, got {n_splits}"
            )));
        }
        Ok(Self { n_splits })
    }

    /// Number of folds.
    #[must_use]
    pub const fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// `(train_rows, validation_rows)` for each fold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if there are fewer samples than folds.
    pub fn split(&self, n_samples: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
        if n_samples < self.n_splits {
            return Err(Error::InvalidShape(format!(
                "{} folds need at least {} training rows, got {n_samples}",
                self.n_splits, self.n_splits
            )));
        }
        let base = n_samples / self.n_splits;
        let extra = n_samples % self.n_splits;

        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for fold in 0..self.n_splits {
            let size = base + usize::from(fold < extra);
            let end = start + size;
            let train = (0..start).chain(end..n_samples).collect();
            folds.push((train, (start..end).collect()));
            start = end;
        }
        Ok(folds)
    }
}

/// Outcome of searching one family.
#[derive(Debug)]
pub struct CandidateResult {
    /// Family name
    pub name: String,
    /// Estimator refit on the full training set with `best_params`
    pub model: Box<dyn Estimator>,
    /// Held-out r2 (the value the engine compares)
    pub test_score: f64,
    /// All four held-out metrics
    pub metrics: RegressionMetrics,
    /// Winning grid combination (empty for an empty grid)
    pub best_params: Hyperparameters,
    /// Mean cross-validated r2 of the winner (`None` when nothing was searched)
    pub cv_score: Option<f64>,
    /// Number of grid combinations considered
    pub n_candidates: usize,
}

/// Exhaustive grid search with K-fold cross-validation.
#[derive(Debug, Clone, Copy)]
pub struct GridSearch {
    folds: KFold,
}

impl Default for GridSearch {
    fn default() -> Self {
        Self {
            folds: KFold {
                n_splits: DEFAULT_CV_FOLDS,
            },
        }
    }
}

impl GridSearch {
    /// Grid search with `cv_folds` folds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `cv_folds < 2`.
    pub fn new(cv_folds: usize) -> Result<Self> {
        Ok(Self {
            folds: KFold::new(cv_folds)?,
        })
    }

    /// Number of cross-validation folds.
    #[must_use]
    pub const fn cv_folds(&self) -> usize {
        self.folds.n_splits()
    }

    /// Search one family and refit its best combination.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fit`] naming the family if the final refit, prediction
    /// or scoring fails, and [`Error::InvalidShape`] if the training set has
    /// fewer rows than folds while the grid is non-empty.
    pub fn search(&self, family: &ModelFamily, split: &DatasetSplit) -> Result<CandidateResult> {
        let start = Instant::now();
        let combinations = family.grid().combinations();
        let n_candidates = combinations.len();

        let (best_params, cv_score) = if family.grid().is_empty() {
            (Hyperparameters::new(), None)
        } else {
            let folds = self.folds.split(split.n_train())?;
            let (params, score) =
                self.rank(family, &combinations, split.x_train(), split.y_train(), &folds)?;
            (params, Some(score))
        };

        let (model, metrics) =
            refit(family, &best_params, split).map_err(|e| Error::fit(family.name(), e))?;

        info!(
            family = family.name(),
            candidates = n_candidates,
            cv_r2 = ?cv_score,
            test_r2 = metrics.r2,
            best_params = %best_params,
            elapsed_ms = start.elapsed().as_millis(),
            "candidate search complete"
        );

        Ok(CandidateResult {
            name: family.name().to_string(),
            model,
            test_score: metrics.r2,
            metrics,
            best_params,
            cv_score,
            n_candidates,
        })
    }

    fn rank(
        &self,
        family: &ModelFamily,
        combinations: &[Hyperparameters],
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        folds: &[(Vec<usize>, Vec<usize>)],
    ) -> Result<(Hyperparameters, f64)> {
        let mut best: Option<(usize, f64)> = None;

        for (i, params) in combinations.iter().enumerate() {
            let score = match cross_validate(family, params, x, y, folds) {
                Ok(score) => score,
                Err(e) => {
                    warn!(family = family.name(), params = %params, error = %e, "combination failed, scored NaN");
                    f64::NAN
                }
            };
            debug!(family = family.name(), params = %params, cv_r2 = score, "scored combination");

            if best.map_or(true, |(_, b)| outranks(score, b)) {
                best = Some((i, score));
            }
        }

        best.map(|(i, score)| (combinations[i].clone(), score))
            .ok_or_else(|| Error::InvalidHyperparameter {
                name: family.name().to_string(),
                reason: "grid produced no combinations".to_string(),
            })
    }
}

/// Strictly better under "NaN ranks lowest"; equal scores do not outrank.
pub(crate) fn outranks(candidate: f64, incumbent: f64) -> bool {
    match (candidate.is_nan(), incumbent.is_nan()) {
        (true, _) => false,
        (false, true) => true,
        (false, false) => candidate > incumbent,
    }
}

#[allow(clippy::cast_precision_loss)]
fn cross_validate(
    family: &ModelFamily,
    params: &Hyperparameters,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    folds: &[(Vec<usize>, Vec<usize>)],
) -> Result<f64> {
    let mut total = 0.0;
    for (train, validation) in folds {
        let mut model = family.instantiate();
        model.set_hyperparameters(params)?;
        model.fit(x.select(Axis(0), train).view(), y.select(Axis(0), train).view())?;
        let pred = model.predict(x.select(Axis(0), validation).view())?;
        total += r2_score(y.select(Axis(0), validation).view(), pred.view())?;
    }
    Ok(total / folds.len() as f64)
}

fn refit(
    family: &ModelFamily,
    params: &Hyperparameters,
    split: &DatasetSplit,
) -> Result<(Box<dyn Estimator>, RegressionMetrics)> {
    let mut model = family.instantiate();
    model.set_hyperparameters(params)?;
    model.fit(split.x_train(), split.y_train())?;
    let pred = model.predict(split.x_test())?;
    let metrics = RegressionMetrics::compute(split.y_test(), pred.view())?;
    Ok((model, metrics))
}
