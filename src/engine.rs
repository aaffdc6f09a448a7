//! Model selection engine: outer level of the two-level model search
//!
//! Toyota Way: Jidoka - a winner below the acceptance threshold is never
//! deployed, even when it beats every other family.
//!
//! ## Algorithm
//!
//! ```text
//! for family in registry (registry order):
//!     candidate = GridSearch::search(family, split)   // inner level
//!     report[family] = candidate.test_score
//! best = first entry with the maximum score (NaN never wins)
//! best.score >= threshold ? Accepted(best) : Rejected(report)
//! ```
//!
//! With the `rayon` feature and `parallel` enabled, families are searched
//! concurrently but every result is collected in registry order before the
//! comparison, so ties resolve exactly as in the sequential run.

use std::fmt;
use std::time::Instant;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SearchConfig;
use crate::dataset::DatasetSplit;
#[cfg(feature = "rayon")]
use crate::registry::ModelFamily;
use crate::registry::FamilyRegistry;
use crate::search::{outranks, CandidateResult, GridSearch};
use crate::{Error, Result};

/// Default acceptance threshold on held-out r2.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// What to do when one family fails to fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the whole selection on the first failing family.
    #[default]
    Abort,
    /// Record the failure, leave the family out of the report, keep going.
    Skip,
}

/// One report row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Family name
    pub name: String,
    /// Held-out r2
    pub score: f64,
}

/// Family name to held-out r2, in registry order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelReport {
    entries: Vec<ReportEntry>,
}

impl ModelReport {
    /// Create an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a score (registry order is the caller's responsibility).
    pub fn push(&mut self, name: impl Into<String>, score: f64) {
        self.entries.push(ReportEntry {
            name: name.into(),
            score,
        });
    }

    /// Score for one family.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.score)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter()
    }

    /// Family names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the report is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry holding the maximum score; NaN scores are ignored.
    #[must_use]
    pub fn best(&self) -> Option<&ReportEntry> {
        self.best_index().map(|i| &self.entries[i])
    }

    fn best_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.score.is_nan() {
                continue;
            }
            if best.map_or(true, |b| outranks(entry.score, self.entries[b].score)) {
                best = Some(i);
            }
        }
        best
    }
}

/// A family that failed under [`FailurePolicy::Skip`].
#[derive(Debug)]
pub struct FamilyFailure {
    /// Family name
    pub family: String,
    /// Error raised by its search
    pub error: Error,
}

/// Accepted outcome: the winning candidate plus comparison context.
#[derive(Debug)]
pub struct Winner {
    /// Fitted winner
    pub candidate: CandidateResult,
    /// Every scored family, registry order
    pub report: ModelReport,
    /// Families skipped after failing
    pub failures: Vec<FamilyFailure>,
}

impl Winner {
    /// Winning family name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.candidate.name
    }

    /// Winning held-out r2.
    #[must_use]
    pub const fn score(&self) -> f64 {
        self.candidate.test_score
    }
}

/// Rejected outcome: evaluation succeeded but nothing met the threshold.
#[derive(Debug)]
pub struct Rejection {
    /// Best-scoring family, if any family produced a comparable score
    pub best_name: Option<String>,
    /// Its score (NaN when there is none)
    pub best_score: f64,
    /// Threshold that was not met
    pub threshold: f64,
    /// Every scored family, registry order
    pub report: ModelReport,
    /// Families skipped after failing
    pub failures: Vec<FamilyFailure>,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.best_name {
            Some(name) => write!(
                f,
                "best candidate `{name}` scored {:.4}, below threshold {}",
                self.best_score, self.threshold
            )?,
            None => write!(f, "no candidate produced a comparable score (threshold {})", self.threshold)?,
        }
        if !self.failures.is_empty() {
            write!(f, "; {} family(ies) failed", self.failures.len())?;
        }
        Ok(())
    }
}

/// Result of one selection run.
#[derive(Debug)]
pub enum Selection {
    /// A family met the threshold.
    Accepted(Winner),
    /// No family met the threshold.
    Rejected(Rejection),
}

impl Selection {
    /// Check whether a winner was accepted.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Comparison report for either outcome.
    #[must_use]
    pub const fn report(&self) -> &ModelReport {
        match self {
            Self::Accepted(w) => &w.report,
            Self::Rejected(r) => &r.report,
        }
    }

    /// Families skipped after failing.
    #[must_use]
    pub fn failures(&self) -> &[FamilyFailure] {
        match self {
            Self::Accepted(w) => &w.failures,
            Self::Rejected(r) => &r.failures,
        }
    }

    /// Convert a rejection into [`Error::NoAcceptableModel`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAcceptableModel`] for [`Selection::Rejected`].
    pub fn into_result(self) -> Result<Winner> {
        match self {
            Self::Accepted(winner) => Ok(winner),
            Self::Rejected(rejection) => Err(Error::NoAcceptableModel(rejection)),
        }
    }
}

/// Orchestrates candidate search across a registry.
#[derive(Debug, Clone)]
pub struct ModelSelectionEngine {
    search: GridSearch,
    threshold: f64,
    policy: FailurePolicy,
    parallel: bool,
}

impl Default for ModelSelectionEngine {
    fn default() -> Self {
        Self {
            search: GridSearch::default(),
            threshold: DEFAULT_THRESHOLD,
            policy: FailurePolicy::Abort,
            parallel: false,
        }
    }
}

impl ModelSelectionEngine {
    /// Engine with the given acceptance threshold and default search settings.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    /// Engine configured from validated search settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the fold count is invalid.
    pub fn from_config(threshold: f64, config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            search: GridSearch::new(config.cv_folds())?,
            threshold,
            policy: config.failure_policy(),
            parallel: config.parallel(),
        })
    }

    /// Set the failure policy.
    #[must_use]
    pub const fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Search families concurrently (requires the `rayon` feature).
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Replace the inner grid search.
    #[must_use]
    pub const fn with_search(mut self, search: GridSearch) -> Self {
        self.search = search;
        self
    }

    /// Acceptance threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Failure policy.
    #[must_use]
    pub const fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Search every family and apply the acceptance gate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if the training set is smaller than the
    /// fold count while any grid is non-empty, or the first family's
    /// [`Error::Fit`] under [`FailurePolicy::Abort`]. A score below the
    /// threshold is not an error: it is [`Selection::Rejected`].
    pub fn select(&self, registry: &FamilyRegistry, split: &DatasetSplit) -> Result<Selection> {
        let start = Instant::now();
        let needs_cv = registry.iter().any(|f| !f.grid().is_empty());
        if needs_cv && split.n_train() < self.search.cv_folds() {
            return Err(Error::InvalidShape(format!(
                "{} training rows cannot be split into {} folds",
                split.n_train(),
                self.search.cv_folds()
            )));
        }

        info!(
            families = registry.len(),
            n_train = split.n_train(),
            n_test = split.n_test(),
            threshold = self.threshold,
            policy = ?self.policy,
            "starting model selection"
        );

        let outcomes = self.search_all(registry, split)?;

        let mut report = ModelReport::new();
        let mut candidates = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (family, outcome) in registry.iter().zip(outcomes) {
            match outcome {
                Ok(candidate) => {
                    report.push(candidate.name.clone(), candidate.test_score);
                    candidates.push(candidate);
                }
                Err(error) => {
                    warn!(family = family.name(), error = %error, "family skipped");
                    failures.push(FamilyFailure {
                        family: family.name().to_string(),
                        error,
                    });
                }
            }
        }

        let best = report.best_index();
        let accepted = best.filter(|&i| report.entries[i].score >= self.threshold);

        let Some(index) = accepted else {
            let (best_name, best_score) = best.map_or((None, f64::NAN), |i| {
                let e = &report.entries[i];
                (Some(e.name.clone()), e.score)
            });
            warn!(
                best = ?best_name,
                best_r2 = best_score,
                threshold = self.threshold,
                "no model met the acceptance threshold"
            );
            return Ok(Selection::Rejected(Rejection {
                best_name,
                best_score,
                threshold: self.threshold,
                report,
                failures,
            }));
        };

        let candidate = candidates.swap_remove(index);
        info!(
            best = %candidate.name,
            test_r2 = candidate.test_score,
            elapsed_ms = start.elapsed().as_millis(),
            "selected best model"
        );
        Ok(Selection::Accepted(Winner {
            candidate,
            report,
            failures,
        }))
    }

    /// Per-family outcomes in registry order.
    ///
    /// Under [`FailurePolicy::Abort`] the first failure (in registry order) is
    /// returned as the error; under [`FailurePolicy::Skip`] failures are kept.
    fn search_all(
        &self,
        registry: &FamilyRegistry,
        split: &DatasetSplit,
    ) -> Result<Vec<Result<CandidateResult>>> {
        if self.parallel {
            let outcomes = self.search_parallel(registry, split);
            return match self.policy {
                FailurePolicy::Abort => outcomes
                    .into_iter()
                    .map(|o| o.map(Ok))
                    .collect::<Result<Vec<_>>>(),
                FailurePolicy::Skip => Ok(outcomes),
            };
        }

        let mut outcomes = Vec::with_capacity(registry.len());
        for family in registry {
            let outcome = self.search.search(family, split);
            if self.policy == FailurePolicy::Abort {
                outcomes.push(Ok(outcome?));
            } else {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    #[cfg(feature = "rayon")]
    fn search_parallel(
        &self,
        registry: &FamilyRegistry,
        split: &DatasetSplit,
    ) -> Vec<Result<CandidateResult>> {
        let families: Vec<&ModelFamily> = registry.iter().collect();
        families
            .par_iter()
            .map(|family| self.search.search(family, split))
            .collect()
    }

    #[cfg(not(feature = "rayon"))]
    fn search_parallel(
        &self,
        registry: &FamilyRegistry,
        split: &DatasetSplit,
    ) -> Vec<Result<CandidateResult>> {
        registry
            .iter()
            .map(|family| self.search.search(family, split))
            .collect()
    }
}

/// One-shot selection with default search settings.
///
/// # Errors
///
/// Same as [`ModelSelectionEngine::select`].
pub fn select(registry: &FamilyRegistry, split: &DatasetSplit, threshold: f64) -> Result<Selection> {
    ModelSelectionEngine::new(threshold).select(registry, split)
}
