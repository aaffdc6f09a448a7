//! Model family registry
//!
//! A family is a unique name, a factory producing fresh unfitted estimators,
//! and a hyperparameter grid. Registration is the enforcement point: a family
//! whose grid names a parameter (or value) its estimator rejects never makes
//! it into the registry, so searches only fail on data, not on typos.
//!
//! Registry order is significant: it is the report order and the tie-break
//! order of the selection engine.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::estimator::{
    AdaBoostRegressor, DecisionTreeRegressor, Estimator, GradientBoostingRegressor,
    LinearRegression, RandomForestRegressor, RegularizedBoostingRegressor,
};
use crate::hyperparams::{Hyperparameters, ParamGrid};
use crate::persist::ModelArtifact;
use crate::{Error, Result};

/// Zero-argument constructor for an unfitted estimator.
pub type EstimatorFactory = Arc<dyn Fn() -> Box<dyn Estimator> + Send + Sync>;

/// Named estimator family with its search grid.
#[derive(Clone)]
pub struct ModelFamily {
    name: String,
    factory: EstimatorFactory,
    grid: ParamGrid,
}

impl fmt::Debug for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFamily")
            .field("name", &self.name)
            .field("grid", &self.grid)
            .finish_non_exhaustive()
    }
}

impl ModelFamily {
    /// Create a family from a name, factory and grid.
    pub fn new<F>(name: impl Into<String>, factory: F, grid: ParamGrid) -> Self
    where
        F: Fn() -> Box<dyn Estimator> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            grid,
        }
    }

    /// Family name (unique within a registry).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hyperparameter grid searched for this family.
    #[must_use]
    pub const fn grid(&self) -> &ParamGrid {
        &self.grid
    }

    /// Fresh unfitted estimator.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn Estimator> {
        (self.factory)()
    }

    /// Check that a fresh instance accepts every grid value.
    fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        for (name, values) in self.grid.axes() {
            for value in values {
                let mut probe = self.instantiate();
                probe.set_hyperparameters(&Hyperparameters::new().with(name.clone(), value.clone()))?;
            }
        }
        Ok(())
    }
}

/// Ordered collection of model families with unique names.
#[derive(Debug, Clone, Default)]
pub struct FamilyRegistry {
    families: Vec<ModelFamily>,
}

/// Ensemble sizes shared by the default grids.
const ESTIMATOR_COUNTS: [i64; 6] = [8, 16, 32, 64, 128, 256];

impl FamilyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a family.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateFamily`] if the name is taken, or
    /// [`Error::InvalidHyperparameter`] if the estimator rejects a grid entry.
    pub fn register(&mut self, family: ModelFamily) -> Result<()> {
        if self.get(family.name()).is_some() {
            return Err(Error::DuplicateFamily(family.name().to_string()));
        }
        family.validate()?;
        debug!(family = family.name(), combinations = family.grid().len(), "registered model family");
        self.families.push(family);
        Ok(())
    }

    /// Builder-style [`FamilyRegistry::register`].
    ///
    /// # Errors
    ///
    /// Same as [`FamilyRegistry::register`].
    pub fn with_family(mut self, family: ModelFamily) -> Result<Self> {
        self.register(family)?;
        Ok(self)
    }

    /// Built-in regressors plus every extension compiled into this build.
    ///
    /// # Errors
    ///
    /// Only fails if a built-in grid is rejected by its own estimator.
    pub fn default_regressors() -> Result<Self> {
        let mut registry = Self::new();
        for family in base_families().into_iter().chain(available_extensions()) {
            registry.register(family)?;
        }
        Ok(registry)
    }

    /// Look up a family by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModelFamily> {
        self.families.iter().find(|f| f.name == name)
    }

    /// Families in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelFamily> {
        self.families.iter()
    }

    /// Number of registered families.
    #[must_use]
    pub fn len(&self) -> usize {
        self.families.len()
    }

    /// Check whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Rebuild a predicting estimator from a persisted artifact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFamily`] if the artifact's family is not
    /// registered, [`Error::InvalidData`] on a kind mismatch, and
    /// [`Error::Json`] if the saved state cannot be restored.
    pub fn restore(&self, artifact: &ModelArtifact) -> Result<Box<dyn Estimator>> {
        let family = self
            .get(artifact.family())
            .ok_or_else(|| Error::UnknownFamily(artifact.family().to_string()))?;
        let mut estimator = family.instantiate();
        if estimator.kind() != artifact.kind() {
            return Err(Error::InvalidData(format!(
                "artifact kind `{}` does not match family `{}` ({})",
                artifact.kind(),
                family.name(),
                estimator.kind()
            )));
        }
        estimator.restore(artifact.state().clone())?;
        Ok(estimator)
    }
}

impl<'a> IntoIterator for &'a FamilyRegistry {
    type Item = &'a ModelFamily;
    type IntoIter = std::slice::Iter<'a, ModelFamily>;

    fn into_iter(self) -> Self::IntoIter {
        self.families.iter()
    }
}

fn base_families() -> Vec<ModelFamily> {
    let learning_rates = [0.1, 0.01, 0.05, 0.001];
    vec![
        ModelFamily::new(
            "Random Forest",
            || Box::new(RandomForestRegressor::default()),
            ParamGrid::new().axis("n_estimators", ESTIMATOR_COUNTS),
        ),
        ModelFamily::new(
            "Decision Tree",
            || Box::new(DecisionTreeRegressor::new()),
            ParamGrid::new().axis(
                "criterion",
                ["squared_error", "friedman_mse", "absolute_error", "poisson"],
            ),
        ),
        ModelFamily::new(
            "Gradient Boosting",
            || Box::new(GradientBoostingRegressor::new()),
            ParamGrid::new()
                .axis("learning_rate", learning_rates)
                .axis("subsample", [0.6, 0.7, 0.75, 0.8, 0.85, 0.9])
                .axis("n_estimators", ESTIMATOR_COUNTS),
        ),
        ModelFamily::new(
            "Linear Regression",
            || Box::new(LinearRegression::new()),
            ParamGrid::new(),
        ),
        ModelFamily::new(
            "Regularized Boosting",
            || Box::new(RegularizedBoostingRegressor::new()),
            ParamGrid::new()
                .axis("learning_rate", learning_rates)
                .axis("n_estimators", ESTIMATOR_COUNTS),
        ),
        ModelFamily::new(
            "AdaBoost Regressor",
            || Box::new(AdaBoostRegressor::new()),
            ParamGrid::new()
                .axis("learning_rate", [0.1, 0.01, 0.5, 0.001])
                .axis("n_estimators", ESTIMATOR_COUNTS),
        ),
    ]
}

/// Families backed by optional cargo features, probed once per registry build.
///
/// A feature that is compiled out contributes nothing; it is never registered
/// as a placeholder.
#[must_use]
pub fn available_extensions() -> Vec<ModelFamily> {
    #[allow(unused_mut)]
    let mut extensions = Vec::new();
    #[cfg(feature = "oblivious")]
    extensions.push(ModelFamily::new(
        "Oblivious Boosting",
        || Box::new(crate::estimator::ObliviousBoostingRegressor::new()),
        ParamGrid::new()
            .axis("depth", [6_i64, 8, 10])
            .axis("learning_rate", [0.01, 0.05, 0.1])
            .axis("iterations", [30_i64, 50, 100]),
    ));
    extensions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_order() {
        let registry = FamilyRegistry::default_regressors().unwrap();
        let names: Vec<&str> = registry.iter().map(ModelFamily::name).collect();
        assert_eq!(
            &names[..6],
            [
                "Random Forest",
                "Decision Tree",
                "Gradient Boosting",
                "Linear Regression",
                "Regularized Boosting",
                "AdaBoost Regressor",
            ]
        );
        assert_eq!(registry.len(), 6 + available_extensions().len());
    }

    #[cfg(feature = "oblivious")]
    #[test]
    fn test_extension_registered_last() {
        let registry = FamilyRegistry::default_regressors().unwrap();
        assert_eq!(registry.iter().last().map(ModelFamily::name), Some("Oblivious Boosting"));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = FamilyRegistry::new();
        let family = ModelFamily::new("OLS", || Box::new(LinearRegression::new()), ParamGrid::new());
        registry.register(family.clone()).unwrap();
        assert!(matches!(
            registry.register(family),
            Err(Error::DuplicateFamily(name)) if name == "OLS"
        ));
    }

    #[test]
    fn test_grid_checked_at_registration() {
        let mut registry = FamilyRegistry::new();
        let bad_name = ModelFamily::new(
            "OLS",
            || Box::new(LinearRegression::new()),
            ParamGrid::new().axis("alpha", [1.0]),
        );
        assert!(matches!(
            registry.register(bad_name),
            Err(Error::InvalidHyperparameter { .. })
        ));

        let bad_value = ModelFamily::new(
            "Tree",
            || Box::new(DecisionTreeRegressor::new()),
            ParamGrid::new().axis("criterion", ["gini"]),
        );
        assert!(registry.register(bad_value).is_err());
        assert!(registry.is_empty());
    }
}
