//! Hyperparameter values, assignments and search grids

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A single primitive hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean flag
    Bool(bool),
    /// Integer (counts, depths, seeds)
    Int(i64),
    /// Floating point (rates, fractions)
    Float(f64),
    /// Categorical choice
    Text(String),
}

impl ParamValue {
    /// Interpret as a floating point number (integers widen).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Interpret as a non-negative integer.
    #[must_use]
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Self::Int(v) => usize::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Interpret as text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Interpret as a boolean.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// A complete or partial hyperparameter assignment.
///
/// Keys are kept sorted, so [`fmt::Display`] yields a stable string form
/// suitable for logging as a run parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hyperparameters(BTreeMap<String, ParamValue>);

impl Hyperparameters {
    /// Create an empty assignment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or overwrite a value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up a value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Check whether a parameter is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // BTreeMap serializes in key order; JSON of primitives cannot fail
        let json = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Hyperparameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Typed accessors used by estimators when applying an assignment.
pub(crate) mod extract {
    use super::ParamValue;
    use crate::{Error, Result};

    fn invalid(name: &str, reason: impl Into<String>) -> Error {
        Error::InvalidHyperparameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn positive_usize(name: &str, value: &ParamValue) -> Result<usize> {
        match value.as_usize() {
            Some(v) if v > 0 => Ok(v),
            _ => Err(invalid(name, format!("expected a positive integer, got {value}"))),
        }
    }

    pub fn optional_usize(name: &str, value: &ParamValue) -> Result<Option<usize>> {
        match value {
            ParamValue::Text(t) if t == "none" => Ok(None),
            other => positive_usize(name, other).map(Some),
        }
    }

    pub fn seed(name: &str, value: &ParamValue) -> Result<u64> {
        match value {
            ParamValue::Int(v) => u64::try_from(*v)
                .map_err(|_| invalid(name, format!("expected a non-negative seed, got {v}"))),
            other => Err(invalid(name, format!("expected an integer seed, got {other}"))),
        }
    }

    /// Float in the half-open interval `(low, high]`.
    pub fn float_in(name: &str, value: &ParamValue, low: f64, high: f64) -> Result<f64> {
        match value.as_f64() {
            Some(v) if v.is_finite() && v > low && v <= high => Ok(v),
            _ => Err(invalid(
                name,
                format!("expected a number in ({low}, {high}], got {value}"),
            )),
        }
    }

    pub fn non_negative(name: &str, value: &ParamValue) -> Result<f64> {
        match value.as_f64() {
            Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
            _ => Err(invalid(name, format!("expected a non-negative number, got {value}"))),
        }
    }

    pub fn boolean(name: &str, value: &ParamValue) -> Result<bool> {
        value
            .as_bool()
            .ok_or_else(|| invalid(name, format!("expected a boolean, got {value}")))
    }

    pub fn text<'a>(name: &str, value: &'a ParamValue) -> Result<&'a str> {
        value
            .as_str()
            .ok_or_else(|| invalid(name, format!("expected a string, got {value}")))
    }

    pub fn unknown(name: &str) -> Error {
        invalid(name, "not a hyperparameter of this estimator")
    }
}

/// Ordered hyperparameter grid for exhaustive search.
///
/// Axes keep insertion order. [`ParamGrid::combinations`] enumerates the
/// Cartesian product over the axes sorted by name, the alphabetically first
/// parameter varying slowest and the last fastest. Ties are broken in that
/// order, so it does not depend on how the grid was assembled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<ParamValue>)>,
}

impl ParamGrid {
    /// Create an empty grid (single default combination).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style axis insert. A repeated name replaces the earlier values.
    #[must_use]
    pub fn axis<V: Into<ParamValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let name = name.into();
        let values: Vec<ParamValue> = values.into_iter().map(Into::into).collect();
        if let Some(slot) = self.axes.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = values;
        } else {
            self.axes.push((name, values));
        }
        self
    }

    /// Check whether the grid has no axes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Parameter names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.axes.iter().map(|(n, _)| n.as_str())
    }

    /// Axes in insertion order.
    #[must_use]
    pub fn axes(&self) -> &[(String, Vec<ParamValue>)] {
        &self.axes
    }

    /// Number of combinations the grid enumerates (1 for an empty grid).
    #[must_use]
    pub fn len(&self) -> usize {
        self.axes.iter().map(|(_, v)| v.len()).product()
    }

    /// Reject axes with no candidate values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHyperparameter`] naming the empty axis.
    pub fn validate(&self) -> Result<()> {
        for (name, values) in &self.axes {
            if values.is_empty() {
                return Err(Error::InvalidHyperparameter {
                    name: name.clone(),
                    reason: "grid axis has no candidate values".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Enumerate every combination over name-sorted axes, first name slowest.
    #[must_use]
    pub fn combinations(&self) -> Vec<Hyperparameters> {
        let mut axes: Vec<&(String, Vec<ParamValue>)> = self.axes.iter().collect();
        axes.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = vec![Hyperparameters::new()];
        for (name, values) in axes {
            let mut next = Vec::with_capacity(out.len() * values.len());
            for partial in &out {
                for value in values {
                    next.push(partial.clone().with(name.clone(), value.clone()));
                }
            }
            out = next;
        }
        out
    }
}
