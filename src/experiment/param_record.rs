//! Param Record - string-valued run parameters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One logged parameter. Keys are unique within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParamRecord {
    run_id: String,
    key: String,
    value: String,
    logged_at: DateTime<Utc>,
}

impl ParamRecord {
    /// Create a new param record with the current timestamp.
    #[must_use]
    pub fn new(run_id: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            value: value.into(),
            logged_at: Utc::now(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the parameter key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the parameter value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Get the timestamp when the parameter was logged.
    #[must_use]
    pub const fn logged_at(&self) -> DateTime<Utc> {
        self.logged_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_record_new() {
        let param = ParamRecord::new("run-1", "model_name", "Random Forest");
        assert_eq!(param.run_id(), "run-1");
        assert_eq!(param.key(), "model_name");
        assert_eq!(param.value(), "Random Forest");
    }
}
