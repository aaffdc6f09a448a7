//! Tests for error types

use std::io;
use std::path::PathBuf;

use elegir::engine::{ModelReport, Rejection};
use elegir::{Error, Stage};

fn rejection() -> Rejection {
    let mut report = ModelReport::new();
    report.push("Decision Tree", 0.41);
    report.push("Linear Regression", 0.38);
    Rejection {
        best_name: Some("Decision Tree".to_string()),
        best_score: 0.41,
        threshold: 0.6,
        report,
        failures: Vec::new(),
    }
}

#[test]
fn test_invalid_shape_error() {
    let error = Error::InvalidShape("train has 8 features, test has 6".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid dataset shape"));
    assert!(error_str.contains("test has 6"));
    assert_eq!(error.stage(), Stage::Validation);
}

#[test]
fn test_invalid_hyperparameter_error() {
    let error = Error::InvalidHyperparameter {
        name: "learning_rate".to_string(),
        reason: "must be in (0, 1]".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("`learning_rate`"));
    assert!(error_str.contains("must be in (0, 1]"));
    assert_eq!(error.stage(), Stage::Search);
}

#[test]
fn test_not_fitted_error() {
    let error_str = format!("{}", Error::NotFitted);
    assert!(error_str.contains("not fitted"));
    assert!(error_str.contains("Call fit() before predict()"));
}

#[test]
fn test_fit_error_names_family_and_cause() {
    let error = Error::fit("Gradient Boosting", Error::Numerical("singular matrix".to_string()));
    let error_str = format!("{error}");
    assert!(error_str.contains("`Gradient Boosting`"));
    assert!(error_str.contains("singular matrix"));
    assert_eq!(error.family(), Some("Gradient Boosting"));
    assert_eq!(error.stage(), Stage::Search);

    let source = std::error::Error::source(&error).map(ToString::to_string);
    assert_eq!(source.as_deref(), Some("Numerical failure: singular matrix"));
}

#[test]
fn test_no_acceptable_model_is_distinct_from_fit() {
    let error = Error::NoAcceptableModel(rejection());
    let error_str = format!("{error}");
    assert!(error_str.contains("No acceptable model found"));
    assert!(error_str.contains("`Decision Tree`"));
    assert!(error_str.contains("0.4100"));
    assert!(error_str.contains("threshold 0.6"));

    assert_eq!(error.stage(), Stage::Selection);
    assert_eq!(error.family(), None);
    assert!(!matches!(error, Error::Fit { .. }));
}

#[test]
fn test_tracking_error() {
    let error = Error::Tracking {
        run_id: "run-000001".to_string(),
        message: "param `model_name` already logged".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("run-000001"));
    assert!(error_str.contains("already logged"));
    assert_eq!(error.stage(), Stage::Recording);
}

#[test]
fn test_persist_error() {
    let error = Error::Persist {
        path: PathBuf::from("artifacts/model.json"),
        source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only filesystem"),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("artifacts/model.json"));
    assert!(error_str.contains("read-only filesystem"));
    assert_eq!(error.stage(), Stage::Persistence);
}

#[test]
fn test_config_error() {
    let error = Error::Config("cv_folds must be at least 2".to_string());
    assert!(format!("{error}").contains("Invalid configuration"));
    assert_eq!(error.stage(), Stage::Configuration);
}

#[test]
fn test_registry_errors() {
    let duplicate = Error::DuplicateFamily("Random Forest".to_string());
    let unknown = Error::UnknownFamily("SVR".to_string());
    assert!(format!("{duplicate}").contains("Duplicate model family"));
    assert!(format!("{unknown}").contains("SVR"));
    assert_eq!(duplicate.stage(), Stage::Validation);
    assert_eq!(unknown.stage(), Stage::Validation);
}

#[test]
fn test_io_error_conversion() {
    let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    assert!(format!("{error}").contains("IO error"));
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
    assert_eq!(error.stage(), Stage::Persistence);
}

#[test]
fn test_stage_display() {
    assert_eq!(Stage::Search.to_string(), "search");
    assert_eq!(Stage::Recording.to_string(), "recording");
}
