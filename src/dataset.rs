//! Train/test split consumed by the selection engine
//!
//! Toyota Way: Jidoka - stop before any search if the arrays are malformed.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use crate::{Error, Result};

/// Read-only train/test split with the target sliced off.
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    x_test: Array2<f64>,
    y_test: Array1<f64>,
}

impl DatasetSplit {
    /// Build a split from two matrices whose last column is the target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if either matrix is empty, has fewer than
    /// two columns, or the column counts differ, and [`Error::InvalidData`] if
    /// any value is not finite.
    pub fn from_arrays(train: ArrayView2<'_, f64>, test: ArrayView2<'_, f64>) -> Result<Self> {
        check_matrix("train", train)?;
        check_matrix("test", test)?;
        if train.ncols() != test.ncols() {
            return Err(Error::InvalidShape(format!(
                "train has {} columns, test has {}",
                train.ncols(),
                test.ncols()
            )));
        }

        let target = train.ncols() - 1;
        Ok(Self {
            x_train: train.slice(s![.., ..target]).to_owned(),
            y_train: train.column(target).to_owned(),
            x_test: test.slice(s![.., ..target]).to_owned(),
            y_test: test.column(target).to_owned(),
        })
    }

    /// Build a split from already separated features and targets.
    ///
    /// # Errors
    ///
    /// Same checks as [`DatasetSplit::from_arrays`], plus row/target length agreement.
    pub fn new(
        x_train: Array2<f64>,
        y_train: Array1<f64>,
        x_test: Array2<f64>,
        y_test: Array1<f64>,
    ) -> Result<Self> {
        for (name, x, y) in [("train", &x_train, &y_train), ("test", &x_test, &y_test)] {
            if x.nrows() == 0 || x.ncols() == 0 {
                return Err(Error::InvalidShape(format!(
                    "{name} features are empty ({}x{})",
                    x.nrows(),
                    x.ncols()
                )));
            }
            if x.nrows() != y.len() {
                return Err(Error::InvalidShape(format!(
                    "{name} has {} rows but {} targets",
                    x.nrows(),
                    y.len()
                )));
            }
            if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
                return Err(Error::InvalidData(format!("{name} contains non-finite values")));
            }
        }
        if x_train.ncols() != x_test.ncols() {
            return Err(Error::InvalidShape(format!(
                "train has {} features, test has {}",
                x_train.ncols(),
                x_test.ncols()
            )));
        }

        Ok(Self {
            x_train,
            y_train,
            x_test,
            y_test,
        })
    }

    /// Training features.
    #[must_use]
    pub fn x_train(&self) -> ArrayView2<'_, f64> {
        self.x_train.view()
    }

    /// Training target.
    #[must_use]
    pub fn y_train(&self) -> ArrayView1<'_, f64> {
        self.y_train.view()
    }

    /// Held-out features.
    #[must_use]
    pub fn x_test(&self) -> ArrayView2<'_, f64> {
        self.x_test.view()
    }

    /// Held-out target.
    #[must_use]
    pub fn y_test(&self) -> ArrayView1<'_, f64> {
        self.y_test.view()
    }

    /// Number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.x_train.ncols()
    }

    /// Number of training rows.
    #[must_use]
    pub fn n_train(&self) -> usize {
        self.x_train.nrows()
    }

    /// Number of held-out rows.
    #[must_use]
    pub fn n_test(&self) -> usize {
        self.x_test.nrows()
    }
}

fn check_matrix(name: &str, m: ArrayView2<'_, f64>) -> Result<()> {
    if m.nrows() == 0 {
        return Err(Error::InvalidShape(format!("{name} array has no rows")));
    }
    if m.ncols() < 2 {
        return Err(Error::InvalidShape(format!(
            "{name} array needs at least one feature and a target column, got {} columns",
            m.ncols()
        )));
    }
    if m.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidData(format!("{name} array contains non-finite values")));
    }
    Ok(())
}
