//! # Penalized Linear Models
//!
//! Ridge, lasso, elastic net, Bayesian ridge and ordinary least squares. Every model fits
//! an unpenalized intercept by centering the markers and the target, solves for the
//! slopes on the centered data and recovers the intercept from the column means.
//!
//! Genomic data is usually wide (far more markers than samples), so the dense solvers
//! switch to the `n × n` Gram matrix whenever `p > n`.

pub mod bayes;
pub mod ridge;
pub mod sparse;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{Eigh, UPLO};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinearError {
    #[error("A linear system solve failed. The penalized Gram matrix may be singular. Error: {0}")]
    LinearSystemSolveFailed(LinalgError),

    #[error("Eigendecomposition failed: {0}")]
    EigendecompositionFailed(LinalgError),

    #[error("Regularization strength must be finite and non-negative, got {0}.")]
    InvalidAlpha(f64),

    #[error("The l1 ratio must lie in [0, 1], got {0}.")]
    InvalidL1Ratio(f64),

    #[error("Fitting requires at least one row and one marker column.")]
    EmptyInput,

    #[error("Marker matrix has {rows} rows but {targets} targets were given.")]
    RowMismatch { rows: usize, targets: usize },

    #[error("Model was fitted on {expected} markers but the input has {found}.")]
    FeatureMismatch { expected: usize, found: usize },
}

/// Slopes and intercept of a fitted linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub coefficients: Array1<f64>,
    pub intercept: f64,
}

impl LinearFit {
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, LinearError> {
        if x.ncols() != self.coefficients.len() {
            return Err(LinearError::FeatureMismatch {
                expected: self.coefficients.len(),
                found: x.ncols(),
            });
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }
}

/// A linear model and its regularization settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum LinearMethod {
    Ridge { alpha: f64 },
    Lasso { alpha: f64 },
    ElasticNet { alpha: f64, l1_ratio: f64 },
    BayesianRidge,
    Ols,
}

impl LinearMethod {
    pub fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<LinearFit, LinearError> {
        match *self {
            LinearMethod::Ridge { alpha } => ridge::fit_ridge(x, y, alpha),
            LinearMethod::Lasso { alpha } => sparse::fit_lasso(x, y, alpha),
            LinearMethod::ElasticNet { alpha, l1_ratio } => {
                sparse::fit_elastic_net(x, y, alpha, l1_ratio)
            }
            LinearMethod::BayesianRidge => bayes::fit_bayesian_ridge(x, y).map(|fit| fit.fit),
            LinearMethod::Ols => ridge::fit_ols(x, y),
        }
    }

    /// Short model name used in reports.
    pub fn code(&self) -> &'static str {
        match self {
            LinearMethod::Ridge { .. } => "RR",
            LinearMethod::Lasso { .. } => "LAS",
            LinearMethod::ElasticNet { .. } => "EN",
            LinearMethod::BayesianRidge => "BR",
            LinearMethod::Ols => "OLS",
        }
    }
}

pub(crate) fn check_alpha(alpha: f64) -> Result<(), LinearError> {
    if alpha.is_finite() && alpha >= 0.0 {
        Ok(())
    } else {
        Err(LinearError::InvalidAlpha(alpha))
    }
}

/// Markers and target with their column means removed.
pub(crate) struct Centered {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    x_mean: Array1<f64>,
    y_mean: f64,
}

impl Centered {
    pub fn new(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Self, LinearError> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(LinearError::EmptyInput);
        }
        if x.nrows() != y.len() {
            return Err(LinearError::RowMismatch {
                rows: x.nrows(),
                targets: y.len(),
            });
        }
        let x_mean = x.mean_axis(Axis(0)).ok_or(LinearError::EmptyInput)?;
        let y_mean = y.mean().ok_or(LinearError::EmptyInput)?;
        Ok(Self {
            x: &x - &x_mean,
            y: y.mapv(|v| v - y_mean),
            x_mean,
            y_mean,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Attaches the intercept implied by the centering.
    pub fn finish(self, coefficients: Array1<f64>) -> LinearFit {
        let intercept = self.y_mean - self.x_mean.dot(&coefficients);
        LinearFit {
            coefficients,
            intercept,
        }
    }
}

/// Eigendecomposition of the smaller of `XᵀX` and `XXᵀ`.
///
/// Both share their non-zero eigenvalues (the squared singular values of `X`), so
/// spectral solvers work in whichever space is cheaper.
pub(crate) struct GramSpectrum {
    pub eigenvalues: Array1<f64>,
    pub eigenvectors: Array2<f64>,
    /// True when the decomposition is of `XXᵀ` (more markers than rows).
    pub dual: bool,
}

impl GramSpectrum {
    pub fn of(x: &Array2<f64>) -> Result<Self, LinearError> {
        let dual = x.ncols() > x.nrows();
        let gram = if dual { x.dot(&x.t()) } else { x.t().dot(x) };
        let (eigenvalues, eigenvectors) = gram
            .eigh(UPLO::Lower)
            .map_err(LinearError::EigendecompositionFailed)?;
        // Round-off can push null-space eigenvalues slightly negative.
        let eigenvalues = eigenvalues.mapv(|v| v.max(0.0));
        Ok(Self {
            eigenvalues,
            eigenvectors,
            dual,
        })
    }

    /// Eigenvalues below this are treated as zero.
    pub fn rank_tolerance(&self, x: &Array2<f64>) -> f64 {
        let largest = self.eigenvalues.fold(0.0_f64, |acc, &v| acc.max(v));
        largest * x.nrows().max(x.ncols()) as f64 * f64::EPSILON
    }

    /// `w = V diag(f(s)) Vᵀ Xᵀy` in primal form or `w = Xᵀ U diag(f(s)) Uᵀ y` in dual form.
    pub fn filtered_solution<F>(&self, x: &Array2<f64>, y: &Array1<f64>, filter: F) -> Array1<f64>
    where
        F: Fn(f64) -> f64,
    {
        let factors = self.eigenvalues.mapv(filter);
        let v = &self.eigenvectors;
        if self.dual {
            let projected = v.t().dot(y) * &factors;
            x.t().dot(&v.dot(&projected))
        } else {
            let projected = v.t().dot(&x.t().dot(y)) * &factors;
            v.dot(&projected)
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use ndarray::{Array1, Array2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Noiseless `y = 2 + X·w` with markers coded -1/0/1.
    pub fn noiseless(n: usize, coefficients: &[f64], seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let x = Array2::from_shape_simple_fn((n, coefficients.len()), || {
            rng.gen_range(-1..=1) as f64
        });
        let y = x.dot(&Array1::from(coefficients.to_vec())) + 2.0;
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn centering_recovers_the_intercept() {
        let x = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.0, 0.0]];
        let y = array![3.0, 4.0, 6.0, 1.0];
        let centered = Centered::new(x.view(), y.view()).unwrap();
        assert_abs_diff_eq!(centered.y.sum(), 0.0, epsilon = 1e-12);
        let fit = centered.finish(array![2.0, 3.0]);
        assert_abs_diff_eq!(fit.intercept, 1.0, epsilon = 1e-12);
        let predictions = fit.predict(x.view()).unwrap();
        for (p, t) in predictions.iter().zip(y.iter()) {
            assert_abs_diff_eq!(p, t, epsilon = 1e-12);
        }
    }

    #[test]
    fn shape_errors_are_reported() {
        let x = Array2::<f64>::zeros((3, 2));
        assert!(matches!(
            Centered::new(x.view(), Array1::zeros(2).view()),
            Err(LinearError::RowMismatch { rows: 3, targets: 2 })
        ));
        let fit = LinearFit {
            coefficients: Array1::zeros(4),
            intercept: 0.0,
        };
        assert!(matches!(
            fit.predict(x.view()),
            Err(LinearError::FeatureMismatch { expected: 4, found: 2 })
        ));
    }

    #[test]
    fn methods_parse_from_tagged_toml() {
        let method: LinearMethod = toml::from_str("method = \"ridge\"\nalpha = 101.0\n").unwrap();
        assert_eq!(method, LinearMethod::Ridge { alpha: 101.0 });
        assert_eq!(method.code(), "RR");
    }
}
