//! Bayesian ridge regression by evidence maximization.
//!
//! The weights get a zero-mean Gaussian prior with precision `λ` and the noise has
//! precision `α`. Both precisions carry Gamma(1e-6, 1e-6) hyperpriors and are
//! re-estimated in turn with the coefficients until the coefficients settle.

use log::{debug, warn};
use ndarray::{ArrayView1, ArrayView2};

use super::{Centered, GramSpectrum, LinearError, LinearFit};

pub const MAX_ITERATIONS: usize = 300;
pub const TOLERANCE: f64 = 1e-3;
const ALPHA_SHAPE: f64 = 1e-6;
const ALPHA_RATE: f64 = 1e-6;
const LAMBDA_SHAPE: f64 = 1e-6;
const LAMBDA_RATE: f64 = 1e-6;

/// A Bayesian ridge fit and the precisions it settled on.
#[derive(Debug, Clone)]
pub struct BayesianRidgeFit {
    pub fit: LinearFit,
    /// Estimated noise precision.
    pub alpha: f64,
    /// Estimated weight precision.
    pub lambda: f64,
    pub iterations: usize,
    /// False when the iteration cap was reached before the coefficients settled.
    pub converged: bool,
}

pub fn fit_bayesian_ridge(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<BayesianRidgeFit, LinearError> {
    fit_bayesian_ridge_within(x, y, MAX_ITERATIONS)
}

/// Bayesian ridge with an explicit cap on evidence iterations.
pub fn fit_bayesian_ridge_within(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    max_iterations: usize,
) -> Result<BayesianRidgeFit, LinearError> {
    let centered = Centered::new(x, y)?;
    let spectrum = GramSpectrum::of(&centered.x)?;
    let n = centered.n_rows() as f64;

    let variance = centered.y.dot(&centered.y) / n;
    let mut alpha = 1.0 / (variance + f64::EPSILON);
    let mut lambda = 1.0;
    let mut previous = None;
    let mut iterations = 0;
    let mut converged = false;

    for iteration in 0..max_iterations {
        iterations = iteration + 1;
        let ratio = lambda / alpha;
        let coefficients =
            spectrum.filtered_solution(&centered.x, &centered.y, |s| 1.0 / (s + ratio));
        let residual = &centered.y - &centered.x.dot(&coefficients);
        let rss = residual.dot(&residual);

        let gamma: f64 = spectrum
            .eigenvalues
            .iter()
            .map(|&s| alpha * s / (lambda + alpha * s))
            .sum();
        lambda = (gamma + 2.0 * LAMBDA_SHAPE)
            / (coefficients.dot(&coefficients) + 2.0 * LAMBDA_RATE);
        alpha = (n - gamma + 2.0 * ALPHA_SHAPE) / (rss + 2.0 * ALPHA_RATE);

        converged = previous
            .as_ref()
            .map(|old: &ndarray::Array1<f64>| (old - &coefficients).mapv(f64::abs).sum() < TOLERANCE)
            .unwrap_or(false);
        previous = Some(coefficients);
        if converged {
            debug!("Bayesian ridge converged after {iterations} iterations.");
            break;
        }
    }
    if !converged {
        warn!("Bayesian ridge stopped at the iteration limit of {max_iterations}.");
    }

    let ratio = lambda / alpha;
    let coefficients =
        spectrum.filtered_solution(&centered.x, &centered.y, |s| 1.0 / (s + ratio));
    Ok(BayesianRidgeFit {
        fit: centered.finish(coefficients),
        alpha,
        lambda,
        iterations,
        converged,
    })
}
