//! Lasso and elastic net by cyclic coordinate descent.
//!
//! Objective, with `ρ` the l1 ratio:
//!
//! ```text
//! (1 / 2n) ||y - Xw||² + α ρ ||w||₁ + (α (1 - ρ) / 2) ||w||²
//! ```
//!
//! The lasso is the `ρ = 1` case.

use log::debug;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis, Zip};

use super::{Centered, LinearError, LinearFit, check_alpha};

pub const MAX_SWEEPS: usize = 1000;
pub const TOLERANCE: f64 = 1e-4;
pub const DEFAULT_L1_RATIO: f64 = 0.5;

pub fn fit_lasso(x: ArrayView2<f64>, y: ArrayView1<f64>, alpha: f64) -> Result<LinearFit, LinearError> {
    fit_elastic_net(x, y, alpha, 1.0)
}

pub fn fit_elastic_net(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    alpha: f64,
    l1_ratio: f64,
) -> Result<LinearFit, LinearError> {
    check_alpha(alpha)?;
    if !(0.0..=1.0).contains(&l1_ratio) {
        return Err(LinearError::InvalidL1Ratio(l1_ratio));
    }
    let centered = Centered::new(x, y)?;
    let coefficients = coordinate_descent(&centered, alpha, l1_ratio);
    Ok(centered.finish(coefficients))
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

fn coordinate_descent(data: &Centered, alpha: f64, l1_ratio: f64) -> Array1<f64> {
    let n = data.n_rows() as f64;
    let l1_penalty = alpha * l1_ratio * n;
    let l2_penalty = alpha * (1.0 - l1_ratio) * n;
    let column_norms = data.x.map_axis(Axis(0), |column| column.dot(&column));

    let mut weights = Array1::<f64>::zeros(data.n_features());
    let mut residual = data.y.clone();

    for sweep in 0..MAX_SWEEPS {
        let mut max_change = 0.0_f64;
        let mut max_weight = 0.0_f64;
        for (j, column) in data.x.axis_iter(Axis(1)).enumerate() {
            let norm = column_norms[j];
            if norm == 0.0 {
                continue;
            }
            let old = weights[j];
            let rho = column.dot(&residual) + norm * old;
            let new = soft_threshold(rho, l1_penalty) / (norm + l2_penalty);
            if new != old {
                let delta = new - old;
                Zip::from(&mut residual)
                    .and(&column)
                    .for_each(|r, &c| *r -= c * delta);
                weights[j] = new;
            }
            max_change = max_change.max((new - old).abs());
            max_weight = max_weight.max(new.abs());
        }
        if max_weight == 0.0 || max_change / max_weight < TOLERANCE {
            debug!("Coordinate descent converged after {} sweeps.", sweep + 1);
            break;
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::test_support::noiseless;
    use approx::assert_abs_diff_eq;

    #[test]
    fn soft_threshold_shrinks_toward_zero() {
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-3.0, 1.0), -2.0);
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
    }

    #[test]
    fn tiny_alpha_recovers_noiseless_coefficients() {
        let truth = [1.0, -0.5, 2.0, 0.0];
        let (x, y) = noiseless(80, &truth, 11);
        let fit = fit_lasso(x.view(), y.view(), 1e-6).unwrap();
        for (estimate, expected) in fit.coefficients.iter().zip(truth) {
            assert_abs_diff_eq!(*estimate, expected, epsilon = 1e-2);
        }
        assert_abs_diff_eq!(fit.intercept, 2.0, epsilon = 1e-2);
    }

    #[test]
    fn large_alpha_zeroes_every_coefficient() {
        let (x, y) = noiseless(40, &[1.0, -1.0, 0.5], 12);
        let fit = fit_lasso(x.view(), y.view(), 1e3).unwrap();
        assert!(fit.coefficients.iter().all(|&w| w == 0.0));
        assert_abs_diff_eq!(fit.intercept, y.mean().unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn lasso_drops_irrelevant_markers() {
        let (x, y) = noiseless(100, &[2.0, 0.0, 0.0, -2.0, 0.0], 13);
        let fit = fit_lasso(x.view(), y.view(), 0.1).unwrap();
        assert_eq!(fit.coefficients[1], 0.0);
        assert_eq!(fit.coefficients[2], 0.0);
        assert_eq!(fit.coefficients[4], 0.0);
        assert!(fit.coefficients[0] > 1.0);
        assert!(fit.coefficients[3] < -1.0);
    }

    #[test]
    fn elastic_net_shrinks_without_flipping_signs() {
        let (x, y) = noiseless(50, &[1.5, -1.0], 14);
        let net = fit_elastic_net(x.view(), y.view(), 0.05, DEFAULT_L1_RATIO).unwrap();
        let unpenalized = fit_elastic_net(x.view(), y.view(), 0.0, DEFAULT_L1_RATIO).unwrap();
        assert!(net.coefficients[0].abs() < unpenalized.coefficients[0].abs());
        assert!(net.coefficients[0] > 0.0);
    }

    #[test]
    fn invalid_l1_ratio_is_rejected() {
        let (x, y) = noiseless(10, &[1.0], 15);
        assert!(matches!(
            fit_elastic_net(x.view(), y.view(), 0.1, 1.5),
            Err(LinearError::InvalidL1Ratio(_))
        ));
    }
}
