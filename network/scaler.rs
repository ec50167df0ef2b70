//! # Target Scaling
//!
//! Networks are trained on targets mapped into a range that suits their activations,
//! and their outputs are mapped back to the trait scale before anyone sees them.
//!
//! Scalers only come into existence through `fit`, on training targets, so an
//! unfitted scaler cannot be used and test targets never leak into the parameters.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The range the Nadam network is trained in.
pub const NETWORK_TARGET_RANGE: (f64, f64) = (-1.0, 1.0);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScalerError {
    #[error("Cannot fit a scaler on an empty target vector.")]
    EmptyTargets,

    #[error("Training targets contain a non-finite value at position {0}.")]
    NonFiniteTarget(usize),

    #[error("Invalid feature range ({0}, {1}); the lower bound must be below the upper bound.")]
    InvalidRange(f64, f64),
}

/// A fitted, invertible transform of the regression target.
pub trait TargetScaler {
    fn transform(&self, values: ArrayView1<f64>) -> Array1<f64>;

    fn inverse_transform(&self, values: ArrayView1<f64>) -> Array1<f64>;
}

/// Linear map from the observed `[min, max]` of the training targets onto a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    data_min: f64,
    data_max: f64,
    scale: f64,
    offset: f64,
}

impl MinMaxScaler {
    pub fn fit(targets: ArrayView1<f64>, range: (f64, f64)) -> Result<Self, ScalerError> {
        let (low, high) = range;
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(ScalerError::InvalidRange(low, high));
        }
        check_targets(targets)?;

        let data_min = targets.fold(f64::INFINITY, |acc, &v| acc.min(v));
        let data_max = targets.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        // A constant target maps onto the lower bound instead of dividing by zero.
        let data_range = match data_max - data_min {
            span if span > 0.0 => span,
            _ => 1.0,
        };
        let scale = (high - low) / data_range;
        let offset = low - data_min * scale;

        Ok(Self {
            data_min,
            data_max,
            scale,
            offset,
        })
    }

    pub fn data_min(&self) -> f64 {
        self.data_min
    }

    pub fn data_max(&self) -> f64 {
        self.data_max
    }
}

impl TargetScaler for MinMaxScaler {
    fn transform(&self, values: ArrayView1<f64>) -> Array1<f64> {
        values.mapv(|v| v * self.scale + self.offset)
    }

    fn inverse_transform(&self, values: ArrayView1<f64>) -> Array1<f64> {
        values.mapv(|v| (v - self.offset) / self.scale)
    }
}

/// Centers on the training mean and divides by the population standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: f64,
    sd: f64,
}

impl StandardScaler {
    pub fn fit(targets: ArrayView1<f64>) -> Result<Self, ScalerError> {
        check_targets(targets)?;
        let n = targets.len() as f64;
        let mean = targets.sum() / n;
        let variance = targets.fold(0.0, |acc, &v| acc + (v - mean).powi(2)) / n;
        let sd = match variance.sqrt() {
            sd if sd > 0.0 => sd,
            _ => 1.0,
        };
        Ok(Self { mean, sd })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sd(&self) -> f64 {
        self.sd
    }
}

impl TargetScaler for StandardScaler {
    fn transform(&self, values: ArrayView1<f64>) -> Array1<f64> {
        values.mapv(|v| (v - self.mean) / self.sd)
    }

    fn inverse_transform(&self, values: ArrayView1<f64>) -> Array1<f64> {
        values.mapv(|v| v * self.sd + self.mean)
    }
}

fn check_targets(targets: ArrayView1<f64>) -> Result<(), ScalerError> {
    if targets.is_empty() {
        return Err(ScalerError::EmptyTargets);
    }
    match targets.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(ScalerError::NonFiniteTarget(index)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn min_max_maps_training_extremes_onto_the_range() {
        let y = array![3.0, 7.0, 5.0, 11.0];
        let scaler = MinMaxScaler::fit(y.view(), NETWORK_TARGET_RANGE).unwrap();
        let scaled = scaler.transform(y.view());
        assert_abs_diff_eq!(scaled[0], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scaled[3], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scaled[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn forward_then_inverse_reproduces_targets() {
        let y = array![-12.5, 0.0, 3.25, 1e4, 17.0, -0.001];
        let min_max = MinMaxScaler::fit(y.view(), NETWORK_TARGET_RANGE).unwrap();
        let standard = StandardScaler::fit(y.view()).unwrap();

        let back = min_max.inverse_transform(min_max.transform(y.view()).view());
        for (a, b) in back.iter().zip(y.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }

        let back = standard.inverse_transform(standard.transform(y.view()).view());
        for (a, b) in back.iter().zip(y.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn values_outside_training_range_extrapolate_linearly() {
        let y = array![0.0, 10.0];
        let scaler = MinMaxScaler::fit(y.view(), (0.0, 1.0)).unwrap();
        let scaled = scaler.transform(array![20.0].view());
        assert_abs_diff_eq!(scaled[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_targets_do_not_divide_by_zero() {
        let y = array![4.0, 4.0, 4.0];
        let min_max = MinMaxScaler::fit(y.view(), NETWORK_TARGET_RANGE).unwrap();
        let scaled = min_max.transform(y.view());
        assert!(scaled.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(min_max.inverse_transform(scaled.view())[0], 4.0);

        let standard = StandardScaler::fit(y.view()).unwrap();
        assert_eq!(standard.sd(), 1.0);
        assert_abs_diff_eq!(standard.transform(y.view())[1], 0.0);
    }

    #[test]
    fn standard_scaler_uses_population_deviation() {
        let y = array![1.0, 2.0, 3.0, 4.0];
        let scaler = StandardScaler::fit(y.view()).unwrap();
        assert_abs_diff_eq!(scaler.mean(), 2.5);
        assert_abs_diff_eq!(scaler.sd(), 1.25_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn fitting_rejects_bad_input() {
        let empty: Array1<f64> = Array1::zeros(0);
        assert_eq!(
            MinMaxScaler::fit(empty.view(), NETWORK_TARGET_RANGE),
            Err(ScalerError::EmptyTargets)
        );
        let nan = array![1.0, f64::NAN];
        assert_eq!(
            StandardScaler::fit(nan.view()),
            Err(ScalerError::NonFiniteTarget(1))
        );
        let y = array![1.0, 2.0];
        assert_eq!(
            MinMaxScaler::fit(y.view(), (1.0, -1.0)),
            Err(ScalerError::InvalidRange(1.0, -1.0))
        );
    }
}
