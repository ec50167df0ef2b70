//! Parameter update rules.
//!
//! Optimizer state (moments, velocities, step counters) lives outside the network, so
//! a candidate carries its optimizer from probe training into full training.

use ndarray::{Array, Dimension, Zip};

use crate::model::{Gradients, Network};

/// Applies one update to every parameter of a network.
pub trait Optimizer: Send {
    fn step(&mut self, network: &mut Network, gradients: &Gradients, learning_rate: f64);
}

/// First and second moments for one parameter tensor.
#[derive(Debug, Clone)]
struct Moments<D: Dimension> {
    first: Array<f64, D>,
    second: Array<f64, D>,
}

impl<D: Dimension> Moments<D> {
    fn zeros_like(param: &Array<f64, D>) -> Self {
        Self {
            first: Array::zeros(param.raw_dim()),
            second: Array::zeros(param.raw_dim()),
        }
    }
}

/// Coefficients shared by every tensor within one Nadam step.
struct NadamStep {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    momentum_cache: f64,
    momentum_cache_next: f64,
    schedule_new: f64,
    schedule_next: f64,
    beta2_power: f64,
}

impl NadamStep {
    fn apply<D: Dimension>(
        &self,
        param: &mut Array<f64, D>,
        grad: &Array<f64, D>,
        moments: &mut Moments<D>,
    ) {
        Zip::from(param)
            .and(grad)
            .and(&mut moments.first)
            .and(&mut moments.second)
            .for_each(|p, &g, m, v| {
                let g_prime = g / (1.0 - self.schedule_new);
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                let m_prime = *m / (1.0 - self.schedule_next);
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                let v_prime = *v / (1.0 - self.beta2_power);
                let m_bar =
                    (1.0 - self.momentum_cache) * g_prime + self.momentum_cache_next * m_prime;
                *p -= self.learning_rate * m_bar / (v_prime.sqrt() + self.epsilon);
            });
    }
}

/// Adam with Nesterov momentum and a warming momentum schedule.
#[derive(Debug, Clone)]
pub struct Nadam {
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    schedule_decay: f64,
    iterations: u64,
    momentum_schedule: f64,
    weights: Vec<Moments<ndarray::Ix2>>,
    biases: Vec<Option<Moments<ndarray::Ix1>>>,
}

impl Nadam {
    pub const BETA1: f64 = 0.9;
    pub const BETA2: f64 = 0.999;
    pub const EPSILON: f64 = 1e-8;
    pub const SCHEDULE_DECAY: f64 = 0.004;

    pub fn new(network: &Network) -> Self {
        let weights = network
            .layers()
            .iter()
            .map(|layer| Moments::zeros_like(&layer.weights))
            .collect();
        let biases = network
            .layers()
            .iter()
            .map(|layer| layer.bias.as_ref().map(Moments::zeros_like))
            .collect();
        Self {
            beta1: Self::BETA1,
            beta2: Self::BETA2,
            epsilon: Self::EPSILON,
            schedule_decay: Self::SCHEDULE_DECAY,
            iterations: 0,
            momentum_schedule: 1.0,
            weights,
            biases,
        }
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }
}

impl Optimizer for Nadam {
    fn step(&mut self, network: &mut Network, gradients: &Gradients, learning_rate: f64) {
        self.iterations += 1;
        let t = self.iterations as f64;
        let momentum_cache = self.beta1 * (1.0 - 0.5 * 0.96_f64.powf(t * self.schedule_decay));
        let momentum_cache_next =
            self.beta1 * (1.0 - 0.5 * 0.96_f64.powf((t + 1.0) * self.schedule_decay));
        let schedule_new = self.momentum_schedule * momentum_cache;
        let schedule_next = schedule_new * momentum_cache_next;
        self.momentum_schedule = schedule_new;

        let coefficients = NadamStep {
            learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            momentum_cache,
            momentum_cache_next,
            schedule_new,
            schedule_next,
            beta2_power: self.beta2.powf(t),
        };

        let layers = network.layers_mut();
        for (index, layer) in layers.iter_mut().enumerate() {
            coefficients.apply(
                &mut layer.weights,
                &gradients.weights[index],
                &mut self.weights[index],
            );
            if let (Some(bias), Some(grad), Some(moments)) = (
                layer.bias.as_mut(),
                gradients.biases[index].as_ref(),
                self.biases[index].as_mut(),
            ) {
                coefficients.apply(bias, grad, moments);
            }
        }
    }
}

/// Stochastic gradient descent with classical momentum and multiplicative weight decay.
#[derive(Debug, Clone)]
pub struct SgdMomentum {
    momentum: f64,
    decay: f64,
    weight_velocity: Vec<ndarray::Array2<f64>>,
    bias_velocity: Vec<Option<ndarray::Array1<f64>>>,
}

impl SgdMomentum {
    pub fn new(network: &Network, momentum: f64, decay: f64) -> Self {
        let weight_velocity = network
            .layers()
            .iter()
            .map(|layer| ndarray::Array2::zeros(layer.weights.raw_dim()))
            .collect();
        let bias_velocity = network
            .layers()
            .iter()
            .map(|layer| layer.bias.as_ref().map(|b| ndarray::Array1::zeros(b.raw_dim())))
            .collect();
        Self {
            momentum,
            decay,
            weight_velocity,
            bias_velocity,
        }
    }
}

fn momentum_update<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    velocity: &mut Array<f64, D>,
    momentum: f64,
    learning_rate: f64,
    decay: f64,
) {
    Zip::from(param)
        .and(grad)
        .and(velocity)
        .for_each(|p, &g, v| {
            *v = momentum * *v - learning_rate * g;
            *p = (*p + *v) * (1.0 - decay);
        });
}

impl Optimizer for SgdMomentum {
    fn step(&mut self, network: &mut Network, gradients: &Gradients, learning_rate: f64) {
        let layers = network.layers_mut();
        for (index, layer) in layers.iter_mut().enumerate() {
            momentum_update(
                &mut layer.weights,
                &gradients.weights[index],
                &mut self.weight_velocity[index],
                self.momentum,
                learning_rate,
                self.decay,
            );
            if let (Some(bias), Some(grad), Some(velocity)) = (
                layer.bias.as_mut(),
                gradients.biases[index].as_ref(),
                self.bias_velocity[index].as_mut(),
            ) {
                momentum_update(
                    bias,
                    grad,
                    velocity,
                    self.momentum,
                    learning_rate,
                    self.decay,
                );
            }
        }
    }
}
