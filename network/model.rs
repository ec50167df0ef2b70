//! # Dense Feed-Forward Network
//!
//! The network is a stack of fully connected layers with sigmoid hidden activations and
//! a single linear output unit:
//!
//! ```text
//! markers in (-1, 1) -> (x + 1) / 2 -> [dense -> sigmoid -> dropout]* -> dense(1) -> output
//! ```
//!
//! Gradients are derived in closed form for this fixed topology and mean-squared-error
//! loss. Parameters are owned by the layers; optimizer state lives outside the network.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};

use crate::config::{BackpropConfig, ConfigError, NetworkConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Sigmoid,
    Linear,
}

impl Activation {
    fn apply(self, z: f64) -> f64 {
        match self {
            Activation::Sigmoid => 1.0 / (1.0 + (-z).exp()),
            Activation::Linear => z,
        }
    }

    /// Derivative expressed through the activation output `a`.
    fn derivative_from_output(self, a: f64) -> f64 {
        match self {
            Activation::Sigmoid => a * (1.0 - a),
            Activation::Linear => 1.0,
        }
    }
}

/// Penalty on dense kernels, added to the training loss.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Regularizer {
    pub l1: f64,
    pub l2: f64,
}

impl Regularizer {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn l1(coefficient: f64) -> Self {
        Self {
            l1: coefficient,
            l2: 0.0,
        }
    }

    fn is_active(&self) -> bool {
        self.l1 > 0.0 || self.l2 > 0.0
    }

    fn penalty(&self, weights: &Array2<f64>) -> f64 {
        let mut total = 0.0;
        if self.l1 > 0.0 {
            total += self.l1 * weights.fold(0.0, |acc, w| acc + w.abs());
        }
        if self.l2 > 0.0 {
            total += self.l2 * weights.fold(0.0, |acc, w| acc + w * w);
        }
        total
    }

    fn gradient(&self, weights: &Array2<f64>) -> Array2<f64> {
        let (l1, l2) = (self.l1, self.l2);
        weights.mapv(|w| {
            let sign = if w > 0.0 {
                1.0
            } else if w < 0.0 {
                -1.0
            } else {
                0.0
            };
            l1 * sign + 2.0 * l2 * w
        })
    }
}

/// A fully connected layer: `activation(x · W + b)`.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    pub(crate) weights: Array2<f64>,
    pub(crate) bias: Option<Array1<f64>>,
    activation: Activation,
    /// Whether the network's regularizer applies to this kernel.
    penalized: bool,
}

impl DenseLayer {
    /// Glorot-uniform kernel and zero bias.
    fn glorot<R: Rng + ?Sized>(
        fan_in: usize,
        fan_out: usize,
        with_bias: bool,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
        let weights = Array2::from_shape_simple_fn((fan_in, fan_out), || {
            rng.gen_range(-limit..limit)
        });
        let bias = with_bias.then(|| Array1::zeros(fan_out));
        Self {
            weights,
            bias,
            activation,
            penalized: activation == Activation::Sigmoid,
        }
    }

    pub fn fan_in(&self) -> usize {
        self.weights.nrows()
    }

    pub fn fan_out(&self) -> usize {
        self.weights.ncols()
    }

    pub fn weights(&self) -> ArrayView2<'_, f64> {
        self.weights.view()
    }

    pub fn has_bias(&self) -> bool {
        self.bias.is_some()
    }

    fn forward(&self, x: ArrayView2<f64>) -> Array2<f64> {
        let mut z = x.dot(&self.weights);
        if let Some(bias) = &self.bias {
            z += bias;
        }
        let activation = self.activation;
        z.mapv_inplace(|v| activation.apply(v));
        z
    }
}

/// Per-layer gradients, aligned with [`Network::layers`].
#[derive(Debug, Clone)]
pub struct Gradients {
    pub weights: Vec<Array2<f64>>,
    pub biases: Vec<Option<Array1<f64>>>,
}

/// Intermediate values of one training forward pass.
struct ForwardCache {
    /// Input of every layer; the last entry is the network output.
    inputs: Vec<Array2<f64>>,
    /// Activation output before dropout, for layers that saw dropout.
    pre_dropout: Vec<Option<Array2<f64>>>,
    masks: Vec<Option<Array2<f64>>>,
}

/// A built network with concrete parameters.
#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<DenseLayer>,
    hidden_layers: Vec<usize>,
    dropout_prob: f64,
    regularizer: Regularizer,
    rescale_input: bool,
}

impl Network {
    /// Builds the Nadam network described by `config` for `n_features` markers.
    pub fn build<R: Rng + ?Sized>(
        config: &NetworkConfig,
        n_features: usize,
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let regularizer = if config.weight_decay > 0.0 {
            Regularizer::l1(config.weight_decay)
        } else {
            Regularizer::none()
        };
        Ok(Self::assemble(
            &config.hidden_layers,
            n_features,
            false,
            config.dropout_prob,
            regularizer,
            true,
            rng,
        ))
    }

    /// Builds the backpropagation network described by `config`. It keeps an output
    /// bias because its targets are standardized rather than range-scaled.
    pub fn build_backprop<R: Rng + ?Sized>(
        config: &BackpropConfig,
        n_features: usize,
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::assemble(
            &config.hidden_layers,
            n_features,
            true,
            0.0,
            Regularizer::none(),
            false,
            rng,
        ))
    }

    fn assemble<R: Rng + ?Sized>(
        hidden_layers: &[usize],
        n_features: usize,
        output_bias: bool,
        dropout_prob: f64,
        regularizer: Regularizer,
        rescale_input: bool,
        rng: &mut R,
    ) -> Self {
        let mut layers = Vec::with_capacity(hidden_layers.len() + 1);
        let mut last_dim = n_features;
        for &width in hidden_layers {
            layers.push(DenseLayer::glorot(
                last_dim,
                width,
                true,
                Activation::Sigmoid,
                rng,
            ));
            last_dim = width;
        }
        layers.push(DenseLayer::glorot(
            last_dim,
            1,
            output_bias,
            Activation::Linear,
            rng,
        ));

        Self {
            layers,
            hidden_layers: hidden_layers.to_vec(),
            dropout_prob,
            regularizer,
            rescale_input,
        }
    }

    pub fn n_features(&self) -> usize {
        self.layers[0].fan_in()
    }

    pub fn hidden_layers(&self) -> &[usize] {
        &self.hidden_layers
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [DenseLayer] {
        &mut self.layers
    }

    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| layer.weights.len() + layer.bias.as_ref().map_or(0, |b| b.len()))
            .sum()
    }

    fn prepare_input(&self, x: ArrayView2<f64>) -> Array2<f64> {
        if self.rescale_input {
            x.mapv(|v| (v + 1.0) / 2.0)
        } else {
            x.to_owned()
        }
    }

    /// Inference pass; dropout is inactive.
    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let mut activation = self.prepare_input(x);
        for layer in &self.layers {
            activation = layer.forward(activation.view());
        }
        activation.index_axis_move(Axis(1), 0)
    }

    /// Penalty term of the loss for the current parameters. Only hidden kernels are
    /// penalized; the output unit is left free.
    pub fn penalty(&self) -> f64 {
        if !self.regularizer.is_active() {
            return 0.0;
        }
        self.layers
            .iter()
            .filter(|layer| layer.penalized)
            .map(|layer| self.regularizer.penalty(&layer.weights))
            .sum()
    }

    /// Mean squared error of the inference output plus the weight penalty.
    pub fn loss(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> f64 {
        let predictions = self.predict(x);
        mean_squared_error(predictions.view(), y) + self.penalty()
    }

    fn forward_train<R: Rng + ?Sized>(&self, x: ArrayView2<f64>, rng: &mut R) -> ForwardCache {
        let n_layers = self.layers.len();
        let mut inputs = Vec::with_capacity(n_layers + 1);
        let mut pre_dropout = Vec::with_capacity(n_layers);
        let mut masks = Vec::with_capacity(n_layers);
        inputs.push(self.prepare_input(x));

        // Bernoulli::new only fails for p outside [0, 1]; the config validated that.
        let keep = Bernoulli::new(1.0 - self.dropout_prob).ok();
        for (index, layer) in self.layers.iter().enumerate() {
            let output = layer.forward(inputs[index].view());
            let is_hidden = index + 1 < n_layers;
            match (&keep, is_hidden && self.dropout_prob > 0.0) {
                (Some(keep), true) => {
                    let scale = 1.0 / (1.0 - self.dropout_prob);
                    let mask = Array2::from_shape_simple_fn(output.raw_dim(), || {
                        if keep.sample(rng) { scale } else { 0.0 }
                    });
                    inputs.push(&output * &mask);
                    pre_dropout.push(Some(output));
                    masks.push(Some(mask));
                }
                _ => {
                    inputs.push(output);
                    pre_dropout.push(None);
                    masks.push(None);
                }
            }
        }

        ForwardCache {
            inputs,
            pre_dropout,
            masks,
        }
    }

    /// One training pass over a batch: returns the batch loss and its gradients.
    pub fn loss_and_gradients<R: Rng + ?Sized>(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        rng: &mut R,
    ) -> (f64, Gradients) {
        let cache = self.forward_train(x, rng);
        let n_layers = self.layers.len();
        let output = cache.inputs[n_layers].column(0);
        let n = y.len().max(1) as f64;

        let residual = &output - &y;
        let loss = residual.mapv(|r| r * r).sum() / n + self.penalty();

        let mut weight_grads = Vec::with_capacity(n_layers);
        let mut bias_grads = Vec::with_capacity(n_layers);
        let mut delta = residual.mapv(|r| 2.0 * r / n).insert_axis(Axis(1));

        for index in (0..n_layers).rev() {
            let layer = &self.layers[index];
            if let Some(mask) = &cache.masks[index] {
                delta *= mask;
            }
            let activated = cache.pre_dropout[index]
                .as_ref()
                .unwrap_or(&cache.inputs[index + 1]);
            let activation = layer.activation;
            if activation != Activation::Linear {
                delta.zip_mut_with(activated, |d, &a| {
                    *d *= activation.derivative_from_output(a)
                });
            }

            let mut grad_w = cache.inputs[index].t().dot(&delta);
            if layer.penalized && self.regularizer.is_active() {
                grad_w += &self.regularizer.gradient(&layer.weights);
            }
            let grad_b = layer.bias.as_ref().map(|_| delta.sum_axis(Axis(0)));

            if index > 0 {
                delta = delta.dot(&layer.weights.t());
            }
            weight_grads.push(grad_w);
            bias_grads.push(grad_b);
        }

        weight_grads.reverse();
        bias_grads.reverse();
        (
            loss,
            Gradients {
                weights: weight_grads,
                biases: bias_grads,
            },
        )
    }
}

pub fn mean_squared_error(predictions: ArrayView1<f64>, targets: ArrayView1<f64>) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let residual = &predictions - &targets;
    residual.mapv(|r| r * r).sum() / targets.len() as f64
}
