//! # Network Hyperparameters
//!
//! A configuration is a plain, immutable value. Building a network borrows it and
//! yields an independent [`Network`](crate::model::Network), so the same configuration
//! can seed any number of candidates without ever being tied to one of them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hidden-layer widths used when none are given.
pub const DEFAULT_HIDDEN_LAYERS: [usize; 1] = [5];

/// Epoch budget used when none is given.
pub const DEFAULT_EPOCHS: usize = 25;

/// Learning rate of the Nadam optimizer when the configuration leaves it unset.
pub const DEFAULT_NADAM_LEARNING_RATE: f64 = 0.002;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Hidden layer {index} has zero width. Every hidden layer needs at least one node.")]
    ZeroWidthLayer { index: usize },

    #[error("Weight decay must be finite and non-negative, got {0}.")]
    InvalidWeightDecay(f64),

    #[error("Dropout probability must lie in [0, 1), got {0}.")]
    InvalidDropout(f64),

    #[error("Learning rate must be finite and positive, got {0}.")]
    InvalidLearningRate(f64),

    #[error("Momentum must lie in [0, 1), got {0}.")]
    InvalidMomentum(f64),

    #[error("Validation proportion must lie in (0, 1), got {0}.")]
    InvalidValidationProportion(f64),

    #[error("The epoch budget must be at least 1.")]
    ZeroEpochs,
}

/// Hyperparameters of the Nadam-trained network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Widths of the hidden layers, input side first.
    pub hidden_layers: Vec<usize>,
    /// Coefficient of the weight penalty on every dense kernel.
    pub weight_decay: f64,
    /// Probability of dropping a hidden unit during training.
    pub dropout_prob: f64,
    /// Optimizer learning rate. `None` selects [`DEFAULT_NADAM_LEARNING_RATE`].
    pub learning_rate: Option<f64>,
    pub epochs: usize,
    /// Log the loss of every epoch at debug level.
    pub verbose: bool,
    /// Render the loss curve after full training.
    pub plot: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_layers: DEFAULT_HIDDEN_LAYERS.to_vec(),
            weight_decay: 0.0,
            dropout_prob: 0.0,
            learning_rate: None,
            epochs: DEFAULT_EPOCHS,
            verbose: false,
            plot: false,
        }
    }
}

impl NetworkConfig {
    pub fn with_hidden_layers(mut self, hidden_layers: &[usize]) -> Self {
        self.hidden_layers = hidden_layers.to_vec();
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn with_dropout(mut self, dropout_prob: f64) -> Self {
        self.dropout_prob = dropout_prob;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: Option<f64>) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_plot(mut self, plot: bool) -> Self {
        self.plot = plot;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The learning rate the optimizer starts from.
    pub fn initial_learning_rate(&self) -> f64 {
        self.learning_rate.unwrap_or(DEFAULT_NADAM_LEARNING_RATE)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_hidden_layers(&self.hidden_layers)?;
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(ConfigError::InvalidWeightDecay(self.weight_decay));
        }
        if !(self.dropout_prob.is_finite() && (0.0..1.0).contains(&self.dropout_prob)) {
            return Err(ConfigError::InvalidDropout(self.dropout_prob));
        }
        if let Some(rate) = self.learning_rate {
            validate_learning_rate(rate)?;
        }
        if self.epochs == 0 {
            return Err(ConfigError::ZeroEpochs);
        }
        Ok(())
    }
}

/// Hyperparameters of the online backpropagation network that stops on convergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackpropConfig {
    pub hidden_layers: Vec<usize>,
    /// Multiplicative decay applied to every parameter after each update.
    pub weight_decay: f64,
    pub learning_rate: f64,
    pub momentum: f64,
    /// Upper bound on training epochs, with or without convergence checks.
    pub max_epochs: usize,
    /// Epochs without validation improvement tolerated before stopping.
    pub continue_epochs: usize,
    /// Share of the training rows held out to monitor convergence.
    pub validation_proportion: f64,
    /// Stop on convergence instead of running exactly `max_epochs`.
    pub try_convergence: bool,
}

impl Default for BackpropConfig {
    fn default() -> Self {
        Self {
            hidden_layers: DEFAULT_HIDDEN_LAYERS.to_vec(),
            weight_decay: 0.0,
            learning_rate: 0.01,
            momentum: 0.5,
            max_epochs: 1000,
            continue_epochs: 10,
            validation_proportion: 0.25,
            try_convergence: true,
        }
    }
}

impl BackpropConfig {
    pub fn with_hidden_layers(mut self, hidden_layers: &[usize]) -> Self {
        self.hidden_layers = hidden_layers.to_vec();
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_hidden_layers(&self.hidden_layers)?;
        if !(self.weight_decay.is_finite() && (0.0..1.0).contains(&self.weight_decay)) {
            return Err(ConfigError::InvalidWeightDecay(self.weight_decay));
        }
        validate_learning_rate(self.learning_rate)?;
        if !(self.momentum.is_finite() && (0.0..1.0).contains(&self.momentum)) {
            return Err(ConfigError::InvalidMomentum(self.momentum));
        }
        if !(self.validation_proportion > 0.0 && self.validation_proportion < 1.0) {
            return Err(ConfigError::InvalidValidationProportion(
                self.validation_proportion,
            ));
        }
        if self.max_epochs == 0 {
            return Err(ConfigError::ZeroEpochs);
        }
        Ok(())
    }
}

/// Settings of one prediction run that are not network hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Train for the fixed timing budget and report the wall-clock fitting time.
    pub collect_time_stats: bool,
    /// Seed for candidate initialization, shuffling and dropout.
    pub seed: u64,
}

fn validate_hidden_layers(hidden_layers: &[usize]) -> Result<(), ConfigError> {
    match hidden_layers.iter().position(|&width| width == 0) {
        Some(index) => Err(ConfigError::ZeroWidthLayer { index }),
        None => Ok(()),
    }
}

fn validate_learning_rate(rate: f64) -> Result<(), ConfigError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidLearningRate(rate))
    }
}
