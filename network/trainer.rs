//! # Training Loops
//!
//! Two ways to fit a [`Network`]:
//!
//! - [`train_epochs`]: a fixed number of shuffled mini-batch epochs at the scheduled
//!   learning rate. Used for probe training, full training and timing runs.
//! - [`train_until_convergence`]: online updates with a held-out validation split,
//!   stopping once validation loss stalls and restoring the best parameters seen.
//!
//! Both record the per-epoch training loss in a [`LossHistory`].

use log::debug;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use thiserror::Error;

use crate::config::{BackpropConfig, ConfigError};
use crate::model::{Network, mean_squared_error};
use crate::optimizer::Optimizer;
use crate::scaler::ScalerError;
use crate::schedule::LearningRateSchedule;

/// Epoch budget of a timing run, independent of the configured count.
pub const TIMING_EPOCHS: usize = 12_000;

/// Epochs each candidate trains before selection.
pub const PROBE_EPOCHS: usize = 100;

/// Number of mini-batches per epoch.
pub const BATCHES_PER_EPOCH: usize = 4;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Training requires at least one row and one marker column.")]
    EmptyInput,

    #[error("Marker matrix has {rows} rows but {targets} targets were given.")]
    RowMismatch { rows: usize, targets: usize },

    #[error("Network expects {expected} markers but the input has {found}.")]
    FeatureMismatch { expected: usize, found: usize },

    #[error("All {candidates} candidate networks reported a non-finite probe loss.")]
    AllCandidatesDiverged { candidates: usize },

    #[error("Validation loss was never finite in {epochs} epochs of convergence training.")]
    ValidationDiverged { epochs: usize },

    #[error("Invalid network configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Target scaling failed: {0}")]
    Scaler(#[from] ScalerError),
}

/// Training loss after every epoch, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LossHistory {
    losses: Vec<f64>,
}

impl LossHistory {
    pub fn push(&mut self, loss: f64) {
        self.losses.push(loss);
    }

    pub fn last(&self) -> Option<f64> {
        self.losses.last().copied()
    }

    pub fn len(&self) -> usize {
        self.losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.losses.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.losses
    }
}

/// Checks that `x` and `y` describe the same non-empty set of rows.
pub fn check_training_data(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), TrainingError> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(TrainingError::EmptyInput);
    }
    if x.nrows() != y.len() {
        return Err(TrainingError::RowMismatch {
            rows: x.nrows(),
            targets: y.len(),
        });
    }
    Ok(())
}

/// Checks that `x` has the width `network` was built for.
pub fn check_features(network: &Network, x: ArrayView2<f64>) -> Result<(), TrainingError> {
    if network.n_features() != x.ncols() {
        return Err(TrainingError::FeatureMismatch {
            expected: network.n_features(),
            found: x.ncols(),
        });
    }
    Ok(())
}

/// Rows per mini-batch: a quarter of the data, never fewer than one.
pub fn batch_size(n_rows: usize) -> usize {
    (n_rows / BATCHES_PER_EPOCH).max(1)
}

/// How a fixed-epoch run proceeds.
#[derive(Debug, Clone, Copy)]
pub struct EpochPlan {
    pub schedule: LearningRateSchedule,
    pub batch_size: usize,
    pub verbose: bool,
}

impl EpochPlan {
    pub fn new(initial_learning_rate: f64, epochs: usize, n_rows: usize) -> Self {
        Self {
            schedule: LearningRateSchedule::new(initial_learning_rate, epochs),
            batch_size: batch_size(n_rows),
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Trains for every epoch of `plan.schedule`, shuffling rows each epoch.
///
/// The recorded loss of an epoch is the row-weighted mean of its batch losses, each
/// including the weight penalty.
pub fn train_epochs<O, R>(
    network: &mut Network,
    optimizer: &mut O,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    plan: &EpochPlan,
    rng: &mut R,
) -> LossHistory
where
    O: Optimizer + ?Sized,
    R: Rng + ?Sized,
{
    let n_rows = x.nrows();
    let total = plan.schedule.total_epochs();
    let mut order: Vec<usize> = (0..n_rows).collect();
    let mut history = LossHistory::default();

    for epoch in 0..total {
        let learning_rate = plan.schedule.rate(epoch);
        order.shuffle(rng);
        let mut weighted_loss = 0.0;
        for batch in order.chunks(plan.batch_size) {
            let batch_x = x.select(Axis(0), batch);
            let batch_y = y.select(Axis(0), batch);
            let (loss, gradients) =
                network.loss_and_gradients(batch_x.view(), batch_y.view(), rng);
            optimizer.step(network, &gradients, learning_rate);
            weighted_loss += loss * batch.len() as f64;
        }
        let epoch_loss = weighted_loss / n_rows as f64;
        if plan.verbose {
            debug!(
                "Epoch {}/{}: loss {:.6}, learning rate {:.3e}",
                epoch + 1,
                total,
                epoch_loss,
                learning_rate
            );
        }
        history.push(epoch_loss);
    }
    history
}

/// Outcome of a convergence-stopped run.
#[derive(Debug, Clone)]
pub struct ConvergenceOutcome {
    pub history: LossHistory,
    pub validation: LossHistory,
    /// Epoch (one-based) whose parameters were kept.
    pub best_epoch: usize,
}

/// Online training with early stopping on a validation split.
///
/// Rows are shuffled once and the last `validation_proportion` of them held out. Each
/// epoch updates on the remaining rows one at a time. Training stops after
/// `continue_epochs` epochs without a new validation minimum, or at `max_epochs`, and
/// the parameters of the best validation epoch are restored. With
/// `try_convergence = false` all rows train for exactly `max_epochs`.
///
/// Non-finite validation losses never count as a minimum. A run that sees no finite
/// validation loss fails with [`TrainingError::ValidationDiverged`].
pub fn train_until_convergence<O, R>(
    network: &mut Network,
    optimizer: &mut O,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    config: &BackpropConfig,
    rng: &mut R,
) -> Result<ConvergenceOutcome, TrainingError>
where
    O: Optimizer + ?Sized,
    R: Rng + ?Sized,
{
    let mut order: Vec<usize> = (0..x.nrows()).collect();
    order.shuffle(rng);

    let n_validation = ((x.nrows() as f64) * config.validation_proportion).round() as usize;
    // Convergence needs rows on both sides of the split.
    let split = config.try_convergence && n_validation > 0 && n_validation < x.nrows();
    let (train_rows, validation_rows) = if split {
        order.split_at(x.nrows() - n_validation)
    } else {
        (order.as_slice(), &order[..0])
    };

    let train_x = x.select(Axis(0), train_rows);
    let train_y = y.select(Axis(0), train_rows);
    let validation_x = x.select(Axis(0), validation_rows);
    let validation_y = y.select(Axis(0), validation_rows);

    let mut history = LossHistory::default();
    let mut validation = LossHistory::default();
    let mut best = (f64::INFINITY, network.clone(), 0usize);
    let mut rows: Vec<usize> = (0..train_rows.len()).collect();

    for epoch in 1..=config.max_epochs {
        rows.shuffle(rng);
        let mut total_loss = 0.0;
        for &row in &rows {
            let sample_x = train_x.select(Axis(0), &[row]);
            let sample_y = Array1::from_elem(1, train_y[row]);
            let (loss, gradients) =
                network.loss_and_gradients(sample_x.view(), sample_y.view(), rng);
            optimizer.step(network, &gradients, config.learning_rate);
            total_loss += loss;
        }
        history.push(total_loss / rows.len().max(1) as f64);

        if !split {
            continue;
        }
        let predictions = network.predict(validation_x.view());
        let validation_loss = mean_squared_error(predictions.view(), validation_y.view());
        validation.push(validation_loss);
        if validation_loss.is_finite() && validation_loss < best.0 {
            best = (validation_loss, network.clone(), epoch);
        } else if epoch - best.2 >= config.continue_epochs {
            debug!(
                "Validation loss has not improved for {} epochs; stopping at epoch {epoch}.",
                config.continue_epochs
            );
            break;
        }
    }

    let best_epoch = if split {
        if best.2 == 0 {
            return Err(TrainingError::ValidationDiverged {
                epochs: validation.len(),
            });
        }
        *network = best.1;
        best.2
    } else {
        history.len()
    };
    Ok(ConvergenceOutcome {
        history,
        validation,
        best_epoch,
    })
}

/// Wall-clock fitting time of a timing run, printed as one JSON line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingReport {
    pub seconds: f64,
    pub hidden: Vec<usize>,
}
