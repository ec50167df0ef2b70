//! # Prediction Pipelines
//!
//! The entry points that take raw training markers and trait values, fit everything a
//! run needs and return predictions on the trait scale for held-out rows.
//!
//! Both pipelines fit their target scaler once, on the training targets, and invert it
//! on the way out. Callers never see network-scale values.

use std::time::Instant;

use log::{info, warn};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::candidate::select_initial_network;
use crate::config::{BackpropConfig, NetworkConfig, RunSettings};
use crate::model::Network;
use crate::optimizer::SgdMomentum;
use crate::plot::{DEFAULT_PLOT_HEIGHT, DEFAULT_PLOT_WIDTH, render_loss_curve};
use crate::scaler::{MinMaxScaler, NETWORK_TARGET_RANGE, StandardScaler, TargetScaler};
use crate::trainer::{
    ConvergenceOutcome, LossHistory, TIMING_EPOCHS, TimingReport, TrainingError, check_features,
    check_training_data, train_until_convergence,
};

/// Runs `network` on `x` and maps its outputs back through `scaler`.
pub fn predict<S: TargetScaler + ?Sized>(
    network: &Network,
    x: ArrayView2<f64>,
    scaler: &S,
) -> Result<Array1<f64>, TrainingError> {
    check_features(network, x)?;
    let raw = network.predict(x);
    Ok(scaler.inverse_transform(raw.view()))
}

/// Everything a Nadam network run produced besides its predictions.
#[derive(Debug, Clone)]
pub struct NetworkRun {
    pub predictions: Array1<f64>,
    pub selected_candidate: usize,
    pub probe_losses: Vec<f64>,
    pub history: LossHistory,
    /// Present when the run trained in timing mode.
    pub timing: Option<TimingReport>,
}

/// Fits a min/max-scaled Nadam network on the training rows and predicts `test_x`.
///
/// The best of several probed candidates is trained for `config.epochs`, or for
/// [`TIMING_EPOCHS`] when `settings.collect_time_stats` is set. In timing mode the
/// fitting time (probing included) is logged and printed as one JSON line.
pub fn predict_with_network(
    train_x: ArrayView2<f64>,
    train_y: ArrayView1<f64>,
    test_x: ArrayView2<f64>,
    config: &NetworkConfig,
    settings: RunSettings,
) -> Result<NetworkRun, TrainingError> {
    check_training_data(train_x, train_y)?;
    config.validate()?;
    let scaler = MinMaxScaler::fit(train_y, NETWORK_TARGET_RANGE)?;
    let scaled_y = scaler.transform(train_y);

    let start = Instant::now();
    let selection = select_initial_network(config, train_x, scaled_y.view(), settings.seed)?;
    let mut candidate = selection.candidate;

    let epochs = if settings.collect_time_stats {
        TIMING_EPOCHS
    } else {
        config.epochs
    };
    let history = candidate.train(
        train_x,
        scaled_y.view(),
        config.initial_learning_rate(),
        epochs,
        config.verbose,
    );

    let timing = settings.collect_time_stats.then(|| {
        let seconds = start.elapsed().as_secs_f64();
        info!("Fitting took {seconds} seconds");
        let report = TimingReport {
            seconds,
            hidden: config.hidden_layers.clone(),
        };
        match serde_json::to_string(&report) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Could not serialize the timing report: {e}"),
        }
        report
    });

    if config.plot {
        println!(
            "{}",
            render_loss_curve(&history, DEFAULT_PLOT_WIDTH, DEFAULT_PLOT_HEIGHT)
        );
    }

    let predictions = predict(&candidate.network, test_x, &scaler)?;
    Ok(NetworkRun {
        predictions,
        selected_candidate: selection.index,
        probe_losses: selection.probe_losses,
        history,
        timing,
    })
}

/// Fits a standardized-target network with online momentum updates and predicts
/// `test_x`. Training stops on validation convergence unless the configuration asks for
/// a fixed number of epochs.
pub fn predict_with_convergence_network(
    train_x: ArrayView2<f64>,
    train_y: ArrayView1<f64>,
    test_x: ArrayView2<f64>,
    config: &BackpropConfig,
    seed: u64,
) -> Result<(Array1<f64>, ConvergenceOutcome), TrainingError> {
    check_training_data(train_x, train_y)?;
    let scaler = StandardScaler::fit(train_y)?;
    let scaled_y = scaler.transform(train_y);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut network = Network::build_backprop(config, train_x.ncols(), &mut rng)?;
    let mut optimizer = SgdMomentum::new(&network, config.momentum, config.weight_decay);
    let outcome = train_until_convergence(
        &mut network,
        &mut optimizer,
        train_x,
        scaled_y.view(),
        config,
        &mut rng,
    )?;

    let predictions = predict(&network, test_x, &scaler)?;
    Ok((predictions, outcome))
}
