//! # Cross-Validation Runner
//!
//! Evaluates a list of named predictors on the same folds. Every `(run, fold)` pair is
//! an independent job; jobs run in parallel and each fits every predictor on its
//! training rows and correlates the predictions with the held-out truth.

use std::collections::BTreeMap;
use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use log::info;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;

use super::AnalysisError;
use super::data::Dataset;
use super::folds::{CrossValidation, FoldJob, split};
use super::shelf::{ConfigAccuracy, OptimizationResult};
use super::stats::{mean, pearson, std_dev};
use crate::config::{BackpropConfig, NetworkConfig, RunSettings};
use crate::linear::LinearMethod;
use crate::linear::ridge::default_alpha_grid;
use crate::linear::sparse::DEFAULT_L1_RATIO;
use crate::prediction::{predict_with_convergence_network, predict_with_network};

/// What to fit on each training split.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictorSpec {
    Linear(LinearMethod),
    Network(NetworkConfig),
    ConvergenceNetwork(BackpropConfig),
}

/// A predictor and the label its accuracies are reported under.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedPredictor {
    pub name: String,
    pub spec: PredictorSpec,
}

impl NamedPredictor {
    /// Hidden-layer widths of network predictors; empty for linear ones.
    pub fn hidden(&self) -> Vec<usize> {
        match &self.spec {
            PredictorSpec::Linear(_) => Vec::new(),
            PredictorSpec::Network(config) => config.hidden_layers.clone(),
            PredictorSpec::ConvergenceNetwork(config) => config.hidden_layers.clone(),
        }
    }

    /// Model family code used as the shelf name.
    pub fn model_code(&self) -> &'static str {
        match &self.spec {
            PredictorSpec::Linear(method) => method.code(),
            PredictorSpec::Network(_) => "N",
            PredictorSpec::ConvergenceNetwork(_) => "NBP",
        }
    }

    fn predict(
        &self,
        train_x: &Array2<f64>,
        train_y: &Array1<f64>,
        test_x: &Array2<f64>,
        seed: u64,
    ) -> Result<Array1<f64>, AnalysisError> {
        match &self.spec {
            PredictorSpec::Linear(method) => {
                let fit = method.fit(train_x.view(), train_y.view())?;
                Ok(fit.predict(test_x.view())?)
            }
            PredictorSpec::Network(config) => {
                let settings = RunSettings {
                    collect_time_stats: false,
                    seed,
                };
                let run = predict_with_network(
                    train_x.view(),
                    train_y.view(),
                    test_x.view(),
                    config,
                    settings,
                )?;
                Ok(run.predictions)
            }
            PredictorSpec::ConvergenceNetwork(config) => {
                let (predictions, _) = predict_with_convergence_network(
                    train_x.view(),
                    train_y.view(),
                    test_x.view(),
                    config,
                    seed,
                )?;
                Ok(predictions)
            }
        }
    }
}

fn parse_number(text: &str, raw: &str) -> Result<f64, AnalysisError> {
    text.parse::<f64>()
        .map_err(|_| AnalysisError::UnknownPredictor(raw.to_string()))
}

fn parse_hidden(text: &str, raw: &str) -> Result<Vec<usize>, AnalysisError> {
    text.split(',')
        .map(|width| {
            width
                .trim()
                .parse::<usize>()
                .map_err(|_| AnalysisError::UnknownPredictor(raw.to_string()))
        })
        .collect()
}

/// Parses a predictor name such as `rr_alpha=101` or `nn_hidden=8,4`. Network
/// predictors start from the given base configurations.
pub fn parse_predictor(
    text: &str,
    network_base: &NetworkConfig,
    backprop_base: &BackpropConfig,
) -> Result<NamedPredictor, AnalysisError> {
    let raw = text.trim();
    let spec = match raw.split_once('=') {
        Some(("rr_alpha", value)) => PredictorSpec::Linear(LinearMethod::Ridge {
            alpha: parse_number(value, raw)?,
        }),
        Some(("lasso_alpha", value)) => PredictorSpec::Linear(LinearMethod::Lasso {
            alpha: parse_number(value, raw)?,
        }),
        Some(("en_alpha", value)) => PredictorSpec::Linear(LinearMethod::ElasticNet {
            alpha: parse_number(value, raw)?,
            l1_ratio: DEFAULT_L1_RATIO,
        }),
        Some(("nn_hidden", value)) => PredictorSpec::Network(
            network_base
                .clone()
                .with_hidden_layers(&parse_hidden(value, raw)?),
        ),
        Some(("bp_hidden", value)) => PredictorSpec::ConvergenceNetwork(
            backprop_base
                .clone()
                .with_hidden_layers(&parse_hidden(value, raw)?),
        ),
        None if raw == "brr" => PredictorSpec::Linear(LinearMethod::BayesianRidge),
        None if raw == "ols" => PredictorSpec::Linear(LinearMethod::Ols),
        _ => return Err(AnalysisError::UnknownPredictor(raw.to_string())),
    };
    Ok(NamedPredictor {
        name: raw.to_string(),
        spec,
    })
}

/// The ridge predictors `rr_alpha=1`, `rr_alpha=101`, ..., `rr_alpha=9901`.
pub fn ridge_grid() -> Vec<NamedPredictor> {
    default_alpha_grid()
        .into_iter()
        .map(|alpha| NamedPredictor {
            name: format!("rr_alpha={alpha}"),
            spec: PredictorSpec::Linear(LinearMethod::Ridge { alpha }),
        })
        .collect()
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };
    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) = ProgressStyle::with_template(
        "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} folds ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());
    pb
}

fn run_job(
    dataset: &Dataset,
    predictors: &[NamedPredictor],
    cv: &CrossValidation,
    job: FoldJob,
) -> Result<Vec<f64>, AnalysisError> {
    let assignment = cv.assign(dataset.n_samples(), job.run);
    let rows = split(&assignment, job.fold);
    let train_x = dataset.markers.select(Axis(0), &rows.train);
    let train_y = dataset.phenotype.select(Axis(0), &rows.train);
    let test_x = dataset.markers.select(Axis(0), &rows.test);
    let test_y = dataset.phenotype.select(Axis(0), &rows.test);
    let seed = job.seed(cv.seed);

    predictors
        .iter()
        .map(|predictor| {
            let predictions = predictor.predict(&train_x, &train_y, &test_x, seed)?;
            Ok(pearson(&predictions.to_vec(), &test_y.to_vec()))
        })
        .collect()
}

/// Accuracy of every predictor in every job, indexed `[predictor][job]`.
pub fn run_predictors(
    dataset: &Dataset,
    predictors: &[NamedPredictor],
    cv: &CrossValidation,
) -> Result<Vec<Vec<f64>>, AnalysisError> {
    if predictors.is_empty() {
        return Err(AnalysisError::NoPredictors);
    }
    cv.validate(dataset.n_samples())?;
    let jobs = cv.jobs();
    info!(
        "Evaluating {} predictors over {} folds x {} runs on {} samples.",
        predictors.len(),
        cv.folds,
        cv.runs,
        dataset.n_samples()
    );

    let pb = create_progress_bar(jobs.len() as u64, &dataset.trait_name);
    let per_job: Vec<Vec<f64>> = jobs
        .par_iter()
        .map(|&job| {
            let accuracies = run_job(dataset, predictors, cv, job);
            pb.inc(1);
            accuracies
        })
        .collect::<Result<_, _>>()?;
    pb.finish_and_clear();

    Ok((0..predictors.len())
        .map(|p| per_job.iter().map(|job| job[p]).collect())
        .collect())
}

/// Runs the predictors and summarizes each one's accuracies.
pub fn optimize(
    dataset: &Dataset,
    predictors: &[NamedPredictor],
    cv: &CrossValidation,
) -> Result<OptimizationResult, AnalysisError> {
    let accuracies = run_predictors(dataset, predictors, cv)?;
    let rows = predictors
        .iter()
        .zip_eq(accuracies)
        .map(|(predictor, raw_results)| ConfigAccuracy {
            label: predictor.name.clone(),
            hidden: predictor.hidden(),
            mean: mean(&raw_results),
            std_dev: std_dev(&raw_results),
            raw_results,
        })
        .collect();
    Ok(OptimizationResult {
        folds: cv.folds,
        runs: cv.runs,
        rows,
    })
}

/// Splits a combined optimization into one result per model code, keeping each
/// model's rows in predictor order.
pub fn split_by_model(
    predictors: &[NamedPredictor],
    result: &OptimizationResult,
) -> BTreeMap<&'static str, OptimizationResult> {
    let mut by_model: BTreeMap<&'static str, OptimizationResult> = BTreeMap::new();
    for (predictor, row) in predictors.iter().zip(&result.rows) {
        by_model
            .entry(predictor.model_code())
            .or_insert_with(|| OptimizationResult {
                folds: result.folds,
                runs: result.runs,
                rows: Vec::new(),
            })
            .rows
            .push(row.clone());
    }
    by_model
}
