//! # Cross-Validated Model Comparison
//!
//! Everything above a single fit: loading marker and phenotype tables, splitting them
//! into folds, scoring each predictor by correlation with held-out truth, persisting
//! the per-configuration summaries in a shelf and turning shelved results into a
//! comparison report.

pub mod data;
pub mod experiment;
pub mod folds;
pub mod runner;
pub mod shelf;
pub mod stats;
pub mod summary;

use thiserror::Error;

use crate::linear::LinearError;
use crate::trainer::TrainingError;
use data::DataError;
use shelf::ShelfError;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Network training failed: {0}")]
    Training(#[from] TrainingError),

    #[error("Linear model failed: {0}")]
    Linear(#[from] LinearError),

    #[error(transparent)]
    Shelf(#[from] ShelfError),

    #[error("Could not write the report: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid experiment file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unrecognized predictor '{0}'. Expected forms like rr_alpha=101, lasso_alpha=0.1, en_alpha=0.1, brr, ols, nn_hidden=5 or bp_hidden=5.")]
    UnknownPredictor(String),

    #[error("Cross-validation needs at least 2 folds and 1 run, got {folds} folds and {runs} runs.")]
    InvalidCrossValidation { folds: usize, runs: usize },

    #[error("Cannot split {rows} rows into {folds} folds.")]
    TooFewRowsForFolds { rows: usize, folds: usize },

    #[error("No predictors were given.")]
    NoPredictors,
}
