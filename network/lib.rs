#![deny(unused_variables)]
#![deny(unused_imports)]

//! Genomic prediction of continuous traits.
//!
//! The crate root holds the feed-forward network core: configuration, target scaling,
//! the dense network itself, its optimizers and learning-rate schedule, candidate
//! selection, training and prediction. Penalized linear models live in [`linear`] and
//! the cross-validation, shelving and reporting layer lives in [`analysis`].

pub mod candidate;
pub mod config;
pub mod model;
pub mod optimizer;
pub mod plot;
pub mod prediction;
pub mod scaler;
pub mod schedule;
pub mod trainer;

#[path = "../linear/mod.rs"]
pub mod linear;

#[path = "../analysis/mod.rs"]
pub mod analysis;
