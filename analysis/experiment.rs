//! Experiment files: optional TOML describing the hyperparameters, cross-validation and
//! predictor grid of a run. Command-line flags override whatever the file sets.
//!
//! ```toml
//! species = "wheat"
//! predictors = ["rr_alpha=101", "nn_hidden=8,4"]
//!
//! [network]
//! hidden_layers = [8, 4]
//! epochs = 5000
//!
//! [cross_validation]
//! folds = 10
//! runs = 2
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::AnalysisError;
use super::folds::CrossValidation;
use crate::config::{BackpropConfig, NetworkConfig};

pub const DEFAULT_SPECIES: &str = "unknown";
pub const DEFAULT_ACCELERATOR: &str = "cpu";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    pub species: String,
    /// Recorded in shelf keys so results from different hardware stay apart.
    pub accelerator: String,
    pub network: NetworkConfig,
    pub backprop: BackpropConfig,
    pub cross_validation: CrossValidation,
    /// Predictor names; empty means the default ridge grid.
    pub predictors: Vec<String>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            species: DEFAULT_SPECIES.to_string(),
            accelerator: DEFAULT_ACCELERATOR.to_string(),
            network: NetworkConfig::default(),
            backprop: BackpropConfig::default(),
            cross_validation: CrossValidation::default(),
            predictors: Vec::new(),
        }
    }
}

impl ExperimentConfig {
    pub fn from_toml(text: &str) -> Result<Self, AnalysisError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        Self::from_toml(&fs::read_to_string(path)?)
    }

    /// The file contents, or the defaults when no file is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, AnalysisError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_files_keep_defaults() {
        let config = ExperimentConfig::from_toml(
            r#"
            species = "maize"
            predictors = ["brr", "nn_hidden=3"]

            [network]
            hidden_layers = [8, 4]
            dropout_prob = 0.2

            [cross_validation]
            folds = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.species, "maize");
        assert_eq!(config.accelerator, DEFAULT_ACCELERATOR);
        assert_eq!(config.network.hidden_layers, vec![8, 4]);
        assert_eq!(config.network.dropout_prob, 0.2);
        assert_eq!(config.network.epochs, NetworkConfig::default().epochs);
        assert_eq!(config.cross_validation.folds, 10);
        assert_eq!(config.cross_validation.runs, 3);
        assert_eq!(config.backprop, BackpropConfig::default());
    }

    #[test]
    fn misspelled_sections_are_rejected() {
        assert!(matches!(
            ExperimentConfig::from_toml("[netwrok]\nepochs = 3\n"),
            Err(AnalysisError::Toml(_))
        ));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "accelerator = \"gpu\"").unwrap();
        let config = ExperimentConfig::load_or_default(Some(file.path())).unwrap();
        assert_eq!(config.accelerator, "gpu");
        assert_eq!(
            ExperimentConfig::load_or_default(None).unwrap(),
            ExperimentConfig::default()
        );
    }
}
