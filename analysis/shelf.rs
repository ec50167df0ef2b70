//! # Result Shelves
//!
//! A shelf directory holds one JSON file per model plus an `index.json` naming them:
//!
//! ```text
//! shelves/
//!   index.json       {"N": "n.json", "RR": "rr.json"}
//!   rr.json          {"wheat|yield|cpu": {"folds": 5, "runs": 3, "rows": [...]}, ...}
//! ```
//!
//! Each model file maps `species|trait|accelerator` keys to the per-configuration
//! accuracy summary of one optimization. JSON has no NaN, so an undefined accuracy is
//! written as `null` and read back as NaN.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const INDEX_FILE: &str = "index.json";
pub const KEY_SEPARATOR: char = '|';

#[derive(Error, Debug)]
pub enum ShelfError {
    #[error("Shelf IO error at '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Shelf '{path}' is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Shelf key '{0}' is not of the form species|trait|accelerator.")]
    MalformedKey(String),
}

/// Accuracy summary of one predictor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigAccuracy {
    pub label: String,
    /// Hidden-layer widths for network models; empty otherwise.
    #[serde(default)]
    pub hidden: Vec<usize>,
    #[serde(deserialize_with = "nullable_accuracy")]
    pub mean: f64,
    #[serde(deserialize_with = "nullable_accuracy")]
    pub std_dev: f64,
    #[serde(deserialize_with = "nullable_accuracies")]
    pub raw_results: Vec<f64>,
}

fn nullable_accuracy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

fn nullable_accuracies<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
    let values = Vec::<Option<f64>>::deserialize(deserializer)?;
    Ok(values
        .into_iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect())
}

/// Every configuration tried for one species and trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub folds: usize,
    pub runs: usize,
    pub rows: Vec<ConfigAccuracy>,
}

impl OptimizationResult {
    /// The configuration with the highest mean accuracy; the first one wins ties.
    pub fn best(&self) -> Option<&ConfigAccuracy> {
        self.rows
            .iter()
            .filter(|row| !row.mean.is_nan())
            .fold(None, |best: Option<&ConfigAccuracy>, row| match best {
                Some(current) if current.mean >= row.mean => Some(current),
                _ => Some(row),
            })
    }
}

/// Identifies one optimization within a model's shelf.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShelfKey {
    pub species: String,
    pub trait_name: String,
    pub accelerator: String,
}

impl ShelfKey {
    pub fn new(species: &str, trait_name: &str, accelerator: &str) -> Self {
        Self {
            species: species.to_string(),
            trait_name: trait_name.to_string(),
            accelerator: accelerator.to_string(),
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
            self.species, self.trait_name, self.accelerator
        )
    }

    pub fn parse(key: &str) -> Result<Self, ShelfError> {
        let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
        match parts.as_slice() {
            [species, trait_name, accelerator] => Ok(Self::new(species, trait_name, accelerator)),
            _ => Err(ShelfError::MalformedKey(key.to_string())),
        }
    }
}

/// One model's results, keyed by encoded [`ShelfKey`].
pub type ModelShelf = BTreeMap<String, OptimizationResult>;

/// A directory of model shelves.
#[derive(Debug, Clone)]
pub struct Shelf {
    root: PathBuf,
}

impl Shelf {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ShelfError> {
        let file = File::open(path).map_err(|source| ShelfError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ShelfError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ShelfError> {
        let file = File::create(path).map_err(|source| ShelfError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), value).map_err(|source| {
            ShelfError::Json {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Model name to shelf file name. A missing index is an empty shelf.
    pub fn index(&self) -> Result<BTreeMap<String, String>, ShelfError> {
        let path = self.root.join(INDEX_FILE);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        Self::read_json(&path)
    }

    pub fn load_model(&self, model: &str) -> Result<Option<ModelShelf>, ShelfError> {
        match self.index()?.get(model) {
            Some(file) => Self::read_json(&self.root.join(file)).map(Some),
            None => Ok(None),
        }
    }

    /// Every model's results, by model name.
    pub fn load_all(&self) -> Result<BTreeMap<String, ModelShelf>, ShelfError> {
        let mut all = BTreeMap::new();
        for (model, file) in self.index()? {
            let shelf = Self::read_json(&self.root.join(&file))?;
            all.insert(model, shelf);
        }
        Ok(all)
    }

    /// Stores `result` under `key` in `model`'s shelf, creating the shelf and index
    /// entries as needed. An existing entry for the key is replaced.
    pub fn store(
        &self,
        model: &str,
        key: &ShelfKey,
        result: OptimizationResult,
    ) -> Result<(), ShelfError> {
        fs::create_dir_all(&self.root).map_err(|source| ShelfError::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut index = self.index()?;
        let file = index
            .entry(model.to_string())
            .or_insert_with(|| format!("{}.json", model.to_lowercase()))
            .clone();
        let path = self.root.join(&file);
        let mut shelf: ModelShelf = if path.exists() {
            Self::read_json(&path)?
        } else {
            ModelShelf::new()
        };
        shelf.insert(key.encode(), result);
        Self::write_json(&path, &shelf)?;
        Self::write_json(&self.root.join(INDEX_FILE), &index)
    }
}
