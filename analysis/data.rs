//! # Marker and Phenotype Loading
//!
//! Two tab-separated inputs:
//!
//! - a marker table with a `sample_id` column and one numeric column per marker, coded
//!   -1/0/1;
//! - a phenotype table with a `sample_id` column and one numeric column per trait.
//!
//! Samples are matched by id, not by row position. Samples whose value for the requested
//! trait is missing are dropped; a missing or non-finite marker value is an error, as is
//! a marker sample absent from the phenotype table.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;

use log::{info, warn};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use thiserror::Error;

pub const SAMPLE_ID_COLUMN: &str = "sample_id";

/// Fewest complete rows accepted for a trait.
pub const MINIMUM_ROWS: usize = 10;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),

    #[error(
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },

    #[error("Missing values were found in the marker column '{0}'. Marker data must be complete.")]
    MissingValuesFound(String),

    #[error("Non-finite values (NaN or Infinity) were found in the column '{0}'.")]
    NonFiniteValuesFound(String),

    #[error("The marker file has no marker columns besides '{SAMPLE_ID_COLUMN}'.")]
    NoMarkerColumns,

    #[error("Sample '{0}' appears more than once in '{1}'.")]
    DuplicateSample(String, String),

    #[error("Sample '{0}' from the marker file has no row in the phenotype file.")]
    SampleNotFound(String),

    #[error(
        "Only {found} samples have a value for the trait, but at least {required} are required."
    )]
    InsufficientRows { found: usize, required: usize },
}

/// Markers and one trait for the samples that have both.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub trait_name: String,
    pub sample_ids: Vec<String>,
    pub marker_names: Vec<String>,
    /// Shape: `[n_samples, n_markers]`.
    pub markers: Array2<f64>,
    pub phenotype: Array1<f64>,
}

impl Dataset {
    pub fn n_samples(&self) -> usize {
        self.markers.nrows()
    }

    pub fn n_markers(&self) -> usize {
        self.markers.ncols()
    }
}

fn read_tsv(path: &Path) -> Result<DataFrame, DataError> {
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;
    Ok(df)
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

fn require_column(df: &DataFrame, name: &str) -> Result<(), DataError> {
    if column_names(df).iter().any(|c| c == name) {
        Ok(())
    } else {
        Err(DataError::ColumnNotFound(name.to_string()))
    }
}

fn sample_ids(df: &DataFrame, origin: &Path) -> Result<Vec<String>, DataError> {
    require_column(df, SAMPLE_ID_COLUMN)?;
    let column = df.column(SAMPLE_ID_COLUMN)?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound(SAMPLE_ID_COLUMN.to_string()));
    }
    let as_text = column.cast(&DataType::String)?;
    let ids: Vec<String> = as_text
        .str()?
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect();

    let mut seen = HashSet::with_capacity(ids.len());
    for id in &ids {
        if !seen.insert(id.as_str()) {
            return Err(DataError::DuplicateSample(
                id.clone(),
                origin.display().to_string(),
            ));
        }
    }
    Ok(ids)
}

/// Casts a column to `f64`, keeping nulls as `None`.
fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, DataError> {
    let column = df.column(name)?;
    let wrong_type = || DataError::ColumnWrongType {
        column_name: name.to_string(),
        expected_type: "f64 (numeric)",
        found_type: format!("{:?}", column.dtype()),
    };
    let casted = column.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    // A cast that invents nulls means some entries were not numbers.
    if casted.null_count() > column.null_count() {
        return Err(wrong_type());
    }
    let values: Vec<Option<f64>> = casted.f64()?.into_iter().collect();
    if values.iter().flatten().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(name.to_string()));
    }
    Ok(values)
}

/// Trait columns of a phenotype file, in file order.
pub fn available_traits(phenotypes: &Path) -> Result<Vec<String>, DataError> {
    let df = read_tsv(phenotypes)?;
    require_column(&df, SAMPLE_ID_COLUMN)?;
    Ok(column_names(&df)
        .into_iter()
        .filter(|name| name != SAMPLE_ID_COLUMN)
        .collect())
}

/// A marker table before it is matched against any phenotype.
#[derive(Debug, Clone)]
pub struct MarkerTable {
    pub sample_ids: Vec<String>,
    pub marker_names: Vec<String>,
    /// Shape: `[n_samples, n_markers]`.
    pub markers: Array2<f64>,
}

impl MarkerTable {
    /// The marker matrix with its columns reordered to `names`. Extra markers are
    /// ignored; a missing one is an error.
    pub fn aligned_to(&self, names: &[String]) -> Result<Array2<f64>, DataError> {
        let position: HashMap<&str, usize> = self
            .marker_names
            .iter()
            .enumerate()
            .map(|(j, name)| (name.as_str(), j))
            .collect();
        let columns = names
            .iter()
            .map(|name| {
                position
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| DataError::ColumnNotFound(name.clone()))
            })
            .collect::<Result<Vec<usize>, _>>()?;
        Ok(self.markers.select(Axis(1), &columns))
    }
}

/// Reads a complete marker table. Every marker value must be present and finite.
pub fn load_markers(markers_path: &Path) -> Result<MarkerTable, DataError> {
    info!("Loading markers from '{}'", markers_path.display());
    let markers_df = read_tsv(markers_path)?;
    let sample_ids = sample_ids(&markers_df, markers_path)?;
    let marker_names: Vec<String> = column_names(&markers_df)
        .into_iter()
        .filter(|name| name != SAMPLE_ID_COLUMN)
        .collect();
    if marker_names.is_empty() {
        return Err(DataError::NoMarkerColumns);
    }

    let mut markers = Array2::<f64>::zeros((sample_ids.len(), marker_names.len()));
    for (j, name) in marker_names.iter().enumerate() {
        let values = numeric_column(&markers_df, name)?;
        for (cell, value) in markers.column_mut(j).iter_mut().zip(values) {
            *cell = value.ok_or_else(|| DataError::MissingValuesFound(name.clone()))?;
        }
    }
    Ok(MarkerTable {
        sample_ids,
        marker_names,
        markers,
    })
}

/// Loads the markers and the named trait, keeping samples present in both files with a
/// non-missing trait value. Sample order follows the marker file.
pub fn load_dataset(
    markers_path: &Path,
    phenotypes_path: &Path,
    trait_name: &str,
) -> Result<Dataset, DataError> {
    let MarkerTable {
        sample_ids: marker_ids,
        marker_names,
        markers: all_markers,
    } = load_markers(markers_path)?;

    info!("Loading phenotypes from '{}'", phenotypes_path.display());
    let phenotype_df = read_tsv(phenotypes_path)?;
    let phenotype_ids = sample_ids(&phenotype_df, phenotypes_path)?;
    require_column(&phenotype_df, trait_name)?;
    let trait_values = numeric_column(&phenotype_df, trait_name)?;
    let by_id: HashMap<&str, Option<f64>> = phenotype_ids
        .iter()
        .map(String::as_str)
        .zip(trait_values.iter().copied())
        .collect();

    let mut kept_rows = Vec::with_capacity(marker_ids.len());
    let mut phenotype = Vec::with_capacity(marker_ids.len());
    for (row, id) in marker_ids.iter().enumerate() {
        match by_id.get(id.as_str()) {
            None => return Err(DataError::SampleNotFound(id.clone())),
            Some(None) => {}
            Some(Some(value)) => {
                kept_rows.push(row);
                phenotype.push(*value);
            }
        }
    }
    let dropped = marker_ids.len() - kept_rows.len();
    if dropped > 0 {
        warn!("Dropped {dropped} samples with no value for trait '{trait_name}'.");
    }
    if kept_rows.len() < MINIMUM_ROWS {
        return Err(DataError::InsufficientRows {
            found: kept_rows.len(),
            required: MINIMUM_ROWS,
        });
    }

    let markers = all_markers.select(Axis(0), &kept_rows);

    info!(
        "Loaded {} samples and {} markers for trait '{trait_name}'.",
        markers.nrows(),
        markers.ncols()
    );
    Ok(Dataset {
        trait_name: trait_name.to_string(),
        sample_ids: kept_rows.iter().map(|&row| marker_ids[row].clone()).collect(),
        marker_names,
        markers,
        phenotype: Array1::from_vec(phenotype),
    })
}
