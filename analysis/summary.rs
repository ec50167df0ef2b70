//! # Comparison Report
//!
//! Reduces shelved optimizations to one accuracy record per model, species and trait
//! (the best configuration of each), then reports standard errors and 95% confidence
//! half-widths as a TSV table and a grouped bar chart.

use std::collections::BTreeMap;
use std::io::Write;

use itertools::Itertools;
use serde::Serialize;

use super::shelf::{ModelShelf, ShelfError, ShelfKey};
use super::stats::t_critical_95;
use crate::plot::{BarCluster, render_accuracy_bars};

/// The best configuration of one model on one species and trait.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyRecord {
    pub species: String,
    pub trait_name: String,
    pub model: String,
    pub mean: f64,
    pub sd: f64,
    /// Number of accuracy values behind `mean`: folds × runs.
    pub count: usize,
    pub raw_results: Vec<f64>,
    pub hidden: Vec<usize>,
}

impl AccuracyRecord {
    pub fn standard_error(&self) -> f64 {
        self.sd / (self.count as f64).sqrt()
    }

    pub fn confidence_half_width(&self) -> f64 {
        t_critical_95(self.count.saturating_sub(1)) * self.standard_error()
    }
}

/// One record per model and shelf key, taking each optimization's best row. Models whose
/// name does not start with `model_prefix` are skipped.
pub fn aggregate(
    shelves: &BTreeMap<String, ModelShelf>,
    model_prefix: Option<&str>,
) -> Result<Vec<AccuracyRecord>, ShelfError> {
    let mut records = Vec::new();
    for (model, shelf) in shelves {
        if model_prefix.is_some_and(|prefix| !model.starts_with(prefix)) {
            continue;
        }
        for (key, result) in shelf {
            let key = ShelfKey::parse(key)?;
            let Some(best) = result.best() else {
                continue;
            };
            records.push(AccuracyRecord {
                species: key.species,
                trait_name: key.trait_name,
                model: model.clone(),
                mean: best.mean,
                sd: best.std_dev,
                count: result.folds * result.runs,
                raw_results: best.raw_results.clone(),
                hidden: best.hidden.clone(),
            });
        }
    }
    sort_records(&mut records);
    Ok(records)
}

/// Species ascending, then trait descending, then model ascending.
pub fn sort_records(records: &mut [AccuracyRecord]) {
    records.sort_by(|a, b| {
        a.species
            .cmp(&b.species)
            .then_with(|| b.trait_name.cmp(&a.trait_name))
            .then_with(|| a.model.cmp(&b.model))
    });
}

/// Capitalizes the first letter of every alphabetic run and lowercases the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_is_letter = false;
    for c in text.chars() {
        if previous_is_letter {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_is_letter = c.is_alphabetic();
    }
    out
}

/// Axis label for a species and trait: `Species\nTrait Name`.
pub fn string_to_label(species: &str, trait_name: &str) -> String {
    format!(
        "{}\n{}",
        title_case(species),
        title_case(&trait_name.replace('_', " "))
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub species: String,
    #[serde(rename = "trait")]
    pub trait_name: String,
    pub model: String,
    pub mean: f64,
    pub sd: f64,
    pub count: usize,
    pub std_error: f64,
    pub ci95: f64,
    pub hidden: String,
}

pub fn report_rows(records: &[AccuracyRecord]) -> Vec<ReportRow> {
    records
        .iter()
        .map(|record| ReportRow {
            species: record.species.clone(),
            trait_name: record.trait_name.clone(),
            model: record.model.clone(),
            mean: record.mean,
            sd: record.sd,
            count: record.count,
            std_error: record.standard_error(),
            ci95: record.confidence_half_width(),
            hidden: record.hidden.iter().join(","),
        })
        .collect()
}

/// Writes the report as tab-separated values with a header row.
pub fn write_report<W: Write>(rows: &[ReportRow], writer: W) -> Result<(), csv::Error> {
    let mut tsv = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    for row in rows {
        tsv.serialize(row)?;
    }
    tsv.flush()?;
    Ok(())
}

/// Bar chart with one cluster per species and trait, one bar per model.
pub fn render_report_chart(records: &[AccuracyRecord], height: u16) -> String {
    let groups = records
        .iter()
        .chunk_by(|record| (record.species.clone(), record.trait_name.clone()));
    let clusters: Vec<BarCluster> = groups
        .into_iter()
        .map(|((species, trait_name), group)| BarCluster {
            label: string_to_label(&species, &trait_name).replace('\n', " "),
            bars: group
                .map(|record| (record.model.clone(), record.mean))
                .collect(),
        })
        .collect();
    render_accuracy_bars("Accuracy", &clusters, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::shelf::{ConfigAccuracy, OptimizationResult};
    use approx::assert_abs_diff_eq;

    fn result(means: &[f64]) -> OptimizationResult {
        OptimizationResult {
            folds: 5,
            runs: 2,
            rows: means
                .iter()
                .enumerate()
                .map(|(i, &mean)| ConfigAccuracy {
                    label: format!("cfg{i}"),
                    hidden: vec![i + 1],
                    mean,
                    std_dev: 0.05,
                    raw_results: vec![mean; 10],
                })
                .collect(),
        }
    }

    fn shelves() -> BTreeMap<String, ModelShelf> {
        let mut n = ModelShelf::new();
        n.insert("wheat|yield|cpu".into(), result(&[0.2, 0.6, 0.4]));
        n.insert("wheat|height|cpu".into(), result(&[0.3]));
        n.insert("arabidopsis|flowering_time|gpu".into(), result(&[0.5, 0.1]));
        let mut rr = ModelShelf::new();
        rr.insert("wheat|yield|cpu".into(), result(&[0.45]));
        let mut all = BTreeMap::new();
        all.insert("N".to_string(), n);
        all.insert("RR".to_string(), rr);
        all
    }

    #[test]
    fn aggregation_takes_the_best_row_with_full_count() {
        let records = aggregate(&shelves(), None).unwrap();
        assert_eq!(records.len(), 4);
        let wheat_yield_n = records
            .iter()
            .find(|r| r.species == "wheat" && r.trait_name == "yield" && r.model == "N")
            .unwrap();
        assert_eq!(wheat_yield_n.mean, 0.6);
        assert_eq!(wheat_yield_n.hidden, vec![2]);
        assert_eq!(wheat_yield_n.count, 10);
    }

    #[test]
    fn records_sort_by_species_then_trait_descending() {
        let records = aggregate(&shelves(), None).unwrap();
        let order: Vec<(&str, &str, &str)> = records
            .iter()
            .map(|r| (r.species.as_str(), r.trait_name.as_str(), r.model.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("arabidopsis", "flowering_time", "N"),
                ("wheat", "yield", "N"),
                ("wheat", "yield", "RR"),
                ("wheat", "height", "N"),
            ]
        );
    }

    #[test]
    fn prefix_filter_keeps_network_models() {
        let records = aggregate(&shelves(), Some("N")).unwrap();
        assert!(records.iter().all(|r| r.model == "N"));
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn labels_are_title_cased_with_spaces() {
        assert_eq!(
            string_to_label("arabidopsis", "flowering_time"),
            "Arabidopsis\nFlowering Time"
        );
        assert_eq!(string_to_label("WHEAT", "grain-yield"), "Wheat\nGrain-Yield");
    }

    #[test]
    fn confidence_interval_uses_t_with_count_minus_one() {
        let record = AccuracyRecord {
            species: "wheat".into(),
            trait_name: "yield".into(),
            model: "N".into(),
            mean: 0.5,
            sd: 0.1,
            count: 10,
            raw_results: vec![],
            hidden: vec![],
        };
        assert_abs_diff_eq!(record.standard_error(), 0.1 / 10f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(
            record.confidence_half_width(),
            2.262157 * 0.1 / 10f64.sqrt(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn report_is_written_as_tsv() {
        let records = aggregate(&shelves(), Some("RR")).unwrap();
        let mut buffer = Vec::new();
        write_report(&report_rows(&records), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("species\ttrait\tmodel\tmean\tsd\tcount\tstd_error\tci95\thidden")
        );
        let fields: Vec<&str> = lines.next().unwrap().split('\t').collect();
        assert_eq!(&fields[..3], &["wheat", "yield", "RR"]);
        assert_eq!(fields[8], "1");
    }

    #[test]
    fn chart_groups_models_by_species_and_trait() {
        let records = aggregate(&shelves(), None).unwrap();
        let chart = render_report_chart(&records, 18);
        assert!(chart.contains("Accuracy"));
    }
}
