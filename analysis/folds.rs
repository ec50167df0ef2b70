//! Repeated K-fold splits.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::AnalysisError;

/// Fold count and repetitions of a cross-validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossValidation {
    pub folds: usize,
    pub runs: usize,
    pub seed: u64,
}

impl Default for CrossValidation {
    fn default() -> Self {
        Self {
            folds: 5,
            runs: 3,
            seed: 0,
        }
    }
}

impl CrossValidation {
    pub fn validate(&self, n_rows: usize) -> Result<(), AnalysisError> {
        if self.folds < 2 || self.runs == 0 {
            return Err(AnalysisError::InvalidCrossValidation {
                folds: self.folds,
                runs: self.runs,
            });
        }
        if n_rows < self.folds {
            return Err(AnalysisError::TooFewRowsForFolds {
                rows: n_rows,
                folds: self.folds,
            });
        }
        Ok(())
    }

    /// Number of accuracy values one predictor produces.
    pub fn job_count(&self) -> usize {
        self.folds * self.runs
    }

    /// Every `(run, fold)` pair, run-major.
    pub fn jobs(&self) -> Vec<FoldJob> {
        (0..self.runs)
            .flat_map(|run| (0..self.folds).map(move |fold| FoldJob { run, fold }))
            .collect()
    }

    /// Fold of every row for one run. Rows are shuffled with a run-specific seed and dealt
    /// out in turn, so fold sizes differ by at most one.
    pub fn assign(&self, n_rows: usize, run: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..n_rows).collect();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(run as u64));
        order.shuffle(&mut rng);
        let mut assignment = vec![0; n_rows];
        for (position, &row) in order.iter().enumerate() {
            assignment[row] = position % self.folds;
        }
        assignment
    }
}

/// One train/test evaluation within a cross-validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FoldJob {
    pub run: usize,
    pub fold: usize,
}

impl FoldJob {
    /// Seed for the stochastic models trained in this job.
    pub fn seed(&self, base: u64) -> u64 {
        base ^ ((self.run as u64) << 32 | self.fold as u64)
    }
}

/// Row indices on each side of a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

pub fn split(assignment: &[usize], fold: usize) -> Split {
    let (test, train): (Vec<usize>, Vec<usize>) =
        (0..assignment.len()).partition(|&row| assignment[row] == fold);
    Split { train, test }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_row_is_tested_exactly_once_per_run() {
        let cv = CrossValidation {
            folds: 4,
            runs: 2,
            seed: 9,
        };
        for run in 0..cv.runs {
            let assignment = cv.assign(23, run);
            let mut seen = vec![0; 23];
            for fold in 0..cv.folds {
                let split = split(&assignment, fold);
                assert_eq!(split.train.len() + split.test.len(), 23);
                for row in split.test {
                    seen[row] += 1;
                }
            }
            assert!(seen.iter().all(|&count| count == 1));
        }
    }

    #[test]
    fn fold_sizes_differ_by_at_most_one() {
        let cv = CrossValidation::default();
        let assignment = cv.assign(17, 0);
        let sizes: Vec<usize> = (0..cv.folds)
            .map(|fold| assignment.iter().filter(|&&f| f == fold).count())
            .collect();
        let max = *sizes.iter().max().unwrap();
        let min = *sizes.iter().min().unwrap();
        assert!(max - min <= 1);
    }

    #[test]
    fn runs_shuffle_differently_but_reproducibly() {
        let cv = CrossValidation::default();
        assert_eq!(cv.assign(30, 1), cv.assign(30, 1));
        assert_ne!(cv.assign(30, 0), cv.assign(30, 1));
    }

    #[test]
    fn jobs_cover_every_run_and_fold() {
        let cv = CrossValidation {
            folds: 3,
            runs: 2,
            seed: 0,
        };
        let jobs = cv.jobs();
        assert_eq!(jobs.len(), cv.job_count());
        assert_eq!(jobs[0], FoldJob { run: 0, fold: 0 });
        assert_eq!(jobs[5], FoldJob { run: 1, fold: 2 });
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let one_fold = CrossValidation {
            folds: 1,
            ..CrossValidation::default()
        };
        assert!(matches!(
            one_fold.validate(10),
            Err(AnalysisError::InvalidCrossValidation { .. })
        ));
        assert!(matches!(
            CrossValidation::default().validate(3),
            Err(AnalysisError::TooFewRowsForFolds { rows: 3, folds: 5 })
        ));
    }
}
