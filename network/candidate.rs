//! # Best-of-N Initialization
//!
//! Several networks are built from one configuration with independent random
//! initializations and trained briefly. The most promising one is promoted to full
//! training and the rest are dropped, which weeds out initializations that would not
//! converge.
//!
//! Each candidate owns its network, its optimizer state and its RNG. Probing runs in
//! parallel, and since every RNG is seeded from the run seed and the candidate index the
//! outcome does not depend on scheduling.

use log::{debug, info, warn};
use ndarray::{ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::config::NetworkConfig;
use crate::model::Network;
use crate::optimizer::Nadam;
use crate::trainer::{
    EpochPlan, LossHistory, PROBE_EPOCHS, TrainingError, check_training_data, train_epochs,
};

/// Number of candidates built and probed per run.
pub const NET_TRIES: usize = 2;

/// A network together with the state that must follow it into full training.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub network: Network,
    pub optimizer: Nadam,
    pub rng: StdRng,
}

impl Candidate {
    /// Builds a freshly initialized candidate whose randomness derives from `seed`.
    pub fn build(
        config: &NetworkConfig,
        n_features: usize,
        seed: u64,
    ) -> Result<Self, TrainingError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let network = Network::build(config, n_features, &mut rng)?;
        let optimizer = Nadam::new(&network);
        Ok(Self {
            network,
            optimizer,
            rng,
        })
    }

    /// Trains for `epochs` from the candidate's current state.
    pub fn train(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        initial_learning_rate: f64,
        epochs: usize,
        verbose: bool,
    ) -> LossHistory {
        let plan = EpochPlan::new(initial_learning_rate, epochs, x.nrows()).verbose(verbose);
        train_epochs(
            &mut self.network,
            &mut self.optimizer,
            x,
            y,
            &plan,
            &mut self.rng,
        )
    }
}

/// Scores a probe run; lower is better.
pub trait CandidateScore: Sync {
    fn score(&self, history: &LossHistory) -> f64;
}

/// Scores a candidate by the training loss of its last probe epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalProbeLoss;

impl CandidateScore for FinalProbeLoss {
    fn score(&self, history: &LossHistory) -> f64 {
        history.last().unwrap_or(f64::NAN)
    }
}

/// Index of the smallest finite score; ties go to the first occurrence.
pub fn arg_min_finite(scores: &[f64]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_finite())
        .fold(None, |best: Option<(usize, f64)>, (index, &score)| match best {
            Some((_, best_score)) if best_score <= score => best,
            _ => Some((index, score)),
        })
        .map(|(index, _)| index)
}

/// Seed of the candidate at `index` within a run seeded with `run_seed`.
pub fn candidate_seed(run_seed: u64, index: usize) -> u64 {
    run_seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(index as u64 + 1)
}

/// A candidate after probe training.
#[derive(Debug, Clone)]
pub struct ProbedCandidate {
    pub candidate: Candidate,
    pub history: LossHistory,
}

/// Builds `tries` candidates and probe-trains each for `probe_epochs`, in parallel.
pub fn probe_pool(
    config: &NetworkConfig,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    run_seed: u64,
    tries: usize,
    probe_epochs: usize,
) -> Result<Vec<ProbedCandidate>, TrainingError> {
    check_training_data(x, y)?;
    config.validate()?;
    let initial_rate = config.initial_learning_rate();

    (0..tries)
        .into_par_iter()
        .map(|index| {
            let mut candidate = Candidate::build(config, x.ncols(), candidate_seed(run_seed, index))?;
            let history = candidate.train(x, y, initial_rate, probe_epochs, config.verbose);
            debug!(
                "Candidate {index} finished probing with loss {:?}.",
                history.last()
            );
            Ok::<_, TrainingError>(ProbedCandidate { candidate, history })
        })
        .collect()
}

/// The promoted candidate and the evidence it was chosen on.
#[derive(Debug, Clone)]
pub struct Selection {
    pub candidate: Candidate,
    /// Position of the promoted candidate within the pool.
    pub index: usize,
    /// Score of every pool member, in pool order.
    pub probe_losses: Vec<f64>,
}

/// Promotes the pool member with the lowest finite score.
pub fn select_from_pool<S: CandidateScore + ?Sized>(
    pool: Vec<ProbedCandidate>,
    scorer: &S,
) -> Result<Selection, TrainingError> {
    let probe_losses: Vec<f64> = pool.iter().map(|p| scorer.score(&p.history)).collect();
    let skipped = probe_losses.iter().filter(|s| !s.is_finite()).count();
    if skipped > 0 {
        warn!("{skipped} of {} candidates diverged during probing.", pool.len());
    }
    let index = arg_min_finite(&probe_losses).ok_or(TrainingError::AllCandidatesDiverged {
        candidates: pool.len(),
    })?;
    let candidate = pool
        .into_iter()
        .nth(index)
        .map(|probed| probed.candidate)
        .ok_or(TrainingError::AllCandidatesDiverged {
            candidates: probe_losses.len(),
        })?;
    Ok(Selection {
        candidate,
        index,
        probe_losses,
    })
}

/// Builds [`NET_TRIES`] candidates, probes each for [`PROBE_EPOCHS`] and promotes the
/// one with the lowest final probe loss.
pub fn select_initial_network(
    config: &NetworkConfig,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    run_seed: u64,
) -> Result<Selection, TrainingError> {
    let pool = probe_pool(config, x, y, run_seed, NET_TRIES, PROBE_EPOCHS)?;
    let selection = select_from_pool(pool, &FinalProbeLoss)?;
    info!(
        "Promoted candidate {} of {} (probe losses {:?}).",
        selection.index + 1,
        NET_TRIES,
        selection.probe_losses
    );
    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use rand::Rng;

    fn data(n: usize, p: usize) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(21);
        let x = Array2::from_shape_simple_fn((n, p), || rng.gen_range(-1..=1) as f64);
        let y = x.column(0).to_owned() * 0.5 - x.column(1).to_owned() * 0.25;
        (x, y)
    }

    struct FixedScores(Vec<f64>);

    impl CandidateScore for FixedScores {
        fn score(&self, history: &LossHistory) -> f64 {
            // Probe histories are distinguished by their length in these tests.
            self.0[history.len() - 1]
        }
    }

    fn pool_with_lengths(lengths: &[usize]) -> Vec<ProbedCandidate> {
        let config = NetworkConfig::default();
        lengths
            .iter()
            .enumerate()
            .map(|(index, &len)| {
                let mut history = LossHistory::default();
                for _ in 0..len {
                    history.push(1.0);
                }
                ProbedCandidate {
                    candidate: Candidate::build(&config, 3, index as u64).unwrap(),
                    history,
                }
            })
            .collect()
    }

    #[test]
    fn arg_min_prefers_first_of_equal_scores() {
        assert_eq!(arg_min_finite(&[0.3, 0.1, 0.1]), Some(1));
        assert_eq!(arg_min_finite(&[0.2, 0.2]), Some(0));
    }

    #[test]
    fn arg_min_skips_non_finite_scores() {
        assert_eq!(arg_min_finite(&[f64::NAN, 0.4, f64::INFINITY]), Some(1));
        assert_eq!(arg_min_finite(&[f64::NAN, f64::NAN]), None);
        assert_eq!(arg_min_finite(&[]), None);
    }

    #[test]
    fn pool_has_one_entry_per_try_with_full_probe_histories() {
        let (x, y) = data(24, 4);
        let config = NetworkConfig::default().with_hidden_layers(&[3]);
        let pool = probe_pool(&config, x.view(), y.view(), 1, NET_TRIES, 10).unwrap();
        assert_eq!(pool.len(), NET_TRIES);
        assert!(pool.iter().all(|p| p.history.len() == 10));
    }

    #[test]
    fn candidates_start_from_different_weights() {
        let config = NetworkConfig::default();
        let a = Candidate::build(&config, 6, candidate_seed(3, 0)).unwrap();
        let b = Candidate::build(&config, 6, candidate_seed(3, 1)).unwrap();
        assert_ne!(a.network.layers()[0].weights(), b.network.layers()[0].weights());
    }

    #[test]
    fn probing_is_reproducible_for_a_seed() {
        let (x, y) = data(16, 3);
        let config = NetworkConfig::default().with_hidden_layers(&[2]);
        let first = probe_pool(&config, x.view(), y.view(), 99, 3, 5).unwrap();
        let second = probe_pool(&config, x.view(), y.view(), 99, 3, 5).unwrap();
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.history, b.history);
        }
    }

    #[test]
    fn selection_promotes_the_lowest_score() {
        let pool = pool_with_lengths(&[1, 2, 3]);
        let selection = select_from_pool(pool, &FixedScores(vec![0.5, 0.2, 0.7])).unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.probe_losses, vec![0.5, 0.2, 0.7]);
    }

    #[test]
    fn selection_skips_diverged_candidates() {
        let pool = pool_with_lengths(&[1, 2]);
        let selection = select_from_pool(pool, &FixedScores(vec![f64::NAN, 3.0])).unwrap();
        assert_eq!(selection.index, 1);
    }

    #[test]
    fn selection_fails_when_every_candidate_diverged() {
        let pool = pool_with_lengths(&[1, 2]);
        let result = select_from_pool(pool, &FixedScores(vec![f64::NAN, f64::INFINITY]));
        assert!(matches!(
            result,
            Err(TrainingError::AllCandidatesDiverged { candidates: 2 })
        ));
    }

    #[test]
    fn promoted_network_has_minimal_final_probe_loss() {
        let (x, y) = data(20, 5);
        let config = NetworkConfig::default();
        let selection = select_initial_network(&config, x.view(), y.view(), 4).unwrap();
        assert_eq!(selection.probe_losses.len(), NET_TRIES);
        let min = selection
            .probe_losses
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        assert_eq!(selection.probe_losses[selection.index], min);
        assert_eq!(selection.candidate.optimizer.iterations() as usize, PROBE_EPOCHS * 4);
    }
}
