//! Piecewise learning-rate decay tied to the number of epochs left.
//!
//! The rate is the initial rate until the final 2000 epochs, a quarter of it from there,
//! and a sixteenth of it over the final 500 epochs. Budgets shorter than a threshold
//! never cross it, so a 25-epoch run trains at the initial rate throughout.

/// Epochs remaining at which the rate is first divided.
pub const FIRST_DECAY_REMAINING: usize = 2000;

/// Epochs remaining at which the rate is divided again.
pub const SECOND_DECAY_REMAINING: usize = 500;

/// Divisor applied at each decay point.
pub const DECAY_DIVISOR: f64 = 4.0;

/// Learning rate for the zero-based `epoch` of a run lasting `total_epochs`.
pub fn rate_at(initial: f64, epoch: usize, total_epochs: usize) -> f64 {
    let mut rate = initial;
    for remaining in [FIRST_DECAY_REMAINING, SECOND_DECAY_REMAINING] {
        if total_epochs >= remaining && epoch >= total_epochs - remaining {
            rate /= DECAY_DIVISOR;
        }
    }
    rate
}

/// A schedule bound to one run, so the trainer can ask for the rate by epoch alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningRateSchedule {
    initial: f64,
    total_epochs: usize,
}

impl LearningRateSchedule {
    pub fn new(initial: f64, total_epochs: usize) -> Self {
        Self {
            initial,
            total_epochs,
        }
    }

    pub fn rate(&self, epoch: usize) -> f64 {
        rate_at(self.initial, epoch, self.total_epochs)
    }

    pub fn total_epochs(&self) -> usize {
        self.total_epochs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rate_drops_at_both_thresholds() {
        let total = 12_000;
        let initial = 0.002;
        assert_relative_eq!(rate_at(initial, 0, total), initial);
        assert_relative_eq!(rate_at(initial, total - 2001, total), initial);
        assert_relative_eq!(rate_at(initial, total - 2000, total), initial / 4.0);
        assert_relative_eq!(rate_at(initial, total - 501, total), initial / 4.0);
        assert_relative_eq!(rate_at(initial, total - 500, total), initial / 16.0);
        assert_relative_eq!(rate_at(initial, total - 1, total), initial / 16.0);
    }

    #[test]
    fn short_budgets_keep_the_initial_rate() {
        for epoch in 0..25 {
            assert_eq!(rate_at(0.002, epoch, 25), 0.002);
        }
    }

    #[test]
    fn budget_between_thresholds_only_sees_second_decay() {
        let total = 1000;
        assert_eq!(rate_at(1.0, 0, total), 1.0);
        assert_eq!(rate_at(1.0, 499, total), 1.0);
        assert_eq!(rate_at(1.0, 500, total), 0.25);
    }

    #[test]
    fn budget_of_exactly_2000_starts_decayed() {
        assert_eq!(rate_at(1.0, 0, 2000), 0.25);
        assert_eq!(rate_at(1.0, 1500, 2000), 0.0625);
    }

    #[test]
    fn bound_schedule_matches_free_function() {
        let schedule = LearningRateSchedule::new(0.01, 3000);
        assert_eq!(schedule.total_epochs(), 3000);
        for epoch in [0, 999, 1000, 2499, 2500, 2999] {
            assert_eq!(schedule.rate(epoch), rate_at(0.01, epoch, 3000));
        }
    }
}
