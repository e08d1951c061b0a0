use std::time::Duration;

/// Linear rate trajectory for a ramping arrival definition.
///
/// The profile divides the ramp window into `steps` equal slices of
/// `step_interval` each. During slice `i` the arrival rate is
/// `start + i * (target - start) / steps`, so the rate reaches (but never
/// emits at) `target` exactly when the window ends. Ramp-down works with the
/// same formula: the increment is simply negative.
///
/// A profile with `steps == 0` produces an empty trajectory. That case comes
/// from ramp windows shorter than one step interval and deliberately means
/// "no ramp steps at all", not "fall back to the base rate".
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RampProfile {
    pub start: f64,
    pub target: f64,
    pub step_interval: Duration,
    pub steps: u64,
}

impl RampProfile {
    /// Rate held during ramp step `step` (`0 <= step < self.steps`).
    pub fn rate_at(&self, step: u64) -> f64 {
        debug_assert!(step < self.steps);
        self.start + step as f64 * (self.target - self.start) / self.steps as f64
    }

    /// The full step-by-step rate sequence, one entry per `step_interval`.
    pub fn rates(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.steps).map(|i| self.rate_at(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_up_is_linear() {
        let profile = RampProfile {
            start: 10.0,
            target: 20.0,
            step_interval: Duration::from_millis(500),
            steps: 20,
        };
        let rates: Vec<f64> = profile.rates().collect();
        assert_eq!(rates.len(), 20);
        for (i, rate) in rates.iter().enumerate() {
            assert!((rate - (10.0 + i as f64 * 0.5)).abs() < 1e-9);
        }
        // The target itself is never emitted; the last step sits one
        // increment below it.
        assert!((rates[19] - 19.5).abs() < 1e-9);
    }

    #[test]
    fn ramp_down_uses_the_same_formula() {
        let profile = RampProfile {
            start: 8.0,
            target: 2.0,
            step_interval: Duration::from_secs(1),
            steps: 4,
        };
        let rates: Vec<f64> = profile.rates().collect();
        assert_eq!(rates, vec![8.0, 6.5, 5.0, 3.5]);
    }

    #[test]
    fn zero_steps_yield_an_empty_trajectory() {
        let profile = RampProfile {
            start: 1.0,
            target: 100.0,
            step_interval: Duration::from_secs(10),
            steps: 0,
        };
        assert_eq!(profile.rates().count(), 0);
    }
}
