//! Occupancy side of the model: one dimension per lane group.

use tracing::warn;

use crate::errors::ModelError;
use crate::pmf::{is_pmf, pmf_from_counts};

/// Occupancy bounds, probabilities, and tick counters of every lane group
/// of one intersection.
///
/// All vectors are indexed by the same fixed label order. The occupancy
/// histogram is cumulative over the whole run; the observed PMF therefore
/// drifts toward a long-run average rather than recent behavior. That
/// matches the behavior the strategies were tuned against, so it is kept
/// deliberately (see DESIGN.md).
#[derive(Debug, Clone)]
pub struct Environment {
    labels: Vec<String>,
    probabilities: Vec<f64>,
    weights: Vec<u32>,
    bounds: Vec<u32>,
    vehicle_counts: Vec<u32>,
    halting_counts: Vec<u32>,
    cumulative_vehicles: Vec<u64>,
    cumulative_new_vehicles: Vec<u64>,
    occupancy_histogram: Vec<u64>,
}

impl Environment {
    /// Build a fresh environment with uniform probabilities and the
    /// initial occupancy bound on every dimension.
    pub fn new(labels: Vec<String>, min_lane_size: u32) -> Result<Self, ModelError> {
        if labels.is_empty() {
            return Err(ModelError::Empty);
        }
        let n = labels.len();
        let uniform = 1.0 / n as f64;
        Ok(Self {
            probabilities: vec![uniform; n],
            weights: vec![1; n],
            bounds: vec![min_lane_size.max(1); n],
            vehicle_counts: vec![0; n],
            halting_counts: vec![0; n],
            cumulative_vehicles: vec![0; n],
            cumulative_new_vehicles: vec![0; n],
            occupancy_histogram: vec![0; n],
            labels,
        })
    }

    /// Rebuild an environment from persisted vectors.
    pub fn from_parts(
        labels: Vec<String>,
        probabilities: Vec<f64>,
        weights: Vec<u32>,
        bounds: Vec<u32>,
    ) -> Result<Self, ModelError> {
        if labels.is_empty() {
            return Err(ModelError::Empty);
        }
        let n = labels.len();
        check_len(n, probabilities.len())?;
        check_len(n, weights.len())?;
        check_len(n, bounds.len())?;
        if !is_pmf(&probabilities) {
            return Err(ModelError::NotAPmf {
                sum: probabilities.iter().sum(),
            });
        }
        Ok(Self {
            probabilities,
            weights,
            bounds,
            vehicle_counts: vec![0; n],
            halting_counts: vec![0; n],
            cumulative_vehicles: vec![0; n],
            cumulative_new_vehicles: vec![0; n],
            occupancy_histogram: vec![0; n],
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn weights(&self) -> &[u32] {
        &self.weights
    }

    pub fn bounds(&self) -> &[u32] {
        &self.bounds
    }

    pub fn halting_counts(&self) -> &[u32] {
        &self.halting_counts
    }

    pub fn vehicle_counts(&self) -> &[u32] {
        &self.vehicle_counts
    }

    /// Latest per-group counts, recorded every tick.
    pub fn record_counts(&mut self, vehicles: &[u32], halting: &[u32]) -> Result<(), ModelError> {
        check_len(self.len(), vehicles.len())?;
        check_len(self.len(), halting.len())?;
        for i in 0..self.len() {
            let delta = vehicles[i].saturating_sub(self.vehicle_counts[i]);
            self.cumulative_new_vehicles[i] += u64::from(delta);
            self.cumulative_vehicles[i] += u64::from(vehicles[i]);
            self.occupancy_histogram[i] += u64::from(vehicles[i]);
            self.vehicle_counts[i] = vehicles[i];
            self.halting_counts[i] = halting[i];
        }
        Ok(())
    }

    /// PMF observed so far, derived from the cumulative occupancy
    /// histogram. Not necessarily valid; see [`Self::adapt_probabilities`].
    pub fn observed_pmf(&self) -> Vec<f64> {
        pmf_from_counts(&self.occupancy_histogram)
    }

    /// Exponential-moving-average update of the probabilities toward the
    /// observed PMF. An observation with non-finite entries or one that is
    /// not itself a PMF is logged and dropped; the prior value survives.
    pub fn adapt_probabilities(&mut self, lambda: f64) {
        let observed = self.observed_pmf();
        if observed.len() != self.probabilities.len() || !is_pmf(&observed) {
            warn!(
                sum = observed.iter().sum::<f64>(),
                "rejecting invalid occupancy PMF observation"
            );
            return;
        }
        for (p, o) in self.probabilities.iter_mut().zip(observed) {
            *p = (1.0 - lambda) * *p + lambda * o;
        }
        debug_assert!(is_pmf(&self.probabilities));
    }

    /// Grow-only bound update: each dimension moves up toward the demanded
    /// value, clamped to `[1, cap]`. Shrinking demands are ignored.
    pub fn widen_bounds(&mut self, demanded: &[u32], cap: u32) -> Result<(), ModelError> {
        check_len(self.len(), demanded.len())?;
        for (bound, &want) in self.bounds.iter_mut().zip(demanded) {
            let want = want.clamp(1, cap);
            if want > *bound {
                *bound = want;
            }
        }
        Ok(())
    }

    /// Replace the bounds wholesale. Only used for the explicit rollback
    /// after a solver failure.
    pub fn set_bounds(&mut self, bounds: Vec<u32>) -> Result<(), ModelError> {
        check_len(self.len(), bounds.len())?;
        self.bounds = bounds;
        Ok(())
    }

    pub fn update_weights(&mut self, weights: &[u32]) -> Result<(), ModelError> {
        check_len(self.len(), weights.len())?;
        for (w, &update) in self.weights.iter_mut().zip(weights) {
            *w = update.max(1);
        }
        Ok(())
    }

    /// Take over probabilities, weights, and bounds from a persisted
    /// environment, matched by label rather than by position.
    pub fn reconcile(&mut self, other: &Environment) -> Result<(), ModelError> {
        check_len(self.len(), other.len())?;
        let mut sorted_a = self.labels.clone();
        let mut sorted_b = other.labels.clone();
        sorted_a.sort();
        sorted_b.sort();
        if sorted_a != sorted_b {
            return Err(ModelError::Reconcile(format!(
                "label sets differ: {:?} vs {:?}",
                self.labels, other.labels
            )));
        }
        for (i, label) in self.labels.iter().enumerate() {
            for (j, other_label) in other.labels.iter().enumerate() {
                if label == other_label {
                    self.probabilities[i] = other.probabilities[j];
                    self.weights[i] = other.weights[j];
                    self.bounds[i] = other.bounds[j];
                }
            }
        }
        Ok(())
    }

    /// One-line human-readable state-space description for logs.
    pub fn summary(&self) -> String {
        let dims: Vec<String> = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, l)| {
                format!(
                    "{l}: {} *{} [{:.6}]",
                    self.bounds[i], self.weights[i], self.probabilities[i]
                )
            })
            .collect();
        format!("StateSpace = {}", dims.join(" x "))
    }
}

fn check_len(expected: usize, got: usize) -> Result<(), ModelError> {
    if expected == got {
        Ok(())
    } else {
        Err(ModelError::DimensionMismatch { expected, got })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn env2() -> Environment {
        Environment::new(vec!["laneA".into(), "laneB".into()], 3).unwrap()
    }

    #[test]
    fn starts_uniform_and_valid() {
        let env = env2();
        assert!(is_pmf(env.probabilities()));
        assert_eq!(env.bounds(), &[3, 3]);
    }

    #[test]
    fn rejects_mismatched_count_vectors() {
        let mut env = env2();
        let err = env.record_counts(&[1], &[1]).unwrap_err();
        assert!(matches!(err, ModelError::DimensionMismatch { .. }));
        assert_eq!(env.vehicle_counts(), &[0, 0]);
    }

    #[test]
    fn adapting_without_observations_keeps_prior() {
        let mut env = env2();
        let before = env.probabilities().to_vec();
        env.adapt_probabilities(0.2);
        assert_eq!(env.probabilities(), before.as_slice());
    }

    #[test]
    fn adaptation_tracks_biased_traffic() {
        let mut env = env2();
        for _ in 0..100 {
            env.record_counts(&[4, 1], &[4, 1]).unwrap();
        }
        env.adapt_probabilities(0.2);
        assert!(is_pmf(env.probabilities()));
        assert!(env.probabilities()[0] > 0.5);
    }

    #[test]
    fn bounds_never_shrink_and_respect_cap() {
        let mut env = env2();
        env.widen_bounds(&[6, 2], 8).unwrap();
        assert_eq!(env.bounds(), &[6, 3]);
        env.widen_bounds(&[20, 20], 8).unwrap();
        assert_eq!(env.bounds(), &[8, 8]);
        env.widen_bounds(&[1, 1], 8).unwrap();
        assert_eq!(env.bounds(), &[8, 8]);
    }

    #[test]
    fn reconcile_matches_by_label_not_position() {
        let mut env = env2();
        let other = Environment::from_parts(
            vec!["laneB".into(), "laneA".into()],
            vec![0.75, 0.25],
            vec![2, 1],
            vec![5, 4],
        )
        .unwrap();
        env.reconcile(&other).unwrap();
        assert_eq!(env.probabilities(), &[0.25, 0.75]);
        assert_eq!(env.bounds(), &[4, 5]);
    }

    #[test]
    fn reconcile_rejects_foreign_labels() {
        let mut env = env2();
        let other =
            Environment::new(vec!["laneA".into(), "laneC".into()], 3).unwrap();
        assert!(env.reconcile(&other).is_err());
    }

    proptest! {
        #[test]
        fn ema_preserves_pmf(
            counts in prop::collection::vec(1u32..50, 2..6),
            lambda in 0.01f64..0.99,
        ) {
            let labels: Vec<String> = (0..counts.len()).map(|i| format!("lane{i}")).collect();
            let mut env = Environment::new(labels, 3).unwrap();
            let halting = vec![0u32; counts.len()];
            env.record_counts(&counts, &halting).unwrap();
            env.adapt_probabilities(lambda);
            prop_assert!(is_pmf(env.probabilities()));
        }

        #[test]
        fn widen_is_monotone(
            rounds in prop::collection::vec(prop::collection::vec(0u32..20, 3), 1..10),
        ) {
            let labels = vec!["a".to_string(), "b".to_string(), "c".to_string()];
            let mut env = Environment::new(labels, 3).unwrap();
            let mut previous = env.bounds().to_vec();
            for demanded in rounds {
                env.widen_bounds(&demanded, 8).unwrap();
                for (now, before) in env.bounds().iter().zip(&previous) {
                    prop_assert!(now >= before);
                    prop_assert!(*now <= 8);
                }
                previous = env.bounds().to_vec();
            }
        }
    }
}
