//! Phase-selection side of the model.

use tracing::warn;

use crate::errors::ModelError;
use crate::pmf::{is_pmf, pmf_from_counts};

/// One non-yellow phase of the dense internal phase alphabet.
///
/// Produced once by the phase table at setup; immutable afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseInfo {
    /// Dense internal id, 0-based, yellow phases excluded.
    pub id: usize,
    /// Phase index in the raw signal program.
    pub raw_id: usize,
    /// Raw signal-state string.
    pub state: String,
    /// Lane-group labels served (green) in this phase, deduplicated.
    pub active_groups: Vec<String>,
    /// Phase duration in ticks.
    pub duration: u32,
}

/// Action space of the signal controller: one action per internal phase,
/// with selection probabilities learned from the observed phase histogram.
#[derive(Debug, Clone)]
pub struct Controller {
    /// Raw state strings, one per action.
    actions: Vec<String>,
    /// Dense action symbols: `action0`, `action1`, ...
    action_labels: Vec<String>,
    probabilities: Vec<f64>,
    /// Lane groups served per action ("ways").
    ways: Vec<Vec<String>>,
    selection_histogram: Vec<u64>,
    current_phase: Option<usize>,
}

impl Controller {
    pub fn from_phases(phases: &[PhaseInfo]) -> Result<Self, ModelError> {
        if phases.is_empty() {
            return Err(ModelError::Empty);
        }
        let n = phases.len();
        let uniform = 1.0 / n as f64;
        Ok(Self {
            actions: phases.iter().map(|p| p.state.clone()).collect(),
            action_labels: (0..n).map(|i| format!("action{i}")).collect(),
            probabilities: vec![uniform; n],
            ways: phases.iter().map(|p| p.active_groups.clone()).collect(),
            selection_histogram: vec![0; n],
            current_phase: None,
        })
    }

    /// Rebuild a controller from persisted vectors.
    pub fn from_parts(
        actions: Vec<String>,
        probabilities: Vec<f64>,
        ways: Vec<Vec<String>>,
    ) -> Result<Self, ModelError> {
        if actions.is_empty() {
            return Err(ModelError::Empty);
        }
        let n = actions.len();
        if probabilities.len() != n {
            return Err(ModelError::DimensionMismatch {
                expected: n,
                got: probabilities.len(),
            });
        }
        if ways.len() != n {
            return Err(ModelError::DimensionMismatch {
                expected: n,
                got: ways.len(),
            });
        }
        if !is_pmf(&probabilities) {
            return Err(ModelError::NotAPmf {
                sum: probabilities.iter().sum(),
            });
        }
        Ok(Self {
            action_labels: (0..n).map(|i| format!("action{i}")).collect(),
            actions,
            probabilities,
            ways,
            selection_histogram: vec![0; n],
            current_phase: None,
        })
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn action_labels(&self) -> &[String] {
        &self.action_labels
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn ways(&self) -> &[Vec<String>] {
        &self.ways
    }

    /// Record the phase the controller is showing this tick.
    pub fn record_phase(&mut self, phase: usize) -> Result<(), ModelError> {
        if phase >= self.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.len(),
                got: phase,
            });
        }
        self.selection_histogram[phase] += 1;
        self.current_phase = Some(phase);
        Ok(())
    }

    /// Phase recorded by the latest [`Self::record_phase`] call. Undefined
    /// before the first update.
    pub fn current_phase(&self) -> Result<usize, ModelError> {
        self.current_phase.ok_or(ModelError::PhaseUnset)
    }

    /// Replace probabilities with the PMF of the selection histogram.
    /// An invalid observation (for example before any phase was recorded)
    /// is logged and dropped.
    pub fn adapt_probabilities(&mut self) {
        let observed = pmf_from_counts(&self.selection_histogram);
        if !is_pmf(&observed) {
            warn!("rejecting invalid phase-selection PMF observation");
            return;
        }
        self.probabilities = observed;
    }

    /// Take over probabilities from a persisted controller, matched by
    /// unordered way equality rather than by position.
    pub fn reconcile(&mut self, other: &Controller) -> Result<(), ModelError> {
        if other.len() != self.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.len(),
                got: other.len(),
            });
        }
        let mut updated = Vec::with_capacity(self.len());
        for way in &self.ways {
            let mut mine = way.clone();
            mine.sort();
            let matched = other.ways.iter().position(|w| {
                let mut theirs = w.clone();
                theirs.sort();
                theirs == mine
            });
            match matched {
                Some(j) => updated.push(other.probabilities[j]),
                None => {
                    return Err(ModelError::Reconcile(format!(
                        "no matching way for {way:?}"
                    )))
                }
            }
        }
        self.probabilities = updated;
        Ok(())
    }

    /// One-line human-readable action-space description for logs.
    pub fn summary(&self) -> String {
        let actions: Vec<String> = self
            .actions
            .iter()
            .zip(&self.probabilities)
            .map(|(a, p)| format!("{a}:{p:.6}"))
            .collect();
        format!("ActionSpace = {}", actions.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phases() -> Vec<PhaseInfo> {
        vec![
            PhaseInfo {
                id: 0,
                raw_id: 0,
                state: "GGrr".into(),
                active_groups: vec!["laneA".into()],
                duration: 30,
            },
            PhaseInfo {
                id: 1,
                raw_id: 2,
                state: "rrGG".into(),
                active_groups: vec!["laneB".into()],
                duration: 30,
            },
        ]
    }

    #[test]
    fn phase_is_undefined_before_first_update() {
        let ctrl = Controller::from_phases(&phases()).unwrap();
        assert!(matches!(ctrl.current_phase(), Err(ModelError::PhaseUnset)));
    }

    #[test]
    fn histogram_drives_probabilities() {
        let mut ctrl = Controller::from_phases(&phases()).unwrap();
        for _ in 0..3 {
            ctrl.record_phase(0).unwrap();
        }
        ctrl.record_phase(1).unwrap();
        ctrl.adapt_probabilities();
        assert!(is_pmf(ctrl.probabilities()));
        assert!((ctrl.probabilities()[0] - 0.75).abs() < 1e-9);
        assert_eq!(ctrl.current_phase().unwrap(), 1);
    }

    #[test]
    fn empty_histogram_keeps_prior_probabilities() {
        let mut ctrl = Controller::from_phases(&phases()).unwrap();
        let before = ctrl.probabilities().to_vec();
        ctrl.adapt_probabilities();
        assert_eq!(ctrl.probabilities(), before.as_slice());
    }

    #[test]
    fn reconcile_matches_ways_unordered() {
        let mut ctrl = Controller::from_phases(&phases()).unwrap();
        let other = Controller::from_parts(
            vec!["rrGG".into(), "GGrr".into()],
            vec![0.9, 0.1],
            vec![vec!["laneB".into()], vec!["laneA".into()]],
        )
        .unwrap();
        ctrl.reconcile(&other).unwrap();
        assert_eq!(ctrl.probabilities(), &[0.1, 0.9]);
    }

    #[test]
    fn reconcile_fails_on_unknown_way() {
        let mut ctrl = Controller::from_phases(&phases()).unwrap();
        let other = Controller::from_parts(
            vec!["rrGG".into(), "GGrr".into()],
            vec![0.9, 0.1],
            vec![vec!["laneB".into()], vec!["laneC".into()]],
        )
        .unwrap();
        assert!(ctrl.reconcile(&other).is_err());
    }
}
