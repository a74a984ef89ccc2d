//! Dense internal phase alphabet and duration shadowing.
//!
//! Yellow phases exist only in the raw program; the model works on a
//! dense 0-based numbering of the non-yellow phases. Two free-running
//! countdowns shadow what the unshielded program would be showing, so an
//! intervention can later hand control back at exactly the right point.

use ampel_model::PhaseInfo;
use ampel_sim::TrafficSim;
use std::collections::BTreeMap;

use crate::errors::TopologyError;

#[derive(Debug, Clone)]
pub struct PhaseTable {
    tls: String,
    phases: Vec<PhaseInfo>,
    /// Raw phase index per internal phase id.
    raw_for_internal: Vec<usize>,
    /// Internal phase id per raw phase index (yellow phases map to the
    /// preceding internal phase).
    internal_for_raw: BTreeMap<usize, usize>,
    /// Internal-phase durations (raw duration plus trailing yellows).
    internal_durations: Vec<u32>,
    raw_durations: Vec<u32>,

    shadow_phase: usize,
    shadow_countdown: u32,
    shadow_raw_phase: usize,
    shadow_raw_countdown: u32,
}

impl PhaseTable {
    /// Derive the table from the live program and reset the signal to a
    /// known starting point (phase 0 of program `"0"`).
    pub fn build<S: TrafficSim + ?Sized>(
        sim: &mut S,
        tls: &str,
        grouped_links: &[Vec<String>],
    ) -> Result<Self, TopologyError> {
        let program = sim.program_logic(tls);

        let mut phases = Vec::new();
        let mut raw_for_internal = Vec::new();
        let mut internal_for_raw = BTreeMap::new();
        let mut raw_durations = Vec::new();

        for (raw_id, phase) in program.phases.iter().enumerate() {
            if !phase.is_yellow() {
                let id = phases.len();
                phases.push(PhaseInfo {
                    id,
                    raw_id,
                    state: phase.state.clone(),
                    active_groups: active_groups(grouped_links, &phase.state),
                    duration: phase.duration,
                });
                raw_for_internal.push(raw_id);
            } else if phases.is_empty() {
                return Err(TopologyError::YellowStart(tls.to_string()));
            }
            internal_for_raw.insert(raw_id, phases.len() - 1);
            raw_durations.push(phase.duration);
        }
        if phases.is_empty() {
            return Err(TopologyError::YellowStart(tls.to_string()));
        }

        // Internal durations absorb the yellow phases that follow them.
        let mut internal_durations = vec![0u32; phases.len()];
        for (raw_id, &internal) in &internal_for_raw {
            internal_durations[internal] += raw_durations[*raw_id];
        }

        // Start from the same point as the shadow countdowns.
        sim.set_phase(tls, 0);
        sim.set_program(tls, "0");

        Ok(Self {
            tls: tls.to_string(),
            shadow_countdown: internal_durations[0],
            shadow_raw_countdown: raw_durations[0],
            phases,
            raw_for_internal,
            internal_for_raw,
            internal_durations,
            raw_durations,
            shadow_phase: 0,
            shadow_raw_phase: 0,
        })
    }

    /// Advance both shadow countdowns by one tick. Free-runs even while
    /// the live signal is being overridden.
    pub fn step(&mut self) {
        if self.shadow_countdown == 0 {
            self.shadow_phase = (self.shadow_phase + 1) % self.internal_durations.len();
            self.shadow_countdown = self.internal_durations[self.shadow_phase];
        }
        self.shadow_countdown = self.shadow_countdown.saturating_sub(1);

        if self.shadow_raw_countdown == 0 {
            self.shadow_raw_phase = (self.shadow_raw_phase + 1) % self.raw_durations.len();
            self.shadow_raw_countdown = self.raw_durations[self.shadow_raw_phase];
        }
        self.shadow_raw_countdown = self.shadow_raw_countdown.saturating_sub(1);
    }

    /// The internal phase the unshielded program would be showing now.
    pub fn shadow_phase(&self) -> usize {
        self.shadow_phase
    }

    pub fn phases(&self) -> &[PhaseInfo] {
        &self.phases
    }

    /// Internal phase id of the phase the live signal currently shows.
    pub fn current_internal_phase<S: TrafficSim + ?Sized>(
        &self,
        sim: &S,
    ) -> Result<usize, TopologyError> {
        let raw = sim.current_phase(&self.tls);
        self.internal_for_raw
            .get(&raw)
            .copied()
            .ok_or(TopologyError::UnknownPhase(raw))
    }

    /// Force the live signal onto an internal phase.
    pub fn set_internal_phase<S: TrafficSim + ?Sized>(
        &self,
        sim: &mut S,
        phase: usize,
    ) -> Result<(), TopologyError> {
        let raw = self
            .raw_for_internal
            .get(phase)
            .copied()
            .ok_or(TopologyError::UnknownPhase(phase))?;
        sim.set_phase(&self.tls, raw);
        Ok(())
    }

    /// Hand control back to the unshielded program: restore the shadow raw
    /// phase and its remaining duration.
    pub fn restore_controller<S: TrafficSim + ?Sized>(&self, sim: &mut S) {
        sim.set_phase(&self.tls, self.shadow_raw_phase);
        sim.set_phase_duration(&self.tls, self.shadow_raw_countdown);
    }

    /// Make sure the live signal runs the modeled program.
    pub fn reset_program<S: TrafficSim + ?Sized>(&self, sim: &mut S) {
        if sim.current_program(&self.tls) != "0" {
            sim.set_program(&self.tls, "0");
        }
    }
}

fn active_groups(grouped_links: &[Vec<String>], state: &str) -> Vec<String> {
    let mut active = Vec::new();
    for (index, signal) in state.chars().enumerate() {
        if matches!(signal, 'g' | 'G') {
            if let Some(labels) = grouped_links.get(index) {
                for label in labels {
                    if !active.iter().any(|l| l == label) {
                        active.push(label.clone());
                    }
                }
            }
        }
    }
    active.sort();
    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use ampel_sim::scripted::ScriptedSim;
    use ampel_sim::types::{ControlledLink, SignalPhase, SignalProgram};

    fn link(from: &str) -> Vec<ControlledLink> {
        vec![ControlledLink {
            from_lane: from.to_string(),
            to_lane: "out".to_string(),
        }]
    }

    fn sim_with_program(phases: Vec<SignalPhase>) -> ScriptedSim {
        let mut sim = ScriptedSim::new();
        sim.add_lane("E1_0", 30.0, &["out"]);
        sim.add_lane("E2_0", 30.0, &["out"]);
        sim.add_lane("out", 30.0, &[]);
        let program = SignalProgram {
            program_id: "0".to_string(),
            phases,
        };
        sim.add_signal("J1", program, vec![link("E1_0"), link("E2_0")]);
        sim
    }

    fn links() -> Vec<Vec<String>> {
        vec![vec!["laneE1".to_string()], vec!["laneE2".to_string()]]
    }

    fn four_phase() -> Vec<SignalPhase> {
        vec![
            SignalPhase::new(30, "Gr"),
            SignalPhase::new(3, "yr"),
            SignalPhase::new(20, "rG"),
            SignalPhase::new(3, "ry"),
        ]
    }

    #[test]
    fn yellow_phases_are_skipped_in_the_dense_numbering() {
        let mut sim = sim_with_program(four_phase());
        let table = PhaseTable::build(&mut sim, "J1", &links()).unwrap();
        let phases = table.phases();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].raw_id, 0);
        assert_eq!(phases[1].raw_id, 2);
        assert_eq!(phases[0].active_groups, vec!["laneE1"]);
        assert_eq!(phases[1].active_groups, vec!["laneE2"]);
        // internal durations absorb trailing yellows
        assert_eq!(table.internal_durations, vec![33, 23]);
    }

    #[test]
    fn build_resets_the_live_signal() {
        let mut sim = sim_with_program(four_phase());
        sim.set_phase("J1", 2);
        let _table = PhaseTable::build(&mut sim, "J1", &links()).unwrap();
        assert_eq!(sim.current_phase("J1"), 0);
        assert_eq!(sim.current_program("J1"), "0");
    }

    #[test]
    fn shadow_countdown_cycles_through_the_program() {
        let mut sim = sim_with_program(four_phase());
        let mut table = PhaseTable::build(&mut sim, "J1", &links()).unwrap();
        assert_eq!(table.shadow_phase(), 0);
        for _ in 0..33 {
            table.step();
        }
        table.step();
        assert_eq!(table.shadow_phase(), 1);
        // full cycle brings it back
        for _ in 0..23 {
            table.step();
        }
        assert_eq!(table.shadow_phase(), 0);
    }

    #[test]
    fn restore_controller_writes_the_shadow_state_back() {
        let mut sim = sim_with_program(four_phase());
        let mut table = PhaseTable::build(&mut sim, "J1", &links()).unwrap();
        for _ in 0..5 {
            table.step();
        }
        // intervention moved the live signal elsewhere
        table.set_internal_phase(&mut sim, 1).unwrap();
        assert_eq!(sim.current_phase("J1"), 2);
        table.restore_controller(&mut sim);
        assert_eq!(sim.current_phase("J1"), 0);
    }

    #[test]
    fn internal_and_raw_phases_map_both_ways() {
        let mut sim = sim_with_program(four_phase());
        let table = PhaseTable::build(&mut sim, "J1", &links()).unwrap();
        sim.set_phase("J1", 2);
        assert_eq!(table.current_internal_phase(&sim).unwrap(), 1);
        // yellow raw phases map to the preceding internal phase
        sim.set_phase("J1", 1);
        assert_eq!(table.current_internal_phase(&sim).unwrap(), 0);
        assert!(matches!(
            table.set_internal_phase(&mut sim, 7),
            Err(TopologyError::UnknownPhase(7))
        ));
    }

    #[test]
    fn yellow_start_is_rejected() {
        let mut sim = sim_with_program(vec![
            SignalPhase::new(3, "yr"),
            SignalPhase::new(30, "rG"),
        ]);
        assert!(matches!(
            PhaseTable::build(&mut sim, "J1", &links()),
            Err(TopologyError::YellowStart(_))
        ));
    }

    #[test]
    fn reset_program_only_touches_foreign_programs() {
        let mut sim = sim_with_program(four_phase());
        let table = PhaseTable::build(&mut sim, "J1", &links()).unwrap();
        sim.set_program("J1", "5");
        table.reset_program(&mut sim);
        assert_eq!(sim.current_program("J1"), "0");
    }
}
