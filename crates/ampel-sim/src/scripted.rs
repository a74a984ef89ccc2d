//! In-memory simulator used by the test suites.

use indexmap::IndexMap;
use std::collections::BTreeSet;

use crate::types::{ControlledLink, LaneLink, SignalProgram};
use crate::TrafficSim;

#[derive(Debug, Clone, Default)]
struct LaneState {
    length: f64,
    vehicles: u32,
    halting: u32,
    /// Forward connections (lane ids this lane leads into).
    outgoing: Vec<String>,
}

#[derive(Debug, Clone)]
struct SignalState {
    program: SignalProgram,
    controlled_links: Vec<Vec<ControlledLink>>,
    current_phase: usize,
    current_program: String,
    phase_duration: u32,
}

/// A scripted network: lanes, signals, and counts are set directly by the
/// test and advanced tick by tick.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSim {
    time: u64,
    lanes: IndexMap<String, LaneState>,
    signals: IndexMap<String, SignalState>,
    virtual_edges: BTreeSet<String>,
}

impl ScriptedSim {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_lane(&mut self, id: &str, length: f64, outgoing: &[&str]) {
        self.lanes.insert(
            id.to_string(),
            LaneState {
                length,
                outgoing: outgoing.iter().map(|s| s.to_string()).collect(),
                ..LaneState::default()
            },
        );
    }

    pub fn add_signal(
        &mut self,
        id: &str,
        program: SignalProgram,
        controlled_links: Vec<Vec<ControlledLink>>,
    ) {
        let phase_duration = program.phases.first().map(|p| p.duration).unwrap_or(0);
        self.signals.insert(
            id.to_string(),
            SignalState {
                current_program: program.program_id.clone(),
                program,
                controlled_links,
                current_phase: 0,
                phase_duration,
            },
        );
    }

    /// Mark an edge as carrying priority traffic; every lane on it gets a
    /// virtual shadow.
    pub fn add_virtual_edge(&mut self, edge: &str) {
        self.virtual_edges.insert(edge.to_string());
    }

    pub fn set_counts(&mut self, lane: &str, vehicles: u32, halting: u32) {
        if let Some(state) = self.lanes.get_mut(lane) {
            state.vehicles = vehicles;
            state.halting = halting;
        }
    }

    pub fn advance(&mut self) {
        self.time += 1;
    }
}

impl TrafficSim for ScriptedSim {
    fn time_step(&self) -> u64 {
        self.time
    }

    fn lane_ids(&self) -> Vec<String> {
        self.lanes.keys().cloned().collect()
    }

    fn lane_length(&self, lane: &str) -> f64 {
        self.lanes.get(lane).map(|l| l.length).unwrap_or(0.0)
    }

    fn lane_vehicle_count(&self, lane: &str) -> u32 {
        self.lanes.get(lane).map(|l| l.vehicles).unwrap_or(0)
    }

    fn lane_halting_count(&self, lane: &str) -> u32 {
        self.lanes.get(lane).map(|l| l.halting).unwrap_or(0)
    }

    fn lane_links(&self, lane: &str) -> Vec<LaneLink> {
        let Some(state) = self.lanes.get(lane) else {
            return Vec::new();
        };
        state
            .outgoing
            .iter()
            .map(|next| LaneLink {
                from_lane: lane.to_string(),
                approached_lane: next.clone(),
            })
            .collect()
    }

    fn vehicle_count(&self) -> usize {
        self.lanes.values().map(|l| l.vehicles as usize).sum()
    }

    fn controlled_links(&self, tls: &str) -> Vec<Vec<ControlledLink>> {
        self.signals
            .get(tls)
            .map(|s| s.controlled_links.clone())
            .unwrap_or_default()
    }

    fn program_logic(&self, tls: &str) -> SignalProgram {
        self.signals
            .get(tls)
            .map(|s| s.program.clone())
            .unwrap_or(SignalProgram {
                program_id: "0".to_string(),
                phases: Vec::new(),
            })
    }

    fn current_phase(&self, tls: &str) -> usize {
        self.signals.get(tls).map(|s| s.current_phase).unwrap_or(0)
    }

    fn current_program(&self, tls: &str) -> String {
        self.signals
            .get(tls)
            .map(|s| s.current_program.clone())
            .unwrap_or_else(|| "0".to_string())
    }

    fn set_phase(&mut self, tls: &str, phase: usize) {
        if let Some(signal) = self.signals.get_mut(tls) {
            signal.current_phase = phase;
        }
    }

    fn set_program(&mut self, tls: &str, program: &str) {
        if let Some(signal) = self.signals.get_mut(tls) {
            signal.current_program = program.to_string();
        }
    }

    fn set_phase_duration(&mut self, tls: &str, duration: u32) {
        if let Some(signal) = self.signals.get_mut(tls) {
            signal.phase_duration = duration;
        }
    }

    fn has_virtual_lane(&self, lane: &str) -> bool {
        self.virtual_edges
            .iter()
            .any(|edge| lane.starts_with(edge.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalPhase;

    #[test]
    fn incoming_lanes_invert_forward_links() {
        let mut sim = ScriptedSim::new();
        sim.add_lane("a", 50.0, &["c"]);
        sim.add_lane("b", 50.0, &["c"]);
        sim.add_lane("c", 50.0, &[]);

        assert_eq!(sim.incoming_lanes("c"), vec!["a", "b"]);
        assert!(sim.incoming_lanes("a").is_empty());
    }

    #[test]
    fn signal_state_is_scriptable() {
        let mut sim = ScriptedSim::new();
        let program = SignalProgram {
            program_id: "0".to_string(),
            phases: vec![SignalPhase::new(30, "Gr"), SignalPhase::new(30, "rG")],
        };
        sim.add_signal("tls", program, Vec::new());

        assert_eq!(sim.current_phase("tls"), 0);
        sim.set_phase("tls", 1);
        assert_eq!(sim.current_phase("tls"), 1);
        assert_eq!(sim.current_program("tls"), "0");
    }

    #[test]
    fn virtual_edges_cover_their_lanes() {
        let mut sim = ScriptedSim::new();
        sim.add_lane("busway_0", 80.0, &[]);
        sim.add_lane("side_0", 80.0, &[]);
        sim.add_virtual_edge("busway");

        assert!(sim.has_virtual_lane("busway_0"));
        assert!(!sim.has_virtual_lane("side_0"));
        assert_eq!(sim.virtual_lane_id("busway_0"), "prio_busway_0");
    }
}
