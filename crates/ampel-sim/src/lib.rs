#![doc = include_str!("../README.md")]

pub mod labels;
pub mod scripted;
pub mod types;

use types::{ControlledLink, LaneLink, SignalProgram};

/// Capability interface over the traffic simulator.
///
/// This is the only surface the shielding core sees. A production
/// implementation wraps a live simulator connection; tests use
/// [`scripted::ScriptedSim`]. The simulator exposes forward (outgoing)
/// connectivity only, so upstream lanes are derived by inverting the
/// forward links of every lane (see [`TrafficSim::incoming_lanes`]).
pub trait TrafficSim {
    /// Current discrete simulation tick.
    fn time_step(&self) -> u64;

    /// All lane identifiers in the network.
    fn lane_ids(&self) -> Vec<String>;

    /// Length of a lane in meters.
    fn lane_length(&self, lane: &str) -> f64;

    /// Number of vehicles on the lane in the last step.
    fn lane_vehicle_count(&self, lane: &str) -> u32;

    /// Number of halting (queued) vehicles on the lane in the last step.
    fn lane_halting_count(&self, lane: &str) -> u32;

    /// Forward connections of a lane.
    fn lane_links(&self, lane: &str) -> Vec<LaneLink>;

    /// Number of vehicles currently in the whole network.
    fn vehicle_count(&self) -> usize;

    /// Controlled-link table of a signalized intersection: one list of
    /// connections per signal-state index.
    fn controlled_links(&self, tls: &str) -> Vec<Vec<ControlledLink>>;

    /// The full signal program of an intersection (phases, durations,
    /// state strings).
    fn program_logic(&self, tls: &str) -> SignalProgram;

    /// Index of the phase the live signal currently shows.
    fn current_phase(&self, tls: &str) -> usize;

    /// Identifier of the program the live signal currently runs.
    fn current_program(&self, tls: &str) -> String;

    fn set_phase(&mut self, tls: &str, phase: usize);

    fn set_program(&mut self, tls: &str, program: &str);

    /// Remaining duration of the current phase, in ticks.
    fn set_phase_duration(&mut self, tls: &str, duration: u32);

    /// Whether the lane belongs to an edge configured for a parallel
    /// priority-traffic shadow variable.
    fn has_virtual_lane(&self, _lane: &str) -> bool {
        false
    }

    /// Label of the priority shadow of a lane.
    fn virtual_lane_id(&self, lane: &str) -> String {
        format!("prio_{lane}")
    }

    /// Lanes whose forward links lead into `lane`, derived by scanning the
    /// forward connectivity of the whole network. Sorted and deduplicated.
    fn incoming_lanes(&self, lane: &str) -> Vec<String> {
        let mut incoming: Vec<String> = Vec::new();
        for candidate in self.lane_ids() {
            if self
                .lane_links(&candidate)
                .iter()
                .any(|l| l.approached_lane == lane)
            {
                incoming.push(candidate);
            }
        }
        incoming.sort();
        incoming.dedup();
        incoming
    }
}
