//! Grouping of raw lanes into internal state-space dimensions.
//!
//! Two parallel lanes that are given green in exactly the same single
//! phase model one physical queue and collapse into one lane group.
//! Ambiguous phase membership disqualifies merging; a lane that is green
//! in every non-yellow phase never constrains scheduling and is dropped
//! from the state space entirely.

use std::collections::{BTreeMap, BTreeSet};

use ampel_model::ShieldOptions;
use ampel_sim::labels::format_label;
use ampel_sim::types::SignalProgram;
use ampel_sim::TrafficSim;
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::errors::TopologyError;
use crate::lane_tree::LaneTree;

/// One internal state-space dimension, possibly merging several raw lanes.
#[derive(Debug, Clone)]
pub struct LaneGroup {
    /// Raw lanes collapsed into this group.
    pub raw_lanes: Vec<String>,
    /// One upstream tree per raw lane.
    pub trees: Vec<LaneTree>,
    /// Non-yellow phase indices giving the group green; identical for
    /// every member.
    pub green_phases: BTreeSet<usize>,
}

/// The lane groups of one intersection plus the per-controlled-link table
/// of group labels consumed by the phase table.
#[derive(Debug, Clone)]
pub struct LaneGroups {
    tls: String,
    groups: IndexMap<String, LaneGroup>,
    grouped_links: Vec<Vec<String>>,
    non_yellow: usize,
}

impl LaneGroups {
    pub fn build<S: TrafficSim + ?Sized>(
        sim: &S,
        tls: &str,
        options: &ShieldOptions,
    ) -> Result<Self, TopologyError> {
        let program = sim.program_logic(tls);
        check_program(tls, &program)?;

        let links = sim.controlled_links(tls);
        let mut link_lanes = Vec::with_capacity(links.len());
        for (index, connections) in links.iter().enumerate() {
            let mut from = None;
            for connection in connections {
                match &from {
                    None => from = Some(connection.from_lane.clone()),
                    Some(lane) if *lane == connection.from_lane => {}
                    Some(_) => {
                        return Err(TopologyError::InconsistentLink {
                            tls: tls.to_string(),
                            index,
                        })
                    }
                }
            }
            link_lanes.push(from.unwrap_or_default());
        }

        // Per raw lane: the set of non-yellow phase indices giving it green.
        let mut non_yellow = 0;
        let mut green_phases: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
        for (raw_phase, phase) in program.phases.iter().enumerate() {
            if phase.is_yellow() {
                continue;
            }
            non_yellow += 1;
            for (index, signal) in phase.state.chars().enumerate() {
                if matches!(signal, 'g' | 'G') {
                    if let Some(lane) = link_lanes.get(index) {
                        if !lane.is_empty() {
                            green_phases.entry(lane.clone()).or_default().insert(raw_phase);
                        }
                    }
                }
            }
        }

        let mut builder = Self {
            tls: tls.to_string(),
            groups: IndexMap::new(),
            grouped_links: Vec::with_capacity(link_lanes.len()),
            non_yellow,
        };

        for lane in &link_lanes {
            let mut labels = Vec::new();
            if lane.is_empty() {
                builder.grouped_links.push(labels);
                continue;
            }
            if let Some(label) =
                builder.insert(sim, lane, &green_phases, !options.no_merging, false, options)?
            {
                labels.push(label);
            }
            if sim.has_virtual_lane(lane) {
                info!(tls, lane, "adding priority shadow lane");
                if let Some(label) =
                    builder.insert(sim, lane, &green_phases, false, true, options)?
                {
                    labels.push(label);
                }
            }
            builder.grouped_links.push(labels);
        }

        builder.validate_trees()?;
        Ok(builder)
    }

    fn insert<S: TrafficSim + ?Sized>(
        &mut self,
        sim: &S,
        raw_lane: &str,
        green_phases: &BTreeMap<String, BTreeSet<usize>>,
        merge: bool,
        virt: bool,
        options: &ShieldOptions,
    ) -> Result<Option<String>, TopologyError> {
        let lane_id = if virt {
            sim.virtual_lane_id(raw_lane)
        } else {
            raw_lane.to_string()
        };
        let phase_set = green_phases.get(&lane_id).cloned().unwrap_or_default();

        // A lane green in every non-yellow phase would only bloat the
        // state space without ever constraining the schedule.
        if !virt && phase_set.len() >= self.non_yellow {
            warn!(tls = %self.tls, lane = %lane_id, "lane is always green, excluded");
            return Ok(None);
        }

        // Merging is only safe when the phase membership is unambiguous.
        let merge = merge && phase_set.len() == 1 && !virt;

        let mut label = lane_id.clone();
        if merge {
            let parts: Vec<&str> = lane_id.split('_').collect();
            if parts.len() != 2 {
                return Err(TopologyError::UnsupportedLaneName(lane_id));
            }
            label = parts[0].to_string();
        }
        let mut label = format_label(&label);

        // Lanes may only share a group when they agree on every green
        // phase, not just on the count.
        if merge {
            if let Some(existing) = self.groups.get(&label) {
                if existing.green_phases != phase_set {
                    warn!(
                        tls = %self.tls,
                        lane = %lane_id,
                        "parallel lanes disagree on green phases, not merging"
                    );
                    label = format_label(&lane_id);
                }
            }
        }

        let group = self.groups.entry(label.clone()).or_insert_with(|| LaneGroup {
            raw_lanes: Vec::new(),
            trees: Vec::new(),
            green_phases: phase_set,
        });
        if !group.raw_lanes.iter().any(|l| l == &lane_id) {
            let tree = LaneTree::build(sim, raw_lane, options.max_lane_size, virt)?;
            group.raw_lanes.push(lane_id);
            group.trees.push(tree);
        }
        debug_assert_eq!(group.raw_lanes.len(), group.trees.len());

        Ok(Some(label))
    }

    fn validate_trees(&self) -> Result<(), TopologyError> {
        let trees: Vec<&LaneTree> = self
            .groups
            .values()
            .flat_map(|g| g.trees.iter())
            .collect();
        LaneTree::validate_forest(&trees)
    }

    /// Group labels in insertion order; the fixed state-space dimension
    /// order of everything downstream.
    pub fn labels(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    pub fn group(&self, label: &str) -> Option<&LaneGroup> {
        self.groups.get(label)
    }

    /// Group labels per controlled-link index.
    pub fn grouped_links(&self) -> &[Vec<String>] {
        &self.grouped_links
    }

    pub fn non_yellow_phases(&self) -> usize {
        self.non_yellow
    }
}

/// Reject programs the model cannot express before any work happens.
fn check_program(tls: &str, program: &SignalProgram) -> Result<(), TopologyError> {
    for phase in &program.phases {
        if phase.is_yellow() {
            continue;
        }
        let len = phase.state.chars().count();
        let green = phase
            .state
            .chars()
            .filter(|c| matches!(c, 'g' | 'G'))
            .count();
        let red = phase
            .state
            .chars()
            .filter(|c| matches!(c, 'r' | 'R'))
            .count();
        if len > 0 && (green == len || red == len) {
            return Err(TopologyError::DegeneratePhase {
                tls: tls.to_string(),
                state: phase.state.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ampel_sim::scripted::ScriptedSim;
    use ampel_sim::types::{ControlledLink, SignalPhase};

    fn link(from: &str) -> Vec<ControlledLink> {
        vec![ControlledLink {
            from_lane: from.to_string(),
            to_lane: "out".to_string(),
        }]
    }

    /// Two parallel approach lanes on edge E1 (green in phase 0), one
    /// cross lane on E2 (green in phase 2); phases 1 and 3 are yellow.
    fn cross_sim() -> ScriptedSim {
        let mut sim = ScriptedSim::new();
        sim.add_lane("E1_0", 30.0, &["out"]);
        sim.add_lane("E1_1", 30.0, &["out"]);
        sim.add_lane("E2_0", 30.0, &["out"]);
        sim.add_lane("out", 30.0, &[]);
        let program = SignalProgram {
            program_id: "0".to_string(),
            phases: vec![
                SignalPhase::new(30, "GGr"),
                SignalPhase::new(3, "yyr"),
                SignalPhase::new(30, "rrG"),
                SignalPhase::new(3, "rry"),
            ],
        };
        sim.add_signal(
            "J1",
            program,
            vec![link("E1_0"), link("E1_1"), link("E2_0")],
        );
        sim
    }

    #[test]
    fn parallel_same_phase_lanes_merge() {
        let sim = cross_sim();
        let groups = LaneGroups::build(&sim, "J1", &ShieldOptions::default()).unwrap();
        let labels = groups.labels();
        assert_eq!(labels, vec!["laneE1", "laneE2"]);
        let merged = groups.group("laneE1").unwrap();
        assert_eq!(merged.raw_lanes, vec!["E1_0", "E1_1"]);
        assert_eq!(merged.trees.len(), 2);
        assert_eq!(groups.non_yellow_phases(), 2);
    }

    #[test]
    fn no_merging_keeps_lanes_apart() {
        let sim = cross_sim();
        let options = ShieldOptions {
            no_merging: true,
            ..ShieldOptions::default()
        };
        let groups = LaneGroups::build(&sim, "J1", &options).unwrap();
        assert_eq!(
            groups.labels(),
            vec!["laneE1_0", "laneE1_1", "laneE2_0"]
        );
    }

    #[test]
    fn ambiguous_phase_membership_disqualifies_merging() {
        let mut sim = cross_sim();
        sim.add_lane("E3_0", 30.0, &["out"]);
        // Three non-yellow phases; E1_1 is green in two of them, so it is
        // ambiguous without being always green.
        let program = SignalProgram {
            program_id: "0".to_string(),
            phases: vec![
                SignalPhase::new(30, "GGrr"),
                SignalPhase::new(3, "yyrr"),
                SignalPhase::new(30, "rGGr"),
                SignalPhase::new(3, "rryr"),
                SignalPhase::new(20, "rrrG"),
                SignalPhase::new(3, "rrry"),
            ],
        };
        sim.add_signal(
            "J1",
            program,
            vec![link("E1_0"), link("E1_1"), link("E2_0"), link("E3_0")],
        );
        let groups = LaneGroups::build(&sim, "J1", &ShieldOptions::default()).unwrap();
        assert_eq!(
            groups.labels(),
            vec!["laneE1", "laneE1_1", "laneE2", "laneE3"]
        );
        // the single-phase lane still merges by edge, alone in its group
        assert_eq!(
            groups.group("laneE1").unwrap().raw_lanes,
            vec!["E1_0"]
        );
    }

    #[test]
    fn disagreeing_single_phase_lanes_do_not_merge() {
        let mut sim = cross_sim();
        // E1_0 and E1_1 are each green in exactly one phase, but not the
        // same one.
        let program = SignalProgram {
            program_id: "0".to_string(),
            phases: vec![
                SignalPhase::new(30, "Grr"),
                SignalPhase::new(3, "yrr"),
                SignalPhase::new(30, "rGG"),
                SignalPhase::new(3, "ryy"),
            ],
        };
        sim.add_signal(
            "J1",
            program,
            vec![link("E1_0"), link("E1_1"), link("E2_0")],
        );
        let groups = LaneGroups::build(&sim, "J1", &ShieldOptions::default()).unwrap();
        assert_eq!(groups.labels(), vec!["laneE1", "laneE1_1", "laneE2"]);
        assert_eq!(groups.group("laneE1").unwrap().raw_lanes, vec!["E1_0"]);
        assert_eq!(
            groups.group("laneE1_1").unwrap().raw_lanes,
            vec!["E1_1"]
        );
    }

    #[test]
    fn always_green_lane_is_excluded() {
        let mut sim = cross_sim();
        let program = SignalProgram {
            program_id: "0".to_string(),
            phases: vec![
                SignalPhase::new(30, "GGr"),
                SignalPhase::new(3, "yyr"),
                SignalPhase::new(30, "GrG"),
                SignalPhase::new(3, "rry"),
            ],
        };
        sim.add_signal(
            "J1",
            program,
            vec![link("E1_0"), link("E1_1"), link("E2_0")],
        );
        let groups = LaneGroups::build(&sim, "J1", &ShieldOptions::default()).unwrap();
        assert!(groups.labels().iter().all(|l| !l.contains("E1_0")));
        assert_eq!(groups.grouped_links()[0], Vec::<String>::new());
    }

    #[test]
    fn all_green_phase_is_rejected() {
        let mut sim = cross_sim();
        let program = SignalProgram {
            program_id: "0".to_string(),
            phases: vec![SignalPhase::new(30, "GGG"), SignalPhase::new(30, "rrG")],
        };
        sim.add_signal(
            "J1",
            program,
            vec![link("E1_0"), link("E1_1"), link("E2_0")],
        );
        let err = LaneGroups::build(&sim, "J1", &ShieldOptions::default()).unwrap_err();
        assert!(matches!(err, TopologyError::DegeneratePhase { .. }));
    }

    #[test]
    fn all_red_phase_is_rejected() {
        let mut sim = cross_sim();
        let program = SignalProgram {
            program_id: "0".to_string(),
            phases: vec![SignalPhase::new(30, "Grr"), SignalPhase::new(30, "rrr")],
        };
        sim.add_signal(
            "J1",
            program,
            vec![link("E1_0"), link("E1_1"), link("E2_0")],
        );
        assert!(matches!(
            LaneGroups::build(&sim, "J1", &ShieldOptions::default()),
            Err(TopologyError::DegeneratePhase { .. })
        ));
    }

    #[test]
    fn virtual_lanes_get_their_own_group() {
        let mut sim = cross_sim();
        sim.add_virtual_edge("E2");
        let groups = LaneGroups::build(&sim, "J1", &ShieldOptions::default()).unwrap();
        assert_eq!(
            groups.labels(),
            vec!["laneE1", "laneE2", "laneprio_E2_0"]
        );
        assert_eq!(
            groups.grouped_links()[2],
            vec!["laneE2", "laneprio_E2_0"]
        );
    }

    #[test]
    fn merged_groups_share_one_label_per_link() {
        let sim = cross_sim();
        let groups = LaneGroups::build(&sim, "J1", &ShieldOptions::default()).unwrap();
        assert_eq!(groups.grouped_links()[0], vec!["laneE1"]);
        assert_eq!(groups.grouped_links()[1], vec!["laneE1"]);
        assert_eq!(groups.grouped_links()[2], vec!["laneE2"]);
    }
}
