//! Upstream lane topology.
//!
//! The simulator only exposes downstream connectivity, so the tree of
//! lanes feeding a controlled lane is rebuilt by inverting forward links
//! and walking backward against traffic flow. Nodes live in an arena and
//! are addressed by index; edges point from a lane to its upstream
//! predecessors.

use ampel_sim::TrafficSim;
use std::collections::HashMap;
use tracing::warn;

use crate::errors::TopologyError;

/// Average vehicle length used to convert lane meters into queue slots.
const VEHICLE_LENGTH: f64 = 5.0;

type NodeId = usize;

#[derive(Debug, Clone)]
struct TreeNode {
    label: String,
    #[allow(dead_code)]
    length: f64,
    previous: Vec<NodeId>,
}

/// The tree of lanes upstream of one controlled lane, cut off once the
/// cumulative queue capacity along a branch reaches the configured
/// maximum lane size.
#[derive(Debug, Clone)]
pub struct LaneTree {
    nodes: Vec<TreeNode>,
    root: NodeId,
}

impl LaneTree {
    /// Walk backward from `lane` up to `max_lane_size` queue slots.
    ///
    /// A lane recurring on the path being built means the network has a
    /// cycle; reconstruction fails instead of looping.
    pub fn build<S: TrafficSim + ?Sized>(
        sim: &S,
        lane: &str,
        max_lane_size: u32,
        virt: bool,
    ) -> Result<Self, TopologyError> {
        let mut tree = Self {
            nodes: Vec::new(),
            root: 0,
        };
        let mut path = Vec::new();
        tree.root = tree.grow(sim, lane, lane, 0.0, f64::from(max_lane_size), virt, &mut path)?;
        Ok(tree)
    }

    fn grow<S: TrafficSim + ?Sized>(
        &mut self,
        sim: &S,
        root_lane: &str,
        lane: &str,
        depth: f64,
        cutoff: f64,
        virt: bool,
        path: &mut Vec<String>,
    ) -> Result<NodeId, TopologyError> {
        if path.iter().any(|seen| seen == lane) {
            return Err(TopologyError::Cycle {
                root: root_lane.to_string(),
                lane: lane.to_string(),
            });
        }

        let length = sim.lane_length(lane);
        let label = if virt {
            sim.virtual_lane_id(lane)
        } else {
            lane.to_string()
        };
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            label,
            length,
            previous: Vec::new(),
        });

        let depth = depth + length / VEHICLE_LENGTH;
        if depth >= cutoff {
            return Ok(id);
        }

        path.push(lane.to_string());
        for prev in sim.incoming_lanes(lane) {
            let branch = self.grow(sim, root_lane, &prev, depth, cutoff, virt, path)?;
            self.nodes[id].previous.push(branch);
        }
        path.pop();

        Ok(id)
    }

    pub fn root_label(&self) -> &str {
        &self.nodes[self.root].label
    }

    /// All lane labels in the tree, root first.
    pub fn labels(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.nodes.len());
        self.collect_labels(self.root, &mut out);
        out
    }

    fn collect_labels(&self, node: NodeId, out: &mut Vec<String>) {
        out.push(self.nodes[node].label.clone());
        for &prev in &self.nodes[node].previous {
            self.collect_labels(prev, out);
        }
    }

    /// Current (vehicle, halting) counts along the tree.
    ///
    /// Parallel upstream branches usually model the same physical queue,
    /// so sibling contributions are combined with `max`, not summed. An
    /// empty lane cuts the count there; continuous queues past long lanes
    /// belong to other intersections.
    pub fn track<S: TrafficSim + ?Sized>(&self, sim: &S) -> (u32, u32) {
        self.track_node(sim, self.root)
    }

    fn track_node<S: TrafficSim + ?Sized>(&self, sim: &S, node: NodeId) -> (u32, u32) {
        let here = &self.nodes[node];
        let vehicles = sim.lane_vehicle_count(&here.label);
        let halting = sim.lane_halting_count(&here.label);

        let mut parallel_vehicles = 0;
        let mut parallel_halting = 0;
        for &prev in &here.previous {
            let (v, h) = self.track_node(sim, prev);
            parallel_vehicles = parallel_vehicles.max(v);
            parallel_halting = parallel_halting.max(h);
        }

        let v = if vehicles != 0 {
            vehicles + parallel_vehicles
        } else {
            0
        };
        let h = if halting != 0 {
            halting + parallel_halting
        } else {
            0
        };
        (v, h)
    }

    /// Consistency check over every tree of one intersection.
    ///
    /// A label occurring twice inside a single tree would double count one
    /// queue and is fatal. The same label in two different trees of the
    /// intersection can be legitimate (shared upstream lanes) and is only
    /// logged.
    pub fn validate_forest(trees: &[&LaneTree]) -> Result<(), TopologyError> {
        let mut global: HashMap<String, u32> = HashMap::new();

        for tree in trees {
            let labels = tree.labels();
            let mut local: HashMap<&str, u32> = HashMap::new();
            for label in &labels {
                *local.entry(label.as_str()).or_default() += 1;
                *global.entry(label.clone()).or_default() += 1;
            }
            for (label, count) in local {
                if count != 1 {
                    return Err(TopologyError::Cycle {
                        root: tree.root_label().to_string(),
                        lane: label.to_string(),
                    });
                }
            }
        }

        for (label, count) in global {
            if count > 1 {
                warn!(%label, count, "lane appears in several upstream trees");
            }
        }
        Ok(())
    }
}
