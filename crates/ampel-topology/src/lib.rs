#![doc = include_str!("../README.md")]

pub mod errors;
pub mod lane_groups;
pub mod lane_tree;
pub mod phase_table;

pub use errors::TopologyError;
pub use lane_groups::LaneGroups;
pub use lane_tree::LaneTree;
pub use phase_table::PhaseTable;
