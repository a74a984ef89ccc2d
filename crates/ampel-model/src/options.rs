//! Shield construction parameters.
//!
//! One explicit value threaded through `LaneGroups`, `PhaseTable`, and
//! `Shield` construction; nothing in the workspace reads process-wide
//! configuration.

/// Parameters of the adaptive shielding pipeline.
#[derive(Debug, Clone)]
pub struct ShieldOptions {
    /// Global per-lane-group cap on the modeled occupancy bound
    /// (parameter K; also bounds upstream tree depth in vehicles).
    pub max_lane_size: u32,
    /// Initial per-lane-group occupancy bound.
    pub min_lane_size: u32,
    /// Ticks between adaptation passes.
    pub update_interval: u64,
    /// Ticks before the shield starts to adapt and intervene.
    pub warm_up_time: u64,
    /// Ticks between enforcement decisions.
    pub decision_stride: u64,
    /// Learning rate of the probability moving average.
    pub lambda: f64,
    /// Flat reward penalty per action mismatch (parameter d).
    pub reward_d: i64,
    /// Summed probability drift that triggers re-synthesis.
    pub prob_update_delta: f64,
    /// Per-dimension bound drift that triggers re-synthesis.
    pub bound_update_delta: u32,
    /// Re-synthesize on every update interval, ignoring drift.
    pub static_update: bool,
    /// Disable merging of parallel lanes into one group.
    pub no_merging: bool,
    /// Track occupancy on the controlled lanes only, without upstream
    /// topology trees.
    pub no_trees: bool,
}

impl Default for ShieldOptions {
    fn default() -> Self {
        Self {
            max_lane_size: 8,
            min_lane_size: 3,
            update_interval: 500,
            warm_up_time: 900,
            decision_stride: 5,
            lambda: 0.2,
            reward_d: 3,
            prob_update_delta: 0.01,
            bound_update_delta: 1,
            static_update: false,
            no_merging: false,
            no_trees: false,
        }
    }
}
