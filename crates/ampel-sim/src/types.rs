//! Wire types shared between the simulator boundary and the core.

/// A forward connection from one lane to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneLink {
    pub from_lane: String,
    pub approached_lane: String,
}

/// One connection of a controlled link of a signalized intersection.
///
/// The signal-state string has one character per controlled-link index;
/// each index can carry several connections, all starting from the same
/// upstream lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlledLink {
    pub from_lane: String,
    pub to_lane: String,
}

/// One phase of a signal program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalPhase {
    /// Phase duration in ticks.
    pub duration: u32,
    /// Signal-state string, one character per controlled-link index
    /// (`G`/`g` green, `r`/`R` red, `y`/`Y` yellow).
    pub state: String,
}

impl SignalPhase {
    pub fn new(duration: u32, state: impl Into<String>) -> Self {
        Self {
            duration,
            state: state.into(),
        }
    }

    /// A phase is a yellow (clearance) phase if any link shows yellow.
    pub fn is_yellow(&self) -> bool {
        self.state.contains(['y', 'Y'])
    }
}

/// A complete signal program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalProgram {
    pub program_id: String,
    pub phases: Vec<SignalPhase>,
}
