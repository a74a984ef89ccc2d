use thiserror::Error;

/// Errors raised while reconstructing the static structure of one
/// intersection. All of them are fatal for that intersection only; the
/// driver catches them at shield construction time and runs the
/// intersection unshielded.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The same lane recurs on one root-to-leaf path of an upstream tree;
    /// the network contains a cycle the model cannot express.
    #[error("lane {lane} recurs on one upstream path of {root}")]
    Cycle { root: String, lane: String },
    /// A phase gives green (or red) to every controlled link at once.
    #[error("intersection {tls}: phase state {state} leaves no scheduling choice")]
    DegeneratePhase { tls: String, state: String },
    /// A controlled-link index carries connections from different lanes.
    #[error("intersection {tls}: controlled link {index} mixes upstream lanes")]
    InconsistentLink { tls: String, index: usize },
    /// A raw lane id does not follow the `<edge>_<index>` convention the
    /// merge heuristic relies on.
    #[error("lane id {0} does not split into edge and index")]
    UnsupportedLaneName(String),
    /// The signal program starts with a yellow phase.
    #[error("intersection {0}: program starts with a yellow phase")]
    YellowStart(String),
    /// An internal phase id outside the dense alphabet.
    #[error("unknown internal phase {0}")]
    UnknownPhase(usize),
}
