#![doc = include_str!("../README.md")]

pub mod errors;
pub mod intersection;
pub mod model_gen;
pub mod shield;
pub mod solver;
pub mod strategy;

pub use errors::EngineError;
pub use intersection::{Intersection, ShieldedNetwork, TickReport};
pub use model_gen::{ModelGenerator, ModelPaths};
pub use shield::{Shield, ShieldState};
pub use solver::{JobRegistry, SolverConfig, SynthesisOutcome};
pub use strategy::Strategy;
