#![doc = include_str!("../README.md")]

pub mod config;
pub mod controller;
pub mod environment;
pub mod errors;
pub mod options;
pub mod pmf;

pub use controller::{Controller, PhaseInfo};
pub use environment::Environment;
pub use errors::{ConfigError, ModelError};
pub use options::ShieldOptions;
