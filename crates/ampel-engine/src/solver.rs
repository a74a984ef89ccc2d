//! External model-checker invocation.
//!
//! One solver process per synthesis, run to completion on the calling
//! thread. The registry allows at most one outstanding job per shield
//! identity; a second request while one is running is dropped. The
//! solver enforces its own timeout, so no wall clock is kept here.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Command;

use tracing::{info, warn};

use crate::model_gen::ModelPaths;

/// Where and how to run the model checker.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub binary: PathBuf,
    /// Self-enforced solver timeout, passed on the command line.
    pub timeout_secs: u64,
    /// Directory for generated models, scheduler exports, and logs.
    pub out_dir: PathBuf,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("/usr/bin/storm"),
            timeout_secs: 180,
            out_dir: PathBuf::from("out"),
        }
    }
}

/// Result of one synthesis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisOutcome {
    /// Clean exit; the scheduler file is ready to parse.
    Success,
    /// Non-zero exit, signal death, or failure to start.
    Failure,
    /// A job for this shield is already outstanding; request dropped.
    AlreadyRunning,
}

/// At most one solver job per shield identity.
#[derive(Debug, Default)]
pub struct JobRegistry {
    running: HashSet<String>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.running.contains(id)
    }

    /// Run one synthesis job to completion.
    pub fn run(&mut self, id: &str, config: &SolverConfig, paths: &ModelPaths) -> SynthesisOutcome {
        if !self.running.insert(id.to_string()) {
            return SynthesisOutcome::AlreadyRunning;
        }
        let outcome = run_solver(id, config, paths);
        self.running.remove(id);
        outcome
    }
}

fn run_solver(id: &str, config: &SolverConfig, paths: &ModelPaths) -> SynthesisOutcome {
    let mut command = Command::new(&config.binary);
    command
        .arg("--prism")
        .arg(&paths.prism)
        .arg("--prop")
        .arg(&paths.props)
        .arg("--exportscheduler")
        .arg(&paths.scheduler)
        .arg("--buildstateval")
        .arg("--buildchoicelab")
        .arg("--timeout")
        .arg(config.timeout_secs.to_string());

    // capture solver chatter next to the model files
    if let Ok(log) = OpenOptions::new().create(true).append(true).open(&paths.log) {
        if let Ok(stderr) = log.try_clone() {
            command.stdout(log).stderr(stderr);
        }
    }

    match command.status() {
        Ok(status) if status.success() => {
            info!(id, "solver finished");
            SynthesisOutcome::Success
        }
        Ok(status) => {
            warn!(id, %status, "solver did not succeed");
            SynthesisOutcome::Failure
        }
        Err(error) => {
            warn!(id, %error, binary = %config.binary.display(), "solver did not start");
            SynthesisOutcome::Failure
        }
    }
}
