//! Rendering of the checkable model.
//!
//! The model has four parts kept in lock-step by a 3-valued turn variable
//! (`move`): the environment fills lanes, the controller claims an action,
//! the shield either honors the claim and drains the served lanes or does
//! nothing, and the arbiter cycles the turn. Rewards penalize claimed/
//! actual mismatches and the worst pairwise queue imbalance, and the
//! property asks for the long-run-average minimum over them.
//!
//! Generation is a pure function of the current `Environment` and
//! `Controller` values; identical inputs render byte-identical text.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ampel_model::config::ModuleBlocks;
use ampel_model::{Controller, Environment};

/// Reliability of the controller actually showing the phase it claims.
const CLAIM_RELIABILITY: f64 = 0.9;

/// Every file derived from one model prefix.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub prism: PathBuf,
    pub props: PathBuf,
    pub scheduler: PathBuf,
    pub strategy: PathBuf,
    pub log: PathBuf,
}

impl ModelPaths {
    pub fn new(dir: &Path, prefix: &str) -> Self {
        Self {
            prism: dir.join(format!("{prefix}.prism")),
            props: dir.join(format!("{prefix}.props")),
            scheduler: dir.join(format!("{prefix}.sched")),
            strategy: dir.join(format!("{prefix}.strat")),
            log: dir.join(format!("{prefix}.solver.log")),
        }
    }
}

/// Renders the model and property files of one intersection.
///
/// The module line blocks are rendered once from the topology (they only
/// reference symbolic constants); the learned probabilities and bounds
/// enter as constant declarations on every [`Self::prism_text`] call.
#[derive(Debug, Clone)]
pub struct ModelGenerator {
    prefix: String,
    model_type: String,
    properties: Vec<String>,
    arbiter: Vec<String>,
    environment: Vec<String>,
    controller: Vec<String>,
    shield: Vec<String>,
    rewards: Vec<String>,
}

impl ModelGenerator {
    pub fn new(
        prefix: &str,
        environment: &Environment,
        controller: &Controller,
        reward_d: i64,
    ) -> Self {
        Self {
            prefix: prefix.to_string(),
            model_type: "mdp".to_string(),
            properties: vec!["Rmin=? [ LRA ]".to_string()],
            arbiter: render_arbiter(controller),
            environment: render_environment(environment),
            controller: render_controller(controller),
            shield: render_shield(controller),
            rewards: render_rewards(controller, reward_d),
        }
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub fn set_model_type(&mut self, model_type: String) {
        self.model_type = model_type;
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn set_properties(&mut self, properties: Vec<String>) {
        self.properties = properties;
    }

    /// Module text blocks in the shape the persisted configuration stores.
    pub fn modules(&self) -> ModuleBlocks {
        ModuleBlocks {
            arbiter: self.arbiter.clone(),
            environment: self.environment.clone(),
            controller: self.controller.clone(),
            shield: self.shield.clone(),
            rewards: self.rewards.clone(),
        }
    }

    pub fn set_modules(&mut self, modules: ModuleBlocks) {
        self.arbiter = modules.arbiter;
        self.environment = modules.environment;
        self.controller = modules.controller;
        self.shield = modules.shield;
        self.rewards = modules.rewards;
    }

    pub fn props_text(&self) -> String {
        let mut out = String::new();
        for property in &self.properties {
            out.push_str(property);
            out.push('\n');
        }
        out
    }

    pub fn prism_text(&self, environment: &Environment, controller: &Controller) -> String {
        let mut out = String::new();
        out.push_str(&self.model_type);
        out.push_str("\n\n");

        for (label, p) in environment.labels().iter().zip(environment.probabilities()) {
            out.push_str(&format!("const double {label}Prob = {p:.6};\n"));
        }
        out.push('\n');

        for (label, bound) in environment.labels().iter().zip(environment.bounds()) {
            out.push_str(&format!("const int {label}Max = {bound};\n"));
        }
        out.push('\n');

        for (label, p) in controller.action_labels().iter().zip(controller.probabilities()) {
            out.push_str(&format!("const double {label}Prob = {p:.6};\n"));
        }
        out.push('\n');

        out.push_str("module arbiter\n");
        out.push_str("\tmove : [0 .. 2] init 0;\n");
        for line in &self.arbiter {
            out.push_str(&format!("\t{line}\n"));
        }
        out.push_str("endmodule\n\n");

        out.push_str("module controller\n");
        out.push_str(&format!(
            "\taction : [0 .. {}] init 0;\n",
            controller.len() - 1
        ));
        for line in &self.controller {
            out.push_str(&format!("\t{line}\n"));
        }
        out.push_str("endmodule\n\n");

        out.push_str("module shield\n");
        for (label, bound) in environment.labels().iter().zip(environment.bounds()) {
            out.push_str(&format!("\t{label} : [0 .. {bound}] init 0;\n"));
        }
        out.push('\n');
        for line in &self.environment {
            out.push_str(&format!("\t{line}\n"));
        }
        out.push('\n');
        for line in &self.shield {
            out.push_str(&format!("\t{line}\n"));
        }
        out.push_str("endmodule\n\n");

        out.push_str("rewards\n");
        for line in &self.rewards {
            out.push_str(&format!("\t{line}\n"));
        }
        out.push_str("endrewards\n");
        out
    }

    /// Write the model and property files into `dir`.
    pub fn write(
        &self,
        dir: &Path,
        environment: &Environment,
        controller: &Controller,
    ) -> io::Result<ModelPaths> {
        let paths = ModelPaths::new(dir, &self.prefix);
        fs::write(&paths.prism, self.prism_text(environment, controller))?;
        fs::write(&paths.props, self.props_text())?;
        Ok(paths)
    }
}

fn render_arbiter(controller: &Controller) -> Vec<String> {
    let mut out = vec![
        "[env]    (move = 0) -> 1:(move' = 1);".to_string(),
        "[ctrl]   (move = 1) -> 1:(move' = 2);".to_string(),
    ];
    for label in controller.action_labels() {
        out.push(format!("[{label}] (move = 2) -> 1:(move' = 0);"));
    }
    out
}

fn render_environment(environment: &Environment) -> Vec<String> {
    let mut out = vec!["[env] (true) ->".to_string()];
    let last = environment.len() - 1;
    for (i, label) in environment.labels().iter().enumerate() {
        let tail = if i == last { ";" } else { " +" };
        out.push(format!(
            "{label}Prob : ({label}'=min({label} + 1, {label}Max)){tail}"
        ));
    }
    out
}

fn render_controller(controller: &Controller) -> Vec<String> {
    let choices: Vec<String> = controller
        .action_labels()
        .iter()
        .enumerate()
        .map(|(i, label)| format!("{label}Prob : (action'={i})"))
        .collect();
    vec![format!("[ctrl] (true) -> {};", choices.join(" + "))]
}

fn render_shield(controller: &Controller) -> Vec<String> {
    let mut out = Vec::new();
    for (i, label) in controller.action_labels().iter().enumerate() {
        let drains: Vec<String> = controller.ways()[i]
            .iter()
            .map(|way| format!("({way}'=max(0, {way} - 1))"))
            .collect();
        let accept = if drains.is_empty() {
            "true".to_string()
        } else {
            drains.join(" & ")
        };
        for j in 0..controller.len() {
            out.push(format!(
                "[{label}] action={j} -> {CLAIM_RELIABILITY} : {accept} + {:.1} : true;",
                1.0 - CLAIM_RELIABILITY
            ));
        }
    }
    out
}

fn render_rewards(controller: &Controller, reward_d: i64) -> Vec<String> {
    let mut out = Vec::new();

    // flat penalty for every claimed/actual mismatch
    for (i, label) in controller.action_labels().iter().enumerate() {
        for j in 0..controller.len() {
            if i != j {
                out.push(format!("[{label}] action={j} : {reward_d};"));
            }
        }
    }

    // the heaviest queue an action is responsible for
    let max_ways: Vec<String> = controller
        .ways()
        .iter()
        .map(|ways| match ways.len() {
            0 => "0".to_string(),
            1 => ways[0].clone(),
            _ => format!("max({})", ways.join(",")),
        })
        .collect();

    let mut imbalances = Vec::new();
    for a in &max_ways {
        for b in &max_ways {
            if a != b {
                imbalances.push(format!("({a}-{b})"));
            }
        }
    }
    let imbalance = if imbalances.is_empty() {
        "0".to_string()
    } else {
        format!("1 * max({})", imbalances.join(","))
    };

    for label in controller.action_labels() {
        for j in 0..controller.len() {
            out.push(format!("[{label}] action={j} : {imbalance};"));
        }
    }

    out
}
