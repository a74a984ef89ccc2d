//! Persisted shield configuration.
//!
//! One JSON document per shielded intersection, carrying everything needed
//! to resume shielding: the activation flag, the model type, the rendered
//! module text blocks, and the learned controller/environment vectors.
//! Loading reconciles against an already-built model by label and by
//! unordered way equality, never by position.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::controller::Controller;
use crate::environment::Environment;
use crate::errors::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleBlocks {
    pub arbiter: Vec<String>,
    pub environment: Vec<String>,
    pub controller: Vec<String>,
    pub shield: Vec<String>,
    pub rewards: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerConfig {
    pub actions: Vec<String>,
    pub probabilities: Vec<f64>,
    pub ways: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentConfig {
    pub labels: Vec<String>,
    pub probabilities: Vec<f64>,
    pub weights: Vec<u32>,
    pub bounds: Vec<u32>,
}

/// Schema of the per-intersection shield configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShieldConfigFile {
    pub active: bool,
    pub model_type: String,
    pub intersection: String,
    pub properties: Vec<String>,
    pub modules: ModuleBlocks,
    pub controller: ControllerConfig,
    pub environment: EnvironmentConfig,
}

impl ShieldConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn store(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    pub fn environment(&self) -> Result<Environment, ConfigError> {
        Ok(Environment::from_parts(
            self.environment.labels.clone(),
            self.environment.probabilities.clone(),
            self.environment.weights.clone(),
            self.environment.bounds.clone(),
        )?)
    }

    pub fn controller(&self) -> Result<Controller, ConfigError> {
        Ok(Controller::from_parts(
            self.controller.actions.clone(),
            self.controller.probabilities.clone(),
            self.controller.ways.clone(),
        )?)
    }
}

impl From<&Environment> for EnvironmentConfig {
    fn from(env: &Environment) -> Self {
        Self {
            labels: env.labels().to_vec(),
            probabilities: env.probabilities().to_vec(),
            weights: env.weights().to_vec(),
            bounds: env.bounds().to_vec(),
        }
    }
}

impl From<&Controller> for ControllerConfig {
    fn from(ctrl: &Controller) -> Self {
        Self {
            actions: ctrl.actions().to_vec(),
            probabilities: ctrl.probabilities().to_vec(),
            ways: ctrl.ways().to_vec(),
        }
    }
}
