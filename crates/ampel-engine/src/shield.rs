//! The per-intersection shield: model, strategy, and adaptation.
//!
//! Life cycle: *unsynchronized* until the first successful synthesis,
//! *synchronized* while the strategy matches the learned values, *stale*
//! once drift past the configured thresholds is detected, and *locked*
//! after a solver failure. Locked shields freeze their occupancy bounds
//! at the last value the solver handled and keep serving the previous
//! strategy.

use std::fs;

use tracing::{debug, info, warn};

use ampel_model::config::{ControllerConfig, EnvironmentConfig, ShieldConfigFile};
use ampel_model::{Controller, Environment, ModelError, ShieldOptions};
use ampel_sim::labels::reformat_label;

use crate::errors::EngineError;
use crate::model_gen::ModelGenerator;
use crate::solver::{JobRegistry, SolverConfig, SynthesisOutcome};
use crate::strategy::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShieldState {
    /// No strategy has been synthesized yet.
    Unsynchronized,
    /// The loaded strategy matches the learned values within thresholds.
    Synchronized,
    /// Drift detected; the next update interval will re-synthesize.
    Stale,
    /// A solver failure froze the state space.
    Locked,
}

#[derive(Debug)]
pub struct Shield {
    tls: String,
    options: ShieldOptions,
    environment: Environment,
    controller: Controller,
    strategy: Strategy,
    generator: ModelGenerator,
    active: bool,
    locked: bool,
    generation: u64,
    /// Bounds the last successful synthesis ran with; rollback target.
    last_bounds: Vec<u32>,
    /// Probability baseline of the last triggered synthesis.
    last_probabilities: Vec<f64>,
    /// Summed probability movement of the latest adaptation pass.
    prob_delta: f64,
    /// Halting vectors observed since the last successful synthesis.
    observation_history: Vec<Vec<u32>>,
}

impl Shield {
    pub fn new(
        tls: &str,
        environment: Environment,
        controller: Controller,
        options: ShieldOptions,
    ) -> Self {
        let generator = ModelGenerator::new(tls, &environment, &controller, options.reward_d);
        let strategy = Strategy::new(environment.labels().to_vec());
        let last_bounds = environment.bounds().to_vec();
        let last_probabilities = environment.probabilities().to_vec();
        Self {
            tls: tls.to_string(),
            options,
            environment,
            controller,
            strategy,
            generator,
            active: true,
            locked: false,
            generation: 0,
            last_bounds,
            last_probabilities,
            prob_delta: 0.0,
            observation_history: Vec::new(),
        }
    }

    pub fn tls(&self) -> &str {
        &self.tls
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn disable(&mut self) {
        self.active = false;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn prob_delta(&self) -> f64 {
        self.prob_delta
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn state(&self) -> ShieldState {
        if self.locked {
            ShieldState::Locked
        } else if self.generation == 0 {
            ShieldState::Unsynchronized
        } else if self.probability_drift() > self.options.prob_update_delta || self.bound_drift() {
            ShieldState::Stale
        } else {
            ShieldState::Synchronized
        }
    }

    /// Per-tick observation: counts into the environment, the halting
    /// vector into the observation history.
    pub fn record_counts(&mut self, vehicles: &[u32], halting: &[u32]) -> Result<(), ModelError> {
        self.environment.record_counts(vehicles, halting)?;
        self.observation_history.push(halting.to_vec());
        Ok(())
    }

    pub fn record_phase(&mut self, phase: usize) -> Result<(), ModelError> {
        self.controller.record_phase(phase)
    }

    /// Adaptation pass on an update-interval boundary. Returns whether a
    /// synthesis was triggered.
    pub fn update(
        &mut self,
        registry: &mut JobRegistry,
        solver: &SolverConfig,
    ) -> Result<bool, EngineError> {
        let tick_probabilities = self.environment.probabilities().to_vec();

        self.environment.adapt_probabilities(self.options.lambda);
        if !self.locked {
            if let Some(demanded) = self.demanded_bounds() {
                self.environment
                    .widen_bounds(&demanded, self.options.max_lane_size)?;
            }
        }

        self.prob_delta = self
            .environment
            .probabilities()
            .iter()
            .zip(&tick_probabilities)
            .map(|(now, before)| (now - before).abs())
            .sum();

        let trigger = self.options.static_update
            || self.probability_drift() > self.options.prob_update_delta
            || (!self.locked && self.bound_drift());

        if trigger {
            self.last_probabilities = self.environment.probabilities().to_vec();
            self.synthesize(registry, solver)?;
        }
        Ok(trigger)
    }

    /// Regenerate the model files and run the solver to completion.
    pub fn synthesize(
        &mut self,
        registry: &mut JobRegistry,
        solver: &SolverConfig,
    ) -> Result<SynthesisOutcome, EngineError> {
        fs::create_dir_all(&solver.out_dir)?;
        let paths = self
            .generator
            .write(&solver.out_dir, &self.environment, &self.controller)?;

        match registry.run(&self.tls, solver, &paths) {
            SynthesisOutcome::Success => match self.strategy.load_scheduler(&paths.scheduler) {
                Ok(entries) => {
                    if let Err(error) = self.strategy.export(&paths.strategy) {
                        warn!(tls = %self.tls, %error, "could not export the parsed strategy");
                    }
                    self.generation += 1;
                    self.last_bounds = self.environment.bounds().to_vec();
                    self.observation_history.clear();
                    info!(
                        tls = %self.tls,
                        generation = self.generation,
                        entries,
                        "strategy refreshed"
                    );
                    Ok(SynthesisOutcome::Success)
                }
                Err(error) => {
                    warn!(tls = %self.tls, %error, "scheduler export unreadable");
                    self.lock_bounds();
                    Ok(SynthesisOutcome::Failure)
                }
            },
            SynthesisOutcome::Failure => {
                warn!(tls = %self.tls, "solver failed, freezing the state space");
                self.lock_bounds();
                Ok(SynthesisOutcome::Failure)
            }
            SynthesisOutcome::AlreadyRunning => Ok(SynthesisOutcome::AlreadyRunning),
        }
    }

    /// Strategy decision for the current occupancy under `current_action`.
    ///
    /// The live occupancy is clipped to the bounds the strategy was
    /// synthesized for. `None` means the controller's choice stands.
    pub fn next_action(&mut self, current_action: usize) -> Option<usize> {
        let mut clipped = Vec::with_capacity(self.environment.labels().len());
        for ((label, &halting), &bound) in self
            .environment
            .labels()
            .iter()
            .zip(self.environment.halting_counts())
            .zip(self.environment.bounds())
        {
            if halting > bound {
                debug!(
                    tls = %self.tls,
                    lane = %reformat_label(label),
                    halting,
                    bound,
                    "queue exceeds the modeled bound"
                );
            }
            clipped.push(halting.min(bound));
        }
        self.observation_history.push(clipped.clone());

        if self.strategy.is_empty() {
            return None;
        }
        self.strategy.action(&clipped, current_action)
    }

    /// Demanded per-group bound: one above the largest halting count
    /// observed since the last synthesis.
    fn demanded_bounds(&self) -> Option<Vec<u32>> {
        let first = self.observation_history.first()?;
        let mut demanded = vec![0u32; first.len()];
        for observed in &self.observation_history {
            for (want, &seen) in demanded.iter_mut().zip(observed) {
                *want = (*want).max(seen + 1);
            }
        }
        Some(demanded)
    }

    fn probability_drift(&self) -> f64 {
        self.environment
            .probabilities()
            .iter()
            .zip(&self.last_probabilities)
            .map(|(now, last)| (now - last).abs())
            .sum()
    }

    fn bound_drift(&self) -> bool {
        self.environment
            .bounds()
            .iter()
            .zip(&self.last_bounds)
            .any(|(now, last)| now.abs_diff(*last) > self.options.bound_update_delta)
    }

    fn lock_bounds(&mut self) {
        self.locked = true;
        if let Err(error) = self.environment.set_bounds(self.last_bounds.clone()) {
            warn!(tls = %self.tls, %error, "could not roll the bounds back");
        }
    }

    /// Snapshot in the persisted configuration schema.
    pub fn to_config(&self) -> ShieldConfigFile {
        ShieldConfigFile {
            active: self.active,
            model_type: self.generator.model_type().to_string(),
            intersection: self.tls.clone(),
            properties: self.generator.properties().to_vec(),
            modules: self.generator.modules(),
            controller: ControllerConfig::from(&self.controller),
            environment: EnvironmentConfig::from(&self.environment),
        }
    }

    /// Take over a persisted configuration, reconciled by label and by
    /// unordered way equality rather than by position.
    pub fn apply_config(&mut self, config: &ShieldConfigFile) -> Result<(), EngineError> {
        self.active = config.active;
        self.generator.set_model_type(config.model_type.clone());
        self.generator.set_properties(config.properties.clone());
        self.generator.set_modules(config.modules.clone());
        self.environment.reconcile(&config.environment()?)?;
        self.controller.reconcile(&config.controller()?)?;
        self.last_bounds = self.environment.bounds().to_vec();
        self.last_probabilities = self.environment.probabilities().to_vec();
        Ok(())
    }

    /// One-line state/action-space description for interval logs.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} | {}",
            self.tls,
            self.environment.summary(),
            self.controller.summary()
        )
    }
}
