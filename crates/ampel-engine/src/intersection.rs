//! Per-intersection enforcement loop and the network driver.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use ampel_model::config::ShieldConfigFile;
use ampel_model::{Controller, Environment, ShieldOptions};
use ampel_sim::TrafficSim;
use ampel_topology::{LaneGroups, PhaseTable};

use crate::errors::EngineError;
use crate::shield::Shield;
use crate::solver::{JobRegistry, SolverConfig};

/// What one tick of the enforcement loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// An adaptation pass triggered a synthesis this tick.
    pub synthesized: bool,
    /// The live signal deviated from the unshielded program.
    pub deviation: bool,
    /// Internal phase shown after enforcement.
    pub action: usize,
}

/// One shielded intersection: topology, phase table, and shield, driven
/// tick by tick against the live signal.
#[derive(Debug)]
pub struct Intersection {
    tls: String,
    options: ShieldOptions,
    groups: LaneGroups,
    table: PhaseTable,
    shield: Shield,
    /// The live signal currently shows a shield override.
    overriding: bool,
    decisions: u64,
    overrides: u64,
}

impl Intersection {
    /// Reconstruct the intersection's structure and build its shield.
    ///
    /// Fewer than two lane groups or fewer than two non-yellow phases
    /// leave the model nothing to decide; such intersections run
    /// unshielded (the driver catches the error).
    pub fn build<S: TrafficSim + ?Sized>(
        sim: &mut S,
        tls: &str,
        options: ShieldOptions,
    ) -> Result<Self, EngineError> {
        let groups = LaneGroups::build(sim, tls, &options)?;
        let labels = groups.labels();
        if labels.len() < 2 {
            return Err(EngineError::Unshieldable {
                tls: tls.to_string(),
                reason: format!("only {} lane group(s)", labels.len()),
            });
        }

        let table = PhaseTable::build(sim, tls, groups.grouped_links())?;
        if table.phases().len() < 2 {
            return Err(EngineError::Unshieldable {
                tls: tls.to_string(),
                reason: format!("only {} non-yellow phase(s)", table.phases().len()),
            });
        }

        let environment = Environment::new(labels, options.min_lane_size)?;
        let controller = Controller::from_phases(table.phases())?;
        let shield = Shield::new(tls, environment, controller, options.clone());

        Ok(Self {
            tls: tls.to_string(),
            options,
            groups,
            table,
            shield,
            overriding: false,
            decisions: 0,
            overrides: 0,
        })
    }

    /// Build from a persisted configuration and write the reconciled
    /// configuration back (vector orders corrected).
    pub fn from_config<S: TrafficSim + ?Sized>(
        sim: &mut S,
        path: &Path,
        options: ShieldOptions,
    ) -> Result<Self, EngineError> {
        let config = ShieldConfigFile::load(path)?;
        let mut built = Self::build(sim, &config.intersection, options)?;
        built.shield.apply_config(&config)?;
        built.shield.to_config().store(path)?;
        Ok(built)
    }

    pub fn tls(&self) -> &str {
        &self.tls
    }

    pub fn shield(&self) -> &Shield {
        &self.shield
    }

    pub fn shield_mut(&mut self) -> &mut Shield {
        &mut self.shield
    }

    /// Share of enforcement decisions that overrode the controller.
    pub fn interference_rate(&self) -> f64 {
        if self.decisions == 0 {
            0.0
        } else {
            self.overrides as f64 / self.decisions as f64
        }
    }

    /// Persist the shield configuration and run the initial synthesis.
    pub fn bootstrap(
        &mut self,
        registry: &mut JobRegistry,
        solver: &SolverConfig,
    ) -> Result<(), EngineError> {
        fs::create_dir_all(&solver.out_dir)?;
        let config_path = solver.out_dir.join(format!("{}.json", self.tls));
        self.shield.to_config().store(&config_path)?;
        self.shield.synthesize(registry, solver)?;
        Ok(())
    }

    /// One tick: observe, adapt on interval boundaries, and enforce on
    /// decision boundaries.
    pub fn step<S: TrafficSim + ?Sized>(
        &mut self,
        sim: &mut S,
        registry: &mut JobRegistry,
        solver: &SolverConfig,
    ) -> Result<TickReport, EngineError> {
        if !self.shield.is_active() {
            return Ok(TickReport {
                synthesized: false,
                deviation: false,
                action: self.table.shadow_phase(),
            });
        }

        self.track(sim)?;

        let tick = sim.time_step();
        let mut synthesized = false;
        if tick > self.options.warm_up_time
            && tick % self.options.update_interval == 0
            && sim.vehicle_count() > 0
        {
            synthesized = self.shield.update(registry, solver)?;
            info!(tick, "{}", self.shield.summary());
        }

        let mut deviation = false;
        let mut action = self.table.shadow_phase();
        if tick % self.options.decision_stride == 0 {
            self.table.restore_controller(sim);
            self.overriding = false;
            self.decisions += 1;

            if let Some(choice) = self.shield.next_action(action) {
                if choice != action {
                    deviation = true;
                    self.overrides += 1;
                    self.table.set_internal_phase(sim, choice)?;
                    self.overriding = true;
                    action = choice;
                }
            }
        } else if self.overriding {
            // between decisions the override keeps deviating
            deviation = true;
        }

        self.table.reset_program(sim);

        Ok(TickReport {
            synthesized,
            deviation,
            action,
        })
    }

    /// Record this tick's counts and controller phase into the shield.
    fn track<S: TrafficSim + ?Sized>(&mut self, sim: &S) -> Result<(), EngineError> {
        let labels = self.shield.environment().labels().to_vec();
        let mut vehicles = Vec::with_capacity(labels.len());
        let mut halting = Vec::with_capacity(labels.len());
        for label in &labels {
            let (v, h) = self.observe_group(sim, label);
            vehicles.push(v);
            halting.push(h);
        }
        self.shield.record_counts(&vehicles, &halting)?;

        let shadow = self.table.shadow_phase();
        self.table.step();
        self.shield.record_phase(shadow)?;
        Ok(())
    }

    /// Counts of one lane group: max across the group's trees, or across
    /// its raw lanes in flat mode. Parallel members model one queue.
    fn observe_group<S: TrafficSim + ?Sized>(&self, sim: &S, label: &str) -> (u32, u32) {
        let Some(group) = self.groups.group(label) else {
            return (0, 0);
        };
        let mut vehicles = 0;
        let mut halting = 0;
        if self.options.no_trees {
            for lane in &group.raw_lanes {
                vehicles = vehicles.max(sim.lane_vehicle_count(lane));
                halting = halting.max(sim.lane_halting_count(lane));
            }
        } else {
            for tree in &group.trees {
                let (v, h) = tree.track(sim);
                vehicles = vehicles.max(v);
                halting = halting.max(h);
            }
        }
        (vehicles, halting)
    }
}

/// All shielded intersections of one simulation plus the shared solver
/// plumbing. One intersection's failure never takes the others down.
#[derive(Debug)]
pub struct ShieldedNetwork {
    intersections: Vec<Intersection>,
    registry: JobRegistry,
    solver: SolverConfig,
}

impl ShieldedNetwork {
    pub fn new(solver: SolverConfig) -> Self {
        Self {
            intersections: Vec::new(),
            registry: JobRegistry::new(),
            solver,
        }
    }

    /// Build a shield per intersection; unshieldable ones are logged and
    /// skipped, everything else gets an initial synthesis.
    pub fn build<S: TrafficSim + ?Sized>(
        &mut self,
        sim: &mut S,
        tls_ids: &[String],
        options: &ShieldOptions,
    ) {
        for tls in tls_ids {
            match Intersection::build(sim, tls, options.clone()) {
                Ok(mut intersection) => {
                    if let Err(error) = intersection.bootstrap(&mut self.registry, &self.solver) {
                        warn!(%tls, %error, "initial synthesis failed");
                    }
                    info!(%tls, "shield ready");
                    self.intersections.push(intersection);
                }
                Err(error) => warn!(%tls, %error, "running unshielded"),
            }
        }
    }

    /// Advance every shield by one tick.
    pub fn step<S: TrafficSim + ?Sized>(&mut self, sim: &mut S) {
        for intersection in &mut self.intersections {
            if let Err(error) = intersection.step(sim, &mut self.registry, &self.solver) {
                warn!(tls = %intersection.tls, %error, "tick failed");
            }
        }
    }

    pub fn intersections(&self) -> &[Intersection] {
        &self.intersections
    }

    pub fn registry_mut(&mut self) -> &mut JobRegistry {
        &mut self.registry
    }
}
