//! Simulation parameters and the per-phase configuration derived from them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::phase::Phase;

/// Energy minimization parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimizationParams {
    #[serde(default = "default_em_integrator")]
    pub integrator: String,
    /// Maximum force tolerance, kJ/mol/nm
    #[serde(default = "default_emtol")]
    pub emtol: f64,
    #[serde(default = "default_em_steps")]
    pub nsteps: u64,
}

fn default_em_integrator() -> String {
    "steep".to_string()
}

fn default_emtol() -> f64 {
    1000.0
}

fn default_em_steps() -> u64 {
    50_000
}

impl Default for MinimizationParams {
    fn default() -> Self {
        Self {
            integrator: default_em_integrator(),
            emtol: default_emtol(),
            nsteps: default_em_steps(),
        }
    }
}

/// NVT and NPT equilibration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquilibrationParams {
    #[serde(default = "default_eq_steps")]
    pub nvt_steps: u64,
    #[serde(default = "default_eq_steps")]
    pub npt_steps: u64,
    /// Kelvin
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// bar
    #[serde(default = "default_pressure")]
    pub pressure: f64,
}

fn default_eq_steps() -> u64 {
    50_000
}

fn default_temperature() -> f64 {
    300.0
}

fn default_pressure() -> f64 {
    1.0
}

impl Default for EquilibrationParams {
    fn default() -> Self {
        Self {
            nvt_steps: default_eq_steps(),
            npt_steps: default_eq_steps(),
            temperature: default_temperature(),
            pressure: default_pressure(),
        }
    }
}

/// Production run parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionParams {
    #[serde(default = "default_production_steps")]
    pub nsteps: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_pressure")]
    pub pressure: f64,
    /// Time step, ps
    #[serde(default = "default_dt")]
    pub dt: f64,
}

fn default_production_steps() -> u64 {
    500_000
}

fn default_dt() -> f64 {
    0.002
}

impl Default for ProductionParams {
    fn default() -> Self {
        Self {
            nsteps: default_production_steps(),
            temperature: default_temperature(),
            pressure: default_pressure(),
            dt: default_dt(),
        }
    }
}

/// The full parameter set persisted with a workflow record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    pub structure_file: PathBuf,
    #[serde(default)]
    pub topology_file: Option<PathBuf>,
    #[serde(default = "default_force_field")]
    pub force_field: String,
    #[serde(default = "default_water_model")]
    pub water_model: String,
    #[serde(default = "default_box_type")]
    pub box_type: String,
    /// Solute to box edge distance, nm
    #[serde(default = "default_box_distance")]
    pub box_distance: f64,
    /// Salt concentration, mol/L
    #[serde(default = "default_ions_concentration")]
    pub ions_concentration: f64,
    #[serde(default)]
    pub minimization: MinimizationParams,
    #[serde(default)]
    pub equilibration: EquilibrationParams,
    #[serde(default)]
    pub production: ProductionParams,
}

fn default_force_field() -> String {
    "amber99sb-ildn".to_string()
}

fn default_water_model() -> String {
    "tip3p".to_string()
}

fn default_box_type() -> String {
    "cubic".to_string()
}

fn default_box_distance() -> f64 {
    1.0
}

fn default_ions_concentration() -> f64 {
    0.15
}

impl SimulationParams {
    pub fn new(structure_file: impl Into<PathBuf>) -> Self {
        Self {
            structure_file: structure_file.into(),
            topology_file: None,
            force_field: default_force_field(),
            water_model: default_water_model(),
            box_type: default_box_type(),
            box_distance: default_box_distance(),
            ions_concentration: default_ions_concentration(),
            minimization: MinimizationParams::default(),
            equilibration: EquilibrationParams::default(),
            production: ProductionParams::default(),
        }
    }

    /// Numeric parameters for one phase, snapshotted when its run begins.
    pub fn phase_config(&self, phase: Phase) -> PhaseConfig {
        match phase {
            // Ion placement pre-processing uses a short steepest-descent setup.
            Phase::Preparation => PhaseConfig {
                phase,
                integrator: "steep".to_string(),
                nsteps: 50_000,
                dt: None,
                temperature: None,
                pressure: None,
                emtol: Some(1000.0),
                emstep: Some(0.01),
            },
            Phase::Minimization => PhaseConfig {
                phase,
                integrator: self.minimization.integrator.clone(),
                nsteps: self.minimization.nsteps,
                dt: None,
                temperature: None,
                pressure: None,
                emtol: Some(self.minimization.emtol),
                emstep: Some(0.01),
            },
            Phase::NvtEquilibration => PhaseConfig {
                phase,
                integrator: "md".to_string(),
                nsteps: self.equilibration.nvt_steps,
                dt: Some(default_dt()),
                temperature: Some(self.equilibration.temperature),
                pressure: None,
                emtol: None,
                emstep: None,
            },
            Phase::NptEquilibration => PhaseConfig {
                phase,
                integrator: "md".to_string(),
                nsteps: self.equilibration.npt_steps,
                dt: Some(default_dt()),
                temperature: Some(self.equilibration.temperature),
                pressure: Some(self.equilibration.pressure),
                emtol: None,
                emstep: None,
            },
            Phase::Production => PhaseConfig {
                phase,
                integrator: "md".to_string(),
                nsteps: self.production.nsteps,
                dt: Some(self.production.dt),
                temperature: Some(self.production.temperature),
                pressure: Some(self.production.pressure),
                emtol: None,
                emstep: None,
            },
        }
    }
}

/// Phase-specific numeric parameters. Temperature coupling is enabled when
/// `temperature` is set, pressure coupling when `pressure` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub phase: Phase,
    pub integrator: String,
    pub nsteps: u64,
    pub dt: Option<f64>,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub emtol: Option<f64>,
    pub emstep: Option<f64>,
}

impl PhaseConfig {
    /// Simulated time covered by the phase in picoseconds, for dynamics phases.
    pub fn simulated_ps(&self) -> Option<f64> {
        self.dt.map(|dt| dt * self.nsteps as f64)
    }
}
