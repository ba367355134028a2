//! Range checks on simulation parameters, plus a recommended parameter set.
//!
//! Nothing here blocks a run except a structure file that does not exist;
//! everything else is advice printed when a workflow is created.

use mdforge_common::{EquilibrationParams, MinimizationParams, ProductionParams, SimulationParams};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FORCE_FIELDS: &[&str] = &["amber99sb-ildn", "charmm36", "gromos54a7", "opls-aa", "oplsaa"];
const WATER_MODELS: &[&str] = &["tip3p", "tip4p", "spc", "spce"];
const STRUCTURE_SUFFIXES: &[&str] = &["pdb", "gro"];

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("Structure file not found: {}", .0.display())]
    StructureMissing(PathBuf),
}

/// Warnings grouped by parameter section.
pub type ParamWarnings = BTreeMap<&'static str, Vec<String>>;

pub fn check_minimization(params: &MinimizationParams) -> Vec<String> {
    let mut warnings = Vec::new();
    if !matches!(params.integrator.as_str(), "steep" | "cg") {
        warnings.push(format!(
            "integrator '{}' is unusual for minimization; use steep or cg",
            params.integrator
        ));
    }
    if params.emtol > 2000.0 {
        warnings.push(format!("emtol {} is high; minimization may stop early", params.emtol));
    } else if params.emtol < 100.0 {
        warnings.push(format!("emtol {} is low; minimization may take very long", params.emtol));
    }
    if params.nsteps < 10_000 {
        warnings.push(format!("{} minimization steps may be too few (at least 10000)", params.nsteps));
    } else if params.nsteps > 100_000 {
        warnings.push(format!("{} minimization steps is likely more than needed", params.nsteps));
    }
    warnings
}

pub fn check_equilibration(params: &EquilibrationParams) -> Vec<String> {
    let mut warnings = Vec::new();
    if params.nvt_steps < 25_000 {
        warnings.push(format!("{} NVT steps may be too few (at least 25000)", params.nvt_steps));
    }
    if params.npt_steps < 25_000 {
        warnings.push(format!("{} NPT steps may be too few (at least 25000)", params.npt_steps));
    }
    warnings.extend(check_conditions(params.temperature, params.pressure));
    warnings
}

pub fn check_production(params: &ProductionParams) -> Vec<String> {
    let mut warnings = Vec::new();
    let total_ps = params.nsteps as f64 * params.dt;
    if total_ps + 1e-9 < 1000.0 {
        warnings.push(format!("production covers {total_ps} ps; at least 1 ns is recommended"));
    }
    if params.dt > 0.002 {
        warnings.push(format!("time step {} ps may be unstable", params.dt));
    } else if params.dt < 0.0005 {
        warnings.push(format!("time step {} ps is inefficiently small", params.dt));
    }
    warnings.extend(check_conditions(params.temperature, params.pressure));
    warnings
}

fn check_conditions(temperature: f64, pressure: f64) -> Vec<String> {
    let mut warnings = Vec::new();
    if !(273.0..=373.0).contains(&temperature) {
        warnings.push(format!("temperature {temperature} K is outside 273-373 K"));
    }
    if (pressure - 1.0).abs() > f64::EPSILON {
        warnings.push(format!("pressure {pressure} bar is not 1 bar"));
    }
    warnings
}

/// Check a full parameter set. Relative structure paths resolve against `base`.
pub fn check_params(params: &SimulationParams, base: &Path) -> Result<ParamWarnings, ParamError> {
    let structure = if params.structure_file.is_absolute() {
        params.structure_file.clone()
    } else {
        base.join(&params.structure_file)
    };
    if !structure.is_file() {
        return Err(ParamError::StructureMissing(structure));
    }

    let mut warnings = ParamWarnings::new();
    let suffix = structure
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !STRUCTURE_SUFFIXES.contains(&suffix.as_str()) {
        warnings.insert("structure", vec!["structure should be a PDB or GRO file".to_string()]);
    }
    if !FORCE_FIELDS.contains(&params.force_field.as_str()) {
        warnings.insert(
            "force_field",
            vec![format!("'{}' is not a common protein force field", params.force_field)],
        );
    }
    if !WATER_MODELS.contains(&params.water_model.as_str()) {
        warnings.insert(
            "water_model",
            vec![format!("'{}' is not a common water model", params.water_model)],
        );
    }

    for (section, found) in [
        ("minimization", check_minimization(&params.minimization)),
        ("equilibration", check_equilibration(&params.equilibration)),
        ("production", check_production(&params.production)),
    ] {
        if !found.is_empty() {
            warnings.insert(section, found);
        }
    }
    Ok(warnings)
}

fn note_change<T: PartialEq + Display>(changes: &mut Vec<String>, what: &str, from: &T, to: &T) {
    if from != to {
        changes.push(format!("{what}: {from} -> {to}"));
    }
}

pub fn optimize_minimization(params: &MinimizationParams) -> (MinimizationParams, Vec<String>) {
    let optimized = MinimizationParams::default();
    let mut changes = Vec::new();
    note_change(&mut changes, "integrator", &params.integrator, &optimized.integrator);
    note_change(&mut changes, "emtol", &params.emtol, &optimized.emtol);
    note_change(&mut changes, "nsteps", &params.nsteps, &optimized.nsteps);
    (optimized, changes)
}

pub fn optimize_equilibration(params: &EquilibrationParams) -> (EquilibrationParams, Vec<String>) {
    let optimized = EquilibrationParams::default();
    let mut changes = Vec::new();
    note_change(&mut changes, "nvt_steps", &params.nvt_steps, &optimized.nvt_steps);
    note_change(&mut changes, "npt_steps", &params.npt_steps, &optimized.npt_steps);
    note_change(&mut changes, "temperature", &params.temperature, &optimized.temperature);
    note_change(&mut changes, "pressure", &params.pressure, &optimized.pressure);
    (optimized, changes)
}

pub fn optimize_production(params: &ProductionParams) -> (ProductionParams, Vec<String>) {
    let optimized = ProductionParams::default();
    let mut changes = Vec::new();
    note_change(&mut changes, "nsteps", &params.nsteps, &optimized.nsteps);
    note_change(&mut changes, "dt", &params.dt, &optimized.dt);
    note_change(&mut changes, "temperature", &params.temperature, &optimized.temperature);
    note_change(&mut changes, "pressure", &params.pressure, &optimized.pressure);
    (optimized, changes)
}

/// Replace the tunable values with the recommended ones (the defaults:
/// steepest descent, 1 ns of production at 300 K and 1 bar, amber99sb-ildn
/// with TIP3P). Input files and box geometry are kept. Changes come back
/// grouped by section like [`check_params`].
pub fn optimize_params(params: &SimulationParams) -> (SimulationParams, ParamWarnings) {
    let defaults = SimulationParams::new(&params.structure_file);
    let mut changes = ParamWarnings::new();

    let mut force_field = Vec::new();
    note_change(&mut force_field, "force_field", &params.force_field, &defaults.force_field);
    let mut water_model = Vec::new();
    note_change(&mut water_model, "water_model", &params.water_model, &defaults.water_model);

    let (minimization, em_changes) = optimize_minimization(&params.minimization);
    let (equilibration, eq_changes) = optimize_equilibration(&params.equilibration);
    let (production, md_changes) = optimize_production(&params.production);

    for (section, found) in [
        ("force_field", force_field),
        ("water_model", water_model),
        ("minimization", em_changes),
        ("equilibration", eq_changes),
        ("production", md_changes),
    ] {
        if !found.is_empty() {
            changes.insert(section, found);
        }
    }

    let optimized = SimulationParams {
        force_field: defaults.force_field,
        water_model: defaults.water_model,
        minimization,
        equilibration,
        production,
        ..params.clone()
    };
    (optimized, changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_only_warn_about_short_production() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("1aki.pdb"), "ATOM").unwrap();
        let params = SimulationParams::new("1aki.pdb");

        let warnings = check_params(&params, dir.path()).unwrap();
        // 500000 * 0.002 ps = 1 ns, right at the threshold
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_missing_structure_is_an_error() {
        let dir = tempdir().unwrap();
        let params = SimulationParams::new("absent.pdb");
        assert!(matches!(
            check_params(&params, dir.path()),
            Err(ParamError::StructureMissing(_))
        ));
    }

    #[test]
    fn test_unusual_choices_are_grouped() {
        let dir = tempdir().unwrap();
        let structure = dir.path().join("model.cif");
        fs::write(&structure, "data_").unwrap();
        let mut params = SimulationParams::new(&structure);
        params.force_field = "exotic".into();
        params.water_model = "tip5p".into();
        params.minimization.integrator = "l-bfgs".into();
        params.minimization.nsteps = 500;
        params.equilibration.temperature = 400.0;
        params.production.dt = 0.004;

        let warnings = check_params(&params, dir.path()).unwrap();
        assert!(warnings.contains_key("structure"));
        assert!(warnings.contains_key("force_field"));
        assert!(warnings.contains_key("water_model"));
        assert_eq!(warnings["minimization"].len(), 2);
        assert!(warnings["equilibration"][0].contains("400"));
        assert!(warnings["production"].iter().any(|w| w.contains("unstable")));
    }

    #[test]
    fn test_pressure_and_short_production() {
        let mut params = ProductionParams::default();
        params.nsteps = 1000;
        params.pressure = 2.0;
        let warnings = check_production(&params);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_optimize_resets_tunables_and_lists_changes() {
        let mut params = SimulationParams::new("/data/1aki.pdb");
        params.topology_file = Some("/data/topol.top".into());
        params.box_distance = 1.2;
        params.force_field = "charmm36".into();
        params.minimization.integrator = "cg".into();
        params.equilibration.temperature = 310.0;
        params.production.nsteps = 1000;
        params.production.dt = 0.001;

        let (optimized, changes) = optimize_params(&params);
        assert_eq!(optimized.force_field, "amber99sb-ildn");
        assert_eq!(optimized.minimization.integrator, "steep");
        assert_eq!(optimized.equilibration.temperature, 300.0);
        assert_eq!(optimized.production, ProductionParams::default());
        assert_eq!(optimized.topology_file, params.topology_file);
        assert_eq!(optimized.box_distance, 1.2);

        assert_eq!(changes["force_field"], vec!["force_field: charmm36 -> amber99sb-ildn"]);
        assert_eq!(changes["minimization"], vec!["integrator: cg -> steep"]);
        assert_eq!(changes["equilibration"], vec!["temperature: 310 -> 300"]);
        assert_eq!(changes["production"].len(), 2);
        assert!(!changes.contains_key("water_model"));
    }

    #[test]
    fn test_optimize_recommended_set_is_unchanged() {
        let params = SimulationParams::new("1aki.pdb");
        let (optimized, changes) = optimize_params(&params);
        assert_eq!(optimized, params);
        assert!(changes.is_empty());
    }
}
