//! Post-run output validation.

use mdforge_common::Phase;
use std::path::Path;

use crate::engine::{GromacsEngine, PhasePlan};
use crate::errors::PhaseError;
use crate::gateway::ProcessGateway;

#[derive(Debug, Clone)]
pub struct ValidationSettings {
    /// Run `energy` over the phase's energy file after the outputs check.
    pub energy_check: bool,
    /// Group written to the `energy` tool's selection prompt.
    pub energy_selection: String,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            energy_check: true,
            energy_selection: "Potential".to_string(),
        }
    }
}

/// Every required output must exist and be non-empty.
pub fn check_outputs(dir: &Path, phase: Phase, outputs: &[&str]) -> Result<(), PhaseError> {
    for name in outputs {
        let path = dir.join(name);
        let reason = match std::fs::metadata(&path) {
            Ok(meta) if !meta.is_file() => format!("{name} is not a regular file"),
            Ok(meta) if meta.len() == 0 => format!("{name} is empty"),
            Ok(_) => continue,
            Err(_) => format!("required output {name} is missing"),
        };
        return Err(PhaseError::Validation { phase, reason });
    }
    Ok(())
}

/// Secondary sanity invocation over the phase's energy trace. Only the exit
/// status is inspected.
pub async fn check_energy(
    gateway: &dyn ProcessGateway,
    engine: &GromacsEngine,
    plan: &PhasePlan,
    dir: &Path,
    settings: &ValidationSettings,
) -> Result<(), PhaseError> {
    if !settings.energy_check {
        return Ok(());
    }
    let Some(invocation) = engine.energy_check(plan, dir, &settings.energy_selection) else {
        return Ok(());
    };

    let result = gateway.execute(&invocation).await;
    if result.success {
        tracing::debug!(phase = %plan.phase, "energy check passed");
        Ok(())
    } else {
        Err(PhaseError::Validation {
            phase: plan.phase,
            reason: format!("energy check failed: {}", result.failure_summary()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_all_present_and_non_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("em.gro"), "x").unwrap();
        fs::write(dir.path().join("em.edr"), "x").unwrap();
        assert!(check_outputs(dir.path(), Phase::Minimization, &["em.gro", "em.edr"]).is_ok());
    }

    #[test]
    fn test_missing_output() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("em.gro"), "x").unwrap();
        let err = check_outputs(dir.path(), Phase::Minimization, &["em.gro", "em.edr"]).unwrap_err();
        match err {
            PhaseError::Validation { phase, reason } => {
                assert_eq!(phase, Phase::Minimization);
                assert!(reason.contains("em.edr"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_output() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("md.xtc"), "").unwrap();
        let err = check_outputs(dir.path(), Phase::Production, &["md.xtc"]).unwrap_err();
        assert!(err.to_string().contains("md.xtc is empty"));
    }
}
