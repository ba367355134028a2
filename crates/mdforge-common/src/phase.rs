//! The fixed, ordered set of pipeline phases.
//!
//! Every phase except the first has exactly one required predecessor. The
//! declaration order of the enum variants *is* the pipeline order, so `Ord`
//! can be derived and compared directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One ordered step of the simulation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[serde(rename = "system_preparation")]
    Preparation,
    Minimization,
    NvtEquilibration,
    NptEquilibration,
    Production,
}

impl Phase {
    /// All phases in pipeline order.
    pub const ALL: [Phase; 5] = [
        Phase::Preparation,
        Phase::Minimization,
        Phase::NvtEquilibration,
        Phase::NptEquilibration,
        Phase::Production,
    ];

    /// Zero-based position in the pipeline.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The phase that must have completed before this one may start.
    pub fn predecessor(self) -> Option<Phase> {
        match self {
            Phase::Preparation => None,
            other => Some(Phase::ALL[other.index() - 1]),
        }
    }

    /// The phase that follows this one, if any.
    pub fn successor(self) -> Option<Phase> {
        Phase::ALL.get(self.index() + 1).copied()
    }

    pub fn is_last(self) -> bool {
        self.successor().is_none()
    }

    /// Stable machine name, used for checkpoint directories and JSON keys.
    pub fn name(self) -> &'static str {
        match self {
            Phase::Preparation => "system_preparation",
            Phase::Minimization => "minimization",
            Phase::NvtEquilibration => "nvt_equilibration",
            Phase::NptEquilibration => "npt_equilibration",
            Phase::Production => "production",
        }
    }

    /// Human-readable label for terminal output.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Preparation => "Preparation",
            Phase::Minimization => "Minimization",
            Phase::NvtEquilibration => "NVT-Equilibration",
            Phase::NptEquilibration => "NPT-Equilibration",
            Phase::Production => "Production",
        }
    }

    /// Phases from `self` (inclusive) to the end of the pipeline.
    pub fn remaining(self) -> &'static [Phase] {
        let all: &'static [Phase] = &Phase::ALL;
        &all[self.index()..]
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a string does not name a phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Unknown phase '{0}'. Valid values: prep, em, nvt, npt, md (or system_preparation, minimization, nvt_equilibration, npt_equilibration, production)"
)]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "system_preparation" | "preparation" | "prep" => Ok(Phase::Preparation),
            "minimization" | "em" | "min" => Ok(Phase::Minimization),
            "nvt_equilibration" | "nvt" => Ok(Phase::NvtEquilibration),
            "npt_equilibration" | "npt" => Ok(Phase::NptEquilibration),
            "production" | "md" | "prod" => Ok(Phase::Production),
            _ => Err(UnknownPhase(s.to_string())),
        }
    }
}
