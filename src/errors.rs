//! Typed error hierarchy for the pipeline controller.
//!
//! Three component-level enums plus one umbrella:
//! - `PhaseError` — why a single phase attempt failed (recorded in the workflow status)
//! - `CheckpointError` — backup/restore failures
//! - `RegistryError` — workflow record persistence failures
//! - `PipelineError` — what the controller returns to its caller

use mdforge_common::Phase;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Coarse failure classification used when reporting a failed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Ordering,
    Invocation,
    NonZeroExit,
    Validation,
    FatalLog,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Ordering => write!(f, "ordering"),
            ErrorKind::Invocation => write!(f, "invocation"),
            ErrorKind::NonZeroExit => write!(f, "non-zero exit"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::FatalLog => write!(f, "fatal log"),
        }
    }
}

/// Failure of one phase attempt.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("{phase} cannot start before {predecessor} has completed")]
    Ordering { phase: Phase, predecessor: Phase },

    #[error("{phase}: failed to launch `{command}`: {cause}")]
    Invocation {
        phase: Phase,
        command: String,
        cause: String,
    },

    #[error("{phase}: `{command}` exited with code {exit_code}: {summary}")]
    NonZeroExit {
        phase: Phase,
        command: String,
        exit_code: i32,
        summary: String,
    },

    #[error("{phase}: output validation failed: {reason}")]
    Validation { phase: Phase, reason: String },

    #[error("{phase}: fatal error reported in log: {line}")]
    FatalLog { phase: Phase, line: String },

    #[error("{phase}: no completion marker after {:.0}s", .waited.as_secs_f64())]
    MonitorTimeout { phase: Phase, waited: Duration },

    #[error("{phase}: failed to prepare {}: {source}", .path.display())]
    Artifact {
        phase: Phase,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PhaseError {
    pub fn phase(&self) -> Phase {
        match self {
            PhaseError::Ordering { phase, .. }
            | PhaseError::Invocation { phase, .. }
            | PhaseError::NonZeroExit { phase, .. }
            | PhaseError::Validation { phase, .. }
            | PhaseError::FatalLog { phase, .. }
            | PhaseError::MonitorTimeout { phase, .. }
            | PhaseError::Artifact { phase, .. } => *phase,
        }
    }

    /// Map onto the failure taxonomy. A monitor timeout is a log-level
    /// verdict; artifact I/O failures happen before anything ran and are
    /// reported as invocation failures.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PhaseError::Ordering { .. } => ErrorKind::Ordering,
            PhaseError::Invocation { .. } | PhaseError::Artifact { .. } => ErrorKind::Invocation,
            PhaseError::NonZeroExit { .. } => ErrorKind::NonZeroExit,
            PhaseError::Validation { .. } => ErrorKind::Validation,
            PhaseError::FatalLog { .. } | PhaseError::MonitorTimeout { .. } => ErrorKind::FatalLog,
        }
    }
}

/// Errors from the checkpoint store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("No checkpoint for {phase} at {}", .dir.display())]
    Missing { phase: Phase, dir: PathBuf },

    #[error("Checkpoint for {phase} is incomplete: missing {file}")]
    MissingFile { phase: Phase, file: String },

    #[error("Checkpoint for {phase} is corrupt: {file} does not match its manifest")]
    Corrupt { phase: Phase, file: String },

    #[error("Cannot back up {phase}: output {} does not exist", .path.display())]
    MissingOutput { phase: Phase, path: PathBuf },

    #[error("Cannot restore {phase}: {} is not a regular file", .path.display())]
    Blocked { phase: Phase, path: PathBuf },

    #[error("Checkpoint I/O failed at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid checkpoint manifest at {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CheckpointError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from the workflow metadata registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Workflow {id} not found")]
    NotFound { id: String },

    #[error("Registry I/O failed at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid workflow document at {}: {source}", .path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl RegistryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RegistryError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Everything the pipeline controller can return.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Phase(#[from] PhaseError),

    #[error("{phase}: checkpoint failed: {source}")]
    Checkpoint {
        phase: Phase,
        #[source]
        source: CheckpointError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Workflow {id} has no simulation parameters")]
    MissingParams { id: String },
}

impl PipelineError {
    /// The phase this failure was recorded against, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            PipelineError::Phase(e) => Some(e.phase()),
            PipelineError::Checkpoint { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}
