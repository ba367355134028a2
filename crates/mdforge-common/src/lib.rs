//! Shared domain types for the mdforge pipeline controller.

pub mod params;
pub mod phase;
pub mod process;
pub mod status;

pub use params::{EquilibrationParams, MinimizationParams, PhaseConfig, ProductionParams, SimulationParams};
pub use phase::{Phase, UnknownPhase};
pub use process::{ProcessInvocation, ProcessResult};
pub use status::{PipelineState, WorkflowStatus};
