pub mod checkpoint;
pub mod config;
pub mod controller;
pub mod engine;
pub mod errors;
pub mod gateway;
pub mod logging;
pub mod monitor;
pub mod project_config;
pub mod registry;
pub mod ui;
pub mod validator;

pub use mdforge_common::{Phase, PipelineState, SimulationParams, WorkflowStatus};
