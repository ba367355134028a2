use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::controller::{PipelineContext, ValidationSettings};
use crate::engine::GromacsEngine;
use crate::gateway::ProcessGateway;
use crate::monitor::MonitorSettings;
use crate::project_config::{CONFIG_FILE, MdforgeToml};
use crate::registry::Registry;

/// Runtime configuration for one CLI invocation.
///
/// Bridges `mdforge.toml` (already layered with the environment) with the
/// CLI flags and hands each component its settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: PathBuf,
    pub mdforge_dir: PathBuf,
    pub config_file: PathBuf,
    pub verbose: bool,
    pub toml: MdforgeToml,
}

impl Config {
    pub fn new(workspace: PathBuf, verbose: bool) -> Result<Self> {
        let workspace = workspace
            .canonicalize()
            .with_context(|| format!("Failed to resolve workspace {}", workspace.display()))?;
        let mdforge_dir = workspace.join(".mdforge");
        let config_file = mdforge_dir.join(CONFIG_FILE);
        let toml = MdforgeToml::load_or_default(&mdforge_dir)?;

        Ok(Self {
            workspace,
            mdforge_dir,
            config_file,
            verbose,
            toml,
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.mdforge_dir.is_dir()
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(self.mdforge_dir.join("workflows"))
            .context("Failed to create workflows directory")?;
        Ok(())
    }

    pub fn registry(&self) -> Registry {
        Registry::new(&self.workspace)
    }

    pub fn engine(&self) -> GromacsEngine {
        GromacsEngine {
            command: self.toml.gmx_command(),
            legacy_commands: self.toml.engine.legacy_commands,
            prepare_timeout: self.toml.prepare_timeout(),
            run_timeout: self.toml.run_timeout(),
            mdp_overrides: self.toml.mdp_overrides(),
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        let monitor = &self.toml.monitor;
        MonitorSettings {
            completion_marker: monitor.completion_marker.clone(),
            fatal_marker: monitor.fatal_marker.clone(),
            tail_lines: monitor.tail_lines,
            startup_poll: Duration::from_millis(monitor.startup_poll_ms.max(1)),
            poll: Duration::from_millis(monitor.poll_ms.max(1)),
            sample_interval: Duration::from_secs(monitor.sample_secs.max(1)),
            max_wait: monitor.max_wait_secs.map(Duration::from_secs),
        }
    }

    pub fn validation_settings(&self) -> ValidationSettings {
        ValidationSettings {
            energy_check: self.toml.validation.energy_check,
            energy_selection: self.toml.validation.energy_selection.clone(),
        }
    }

    /// Everything a pipeline controller needs, minus the terminal UI.
    pub fn pipeline_context(&self, gateway: Arc<dyn ProcessGateway>) -> PipelineContext {
        let mut ctx = PipelineContext::new(self.registry(), gateway);
        ctx.engine = self.engine();
        ctx.monitor = self.monitor_settings();
        ctx.validation = self.validation_settings();
        ctx
    }
}
