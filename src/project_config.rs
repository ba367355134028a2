//! Project configuration read from `.mdforge/mdforge.toml`.
//!
//! Settings are layered: file → environment → CLI. Every key is optional and
//! falls back to the defaults below.
//!
//! # Configuration File Format
//!
//! ```toml
//! [engine]
//! command = "gmx"
//! legacy_commands = false
//! prepare_timeout_secs = 600
//! run_timeout_secs = 86400
//!
//! [monitor]
//! completion_marker = "Finished mdrun"
//! fatal_marker = "Fatal error"
//! startup_poll_ms = 1000
//! poll_ms = 5000
//! tail_lines = 20
//! sample_secs = 30
//! max_wait_secs = 172800
//!
//! [validation]
//! energy_check = true
//! energy_selection = "Potential"
//!
//! [mdp.production]
//! nstxout-compressed = 1000
//! tcoupl = "Nose-Hoover"
//! ```

use anyhow::{Context, Result};
use mdforge_common::Phase;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable that overrides `[engine].command`.
pub const GMX_ENV: &str = "MDFORGE_GMX";

pub const CONFIG_FILE: &str = "mdforge.toml";

/// `[engine]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_command")]
    pub command: String,
    /// Call `grompp`, `mdrun` … directly rather than as `gmx` subcommands
    #[serde(default)]
    pub legacy_commands: bool,
    #[serde(default)]
    pub prepare_timeout_secs: Option<u64>,
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

fn default_command() -> String {
    "gmx".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            command: default_command(),
            legacy_commands: false,
            prepare_timeout_secs: None,
            run_timeout_secs: None,
        }
    }
}

/// `[monitor]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_completion_marker")]
    pub completion_marker: String,
    #[serde(default = "default_fatal_marker")]
    pub fatal_marker: String,
    #[serde(default = "default_startup_poll_ms")]
    pub startup_poll_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
    #[serde(default = "default_sample_secs")]
    pub sample_secs: u64,
    /// Give up on a run that has neither finished nor failed after this long
    #[serde(default)]
    pub max_wait_secs: Option<u64>,
}

fn default_completion_marker() -> String {
    "Finished mdrun".to_string()
}

fn default_fatal_marker() -> String {
    "Fatal error".to_string()
}

fn default_startup_poll_ms() -> u64 {
    1000
}

fn default_poll_ms() -> u64 {
    5000
}

fn default_tail_lines() -> usize {
    20
}

fn default_sample_secs() -> u64 {
    30
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            completion_marker: default_completion_marker(),
            fatal_marker: default_fatal_marker(),
            startup_poll_ms: default_startup_poll_ms(),
            poll_ms: default_poll_ms(),
            tail_lines: default_tail_lines(),
            sample_secs: default_sample_secs(),
            max_wait_secs: None,
        }
    }
}

/// `[validation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSection {
    #[serde(default = "default_energy_check")]
    pub energy_check: bool,
    #[serde(default = "default_energy_selection")]
    pub energy_selection: String,
}

fn default_energy_check() -> bool {
    true
}

fn default_energy_selection() -> String {
    "Potential".to_string()
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            energy_check: default_energy_check(),
            energy_selection: default_energy_selection(),
        }
    }
}

/// The complete mdforge.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MdforgeToml {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub validation: ValidationSection,
    /// Extra `.mdp` keys per phase, keyed by phase name or alias
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mdp: BTreeMap<String, BTreeMap<String, toml::Value>>,
}

impl MdforgeToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse mdforge.toml")
    }

    /// Load `<mdforge_dir>/mdforge.toml`, or defaults when it does not exist.
    pub fn load_or_default(mdforge_dir: &Path) -> Result<Self> {
        let config_path = mdforge_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize mdforge.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Engine command, with `MDFORGE_GMX` taking precedence over the file.
    pub fn gmx_command(&self) -> String {
        self.gmx_command_with(std::env::var(GMX_ENV).ok())
    }

    fn gmx_command_with(&self, env_value: Option<String>) -> String {
        env_value
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.engine.command.clone())
    }

    /// `[mdp.*]` sections resolved to phases. Unknown section names are
    /// skipped here and reported by [`MdforgeToml::validate`].
    pub fn mdp_overrides(&self) -> BTreeMap<Phase, Vec<(String, String)>> {
        let mut overrides = BTreeMap::new();
        for (section, keys) in &self.mdp {
            let Ok(phase) = section.parse::<Phase>() else {
                continue;
            };
            let entries: &mut Vec<(String, String)> = overrides.entry(phase).or_default();
            entries.extend(keys.iter().map(|(k, v)| (k.clone(), mdp_value(v))));
        }
        overrides
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.engine.command.trim().is_empty() {
            warnings.push("[engine] command is empty".to_string());
        }
        if self.monitor.completion_marker.is_empty() {
            warnings.push("[monitor] completion_marker is empty; every poll would match".to_string());
        }
        if self.monitor.fatal_marker.is_empty() {
            warnings.push("[monitor] fatal_marker is empty; every poll would match".to_string());
        }
        for (key, value) in [
            ("startup_poll_ms", self.monitor.startup_poll_ms),
            ("poll_ms", self.monitor.poll_ms),
            ("sample_secs", self.monitor.sample_secs),
        ] {
            if value == 0 {
                warnings.push(format!("[monitor] {key} is zero"));
            }
        }
        if self.monitor.tail_lines == 0 {
            warnings.push("[monitor] tail_lines is zero; markers can never be seen".to_string());
        }
        if self.engine.run_timeout_secs == Some(0) || self.engine.prepare_timeout_secs == Some(0) {
            warnings.push("[engine] a timeout of zero fails every invocation".to_string());
        }
        if self.validation.energy_check && self.validation.energy_selection.trim().is_empty() {
            warnings.push("[validation] energy_selection is empty".to_string());
        }
        for section in self.mdp.keys() {
            if section.parse::<Phase>().is_err() {
                warnings.push(format!("[mdp.{section}] does not name a known phase"));
            }
        }

        warnings
    }

    pub fn prepare_timeout(&self) -> Option<Duration> {
        self.engine.prepare_timeout_secs.map(Duration::from_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.engine.run_timeout_secs.map(Duration::from_secs)
    }
}

fn mdp_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Boolean(true) => "yes".to_string(),
        toml::Value::Boolean(false) => "no".to_string(),
        toml::Value::Array(items) => items.iter().map(mdp_value).collect::<Vec<_>>().join(" "),
        other => other.to_string(),
    }
}
