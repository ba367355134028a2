//! Configuration view and validation commands: `mdforge config`.

use anyhow::Result;
use mdforge::config::Config;
use mdforge::project_config::{GMX_ENV, MdforgeToml};

use super::super::ConfigCommands;

fn print_toml(toml: &MdforgeToml) {
    println!("[engine]");
    println!("  command = \"{}\"", toml.engine.command);
    println!("  legacy_commands = {}", toml.engine.legacy_commands);
    if let Some(secs) = toml.engine.prepare_timeout_secs {
        println!("  prepare_timeout_secs = {}", secs);
    }
    if let Some(secs) = toml.engine.run_timeout_secs {
        println!("  run_timeout_secs = {}", secs);
    }
    println!();

    println!("[monitor]");
    println!("  completion_marker = \"{}\"", toml.monitor.completion_marker);
    println!("  fatal_marker = \"{}\"", toml.monitor.fatal_marker);
    println!("  startup_poll_ms = {}", toml.monitor.startup_poll_ms);
    println!("  poll_ms = {}", toml.monitor.poll_ms);
    println!("  tail_lines = {}", toml.monitor.tail_lines);
    println!("  sample_secs = {}", toml.monitor.sample_secs);
    if let Some(secs) = toml.monitor.max_wait_secs {
        println!("  max_wait_secs = {}", secs);
    }
    println!();

    println!("[validation]");
    println!("  energy_check = {}", toml.validation.energy_check);
    println!("  energy_selection = \"{}\"", toml.validation.energy_selection);
    println!();

    for (section, keys) in &toml.mdp {
        println!("[mdp.{}]", section);
        for (key, value) in keys {
            println!("  {} = {}", key, value);
        }
        println!();
    }
}

pub fn cmd_config(config: &Config, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = &config.config_file;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("mdforge Configuration");
            println!("=====================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No mdforge.toml found at {}", config_path.display());
                println!("Using default configuration:");
            }
            println!();
            print_toml(&config.toml);

            println!("Effective values (with env/CLI overrides):");
            println!("  engine command = \"{}\" ({} overrides)", config.toml.gmx_command(), GMX_ENV);
            println!("  verbose = {}", config.verbose);
            println!();

            if !config_path.exists() {
                println!("Run 'mdforge config init' to create a mdforge.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No mdforge.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = MdforgeToml::load(config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("mdforge.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !config.mdforge_dir.exists() {
                std::fs::create_dir_all(&config.mdforge_dir)?;
            }

            MdforgeToml::default().save(config_path)?;

            println!("Created mdforge.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [engine] command, timeouts");
            println!("  - [monitor] log markers and poll intervals");
            println!("  - [mdp.<phase>] extra parameters for a phase");
            println!();
        }
    }

    Ok(())
}
