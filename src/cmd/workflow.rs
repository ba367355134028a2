//! Workflow registry commands: init, create, list, show, status, delete,
//! logs, export and import.

use anyhow::{Context, Result};
use console::style;
use mdforge::config::Config;
use mdforge::ui::icons::{CHECK, CROSS, FOLDER};
use mdforge::validator;
use mdforge::{Phase, PipelineState, SimulationParams};
use std::path::{Path, PathBuf};

use super::require_init;

pub fn cmd_init(config: &Config) -> Result<()> {
    let was_initialized = config.is_initialized();
    config.ensure_directories()?;

    if was_initialized {
        println!(
            "mdforge workspace already initialized at {}",
            config.mdforge_dir.display()
        );
        println!("Directory structure verified.");
        return Ok(());
    }

    println!(
        "Initialized mdforge workspace at {}",
        config.mdforge_dir.display()
    );
    println!();
    println!("Created directory structure:");
    println!("  .mdforge/");
    println!("  └── workflows/    # One JSON record per workflow");
    println!();
    println!("Next steps:");
    println!("  1. Run `mdforge create --name <name> --structure <file.pdb>`");
    println!("  2. Run `mdforge run <id>` to start the pipeline");
    Ok(())
}

pub struct CreateArgs<'a> {
    pub name: &'a str,
    pub structure: &'a Path,
    pub topology: Option<&'a Path>,
    pub description: &'a str,
    pub force_field: Option<&'a str>,
    pub water_model: Option<&'a str>,
    pub params: Option<&'a Path>,
    pub optimize: bool,
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    Ok(cwd.join(path))
}

/// Parameters from an optional JSON file, with the structure filled in from
/// the command line when the file leaves it out.
fn load_params(file: Option<&Path>, structure: PathBuf) -> Result<SimulationParams> {
    let Some(file) = file else {
        return Ok(SimulationParams::new(structure));
    };
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read parameters file {}", file.display()))?;
    let mut value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse parameters file {}", file.display()))?;
    if let Some(object) = value.as_object_mut() {
        object.insert(
            "structure_file".to_string(),
            serde_json::Value::String(structure.to_string_lossy().into_owned()),
        );
    }
    serde_json::from_value(value)
        .with_context(|| format!("Invalid simulation parameters in {}", file.display()))
}

pub fn cmd_create(config: &Config, args: &CreateArgs<'_>) -> Result<()> {
    require_init(config)?;

    let mut params = load_params(args.params, absolute(args.structure)?)?;
    if let Some(topology) = args.topology {
        params.topology_file = Some(absolute(topology)?);
    }
    if let Some(force_field) = args.force_field {
        params.force_field = force_field.to_string();
    }
    if let Some(water_model) = args.water_model {
        params.water_model = water_model.to_string();
    }

    let mut optimized = validator::ParamWarnings::new();
    if args.optimize {
        (params, optimized) = validator::optimize_params(&params);
    }

    let warnings = validator::check_params(&params, &config.workspace)?;
    if let Some(topology) = &params.topology_file
        && !topology.is_file()
    {
        anyhow::bail!("Topology file not found: {}", topology.display());
    }

    let record = config
        .registry()
        .create(args.name, args.description, Some(params))?;

    println!(
        "{} Created workflow {}",
        CHECK,
        style(&record.workflow_id).bold()
    );
    println!(
        "  {}{}",
        FOLDER,
        config.registry().work_dir(&record.workflow_id).display()
    );

    if args.optimize {
        println!();
        if optimized.is_empty() {
            println!("Parameters already match the recommended set.");
        } else {
            println!("Optimized parameters:");
            for (section, changes) in &optimized {
                for change in changes {
                    println!("  - [{}] {}", section, style(change).cyan());
                }
            }
        }
    }

    if !warnings.is_empty() {
        println!();
        println!("Parameter warnings:");
        for (section, messages) in &warnings {
            for message in messages {
                println!("  - [{}] {}", section, style(message).yellow());
            }
        }
    }
    Ok(())
}

pub fn cmd_list(config: &Config) -> Result<()> {
    require_init(config)?;
    let records = config.registry().list()?;

    println!();
    if records.is_empty() {
        println!("No workflows found. Run 'mdforge create' to add one.");
        println!();
        return Ok(());
    }

    println!("{:<38} {:<20} {:<22} Created", "ID", "Name", "State");
    println!(
        "{:<38} {:<20} {:<22} -------",
        "------------------------------------", "--------------------", "----------------------"
    );
    for record in &records {
        println!(
            "{:<38} {:<20} {:<22} {}",
            record.workflow_id,
            record.name,
            describe_state(record.status.state()),
            record.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();
    Ok(())
}

pub fn cmd_show(config: &Config, id: &str) -> Result<()> {
    require_init(config)?;
    let record = config.registry().get(id)?;
    let json = serde_json::to_string_pretty(&record).context("Failed to serialize workflow")?;
    println!("{json}");
    Ok(())
}

pub fn cmd_status(config: &Config, id: &str) -> Result<()> {
    require_init(config)?;
    let record = config.registry().get(id)?;
    let status = &record.status;

    println!();
    println!("Workflow: {} ({})", style(&record.name).bold(), record.workflow_id);
    println!("State:    {}", describe_state(status.state()));
    if let Some(started) = status.started_at {
        println!("Started:  {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(ended) = status.ended_at {
        println!("Ended:    {}", ended.format("%Y-%m-%d %H:%M:%S"));
    }
    println!();

    for phase in Phase::ALL {
        if status.is_completed(phase) {
            println!("  {} {}", CHECK, style(phase.label()).green());
        } else if let Some(error) = status.error_for(phase) {
            println!(
                "  {} {}  {}",
                CROSS,
                style(phase.label()).red(),
                style(error).red().dim()
            );
        } else if status.current_phase == Some(phase) {
            println!("  {} {}", style("▶").yellow(), style(phase.label()).yellow());
        } else {
            println!("  {} {}", style("·").dim(), style(phase.label()).dim());
        }
    }
    println!();
    Ok(())
}

pub fn cmd_delete(config: &Config, id: &str, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    require_init(config)?;
    let registry = config.registry();
    let record = registry.get(id)?;

    if !force {
        let confirm = Confirm::new()
            .with_prompt(format!(
                "Delete workflow '{}' and its working directory?",
                record.name
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Delete cancelled");
            return Ok(());
        }
    }

    registry.delete(id)?;
    println!("Deleted workflow {id}");
    Ok(())
}

pub fn cmd_logs(config: &Config, id: &str) -> Result<()> {
    require_init(config)?;
    let lines = config.registry().logs(id)?;
    if lines.is_empty() {
        println!("No logs for workflow {id}");
        return Ok(());
    }
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

pub fn cmd_export(config: &Config, id: &str, output: &Path) -> Result<()> {
    require_init(config)?;
    config.registry().export(id, output)?;
    println!("Exported workflow {} to {}", id, output.display());
    Ok(())
}

pub fn cmd_import(config: &Config, input: &Path) -> Result<()> {
    require_init(config)?;
    let record = config.registry().import(input)?;
    println!(
        "{} Imported workflow {}",
        CHECK,
        style(&record.workflow_id).bold()
    );
    Ok(())
}

fn describe_state(state: PipelineState) -> String {
    match state {
        PipelineState::At(phase) => format!("at {}", phase.label()),
        PipelineState::Complete => "complete".to_string(),
        PipelineState::Failed(phase) => format!("failed at {}", phase.label()),
    }
}
