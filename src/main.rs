use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mdforge::config::Config;
use mdforge::logging::{self, LogFormat};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "mdforge")]
#[command(version, about = "Molecular dynamics stage pipeline controller")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding `.mdforge/` and the workflow working directories
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize an mdforge workspace
    Init,
    /// Register a new workflow
    Create {
        #[arg(short, long)]
        name: String,
        /// Structure file (PDB or GRO)
        #[arg(short, long)]
        structure: PathBuf,
        /// Use a prepared topology instead of generating one
        #[arg(long)]
        topology: Option<PathBuf>,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(long)]
        force_field: Option<String>,
        #[arg(long)]
        water_model: Option<String>,
        /// JSON file with simulation parameters; --structure and the flags above win
        #[arg(long)]
        params: Option<PathBuf>,
        /// Replace tunable parameters with the recommended set
        #[arg(long)]
        optimize: bool,
    },
    /// List workflows, newest first
    List,
    /// Print a workflow record as JSON
    Show { id: String },
    /// Show per-phase progress of a workflow
    Status { id: String },
    /// Delete a workflow record and its working directory
    Delete {
        id: String,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Run pending phases, a single phase, or everything from a phase on
    Run {
        id: String,
        /// Run only this phase
        #[arg(long, conflicts_with = "from")]
        phase: Option<String>,
        /// Re-run this phase and all later ones
        #[arg(long)]
        from: Option<String>,
    },
    /// Restore a phase's outputs from its checkpoint
    Restore { id: String, phase: String },
    /// List checkpointed phases and files
    Checkpoints { id: String },
    /// Print the workflow's run logs
    Logs { id: String },
    /// Write a workflow record to a file
    Export { id: String, output: PathBuf },
    /// Create a workflow from an exported record
    Import { input: PathBuf },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default mdforge.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let workspace = match cli.workspace.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    if matches!(cli.command, Commands::Init) {
        std::fs::create_dir_all(&workspace)
            .with_context(|| format!("Failed to create workspace {}", workspace.display()))?;
    }
    let config = Config::new(workspace, cli.verbose)?;

    // A run also logs to the workflow's logs/ directory, read back by `logs`.
    let run_log_dir = match &cli.command {
        Commands::Run { id, .. } => {
            let registry = config.registry();
            registry.get(id).ok().map(|_| registry.log_dir(id))
        }
        _ => None,
    };
    let _log_guard = logging::init(cli.verbose, cli.log_format, run_log_dir.as_deref())?;

    match &cli.command {
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Create {
            name,
            structure,
            topology,
            description,
            force_field,
            water_model,
            params,
            optimize,
        } => {
            let args = cmd::CreateArgs {
                name,
                structure,
                topology: topology.as_deref(),
                description,
                force_field: force_field.as_deref(),
                water_model: water_model.as_deref(),
                params: params.as_deref(),
                optimize: *optimize,
            };
            cmd::cmd_create(&config, &args)?;
        }
        Commands::List => cmd::cmd_list(&config)?,
        Commands::Show { id } => cmd::cmd_show(&config, id)?,
        Commands::Status { id } => cmd::cmd_status(&config, id)?,
        Commands::Delete { id, force } => cmd::cmd_delete(&config, id, *force)?,
        Commands::Run { id, phase, from } => {
            cmd::cmd_run(&config, id, phase.as_deref(), from.as_deref()).await?;
        }
        Commands::Restore { id, phase } => cmd::cmd_restore(&config, id, phase)?,
        Commands::Checkpoints { id } => cmd::cmd_checkpoints(&config, id)?,
        Commands::Logs { id } => cmd::cmd_logs(&config, id)?,
        Commands::Export { id, output } => cmd::cmd_export(&config, id, output)?,
        Commands::Import { input } => cmd::cmd_import(&config, input)?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
