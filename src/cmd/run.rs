//! Pipeline execution commands: run, restore, checkpoints.

use anyhow::{Context, Result};
use console::style;
use mdforge::Phase;
use mdforge::checkpoint::CheckpointStore;
use mdforge::config::Config;
use mdforge::controller::PipelineController;
use mdforge::gateway::{ProcessGateway, SubprocessGateway};
use mdforge::ui::icons::{CHECK, SPARKLE};
use mdforge::ui::{PipelineUI, format_elapsed};
use std::sync::Arc;
use std::time::Instant;

use super::{parse_phase, require_init};

/// What `run` was asked to do.
enum RunScope {
    Pending,
    Single(Phase),
    From(Phase),
}

pub async fn cmd_run(
    config: &Config,
    id: &str,
    phase: Option<&str>,
    from: Option<&str>,
) -> Result<()> {
    require_init(config)?;

    let scope = match (phase, from) {
        (Some(phase), _) => RunScope::Single(parse_phase(phase)?),
        (None, Some(from)) => RunScope::From(parse_phase(from)?),
        (None, None) => RunScope::Pending,
    };

    let record = config.registry().get(id)?;
    if matches!(scope, RunScope::Pending) && record.status.all_completed() {
        println!("{} All phases of {} already completed", CHECK, record.name);
        return Ok(());
    }

    let already_done = match scope {
        RunScope::Pending => record.status.completed_phases.len(),
        RunScope::Single(phase) | RunScope::From(phase) => phase.index(),
    };
    let ui = Arc::new(PipelineUI::new(already_done as u64, config.verbose));

    let gateway: Arc<dyn ProcessGateway> = Arc::new(SubprocessGateway::new());
    let mut ctx = config.pipeline_context(gateway);
    ctx.ui = Some(ui.clone());
    let mut controller = PipelineController::load(ctx, id)?;

    println!();
    println!(
        "{} Running workflow {} in {}",
        style("mdforge").bold().cyan(),
        style(&record.name).bold(),
        controller.work_dir().display()
    );
    println!();

    let started = Instant::now();
    let result = match scope {
        RunScope::Pending => controller.run_pending().await,
        RunScope::Single(phase) => controller.run_phase(phase).await.map(|()| vec![phase]),
        RunScope::From(phase) => controller.run_from(phase).await,
    };
    let all_done = controller.status().all_completed();
    ui.finish(all_done);

    let ran = result.with_context(|| format!("Workflow {id} halted"))?;
    println!();
    println!(
        "{}{} phase(s) completed in {}",
        if all_done { SPARKLE } else { CHECK },
        ran.len(),
        format_elapsed(started.elapsed())
    );
    if let Some(next) = controller.status().next_phase() {
        println!("Next phase: {}", next.label());
    }
    Ok(())
}

pub fn cmd_restore(config: &Config, id: &str, phase: &str) -> Result<()> {
    require_init(config)?;
    let phase = parse_phase(phase)?;

    let gateway: Arc<dyn ProcessGateway> = Arc::new(SubprocessGateway::new());
    let mut controller = PipelineController::load(config.pipeline_context(gateway), id)?;
    controller
        .restore(phase)
        .with_context(|| format!("Failed to restore {} of workflow {id}", phase.label()))?;

    println!(
        "{} Restored {} into {}",
        CHECK,
        style(phase.label()).green(),
        controller.work_dir().display()
    );
    Ok(())
}

pub fn cmd_checkpoints(config: &Config, id: &str) -> Result<()> {
    require_init(config)?;
    let registry = config.registry();
    let checkpoints = registry.checkpoints(id)?;

    println!();
    if checkpoints.is_empty() {
        println!("No checkpoints for workflow {id}");
        println!();
        return Ok(());
    }

    let store = CheckpointStore::new(registry.work_dir(id));
    for (phase, files) in &checkpoints {
        let created = store
            .manifest(*phase)
            .map(|m| m.created_at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|_| "incomplete".to_string());
        println!(
            "{} {}",
            style(phase.label()).bold(),
            style(format!("({created})")).dim()
        );
        for file in files {
            println!("    {file}");
        }
    }
    println!();
    Ok(())
}
