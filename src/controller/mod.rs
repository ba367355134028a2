//! Stage pipeline controller.
//!
//! Drives one pipeline instance through the fixed phase order. For each
//! phase: check the predecessor, write the configuration artifact, run the
//! prepare steps, run the engine while the progress monitor watches its log,
//! validate outputs, then checkpoint and record success. Any failure is
//! recorded against the phase in the workflow status and halts the pipeline.

pub mod validate;

use mdforge_common::{
    Phase, PipelineState, ProcessInvocation, ProcessResult, SimulationParams, WorkflowStatus,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::checkpoint::CheckpointStore;
use crate::engine::{self, GromacsEngine, PhasePlan};
use crate::errors::{PhaseError, PipelineError, RegistryError};
use crate::gateway::ProcessGateway;
use crate::monitor::{
    MonitorOutcome, MonitorSettings, PollState, ProgressMonitor, ProgressSource, SampleObserver,
};
use crate::registry::{Registry, WorkflowRecord, WorkflowUpdate};
use crate::ui::PipelineUI;

pub use validate::ValidationSettings;

/// Collaborators handed to a controller. Nothing here is process-global;
/// two controllers with separate contexts never share state.
pub struct PipelineContext {
    pub registry: Registry,
    pub gateway: Arc<dyn ProcessGateway>,
    pub engine: GromacsEngine,
    pub monitor: MonitorSettings,
    pub validation: ValidationSettings,
    pub ui: Option<Arc<PipelineUI>>,
}

impl PipelineContext {
    pub fn new(registry: Registry, gateway: Arc<dyn ProcessGateway>) -> Self {
        Self {
            registry,
            gateway,
            engine: GromacsEngine::default(),
            monitor: MonitorSettings::default(),
            validation: ValidationSettings::default(),
            ui: None,
        }
    }
}

pub struct PipelineController {
    ctx: PipelineContext,
    record: WorkflowRecord,
    params: SimulationParams,
    work_dir: PathBuf,
    checkpoints: CheckpointStore,
}

impl PipelineController {
    /// Resume an instance from its registry record.
    pub fn load(ctx: PipelineContext, id: &str) -> Result<Self, PipelineError> {
        let record = ctx.registry.get(id)?;
        let params = record
            .params
            .clone()
            .ok_or_else(|| PipelineError::MissingParams { id: id.to_string() })?;
        let work_dir = ctx.registry.work_dir(id);
        fs::create_dir_all(&work_dir).map_err(|e| RegistryError::io(&work_dir, e))?;
        let checkpoints = CheckpointStore::new(&work_dir);

        tracing::debug!(
            workflow = id,
            completed = record.status.completed_phases.len(),
            "loaded workflow"
        );
        Ok(Self {
            ctx,
            record,
            params,
            work_dir,
            checkpoints,
        })
    }

    pub fn id(&self) -> &str {
        &self.record.workflow_id
    }

    pub fn record(&self) -> &WorkflowRecord {
        &self.record
    }

    pub fn status(&self) -> &WorkflowStatus {
        &self.record.status
    }

    pub fn state(&self) -> PipelineState {
        self.record.status.state()
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Run a single phase. Its predecessor must already have completed.
    pub async fn run_phase(&mut self, phase: Phase) -> Result<(), PipelineError> {
        if let Some(predecessor) = phase.predecessor()
            && !self.record.status.is_completed(predecessor)
        {
            return self.abort(PhaseError::Ordering { phase, predecessor }.into());
        }

        tracing::info!(workflow = %self.id(), phase = %phase, "phase started");
        self.record.status.begin(phase);
        self.persist()?;
        if let Some(ui) = &self.ctx.ui {
            ui.start_phase(phase);
        }
        let started = Instant::now();

        if let Err(e) = self.attempt(phase).await {
            return self.abort(e.into());
        }
        if let Err(source) = self
            .checkpoints
            .backup(phase, engine::required_outputs(phase))
        {
            return self.abort(PipelineError::Checkpoint { phase, source });
        }

        self.record.status.record_success(phase);
        self.persist()?;

        let elapsed = started.elapsed();
        tracing::info!(
            workflow = %self.id(),
            phase = %phase,
            elapsed_secs = elapsed.as_secs(),
            "phase completed"
        );
        if let Some(ui) = &self.ctx.ui {
            ui.phase_complete(phase, elapsed);
        }
        Ok(())
    }

    /// Run from the first uncompleted phase through Production, stopping at
    /// the first failure. Returns the phases that completed in this call.
    pub async fn run_pending(&mut self) -> Result<Vec<Phase>, PipelineError> {
        let mut ran = Vec::new();
        while let Some(phase) = self.record.status.next_phase() {
            self.run_phase(phase).await?;
            ran.push(phase);
        }
        Ok(ran)
    }

    /// Run `start` and every later phase, re-running any that already completed.
    pub async fn run_from(&mut self, start: Phase) -> Result<Vec<Phase>, PipelineError> {
        let mut ran = Vec::new();
        for &phase in start.remaining() {
            self.run_phase(phase).await?;
            ran.push(phase);
        }
        Ok(ran)
    }

    /// Put a phase's checkpointed outputs back into the working directory
    /// and mark the phase completed again.
    pub fn restore(&mut self, phase: Phase) -> Result<(), PipelineError> {
        self.checkpoints
            .restore(phase, engine::required_outputs(phase))
            .map_err(|source| PipelineError::Checkpoint { phase, source })?;
        self.record.status.record_success(phase);
        self.persist()
    }

    async fn attempt(&self, phase: Phase) -> Result<(), PhaseError> {
        let plan = self.ctx.engine.plan(phase, &self.params, &self.work_dir);
        self.prepare_artifacts(&plan)?;

        for step in &plan.prepare {
            self.invoke(phase, step).await?;
        }
        self.supervise(&plan).await?;

        validate::check_outputs(&self.work_dir, phase, plan.outputs)?;
        validate::check_energy(
            self.ctx.gateway.as_ref(),
            &self.ctx.engine,
            &plan,
            &self.work_dir,
            &self.ctx.validation,
        )
        .await
    }

    /// Clear this phase's stale outputs, stage inputs and write the
    /// configuration artifact.
    fn prepare_artifacts(&self, plan: &PhasePlan) -> Result<(), PhaseError> {
        let phase = plan.phase;
        let artifact = |path: PathBuf, source: io::Error| PhaseError::Artifact { phase, path, source };

        for name in plan.stale_files() {
            let path = self.work_dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed stale output"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(artifact(path, e)),
            }
        }

        for input in &plan.staged {
            let source = if input.source.is_absolute() {
                input.source.clone()
            } else {
                self.ctx.registry.workspace().join(&input.source)
            };
            let dest = self.work_dir.join(&input.name);
            if let (Ok(a), Ok(b)) = (source.canonicalize(), dest.canonicalize())
                && a == b
            {
                continue;
            }
            fs::copy(&source, &dest).map_err(|e| artifact(source.clone(), e))?;
        }

        let mdp_path = self.work_dir.join(plan.mdp_name);
        fs::write(&mdp_path, plan.mdp.render()).map_err(|e| artifact(mdp_path.clone(), e))?;
        Ok(())
    }

    async fn invoke(
        &self,
        phase: Phase,
        invocation: &ProcessInvocation,
    ) -> Result<ProcessResult, PhaseError> {
        if let Some(ui) = &self.ctx.ui {
            ui.log_step(&invocation.display());
        }
        let result = self.ctx.gateway.execute(invocation).await;
        if result.success {
            Ok(result)
        } else {
            Err(exit_error(phase, &result))
        }
    }

    /// Run step plus progress monitor. Whichever finishes first decides;
    /// a fatal marker drops the run future, which kills the child.
    async fn supervise(&self, plan: &PhasePlan) -> Result<(), PhaseError> {
        let phase = plan.phase;
        let Some(log_name) = plan.log_file.as_deref() else {
            self.invoke(phase, &plan.run).await?;
            return Ok(());
        };
        let log_path = self.work_dir.join(log_name);

        if let Some(ui) = &self.ctx.ui {
            ui.log_step(&plan.run.display());
        }
        let observer = self
            .ctx
            .ui
            .clone()
            .map(|ui| ui as Arc<dyn SampleObserver>);
        let mut monitor = ProgressMonitor::new(
            self.ctx.monitor.log_source(&log_path),
            self.ctx.monitor.clone(),
            phase,
            plan.config.dt,
            Some(plan.config.nsteps),
        )
        .with_observer(observer);

        let run = self.ctx.gateway.execute(&plan.run);
        tokio::pin!(run);
        let watch = monitor.watch();
        tokio::pin!(watch);

        tokio::select! {
            result = &mut run => {
                // The run exited before the monitor saw a marker: the log is final now.
                let state = self.ctx.monitor.log_source(&log_path).poll_state();
                if !result.success {
                    return Err(match state {
                        Ok(PollState::Failed(line)) => PhaseError::FatalLog { phase, line },
                        _ => exit_error(phase, &result),
                    });
                }
                match state {
                    Ok(PollState::Done) => Ok(()),
                    Ok(PollState::Failed(line)) => Err(PhaseError::FatalLog { phase, line }),
                    Ok(PollState::Pending) => Err(PhaseError::Validation {
                        phase,
                        reason: format!("{log_name} has no completion marker after a clean exit"),
                    }),
                    Err(source) => Err(PhaseError::Artifact { phase, path: log_path.clone(), source }),
                }
            }
            outcome = &mut watch => {
                match outcome {
                    MonitorOutcome::Completed => {
                        let result = run.await;
                        if result.success {
                            Ok(())
                        } else {
                            Err(exit_error(phase, &result))
                        }
                    }
                    MonitorOutcome::Fatal(line) => {
                        tracing::warn!(phase = %phase, line = %line, "fatal marker in log, stopping run");
                        Err(PhaseError::FatalLog { phase, line })
                    }
                    MonitorOutcome::TimedOut(waited) => {
                        tracing::warn!(phase = %phase, waited_secs = waited.as_secs(), "no completion marker, stopping run");
                        Err(PhaseError::MonitorTimeout { phase, waited })
                    }
                }
            }
        }
    }

    /// Record the failure against its phase, persist, and hand it back.
    fn abort<T>(&mut self, err: PipelineError) -> Result<T, PipelineError> {
        if let Some(phase) = err.phase() {
            let message = err.to_string();
            tracing::error!(workflow = %self.id(), phase = %phase, error = %message, "phase failed");
            self.record.status.record_failure(phase, &message);
            if let Err(persist_err) = self.persist() {
                tracing::error!(error = %persist_err, "failed to persist workflow status");
            }
            if let Some(ui) = &self.ctx.ui {
                ui.phase_failed(phase, &message);
            }
        }
        Err(err)
    }

    fn persist(&mut self) -> Result<(), PipelineError> {
        self.record = self.ctx.registry.update(
            &self.record.workflow_id,
            WorkflowUpdate::status(self.record.status.clone()),
        )?;
        Ok(())
    }
}

fn exit_error(phase: Phase, result: &ProcessResult) -> PhaseError {
    if result.launched {
        PhaseError::NonZeroExit {
            phase,
            command: result.command.clone(),
            exit_code: result.exit_code,
            summary: result.failure_summary(),
        }
    } else {
        PhaseError::Invocation {
            phase,
            command: result.command.clone(),
            cause: result.stderr.clone(),
        }
    }
}
