//! Workflow status: which phases completed, which failed, and when.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::phase::Phase;

/// Progress record for one pipeline instance.
///
/// Once a phase has been attempted it appears either in `completed_phases`
/// or in `errors`, never both. The mutators below are the only way the
/// controller changes the record, and each of them keeps that invariant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    #[serde(default)]
    pub current_phase: Option<Phase>,
    /// Completed phases in completion order.
    #[serde(default)]
    pub completed_phases: Vec<Phase>,
    #[serde(default)]
    pub errors: BTreeMap<Phase, String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Where a pipeline instance currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// The given phase is the next one to run (or is running).
    At(Phase),
    /// Every phase has completed.
    Complete,
    /// The given phase failed and the pipeline halted.
    Failed(Phase),
}

impl WorkflowStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_completed(&self, phase: Phase) -> bool {
        self.completed_phases.contains(&phase)
    }

    pub fn error_for(&self, phase: Phase) -> Option<&str> {
        self.errors.get(&phase).map(String::as_str)
    }

    /// Mark the start of an attempt at `phase`.
    pub fn begin(&mut self, phase: Phase) {
        self.current_phase = Some(phase);
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.ended_at = None;
    }

    /// Record a successful attempt. A phase that was already completed keeps
    /// its original position in the completion order.
    pub fn record_success(&mut self, phase: Phase) {
        self.errors.remove(&phase);
        if !self.is_completed(phase) {
            self.completed_phases.push(phase);
        }
        self.current_phase = Some(phase);
        if self.all_completed() {
            self.ended_at = Some(Utc::now());
        }
    }

    /// Record a failed attempt and halt.
    pub fn record_failure(&mut self, phase: Phase, message: impl Into<String>) {
        self.completed_phases.retain(|p| *p != phase);
        self.errors.insert(phase, message.into());
        self.current_phase = Some(phase);
        self.ended_at = Some(Utc::now());
    }

    pub fn all_completed(&self) -> bool {
        Phase::ALL.iter().all(|p| self.is_completed(*p))
    }

    /// First phase in pipeline order that has not completed.
    pub fn next_phase(&self) -> Option<Phase> {
        Phase::ALL.into_iter().find(|p| !self.is_completed(*p))
    }

    /// Errors on phases past the first uncompleted one (a phase invoked too
    /// early) are kept in `errors` but do not mark the pipeline failed.
    pub fn state(&self) -> PipelineState {
        let Some(next) = self.next_phase() else {
            return PipelineState::Complete;
        };
        match self.errors.keys().next() {
            Some(&phase) if phase <= next => PipelineState::Failed(phase),
            _ => PipelineState::At(next),
        }
    }
}
