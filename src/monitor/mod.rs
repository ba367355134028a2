//! Progress monitoring for running phases.
//!
//! A [`ProgressSource`] answers "is it done yet?" for one phase attempt;
//! [`ProgressMonitor`] polls it until it reports completion, a fatal error,
//! or the optional wait limit runs out. Throughput samples are emitted on
//! the side and never influence the verdict.

pub mod log_marker;
pub mod throughput;

use mdforge_common::Phase;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

pub use log_marker::LogMarkerSource;
pub use throughput::{Sample, SampleObserver, ThroughputTracker};

/// What a progress source currently reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Done,
    /// Carries the offending log line.
    Failed(String),
}

/// Observes one phase attempt.
pub trait ProgressSource: Send {
    fn poll_state(&mut self) -> io::Result<PollState>;

    /// Whether the watched artifact exists yet.
    fn has_started(&self) -> bool;

    fn latest_step(&mut self) -> Option<u64> {
        None
    }
}

/// Final verdict of a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    Completed,
    Fatal(String),
    TimedOut(Duration),
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub completion_marker: String,
    pub fatal_marker: String,
    pub tail_lines: usize,
    /// Poll interval while the log does not exist yet.
    pub startup_poll: Duration,
    pub poll: Duration,
    pub sample_interval: Duration,
    pub max_wait: Option<Duration>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            completion_marker: "Finished mdrun".to_string(),
            fatal_marker: "Fatal error".to_string(),
            tail_lines: 20,
            startup_poll: Duration::from_secs(1),
            poll: Duration::from_secs(5),
            sample_interval: Duration::from_secs(30),
            max_wait: None,
        }
    }
}

impl MonitorSettings {
    pub fn log_source(&self, path: impl Into<std::path::PathBuf>) -> LogMarkerSource {
        LogMarkerSource::new(
            path,
            &self.completion_marker,
            &self.fatal_marker,
            self.tail_lines,
        )
    }
}

/// Polls a [`ProgressSource`] until it reaches a verdict.
pub struct ProgressMonitor<S: ProgressSource> {
    source: S,
    settings: MonitorSettings,
    tracker: ThroughputTracker,
    observer: Option<Arc<dyn SampleObserver>>,
}

impl<S: ProgressSource> ProgressMonitor<S> {
    pub fn new(
        source: S,
        settings: MonitorSettings,
        phase: Phase,
        dt: Option<f64>,
        total_steps: Option<u64>,
    ) -> Self {
        Self {
            source,
            settings,
            tracker: ThroughputTracker::new(phase, std::time::Instant::now(), dt, total_steps),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Option<Arc<dyn SampleObserver>>) -> Self {
        self.observer = observer;
        self
    }

    /// Poll until done. The first poll happens immediately.
    pub async fn watch(&mut self) -> MonitorOutcome {
        let start = Instant::now();
        let mut next_sample = start + self.settings.sample_interval;

        loop {
            match self.source.poll_state() {
                Ok(PollState::Done) => return MonitorOutcome::Completed,
                Ok(PollState::Failed(line)) => return MonitorOutcome::Fatal(line),
                Ok(PollState::Pending) => {}
                Err(e) => tracing::warn!(error = %e, "progress poll failed"),
            }

            let now = Instant::now();
            if now >= next_sample && self.source.has_started() {
                self.emit_sample();
                next_sample = now + self.settings.sample_interval;
            }

            let waited = now.duration_since(start);
            if let Some(limit) = self.settings.max_wait
                && waited >= limit
            {
                return MonitorOutcome::TimedOut(waited);
            }

            let delay = if self.source.has_started() {
                self.settings.poll
            } else {
                self.settings.startup_poll
            };
            sleep(delay).await;
        }
    }

    fn emit_sample(&mut self) {
        let step = self.source.latest_step();
        let sample = self.tracker.sample(std::time::Instant::now(), step);
        tracing::info!(
            phase = %sample.phase,
            elapsed_secs = sample.elapsed.as_secs(),
            step = ?sample.step,
            steps_per_sec = ?sample.steps_per_sec,
            ns_per_day = ?sample.ns_per_day,
            "progress"
        );
        if let Some(observer) = &self.observer {
            observer.on_sample(&sample);
        }
    }
}
