//! Throughput sampling for running phases.

use mdforge_common::Phase;
use std::time::{Duration, Instant};

/// One observation of a running phase.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub phase: Phase,
    pub elapsed: Duration,
    pub step: Option<u64>,
    pub total_steps: Option<u64>,
    pub steps_per_sec: Option<f64>,
    pub ns_per_day: Option<f64>,
}

impl Sample {
    pub fn percent(&self) -> Option<f64> {
        match (self.step, self.total_steps) {
            (Some(step), Some(total)) if total > 0 => {
                Some((step as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }

    /// One-line summary for logs and the terminal UI.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("{:.0}s", self.elapsed.as_secs_f64())];
        if let Some(step) = self.step {
            match self.total_steps {
                Some(total) => parts.push(format!("step {step}/{total}")),
                None => parts.push(format!("step {step}")),
            }
        }
        if let Some(rate) = self.steps_per_sec {
            parts.push(format!("{rate:.1} steps/s"));
        }
        if let Some(ns) = self.ns_per_day {
            parts.push(format!("{ns:.2} ns/day"));
        }
        parts.join(", ")
    }
}

/// Receives samples while a phase runs.
pub trait SampleObserver: Send + Sync {
    fn on_sample(&self, sample: &Sample);
}

/// Turns successive step readings into rates.
#[derive(Debug)]
pub struct ThroughputTracker {
    phase: Phase,
    started: Instant,
    /// Time step in ps, when the phase integrates dynamics.
    dt: Option<f64>,
    total_steps: Option<u64>,
    last: Option<(Instant, u64)>,
}

impl ThroughputTracker {
    pub fn new(phase: Phase, started: Instant, dt: Option<f64>, total_steps: Option<u64>) -> Self {
        Self {
            phase,
            started,
            dt,
            total_steps,
            last: None,
        }
    }

    pub fn sample(&mut self, now: Instant, step: Option<u64>) -> Sample {
        let elapsed = now.saturating_duration_since(self.started);

        // Rate over the last interval; the first reading measures from start.
        let steps_per_sec = step.and_then(|step| {
            let (then, prev) = self.last.unwrap_or((self.started, 0));
            let secs = now.saturating_duration_since(then).as_secs_f64();
            (secs > 0.0 && step >= prev).then(|| (step - prev) as f64 / secs)
        });
        if let Some(step) = step {
            self.last = Some((now, step));
        }

        let ns_per_day = match (steps_per_sec, self.dt) {
            (Some(rate), Some(dt)) => Some(rate * dt * 86_400.0 / 1000.0),
            _ => None,
        };

        Sample {
            phase: self.phase,
            elapsed,
            step,
            total_steps: self.total_steps,
            steps_per_sec,
            ns_per_day,
        }
    }
}
