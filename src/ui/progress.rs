use crate::monitor::{Sample, SampleObserver};
use crate::ui::icons::{CHECK, CLOCK, CROSS, PROGRESS, SPARKLE};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use mdforge_common::Phase;
use std::time::Duration;

/// Terminal UI for a pipeline run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Phase bar — how many phases have completed out of the five
/// - Step bar — spinner with the current invocation or latest throughput sample
pub struct PipelineUI {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    step_bar: ProgressBar,
    verbose: bool,
}

impl PipelineUI {
    /// Create the UI. `completed` pre-fills the phase bar when resuming.
    pub fn new(completed: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let phase_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let phase_bar = multi.add(ProgressBar::new(Phase::ALL.len() as u64));
        phase_bar.set_style(phase_style);
        phase_bar.set_prefix("Phases");
        phase_bar.set_position(completed);

        let step_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let step_bar = multi.add(ProgressBar::new_spinner());
        step_bar.set_style(step_style);
        step_bar.set_prefix("  Step");

        Self {
            multi,
            phase_bar,
            step_bar,
            verbose,
        }
    }

    /// Print a line above the bars, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn start_phase(&self, phase: Phase) {
        self.phase_bar
            .set_message(format!("{}", style(phase.label()).yellow()));
        self.step_bar.set_message("starting");
        self.step_bar.enable_steady_tick(Duration::from_millis(100));
    }

    /// Show the invocation currently running. Printed as well in verbose mode.
    pub fn log_step(&self, msg: &str) {
        self.step_bar.set_message(format!("{}", style(msg).dim()));
        if self.verbose {
            self.print_line(format!("    {} {}", style("→").dim(), style(msg).dim()));
        }
    }

    pub fn phase_complete(&self, phase: Phase, elapsed: Duration) {
        self.phase_bar.inc(1);
        self.print_line(format!(
            "{} {} {}",
            CHECK,
            style(phase.label()).green().bold(),
            style(format!("({})", format_elapsed(elapsed))).dim()
        ));
    }

    pub fn phase_failed(&self, phase: Phase, error: &str) {
        self.print_line(format!(
            "{} {} {}",
            CROSS,
            style(phase.label()).red().bold(),
            style(error).red()
        ));
    }

    pub fn finish(&self, all_done: bool) {
        self.step_bar.finish_and_clear();
        if all_done {
            self.phase_bar
                .finish_with_message(format!("{}{}", SPARKLE, style("pipeline complete").green()));
        } else {
            self.phase_bar.abandon();
        }
    }
}

impl SampleObserver for PipelineUI {
    fn on_sample(&self, sample: &Sample) {
        let pct = sample
            .percent()
            .map(|p| format!(" {}", style(format!("{p:.1}%")).cyan().bold()))
            .unwrap_or_default();
        self.step_bar.set_message(format!(
            "{}{}{} {}",
            CLOCK,
            style(sample.phase.label()).yellow(),
            pct,
            style(sample.describe()).dim()
        ));
        if self.verbose {
            self.print_line(format!("    {} {}", PROGRESS, sample.describe()));
        }
    }
}

/// Formats as `Xs`, or `Xm Ys` from one minute, or `Xh Ym` from one hour.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(42)), "42s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_elapsed(Duration::from_secs(7260)), "2h 1m");
    }

    #[test]
    fn test_ui_accepts_samples_without_terminal() {
        let ui = PipelineUI::new(1, false);
        ui.start_phase(Phase::Minimization);
        ui.on_sample(&Sample {
            phase: Phase::Minimization,
            elapsed: Duration::from_secs(30),
            step: Some(100),
            total_steps: Some(1000),
            steps_per_sec: Some(3.3),
            ns_per_day: None,
        });
        ui.phase_complete(Phase::Minimization, Duration::from_secs(31));
        ui.finish(false);
    }
}
