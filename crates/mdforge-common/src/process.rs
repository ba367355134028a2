//! Process invocation request and result types.
//!
//! Invocation failures are always data: a [`ProcessResult`] is produced for
//! every request, including ones whose executable could not be started.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// A request to run one external command.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInvocation {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Written to the child's stdin, which is then closed before outputs are read.
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

impl ProcessInvocation {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            stdin: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command line as it would be typed in a shell (for logs and errors).
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Uniform outcome of a process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
    /// False when the executable could not be started at all.
    #[serde(default = "default_launched")]
    pub launched: bool,
}

fn default_launched() -> bool {
    true
}

impl ProcessResult {
    /// Result for a process that ran to exit.
    pub fn exited(command: impl Into<String>, stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            command: command.into(),
            stdout,
            stderr,
            exit_code,
            success: exit_code == 0,
            launched: true,
        }
    }

    /// Sentinel for a process that could not be spawned.
    pub fn spawn_failure(command: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            stdout: String::new(),
            stderr: cause.into(),
            exit_code: -1,
            success: false,
            launched: false,
        }
    }

    /// Result for a process that was killed after exceeding its timeout.
    pub fn timed_out(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            stdout: String::new(),
            stderr: format!("timed out after {:.1}s", timeout.as_secs_f64()),
            exit_code: -1,
            success: false,
            launched: true,
        }
    }

    /// Last non-empty stderr line, falling back to stdout. Used in error messages.
    pub fn failure_summary(&self) -> String {
        let pick = |text: &str| {
            text.lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string)
        };
        pick(&self.stderr)
            .or_else(|| pick(&self.stdout))
            .unwrap_or_else(|| "no output".to_string())
    }
}
