//! Process invocation gateway.
//!
//! Every call produces a [`ProcessResult`]. Spawn failures, non-zero exits
//! and timeouts are all reported as data; callers decide what they mean.

use async_trait::async_trait;
use mdforge_common::{ProcessInvocation, ProcessResult};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Runs external commands on behalf of the pipeline.
#[async_trait]
pub trait ProcessGateway: Send + Sync {
    async fn execute(&self, invocation: &ProcessInvocation) -> ProcessResult;
}

/// Gateway backed by real subprocesses.
#[derive(Debug, Clone, Default)]
pub struct SubprocessGateway;

impl SubprocessGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessGateway for SubprocessGateway {
    async fn execute(&self, invocation: &ProcessInvocation) -> ProcessResult {
        let command_line = invocation.display();
        tracing::info!(
            command = %command_line,
            cwd = %invocation.working_dir.display(),
            "executing"
        );

        let mut cmd = Command::new(&invocation.command);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            // Dropping the in-flight future (timeout, fatal log marker) kills the child.
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(command = %command_line, error = %e, "failed to spawn");
                return ProcessResult::spawn_failure(command_line, e.to_string());
            }
        };

        // Some engine tools block on an interactive group selection; the
        // whole payload goes in and the pipe is closed before reading.
        if let (Some(input), Some(mut stdin)) = (invocation.stdin.as_ref(), child.stdin.take()) {
            tracing::debug!(command = %command_line, bytes = input.len(), "writing stdin");
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                tracing::warn!(command = %command_line, error = %e, "stdin write failed");
            }
            if let Err(e) = stdin.shutdown().await {
                tracing::warn!(command = %command_line, error = %e, "failed to close stdin");
            }
        }

        let waited = match invocation.timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(command = %command_line, timeout_secs = limit.as_secs_f64(), "timed out");
                    return ProcessResult::timed_out(command_line, limit);
                }
            },
            None => child.wait_with_output().await,
        };

        let output = match waited {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(command = %command_line, error = %e, "failed to collect output");
                return ProcessResult::exited(command_line, String::new(), e.to_string(), -1);
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        tracing::debug!(command = %command_line, exit_code, stdout = %stdout, "completed");
        if !stderr.is_empty() {
            tracing::debug!(command = %command_line, stderr = %stderr, "stderr");
        }

        ProcessResult::exited(command_line, stdout, stderr, exit_code)
    }
}
