//! Build tool invocation with bounded runtime.
//!
//! Runs the external build command once and captures its outcome as a
//! [`BuildRecord`]. All failure modes — non-zero exit, timeout, tool missing,
//! permission denied — are encoded in the returned record so the caller never
//! has to handle a build error path.

use chrono::Utc;
use emuloop_proto::BuildRecord;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// One-shot runner for the external build command.
#[derive(Debug, Clone)]
pub struct BuildRunner {
    /// The build tool binary (e.g. `make`).
    pub command: String,
    /// Arguments passed to the tool.
    pub args: Vec<String>,
    /// Hard wall-clock bound on the build.
    pub timeout: Duration,
    /// Working directory for the invocation.
    pub cwd: PathBuf,
}

impl BuildRunner {
    /// Creates a runner for `command args...` executed in `cwd`.
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
            cwd: cwd.into(),
        }
    }

    /// Describes the invocation for logs and records.
    pub fn describe(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }

    /// Runs the build once and returns its record.
    ///
    /// Never returns an error: a timeout yields `success: false` with an
    /// explanatory stderr and no exit code; an invocation failure yields
    /// `success: false` with the OS error message in stderr.
    pub async fn run(&self) -> BuildRecord {
        let command = self.describe();
        let timestamp = Utc::now();
        debug!(command = %command, cwd = ?self.cwd, "Invoking build tool");

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Reap the child if the timeout cancels the output future.
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                let success = output.status.success();
                if !success {
                    warn!(code = ?output.status.code(), "Build failed");
                }
                BuildRecord {
                    timestamp,
                    command,
                    success,
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code: output.status.code(),
                }
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Build tool could not be invoked");
                BuildRecord {
                    timestamp,
                    command,
                    success: false,
                    stdout: String::new(),
                    stderr: err.to_string(),
                    exit_code: None,
                }
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Build timed out");
                BuildRecord {
                    timestamp,
                    command,
                    success: false,
                    stdout: String::new(),
                    stderr: format!("Build timed out after {} seconds", self.timeout.as_secs()),
                    exit_code: None,
                }
            }
        }
    }
}
