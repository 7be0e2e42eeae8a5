//! Screen capture and window activation.
//!
//! Both are synchronous external commands from the orchestrator's point of
//! view: a capture either produces exactly one image file or fails with no
//! file, and window activation is best-effort (its failure never matters).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Capture invocation failure. Per-step and non-fatal: the scheduler logs a
/// skipped step and continues.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The capture utility could not be invoked.
    #[error("capture utility could not be invoked: {0}")]
    Spawn(#[from] std::io::Error),
    /// The utility ran past its bound.
    #[error("capture timed out after {0:?}")]
    Timeout(Duration),
    /// The utility exited non-zero.
    #[error("capture utility exited with code {code:?}")]
    Failed {
        /// Exit code, if any.
        code: Option<i32>,
    },
    /// The utility exited zero but produced no file.
    #[error("capture utility produced no file at {0}")]
    NoFile(PathBuf),
}

/// External screen-capture seam. Tests substitute doubles; production uses
/// [`CommandCapturer`].
#[async_trait]
pub trait ScreenCapturer: Send + Sync {
    /// Captures one image into `output`, or fails with no file.
    async fn capture(&self, output: &Path) -> Result<(), CaptureError>;
}

/// Capture via an external command; the output path is appended as the last
/// argument (e.g. `screencapture -x <output>`).
#[derive(Debug, Clone)]
pub struct CommandCapturer {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandCapturer {
    /// Creates a capturer invoking `command args... <output>`.
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl ScreenCapturer for CommandCapturer {
    async fn capture(&self, output: &Path) -> Result<(), CaptureError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        debug!(command = %self.command, output = %output.display(), "Capturing screen");
        let status = tokio::time::timeout(self.timeout, cmd.status())
            .await
            .map_err(|_| CaptureError::Timeout(self.timeout))??;

        if !status.success() {
            return Err(CaptureError::Failed {
                code: status.code(),
            });
        }
        if !output.exists() {
            return Err(CaptureError::NoFile(output.to_path_buf()));
        }
        Ok(())
    }
}

/// Best-effort window activation (e.g. `osascript` bringing the emulator
/// window to the front). A missing command makes this a no-op.
#[derive(Debug, Clone, Default)]
pub struct WindowActivator {
    command: Option<Vec<String>>,
    timeout: Duration,
}

impl WindowActivator {
    /// Creates an activator from `[command, args...]`; `None` is a no-op.
    pub fn new(command: Option<Vec<String>>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    /// Runs the activation command. Returns whether it succeeded; failure is
    /// only ever logged.
    pub async fn activate(&self) -> bool {
        let Some(parts) = self.command.as_ref().filter(|p| !p.is_empty()) else {
            return true;
        };
        let mut cmd = Command::new(&parts[0]);
        cmd.args(&parts[1..])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.status()).await {
            Ok(Ok(status)) if status.success() => true,
            Ok(Ok(status)) => {
                debug!(code = ?status.code(), "Window activation exited non-zero");
                false
            }
            Ok(Err(err)) => {
                debug!(error = %err, "Window activation could not be invoked");
                false
            }
            Err(_) => {
                warn!("Window activation timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn command_capturer_produces_a_file() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("shot.png");
        // `$0` is the appended output path under sh -c.
        let capturer = CommandCapturer::new(
            "sh",
            vec!["-c".to_string(), "head -c 2048 /dev/zero > \"$0\"".to_string()],
            Duration::from_secs(5),
        );
        capturer.capture(&output).await.unwrap();
        assert_eq!(std::fs::metadata(&output).unwrap().len(), 2048);
    }

    #[tokio::test]
    async fn failing_utility_yields_no_file_error_variant() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("shot.png");
        let capturer = CommandCapturer::new("false", vec![], Duration::from_secs(5));
        let err = capturer.capture(&output).await.unwrap_err();
        assert!(matches!(err, CaptureError::Failed { .. }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn zero_exit_without_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("shot.png");
        let capturer = CommandCapturer::new("true", vec![], Duration::from_secs(5));
        let err = capturer.capture(&output).await.unwrap_err();
        assert!(matches!(err, CaptureError::NoFile(_)));
    }

    #[tokio::test]
    async fn activator_without_command_is_a_noop() {
        let activator = WindowActivator::new(None, Duration::from_secs(1));
        assert!(activator.activate().await);
    }

    #[tokio::test]
    async fn activator_failure_is_absorbed() {
        let activator = WindowActivator::new(
            Some(vec!["false".to_string()]),
            Duration::from_secs(1),
        );
        assert!(!activator.activate().await);
    }
}
