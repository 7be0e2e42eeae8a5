//! Build supervision.
//!
//! Wraps the adapter-level build runner with record persistence: every build
//! leaves a `build_<session_id>.json` artifact behind before the outcome is
//! returned, so a later crash can never lose the build diagnosis.

use crate::config::BuildConfig;
use crate::context::SessionContext;
use crate::recorder::{DiagnosticRecorder, RecordKind, RecorderError};
use emuloop_adapters::BuildRunner;
use emuloop_proto::BuildRecord;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Runs the external build and persists its record.
#[derive(Debug, Clone)]
pub struct BuildSupervisor {
    config: BuildConfig,
    project_dir: PathBuf,
}

impl BuildSupervisor {
    /// Creates a supervisor for builds executed in `project_dir`.
    pub fn new(config: BuildConfig, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            project_dir: project_dir.into(),
        }
    }

    /// Builds `target` once. Tool failures are encoded in the returned
    /// record; the only error this can return is a persistence failure.
    pub async fn build(
        &self,
        ctx: &SessionContext,
        recorder: &DiagnosticRecorder,
        target: &str,
    ) -> Result<BuildRecord, RecorderError> {
        let runner = BuildRunner::new(
            self.config.command.clone(),
            self.config.args_for(target),
            Duration::from_secs(self.config.timeout_secs),
            self.project_dir.clone(),
        );
        info!(target, command = %runner.describe(), "Building");

        let record = runner.run().await;
        recorder.record(RecordKind::Build, &ctx.session_id, &record)?;

        if record.success {
            info!("Build successful");
        } else {
            warn!(exit_code = ?record.exit_code, stderr = %record.stderr, "Build failed");
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmuloopConfig;
    use tempfile::TempDir;

    fn setup(command: &str, args: Vec<String>) -> (TempDir, SessionContext, DiagnosticRecorder, BuildSupervisor) {
        let dir = TempDir::new().unwrap();
        let mut config = EmuloopConfig::default();
        config.paths.project_dir = dir.path().to_path_buf();
        config.build.command = command.to_string();
        config.build.args = args;
        let ctx = SessionContext::with_id(&config, "20260823_120000").unwrap();
        let recorder = DiagnosticRecorder::new(&ctx.logs_dir);
        let supervisor = BuildSupervisor::new(config.build.clone(), dir.path());
        (dir, ctx, recorder, supervisor)
    }

    #[tokio::test]
    async fn build_persists_record_before_returning() {
        let (_dir, ctx, recorder, supervisor) =
            setup("echo", vec!["building {target}".to_string()]);
        let record = supervisor.build(&ctx, &recorder, "pacman").await.unwrap();
        assert!(record.success);
        assert!(record.stdout.contains("building pacman"));

        let loaded: BuildRecord = recorder.load(RecordKind::Build, &ctx.session_id).unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn failed_build_is_still_persisted() {
        let (_dir, ctx, recorder, supervisor) = setup("false", vec![]);
        let record = supervisor.build(&ctx, &recorder, "pacman").await.unwrap();
        assert!(!record.success);
        let loaded: BuildRecord = recorder.load(RecordKind::Build, &ctx.session_id).unwrap();
        assert!(!loaded.success);
    }
}
