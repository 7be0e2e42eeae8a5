//! Per-run session context.
//!
//! One context object carries the session id and directory layout through
//! every component call; there is no ambient session state.

use crate::config::EmuloopConfig;
use chrono::Local;
use std::io;
use std::path::PathBuf;

/// Identity and directory layout of one orchestration run.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique per run, derived from the start time (`%Y%m%d_%H%M%S`).
    pub session_id: String,
    /// Project root the build and emulator run in.
    pub project_dir: PathBuf,
    /// Where screenshots and recordings land.
    pub screenshots_dir: PathBuf,
    /// Where diagnostic records land.
    pub logs_dir: PathBuf,
}

impl SessionContext {
    /// Creates a context with a fresh session id and ensures both artifact
    /// directories exist.
    pub fn create(config: &EmuloopConfig) -> io::Result<Self> {
        let session_id = Local::now().format("%Y%m%d_%H%M%S").to_string();
        Self::with_id(config, session_id)
    }

    /// Creates a context with an explicit session id (tests, replays).
    pub fn with_id(config: &EmuloopConfig, session_id: impl Into<String>) -> io::Result<Self> {
        let ctx = Self {
            session_id: session_id.into(),
            project_dir: config.paths.project_dir.clone(),
            screenshots_dir: config.screenshots_dir(),
            logs_dir: config.logs_dir(),
        };
        std::fs::create_dir_all(&ctx.screenshots_dir)?;
        std::fs::create_dir_all(&ctx.logs_dir)?;
        Ok(ctx)
    }

    /// Screenshot path for a scheduler step, timestamped like the rest of the
    /// session artifacts.
    pub fn screenshot_path(&self, step: u32) -> PathBuf {
        let stamp = Local::now().format("%H%M%S");
        self.screenshots_dir.join(format!(
            "screenshot_{}_{}_step_{}.png",
            self.session_id, stamp, step
        ))
    }

    /// Emulator self-recording path for this session.
    pub fn recording_path(&self) -> PathBuf {
        self.screenshots_dir
            .join(format!("recording_{}.gif", self.session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> EmuloopConfig {
        let mut config = EmuloopConfig::default();
        config.paths.project_dir = dir.path().to_path_buf();
        config
    }

    #[test]
    fn create_makes_artifact_directories() {
        let dir = TempDir::new().unwrap();
        let ctx = SessionContext::create(&config_in(&dir)).unwrap();
        assert!(ctx.screenshots_dir.is_dir());
        assert!(ctx.logs_dir.is_dir());
        assert_eq!(ctx.session_id.len(), "20260823_120000".len());
    }

    #[test]
    fn paths_carry_the_session_id() {
        let dir = TempDir::new().unwrap();
        let ctx = SessionContext::with_id(&config_in(&dir), "20260823_120000").unwrap();
        let shot = ctx.screenshot_path(2);
        let name = shot.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("screenshot_20260823_120000_"));
        assert!(name.ends_with("_step_2.png"));
        assert_eq!(
            ctx.recording_path().file_name().unwrap(),
            "recording_20260823_120000.gif"
        );
    }
}
