//! Diagnostic recorder: durable, atomic artifact persistence.
//!
//! Artifacts are named deterministically from kind and session id, so a
//! repeated write for the same kind/session overwrites instead of
//! duplicating, and writing the same value twice produces byte-identical
//! output. Writes go to a temp file in the target directory and are renamed
//! into place, so a failed write never corrupts an existing artifact.

use emuloop_proto::RunLog;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Artifact kinds, one file per kind per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Build outcome (`build_<id>.json`).
    Build,
    /// Session record (`session_<id>.json`).
    Session,
    /// Heuristic analysis (`analysis_<id>.json`).
    Analysis,
}

impl RecordKind {
    /// Kind tag used in artifact names.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Build => "build",
            RecordKind::Session => "session",
            RecordKind::Analysis => "analysis",
        }
    }
}

/// Persistence failure. Surfaced to the caller, never swallowed.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Filesystem failure while writing or renaming.
    #[error("failed to persist diagnostic artifact: {0}")]
    Io(#[from] std::io::Error),
    /// The value could not be serialized.
    #[error("failed to serialize diagnostic artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Writes and reads diagnostic artifacts under one log directory.
#[derive(Debug, Clone)]
pub struct DiagnosticRecorder {
    logs_dir: PathBuf,
}

impl DiagnosticRecorder {
    /// Creates a recorder rooted at `logs_dir` (must already exist).
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
        }
    }

    /// Path of the artifact for `kind` and `session_id`.
    pub fn artifact_path(&self, kind: RecordKind, session_id: &str) -> PathBuf {
        self.logs_dir
            .join(format!("{}_{}.json", kind.as_str(), session_id))
    }

    /// Path of the run-level log.
    pub fn run_log_path(&self) -> PathBuf {
        self.logs_dir.join("run_log.json")
    }

    /// Persists `value` as the artifact for `kind`/`session_id`.
    pub fn record<T: Serialize>(
        &self,
        kind: RecordKind,
        session_id: &str,
        value: &T,
    ) -> Result<PathBuf, RecorderError> {
        let path = self.artifact_path(kind, session_id);
        self.write_atomic(&path, value)?;
        debug!(path = %path.display(), "Recorded {} artifact", kind.as_str());
        Ok(path)
    }

    /// Loads the artifact for `kind`/`session_id` back into a value.
    pub fn load<T: DeserializeOwned>(
        &self,
        kind: RecordKind,
        session_id: &str,
    ) -> Result<T, RecorderError> {
        let content = std::fs::read_to_string(self.artifact_path(kind, session_id))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Re-writes the run-level log in full.
    pub fn record_run_log(&self, log: &RunLog) -> Result<PathBuf, RecorderError> {
        let path = self.run_log_path();
        self.write_atomic(&path, log)?;
        Ok(path)
    }

    /// Loads the run-level log, or an empty one when none exists yet.
    pub fn load_run_log(&self) -> Result<RunLog, RecorderError> {
        let path = self.run_log_path();
        if !path.exists() {
            return Ok(RunLog::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Serializes to a temp file in the target directory, then renames into
    /// place. The rename is the commit point.
    fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), RecorderError> {
        let json = serde_json::to_string_pretty(value)?;
        let mut tmp = NamedTempFile::new_in(&self.logs_dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emuloop_proto::{Analysis, Session, SessionStatus};
    use tempfile::TempDir;

    fn recorder() -> (TempDir, DiagnosticRecorder) {
        let dir = TempDir::new().unwrap();
        let recorder = DiagnosticRecorder::new(dir.path());
        (dir, recorder)
    }

    #[test]
    fn artifact_names_are_deterministic() {
        let (_dir, recorder) = recorder();
        assert!(
            recorder
                .artifact_path(RecordKind::Session, "20260823_120000")
                .ends_with("session_20260823_120000.json")
        );
    }

    #[test]
    fn record_then_load_roundtrips() {
        let (_dir, recorder) = recorder();
        let mut session = Session::new("20260823_120000", "pacman.prg", 10);
        session.status = SessionStatus::Completed;
        recorder
            .record(RecordKind::Session, &session.session_id, &session)
            .unwrap();
        let loaded: Session = recorder
            .load(RecordKind::Session, "20260823_120000")
            .unwrap();
        assert_eq!(loaded, session);
    }

    #[test]
    fn repeated_writes_are_byte_identical() {
        let (_dir, recorder) = recorder();
        let analysis = Analysis {
            session_id: "20260823_120000".to_string(),
            timestamp: chrono::Utc::now(),
            captures_analyzed: 2,
            issues: vec!["Capture 1 is unusually small".to_string()],
            recommendations: vec![],
        };
        let path = recorder
            .record(RecordKind::Analysis, &analysis.session_id, &analysis)
            .unwrap();
        let first = std::fs::read(&path).unwrap();
        recorder
            .record(RecordKind::Analysis, &analysis.session_id, &analysis)
            .unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn same_kind_and_session_overwrites() {
        let (dir, recorder) = recorder();
        let mut session = Session::new("20260823_120000", "pacman.prg", 10);
        recorder
            .record(RecordKind::Session, &session.session_id, &session)
            .unwrap();
        session.status = SessionStatus::Completed;
        recorder
            .record(RecordKind::Session, &session.session_id, &session)
            .unwrap();

        // One artifact, latest value, and no leftover temp files.
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["session_20260823_120000.json".to_string()]);
        let loaded: Session = recorder
            .load(RecordKind::Session, "20260823_120000")
            .unwrap();
        assert_eq!(loaded.status, SessionStatus::Completed);
    }

    #[test]
    fn run_log_defaults_to_empty() {
        let (_dir, recorder) = recorder();
        let log = recorder.load_run_log().unwrap();
        assert!(log.is_empty());
    }
}
