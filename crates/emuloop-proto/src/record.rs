//! Diagnostic record types persisted by the recorder.
//!
//! Records are created once and never mutated after persistence. A `Session`
//! accumulates fields while its orchestration run is live and becomes
//! read-only once written to disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one external build invocation.
///
/// Every failure mode of the build tool (non-zero exit, timeout, missing
/// binary) is encoded in the record; the build supervisor never propagates
/// tool failures as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// When the build was started.
    pub timestamp: DateTime<Utc>,
    /// Human-readable description of the invoked command.
    pub command: String,
    /// Whether the build exited with status 0.
    pub success: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error, or an explanatory message on timeout or
    /// invocation failure.
    pub stderr: String,
    /// Exit code; absent on timeout or when the tool could not be invoked.
    pub exit_code: Option<i32>,
}

/// Terminal status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Run has not reached a terminal state yet.
    Unknown,
    /// The program artifact did not exist; the emulator was never spawned.
    ProgramNotFound,
    /// The emulator died within the post-spawn grace window.
    EmulatorExitedEarly,
    /// The emulator ran the full schedule and stopped gracefully.
    Completed,
    /// Graceful stop failed; the emulator was killed.
    ForceKilled,
    /// Spawn or orchestration failure; details in `Session::error`.
    Error,
}

impl SessionStatus {
    /// Returns the artifact string for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Unknown => "unknown",
            SessionStatus::ProgramNotFound => "program_not_found",
            SessionStatus::EmulatorExitedEarly => "emulator_exited_early",
            SessionStatus::Completed => "completed",
            SessionStatus::ForceKilled => "force_killed",
            SessionStatus::Error => "error",
        }
    }

    /// True for statuses the analyzer should flag as issues.
    pub fn is_failure(self) -> bool {
        !matches!(self, SessionStatus::Completed)
    }
}

/// One timed external screenshot taken during a session.
///
/// A capture is appended only after the capture utility produced a file;
/// failed captures are skipped, never recorded as empty entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    /// Target offset in seconds from session start.
    pub time_secs: u64,
    /// 1-based scheduler step index.
    pub step: u32,
    /// Path of the captured image file.
    pub file: PathBuf,
    /// File size at capture time, so analysis needs no filesystem access.
    pub size_bytes: u64,
}

/// One end-to-end observation run: spawn the emulator, capture artifacts,
/// record the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique per orchestration run, derived from the start time.
    pub session_id: String,
    /// When the session started.
    pub timestamp: DateTime<Utc>,
    /// Program artifact handed to the emulator.
    pub program: String,
    /// Planned run duration in seconds.
    pub duration_secs: u64,
    /// Successful captures, in strictly increasing offset order.
    pub captures: Vec<Capture>,
    /// Emulator self-recording artifact, attached only if the file existed
    /// when the session ended.
    pub recording: Option<PathBuf>,
    /// Drained emulator standard output (may be a sentinel if collection
    /// timed out).
    pub emulator_stdout: String,
    /// Drained emulator standard error.
    pub emulator_stderr: String,
    /// Process id, if a spawn was attempted and succeeded.
    pub emulator_pid: Option<u32>,
    /// Terminal status.
    pub status: SessionStatus,
    /// Failure message when `status` is `error`.
    pub error: Option<String>,
}

impl Session {
    /// Creates a fresh session in the `Unknown` state.
    pub fn new(session_id: impl Into<String>, program: impl Into<String>, duration_secs: u64) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            program: program.into(),
            duration_secs,
            captures: Vec::new(),
            recording: None,
            emulator_stdout: String::new(),
            emulator_stderr: String::new(),
            emulator_pid: None,
            status: SessionStatus::Unknown,
            error: None,
        }
    }
}

/// Heuristic, rule-based summary of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Session this analysis was derived from.
    pub session_id: String,
    /// When the analysis was produced.
    pub timestamp: DateTime<Utc>,
    /// Number of captures in the source session.
    pub captures_analyzed: u32,
    /// Detected issues, in rule order.
    pub issues: Vec<String>,
    /// Recommendations, in rule order.
    pub recommendations: Vec<String>,
}

/// One Build -> Session -> Analyze cycle within the development loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration index.
    pub iteration: u32,
    /// Build outcome for this iteration.
    pub build: BuildRecord,
    /// Session id referencing the persisted session artifact.
    pub session_id: String,
    /// Analysis derived from the session.
    pub analysis: Analysis,
    /// Whether a source mutation was applied this iteration.
    pub mutation_applied: bool,
}

/// Run-level development log, re-written in full after each iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    /// Append-only iteration history.
    pub iterations: Vec<IterationRecord>,
}

impl RunLog {
    /// Appends one iteration record.
    pub fn push(&mut self, record: IterationRecord) {
        self.iterations.push(record);
    }

    /// Number of recorded iterations.
    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    /// True when no iterations have been recorded.
    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> Session {
        let mut session = Session::new("20260823_120000", "pacman.prg", 10);
        session.captures.push(Capture {
            time_secs: 1,
            step: 1,
            file: PathBuf::from("dev_screenshots/screenshot_20260823_120000_120001_step_1.png"),
            size_bytes: 48_213,
        });
        session.emulator_pid = Some(4321);
        session.status = SessionStatus::Completed;
        session
    }

    #[test]
    fn session_roundtrip_preserves_all_fields() {
        let session = sample_session();
        let json = serde_json::to_string(&session).unwrap();
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, session);
    }

    #[test]
    fn status_serializes_to_artifact_strings() {
        for status in [
            SessionStatus::Unknown,
            SessionStatus::ProgramNotFound,
            SessionStatus::EmulatorExitedEarly,
            SessionStatus::Completed,
            SessionStatus::ForceKilled,
            SessionStatus::Error,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn build_record_roundtrip() {
        let record = BuildRecord {
            timestamp: Utc::now(),
            command: "make GAME=pacman".to_string(),
            success: false,
            stdout: String::new(),
            stderr: "Build timed out after 30 seconds".to_string(),
            exit_code: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: BuildRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn only_completed_is_not_a_failure() {
        assert!(!SessionStatus::Completed.is_failure());
        assert!(SessionStatus::ForceKilled.is_failure());
        assert!(SessionStatus::Error.is_failure());
        assert!(SessionStatus::EmulatorExitedEarly.is_failure());
    }

    #[test]
    fn run_log_appends_in_order() {
        let mut log = RunLog::default();
        assert!(log.is_empty());
        for i in 1..=3 {
            log.push(IterationRecord {
                iteration: i,
                build: BuildRecord {
                    timestamp: Utc::now(),
                    command: "make".to_string(),
                    success: true,
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: Some(0),
                },
                session_id: format!("id_{i}"),
                analysis: Analysis {
                    session_id: format!("id_{i}"),
                    timestamp: Utc::now(),
                    captures_analyzed: 0,
                    issues: vec![],
                    recommendations: vec![],
                },
                mutation_applied: false,
            });
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.iterations[2].iteration, 3);
    }
}
