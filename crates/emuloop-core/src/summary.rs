//! Human-readable run summary.
//!
//! One plain-text line per iteration beside the JSON artifacts, so the run
//! is legible without parsing anything. Summary writes must never abort the
//! run; failures are logged and dropped.

use chrono::Local;
use emuloop_proto::{BuildRecord, IterationRecord};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Appends run-level summary lines to `run_summary.txt`.
#[derive(Debug, Clone)]
pub struct SummaryWriter {
    path: PathBuf,
}

impl SummaryWriter {
    /// Creates a writer targeting `<logs_dir>/run_summary.txt`.
    pub fn new(logs_dir: impl AsRef<Path>) -> Self {
        Self {
            path: logs_dir.as_ref().join("run_summary.txt"),
        }
    }

    /// Path of the summary file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header for a new run.
    pub fn run_started(&self, max_iterations: u32) {
        self.append(&format!(
            "=== Run started {} (max {} iterations) ===",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            max_iterations
        ));
    }

    /// One line per completed iteration.
    pub fn iteration(&self, record: &IterationRecord) {
        let build = if record.build.success { "ok" } else { "FAILED" };
        let mutation = if record.mutation_applied {
            ", mutation applied"
        } else {
            ""
        };
        self.append(&format!(
            "Iteration {}: build {}, session {}, {} captures, {} issues{}",
            record.iteration,
            build,
            record.session_id,
            record.analysis.captures_analyzed,
            record.analysis.issues.len(),
            mutation
        ));
    }

    /// Terminating build failure.
    pub fn build_failure(&self, iteration: u32, record: &BuildRecord) {
        let detail = record.stderr.lines().next().unwrap_or("no stderr");
        self.append(&format!(
            "Iteration {}: build FAILED ({}) - stopping loop",
            iteration, detail
        ));
    }

    /// Non-fatal iteration problem (e.g. persistence failure).
    pub fn note(&self, iteration: u32, message: &str) {
        self.append(&format!("Iteration {}: {}", iteration, message));
    }

    /// Footer after the loop ends.
    pub fn run_finished(&self, reason: &str, iterations: u32) {
        self.append(&format!(
            "=== Run finished: {} after {} iteration(s) ===",
            reason, iterations
        ));
    }

    fn append(&self, line: &str) {
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(err) = result {
            warn!(error = %err, path = %self.path.display(), "Could not write run summary");
        }
    }
}
