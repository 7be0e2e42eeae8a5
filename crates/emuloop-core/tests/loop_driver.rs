//! Development loop behavior: bounded iterations, build-failure stop,
//! mutation application, interrupt handling.
#![cfg(unix)]

use async_trait::async_trait;
use emuloop_core::{
    DiagnosticRecorder, EmuloopConfig, InterruptFlag, IterationDriver, LoopTermination,
    MutationStrategy, SourceEdit,
};
use emuloop_proto::Analysis;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

/// Config for a fast full cycle: trivial build, fake emulator, 1s schedule,
/// no inter-iteration delay.
fn loop_config(dir: &TempDir) -> EmuloopConfig {
    let mut config = EmuloopConfig::default();
    config.paths.project_dir = dir.path().to_path_buf();
    config.build.command = "true".to_string();
    config.build.args = vec![];
    config.emulator.command = write_script(dir.path(), "fake_emu.sh", "exec sleep 30");
    config.emulator.gif_flag = None;
    config.emulator.grace_delay_secs = 1;
    config.emulator.stop_timeout_secs = 5;
    config.emulator.drain_timeout_secs = 1;
    config.capture.command = "sh".to_string();
    config.capture.args = vec![
        "-c".to_string(),
        "head -c 5000 /dev/zero > \"$0\"".to_string(),
    ];
    config.capture.offsets = vec![1];
    config.capture.duration_secs = 1;
    config.iteration.delay_secs = 0;
    std::fs::write(dir.path().join("pacman.prg"), b"\x0b\x08").unwrap();
    config
}

fn summary_text(config: &EmuloopConfig) -> String {
    std::fs::read_to_string(config.logs_dir().join("run_summary.txt")).unwrap()
}

struct NoteEdit {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl MutationStrategy for NoteEdit {
    async fn propose_next_edit(&self, analysis: &Analysis) -> Option<SourceEdit> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Some(SourceEdit {
            path: "notes.txt".into(),
            contents: format!("issues: {}\n", analysis.issues.len()),
            description: "append analyzer note".to_string(),
        })
    }
}

#[tokio::test]
async fn build_failure_stops_the_loop() {
    let dir = TempDir::new().unwrap();
    let mut config = loop_config(&dir);
    config.build.command = "false".to_string();

    let driver = IterationDriver::new(config.clone(), InterruptFlag::new());
    let outcome = driver.run_loop(3).await;

    assert_eq!(outcome.termination, LoopTermination::BuildFailed);
    assert_eq!(outcome.termination.exit_code(), 1);
    assert_eq!(outcome.iterations_run, 1);

    let summary = summary_text(&config);
    assert!(summary.contains("build FAILED"));
    assert!(summary.contains("Run finished: build_failed"));

    // The failing build still left its artifact behind.
    let builds = std::fs::read_dir(config.logs_dir())
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .starts_with("build_")
        })
        .count();
    assert_eq!(builds, 1);
}

#[tokio::test]
async fn full_cycle_records_everything() {
    let dir = TempDir::new().unwrap();
    let config = loop_config(&dir);

    let calls = Arc::new(AtomicU32::new(0));
    let driver = IterationDriver::new(config.clone(), InterruptFlag::new())
        .with_mutation(Box::new(NoteEdit {
            calls: Arc::clone(&calls),
        }));
    let outcome = driver.run_loop(1).await;

    assert_eq!(outcome.termination, LoopTermination::Completed);
    assert_eq!(outcome.termination.exit_code(), 0);
    assert_eq!(outcome.iterations_run, 1);

    let recorder = DiagnosticRecorder::new(config.logs_dir());
    let log = recorder.load_run_log().unwrap();
    assert_eq!(log.len(), 1);
    let record = &log.iterations[0];
    assert_eq!(record.iteration, 1);
    assert!(record.build.success);
    assert!(record.mutation_applied);
    assert_eq!(record.analysis.captures_analyzed, 1);
    assert!(record.analysis.issues.is_empty());

    // The strategy was consulted exactly once per iteration.
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The mutation landed in the project tree.
    let note = std::fs::read_to_string(dir.path().join("notes.txt")).unwrap();
    assert_eq!(note, "issues: 0\n");

    let summary = summary_text(&config);
    assert!(summary.contains("Iteration 1: build ok"));
    assert!(summary.contains("mutation applied"));
    assert!(summary.contains("Run finished: completed after 1 iteration(s)"));
}

#[tokio::test]
async fn pre_tripped_interrupt_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let config = loop_config(&dir);
    let interrupt = InterruptFlag::new();
    interrupt.trigger();

    let driver = IterationDriver::new(config.clone(), interrupt);
    let outcome = driver.run_loop(3).await;

    assert_eq!(outcome.termination, LoopTermination::Interrupted);
    assert_eq!(outcome.termination.exit_code(), 130);
    assert_eq!(outcome.iterations_run, 0);
    assert!(summary_text(&config).contains("Run finished: interrupted"));
}
