//! Iteration driver: the Build -> Session -> Analyze loop.
//!
//! Each iteration gets a fresh session context, so every cycle leaves a
//! complete, self-contained artifact set. A build failure stops the loop; a
//! persistence failure is logged and skips to the next iteration; an
//! interrupt finishes cleanup (the orchestrator already stopped the
//! emulator) and returns.

use crate::analyzer::analyze;
use crate::build::BuildSupervisor;
use crate::config::EmuloopConfig;
use crate::context::SessionContext;
use crate::interrupt::InterruptFlag;
use crate::orchestrator::SessionOrchestrator;
use crate::recorder::{DiagnosticRecorder, RecordKind};
use crate::summary::SummaryWriter;
use async_trait::async_trait;
use emuloop_proto::{Analysis, IterationRecord, RunLog};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// A concrete source change proposed between iterations.
#[derive(Debug, Clone)]
pub struct SourceEdit {
    /// File to rewrite, relative to the project root.
    pub path: PathBuf,
    /// Full replacement contents.
    pub contents: String,
    /// Human-readable description for the log.
    pub description: String,
}

/// Pluggable between-iteration mutation capability.
///
/// The default build carries no mutation logic; test doubles and future
/// agent integrations supply deterministic edits.
#[async_trait]
pub trait MutationStrategy: Send + Sync {
    /// Proposes the next source edit given the latest analysis, or none.
    async fn propose_next_edit(&self, analysis: &Analysis) -> Option<SourceEdit>;
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopTermination {
    /// All requested iterations ran.
    Completed,
    /// A build failed; the loop stopped at that iteration.
    BuildFailed,
    /// An external interrupt was converted into cleanup.
    Interrupted,
}

impl LoopTermination {
    /// Reason string for summaries and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            LoopTermination::Completed => "completed",
            LoopTermination::BuildFailed => "build_failed",
            LoopTermination::Interrupted => "interrupted",
        }
    }

    /// Process exit code: 0 success, 1 failure, 130 interrupt (128 + SIGINT).
    pub fn exit_code(self) -> i32 {
        match self {
            LoopTermination::Completed => 0,
            LoopTermination::BuildFailed => 1,
            LoopTermination::Interrupted => 130,
        }
    }
}

/// Result of one development loop run.
#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    /// Iterations that actually started.
    pub iterations_run: u32,
    /// Why the loop stopped.
    pub termination: LoopTermination,
}

/// Repeats Build -> Session -> Analyze for a bounded number of iterations.
pub struct IterationDriver {
    config: EmuloopConfig,
    interrupt: InterruptFlag,
    mutation: Option<Box<dyn MutationStrategy>>,
}

impl IterationDriver {
    /// Creates a driver without a mutation strategy.
    pub fn new(config: EmuloopConfig, interrupt: InterruptFlag) -> Self {
        Self {
            config,
            interrupt,
            mutation: None,
        }
    }

    /// Installs a mutation strategy applied between iterations.
    pub fn with_mutation(mut self, strategy: Box<dyn MutationStrategy>) -> Self {
        self.mutation = Some(strategy);
        self
    }

    /// Runs up to `max_iterations` development cycles.
    ///
    /// Infallible by design: run-level failures are logged and summarized,
    /// never propagated as a crash.
    pub async fn run_loop(&self, max_iterations: u32) -> RunOutcome {
        let logs_dir = self.config.logs_dir();
        if let Err(err) = std::fs::create_dir_all(&logs_dir) {
            error!(error = %err, "Could not create log directory");
        }
        let summary = SummaryWriter::new(&logs_dir);
        summary.run_started(max_iterations);
        info!(max_iterations, "Starting development loop");

        let mut run_log = RunLog::default();
        let mut termination = LoopTermination::Completed;
        let mut iterations_run = 0;

        for iteration in 1..=max_iterations {
            if self.interrupt.is_set() {
                termination = LoopTermination::Interrupted;
                break;
            }
            iterations_run = iteration;
            info!(iteration, "=== Development cycle ===");

            let ctx = match SessionContext::create(&self.config) {
                Ok(ctx) => ctx,
                Err(err) => {
                    error!(error = %err, "Could not create session context");
                    summary.note(iteration, "session context could not be created");
                    self.pause(iteration, max_iterations).await;
                    continue;
                }
            };
            let recorder = DiagnosticRecorder::new(&ctx.logs_dir);

            // Build; a tool failure stops the whole loop.
            let supervisor =
                BuildSupervisor::new(self.config.build.clone(), ctx.project_dir.clone());
            let build = match supervisor
                .build(&ctx, &recorder, &self.config.build.target)
                .await
            {
                Ok(record) => record,
                Err(err) => {
                    error!(error = %err, "Build record could not be persisted");
                    summary.note(iteration, "build record could not be persisted");
                    self.pause(iteration, max_iterations).await;
                    continue;
                }
            };
            if !build.success {
                summary.build_failure(iteration, &build);
                termination = LoopTermination::BuildFailed;
                break;
            }

            // Observe.
            let program = self.config.program_name(&self.config.build.target);
            let orchestrator =
                SessionOrchestrator::new(&self.config, &recorder, self.interrupt.clone());
            let session = match orchestrator
                .run_session(&ctx, &program, self.config.capture.duration_secs)
                .await
            {
                Ok(session) => session,
                Err(err) => {
                    error!(error = %err, "Session could not be persisted");
                    summary.note(iteration, "session could not be persisted");
                    self.pause(iteration, max_iterations).await;
                    continue;
                }
            };

            // Analyze.
            let analysis = analyze(&session);
            for issue in &analysis.issues {
                info!(issue, "Analyzer");
            }
            if let Err(err) = recorder.record(RecordKind::Analysis, &ctx.session_id, &analysis) {
                error!(error = %err, "Analysis could not be persisted");
            }

            // Optional mutation, then the iteration record and run log.
            let mutation_applied = self.apply_mutation(&ctx, &analysis).await;
            run_log.push(IterationRecord {
                iteration,
                build,
                session_id: ctx.session_id.clone(),
                analysis,
                mutation_applied,
            });
            if let Err(err) = recorder.record_run_log(&run_log) {
                error!(error = %err, "Run log could not be persisted");
            }
            if let Some(record) = run_log.iterations.last() {
                summary.iteration(record);
            }

            self.pause(iteration, max_iterations).await;
        }

        if self.interrupt.is_set() {
            termination = LoopTermination::Interrupted;
        }
        summary.run_finished(termination.as_str(), iterations_run);
        info!(
            reason = termination.as_str(),
            iterations_run, "Development loop finished"
        );
        RunOutcome {
            iterations_run,
            termination,
        }
    }

    /// Fixed inter-iteration delay, skipped after the last iteration and cut
    /// short by an interrupt.
    async fn pause(&self, iteration: u32, max_iterations: u32) {
        if iteration >= max_iterations {
            return;
        }
        let delay = Duration::from_secs(self.config.iteration.delay_secs);
        if !delay.is_zero() {
            info!(delay_secs = delay.as_secs(), "Waiting before next iteration");
            self.interrupt.sleep_unless_interrupted(delay).await;
        }
    }

    async fn apply_mutation(&self, ctx: &SessionContext, analysis: &Analysis) -> bool {
        let Some(strategy) = self.mutation.as_ref() else {
            return false;
        };
        let Some(edit) = strategy.propose_next_edit(analysis).await else {
            return false;
        };
        let path = ctx.project_dir.join(&edit.path);
        match std::fs::write(&path, &edit.contents) {
            Ok(()) => {
                info!(path = %path.display(), description = %edit.description, "Applied source mutation");
                true
            }
            Err(err) => {
                warn!(error = %err, path = %path.display(), "Source mutation failed");
                false
            }
        }
    }
}
