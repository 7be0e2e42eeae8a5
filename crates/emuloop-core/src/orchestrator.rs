//! Session orchestration.
//!
//! One `run_session` call is one observation run: verify the program exists,
//! spawn the emulator under the watchdog, probe it after the grace window,
//! drive the capture schedule against its lifetime, drain output, stop it,
//! and persist the assembled session record.
//!
//! The stop sequence is structurally unconditional: the capture/drain phase
//! has no early return, so no orchestration run can leave an emulator
//! process behind, interrupt included.

use crate::config::EmuloopConfig;
use crate::context::SessionContext;
use crate::interrupt::InterruptFlag;
use crate::recorder::{DiagnosticRecorder, RecordKind, RecorderError};
use crate::scheduler::CaptureSchedule;
use emuloop_adapters::{
    CommandCapturer, EmulatorCommand, EmulatorWatchdog, OUTPUT_NOT_COLLECTED, ScreenCapturer,
    WindowActivator,
};
use emuloop_proto::{Session, SessionStatus};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Drives one session against the emulator.
pub struct SessionOrchestrator<'a> {
    config: &'a EmuloopConfig,
    recorder: &'a DiagnosticRecorder,
    capturer: Box<dyn ScreenCapturer>,
    activator: WindowActivator,
    interrupt: InterruptFlag,
}

impl<'a> SessionOrchestrator<'a> {
    /// Creates an orchestrator using the configured capture and activation
    /// commands.
    pub fn new(
        config: &'a EmuloopConfig,
        recorder: &'a DiagnosticRecorder,
        interrupt: InterruptFlag,
    ) -> Self {
        let capturer = CommandCapturer::new(
            config.capture.command.clone(),
            config.capture.args.clone(),
            Duration::from_secs(config.capture.timeout_secs),
        );
        let activator = WindowActivator::new(
            config.capture.activate_command.clone(),
            Duration::from_secs(2),
        );
        Self {
            config,
            recorder,
            capturer: Box::new(capturer),
            activator,
            interrupt,
        }
    }

    /// Substitutes the screen capturer (test doubles).
    pub fn with_capturer(mut self, capturer: Box<dyn ScreenCapturer>) -> Self {
        self.capturer = capturer;
        self
    }

    /// Runs one session for `program`, observing it for `duration_secs`.
    ///
    /// Tool failures become the session's status; the only error returned is
    /// a persistence failure from the diagnostic recorder.
    pub async fn run_session(
        &self,
        ctx: &SessionContext,
        program: &str,
        duration_secs: u64,
    ) -> Result<Session, RecorderError> {
        let mut session = Session::new(ctx.session_id.clone(), program, duration_secs);
        info!(program, duration_secs, session_id = %ctx.session_id, "Starting session");

        // Step 1: the program artifact must exist; no spawn otherwise.
        let program_path = ctx.project_dir.join(program);
        match std::fs::metadata(&program_path) {
            Ok(meta) => {
                info!(path = %program_path.display(), size_bytes = meta.len(), "Program artifact found");
            }
            Err(_) => {
                warn!(path = %program_path.display(), "Program artifact not found");
                session.status = SessionStatus::ProgramNotFound;
                return self.persist(session);
            }
        }

        // Step 2: spawn under the watchdog.
        let mut watchdog = EmulatorWatchdog::new();
        let command = self.emulator_command(ctx, program);
        match watchdog.spawn(&command) {
            Ok(pid) => {
                session.emulator_pid = Some(pid);
            }
            Err(err) => {
                warn!(error = %err, "Emulator spawn failed");
                session.status = SessionStatus::Error;
                session.error = Some(err.to_string());
                return self.persist(session);
            }
        }

        // Step 3: grace-delay liveness probe.
        let grace = Duration::from_secs(self.config.emulator.grace_delay_secs);
        let drain = Duration::from_secs(self.config.emulator.drain_timeout_secs);
        if !watchdog.grace_probe(grace).await {
            let (stdout, stderr) = watchdog.drain_output(drain).await;
            warn!(code = ?watchdog.exit_code(), stderr = %stderr, "Emulator exited early");
            session.emulator_stdout = stdout;
            session.emulator_stderr = stderr;
            session.status = SessionStatus::EmulatorExitedEarly;
            return self.persist(session);
        }

        // Step 4: best-effort window activation.
        if !self.activator.activate().await {
            debug!("Window activation failed; continuing");
        }

        // Steps 5-6: captures, then a bounded output drain. No early return
        // from here on — the stop sequence below always runs.
        match CaptureSchedule::new(&self.config.capture.offsets, duration_secs) {
            Ok(schedule) => {
                session.captures = schedule
                    .run(ctx, self.capturer.as_ref(), || watchdog.probe(), &self.interrupt)
                    .await;
            }
            Err(err) => {
                warn!(error = %err, "Capture schedule rejected");
                session.error = Some(err.to_string());
            }
        }

        let (stdout, stderr) = watchdog.drain_output(drain).await;
        session.emulator_stdout = stdout;
        session.emulator_stderr = stderr;

        // Step 7: graceful stop, then force.
        let stop_timeout = Duration::from_secs(self.config.emulator.stop_timeout_secs);
        if watchdog.request_stop(stop_timeout).await {
            info!("Emulator session completed");
            session.status = SessionStatus::Completed;
        } else {
            warn!("Emulator force killed");
            watchdog.force_stop().await;
            session.status = SessionStatus::ForceKilled;
        }
        if session.error.is_some() {
            session.status = SessionStatus::Error;
        }

        // The pre-stop drain usually times out on a healthy emulator; the
        // pipes are closed now, so retry once.
        if session.emulator_stdout == OUTPUT_NOT_COLLECTED {
            let (stdout, stderr) = watchdog.drain_output(Duration::from_millis(250)).await;
            if stdout != OUTPUT_NOT_COLLECTED {
                session.emulator_stdout = stdout;
                session.emulator_stderr = stderr;
            }
        }

        // Step 8: attach the self-recording only if the file exists.
        if self.config.emulator.gif_flag.is_some() {
            let recording = ctx.recording_path();
            if let Ok(meta) = std::fs::metadata(&recording) {
                info!(file = %recording.display(), size_bytes = meta.len(), "Recording exported");
                session.recording = Some(recording);
            }
        }

        self.persist(session)
    }

    fn persist(&self, session: Session) -> Result<Session, RecorderError> {
        self.recorder
            .record(RecordKind::Session, &session.session_id, &session)?;
        Ok(session)
    }

    fn emulator_command(&self, ctx: &SessionContext, program: &str) -> EmulatorCommand {
        let emulator = &self.config.emulator;
        let mut args = vec![
            emulator.program_flag.clone(),
            program.to_string(),
            emulator.run_flag.clone(),
        ];
        if let Some(flag) = &emulator.gif_flag {
            args.push(flag.clone());
            args.push(ctx.recording_path().display().to_string());
        }
        EmulatorCommand {
            command: emulator.command.clone(),
            args,
            cwd: ctx.project_dir.clone(),
        }
    }
}
