//! Emulator child process lifecycle.
//!
//! The watchdog exclusively owns the emulator child: it is the only component
//! allowed to signal the process. It moves through a small state machine
//!
//! ```text
//! NotStarted -> Running -> { ExitedEarly, Completed, ForceKilled }
//! NotStarted -> SpawnError
//! ```
//!
//! stdout/stderr are drained by background tasks from the moment of spawn so
//! a chatty emulator can never deadlock on a full pipe buffer while the
//! orchestrator is sleeping between captures.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

#[cfg(unix)]
use nix::sys::signal::{Signal, kill};
#[cfg(unix)]
use nix::unistd::Pid;

/// Sentinel returned by [`EmulatorWatchdog::drain_output`] when the process
/// is still running and output could not be collected within the bound.
pub const OUTPUT_NOT_COLLECTED: &str = "emulator still running (output not collected)";

/// Lifecycle state of the emulator child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// No spawn attempted yet.
    NotStarted,
    /// Spawn succeeded; the child may still be running.
    Running,
    /// The child died within the post-spawn grace window.
    ExitedEarly,
    /// Graceful termination succeeded within its bound.
    Completed,
    /// Graceful termination failed; the child was killed.
    ForceKilled,
    /// The spawn call itself failed; no process id exists.
    SpawnError,
}

impl WatchdogState {
    /// True once the child can no longer produce captures.
    pub fn is_terminal(self) -> bool {
        !matches!(self, WatchdogState::NotStarted | WatchdogState::Running)
    }
}

/// Fully resolved emulator invocation.
#[derive(Debug, Clone)]
pub struct EmulatorCommand {
    /// Emulator binary (e.g. `x16emu`).
    pub command: String,
    /// Arguments: program path, run flag, optional recording output.
    pub args: Vec<String>,
    /// Working directory for the emulator.
    pub cwd: PathBuf,
}

impl EmulatorCommand {
    /// Describes the invocation for logs.
    pub fn describe(&self) -> String {
        format!("{} {}", self.command, self.args.join(" "))
    }
}

/// Spawn failure; terminal, no process id available.
#[derive(Debug, Error)]
#[error("failed to spawn emulator `{command}`: {source}")]
pub struct SpawnError {
    /// The binary that could not be spawned.
    pub command: String,
    #[source]
    source: std::io::Error,
}

/// Accumulates one child stream in the background.
struct StreamBuffer {
    buf: Arc<Mutex<String>>,
    done: Arc<AtomicBool>,
}

impl StreamBuffer {
    fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(String::new())),
            // Flips to false on attach; a never-attached stream is "done".
            done: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Spawns a task reading the stream to EOF into the buffer.
    fn attach<R>(&self, reader: Option<R>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let Some(reader) = reader else { return };
        self.done.store(false, Ordering::SeqCst);
        let buf = Arc::clone(&self.buf);
        let done = Arc::clone(&self.done);
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Ok(mut buf) = buf.lock() {
                    buf.push_str(&line);
                    buf.push('\n');
                }
            }
            done.store(true, Ordering::SeqCst);
        });
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> String {
        self.buf.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

/// Owner of the emulator child process handle.
pub struct EmulatorWatchdog {
    state: WatchdogState,
    child: Option<Child>,
    pid: Option<u32>,
    exit_code: Option<i32>,
    stdout: StreamBuffer,
    stderr: StreamBuffer,
}

impl Default for EmulatorWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatorWatchdog {
    /// Creates a watchdog in the `NotStarted` state.
    pub fn new() -> Self {
        Self {
            state: WatchdogState::NotStarted,
            child: None,
            pid: None,
            exit_code: None,
            stdout: StreamBuffer::new(),
            stderr: StreamBuffer::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// Process id, if a spawn succeeded.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit code, once the child has been reaped.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Spawns the emulator with piped stdio and starts the output readers.
    ///
    /// On failure the watchdog transitions to `SpawnError` and stays there.
    pub fn spawn(&mut self, cmd: &EmulatorCommand) -> Result<u32, SpawnError> {
        debug!(command = %cmd.describe(), "Spawning emulator");
        let mut command = Command::new(&cmd.command);
        command
            .args(&cmd.args)
            .current_dir(&cmd.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.state = WatchdogState::SpawnError;
                return Err(SpawnError {
                    command: cmd.command.clone(),
                    source,
                });
            }
        };

        self.stdout.attach(child.stdout.take());
        self.stderr.attach(child.stderr.take());
        self.pid = child.id();
        self.child = Some(child);
        self.state = WatchdogState::Running;
        debug!(pid = ?self.pid, "Emulator running");
        Ok(self.pid.unwrap_or(0))
    }

    /// Non-blocking liveness check. Records the exit code if the child has
    /// terminated, but leaves the state transition to the caller's policy.
    pub fn probe(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                if self.exit_code.is_none() {
                    self.exit_code = status.code();
                }
                false
            }
            Err(err) => {
                warn!(error = %err, "Liveness probe failed");
                false
            }
        }
    }

    /// Sleeps the grace delay, then probes. A death inside the window is the
    /// `ExitedEarly` transition.
    pub async fn grace_probe(&mut self, delay: Duration) -> bool {
        tokio::time::sleep(delay).await;
        let alive = self.probe();
        if !alive && self.state == WatchdogState::Running {
            warn!(code = ?self.exit_code, "Emulator exited within the grace window");
            self.state = WatchdogState::ExitedEarly;
        }
        alive
    }

    /// Collects whatever stdout/stderr the readers have seen, waiting at most
    /// `timeout` for the streams to reach EOF.
    ///
    /// Never blocks past the bound: if the child is still running when it
    /// expires, stdout is the [`OUTPUT_NOT_COLLECTED`] sentinel rather than
    /// an error. Safe to call again later; the buffers persist.
    pub async fn drain_output(&self, timeout: Duration) -> (String, String) {
        let finished = tokio::time::timeout(timeout, async {
            while !(self.stdout.is_done() && self.stderr.is_done()) {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        })
        .await
        .is_ok();

        if finished {
            (self.stdout.snapshot(), self.stderr.snapshot())
        } else {
            (OUTPUT_NOT_COLLECTED.to_string(), String::new())
        }
    }

    /// Requests graceful termination (SIGTERM) and waits up to `timeout`.
    ///
    /// Returns true when the child is gone (including the case where it had
    /// already exited); the state becomes `Completed`. Returns false when the
    /// child outlived the bound — the caller should follow with
    /// [`force_stop`](Self::force_stop).
    pub async fn request_stop(&mut self, timeout: Duration) -> bool {
        if self.state != WatchdogState::Running {
            return true;
        }
        let Some(child) = self.child.as_mut() else {
            self.state = WatchdogState::Completed;
            return true;
        };

        // Already gone: reap and record.
        if let Ok(Some(status)) = child.try_wait() {
            self.exit_code = status.code();
            self.state = WatchdogState::Completed;
            return true;
        }

        #[cfg(unix)]
        if let Some(pid) = self.pid {
            debug!(pid, "Sending SIGTERM to emulator");
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                self.exit_code = status.code();
                self.state = WatchdogState::Completed;
                true
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Waiting for emulator exit failed");
                false
            }
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "Emulator ignored graceful stop"
                );
                false
            }
        }
    }

    /// Kills the child outright and reaps it. Terminal state `ForceKilled`.
    pub async fn force_stop(&mut self) {
        if self.state != WatchdogState::Running {
            return;
        }
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
            if let Ok(Ok(status)) = tokio::time::timeout(Duration::from_secs(5), child.wait()).await
            {
                self.exit_code = status.code();
            }
        }
        self.state = WatchdogState::ForceKilled;
    }
}
