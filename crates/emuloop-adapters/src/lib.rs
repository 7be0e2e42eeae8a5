//! # emuloop-adapters
//!
//! External tool adapters for the emuloop feedback orchestrator.
//!
//! This crate owns every external process boundary:
//! - `build_runner` — one bounded build-tool invocation
//! - `watchdog` — emulator child process lifecycle (spawn, liveness,
//!   graceful-then-forced termination, output draining)
//! - `capture` — screen-capture utility and best-effort window activation
//!
//! Every invocation carries an explicit timeout; failures are encoded in
//! returned values or adapter errors, never panics. The emulator process id
//! is exclusively owned by the watchdog — no other component signals it.

mod build_runner;
mod capture;
mod watchdog;

pub use build_runner::BuildRunner;
pub use capture::{CaptureError, CommandCapturer, ScreenCapturer, WindowActivator};
pub use watchdog::{
    EmulatorCommand, EmulatorWatchdog, OUTPUT_NOT_COLLECTED, SpawnError, WatchdogState,
};
