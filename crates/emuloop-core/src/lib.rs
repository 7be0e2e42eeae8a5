//! # emuloop-core
//!
//! Core orchestration for the emuloop feedback loop.
//!
//! This crate provides:
//! - The session orchestrator coordinating emulator lifetime and captures
//! - The capture scheduler (drift-resistant relative sleeps)
//! - The diagnostic recorder (atomic, idempotent artifact writes)
//! - The heuristic analyzer over completed sessions
//! - The iteration driver for the Build -> Session -> Analyze loop
//! - Configuration loading and the per-run session context

mod analyzer;
mod build;
mod config;
mod context;
mod driver;
mod interrupt;
mod orchestrator;
mod recorder;
mod scheduler;
mod summary;

pub use analyzer::analyze;
pub use build::BuildSupervisor;
pub use config::{
    BuildConfig, CaptureConfig, ConfigError, EmulatorConfig, EmuloopConfig, LoopConfig,
    PathsConfig,
};
pub use context::SessionContext;
pub use driver::{IterationDriver, LoopTermination, MutationStrategy, RunOutcome, SourceEdit};
pub use interrupt::InterruptFlag;
pub use orchestrator::SessionOrchestrator;
pub use recorder::{DiagnosticRecorder, RecordKind, RecorderError};
pub use scheduler::{CaptureSchedule, ScheduleError, ScheduleStep};
pub use summary::SummaryWriter;
