//! # emuloop-proto
//!
//! Shared record types for the emuloop feedback orchestrator.
//!
//! This crate defines the diagnostic artifacts every other crate produces or
//! consumes:
//! - [`BuildRecord`] — outcome of one external build invocation
//! - [`Session`] / [`Capture`] — one observation run against the emulator
//! - [`Analysis`] — heuristic summary derived from a completed session
//! - [`IterationRecord`] / [`RunLog`] — the run-level development log
//!
//! All types serialize to the JSON artifact formats the diagnostic recorder
//! persists, so a round trip through serde_json is lossless.

mod record;

pub use record::{
    Analysis, BuildRecord, Capture, IterationRecord, RunLog, Session, SessionStatus,
};
