//! Capture scheduling.
//!
//! A schedule is an ordered list of capture offsets (seconds from session
//! start) bounded by the session duration. The driver converts offsets into
//! sleeps relative to actually-elapsed time, clamped at zero, so a slow
//! capture call shortens the next wait instead of shifting every later
//! capture. After the last offset it sleeps out the remaining duration so
//! the emulator runs for its full requested window — unless the emulator has
//! already died or an interrupt tripped, in which case the remaining wait is
//! skipped.

use crate::context::SessionContext;
use crate::interrupt::InterruptFlag;
use emuloop_adapters::ScreenCapturer;
use emuloop_proto::Capture;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Invalid schedule input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// Offsets must be strictly increasing.
    #[error("capture offsets must be strictly increasing: {next} follows {prev}")]
    NotIncreasing {
        /// Earlier offset.
        prev: u64,
        /// Offending offset.
        next: u64,
    },
}

/// One planned capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleStep {
    /// 1-based position in the schedule.
    pub step: u32,
    /// Target offset in seconds from session start.
    pub offset_secs: u64,
}

/// Validated capture schedule for one session.
#[derive(Debug, Clone)]
pub struct CaptureSchedule {
    steps: Vec<ScheduleStep>,
    duration_secs: u64,
}

impl CaptureSchedule {
    /// Builds a schedule from offsets and a total duration. Offsets past the
    /// duration are dropped; the rest must be strictly increasing.
    pub fn new(offsets: &[u64], duration_secs: u64) -> Result<Self, ScheduleError> {
        for pair in offsets.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ScheduleError::NotIncreasing {
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        let steps = offsets
            .iter()
            .copied()
            .filter(|&offset| offset <= duration_secs)
            .enumerate()
            .map(|(i, offset_secs)| ScheduleStep {
                step: (i + 1) as u32,
                offset_secs,
            })
            .collect();
        Ok(Self {
            steps,
            duration_secs,
        })
    }

    /// Planned steps, in offset order.
    pub fn steps(&self) -> &[ScheduleStep] {
        &self.steps
    }

    /// Total session duration.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Nominal sleep before each step (offset deltas), for inspection.
    pub fn relative_sleeps(&self) -> Vec<u64> {
        let mut prev = 0;
        self.steps
            .iter()
            .map(|step| {
                let sleep = step.offset_secs - prev;
                prev = step.offset_secs;
                sleep
            })
            .collect()
    }

    /// Seconds the emulator keeps running after the last capture.
    pub fn tail_secs(&self) -> u64 {
        let last = self.steps.last().map_or(0, |s| s.offset_secs);
        self.duration_secs - last
    }

    /// Drives the schedule: one external capture per step, then the tail
    /// sleep.
    ///
    /// A failed capture is logged as a skipped step and the schedule
    /// continues. The schedule ends early when `alive` reports the emulator
    /// in a terminal state or the interrupt flag trips; both skip the tail
    /// sleep so cleanup starts immediately instead of waiting out the
    /// duration for a process that is already gone.
    pub async fn run<C, P>(
        &self,
        ctx: &SessionContext,
        capturer: &C,
        mut alive: P,
        interrupt: &InterruptFlag,
    ) -> Vec<Capture>
    where
        C: ScreenCapturer + ?Sized,
        P: FnMut() -> bool,
    {
        let start = Instant::now();
        let mut captures = Vec::new();

        for step in &self.steps {
            let target = Duration::from_secs(step.offset_secs);
            let wait = target.saturating_sub(start.elapsed());
            if !interrupt.sleep_unless_interrupted(wait).await {
                info!("Interrupted, abandoning remaining captures");
                return captures;
            }
            if !alive() {
                info!(step = step.step, "Emulator no longer running, stopping schedule");
                return captures;
            }

            let output = ctx.screenshot_path(step.step);
            match capturer.capture(&output).await {
                Ok(()) => {
                    let size_bytes = std::fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
                    info!(
                        step = step.step,
                        offset_secs = step.offset_secs,
                        file = %output.display(),
                        "Screenshot captured"
                    );
                    captures.push(Capture {
                        time_secs: step.offset_secs,
                        step: step.step,
                        file: output,
                        size_bytes,
                    });
                }
                Err(err) => {
                    warn!(step = step.step, error = %err, "Capture failed, skipping step");
                }
            }
        }

        // Run out the requested duration even after the last capture; only
        // reached while the emulator was alive at every probe point.
        let tail = self.duration().saturating_sub(start.elapsed());
        interrupt.sleep_unless_interrupted(tail).await;
        captures
    }
}
