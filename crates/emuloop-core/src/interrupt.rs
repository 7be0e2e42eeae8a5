//! Shared interrupt flag.
//!
//! An external interrupt (SIGINT) must become an immediate transition to
//! cleanup rather than an orphaned emulator. The flag is checked at every
//! suspension point of the driver and scheduler, and interruptible sleeps
//! wake as soon as it trips.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Cloneable run-wide interrupt flag.
#[derive(Clone, Default)]
pub struct InterruptFlag {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    tripped: AtomicBool,
    notify: Notify,
}

impl InterruptFlag {
    /// Creates an untripped flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the flag and wakes every interruptible sleep.
    pub fn trigger(&self) {
        self.inner.tripped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether an interrupt has been requested.
    pub fn is_set(&self) -> bool {
        self.inner.tripped.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless interrupted first. Returns true when the
    /// full duration elapsed.
    pub async fn sleep_unless_interrupted(&self, duration: Duration) -> bool {
        // Register as a waiter before re-checking the flag: a trigger landing
        // in between is then seen by the flag check, and one landing after is
        // delivered to the registered waiter. Without `enable`, a
        // `notify_waiters` call racing the first poll would be lost and the
        // sleep would run its full duration.
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_set() {
            return false;
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => true,
            () = &mut notified => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_completes_when_untripped() {
        let flag = InterruptFlag::new();
        assert!(flag.sleep_unless_interrupted(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn trigger_wakes_a_sleeping_task() {
        let flag = InterruptFlag::new();
        let sleeper = flag.clone();
        let handle =
            tokio::spawn(
                async move { sleeper.sleep_unless_interrupted(Duration::from_secs(30)).await },
            );
        tokio::time::sleep(Duration::from_millis(20)).await;
        flag.trigger();
        assert!(!handle.await.unwrap());
        assert!(flag.is_set());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn trigger_racing_the_first_poll_is_never_lost() {
        // Fire the trigger from another thread while the sleep is being set
        // up. Whatever the interleaving, the sleep must return false without
        // running out its duration.
        for _ in 0..100 {
            let flag = InterruptFlag::new();
            let sleeper = flag.clone();
            let task = tokio::spawn(async move {
                sleeper
                    .sleep_unless_interrupted(Duration::from_millis(200))
                    .await
            });
            flag.trigger();
            assert!(!task.await.unwrap());
        }
    }

    #[tokio::test]
    async fn tripped_flag_skips_the_sleep() {
        let flag = InterruptFlag::new();
        flag.trigger();
        let start = std::time::Instant::now();
        assert!(!flag.sleep_unless_interrupted(Duration::from_secs(5)).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
