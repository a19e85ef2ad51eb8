//! [`StopSignal`] – the one cancellation flag shared by every task.
//!
//! Each task receives a clone at construction and polls
//! [`StopSignal::is_requested`] at least once per iteration.  There is no
//! forced preemption.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag.  Returns `true` only for the call that raised it.
    pub fn request(&self, reason: &str) -> bool {
        let first = !self.0.swap(true, Ordering::SeqCst);
        if first {
            info!(reason, "Stop requested");
        }
        first
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early once the flag is raised.  Returns
    /// `true` when woken by the flag.
    pub fn sleep(&self, duration: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(10);
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(SLICE));
        }
    }
}
