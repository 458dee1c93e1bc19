//! Wall-clock sources for the aligned scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The host's real-time clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A wall clock that advances with tokio's (pausable) clock from a fixed
/// starting instant, and can be jumped forward or back like a host clock
/// after sleep/resume.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: DateTime<Utc>,
    started: tokio::time::Instant,
    offset_ms: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: tokio::time::Instant::now(),
            offset_ms: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Shift the wall clock without any elapsed monotonic time.
    pub fn jump(&self, delta: chrono::Duration) {
        self.offset_ms
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now().duration_since(self.started);
        let elapsed = chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        self.base + elapsed + chrono::Duration::milliseconds(self.offset_ms.load(Ordering::SeqCst))
    }
}
