//! Wall-clock aligned tick scheduler.
//!
//! Emits one [`Tick`] per interval boundary (:00 and :30 of every minute for
//! the fixed 30 s cadence). The loop is a small state machine:
//!
//! ```text
//! Aligning --(one-shot sleep to boundary, tick)--> Ticking
//! Ticking  --(sleep interval - margin, on boundary)--> tick, stay Ticking
//! Ticking  --(fired outside the window)--> Aligning
//! ```
//!
//! The repeating phase is armed `drift_margin` early so host jitter lands it
//! just before the boundary, where it waits out the remainder. Any firing
//! that is neither on a boundary nor inside that pre-roll (clock jumps,
//! suspended host) forces a realignment from the wall clock instead of
//! trusting elapsed time.
//!
//! Exactly one loop task exists per [`AlignedScheduler`]; `start` aborts the
//! previous task before spawning a new one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::Clock;

/// A repeating firing this close after a boundary still counts as on it.
pub const ALIGNMENT_TOLERANCE_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Wall-clock time at which the tick was emitted.
    pub at: DateTime<Utc>,
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Aligning,
    Ticking,
}

/// Result of checking a repeating firing against the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiringCheck {
    OnBoundary,
    /// Fired inside the pre-roll; the boundary is `wait` away.
    Early { wait: Duration },
    Drifted,
}

/// Milliseconds until the next boundary of `interval`; zero when exactly on one.
pub fn ms_until_next_boundary(now: DateTime<Utc>, interval: Duration) -> u64 {
    let interval_ms = interval_millis(interval);
    let into = now.timestamp_millis().rem_euclid(interval_ms);
    if into == 0 {
        0
    } else {
        (interval_ms - into).unsigned_abs()
    }
}

pub fn classify_firing(now: DateTime<Utc>, interval: Duration, drift_margin: Duration) -> FiringCheck {
    let interval_ms = interval_millis(interval);
    let into = now.timestamp_millis().rem_euclid(interval_ms).unsigned_abs();
    let until_next = interval_ms.unsigned_abs() - into;
    if into < ALIGNMENT_TOLERANCE_MS {
        FiringCheck::OnBoundary
    } else if until_next <= duration_millis(drift_margin) {
        FiringCheck::Early {
            wait: Duration::from_millis(until_next),
        }
    } else {
        FiringCheck::Drifted
    }
}

fn interval_millis(interval: Duration) -> i64 {
    i64::try_from(interval.as_millis()).unwrap_or(i64::MAX).max(1)
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Counters shared between the scheduler task and observers.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    ticks: AtomicU64,
    coalesced: AtomicU64,
    realignments: AtomicU64,
}

impl SchedulerStats {
    /// Ticks handed to the consumer.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Boundaries skipped because the consumer had not taken the previous tick.
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::SeqCst)
    }

    /// Number of times a drifted repeating firing forced the Aligning phase.
    pub fn realignments(&self) -> u64 {
        self.realignments.load(Ordering::SeqCst)
    }
}

pub struct AlignedScheduler {
    clock: Arc<dyn Clock>,
    interval: Duration,
    drift_margin: Duration,
    stats: Arc<SchedulerStats>,
    task: Option<JoinHandle<()>>,
}

impl AlignedScheduler {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration, drift_margin: Duration) -> Self {
        Self {
            clock,
            interval,
            drift_margin: drift_margin.min(interval),
            stats: Arc::new(SchedulerStats::default()),
            task: None,
        }
    }

    /// Start emitting ticks into `tx`, replacing any running loop.
    ///
    /// A tick is dropped when the previous one is still unconsumed, so a
    /// stalled consumer sees at most one pending tick.
    pub fn start(&mut self, tx: mpsc::Sender<Tick>) {
        self.stop();
        let clock = Arc::clone(&self.clock);
        let stats = Arc::clone(&self.stats);
        let interval = self.interval;
        let drift_margin = self.drift_margin;
        self.task = Some(tokio::spawn(async move {
            run_alignment_loop(clock, interval, drift_margin, stats, tx).await;
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }
}

impl Drop for AlignedScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_alignment_loop(
    clock: Arc<dyn Clock>,
    interval: Duration,
    drift_margin: Duration,
    stats: Arc<SchedulerStats>,
    tx: mpsc::Sender<Tick>,
) {
    let mut phase = SchedulerPhase::Aligning;
    loop {
        match phase {
            SchedulerPhase::Aligning => {
                let delay_ms = ms_until_next_boundary(clock.now(), interval);
                debug!(delay_ms, "aligning to next boundary");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            SchedulerPhase::Ticking => {
                tokio::time::sleep(interval.saturating_sub(drift_margin)).await;
            }
        }

        // Both phases re-check the wall clock: it may have stepped while asleep.
        let now = clock.now();
        match classify_firing(now, interval, drift_margin) {
            FiringCheck::OnBoundary => {}
            FiringCheck::Early { wait } => tokio::time::sleep(wait).await,
            FiringCheck::Drifted => {
                stats.realignments.fetch_add(1, Ordering::SeqCst);
                info!(at = %now, ?phase, "tick timer drifted, realigning");
                phase = SchedulerPhase::Aligning;
                continue;
            }
        }
        if !emit_tick(clock.as_ref(), &stats, &tx) {
            return;
        }
        phase = SchedulerPhase::Ticking;
    }
}

/// Returns false once the receiving side is gone.
fn emit_tick(clock: &dyn Clock, stats: &SchedulerStats, tx: &mpsc::Sender<Tick>) -> bool {
    let tick = Tick {
        at: clock.now(),
        seq: stats.ticks.load(Ordering::SeqCst) + 1,
    };
    match tx.try_send(tick) {
        Ok(()) => {
            stats.ticks.fetch_add(1, Ordering::SeqCst);
            true
        }
        Err(mpsc::error::TrySendError::Full(tick)) => {
            stats.coalesced.fetch_add(1, Ordering::SeqCst);
            debug!(at = %tick.at, "previous tick still pending, dropping");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    const INTERVAL: Duration = Duration::from_secs(30);
    const MARGIN: Duration = Duration::from_millis(100);

    fn at(h: u32, m: u32, s: u32, ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, s).unwrap() + chrono::Duration::milliseconds(ms)
    }

    fn offset_into_interval(t: DateTime<Utc>) -> i64 {
        t.timestamp_millis().rem_euclid(30_000)
    }

    #[test]
    fn delay_targets_half_minute_before_thirty_seconds() {
        assert_eq!(ms_until_next_boundary(at(8, 0, 10, 0), INTERVAL), 20_000);
        assert_eq!(ms_until_next_boundary(at(8, 0, 29, 750), INTERVAL), 250);
    }

    #[test]
    fn delay_targets_next_minute_after_thirty_seconds() {
        assert_eq!(ms_until_next_boundary(at(8, 0, 30, 1), INTERVAL), 29_999);
        assert_eq!(ms_until_next_boundary(at(8, 0, 45, 500), INTERVAL), 14_500);
    }

    #[test]
    fn delay_is_zero_exactly_on_boundary() {
        assert_eq!(ms_until_next_boundary(at(8, 1, 0, 0), INTERVAL), 0);
        assert_eq!(ms_until_next_boundary(at(8, 1, 30, 0), INTERVAL), 0);
    }

    #[test]
    fn classify_accepts_firings_just_after_boundary() {
        assert_eq!(
            classify_firing(at(8, 1, 0, 40), INTERVAL, MARGIN),
            FiringCheck::OnBoundary
        );
        assert_eq!(
            classify_firing(at(8, 1, 30, 99), INTERVAL, MARGIN),
            FiringCheck::OnBoundary
        );
    }

    #[test]
    fn classify_waits_out_early_preroll() {
        assert_eq!(
            classify_firing(at(8, 0, 59, 900), INTERVAL, MARGIN),
            FiringCheck::Early {
                wait: Duration::from_millis(100)
            }
        );
    }

    #[test]
    fn classify_flags_drift_outside_window() {
        assert_eq!(
            classify_firing(at(8, 0, 59, 899), INTERVAL, MARGIN),
            FiringCheck::Drifted
        );
        assert_eq!(
            classify_firing(at(8, 1, 0, 100), INTERVAL, MARGIN),
            FiringCheck::Drifted
        );
        assert_eq!(
            classify_firing(at(8, 1, 7, 0), INTERVAL, MARGIN),
            FiringCheck::Drifted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_lands_on_next_boundary_never_before() {
        for start in [at(8, 0, 10, 0), at(8, 0, 29, 999), at(8, 0, 30, 1), at(8, 0, 47, 333)] {
            let clock = ManualClock::starting_at(start);
            let mut sched = AlignedScheduler::new(Arc::new(clock), INTERVAL, MARGIN);
            let (tx, mut rx) = mpsc::channel(1);
            sched.start(tx);

            let tick = rx.recv().await.expect("tick");
            assert!(tick.at > start, "tick {} before start {}", tick.at, start);
            assert!(
                offset_into_interval(tick.at) < ALIGNMENT_TOLERANCE_MS as i64,
                "tick {} not on a boundary",
                tick.at
            );
            assert!(tick.at - start <= chrono::Duration::seconds(30));
            sched.stop();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_ticks_stay_on_boundaries_without_realigning() {
        let clock = ManualClock::starting_at(at(8, 0, 10, 0));
        let mut sched = AlignedScheduler::new(Arc::new(clock), INTERVAL, MARGIN);
        let (tx, mut rx) = mpsc::channel(1);
        sched.start(tx);

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(rx.recv().await.expect("tick").at);
        }
        assert_eq!(
            seen,
            vec![at(8, 0, 30, 0), at(8, 1, 0, 0), at(8, 1, 30, 0), at(8, 2, 0, 0)]
        );
        assert_eq!(sched.stats().realignments(), 0);
        assert_eq!(sched.stats().ticks(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_jump_forces_exactly_one_realignment() {
        let clock = ManualClock::starting_at(at(8, 0, 10, 0));
        let mut sched = AlignedScheduler::new(Arc::new(clock.clone()), INTERVAL, MARGIN);
        let (tx, mut rx) = mpsc::channel(1);
        sched.start(tx);

        assert_eq!(rx.recv().await.unwrap().at, at(8, 0, 30, 0));

        // Host slept: wall clock moves 7 s ahead of the monotonic clock.
        clock.jump(chrono::Duration::seconds(7));

        let next = rx.recv().await.unwrap();
        assert_eq!(next.at, at(8, 1, 30, 0));
        assert_eq!(sched.stats().realignments(), 1);

        let after = rx.recv().await.unwrap();
        assert_eq!(after.at, at(8, 2, 0, 0));
        assert_eq!(sched.stats().realignments(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_loop() {
        let clock = ManualClock::starting_at(at(8, 0, 10, 0));
        let mut sched = AlignedScheduler::new(Arc::new(clock), INTERVAL, MARGIN);
        let (tx, mut rx) = mpsc::channel(1);
        sched.start(tx.clone());
        sched.start(tx.clone());
        sched.start(tx);

        assert_eq!(rx.recv().await.unwrap().at, at(8, 0, 30, 0));
        let extra = tokio::time::timeout(Duration::from_secs(29), rx.recv()).await;
        assert!(extra.is_err(), "a second tick source is still running");
        assert!(sched.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_alignment() {
        let clock = ManualClock::starting_at(at(8, 0, 10, 0));
        let mut sched = AlignedScheduler::new(Arc::new(clock), INTERVAL, MARGIN);
        let (tx, mut rx) = mpsc::channel(1);
        sched.start(tx);
        sched.stop();

        assert!(!sched.is_running());
        // Aborted task drops its sender, closing the channel.
        assert!(rx.recv().await.is_none());
    }
    #[tokio::test(start_paused = true)]
    async fn clock_stepped_back_while_aligning_still_ticks_on_boundary() {
        let clock = ManualClock::starting_at(at(8, 0, 10, 0));
        let mut sched = AlignedScheduler::new(Arc::new(clock.clone()), INTERVAL, MARGIN);
        let (tx, mut rx) = mpsc::channel(1);
        sched.start(tx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        // NTP step backward during the one-shot alignment sleep.
        clock.jump(chrono::Duration::seconds(-5));

        let first = rx.recv().await.expect("tick");
        assert_eq!(first.at, at(8, 0, 30, 0));
        assert_eq!(sched.stats().realignments(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_stepped_forward_while_aligning_realigns() {
        let clock = ManualClock::starting_at(at(8, 0, 10, 0));
        let mut sched = AlignedScheduler::new(Arc::new(clock.clone()), INTERVAL, MARGIN);
        let (tx, mut rx) = mpsc::channel(1);
        sched.start(tx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        clock.jump(chrono::Duration::seconds(4));

        // The alignment sleep wakes at 08:00:34; the next boundary is 08:01:00.
        let first = rx.recv().await.expect("tick");
        assert_eq!(first.at, at(8, 1, 0, 0));
        assert_eq!(sched.stats().realignments(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_consumer_gets_one_pending_tick_not_a_backlog() {
        let clock = ManualClock::starting_at(at(8, 0, 10, 0));
        let mut sched = AlignedScheduler::new(Arc::new(clock), INTERVAL, MARGIN);
        let (tx, mut rx) = mpsc::channel(1);
        sched.start(tx);

        // Consumer busy through the 08:00:30, 08:01:00 and 08:01:30 boundaries.
        tokio::time::sleep(Duration::from_secs(95)).await;

        assert_eq!(rx.recv().await.unwrap().at, at(8, 0, 30, 0));
        assert!(rx.try_recv().is_err(), "stale ticks must not queue up");
        assert_eq!(sched.stats().ticks(), 1);
        assert_eq!(sched.stats().coalesced(), 2);

        // Cadence resumes on the next boundary.
        assert_eq!(rx.recv().await.unwrap().at, at(8, 2, 0, 0));
        assert_eq!(sched.stats().realignments(), 0);
    }
}
