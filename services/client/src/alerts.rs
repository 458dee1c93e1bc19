//! Rate limiting for user-visible alerts.
//!
//! Only one alert is live at a time; the sink auto-dismisses it after
//! `dismiss_after`. Background alerts (connectivity) are dropped while another
//! alert is still live. Alerts caused by a user action always go through and
//! restart the live window.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct AlertGate {
    dismiss_after: Duration,
    live_until: Option<Instant>,
}

impl AlertGate {
    pub fn new(dismiss_after: Duration) -> Self {
        Self {
            dismiss_after,
            live_until: None,
        }
    }

    pub fn is_live(&self, now: Instant) -> bool {
        self.live_until.is_some_and(|until| now < until)
    }

    /// Claim the alert slot for a background alert. False if one is live.
    pub fn try_raise(&mut self, now: Instant) -> bool {
        if self.is_live(now) {
            return false;
        }
        self.live_until = Some(now + self.dismiss_after);
        true
    }

    /// Claim the alert slot unconditionally.
    pub fn raise(&mut self, now: Instant) {
        self.live_until = Some(now + self.dismiss_after);
    }
}
