//! Notification lifecycle and dedup.
//!
//! ```text
//! Idle --(new unexpired id)--> Notified --(respond)--> Responding
//! Responding --(ok)--> Idle        Responding --(err)--> Notified
//! Notified/Responding --(no pending or expired)--> Idle
//! ```
//!
//! Every id is surfaced at most once per session, no matter how many
//! snapshots (poll or push triggered) report it. While one notification is
//! active a different id is left unshown until the active one resolves.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use qs_protocol::{NotificationId, NotificationRecord, StatusResponse};
use serde::Serialize;
use tracing::debug;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPhase {
    Idle,
    Notified,
    Responding,
}

/// Presentation-only classification; never affects lifecycle or dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Standard,
    Cascade,
}

/// What the sink is asked to show for a newly surfaced notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPrompt {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub issued_at: Option<DateTime<Utc>>,
    /// `issued_at + notification timeout`, for a countdown.
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Surfaced(NotificationPrompt),
    Cleared,
    Unchanged,
}

#[derive(Debug)]
pub struct NotificationMachine {
    phase: NotificationPhase,
    active: Option<NotificationId>,
    shown: HashSet<NotificationId>,
    timeout: Duration,
}

impl NotificationMachine {
    pub fn new(timeout: Duration) -> Self {
        Self {
            phase: NotificationPhase::Idle,
            active: None,
            shown: HashSet::new(),
            timeout,
        }
    }

    pub fn phase(&self) -> NotificationPhase {
        self.phase
    }

    pub fn active_id(&self) -> Option<&NotificationId> {
        self.active.as_ref()
    }

    pub fn shown_count(&self) -> usize {
        self.shown.len()
    }

    /// Apply a successful status snapshot.
    pub fn observe(&mut self, snapshot: &StatusResponse) -> Transition {
        let pending = snapshot.pending_notification().filter(|r| !r.is_expired);
        match (pending, self.phase) {
            (Some(record), NotificationPhase::Idle) => {
                if self.shown.contains(&record.id) {
                    debug!(id = %record.id, "notification already shown, skipping");
                    return Transition::Unchanged;
                }
                self.shown.insert(record.id.clone());
                self.active = Some(record.id.clone());
                self.phase = NotificationPhase::Notified;
                Transition::Surfaced(self.prompt_for(record))
            }
            (Some(record), _) => {
                if self.active.as_ref() != Some(&record.id) {
                    debug!(
                        id = %record.id,
                        active = ?self.active,
                        "new notification deferred until active one resolves"
                    );
                }
                Transition::Unchanged
            }
            (None, NotificationPhase::Idle) => Transition::Unchanged,
            (None, _) => {
                debug!(id = ?self.active, "notification no longer pending");
                self.phase = NotificationPhase::Idle;
                self.active = None;
                Transition::Cleared
            }
        }
    }

    /// Enter `Responding` and return the id to answer.
    pub fn begin_response(&mut self) -> Result<NotificationId, ClientError> {
        match self.phase {
            NotificationPhase::Idle => Err(ClientError::NoActiveNotification),
            NotificationPhase::Responding => Err(ClientError::ResponseInFlight),
            NotificationPhase::Notified => {
                let id = self.active.clone().ok_or(ClientError::NoActiveNotification)?;
                self.phase = NotificationPhase::Responding;
                Ok(id)
            }
        }
    }

    /// Resolve an in-flight response. A failure keeps the id active so the
    /// user can answer again.
    pub fn finish_response(&mut self, succeeded: bool) -> Transition {
        if self.phase != NotificationPhase::Responding {
            return Transition::Unchanged;
        }
        if succeeded {
            self.phase = NotificationPhase::Idle;
            self.active = None;
            Transition::Cleared
        } else {
            self.phase = NotificationPhase::Notified;
            Transition::Unchanged
        }
    }

    fn prompt_for(&self, record: &NotificationRecord) -> NotificationPrompt {
        let issued_at = record
            .notification_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));
        let expires_at = issued_at.and_then(|t| {
            chrono::Duration::from_std(self.timeout)
                .ok()
                .map(|timeout| t + timeout)
        });
        NotificationPrompt {
            id: record.id.clone(),
            kind: if record.is_cascade {
                NotificationKind::Cascade
            } else {
                NotificationKind::Standard
            },
            issued_at,
            expires_at,
        }
    }
}
