//! Presentation sink contract and the two sinks this crate ships.

use chrono::{DateTime, Utc};
use qs_protocol::StatusResponse;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::notification::NotificationPrompt;

/// What the user sees about their place in the queue after a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub position: Option<u32>,
    pub total_waiting: Option<u32>,
    pub status: Option<String>,
    pub status_code: Option<String>,
    /// A pending, unexpired notification is awaiting a response.
    pub has_notification: bool,
    /// Server-side timestamp of the snapshot, as sent.
    pub server_time: Option<String>,
    /// Local "last updated" observation.
    pub observed_at: DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn from_response(resp: &StatusResponse, observed_at: DateTime<Utc>) -> Self {
        Self {
            position: resp.position,
            total_waiting: resp.total_waiting,
            status: resp.status.clone(),
            status_code: resp.status_code.clone(),
            has_notification: resp.pending_notification().is_some_and(|n| !n.is_expired),
            server_time: resp.last_updated.clone(),
            observed_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Info,
    Success,
    Warning,
    Error,
}

/// Receives state changes from the engine. Called only from the engine task.
pub trait PresentationSink: Send + 'static {
    fn show_status(&self, snapshot: &StatusSnapshot);
    fn show_notification(&self, prompt: &NotificationPrompt);
    fn hide_notification(&self);
    fn show_connection(&self, connected: bool);
    fn show_alert(&self, kind: AlertKind, message: &str);
}

// ---------------------------------------------------------------------------
// ChannelSink
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientUiEvent {
    StatusUpdated { snapshot: StatusSnapshot },
    NotificationShown { prompt: NotificationPrompt },
    NotificationHidden,
    ConnectionChanged { connected: bool },
    Alert { kind: AlertKind, message: String },
}

/// Broadcasts every sink call as a [`ClientUiEvent`].
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: broadcast::Sender<ClientUiEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<ClientUiEvent>) {
        let (tx, rx) = broadcast::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientUiEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: ClientUiEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl PresentationSink for ChannelSink {
    fn show_status(&self, snapshot: &StatusSnapshot) {
        self.emit(ClientUiEvent::StatusUpdated {
            snapshot: snapshot.clone(),
        });
    }

    fn show_notification(&self, prompt: &NotificationPrompt) {
        self.emit(ClientUiEvent::NotificationShown {
            prompt: prompt.clone(),
        });
    }

    fn hide_notification(&self) {
        self.emit(ClientUiEvent::NotificationHidden);
    }

    fn show_connection(&self, connected: bool) {
        self.emit(ClientUiEvent::ConnectionChanged { connected });
    }

    fn show_alert(&self, kind: AlertKind, message: &str) {
        self.emit(ClientUiEvent::Alert {
            kind,
            message: message.to_owned(),
        });
    }
}

// ---------------------------------------------------------------------------
// TracingSink
// ---------------------------------------------------------------------------

/// Headless sink: renders state changes as log lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl PresentationSink for TracingSink {
    fn show_status(&self, snapshot: &StatusSnapshot) {
        info!(
            position = ?snapshot.position,
            total_waiting = ?snapshot.total_waiting,
            status = snapshot.status.as_deref().unwrap_or("-"),
            updated = %snapshot.observed_at.format("%H:%M:%S"),
            "queue status"
        );
    }

    fn show_notification(&self, prompt: &NotificationPrompt) {
        info!(
            id = %prompt.id,
            kind = ?prompt.kind,
            expires_at = ?prompt.expires_at,
            "your turn: respond with accept or decline"
        );
    }

    fn hide_notification(&self) {
        info!("notification closed");
    }

    fn show_connection(&self, connected: bool) {
        if connected {
            info!("connected to queue server");
        } else {
            warn!("disconnected from queue server");
        }
    }

    fn show_alert(&self, kind: AlertKind, message: &str) {
        match kind {
            AlertKind::Info | AlertKind::Success => info!(?kind, "{message}"),
            AlertKind::Warning | AlertKind::Error => warn!(?kind, "{message}"),
        }
    }
}
