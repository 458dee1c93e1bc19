//! Background push bridge.
//!
//! Runs as its own task with no state shared with foreground engines. Input
//! arrives as [`BridgeInput`] messages; output is a [`BridgeMessage`] posted
//! to every attached foreground. A push event is fully handled (system
//! notification displayed or failed, foregrounds notified) before the next
//! one is taken, and its [`PushDisposition`] is reported back to whoever
//! delivered it so the host can keep the bridge alive until it settles.
//!
//! A malformed payload is logged and dropped; nothing here can take the
//! bridge task down.

use std::future::Future;

use qs_protocol::{BridgeMessage, PushPayload, RefreshStatus};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ClientError;

pub const DEFAULT_TITLE: &str = "Queue update";
pub const CASCADE_TITLE: &str = "Your turn: a spot opened up";
pub const DEFAULT_VIBRATE: [u32; 3] = [300, 100, 300];
pub const CASCADE_VIBRATE: [u32; 5] = [500, 200, 500, 200, 500];

/// A raw push event as handed over by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushEvent {
    pub data: Option<Vec<u8>>,
}

impl PushEvent {
    pub fn empty() -> Self {
        Self { data: None }
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Request to the host to display an OS-level notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemNotification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub tag: Option<String>,
    pub vibrate: Vec<u32>,
    pub actions: Vec<NotificationAction>,
    pub data: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
#[error("system notification failed: {0}")]
pub struct NotifyError(pub String);

/// Host capability for showing system notifications.
pub trait SystemNotifier: Send + Sync + 'static {
    fn show(
        &self,
        notification: SystemNotification,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Logs notifications instead of displaying them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl SystemNotifier for LogNotifier {
    async fn show(&self, notification: SystemNotification) -> Result<(), NotifyError> {
        info!(
            title = %notification.title,
            body = %notification.body,
            tag = ?notification.tag,
            "system notification"
        );
        Ok(())
    }
}

/// How a push event was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum PushDisposition {
    /// No payload; nothing done.
    Ignored,
    /// Payload could not be parsed; nothing done.
    Malformed,
    Delivered { displayed: bool, posted: usize },
}

#[derive(Debug)]
pub enum BridgeInput {
    Push {
        event: PushEvent,
        settled: Option<oneshot::Sender<PushDisposition>>,
    },
    Attach(mpsc::UnboundedSender<BridgeMessage>),
}

#[derive(Debug, Clone)]
pub struct PushBridgeHandle {
    tx: mpsc::UnboundedSender<BridgeInput>,
}

impl PushBridgeHandle {
    /// Register a new foreground; returns its end of the message channel.
    pub fn attach(&self) -> mpsc::UnboundedReceiver<BridgeMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.tx.send(BridgeInput::Attach(tx)).is_err() {
            warn!("push bridge is gone, foreground will receive no messages");
        }
        rx
    }

    /// Deliver a push event and wait until the bridge has settled it.
    ///
    /// Returns `None` if the bridge task has stopped.
    pub async fn deliver(&self, event: PushEvent) -> Option<PushDisposition> {
        let (settled_tx, settled_rx) = oneshot::channel();
        self.tx
            .send(BridgeInput::Push {
                event,
                settled: Some(settled_tx),
            })
            .ok()?;
        settled_rx.await.ok()
    }
}

pub struct PushBridge<N: SystemNotifier> {
    notifier: N,
    icon: Option<String>,
    foregrounds: Vec<mpsc::UnboundedSender<BridgeMessage>>,
}

impl<N: SystemNotifier> PushBridge<N> {
    pub fn new(notifier: N, icon: Option<String>) -> Self {
        Self {
            notifier,
            icon,
            foregrounds: Vec::new(),
        }
    }

    /// Spawn the bridge loop. It runs until every handle is dropped.
    pub fn spawn(self) -> (PushBridgeHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (PushBridgeHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BridgeInput>) {
        while let Some(input) = rx.recv().await {
            match input {
                BridgeInput::Attach(fg) => {
                    self.foregrounds.push(fg);
                    debug!(foregrounds = self.foregrounds.len(), "foreground attached");
                }
                BridgeInput::Push { event, settled } => {
                    let disposition = self.handle_push(event).await;
                    if let Some(settled) = settled {
                        let _ = settled.send(disposition);
                    }
                }
            }
        }
        debug!("push bridge stopped");
    }

    pub async fn handle_push(&mut self, event: PushEvent) -> PushDisposition {
        let Some(bytes) = event.data.filter(|d| !d.is_empty()) else {
            info!("push event without payload, ignoring");
            return PushDisposition::Ignored;
        };

        let (raw, payload) = match parse_payload(&bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "dropping push event");
                return PushDisposition::Malformed;
            }
        };

        let notification = build_system_notification(&payload, self.icon.clone());
        // Foregrounds are told to refresh even when display fails.
        let displayed = match self.notifier.show(notification).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "could not display system notification");
                false
            }
        };

        let posted = self.post_refresh(raw);
        debug!(displayed, posted, "push event settled");
        PushDisposition::Delivered { displayed, posted }
    }

    /// Post `REFRESH_STATUS` to every live foreground, pruning closed ones.
    fn post_refresh(&mut self, data: serde_json::Value) -> usize {
        let msg = BridgeMessage::RefreshStatus(RefreshStatus {
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
        self.foregrounds.retain(|fg| fg.send(msg.clone()).is_ok());
        self.foregrounds.len()
    }
}

fn parse_payload(bytes: &[u8]) -> Result<(serde_json::Value, PushPayload), ClientError> {
    let raw: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| ClientError::MalformedPushPayload(e.to_string()))?;
    let payload: PushPayload = serde_json::from_value(raw.clone())
        .map_err(|e| ClientError::MalformedPushPayload(e.to_string()))?;
    Ok((raw, payload))
}

fn build_system_notification(payload: &PushPayload, icon: Option<String>) -> SystemNotification {
    let title = payload.title.clone().unwrap_or_else(|| {
        if payload.cascade {
            CASCADE_TITLE.to_owned()
        } else {
            DEFAULT_TITLE.to_owned()
        }
    });
    let vibrate = match (&payload.vibrate, payload.cascade) {
        (Some(pattern), _) => pattern.clone(),
        (None, true) => CASCADE_VIBRATE.to_vec(),
        (None, false) => DEFAULT_VIBRATE.to_vec(),
    };
    let mut data = payload.data.clone();
    if let (Some(url), Some(obj)) = (&payload.url, data.as_object_mut()) {
        obj.entry("url")
            .or_insert_with(|| serde_json::Value::String(url.clone()));
    }
    SystemNotification {
        title,
        body: payload.body.clone().unwrap_or_default(),
        icon,
        tag: payload.tag.clone(),
        vibrate,
        actions: vec![NotificationAction {
            action: "open".to_owned(),
            title: "Open".to_owned(),
        }],
        data,
    }
}
