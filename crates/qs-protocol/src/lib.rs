// qs-protocol: Queue status client wire types and serialization.
//
// Covers the three HTTP endpoints the client talks to (status, respond, push
// subscription), the push payload delivered to the background bridge, and the
// cross-context message the bridge posts to foreground engines.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Shared sub-types
// ---------------------------------------------------------------------------

/// Server-assigned notification identifier.
///
/// The server emits database ids as JSON numbers, but older payloads carried
/// them as strings. Both decode to the same canonical text form so that the
/// dedup set treats `5` and `"5"` as one notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawNotificationId", into = "String")]
pub struct NotificationId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNotificationId {
    Number(i64),
    Text(String),
}

impl From<RawNotificationId> for NotificationId {
    fn from(raw: RawNotificationId) -> Self {
        match raw {
            RawNotificationId::Number(n) => NotificationId(n.to_string()),
            RawNotificationId::Text(s) => NotificationId(s),
        }
    }
}

impl From<NotificationId> for String {
    fn from(id: NotificationId) -> Self {
        id.0
    }
}

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        NotificationId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pending notification as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    /// ISO-8601 issue time. Absent in some legacy payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_time: Option<String>,
    #[serde(default)]
    pub is_expired: bool,
    /// Cascade notifications follow a decline further up the queue. Presentation only.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_cascade: bool,
}

// ---------------------------------------------------------------------------
// Status endpoint
// ---------------------------------------------------------------------------

/// Response body of `GET {status_path}`.
///
/// `success == false` is an API-level failure even when the transport returned 2xx.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default)]
    pub has_notification: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationRecord>,
    /// Human-readable entry status, e.g. "Waiting".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_waiting: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    /// The notification record, if the server flagged one as pending.
    pub fn pending_notification(&self) -> Option<&NotificationRecord> {
        if self.has_notification {
            self.notification.as_ref()
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Respond endpoint
// ---------------------------------------------------------------------------

/// The user's answer to a "proceed now" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Declined,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::Declined => "declined",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for `POST {respond_path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondRequest {
    pub notification_id: NotificationId,
    pub response: Verdict,
}

/// Response body for `POST {respond_path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Push subscription registration
// ---------------------------------------------------------------------------

/// Request body for `POST {subscribe_path}`.
///
/// `subscription` is the opaque browser/relay subscription object; the client
/// never inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushSubscribeRequest {
    pub subscription: serde_json::Value,
    pub entry_uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscribeResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Push payload (server -> push bridge)
// ---------------------------------------------------------------------------

/// Body of a push event as sent by the server's web-push sender.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Collapses repeated OS-level notifications with the same tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibrate: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cascade: bool,
    /// Opaque application data, forwarded untouched.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Cross-context messages (push bridge -> foreground)
// ---------------------------------------------------------------------------

/// Payload of a `REFRESH_STATUS` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshStatus {
    /// The original push payload as received.
    pub data: serde_json::Value,
    /// Milliseconds since the Unix epoch at which the bridge posted the message.
    pub timestamp: i64,
}

/// Messages posted by the push bridge to every attached foreground engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeMessage {
    RefreshStatus(RefreshStatus),
}
