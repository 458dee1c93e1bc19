//! HTTP client for the queue server's status, respond, and push-subscribe
//! endpoints.

use qs_protocol::{
    NotificationId, PushSubscribeRequest, PushSubscribeResponse, RespondRequest, RespondResponse,
    StatusResponse, Verdict,
};
use reqwest::header::{ACCEPT, CACHE_CONTROL, PRAGMA};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    entry_uuid: Uuid,
    status_url: String,
    respond_url: String,
    subscribe_url: String,
}

impl ApiClient {
    /// Client with the session's request timeout applied.
    pub fn new(session: &SessionConfig) -> Self {
        let http = match reqwest::Client::builder()
            .timeout(session.request_timeout)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "failed to build HTTP client with timeout, using defaults");
                reqwest::Client::new()
            }
        };
        Self::with_client(http, session)
    }

    pub fn with_client(http: reqwest::Client, session: &SessionConfig) -> Self {
        Self {
            http,
            entry_uuid: session.entry_uuid,
            status_url: session.status_url.clone(),
            respond_url: session.respond_url.clone(),
            subscribe_url: session.subscribe_url.clone(),
        }
    }

    /// Pull the current status, bypassing any intermediate cache.
    ///
    /// Non-2xx responses and undecodable bodies are `Transport` errors; a
    /// decoded body with `success: false` is an `Api` error.
    pub async fn fetch_status(&self) -> Result<StatusResponse, ClientError> {
        let resp = self
            .http
            .get(&self.status_url)
            .header(ACCEPT, "application/json")
            .header(CACHE_CONTROL, "no-cache, no-store")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Transport(format!("status endpoint returned HTTP {status}")));
        }

        let body: StatusResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::Transport(format!("decoding status response: {e}")))?;
        if !body.success {
            return Err(ClientError::Api(
                body.error
                    .unwrap_or_else(|| "status request was not successful".to_owned()),
            ));
        }
        Ok(body)
    }

    /// Submit the user's verdict for `notification_id`.
    ///
    /// The server reports rejected responses (expired, already answered) as
    /// 4xx with a JSON error body; that text is surfaced as an `Api` error.
    pub async fn respond(
        &self,
        notification_id: &NotificationId,
        verdict: Verdict,
    ) -> Result<RespondResponse, ClientError> {
        let req = RespondRequest {
            notification_id: notification_id.clone(),
            response: verdict,
        };
        debug!(notification_id = %notification_id, %verdict, "posting response");
        let resp = self
            .http
            .post(&self.respond_url)
            .header(ACCEPT, "application/json")
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        let body = serde_json::from_str::<RespondResponse>(&text);
        match body {
            Ok(body) if status.is_success() && body.success => Ok(body),
            Ok(body) => Err(ClientError::Api(body.error.unwrap_or_else(|| {
                format!("respond endpoint returned HTTP {status}")
            }))),
            Err(_) if !status.is_success() => Err(ClientError::Transport(format!(
                "respond endpoint returned HTTP {status}"
            ))),
            Err(e) => Err(ClientError::Transport(format!(
                "decoding respond response: {e}"
            ))),
        }
    }

    /// Register a push subscription for this queue entry.
    pub async fn register_push_subscription(
        &self,
        subscription: serde_json::Value,
    ) -> Result<(), ClientError> {
        let req = PushSubscribeRequest {
            subscription,
            entry_uuid: self.entry_uuid,
        };
        let resp = self.http.post(&self.subscribe_url).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Transport(format!(
                "subscribe endpoint returned HTTP {status}"
            )));
        }
        let body: PushSubscribeResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::Transport(format!("decoding subscribe response: {e}")))?;
        if body.success {
            Ok(())
        } else {
            Err(ClientError::Api(
                body.error
                    .unwrap_or_else(|| "subscription was rejected".to_owned()),
            ))
        }
    }
}
