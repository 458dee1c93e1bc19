//! Status fetcher: one authoritative pull per trigger, with failure counting.

use std::fmt;

use qs_protocol::StatusResponse;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::ClientError;

/// Why a fetch happened. Logged only; every reason fetches the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Initial,
    Aligned,
    PushNotification,
    PostResponse,
    Manual,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerReason::Initial => "initial",
            TriggerReason::Aligned => "aligned",
            TriggerReason::PushNotification => "push_notification",
            TriggerReason::PostResponse => "post_response",
            TriggerReason::Manual => "manual",
        })
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    Updated(StatusResponse),
    Failed {
        error: ClientError,
        consecutive_failures: u32,
    },
}

#[derive(Debug)]
pub struct StatusFetcher {
    api: ApiClient,
    connected: bool,
    consecutive_failures: u32,
    fetches: u64,
}

impl StatusFetcher {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            connected: false,
            consecutive_failures: 0,
            fetches: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn fetches(&self) -> u64 {
        self.fetches
    }

    pub async fn fetch(&mut self, reason: TriggerReason) -> FetchOutcome {
        self.fetches += 1;
        debug!(%reason, n = self.fetches, "fetching status");
        match self.api.fetch_status().await {
            Ok(resp) => {
                if self.consecutive_failures > 0 {
                    info!(
                        %reason,
                        after_failures = self.consecutive_failures,
                        "status fetch recovered"
                    );
                }
                self.consecutive_failures = 0;
                self.connected = true;
                FetchOutcome::Updated(resp)
            }
            Err(error) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.connected = false;
                warn!(
                    %reason,
                    error = %error,
                    consecutive_failures = self.consecutive_failures,
                    "status fetch failed"
                );
                FetchOutcome::Failed {
                    error,
                    consecutive_failures: self.consecutive_failures,
                }
            }
        }
    }
}
