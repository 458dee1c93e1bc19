/// Errors produced by the status-synchronization engine.
///
/// Fetch-side errors (`Transport`, `Api`) are absorbed by the engine and only
/// show up as connection state and alerts. Respond-side errors are returned
/// to the caller. `MalformedPushPayload` never leaves the push bridge.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("api: {0}")]
    Api(String),
    #[error("no active notification")]
    NoActiveNotification,
    #[error("a response is already in flight")]
    ResponseInFlight,
    #[error("malformed push payload: {0}")]
    MalformedPushPayload(String),
    #[error("engine stopped")]
    EngineStopped,
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}
