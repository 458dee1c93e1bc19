//! Client configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: [`DEFAULT_CONFIG_PATH`].
//!
//! # Required fields
//! - `schema_version = 1`
//! - `server.base_url`
//! - `session.entry_uuid`
//!
//! Endpoint paths may contain the `{entry_uuid}` placeholder, which is
//! substituted with the configured entry UUID.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

/// Aligned polling cadence. Not configurable: ticks land on :00 and :30.
pub const POLL_INTERVAL_MS: u64 = 30_000;
/// How early the repeating timer is armed ahead of the next boundary.
pub const DRIFT_MARGIN_MS: u64 = 100;

pub const DEFAULT_STATUS_PATH: &str = "/queueing/api/queue/{entry_uuid}/status/";
pub const DEFAULT_RESPOND_PATH: &str = "/queueing/api/notification/respond/";
pub const DEFAULT_SUBSCRIBE_PATH: &str = "/queueing/push/subscribe/";
pub const DEFAULT_NOTIFICATION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_FAILURE_ALERT_THRESHOLD: u32 = 3;
pub const DEFAULT_ALERT_DISMISS_MS: u64 = 5_000;
pub const DEFAULT_REFRESH_DELAY_MS: u64 = 1_000;
pub const DEFAULT_CONTROL_BIND: &str = "127.0.0.1:9191";
/// Whole-request timeout; keeps one hung fetch from outliving a poll interval.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONFIG_PATH: &str = "/etc/queue-sync/client.toml";

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub schema_version: u32,
    pub session: SessionConfig,
    pub push: PushConfig,
    pub control: ControlConfig,
}

/// Immutable per-session settings handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub entry_uuid: Uuid,
    /// Fully resolved status endpoint URL.
    pub status_url: String,
    pub respond_url: String,
    pub subscribe_url: String,
    /// Transport-level timeout applied to every HTTP request.
    pub request_timeout: Duration,
    pub notification_timeout: Duration,
    pub poll_interval: Duration,
    pub drift_margin: Duration,
    /// Consecutive fetch failures before the connectivity alert is raised.
    pub failure_alert_threshold: u32,
    pub alert_dismiss: Duration,
    /// Delay of the out-of-band refresh after a successful response.
    pub refresh_delay: Duration,
}

impl SessionConfig {
    /// Session settings with default paths and timings against `base_url`.
    pub fn new(base_url: &str, entry_uuid: Uuid) -> Self {
        Self {
            entry_uuid,
            status_url: resolve_url(base_url, DEFAULT_STATUS_PATH, entry_uuid),
            respond_url: resolve_url(base_url, DEFAULT_RESPOND_PATH, entry_uuid),
            subscribe_url: resolve_url(base_url, DEFAULT_SUBSCRIBE_PATH, entry_uuid),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            notification_timeout: Duration::from_secs(DEFAULT_NOTIFICATION_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            drift_margin: Duration::from_millis(DRIFT_MARGIN_MS),
            failure_alert_threshold: DEFAULT_FAILURE_ALERT_THRESHOLD,
            alert_dismiss: Duration::from_millis(DEFAULT_ALERT_DISMISS_MS),
            refresh_delay: Duration::from_millis(DEFAULT_REFRESH_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushConfig {
    /// JSON file holding the push subscription object to register at startup.
    pub subscription_file: Option<PathBuf>,
    /// Icon passed along with system notifications.
    pub icon: Option<String>,
}

/// Local control API (push relay intake, respond, state).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlConfig {
    /// `None` disables the listener.
    pub bind: Option<String>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_CONTROL_BIND.to_owned()),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    server: Option<RawServerConfig>,
    session: Option<RawSessionConfig>,
    alerts: Option<RawAlertsConfig>,
    push: Option<RawPushConfig>,
    control: Option<RawControlConfig>,
}

#[derive(Debug, Deserialize)]
struct RawServerConfig {
    base_url: Option<String>,
    status_path: Option<String>,
    respond_path: Option<String>,
    subscribe_path: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawSessionConfig {
    entry_uuid: Option<String>,
    notification_timeout_secs: Option<u64>,
    refresh_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawAlertsConfig {
    failure_threshold: Option<u32>,
    dismiss_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawPushConfig {
    subscription_file: Option<String>,
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawControlConfig {
    bind: Option<String>,
    enabled: Option<bool>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load client config from a custom path.
pub fn load_config_from_path(path: &Path) -> Result<ClientConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

/// Load client config from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<ClientConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw
        .schema_version
        .ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {schema_version}"
        )));
    }

    let raw_server = raw
        .server
        .ok_or_else(|| ConfigError::MissingField("server".to_owned()))?;
    let base_url = raw_server
        .base_url
        .ok_or_else(|| ConfigError::MissingField("server.base_url".to_owned()))?;
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::InvalidValue(format!(
            "server.base_url must start with http:// or https://, got '{base_url}'"
        )));
    }

    let raw_session = raw
        .session
        .ok_or_else(|| ConfigError::MissingField("session".to_owned()))?;
    let entry_uuid_str = raw_session
        .entry_uuid
        .ok_or_else(|| ConfigError::MissingField("session.entry_uuid".to_owned()))?;
    let entry_uuid = Uuid::parse_str(entry_uuid_str.trim()).map_err(|e| {
        ConfigError::InvalidValue(format!("session.entry_uuid '{entry_uuid_str}': {e}"))
    })?;

    let mut session = SessionConfig::new(&base_url, entry_uuid);
    if let Some(path) = raw_server.status_path {
        session.status_url = resolve_url(&base_url, &path, entry_uuid);
    }
    if let Some(path) = raw_server.respond_path {
        session.respond_url = resolve_url(&base_url, &path, entry_uuid);
    }
    if let Some(path) = raw_server.subscribe_path {
        session.subscribe_url = resolve_url(&base_url, &path, entry_uuid);
    }
    if let Some(secs) = raw_server.request_timeout_secs {
        if secs == 0 {
            return Err(ConfigError::InvalidValue(
                "server.request_timeout_secs must be > 0".to_owned(),
            ));
        }
        session.request_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = raw_session.notification_timeout_secs {
        if secs == 0 {
            return Err(ConfigError::InvalidValue(
                "session.notification_timeout_secs must be > 0".to_owned(),
            ));
        }
        session.notification_timeout = Duration::from_secs(secs);
    }
    if let Some(ms) = raw_session.refresh_delay_ms {
        session.refresh_delay = Duration::from_millis(ms);
    }

    if let Some(alerts) = raw.alerts {
        if let Some(threshold) = alerts.failure_threshold {
            if threshold == 0 {
                return Err(ConfigError::InvalidValue(
                    "alerts.failure_threshold must be >= 1".to_owned(),
                ));
            }
            session.failure_alert_threshold = threshold;
        }
        if let Some(ms) = alerts.dismiss_ms {
            session.alert_dismiss = Duration::from_millis(ms);
        }
    }

    let push = match raw.push {
        Some(p) => PushConfig {
            subscription_file: p.subscription_file.map(PathBuf::from),
            icon: p.icon,
        },
        None => PushConfig::default(),
    };

    let control = match raw.control {
        Some(c) if c.enabled == Some(false) => ControlConfig { bind: None },
        Some(c) => ControlConfig {
            bind: Some(c.bind.unwrap_or_else(|| DEFAULT_CONTROL_BIND.to_owned())),
        },
        None => ControlConfig::default(),
    };

    Ok(ClientConfig {
        schema_version,
        session,
        push,
        control,
    })
}

/// Join `base_url` and `path`, substituting `{entry_uuid}`.
fn resolve_url(base_url: &str, path: &str, entry_uuid: Uuid) -> String {
    let path = path.replace("{entry_uuid}", &entry_uuid.to_string());
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}
