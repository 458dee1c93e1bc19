/// Integration tests for client config loading.
///
/// Tests required field validation, endpoint resolution, defaults and the
/// optional alert, push and control sections.
use queue_client::config::{ConfigError, load_config_from_path, load_config_from_str};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

const ENTRY: &str = "6f1c2a7e-3b9d-4c55-9a0e-2d7f8b61c4e3";

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

/// Write a TOML string to a temp file and return the handle.
fn write_config_file(toml: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("create temp file");
    write!(f, "{toml}").expect("write config");
    f
}

fn minimal() -> String {
    format!(
        r#"
schema_version = 1

[server]
base_url = "https://queue.example.com"

[session]
entry_uuid = "{ENTRY}"
"#
    )
}

// ---------------------------------------------------------------------------
// Required fields
// ---------------------------------------------------------------------------

#[test]
fn valid_minimal_config_loads_with_defaults() {
    let cfg = load_config_from_str(&minimal()).expect("should load");
    assert_eq!(cfg.schema_version, 1);
    assert_eq!(cfg.session.entry_uuid.to_string(), ENTRY);
    assert_eq!(
        cfg.session.status_url,
        format!("https://queue.example.com/queueing/api/queue/{ENTRY}/status/")
    );
    assert_eq!(
        cfg.session.respond_url,
        "https://queue.example.com/queueing/api/notification/respond/"
    );
    assert_eq!(
        cfg.session.subscribe_url,
        "https://queue.example.com/queueing/push/subscribe/"
    );
    assert_eq!(cfg.session.notification_timeout, Duration::from_secs(120));
    assert_eq!(cfg.session.failure_alert_threshold, 3);
    assert_eq!(cfg.session.alert_dismiss, Duration::from_secs(5));
    assert_eq!(cfg.session.request_timeout, Duration::from_secs(10));
    assert_eq!(cfg.push.subscription_file, None);
    assert_eq!(cfg.control.bind.as_deref(), Some("127.0.0.1:9191"));
}

#[test]
fn missing_schema_version_fails() {
    let toml = minimal().replace("schema_version = 1", "");
    let err = load_config_from_str(&toml).unwrap_err();
    assert!(matches!(err, ConfigError::MissingField(ref f) if f == "schema_version"));
}

#[test]
fn wrong_schema_version_fails() {
    let toml = minimal().replace("schema_version = 1", "schema_version = 2");
    assert!(matches!(
        load_config_from_str(&toml),
        Err(ConfigError::InvalidValue(_))
    ));
}

#[test]
fn missing_entry_uuid_fails() {
    let toml = r#"
schema_version = 1

[server]
base_url = "https://queue.example.com"

[session]
"#;
    let err = load_config_from_str(toml).unwrap_err();
    assert!(matches!(err, ConfigError::MissingField(ref f) if f == "session.entry_uuid"));
}

#[test]
fn malformed_entry_uuid_fails() {
    let toml = minimal().replace(ENTRY, "not-a-uuid");
    assert!(matches!(
        load_config_from_str(&toml),
        Err(ConfigError::InvalidValue(_))
    ));
}

#[test]
fn non_http_base_url_fails() {
    let toml = minimal().replace("https://queue.example.com", "ftp://queue.example.com");
    assert!(matches!(
        load_config_from_str(&toml),
        Err(ConfigError::InvalidValue(_))
    ));
}

#[test]
fn invalid_toml_is_a_parse_error() {
    assert!(matches!(
        load_config_from_str("schema_version = = 1"),
        Err(ConfigError::Parse(_))
    ));
}

// ---------------------------------------------------------------------------
// Optional sections
// ---------------------------------------------------------------------------

#[test]
fn custom_paths_and_timings_are_applied() {
    let toml = format!(
        r#"
schema_version = 1

[server]
base_url = "http://localhost:8000/"
status_path = "/api/entries/{{entry_uuid}}/"
respond_path = "api/respond"

[session]
entry_uuid = "{ENTRY}"
notification_timeout_secs = 90
refresh_delay_ms = 250

[alerts]
failure_threshold = 5
dismiss_ms = 8000
"#
    );
    let cfg = load_config_from_str(&toml).expect("should load");
    assert_eq!(
        cfg.session.status_url,
        format!("http://localhost:8000/api/entries/{ENTRY}/")
    );
    assert_eq!(cfg.session.respond_url, "http://localhost:8000/api/respond");
    assert_eq!(cfg.session.notification_timeout, Duration::from_secs(90));
    assert_eq!(cfg.session.refresh_delay, Duration::from_millis(250));
    assert_eq!(cfg.session.failure_alert_threshold, 5);
    assert_eq!(cfg.session.alert_dismiss, Duration::from_secs(8));
    // The polling cadence is fixed.
    assert_eq!(cfg.session.poll_interval, Duration::from_secs(30));
}

#[test]
fn zero_failure_threshold_is_rejected() {
    let toml = format!("{}\n[alerts]\nfailure_threshold = 0\n", minimal());
    assert!(matches!(
        load_config_from_str(&toml),
        Err(ConfigError::InvalidValue(_))
    ));
}

#[test]
fn request_timeout_is_configurable_but_not_zero() {
    let with = |secs: u64| {
        minimal().replace(
            "base_url = \"https://queue.example.com\"",
            &format!("base_url = \"https://queue.example.com\"\nrequest_timeout_secs = {secs}"),
        )
    };
    let cfg = load_config_from_str(&with(4)).expect("should load");
    assert_eq!(cfg.session.request_timeout, Duration::from_secs(4));
    assert!(matches!(
        load_config_from_str(&with(0)),
        Err(ConfigError::InvalidValue(_))
    ));
}

#[test]
fn zero_notification_timeout_is_rejected() {
    let toml = minimal().replace(
        &format!("entry_uuid = \"{ENTRY}\""),
        &format!("entry_uuid = \"{ENTRY}\"\nnotification_timeout_secs = 0"),
    );
    assert!(matches!(
        load_config_from_str(&toml),
        Err(ConfigError::InvalidValue(_))
    ));
}

#[test]
fn push_and_control_sections_are_read() {
    let toml = format!(
        r#"{}
[push]
subscription_file = "/var/lib/queue-sync/subscription.json"
icon = "/static/icon-192.png"

[control]
bind = "0.0.0.0:9300"
"#,
        minimal()
    );
    let cfg = load_config_from_str(&toml).expect("should load");
    assert_eq!(
        cfg.push.subscription_file,
        Some(PathBuf::from("/var/lib/queue-sync/subscription.json"))
    );
    assert_eq!(cfg.push.icon.as_deref(), Some("/static/icon-192.png"));
    assert_eq!(cfg.control.bind.as_deref(), Some("0.0.0.0:9300"));
}

#[test]
fn control_api_can_be_disabled() {
    let toml = format!("{}\n[control]\nenabled = false\n", minimal());
    let cfg = load_config_from_str(&toml).expect("should load");
    assert_eq!(cfg.control.bind, None);
}

// ---------------------------------------------------------------------------
// File loading
// ---------------------------------------------------------------------------

#[test]
fn load_from_path_reads_file() {
    let f = write_config_file(&minimal());
    let cfg = load_config_from_path(f.path()).expect("should load");
    assert_eq!(cfg.session.entry_uuid.to_string(), ENTRY);
}

#[test]
fn load_from_missing_path_is_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_config_from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
