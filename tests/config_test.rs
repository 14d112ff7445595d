//! Configuration tests
//!
//! Loads gateway configuration from files, environment variables and command
//! line overrides, and checks the priority between them.

use std::env;
use std::fs;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use auto_detect_gateway::config::{
    load_config, ConfigBuilder, ConfigError, DetectorSpec, GatewayConfig, Overrides, ENV_PREFIX,
};
use auto_detect_gateway::dispatch::DetectorBinding;
use auto_detect_gateway::service::ServiceKind;

const CONFIG: &str = r#"{
    "listen": "127.0.0.1:9000",
    "upstream": "127.0.0.1:25",
    "log_level": "debug",
    "detect_timeout_ms": 250,
    "detectors": {
        "http": { "type": "http" },
        "tls": { "type": "tls" },
        "smtp": { "type": "banner", "prefix": "220 " }
    },
    "services": {
        "web": { "type": "forward", "target": "127.0.0.1:8000" },
        "mail": { "type": "forward", "target": "127.0.0.1:2525" },
        "reject": { "type": "reject" }
    },
    "dispatch": {
        "detectors": [
            { "detector": "http", "service": "web" },
            { "detector": "tls", "service": "web" },
            { "detector": "smtp", "service": "mail" }
        ],
        "default_service": "reject"
    }
}"#;

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("gateway.json");
    fs::write(&path, contents).expect("Failed to write config file");
    path
}

fn clear_env() {
    for name in ["LISTEN", "UPSTREAM", "LOG_LEVEL", "BUFFER_SIZE", "CONNECTION_TIMEOUT", "DETECT_TIMEOUT_MS"] {
        env::remove_var(format!("{}{}", ENV_PREFIX, name));
    }
}

#[test]
fn test_default_config() {
    let config = GatewayConfig::default();

    assert_eq!(config.listen.to_string(), "0.0.0.0:8080");
    assert_eq!(config.log_level, "info");
    assert_eq!(config.buffer_size, 8192);
    assert_eq!(config.connection_timeout, 30);
    assert_eq!(config.detect_timeout(), Duration::from_millis(5000));
    assert_eq!(config.dispatch.default_service, "reject");
    assert_eq!(config.services.get("reject"), Some(&ServiceKind::Reject));
    assert!(config.dispatch.detectors.is_empty());
}

#[test]
#[serial]
fn test_file_config() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, CONFIG);

    let config = load_config(Some(&path), Overrides::default()).expect("Failed to load config");

    assert_eq!(config.listen.to_string(), "127.0.0.1:9000");
    assert_eq!(config.upstream.as_deref(), Some("127.0.0.1:25"));
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.detect_timeout(), Duration::from_millis(250));
    assert_eq!(config.config_file(), Some(path.as_path()));
    assert_eq!(
        config.detectors.get("smtp"),
        Some(&DetectorSpec::Banner { prefix: "220 ".to_string() })
    );
    assert_eq!(
        config.dispatch.detectors,
        vec![
            DetectorBinding::new("http", "web"),
            DetectorBinding::new("tls", "web"),
            DetectorBinding::new("smtp", "mail"),
        ]
    );
    assert!(config.needs_upstream());

    let dispatch = config.dispatch_config();
    assert_eq!(dispatch.bindings.len(), 3);
    assert_eq!(dispatch.timeout, Duration::from_millis(250));
}

#[test]
#[serial]
fn test_config_priority() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, CONFIG);

    env::set_var(format!("{}LISTEN", ENV_PREFIX), "127.0.0.1:9001");
    env::set_var(format!("{}LOG_LEVEL", ENV_PREFIX), "warn");
    env::set_var(format!("{}DETECT_TIMEOUT_MS", ENV_PREFIX), "1000");

    let overrides = Overrides {
        listen: Some("127.0.0.1:9002".to_string()),
        upstream: None,
        log_level: None,
    };
    let config = load_config(Some(&path), overrides);
    clear_env();
    let config = config.expect("Failed to load config");

    // Command line beats environment, environment beats file
    assert_eq!(config.listen.to_string(), "127.0.0.1:9002");
    assert_eq!(config.log_level, "warn");
    assert_eq!(config.detect_timeout_ms, 1000);
    assert_eq!(config.upstream.as_deref(), Some("127.0.0.1:25"));
}

#[test]
#[serial]
fn test_invalid_env_number_is_rejected() {
    clear_env();
    env::set_var(format!("{}BUFFER_SIZE", ENV_PREFIX), "lots");

    let result = ConfigBuilder::new().with_env(ENV_PREFIX).build();
    clear_env();

    assert!(matches!(result, Err(ConfigError::InvalidValue(ref field, _)) if field == "buffer_size"));
}

#[test]
#[serial]
fn test_missing_config_file_is_an_error() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.json");

    let err = load_config(Some(&path), Overrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound(_)));
}

#[test]
fn test_unknown_field_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{ "listen": "127.0.0.1:9000", "target": "127.0.0.1:1" }"#);

    let err = ConfigBuilder::new().with_file(&path).build().unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn test_binding_to_undefined_service_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "detectors": { "http": { "type": "http" } },
            "dispatch": { "detectors": [ { "detector": "http", "service": "web" } ] }
        }"#,
    );

    let err = ConfigBuilder::new().with_file(&path).build().unwrap_err();
    assert!(err.to_string().contains("service='web'"), "got: {}", err);
}

#[test]
fn test_banner_without_upstream_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "detectors": { "ssh": { "type": "banner", "prefix": "SSH-" } },
            "dispatch": { "detectors": [ { "detector": "ssh", "service": "reject" } ] }
        }"#,
    );

    let err = ConfigBuilder::new().with_file(&path).build().unwrap_err();
    assert!(matches!(err, ConfigError::MissingRequiredValue(_)));

    let config = ConfigBuilder::new()
        .with_file(&path)
        .without_validation()
        .build()
        .expect("Unvalidated config should load");
    assert!(config.needs_upstream());
}
