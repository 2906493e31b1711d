//! 配置模块测试

use super::*;
use std::collections::HashMap;
use std::io::Write;

#[test]
fn test_default_config_values() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8990);
    assert_eq!(config.backend.busy_statuses, vec![409]);
    assert_eq!(config.retry.max_retries, 4);
    assert_eq!(config.retry.idle_wait_ms, 30_000);
    assert_eq!(config.retry.poll_interval_ms, 1_500);
    assert_eq!(config.streaming.drain_grace_ms, 2_000);
    assert!(!config.streaming.emit_empty_lifecycle);
    assert!(config.validate().is_ok());
}

#[test]
fn test_parse_partial_yaml_uses_defaults() {
    let yaml = r#"
backend:
  base_url: "http://agent.local:9000/"
  busy_statuses: [409, 423]
retry:
  max_retries: 2
"#;
    let config = parse_config(yaml).unwrap();
    assert_eq!(config.backend.base_url, "http://agent.local:9000/");
    assert_eq!(config.backend.busy_statuses, vec![409, 423]);
    assert_eq!(config.backend.message_path, "/message");
    assert_eq!(config.retry.max_retries, 2);
    assert_eq!(config.retry.poll_interval_ms, 1_500);
    assert_eq!(config.server.port, 8990);
}

#[test]
fn test_parse_empty_yaml_is_default() {
    assert_eq!(parse_config("  \n").unwrap(), Config::default());
}

#[test]
fn test_parse_invalid_yaml_fails() {
    let result = parse_config("server: [not, a, map");
    assert!(matches!(result, Err(ConfigError::Yaml(_))));
}

#[test]
fn test_load_config_missing_file_returns_default() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = load_config(&dir.path().join("missing.yaml")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "server:\n  port: 9100\nstreaming:\n  emit_empty_lifecycle: true").unwrap();

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.server.port, 9100);
    assert!(config.streaming.emit_empty_lifecycle);
}

#[test]
fn test_env_overrides() {
    let vars: HashMap<&str, &str> = [
        (HOST_ENV, "0.0.0.0"),
        (PORT_ENV, "9200"),
        (BACKEND_URL_ENV, "http://10.0.0.2:7000"),
    ]
    .into_iter()
    .collect();

    let mut config = Config::default();
    apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string())).unwrap();

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9200);
    assert_eq!(config.backend.base_url, "http://10.0.0.2:7000");
}

#[test]
fn test_env_override_invalid_port() {
    let mut config = Config::default();
    let result = apply_env_overrides(&mut config, |key| {
        (key == PORT_ENV).then(|| "not-a-port".to_string())
    });
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_validate_rejects_zero_poll_interval() {
    let mut config = Config::default();
    config.retry.poll_interval_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_empty_base_url() {
    let mut config = Config::default();
    config.backend.base_url = "  ".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_backend_url_join() {
    let mut backend = BackendConfig::default();
    backend.base_url = "http://agent:8000/".to_string();
    assert_eq!(backend.url("/message"), "http://agent:8000/message");
    assert_eq!(backend.url("stream"), "http://agent:8000/stream");
    assert!(backend.is_busy_status(409));
    assert!(!backend.is_busy_status(500));
}
