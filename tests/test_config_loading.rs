//! Configuration loading and validation tests
//!
//! Tests focus on observable outcomes of loading TOML files: defaults,
//! overrides and the errors reported for broken files.

use fast_comm::config::{CommConfig, ConfigError};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{contents}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[communicator]
id = "agent-1"
subscribe_topic = "topic1"
publish_topic = "topic2"

[broker]
host = "broker.local"
port = 1884
keepalive_secs = 30
connect_timeout_ms = 5000
retry_interval_ms = 250
"#,
    );

    let config = CommConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.communicator.id, "agent-1");
    assert_eq!(config.communicator.subscribe_topic, "topic1");
    assert_eq!(config.communicator.publish_topic, "topic2");
    assert_eq!(config.broker.host, "broker.local");
    assert_eq!(config.broker.port, 1884);
    assert_eq!(config.keepalive(), Duration::from_secs(30));
    assert_eq!(config.connect_timeout(), Some(Duration::from_secs(5)));
    assert_eq!(config.retry_interval(), Duration::from_millis(250));
}

#[test]
fn test_config_applies_defaults() {
    let temp_file = write_config(
        r#"
[communicator]
subscribe_topic = "A/#"
publish_topic = "A/B"

[broker]
"#,
    );

    let config = CommConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.communicator.id, "");
    assert_eq!(config.broker.host, "localhost");
    assert_eq!(config.broker.port, 1883);
    assert_eq!(config.keepalive(), Duration::from_secs(60));
    assert_eq!(config.connect_timeout(), None);
    assert_eq!(config.retry_interval(), Duration::from_secs(1));
    assert_eq!(config.broker.username_env, None);
}

#[test]
fn test_config_missing_file() {
    let result = CommConfig::load_from_file(Path::new("/nonexistent/fast-comm.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_config_malformed_toml() {
    let temp_file = write_config("[communicator\nid = ");
    let result = CommConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_missing_required_topic() {
    let temp_file = write_config(
        r#"
[communicator]
subscribe_topic = "topic1"

[broker]
"#,
    );
    let result = CommConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_rejects_malformed_filter() {
    let temp_file = write_config(
        r#"
[communicator]
subscribe_topic = "A/#/B"
publish_topic = "A/B"

[broker]
"#,
    );
    let result = CommConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidTopic { .. })));
}

#[test]
fn test_config_rejects_wildcard_publish_topic() {
    let temp_file = write_config(
        r#"
[communicator]
subscribe_topic = "A/#"
publish_topic = "A/+"

[broker]
"#,
    );
    let result = CommConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidTopic { .. })));
}

#[test]
fn test_config_rejects_zero_port() {
    let temp_file = write_config(
        r#"
[communicator]
subscribe_topic = "topic1"
publish_topic = "topic1"

[broker]
port = 0
"#,
    );
    let result = CommConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_config_toml_roundtrip() {
    let config = CommConfig::new("agent-1", "A/+/B", "A/C/B", "localhost", 1883, 60)
        .with_connect_timeout(Duration::from_secs(2));
    let rendered = toml::to_string_pretty(&config).unwrap();

    let temp_file = write_config(&rendered);
    let loaded = CommConfig::load_from_file(temp_file.path()).unwrap();
    assert_eq!(loaded, config);
}
