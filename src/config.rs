//! Configuration for a communicator instance
//!
//! Configuration can be built in code with [`CommConfig::new`] or loaded from a
//! TOML file with two sections:
//!
//! ```toml
//! [communicator]
//! id = "agent-1"            # empty = generated id
//! subscribe_topic = "topic1"
//! publish_topic = "topic1"
//!
//! [broker]
//! host = "localhost"
//! port = 1883
//! keepalive_secs = 60       # 5 to 65535
//! connect_timeout_ms = 5000  # omit for unbounded
//! retry_interval_ms = 1000
//! ```

use crate::topics::{validate_filter, validate_topic};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main communicator configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommConfig {
    pub communicator: CommunicatorSection,
    pub broker: BrokerSection,
}

/// Client identity and default topics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunicatorSection {
    /// Client id; an empty id lets the communicator pick a unique one
    #[serde(default)]
    pub id: String,
    /// Filter of the implicit default subscription
    pub subscribe_topic: String,
    /// Topic used by `send_message` without an explicit topic
    pub publish_topic: String,
}

/// Broker address and connection behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Keep alive interval in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
    /// Overall connect budget; `None` waits forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    /// Fixed pause between connection attempts
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
    /// Environment variable containing username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_env: Option<String>,
    /// Environment variable containing password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_keepalive() -> u64 {
    60
}

/// Shortest keep alive the MQTT client accepts
pub const MIN_KEEPALIVE_SECS: u64 = 5;

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_retry_interval() -> u64 {
    1000
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CommConfig {
    /// Build a configuration with the same parameters a bare communicator needs
    pub fn new(
        id: &str,
        subscribe_topic: &str,
        publish_topic: &str,
        host: &str,
        port: u16,
        keepalive_secs: u64,
    ) -> Self {
        Self {
            communicator: CommunicatorSection {
                id: id.to_string(),
                subscribe_topic: subscribe_topic.to_string(),
                publish_topic: publish_topic.to_string(),
            },
            broker: BrokerSection {
                host: host.to_string(),
                port,
                keepalive_secs,
                connect_timeout_ms: None,
                retry_interval_ms: default_retry_interval(),
                username_env: None,
                password_env: None,
            },
        }
    }

    /// Bound the time spent establishing the initial session
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.broker.connect_timeout_ms = Some(duration_to_millis(timeout));
        self
    }

    /// Change the pause between connection attempts
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.broker.retry_interval_ms = duration_to_millis(interval);
        self
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: CommConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check topics and broker parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_filter(&self.communicator.subscribe_topic).map_err(|e| {
            ConfigError::InvalidTopic {
                topic: self.communicator.subscribe_topic.clone(),
                reason: e.to_string(),
            }
        })?;
        validate_topic(&self.communicator.publish_topic).map_err(|e| {
            ConfigError::InvalidTopic {
                topic: self.communicator.publish_topic.clone(),
                reason: e.to_string(),
            }
        })?;

        if self.communicator.id.starts_with(' ') {
            return Err(ConfigError::InvalidConfig(
                "client id must not start with a space".to_string(),
            ));
        }
        if self.broker.host.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker host must not be empty".to_string(),
            ));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker port must be non-zero".to_string(),
            ));
        }
        if !(MIN_KEEPALIVE_SECS..=u64::from(u16::MAX)).contains(&self.broker.keepalive_secs) {
            return Err(ConfigError::InvalidConfig(format!(
                "keepalive_secs must be between {} and {}",
                MIN_KEEPALIVE_SECS,
                u16::MAX
            )));
        }
        if self.broker.retry_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "retry_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.broker.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.broker.retry_interval_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.broker.keepalive_secs)
    }

    /// Get broker username from environment variable
    pub fn get_username(&self) -> Option<String> {
        Self::get_env_var_optional(self.broker.username_env.as_ref())
    }

    /// Get broker password from environment variable
    pub fn get_password(&self) -> Option<String> {
        Self::get_env_var_optional(self.broker.password_env.as_ref())
    }

    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }
}
