//! Client configuration for the session controller
//!
//! [`ClientConfig`] is assembled once, either in code through the builder
//! methods or from a TOML settings file via [`SessionSettings`], and is never
//! mutated after it has been handed to a session.

use crate::events::EventSink;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(20);
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// Smallest non-zero keep-alive accepted by the MQTT client
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(1);

/// Connection settings plus the two notification slots
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker URI, e.g. `tcp://localhost:1883`
    pub broker_url: String,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Upper bound on waiting for a subscribe or publish acknowledgement
    pub ping_timeout: Duration,
    /// Upper bound on waiting for the broker to acknowledge the connect
    pub connect_timeout: Duration,
    pub auto_reconnect: bool,
    pub max_reconnect_interval: Duration,
    /// Receives [`crate::ConnectionEvent::ConnectionLost`]
    pub connection_lost: Option<EventSink>,
    /// Receives [`crate::ConnectionEvent::Reconnecting`] and
    /// [`crate::ConnectionEvent::Reconnected`]
    pub reconnecting: Option<EventSink>,
}

impl ClientConfig {
    /// Configuration with the default timing parameters
    pub fn new<B: Into<String>, C: Into<String>>(broker_url: B, client_id: C) -> Self {
        Self {
            broker_url: broker_url.into(),
            client_id: client_id.into(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            auto_reconnect: true,
            max_reconnect_interval: DEFAULT_MAX_RECONNECT_INTERVAL,
            connection_lost: None,
            reconnecting: None,
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.ping_timeout = ping_timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    pub fn with_max_reconnect_interval(mut self, interval: Duration) -> Self {
        self.max_reconnect_interval = interval;
        self
    }

    pub fn with_connection_lost(mut self, sink: EventSink) -> Self {
        self.connection_lost = Some(sink);
        self
    }

    pub fn with_reconnecting(mut self, sink: EventSink) -> Self {
        self.reconnecting = Some(sink);
        self
    }

    /// Check values the MQTT client would otherwise reject at runtime
    ///
    /// An empty client id is accepted; sessions are always clean, so the
    /// broker assigns one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker_url.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker_url must not be empty".to_string(),
            ));
        }
        if !self.keep_alive.is_zero() && self.keep_alive < MIN_KEEP_ALIVE {
            return Err(ConfigError::InvalidConfig(format!(
                "keep_alive must be zero or at least {}s",
                MIN_KEEP_ALIVE.as_secs()
            )));
        }
        if self.ping_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "ping_timeout and connect_timeout must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Settings file layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    #[serde(default)]
    pub session: SessionSection,
    pub mqtt: MqttSection,
}

/// Session section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// Namespace prepended to subscribed topics; empty disables namespacing
    #[serde(default)]
    pub prefix: String,
}

/// MQTT section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    pub broker_url: String,
    pub client_id: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    #[serde(default = "default_max_reconnect_interval_secs")]
    pub max_reconnect_interval_secs: u64,
}

fn default_keep_alive_secs() -> u64 {
    DEFAULT_KEEP_ALIVE.as_secs()
}

fn default_ping_timeout_secs() -> u64 {
    DEFAULT_PING_TIMEOUT.as_secs()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_max_reconnect_interval_secs() -> u64 {
    DEFAULT_MAX_RECONNECT_INTERVAL.as_secs()
}

impl MqttSection {
    /// Build a client configuration; notification slots start empty
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.broker_url, &self.client_id)
            .with_keep_alive(Duration::from_secs(self.keep_alive_secs))
            .with_ping_timeout(Duration::from_secs(self.ping_timeout_secs))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_auto_reconnect(self.auto_reconnect)
            .with_max_reconnect_interval(Duration::from_secs(self.max_reconnect_interval_secs))
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SessionSettings {
    /// Load settings from a TOML file and validate the MQTT section
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse settings from TOML text and validate the MQTT section
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: SessionSettings = toml::from_str(content)?;
        settings.client_config().validate()?;
        Ok(settings)
    }

    /// Client configuration described by the `[mqtt]` section
    pub fn client_config(&self) -> ClientConfig {
        self.mqtt.to_client_config()
    }
}
