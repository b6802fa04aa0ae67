//! Pure connection state management for the MQTT transport
//!
//! This module contains pure functions for connection state, reconnect
//! pacing and translating a [`ClientConfig`] into rumqttc options.

use crate::config::{ClientConfig, ConfigError};
use rumqttc::MqttOptions;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default port for plain `tcp://` and `mqtt://` brokers
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Capacity of the request channel between client handle and event loop
pub const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Connection state for the MQTT transport
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - attempting to connect
    Connecting,
    /// Broker acknowledged the connection
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Waiting to re-dial (attempt count)
    Reconnecting(u32),
    /// Connection lost and auto-reconnect disabled, or shut down
    PermanentlyDisconnected(String),
}

impl ConnectionState {
    /// Only a connected transport accepts subscribe and publish requests
    pub fn accepts_requests(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Reconnection pacing
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    pub enabled: bool,
    /// Delay before the first re-dial
    pub initial_delay: Duration,
    /// Cap on the doubling delay
    pub max_interval: Duration,
}

impl ReconnectConfig {
    pub fn from_client_config(config: &ClientConfig) -> Self {
        Self {
            enabled: config.auto_reconnect,
            initial_delay: Duration::from_secs(1),
            max_interval: config.max_reconnect_interval,
        }
    }

    /// Delay before re-dial `attempt` (1-based): doubles from the initial
    /// delay and stays at the cap once reached
    pub fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_interval)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Unsupported broker URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("{0}")]
    ConnectionFailed(String),
    #[error("Subscribe request failed: {0}")]
    SubscribeRequestFailed(#[source] rumqttc::ClientError),
    #[error("Subscription to {topic} rejected by broker")]
    SubscriptionRejected { topic: String },
    #[error("Publish request failed: {0}")]
    PublishRequestFailed(#[source] rumqttc::ClientError),
    #[error("Publish to {topic} was not acknowledged")]
    PublishNotAcknowledged { topic: String },
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
}

/// Broker endpoint extracted from the configured URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

/// Parse `tcp://host:port` or `mqtt://host:port`
pub fn parse_broker_url(broker_url: &str) -> Result<BrokerAddress, MqttError> {
    let url =
        Url::parse(broker_url).map_err(|_| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    match url.scheme() {
        "tcp" | "mqtt" => {}
        other => return Err(MqttError::UnsupportedScheme(other.to_string())),
    }

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    Ok(BrokerAddress {
        host: host.to_string(),
        port: url.port().unwrap_or(DEFAULT_MQTT_PORT),
    })
}

/// Pure function to configure MQTT options from the client configuration
pub fn configure_mqtt_options(config: &ClientConfig) -> Result<MqttOptions, MqttError> {
    config.validate()?;
    let address = parse_broker_url(&config.broker_url)?;

    let mut mqtt_options = MqttOptions::new(&config.client_id, address.host, address.port);
    mqtt_options.set_keep_alive(config.keep_alive);
    mqtt_options.set_clean_session(true);

    Ok(mqtt_options)
}
