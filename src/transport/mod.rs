//! Transport layer consumed by the session controller
//!
//! The session only talks to a transport through [`Transport`], and only
//! creates one through [`Connector`]. The `mqtt` module provides the
//! rumqttc-backed implementation.

use crate::config::ClientConfig;
use crate::registry::MessageHandler;
use rumqttc::QoS;
use thiserror::Error;

pub mod mqtt;

/// Failure while waiting on a subscription acknowledgement
#[derive(Debug, Error)]
pub enum WaitError<E>
where
    E: std::error::Error + 'static,
{
    /// No acknowledgement arrived before the wait gave up
    #[error("acknowledgement wait did not complete")]
    Incomplete,
    /// The transport reported an error for the request
    #[error(transparent)]
    Failed(E),
}

/// Connected messaging client
///
/// Every operation resolves only once the transport has signalled completion
/// of the corresponding request.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to the broker
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Subscribe to a topic filter and route matching messages to `handler`
    async fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
        handler: MessageHandler,
    ) -> Result<(), WaitError<Self::Error>>;

    /// Publish a payload to a topic
    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), Self::Error>;
}

/// Factory creating a transport from a client configuration
pub trait Connector: Send + Sync {
    type Transport: Transport;

    /// Instantiate an unconnected transport
    fn create(
        &self,
        config: &ClientConfig,
    ) -> Result<Self::Transport, <Self::Transport as Transport>::Error>;
}

/// Type alias for the MQTT transport
pub type MqttTransport = mqtt::MqttTransport;
