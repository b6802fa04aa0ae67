//! MQTT transport built on rumqttc
//!
//! Pure logic is kept apart from I/O so most of it can be tested without a
//! broker:
//!
//! - [`connection`] - connection state, broker URL parsing and client options
//! - [`message_handler`] - event routing, acknowledgement tracking and dispatch
//! - [`health_monitor`] - state transitions and reconnection decisions
//! - [`client`] - the event loop task and the [`Transport`](crate::transport::Transport) impl
//!
//! # Usage
//!
//! ```rust,no_run
//! use mqtt_session::config::ClientConfig;
//! use mqtt_session::registry::message_handler;
//! use mqtt_session::transport::mqtt::MqttTransport;
//! use mqtt_session::transport::Transport;
//! use rumqttc::QoS;
//!
//! # tokio_test::block_on(async {
//! let config = ClientConfig::new("tcp://localhost:1883", "my-client");
//! let mut transport = MqttTransport::new(&config)?;
//! transport.connect().await?;
//! transport
//!     .subscribe("home/lights", QoS::ExactlyOnce, message_handler(|topic, _| {
//!         println!("message on {topic}");
//!     }))
//!     .await
//!     .ok();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

pub use client::{MqttConnector, MqttTransport};
pub use connection::{BrokerAddress, ConnectionState, MqttError, ReconnectConfig};
pub use health_monitor::{HealthMonitor, LinkEvent, ReconnectionDecision};
pub use message_handler::{AckKind, AckTracker, EventRoute, EventRouter, SubscriptionTable};
