//! MQTT session controller
//!
//! A thin controller over an MQTT client connection that:
//! - connects once and subscribes an initial set of topic handlers
//! - places every subscription under a configurable prefix
//! - publishes messages to the exact topic given, at QoS 2 without retain
//! - reports lifecycle misuse and transport failures as distinct errors
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mqtt_session::events::{event_channel, ConnectionEvent};
//! use mqtt_session::registry::HandlerRegistry;
//! use mqtt_session::SessionController;
//!
//! # tokio_test::block_on(async {
//! let (lost_tx, mut lost_rx) = event_channel();
//! let handlers = HandlerRegistry::new()
//!     .with_handler("lights", |topic: &str, payload: &[u8]| {
//!         println!("{topic} -> {}", String::from_utf8_lossy(payload));
//!     });
//!
//! let mut session = SessionController::new(
//!     "home",
//!     "tcp://localhost:1883",
//!     "hub",
//!     handlers,
//!     Some(lost_tx),
//!     None,
//! );
//! session.start().await?;
//! session.send("home/lights/set", "on").await?;
//!
//! if let Some(ConnectionEvent::ConnectionLost { reason }) = lost_rx.recv().await {
//!     eprintln!("connection lost: {reason}");
//! }
//! # Ok::<(), mqtt_session::SessionError>(())
//! # });
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod observability;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{ClientConfig, ConfigError, SessionSettings};
pub use error::{SessionError, SessionResult};
pub use events::{event_channel, ConnectionEvent, EventSink, EventStream};
pub use protocol::{TopicNamespace, SESSION_QOS};
pub use registry::{message_handler, HandlerRegistry, MessageHandler};
pub use session::{SessionController, SessionState};
pub use transport::mqtt::{MqttConnector, MqttTransport};
pub use transport::{Connector, Transport, WaitError};
