//! Session controller
//!
//! Owns the lifecycle of one transport connection. Subscriptions are placed
//! under the session prefix, while outgoing messages go to the topic the
//! caller names.
//!
//! ```rust,no_run
//! use mqtt_session::registry::HandlerRegistry;
//! use mqtt_session::SessionController;
//!
//! # tokio_test::block_on(async {
//! let handlers = HandlerRegistry::new().with_handler("lights", |topic: &str, payload: &[u8]| {
//!     println!("{topic}: {} bytes", payload.len());
//! });
//!
//! let mut session =
//!     SessionController::new("home", "tcp://localhost:1883", "hub", handlers, None, None);
//! session.start().await?; // subscribes to "home/lights"
//! session.send("foo/bar", "x").await?; // publishes to "foo/bar"
//! # Ok::<(), mqtt_session::SessionError>(())
//! # });
//! ```

use crate::config::{ClientConfig, SessionSettings};
use crate::error::{SessionError, SessionResult};
use crate::events::EventSink;
use crate::protocol::{TopicNamespace, SESSION_QOS};
use crate::registry::HandlerRegistry;
use crate::transport::mqtt::MqttConnector;
use crate::transport::{Connector, Transport, WaitError};
use serde::Serialize;
use tracing::{error, info, Instrument};

/// Observable lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `start` has not been called
    Unstarted,
    /// `start` created a transport but the connection attempt failed
    ConnectFailed,
    /// Connected; operations are forwarded to the transport
    Started,
}

enum Lifecycle<T> {
    Unstarted,
    ConnectFailed(T),
    Started(T),
}

impl<T> Lifecycle<T> {
    fn state(&self) -> SessionState {
        match self {
            Lifecycle::Unstarted => SessionState::Unstarted,
            Lifecycle::ConnectFailed(_) => SessionState::ConnectFailed,
            Lifecycle::Started(_) => SessionState::Started,
        }
    }

    fn handle(&self) -> Option<&T> {
        match self {
            Lifecycle::Unstarted => None,
            Lifecycle::ConnectFailed(handle) | Lifecycle::Started(handle) => Some(handle),
        }
    }
}

/// Prefix-namespaced session over a single transport
pub struct SessionController<C: Connector = MqttConnector> {
    config: ClientConfig,
    namespace: TopicNamespace,
    connector: C,
    registry: HandlerRegistry,
    lifecycle: Lifecycle<C::Transport>,
}

impl SessionController<MqttConnector> {
    /// Create a session with default client settings
    ///
    /// `connection_lost` and `reconnecting` receive the transport's
    /// connection notifications when given.
    pub fn new<P, B, I>(
        prefix: P,
        broker_url: B,
        client_id: I,
        handlers: HandlerRegistry,
        connection_lost: Option<EventSink>,
        reconnecting: Option<EventSink>,
    ) -> Self
    where
        P: Into<String>,
        B: Into<String>,
        I: Into<String>,
    {
        let mut config = ClientConfig::new(broker_url, client_id);
        config.connection_lost = connection_lost;
        config.reconnecting = reconnecting;
        Self::with_config(prefix, handlers, config)
    }

    /// Create a session from a complete client configuration
    pub fn with_config<P: Into<String>>(
        prefix: P,
        handlers: HandlerRegistry,
        config: ClientConfig,
    ) -> Self {
        Self::with_connector(prefix, handlers, config, MqttConnector)
    }

    /// Create a session from a loaded settings file
    pub fn from_settings(settings: &SessionSettings, handlers: HandlerRegistry) -> Self {
        Self::with_config(
            settings.session.prefix.clone(),
            handlers,
            settings.client_config(),
        )
    }
}

impl<C: Connector> SessionController<C> {
    /// Create a session whose transport is built by `connector`
    pub fn with_connector<P: Into<String>>(
        prefix: P,
        handlers: HandlerRegistry,
        config: ClientConfig,
        connector: C,
    ) -> Self {
        Self {
            config,
            namespace: TopicNamespace::new(prefix),
            connector,
            registry: handlers,
            lifecycle: Lifecycle::Unstarted,
        }
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    /// True once `start` created a transport, whether or not it connected
    pub fn has_transport(&self) -> bool {
        self.lifecycle.handle().is_some()
    }

    pub fn transport(&self) -> Option<&C::Transport> {
        self.lifecycle.handle()
    }

    pub fn prefix(&self) -> &str {
        self.namespace.prefix()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Handlers registered by `start`
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Connect and subscribe every handler given at construction
    ///
    /// Succeeds only if the connection and every initial subscription
    /// succeed. A failed connection still keeps the transport, so a second
    /// call reports [`SessionError::AlreadyStarted`].
    pub async fn start(&mut self) -> SessionResult<()> {
        if self.has_transport() {
            return Err(SessionError::AlreadyStarted);
        }

        let mut transport = self
            .connector
            .create(&self.config)
            .map_err(SessionError::transport)?;

        let span = crate::session_span!(
            client_id = %self.config.client_id,
            broker = %self.config.broker_url
        );
        if let Err(e) = transport.connect().instrument(span).await {
            error!("Connection to {} failed: {}", self.config.broker_url, e);
            self.lifecycle = Lifecycle::ConnectFailed(transport);
            return Err(SessionError::transport(e));
        }

        info!("Session connected to {}", self.config.broker_url);
        self.lifecycle = Lifecycle::Started(transport);
        self.register_handlers(&self.registry).await
    }

    /// Subscribe every handler in `handlers` under the session prefix
    ///
    /// Subscriptions are made one at a time and the first failure is
    /// returned. Subscriptions made earlier in the batch stay in place.
    pub async fn register_handlers(&self, handlers: &HandlerRegistry) -> SessionResult<()> {
        let transport = self.connected_transport()?;

        for (topic, handler) in handlers {
            let effective_topic = self.namespace.subscription_topic(topic);
            info!("Subscribing to topic: {}", effective_topic);

            let span = crate::mqtt_span!(topic = %effective_topic);
            match transport
                .subscribe(&effective_topic, SESSION_QOS, handler.clone())
                .instrument(span)
                .await
            {
                Ok(()) => {}
                Err(WaitError::Incomplete) => {
                    return Err(SessionError::subscription_wait_failed(effective_topic));
                }
                Err(WaitError::Failed(e)) => return Err(SessionError::transport(e)),
            }
        }

        Ok(())
    }

    /// Publish `payload` to `topic` exactly as given, without the prefix
    pub async fn send<P: Into<Vec<u8>>>(&self, topic: &str, payload: P) -> SessionResult<()> {
        let transport = self.connected_transport()?;

        transport
            .publish(
                self.namespace.publish_topic(topic),
                SESSION_QOS,
                false,
                payload.into(),
            )
            .await
            .map_err(SessionError::transport)
    }

    /// Serialize `value` as JSON and [`send`](Self::send) it
    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        value: &T,
    ) -> SessionResult<()> {
        let payload = serde_json::to_vec(value)?;
        self.send(topic, payload).await
    }

    fn connected_transport(&self) -> SessionResult<&C::Transport> {
        match &self.lifecycle {
            Lifecycle::Started(transport) => Ok(transport),
            Lifecycle::ConnectFailed(_) => Err(SessionError::ConnectionFailed),
            Lifecycle::Unstarted => Err(SessionError::ClientNotStarted),
        }
    }
}
