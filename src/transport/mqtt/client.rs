//! Impure I/O operations for the MQTT transport
//!
//! This module owns the rumqttc client handle, runs the event loop task and
//! turns request/acknowledgement pairs into awaitable operations.

use super::connection::{
    configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig, REQUEST_CHANNEL_CAPACITY,
};
use super::health_monitor::{HealthMonitor, LinkEvent, ReconnectionDecision};
use super::message_handler::{AckKind, AckTracker, EventRoute, EventRouter, SubscriptionTable};
use crate::config::ClientConfig;
use crate::events::{notify, ConnectionEvent, EventSink};
use crate::registry::MessageHandler;
use crate::transport::{Connector, Transport, WaitError};
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectionError, EventLoop, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// State shared between the transport handle and its event loop task
#[derive(Default)]
struct SharedState {
    acks: Mutex<AckTracker>,
    subscriptions: RwLock<SubscriptionTable>,
}

/// Everything the event loop task needs besides the event loop itself
struct EventLoopContext {
    client_id: String,
    state_tx: watch::Sender<ConnectionState>,
    shared: Arc<SharedState>,
    reconnect_config: ReconnectConfig,
    connection_lost: Option<EventSink>,
    reconnecting: Option<EventSink>,
}

/// MQTT transport backed by rumqttc
pub struct MqttTransport {
    client_id: String,
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    shared: Arc<SharedState>,
    reconnect_config: ReconnectConfig,
    connect_timeout: Duration,
    ack_timeout: Duration,
    connection_lost: Option<EventSink>,
    reconnecting: Option<EventSink>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    event_loop_handle: Option<JoinHandle<()>>,
    // One outstanding subscribe or publish at a time
    op_lock: Mutex<()>,
}

impl MqttTransport {
    /// Create an unconnected transport from the client configuration
    pub fn new(config: &ClientConfig) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        Ok(Self {
            client_id: config.client_id.clone(),
            client,
            event_loop: Mutex::new(Some(event_loop)),
            shared: Arc::new(SharedState::default()),
            reconnect_config: ReconnectConfig::from_client_config(config),
            connect_timeout: config.connect_timeout,
            ack_timeout: config.ping_timeout,
            connection_lost: config.connection_lost.clone(),
            reconnecting: config.reconnecting.clone(),
            state_rx: None,
            shutdown_tx: None,
            event_loop_handle: None,
            op_lock: Mutex::new(()),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Get current connection state
    /// Returns None if connect() has not been called yet
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    /// Filters with a registered handler
    pub async fn subscribed_filters(&self) -> Vec<String> {
        self.shared.subscriptions.read().await.filters()
    }

    /// Create connection state and shutdown channels
    #[allow(clippy::type_complexity)]
    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (watch::Sender<bool>, watch::Receiver<bool>),
    ) {
        let state_channels = watch::channel(ConnectionState::Connecting);
        let shutdown_channels = watch::channel(false);
        (state_channels, shutdown_channels)
    }

    /// Wait for the broker's ConnAck, bounded by `timeout`
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailed(
                        "Connection state channel closed".to_string(),
                    ));
                }
                match *state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(ref reason)
                    | ConnectionState::PermanentlyDisconnected(ref reason) => {
                        return Err(MqttError::ConnectionFailed(reason.clone()));
                    }
                    ConnectionState::Connecting | ConnectionState::Reconnecting(_) => continue,
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectionFailed(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    /// Check connection state before operations
    fn check_connection_state(&self) -> Result<(), MqttError> {
        let current_state = self
            .connection_state()
            .unwrap_or_else(|| ConnectionState::Disconnected("connect() not called".to_string()));

        if !current_state.accepts_requests() {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }

        Ok(())
    }

    /// Await an acknowledgement; None when it did not arrive in time
    async fn await_ack(&self, ack_rx: oneshot::Receiver<bool>) -> Option<bool> {
        match tokio::time::timeout(self.ack_timeout, ack_rx).await {
            Ok(Ok(granted)) => Some(granted),
            Ok(Err(_)) | Err(_) => {
                self.shared.acks.lock().await.cancel();
                None
            }
        }
    }

    /// Signal the event loop task to stop
    fn signal_shutdown(&self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
    }
}

/// Drive the rumqttc event loop until shutdown or an unrecoverable error
async fn run_event_loop(
    mut event_loop: EventLoop,
    context: EventLoopContext,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("Starting MQTT event loop for client: {}", context.client_id);
    let mut ever_connected = false;
    let mut reconnect_attempts = 0u32;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown signal received, stopping event loop");
                    break;
                }
            }

            event_result = event_loop.poll() => {
                match event_result {
                    Ok(event) => {
                        let route = EventRouter::route_mqtt_event(&event);
                        context
                            .process_event_route(
                                route,
                                &mut ever_connected,
                                &mut reconnect_attempts,
                            )
                            .await;
                    }
                    Err(e) => {
                        if !context
                            .handle_event_loop_error(
                                e,
                                ever_connected,
                                &mut reconnect_attempts,
                                shutdown_rx.clone(),
                            )
                            .await
                        {
                            break;
                        }
                    }
                }
            }
        }
    }

    info!("MQTT event loop stopped for client: {}", context.client_id);
}

impl EventLoopContext {
    async fn process_event_route(
        &self,
        route: EventRoute,
        ever_connected: &mut bool,
        reconnect_attempts: &mut u32,
    ) {
        match route {
            EventRoute::ConnectionAcknowledged => {
                let _ = self
                    .state_tx
                    .send(HealthMonitor::determine_next_state(LinkEvent::ConnAckReceived));
                if *ever_connected {
                    notify(self.reconnecting.as_ref(), ConnectionEvent::Reconnected);
                }
                *ever_connected = true;
                *reconnect_attempts = 0;
            }
            EventRoute::MessageReceived { topic, payload } => {
                debug!(target: "mqtt_transport", "Received MQTT message on topic: {}", topic);
                let delivered = self
                    .shared
                    .subscriptions
                    .read()
                    .await
                    .dispatch(&topic, &payload);
                if delivered == 0 {
                    warn!("No handler registered for topic: {}", topic);
                }
            }
            EventRoute::SubscribeSent { pkid } => {
                self.shared.acks.lock().await.on_subscribe_sent(pkid);
            }
            EventRoute::SubscriptionAcknowledged { pkid, granted } => {
                self.shared
                    .acks
                    .lock()
                    .await
                    .on_ack(AckKind::SubAck, pkid, granted);
            }
            EventRoute::PublishSent { pkid } => {
                self.shared.acks.lock().await.on_publish_sent(pkid);
            }
            EventRoute::PublishAcknowledged { pkid } => {
                self.shared
                    .acks
                    .lock()
                    .await
                    .on_ack(AckKind::PubAck, pkid, true);
            }
            EventRoute::PublishCompleted { pkid } => {
                self.shared
                    .acks
                    .lock()
                    .await
                    .on_ack(AckKind::PubComp, pkid, true);
            }
            EventRoute::Disconnected => {
                let _ = self
                    .state_tx
                    .send(HealthMonitor::determine_next_state(LinkEvent::DisconnectedByBroker));
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
            }
            EventRoute::OutgoingEvent => {}
        }
    }

    /// Returns true to keep polling (rumqttc re-dials on the next poll)
    async fn handle_event_loop_error(
        &self,
        error: ConnectionError,
        ever_connected: bool,
        reconnect_attempts: &mut u32,
        shutdown_rx: watch::Receiver<bool>,
    ) -> bool {
        let reason = error.to_string();
        let was_connected = matches!(*self.state_tx.borrow(), ConnectionState::Connected);
        let _ = self
            .state_tx
            .send(HealthMonitor::determine_next_state(LinkEvent::NetworkError(
                reason.clone(),
            )));

        if was_connected {
            notify(
                self.connection_lost.as_ref(),
                ConnectionEvent::ConnectionLost {
                    reason: reason.clone(),
                },
            );
        }

        let decision = HealthMonitor::should_attempt_reconnection(
            *reconnect_attempts,
            ever_connected,
            &self.reconnect_config,
            *shutdown_rx.borrow(),
        );

        match decision {
            ReconnectionDecision::Proceed { attempt, delay } => {
                *reconnect_attempts = attempt;
                let _ = self
                    .state_tx
                    .send(HealthMonitor::determine_next_state(LinkEvent::ReconnectionStarted(
                        attempt,
                    )));
                notify(
                    self.reconnecting.as_ref(),
                    ConnectionEvent::Reconnecting { attempt },
                );
                info!(
                    "Attempting reconnection {} after {}ms delay",
                    attempt,
                    delay.as_millis()
                );
                interruptible_sleep(shutdown_rx, delay).await
            }
            ReconnectionDecision::AbortNeverConnected => {
                error!(
                    "Initial connection for client {} failed: {}",
                    self.client_id, reason
                );
                false
            }
            ReconnectionDecision::AbortReconnectDisabled => {
                let _ = self
                    .state_tx
                    .send(HealthMonitor::determine_next_state(LinkEvent::PermanentFailure(
                        reason,
                    )));
                false
            }
            ReconnectionDecision::AbortShutdownRequested => {
                info!("Shutdown signal received, stopping reconnection");
                false
            }
        }
    }
}

/// Sleep unless shutdown is requested first
/// Returns true if sleep completed, false if shutdown requested
async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        changed = shutdown_rx.changed() => {
            if changed.is_err() || *shutdown_rx.borrow() {
                info!("Shutdown signal received during reconnection delay, stopping");
                return false;
            }
            true
        }
        _ = tokio::time::sleep(delay) => true,
    }
}

#[async_trait]
impl Transport for MqttTransport {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        let event_loop = self.event_loop.get_mut().take().ok_or_else(|| {
            MqttError::ConnectionFailed("Event loop already started".to_string())
        })?;

        let ((state_tx, state_rx), (shutdown_tx, shutdown_rx)) =
            Self::setup_connection_channels();
        self.state_rx = Some(state_rx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let context = EventLoopContext {
            client_id: self.client_id.clone(),
            state_tx,
            shared: self.shared.clone(),
            reconnect_config: self.reconnect_config.clone(),
            connection_lost: self.connection_lost.clone(),
            reconnecting: self.reconnecting.clone(),
        };
        self.event_loop_handle = Some(tokio::spawn(run_event_loop(
            event_loop,
            context,
            shutdown_rx,
        )));

        let result = Self::wait_for_connection_confirmation(state_rx, self.connect_timeout).await;
        if result.is_err() {
            self.signal_shutdown();
        }
        result
    }

    async fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
        handler: MessageHandler,
    ) -> Result<(), WaitError<Self::Error>> {
        self.check_connection_state().map_err(WaitError::Failed)?;
        let _op = self.op_lock.lock().await;

        // Handler goes in first so retained messages arriving with the SubAck are routed
        self.shared
            .subscriptions
            .write()
            .await
            .insert(topic, handler);
        let ack_rx = self.shared.acks.lock().await.expect(AckKind::SubAck);

        if let Err(e) = self.client.subscribe(topic, qos).await {
            self.shared.acks.lock().await.cancel();
            self.shared.subscriptions.write().await.remove(topic);
            return Err(WaitError::Failed(MqttError::SubscribeRequestFailed(e)));
        }

        match self.await_ack(ack_rx).await {
            Some(true) => {
                debug!(target: "mqtt_transport", "Subscription confirmed: {}", topic);
                Ok(())
            }
            Some(false) => {
                self.shared.subscriptions.write().await.remove(topic);
                Err(WaitError::Failed(MqttError::SubscriptionRejected {
                    topic: topic.to_string(),
                }))
            }
            None => {
                warn!("No SubAck received for topic: {}", topic);
                Err(WaitError::Incomplete)
            }
        }
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), Self::Error> {
        self.check_connection_state()?;
        let _op = self.op_lock.lock().await;

        let Some(ack_kind) = AckKind::for_publish(qos) else {
            return self
                .client
                .publish(topic, qos, retain, payload)
                .await
                .map_err(MqttError::PublishRequestFailed);
        };

        let ack_rx = self.shared.acks.lock().await.expect(ack_kind);
        if let Err(e) = self.client.publish(topic, qos, retain, payload).await {
            self.shared.acks.lock().await.cancel();
            return Err(MqttError::PublishRequestFailed(e));
        }

        match self.await_ack(ack_rx).await {
            Some(_) => {
                debug!(target: "mqtt_transport", "Publish to {} completed", topic);
                Ok(())
            }
            None => Err(MqttError::PublishNotAcknowledged {
                topic: topic.to_string(),
            }),
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.signal_shutdown();

        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}

/// Creates [`MqttTransport`]s for a session
#[derive(Debug, Clone, Copy, Default)]
pub struct MqttConnector;

impl Connector for MqttConnector {
    type Transport = MqttTransport;

    fn create(&self, config: &ClientConfig) -> Result<MqttTransport, MqttError> {
        MqttTransport::new(config)
    }
}
