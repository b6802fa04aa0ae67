//! Mock implementations for testing
//!
//! [`MockConnector`] hands out [`MockTransport`]s that record every call and
//! fail on demand, so session behaviour can be tested without a broker.

use crate::config::ClientConfig;
use crate::protocol::topic_matches;
use crate::registry::MessageHandler;
use crate::transport::{Connector, Transport, WaitError};
use async_trait::async_trait;
use rumqttc::QoS;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Error produced by the mock transport; displays the configured message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MockTransportError(pub String);

impl MockTransportError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self(message.into())
    }
}

/// How a configured subscribe call fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// The transport reports an error
    Error(String),
    /// The acknowledgement wait does not complete
    NoAck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeCall {
    pub topic: String,
    pub qos: QoS,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishCall {
    pub topic: String,
    pub qos: QoS,
    pub retain: bool,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
struct MockBehavior {
    create_failure: Option<String>,
    connect_failure: Option<String>,
    /// 1-based subscribe call that fails
    subscribe_failure: Option<(usize, MockFailure)>,
    publish_failure: Option<String>,
}

/// Call history shared by a connector and every transport it creates
#[derive(Default)]
struct MockRecord {
    instantiations: AtomicUsize,
    connect_calls: AtomicUsize,
    subscribe_calls: Mutex<Vec<SubscribeCall>>,
    publish_calls: Mutex<Vec<PublishCall>>,
    handlers: Mutex<Vec<(String, MessageHandler)>>,
}

/// Mock connector for testing
#[derive(Clone, Default)]
pub struct MockConnector {
    behavior: MockBehavior,
    record: Arc<MockRecord>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail transport instantiation with `message`
    pub fn with_create_failure<S: Into<String>>(mut self, message: S) -> Self {
        self.behavior.create_failure = Some(message.into());
        self
    }

    /// Fail every connect with `message`
    pub fn with_connect_failure<S: Into<String>>(mut self, message: S) -> Self {
        self.behavior.connect_failure = Some(message.into());
        self
    }

    /// Fail the `call`-th subscribe (1-based, counted across the connector)
    pub fn with_subscribe_failure(mut self, call: usize, failure: MockFailure) -> Self {
        self.behavior.subscribe_failure = Some((call, failure));
        self
    }

    /// Fail every publish with `message`
    pub fn with_publish_failure<S: Into<String>>(mut self, message: S) -> Self {
        self.behavior.publish_failure = Some(message.into());
        self
    }

    pub fn instantiation_count(&self) -> usize {
        self.record.instantiations.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.record.connect_calls.load(Ordering::SeqCst)
    }

    pub async fn subscribe_calls(&self) -> Vec<SubscribeCall> {
        self.record.subscribe_calls.lock().await.clone()
    }

    pub async fn subscribed_topics(&self) -> Vec<String> {
        self.record
            .subscribe_calls
            .lock()
            .await
            .iter()
            .map(|call| call.topic.clone())
            .collect()
    }

    pub async fn publish_calls(&self) -> Vec<PublishCall> {
        self.record.publish_calls.lock().await.clone()
    }

    /// Route an incoming message to every accepted subscription it matches
    /// Returns the number of handlers invoked
    pub async fn deliver(&self, topic: &str, payload: &[u8]) -> usize {
        let handlers = self.record.handlers.lock().await;
        let mut delivered = 0;
        for (filter, handler) in handlers.iter() {
            if topic_matches(topic, filter) {
                handler(topic, payload);
                delivered += 1;
            }
        }
        delivered
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn create(&self, _config: &ClientConfig) -> Result<MockTransport, MockTransportError> {
        if let Some(message) = &self.behavior.create_failure {
            return Err(MockTransportError::new(message.clone()));
        }

        self.record.instantiations.fetch_add(1, Ordering::SeqCst);
        Ok(MockTransport {
            behavior: self.behavior.clone(),
            record: self.record.clone(),
            connected: false,
        })
    }
}

/// Mock transport for testing
pub struct MockTransport {
    behavior: MockBehavior,
    record: Arc<MockRecord>,
    connected: bool,
}

impl MockTransport {
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        self.record.connect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.behavior.connect_failure {
            return Err(MockTransportError::new(message.clone()));
        }

        self.connected = true;
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
        handler: MessageHandler,
    ) -> Result<(), WaitError<Self::Error>> {
        let call_number = {
            let mut calls = self.record.subscribe_calls.lock().await;
            calls.push(SubscribeCall {
                topic: topic.to_string(),
                qos,
            });
            calls.len()
        };

        match &self.behavior.subscribe_failure {
            Some((call, MockFailure::Error(message))) if *call == call_number => {
                Err(WaitError::Failed(MockTransportError::new(message.clone())))
            }
            Some((call, MockFailure::NoAck)) if *call == call_number => Err(WaitError::Incomplete),
            _ => {
                self.record
                    .handlers
                    .lock()
                    .await
                    .push((topic.to_string(), handler));
                Ok(())
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
        self.record.publish_calls.lock().await.push(PublishCall {
            topic: topic.to_string(),
            qos,
            retain,
            payload,
        });

        match &self.behavior.publish_failure {
            Some(message) => Err(MockTransportError::new(message.clone())),
            None => Ok(()),
        }
    }
}
