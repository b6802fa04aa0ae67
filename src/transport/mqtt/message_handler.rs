//! Pure event routing and acknowledgement bookkeeping for MQTT events
//!
//! The event loop task translates every rumqttc [`Event`] into an
//! [`EventRoute`], then feeds acknowledgements into the [`AckTracker`] and
//! incoming messages into the [`SubscriptionTable`].

use crate::protocol::topic_matches;
use crate::registry::MessageHandler;
use rumqttc::{Event, Outgoing, Packet, QoS, SubscribeReasonCode};
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::debug;

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish/subscribe
    ConnectionAcknowledged,
    /// Message received on a subscribed topic
    MessageReceived { topic: String, payload: Vec<u8> },
    /// Subscribe request written to the network
    SubscribeSent { pkid: u16 },
    /// Broker answered a subscribe request
    SubscriptionAcknowledged { pkid: u16, granted: bool },
    /// QoS 1 or 2 publish written to the network
    PublishSent { pkid: u16 },
    /// QoS 1 publish acknowledged
    PublishAcknowledged { pkid: u16 },
    /// QoS 2 publish handshake finished
    PublishCompleted { pkid: u16 },
    /// Broker disconnected the client
    Disconnected,
    /// Infrastructure event (PingResp, PubRec, etc.)
    InfrastructureEvent(String),
    /// Outgoing event that needs no bookkeeping
    OutgoingEvent,
}

/// Pure message routing decisions based on MQTT events
pub struct EventRouter;

impl EventRouter {
    /// Route MQTT event to the appropriate handling step (pure function)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                },
                Packet::SubAck(suback) => EventRoute::SubscriptionAcknowledged {
                    pkid: suback.pkid,
                    granted: Self::subscription_granted(&suback.return_codes),
                },
                Packet::PubAck(puback) => EventRoute::PublishAcknowledged { pkid: puback.pkid },
                Packet::PubComp(pubcomp) => EventRoute::PublishCompleted { pkid: pubcomp.pkid },
                Packet::Disconnect => EventRoute::Disconnected,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Subscribe(pkid)) => EventRoute::SubscribeSent { pkid: *pkid },
            Event::Outgoing(Outgoing::Publish(pkid)) if *pkid != 0 => {
                EventRoute::PublishSent { pkid: *pkid }
            }
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// A SubAck grants the subscription only if no return code is a failure
    pub fn subscription_granted(return_codes: &[SubscribeReasonCode]) -> bool {
        !return_codes.is_empty()
            && return_codes
                .iter()
                .all(|code| !matches!(code, SubscribeReasonCode::Failure))
    }
}

/// Acknowledgement a caller is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    SubAck,
    PubAck,
    PubComp,
}

impl AckKind {
    /// Acknowledgement ending a publish at the given QoS, if any
    pub fn for_publish(qos: QoS) -> Option<Self> {
        match qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce => Some(AckKind::PubAck),
            QoS::ExactlyOnce => Some(AckKind::PubComp),
        }
    }

    fn follows_publish(self) -> bool {
        matches!(self, AckKind::PubAck | AckKind::PubComp)
    }
}

#[derive(Debug)]
struct PendingAck {
    kind: AckKind,
    pkid: Option<u16>,
    tx: oneshot::Sender<bool>,
}

/// Pairs the single outstanding request with its acknowledgement
///
/// The packet id is unknown when the request is queued; it is bound when the
/// event loop reports the outgoing packet, and only an ack carrying that id
/// completes the wait. Acks for abandoned requests are ignored.
#[derive(Debug, Default)]
pub struct AckTracker {
    pending: Option<PendingAck>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for an ack; resolves to whether the broker granted it
    pub fn expect(&mut self, kind: AckKind) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.pending = Some(PendingAck {
            kind,
            pkid: None,
            tx,
        });
        rx
    }

    /// Bind the packet id of a subscribe that just went out
    pub fn on_subscribe_sent(&mut self, pkid: u16) {
        self.bind(pkid, |kind| kind == AckKind::SubAck);
    }

    /// Bind the packet id of a publish that just went out
    pub fn on_publish_sent(&mut self, pkid: u16) {
        self.bind(pkid, AckKind::follows_publish);
    }

    fn bind(&mut self, pkid: u16, accepts: impl Fn(AckKind) -> bool) {
        if let Some(pending) = self.pending.as_mut() {
            if pending.pkid.is_none() && accepts(pending.kind) {
                pending.pkid = Some(pkid);
            }
        }
    }

    /// Complete the wait if the ack belongs to it; returns whether it did
    pub fn on_ack(&mut self, kind: AckKind, pkid: u16, granted: bool) -> bool {
        let matches = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.kind == kind && pending.pkid == Some(pkid));

        if !matches {
            debug!(target: "mqtt_transport", "Ignoring {:?} for packet {}", kind, pkid);
            return false;
        }

        match self.pending.take() {
            Some(pending) => pending.tx.send(granted).is_ok(),
            None => false,
        }
    }

    /// Abandon the outstanding wait
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    #[cfg(test)]
    fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Subscribed filters and the handlers receiving their messages
#[derive(Default)]
pub struct SubscriptionTable {
    handlers: HashMap<String, MessageHandler>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filter: &str, handler: MessageHandler) {
        self.handlers.insert(filter.to_string(), handler);
    }

    pub fn remove(&mut self, filter: &str) -> Option<MessageHandler> {
        self.handlers.remove(filter)
    }

    pub fn filters(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Invoke every handler whose filter matches; returns how many ran
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> usize {
        let mut delivered = 0;
        for (filter, handler) in &self.handlers {
            if topic_matches(topic, filter) {
                handler(topic, payload);
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::message_handler;
    use rumqttc::{ConnAck, ConnectReturnCode, PubAck, PubComp, Publish, SubAck};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_route_connack_and_disconnect() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));
        assert_eq!(
            EventRouter::route_mqtt_event(&connack),
            EventRoute::ConnectionAcknowledged
        );

        let disconnect = Event::Incoming(Packet::Disconnect);
        assert_eq!(
            EventRouter::route_mqtt_event(&disconnect),
            EventRoute::Disconnected
        );
    }

    #[test]
    fn test_route_publish() {
        let publish = Event::Incoming(Packet::Publish(Publish::new(
            "home/lights",
            QoS::ExactlyOnce,
            "on",
        )));

        assert_eq!(
            EventRouter::route_mqtt_event(&publish),
            EventRoute::MessageReceived {
                topic: "home/lights".to_string(),
                payload: b"on".to_vec(),
            }
        );
    }

    #[test]
    fn test_route_acks() {
        let granted = Event::Incoming(Packet::SubAck(SubAck::new(
            7,
            vec![SubscribeReasonCode::Success(QoS::ExactlyOnce)],
        )));
        assert_eq!(
            EventRouter::route_mqtt_event(&granted),
            EventRoute::SubscriptionAcknowledged {
                pkid: 7,
                granted: true
            }
        );

        let refused = Event::Incoming(Packet::SubAck(SubAck::new(
            8,
            vec![SubscribeReasonCode::Failure],
        )));
        assert_eq!(
            EventRouter::route_mqtt_event(&refused),
            EventRoute::SubscriptionAcknowledged {
                pkid: 8,
                granted: false
            }
        );

        let pubcomp = Event::Incoming(Packet::PubComp(PubComp::new(9)));
        assert_eq!(
            EventRouter::route_mqtt_event(&pubcomp),
            EventRoute::PublishCompleted { pkid: 9 }
        );

        let puback = Event::Incoming(Packet::PubAck(PubAck::new(10)));
        assert_eq!(
            EventRouter::route_mqtt_event(&puback),
            EventRoute::PublishAcknowledged { pkid: 10 }
        );
    }

    #[test]
    fn test_route_outgoing() {
        assert_eq!(
            EventRouter::route_mqtt_event(&Event::Outgoing(Outgoing::Subscribe(3))),
            EventRoute::SubscribeSent { pkid: 3 }
        );
        assert_eq!(
            EventRouter::route_mqtt_event(&Event::Outgoing(Outgoing::Publish(4))),
            EventRoute::PublishSent { pkid: 4 }
        );
        assert_eq!(
            EventRouter::route_mqtt_event(&Event::Outgoing(Outgoing::PingReq)),
            EventRoute::OutgoingEvent
        );
    }

    #[test]
    fn test_subscription_granted() {
        assert!(EventRouter::subscription_granted(&[
            SubscribeReasonCode::Success(QoS::AtLeastOnce)
        ]));
        assert!(!EventRouter::subscription_granted(&[
            SubscribeReasonCode::Success(QoS::ExactlyOnce),
            SubscribeReasonCode::Failure,
        ]));
        assert!(!EventRouter::subscription_granted(&[]));
    }

    #[tokio::test]
    async fn test_ack_tracker_pairs_by_packet_id() {
        let mut tracker = AckTracker::new();
        let rx = tracker.expect(AckKind::SubAck);

        // Ack before the packet id is known does not complete the wait
        assert!(!tracker.on_ack(AckKind::SubAck, 5, true));

        tracker.on_subscribe_sent(5);
        assert!(!tracker.on_ack(AckKind::SubAck, 4, true));
        assert!(!tracker.on_ack(AckKind::PubComp, 5, true));
        assert!(tracker.on_ack(AckKind::SubAck, 5, true));

        assert!(rx.await.unwrap());
        assert!(!tracker.is_pending());
    }

    #[tokio::test]
    async fn test_ack_tracker_reports_rejection() {
        let mut tracker = AckTracker::new();
        let rx = tracker.expect(AckKind::SubAck);
        tracker.on_subscribe_sent(1);
        tracker.on_ack(AckKind::SubAck, 1, false);

        assert!(!rx.await.unwrap());
    }

    #[test]
    fn test_ack_tracker_binds_first_matching_send_only() {
        let mut tracker = AckTracker::new();
        let _rx = tracker.expect(AckKind::PubComp);
        tracker.on_subscribe_sent(10);
        tracker.on_publish_sent(11);
        tracker.on_publish_sent(12);

        assert!(!tracker.on_ack(AckKind::PubComp, 12, true));
        assert!(tracker.on_ack(AckKind::PubComp, 11, true));
    }

    #[test]
    fn test_ack_kind_for_publish() {
        assert_eq!(AckKind::for_publish(QoS::AtMostOnce), None);
        assert_eq!(AckKind::for_publish(QoS::AtLeastOnce), Some(AckKind::PubAck));
        assert_eq!(AckKind::for_publish(QoS::ExactlyOnce), Some(AckKind::PubComp));
    }

    #[tokio::test]
    async fn test_ack_tracker_cancel_closes_receiver() {
        let mut tracker = AckTracker::new();
        let rx = tracker.expect(AckKind::PubComp);
        tracker.cancel();

        assert!(rx.await.is_err());
    }

    #[test]
    fn test_subscription_table_dispatch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut table = SubscriptionTable::new();

        let counter = hits.clone();
        table.insert(
            "home/+",
            message_handler(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let counter = hits.clone();
        table.insert(
            "home/lights",
            message_handler(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(table.dispatch("home/lights", b"on"), 2);
        assert_eq!(table.dispatch("home/temp", b"21"), 1);
        assert_eq!(table.dispatch("garden/temp", b"18"), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        assert!(table.remove("home/+").is_some());
        assert_eq!(table.filters(), vec!["home/lights".to_string()]);
    }
}
