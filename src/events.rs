//! Connection notifications delivered from the transport to the session owner
//!
//! The transport runs its own event loop task. Instead of invoking arbitrary
//! callbacks on that task, it pushes [`ConnectionEvent`]s into channels that
//! the owner of the session drains at its own pace.

use tokio::sync::mpsc;

/// Notification emitted by the transport about the state of its connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// An established connection dropped
    ConnectionLost { reason: String },
    /// The transport is about to re-dial the broker
    Reconnecting { attempt: u32 },
    /// The broker acknowledged a reconnect; subscriptions of a clean
    /// session are gone and have to be registered again
    Reconnected,
}

/// Sending half handed to the transport through the client configuration
pub type EventSink = mpsc::UnboundedSender<ConnectionEvent>;

/// Receiving half drained by the session owner
pub type EventStream = mpsc::UnboundedReceiver<ConnectionEvent>;

/// Create a notification channel
pub fn event_channel() -> (EventSink, EventStream) {
    mpsc::unbounded_channel()
}

/// Deliver an event if a sink is configured; a dropped receiver is ignored
pub(crate) fn notify(sink: Option<&EventSink>, event: ConnectionEvent) {
    if let Some(sink) = sink {
        let _ = sink.send(event);
    }
}
