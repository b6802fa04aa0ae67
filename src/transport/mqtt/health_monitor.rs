//! Pure connection-state transitions and reconnection decisions
//!
//! The event loop task asks these functions what to do; it performs the
//! resulting I/O itself.

use super::connection::{ConnectionState, ReconnectConfig};
use std::time::Duration;
use tracing::{error, info, warn};

/// Connection lifecycle events observed by the event loop
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    ConnAckReceived,
    DisconnectedByBroker,
    NetworkError(String),
    ReconnectionStarted(u32),
    PermanentFailure(String),
}

/// Decision about re-dialling after a connection error
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectionDecision {
    Proceed { attempt: u32, delay: Duration },
    /// The connection never came up; the initial connect reports the error
    AbortNeverConnected,
    AbortReconnectDisabled,
    AbortShutdownRequested,
}

/// Pure health monitoring and reconnection decision logic
pub struct HealthMonitor;

impl HealthMonitor {
    /// Determine if reconnection should be attempted (pure function)
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        ever_connected: bool,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }
        if !ever_connected {
            return ReconnectionDecision::AbortNeverConnected;
        }
        if !config.enabled {
            return ReconnectionDecision::AbortReconnectDisabled;
        }

        let attempt = current_attempts.saturating_add(1);
        ReconnectionDecision::Proceed {
            attempt,
            delay: config.calculate_backoff_delay(attempt),
        }
    }

    /// Determine next state after a connection event (pure function)
    pub fn determine_next_state(event: LinkEvent) -> ConnectionState {
        match event {
            LinkEvent::ConnAckReceived => {
                info!("MQTT client connected successfully");
                ConnectionState::Connected
            }
            LinkEvent::DisconnectedByBroker => {
                warn!("MQTT broker disconnected client");
                ConnectionState::Disconnected("Broker disconnected".to_string())
            }
            LinkEvent::NetworkError(reason) => {
                error!("MQTT event loop error: {}", reason);
                ConnectionState::Disconnected(reason)
            }
            LinkEvent::ReconnectionStarted(attempt) => {
                info!("Starting reconnection attempt {}", attempt);
                ConnectionState::Reconnecting(attempt)
            }
            LinkEvent::PermanentFailure(reason) => {
                error!("Permanent connection failure: {}", reason);
                ConnectionState::PermanentlyDisconnected(reason)
            }
        }
    }
}
