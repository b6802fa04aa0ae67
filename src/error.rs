//! Error types for session operations
//!
//! Lifecycle violations get their own variants. Failures reported by the
//! transport are passed through unchanged inside [`SessionError::Transport`].

use thiserror::Error;

/// Main error type for session controller operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("client already started")]
    AlreadyStarted,

    #[error("client not started")]
    ClientNotStarted,

    #[error("client connection failed during start")]
    ConnectionFailed,

    #[error("failed to wait on subscription for topic {topic}")]
    SubscriptionWaitFailed { topic: String },

    #[error("{0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Wrap a transport-native error without altering its message
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(error))
    }

    /// Create subscription wait failure for the effective topic
    pub fn subscription_wait_failed<S: Into<String>>(topic: S) -> Self {
        Self::SubscriptionWaitFailed {
            topic: topic.into(),
        }
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, Error)]
    #[error("conn refused")]
    struct Refused;

    #[test]
    fn test_transport_error_keeps_message() {
        let error = SessionError::transport(Refused);
        assert_eq!(error.to_string(), "conn refused");
        assert!(error.source().is_some());
    }

    #[test]
    fn test_subscription_wait_failed_names_topic() {
        let error = SessionError::subscription_wait_failed("home/lights");
        assert_eq!(
            error.to_string(),
            "failed to wait on subscription for topic home/lights"
        );
    }

    #[test]
    fn test_lifecycle_error_messages() {
        assert_eq!(
            SessionError::AlreadyStarted.to_string(),
            "client already started"
        );
        assert_eq!(
            SessionError::ClientNotStarted.to_string(),
            "client not started"
        );
    }

    #[test]
    fn test_serialization_error_conversion() {
        let parse_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: SessionError = parse_error.into();
        assert!(matches!(error, SessionError::Serialization(_)));
    }
}
