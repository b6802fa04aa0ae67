//! Observability for session hosts
//!
//! Structured logging setup and span macros.

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{mqtt_span, session_span};
