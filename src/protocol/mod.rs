//! Topic handling for namespaced sessions
//!
//! Subscriptions and publishes build their topic strings differently; both
//! rules live in [`topics::TopicNamespace`] so the asymmetry stays visible.

pub mod topics;

pub use topics::*;
