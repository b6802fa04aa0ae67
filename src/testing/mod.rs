//! Testing utilities and mock implementations
//!
//! Lets session behaviour be exercised without an MQTT broker.

pub mod mocks;

pub use mocks::*;
