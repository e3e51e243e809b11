//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for exercising the communicator
//! without requiring an MQTT broker.

pub mod mocks;

pub use mocks::*;
