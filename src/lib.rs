//! fast-comm - synchronous publish/subscribe over MQTT
//!
//! A blocking communication layer for distributed agents exchanging opaque
//! string messages through an MQTT broker. The client library is event driven;
//! this crate puts a synchronous API in front of it.
//!
//! # Overview
//!
//! - [`communicator::MqttCommunicator`] - the facade: connect, publish, receive,
//!   manage subscriptions
//! - [`subscription`] - queue and callback subscriptions and the registry that
//!   routes inbound messages to them
//! - [`topics`] - MQTT topic filter matching (`+` and `#` wildcards)
//! - [`transport::mqtt`] - connection manager and its network thread
//! - [`library`] - the process-wide, reference-counted client runtime
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fast_comm::{CommConfig, Communicator, MqttCommunicator};
//! use std::time::Duration;
//!
//! let config = CommConfig::new("", "topic1", "topic1", "localhost", 1883, 60)
//!     .with_connect_timeout(Duration::from_secs(5));
//! let communicator = MqttCommunicator::new(config)?;
//!
//! communicator.send_message("Hallo Welt")?;
//! assert_eq!(communicator.get_message()?, "Hallo Welt");
//!
//! communicator.add_subscription("A/+/B")?;
//! communicator.send_message_to("payload", "A/C/B")?;
//! let payload = communicator.get_message_from("A/+/B", Some(Duration::from_secs(3)))?;
//! # Ok::<(), fast_comm::CommError>(())
//! ```

pub mod communicator;
pub mod config;
pub mod error;
pub mod library;
pub mod observability;
pub mod subscription;
pub mod testing;
pub mod topics;
pub mod transport;

pub use communicator::{Communicator, MqttCommunicator};
pub use config::{CommConfig, ConfigError};
pub use error::{CommError, CommResult};
pub use subscription::{Delivery, Message};
pub use transport::mqtt::ConnectionState;
pub use transport::{QoS, DEFAULT_QOS};
