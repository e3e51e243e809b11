//! MQTT v5 connection manager
//!
//! The module separates pure decisions from I/O:
//!
//! - [`connection`] - broker options, retry policy and the connect signal
//! - [`message_handler`] - pure routing of client library events and errors
//! - [`client`] - the network thread and caller-side broker requests
//!
//! # Usage
//!
//! ```rust,no_run
//! use fast_comm::config::CommConfig;
//! use fast_comm::library::LibraryHandle;
//! use fast_comm::subscription::SubscriptionRegistry;
//! use fast_comm::transport::mqtt::ConnectionManager;
//! use std::sync::Arc;
//!
//! let config = CommConfig::new("agent-1", "topic1", "topic1", "localhost", 1883, 60);
//! let library = LibraryHandle::acquire()?;
//! let manager = ConnectionManager::new(&config, library.runtime().clone())?;
//! let registry = Arc::new(SubscriptionRegistry::new(manager.link()));
//! manager.connect(registry)?;
//! manager.disconnect();
//! # Ok::<(), fast_comm::CommError>(())
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::{ConnectionManager, MqttLink, DISCONNECT_GRACE};
pub use connection::{ConnectionState, RetryPolicy, SessionSignal};
pub use message_handler::{EventRoute, FailureKind, MessageHandler};
