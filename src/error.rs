//! Error types for the communicator
//!
//! Every failure surfaces synchronously from the operation that caused it.
//! Asynchronous notifications from the network thread are logged, never raised.

use std::time::Duration;
use thiserror::Error;

/// Main error type for communicator operations
#[derive(Debug, Error)]
pub enum CommError {
    #[error("Connection timeout: no session established within {timeout:?}")]
    ConnectionTimeout { timeout: Duration },

    #[error("Connection failure: {message}")]
    ConnectionFailure { message: String },

    #[error("Publish failure on topic '{topic}': {message}")]
    PublishFailure { topic: String, message: String },

    #[error("Timeout while waiting for message on '{filter}'")]
    ReceiveTimeout { filter: String },

    #[error("Topic '{filter}' is already subscribed")]
    DuplicateSubscription { filter: String },

    #[error("Topic '{filter}' is not subscribed")]
    SubscriptionNotFound { filter: String },

    #[error("Topic '{filter}' is subscribed with callback")]
    InvalidSubscriptionMode { filter: String },

    #[error("Library initialization failed: {message}")]
    LibraryInitFailure { message: String },

    #[error("Subscription request for '{filter}' failed: {message}")]
    SubscribeFailure { filter: String, message: String },

    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl CommError {
    /// Create connection failure error
    pub fn connection_failure<S: Into<String>>(message: S) -> Self {
        Self::ConnectionFailure {
            message: message.into(),
        }
    }

    /// Create publish failure error
    pub fn publish_failure<T: Into<String>, S: Into<String>>(topic: T, message: S) -> Self {
        Self::PublishFailure {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create subscribe failure error
    pub fn subscribe_failure<F: Into<String>, S: Into<String>>(filter: F, message: S) -> Self {
        Self::SubscribeFailure {
            filter: filter.into(),
            message: message.into(),
        }
    }

    /// Create invalid topic error
    pub fn invalid_topic<T: Into<String>, S: Into<String>>(topic: T, reason: S) -> Self {
        Self::InvalidTopic {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    /// Create library initialization error
    pub fn library_init_failure<S: Into<String>>(message: S) -> Self {
        Self::LibraryInitFailure {
            message: message.into(),
        }
    }
}

/// Result type for communicator operations
pub type CommResult<T> = Result<T, CommError>;
