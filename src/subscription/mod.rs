//! Subscriptions and the registry that routes inbound messages to them
//!
//! A subscription is created for one topic filter and has exactly one delivery
//! mode for its whole life:
//!
//! - [`QueueSubscription`] keeps a FIFO that callers drain with `get_message`
//! - [`CallbackSubscription`] hands every message to a user function on the
//!   network thread
//!
//! The [`SubscriptionRegistry`] owns all subscriptions of one communicator and
//! is the dispatch target of the network thread.

use crate::error::CommResult;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod callback;
pub mod queue;
pub mod registry;

pub use callback::CallbackSubscription;
pub use queue::QueueSubscription;
pub use registry::SubscriptionRegistry;

/// An inbound message: payload plus the concrete topic it arrived on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Bytes,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text; invalid UTF-8 sequences are replaced
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// User function invoked for every message of a callback subscription
pub type MessageCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// How messages for a new subscription are delivered
#[derive(Clone)]
pub enum Delivery {
    /// Buffer messages until retrieved with `get_message`
    Queue,
    /// Invoke the callback on the network thread
    Callback(MessageCallback),
}

impl Delivery {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        Delivery::Callback(Arc::new(f))
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Queue => f.write_str("Queue"),
            Delivery::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// Delivery mode tag, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Queue,
    Callback,
}

/// Capability set shared by both delivery modes
pub trait Subscription: Send + Sync {
    /// Filter this subscription was registered under
    fn filter(&self) -> &str;

    fn mode(&self) -> DeliveryMode;

    /// Accept one inbound message (called on the network thread)
    fn add_message(&self, message: Message);

    /// Retrieve the oldest pending message.
    ///
    /// `None` waits without bound.
    fn get_message(&self, timeout: Option<Duration>) -> CommResult<Message>;
}

/// Create the subscription variant requested by `delivery`
pub fn create(filter: &str, delivery: Delivery) -> Arc<dyn Subscription> {
    match delivery {
        Delivery::Queue => Arc::new(QueueSubscription::new(filter)),
        Delivery::Callback(callback) => Arc::new(CallbackSubscription::new(filter, callback)),
    }
}
