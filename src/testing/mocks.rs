//! Mock implementations for testing
//!
//! Provides a mock [`BrokerLink`] that records every request and can loop
//! published messages back into a subscription registry, standing in for a
//! broker in tests.

use crate::error::{CommError, CommResult};
use crate::subscription::{Message, SubscriptionRegistry};
use crate::transport::{BrokerLink, QoS};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// One request observed by [`MockBrokerLink`]
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCall {
    Subscribe { filter: String, qos: QoS },
    Unsubscribe { filter: String },
    Publish { topic: String, payload: Bytes, qos: QoS, retain: bool },
    Disconnect,
}

/// Mock broker link for testing
#[derive(Default)]
pub struct MockBrokerLink {
    calls: Mutex<Vec<LinkCall>>,
    should_fail: AtomicBool,
    loopback: Mutex<Option<Weak<SubscriptionRegistry>>>,
}

impl MockBrokerLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent request fail
    pub fn fail_requests(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Deliver published messages to `registry`, as a broker would
    pub fn attach(&self, registry: &Arc<SubscriptionRegistry>) {
        *self.loopback.lock() = Some(Arc::downgrade(registry));
    }

    pub fn calls(&self) -> Vec<LinkCall> {
        self.calls.lock().clone()
    }

    /// Payloads published so far, with their topics
    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                LinkCall::Publish { topic, payload, .. } => Some((topic.clone(), payload.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear_history(&self) {
        self.calls.lock().clear();
    }

    fn failing(&self) -> bool {
        self.should_fail.load(Ordering::SeqCst)
    }
}

impl BrokerLink for MockBrokerLink {
    fn subscribe(&self, filter: &str, qos: QoS) -> CommResult<()> {
        if self.failing() {
            return Err(CommError::subscribe_failure(filter, "Mock subscribe failure"));
        }
        self.calls.lock().push(LinkCall::Subscribe {
            filter: filter.to_string(),
            qos,
        });
        Ok(())
    }

    fn unsubscribe(&self, filter: &str) -> CommResult<()> {
        if self.failing() {
            return Err(CommError::subscribe_failure(
                filter,
                "Mock unsubscribe failure",
            ));
        }
        self.calls.lock().push(LinkCall::Unsubscribe {
            filter: filter.to_string(),
        });
        Ok(())
    }

    fn publish(&self, topic: &str, payload: Bytes, qos: QoS, retain: bool) -> CommResult<()> {
        if self.failing() {
            return Err(CommError::publish_failure(topic, "Mock publish failure"));
        }
        self.calls.lock().push(LinkCall::Publish {
            topic: topic.to_string(),
            payload: payload.clone(),
            qos,
            retain,
        });

        let registry = self.loopback.lock().as_ref().and_then(Weak::upgrade);
        if let Some(registry) = registry {
            registry.dispatch(Message::new(topic, payload));
        }
        Ok(())
    }

    fn request_disconnect(&self) -> CommResult<()> {
        self.calls.lock().push(LinkCall::Disconnect);
        Ok(())
    }
}
