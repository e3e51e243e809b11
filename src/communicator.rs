//! The communicator facade
//!
//! [`MqttCommunicator`] is the synchronous API callers use: construction
//! connects to the broker and subscribes the default topic, the `send_*`
//! methods publish, the `get_*`/`receive_*` methods block on queue
//! subscriptions, and dropping it disconnects.

use crate::config::CommConfig;
use crate::error::CommResult;
use crate::library::LibraryHandle;
use crate::subscription::{Delivery, Message, SubscriptionRegistry};
use crate::topics::validate_topic;
use crate::transport::mqtt::{ConnectionManager, ConnectionState};
use crate::transport::{BrokerLink, QoS, DEFAULT_QOS};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Minimal send/receive interface shared by communicator implementations
pub trait Communicator {
    /// Publish `message` to the default publish topic
    fn send_message(&self, message: &str) -> CommResult<()>;

    /// Block until a message arrives on the default subscription
    fn get_message(&self) -> CommResult<String>;
}

/// Synchronous MQTT communicator.
///
/// Safe to share between threads; every method takes `&self`.
pub struct MqttCommunicator {
    config: CommConfig,
    registry: Arc<SubscriptionRegistry>,
    manager: ConnectionManager,
    // Dropped last so the runtime outlives the network thread
    _library: LibraryHandle,
}

impl MqttCommunicator {
    /// Connect to the broker and subscribe the default topic.
    ///
    /// Blocks until the session is established. Fails with
    /// `ConnectionTimeout` when the configured connect timeout elapses first.
    pub fn new(config: CommConfig) -> CommResult<Self> {
        config.validate()?;
        let library = LibraryHandle::acquire()?;

        let span = crate::mqtt_span!(
            operation = "connect",
            host = %config.broker.host,
            port = config.broker.port
        );
        let _entered = span.enter();

        let manager = ConnectionManager::new(&config, library.runtime().clone())?;
        let registry = Arc::new(SubscriptionRegistry::new(manager.link()));
        manager.connect(registry.clone())?;

        let communicator = Self {
            config,
            registry,
            manager,
            _library: library,
        };
        communicator.add_subscription(&communicator.config.communicator.subscribe_topic)?;

        info!(
            client_id = %communicator.manager.client_id(),
            subscribe_topic = %communicator.config.communicator.subscribe_topic,
            publish_topic = %communicator.config.communicator.publish_topic,
            "Communicator ready"
        );
        Ok(communicator)
    }

    pub fn config(&self) -> &CommConfig {
        &self.config
    }

    pub fn client_id(&self) -> &str {
        self.manager.client_id()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Publish to `topic` at the default delivery guarantee.
    ///
    /// Success means the client library accepted the message, not that the
    /// broker acknowledged it.
    pub fn send_message_to(&self, message: &str, topic: &str) -> CommResult<()> {
        self.send_message_with_qos(message, topic, DEFAULT_QOS)
    }

    pub fn send_message_with_qos(&self, message: &str, topic: &str, qos: QoS) -> CommResult<()> {
        validate_topic(topic)?;
        self.manager
            .link()
            .publish(topic, Bytes::copy_from_slice(message.as_bytes()), qos, false)?;
        debug!(topic = %topic, bytes = message.len(), "Message handed to client library");
        Ok(())
    }

    /// Wait up to `timeout` for a message on the default subscription
    pub fn get_message_timeout(&self, timeout: Duration) -> CommResult<String> {
        self.receive_from(&self.config.communicator.subscribe_topic, Some(timeout))
            .map(|m| m.payload_str())
    }

    /// Wait for a message on the subscription registered under `filter`.
    ///
    /// `None` waits without bound.
    pub fn get_message_from(&self, filter: &str, timeout: Option<Duration>) -> CommResult<String> {
        self.receive_from(filter, timeout).map(|m| m.payload_str())
    }

    /// Like `get_message` but returns the concrete topic along with the payload
    pub fn receive(&self) -> CommResult<Message> {
        self.receive_from(&self.config.communicator.subscribe_topic, None)
    }

    pub fn receive_timeout(&self, timeout: Duration) -> CommResult<Message> {
        self.receive_from(&self.config.communicator.subscribe_topic, Some(timeout))
    }

    pub fn receive_from(&self, filter: &str, timeout: Option<Duration>) -> CommResult<Message> {
        let subscription = self.registry.get(filter)?;
        subscription.get_message(timeout)
    }

    /// Subscribe `filter` in queue mode
    pub fn add_subscription(&self, filter: &str) -> CommResult<()> {
        self.add_subscription_with_qos(filter, DEFAULT_QOS)
    }

    pub fn add_subscription_with_qos(&self, filter: &str, qos: QoS) -> CommResult<()> {
        self.registry.add(filter, qos, Delivery::Queue)
    }

    /// Subscribe `filter` in callback mode.
    ///
    /// The callback runs on the network thread and stalls further dispatch
    /// until it returns. It must not add or remove subscriptions.
    pub fn add_callback_subscription<F>(&self, filter: &str, callback: F) -> CommResult<()>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.add_callback_subscription_with_qos(filter, callback, DEFAULT_QOS)
    }

    pub fn add_callback_subscription_with_qos<F>(
        &self,
        filter: &str,
        callback: F,
        qos: QoS,
    ) -> CommResult<()>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.registry.add(filter, qos, Delivery::callback(callback))
    }

    pub fn remove_subscription(&self, filter: &str) -> CommResult<()> {
        self.registry.remove(filter)
    }

    /// Filters currently subscribed, sorted
    pub fn subscriptions(&self) -> Vec<String> {
        self.registry.filters()
    }
}

impl Communicator for MqttCommunicator {
    fn send_message(&self, message: &str) -> CommResult<()> {
        self.send_message_to(message, &self.config.communicator.publish_topic)
    }

    fn get_message(&self) -> CommResult<String> {
        self.get_message_from(&self.config.communicator.subscribe_topic, None)
    }
}

impl Drop for MqttCommunicator {
    fn drop(&mut self) {
        self.manager.disconnect();
        info!(client_id = %self.manager.client_id(), "Communicator closed");
    }
}

impl std::fmt::Debug for MqttCommunicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttCommunicator")
            .field("client_id", &self.manager.client_id())
            .field("state", &self.manager.state())
            .field("subscriptions", &self.registry.filters())
            .finish()
    }
}
