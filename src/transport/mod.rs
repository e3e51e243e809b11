//! Transport layer for communicator traffic
//!
//! The [`BrokerLink`] trait is the request side of a broker session: callers
//! queue SUBSCRIBE, UNSUBSCRIBE, PUBLISH and DISCONNECT requests through it,
//! while the network thread owns the event loop that actually performs them.
//! The abstraction lets the subscription registry be tested without a broker.

use crate::error::CommResult;
use bytes::Bytes;

pub mod mqtt;

pub use rumqttc::v5::mqttbytes::QoS;

/// Delivery guarantee used unless a caller overrides it
pub const DEFAULT_QOS: QoS = QoS::ExactlyOnce;

/// Request handle onto a broker session
pub trait BrokerLink: Send + Sync {
    /// Queue a SUBSCRIBE request for `filter`
    fn subscribe(&self, filter: &str, qos: QoS) -> CommResult<()>;

    /// Queue an UNSUBSCRIBE request for `filter`
    fn unsubscribe(&self, filter: &str) -> CommResult<()>;

    /// Hand a message to the transport; success does not imply broker acknowledgment
    fn publish(&self, topic: &str, payload: Bytes, qos: QoS, retain: bool) -> CommResult<()>;

    /// Ask for a graceful DISCONNECT without blocking
    fn request_disconnect(&self) -> CommResult<()>;
}
