//! Pure routing decisions for MQTT events
//!
//! The network loop turns every event polled from the client library into an
//! [`EventRoute`] and every transport error into a [`FailureKind`]; neither
//! step performs I/O.

use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::{ConnectionError, Event};

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// CONNACK received
    ConnectionAcknowledged { success: bool, code: String },
    /// PUBLISH received on a subscribed filter
    MessageReceived {
        topic: String,
        payload: Bytes,
        retain: bool,
    },
    /// Broker sent DISCONNECT
    Disconnected { reason: String },
    /// SUBACK received
    SubscriptionConfirmed {
        packet_id: u16,
        reason_codes: Vec<String>,
    },
    /// Infrastructure event (PingResp, PubRec, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled by the client library)
    OutgoingEvent,
}

/// How the network loop treats a transport error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Try again after the retry interval
    Retryable,
    /// Give up with `ConnectionFailure`
    Fatal,
}

pub struct MessageHandler;

impl MessageHandler {
    /// Route an MQTT event to a decision for the network loop
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => EventRoute::ConnectionAcknowledged {
                    success: connack.code == ConnectReturnCode::Success,
                    code: format!("{:?}", connack.code),
                },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.clone(),
                    retain: publish.retain,
                },
                Packet::Disconnect(disconnect) => EventRoute::Disconnected {
                    reason: format!("{:?}", disconnect.reason_code),
                },
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    reason_codes: suback
                        .return_codes
                        .iter()
                        .map(|code| format!("{code:?}"))
                        .collect(),
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Broker refusal is final; socket, timeout and protocol state errors are retried
    pub fn classify_error(error: &ConnectionError) -> FailureKind {
        match error {
            ConnectionError::ConnectionRefused(_) => FailureKind::Fatal,
            _ => FailureKind::Retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::v5::mqttbytes::v5::{
        ConnAck, Disconnect, DisconnectReasonCode, PingResp, Publish,
    };
    use rumqttc::v5::mqttbytes::QoS;
    use std::io;

    #[test]
    fn test_route_connack() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&connack),
            EventRoute::ConnectionAcknowledged {
                success: true,
                code: "Success".to_string()
            }
        );

        let refused = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::NotAuthorized,
            properties: None,
        }));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&refused),
            EventRoute::ConnectionAcknowledged { success: false, .. }
        ));
    }

    #[test]
    fn test_route_disconnect() {
        let disconnect = Event::Incoming(Packet::Disconnect(Disconnect {
            reason_code: DisconnectReasonCode::NormalDisconnection,
            properties: None,
        }));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&disconnect),
            EventRoute::Disconnected { .. }
        ));
    }

    #[test]
    fn test_route_publish() {
        let publish = Event::Incoming(Packet::Publish(Publish {
            dup: false,
            qos: QoS::ExactlyOnce,
            retain: false,
            topic: Bytes::from("A/C/B"),
            pkid: 1,
            payload: Bytes::from("Hallo Welt"),
            properties: None,
        }));

        if let EventRoute::MessageReceived {
            topic,
            payload,
            retain,
        } = MessageHandler::route_mqtt_event(&publish)
        {
            assert_eq!(topic, "A/C/B");
            assert_eq!(payload, Bytes::from("Hallo Welt"));
            assert!(!retain);
        } else {
            panic!("Expected MessageReceived route");
        }
    }

    #[test]
    fn test_route_infrastructure() {
        let ping = Event::Incoming(Packet::PingResp(PingResp));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&ping),
            EventRoute::InfrastructureEvent(_)
        ));
    }

    #[test]
    fn test_classify_error() {
        let refused = ConnectionError::ConnectionRefused(ConnectReturnCode::BadUserNamePassword);
        assert_eq!(MessageHandler::classify_error(&refused), FailureKind::Fatal);

        let io = ConnectionError::Io(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(MessageHandler::classify_error(&io), FailureKind::Retryable);
    }
}
