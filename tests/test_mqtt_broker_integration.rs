//! End-to-end tests against an in-process MQTT broker

mod mqtt_integration_helpers;

use fast_comm::{CommError, Communicator, ConnectionState, Message, MqttCommunicator};
use mqtt_integration_helpers::{broker, settle, unique};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

#[test]
fn test_default_topic_roundtrip() {
    let topic = unique("topic1");
    let communicator = MqttCommunicator::new(broker().config(&topic)).unwrap();
    assert_eq!(communicator.connection_state(), ConnectionState::Connected);
    settle();

    communicator.send_message("Hallo Welt").unwrap();
    assert_eq!(
        communicator
            .get_message_timeout(Duration::from_secs(5))
            .unwrap(),
        "Hallo Welt"
    );
}

#[test]
fn test_generic_communicator_roundtrip() {
    fn roundtrip<C: Communicator>(communicator: &C, message: &str) -> String {
        communicator.send_message(message).unwrap();
        communicator.get_message().unwrap()
    }

    let communicator = MqttCommunicator::new(broker().config(&unique("generic"))).unwrap();
    settle();
    assert_eq!(roundtrip(&communicator, "via trait"), "via trait");
}

#[test]
fn test_receive_timeout_on_quiet_topic() {
    let communicator = MqttCommunicator::new(broker().config(&unique("quiet"))).unwrap();

    let started = Instant::now();
    let result = communicator.get_message_timeout(Duration::from_secs(3));

    assert!(matches!(result, Err(CommError::ReceiveTimeout { .. })));
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[test]
fn test_single_level_wildcard_subscription() {
    let base = unique("A");
    let communicator = MqttCommunicator::new(broker().config(&unique("default"))).unwrap();

    let filter = format!("{base}/+/B");
    communicator.add_subscription(&filter).unwrap();
    settle();
    communicator
        .send_message_to("plus", &format!("{base}/C/B"))
        .unwrap();

    let payload = communicator
        .get_message_from(&filter, Some(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(payload, "plus");
}

#[test]
fn test_multi_level_wildcard_subscription() {
    let base = unique("A");
    let communicator = MqttCommunicator::new(broker().config(&unique("default"))).unwrap();

    let filter = format!("{base}/#");
    communicator.add_subscription(&filter).unwrap();
    settle();
    communicator
        .send_message_to("hash", &format!("{base}/C/B"))
        .unwrap();

    let message = communicator
        .receive_from(&filter, Some(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(message.payload_str(), "hash");
    assert_eq!(message.topic, format!("{base}/C/B"));
}

#[test]
fn test_callback_subscription_between_communicators() {
    let topic = unique("events");
    let listener = MqttCommunicator::new(broker().config(&unique("listener"))).unwrap();
    let sender = MqttCommunicator::new(broker().config(&topic)).unwrap();

    let (tx, rx) = mpsc::channel::<Message>();
    let tx = parking_lot::Mutex::new(tx);
    listener
        .add_callback_subscription(&topic, move |message| {
            let _ = tx.lock().send(message);
        })
        .unwrap();
    settle();

    sender.send_message("ping").unwrap();
    let message = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(message.payload_str(), "ping");

    assert!(matches!(
        listener.get_message_from(&topic, Some(Duration::from_millis(10))),
        Err(CommError::InvalidSubscriptionMode { .. })
    ));
}

#[test]
fn test_callback_can_publish_more_than_request_capacity() {
    const REPLIES: usize = 200;

    let requests = unique("requests");
    let replies = unique("replies");

    let responder = Arc::new(MqttCommunicator::new(broker().config(&unique("responder"))).unwrap());
    let collector = MqttCommunicator::new(broker().config(&replies)).unwrap();
    let requester = MqttCommunicator::new(broker().config(&unique("requester"))).unwrap();

    let handle = Arc::downgrade(&responder);
    let reply_topic = replies.clone();
    let (done_tx, done_rx) = mpsc::channel::<usize>();
    let done_tx = parking_lot::Mutex::new(done_tx);
    responder
        .add_callback_subscription(&requests, move |_request| {
            let Some(responder) = handle.upgrade() else {
                return;
            };
            let sent = (0..REPLIES)
                .filter(|i| {
                    responder
                        .send_message_to(&format!("reply-{i}"), &reply_topic)
                        .is_ok()
                })
                .count();
            let _ = done_tx.lock().send(sent);
        })
        .unwrap();
    settle();

    requester.send_message_to("go", &requests).unwrap();

    // The callback finishes instead of waiting on its own network thread
    let sent = done_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(sent, REPLIES);

    for i in 0..REPLIES {
        let reply = collector
            .get_message_timeout(Duration::from_secs(10))
            .unwrap();
        assert_eq!(reply, format!("reply-{i}"));
    }

    // The responder's network thread is still serving requests
    assert_eq!(responder.connection_state(), ConnectionState::Connected);
    responder.send_message_to("still alive", &replies).unwrap();
    assert_eq!(
        collector
            .get_message_timeout(Duration::from_secs(5))
            .unwrap(),
        "still alive"
    );
}

#[test]
fn test_subscription_bookkeeping() {
    let topic = unique("topic1");
    let communicator = MqttCommunicator::new(broker().config(&topic)).unwrap();

    assert!(matches!(
        communicator.add_subscription(&topic),
        Err(CommError::DuplicateSubscription { .. })
    ));
    assert!(matches!(
        communicator.remove_subscription("never/subscribed"),
        Err(CommError::SubscriptionNotFound { .. })
    ));

    communicator.remove_subscription(&topic).unwrap();
    assert!(communicator.subscriptions().is_empty());
    assert!(matches!(
        communicator.get_message_timeout(Duration::from_millis(10)),
        Err(CommError::SubscriptionNotFound { .. })
    ));
}

#[test]
fn test_disconnect_on_drop_lets_new_sessions_connect() {
    let topic = unique("reuse");
    let first = MqttCommunicator::new(broker().config(&topic)).unwrap();
    assert_eq!(first.connection_state(), ConnectionState::Connected);
    drop(first);

    let second = MqttCommunicator::new(broker().config(&topic)).unwrap();
    settle();
    second.send_message("again").unwrap();
    assert_eq!(
        second.get_message_timeout(Duration::from_secs(5)).unwrap(),
        "again"
    );
}
