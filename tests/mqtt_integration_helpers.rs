//! MQTT integration test helpers
//!
//! Starts one in-process rumqttd broker per test binary on a free loopback
//! port, so broker scenarios run without an external service.

#![allow(dead_code)]

use fast_comm::CommConfig;
use once_cell::sync::Lazy;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

/// How long to wait for the embedded broker to accept connections
const BROKER_STARTUP: Duration = Duration::from_secs(10);

static BROKER: Lazy<EmbeddedBroker> = Lazy::new(EmbeddedBroker::start);

/// Shared broker for the current test binary
pub fn broker() -> &'static EmbeddedBroker {
    &BROKER
}

pub struct EmbeddedBroker {
    port: u16,
}

impl EmbeddedBroker {
    fn start() -> Self {
        let port = free_port();
        let config: rumqttd::Config =
            toml::from_str(&broker_toml(port)).expect("embedded broker config");

        let mut broker = rumqttd::Broker::new(config);
        thread::Builder::new()
            .name("embedded-broker".to_string())
            .spawn(move || {
                if let Err(e) = broker.start() {
                    eprintln!("embedded broker stopped: {e:?}");
                }
            })
            .expect("spawn embedded broker");

        wait_until_listening(port);
        Self { port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Communicator config for this broker with `topic` as default topic
    pub fn config(&self, topic: &str) -> CommConfig {
        CommConfig::new("", topic, topic, "127.0.0.1", self.port, 60)
            .with_connect_timeout(Duration::from_secs(5))
            .with_retry_interval(Duration::from_millis(200))
    }
}

/// Unique topic prefix so tests sharing the broker do not see each other's traffic
pub fn unique(prefix: &str) -> String {
    format!("fast-comm-test/{}/{prefix}", uuid::Uuid::new_v4().simple())
}

/// SUBSCRIBE is queued, not acknowledged; give the broker a moment to apply it
pub fn settle() {
    thread::sleep(Duration::from_millis(300));
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

fn wait_until_listening(port: u16) {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let deadline = Instant::now() + BROKER_STARTUP;
    while TcpStream::connect_timeout(&addr, Duration::from_millis(100)).is_err() {
        assert!(
            Instant::now() < deadline,
            "embedded broker did not start on port {port}"
        );
        thread::sleep(Duration::from_millis(20));
    }
}

fn broker_toml(port: u16) -> String {
    format!(
        r#"
id = 0

[router]
max_connections = 1000
max_outgoing_packet_count = 200
max_segment_size = 1048576
max_segment_count = 10

[v5.1]
name = "v5-1"
listen = "127.0.0.1:{port}"
next_connection_delay_ms = 1

[v5.1.connections]
connection_timeout_ms = 60000
max_payload_size = 20480
max_inflight_count = 100
dynamic_filters = true
"#
    )
}
