//! Connection manager and the network thread
//!
//! Each [`ConnectionManager`] owns one OS thread that drives the broker event
//! loop on the shared runtime. Caller threads talk to the broker through
//! [`MqttLink`], which queues requests for the network thread, and learn about
//! the session through the [`SessionSignal`].

use super::connection::{
    configure_mqtt_options, resolve_client_id, ConnectionState, RetryPolicy, SessionSignal,
    REQUEST_CHANNEL_CAPACITY,
};
use super::message_handler::{EventRoute, FailureKind, MessageHandler};
use crate::config::CommConfig;
use crate::error::{CommError, CommResult};
use crate::subscription::{Message, SubscriptionRegistry};
use crate::topics::validate_topic;
use crate::transport::{BrokerLink, QoS};
use bytes::Bytes;
use futures::executor::block_on;
use parking_lot::Mutex;
use rumqttc::v5::mqttbytes::v5::{Filter, Publish, Subscribe, Unsubscribe};
use rumqttc::v5::{AsyncClient, EventLoop, Request};
use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn, Instrument};

/// How long a requested DISCONNECT may take to flush before the thread stops
pub const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Id of the link whose event loop this thread polls
    static POLLED_LINK: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Broker requests issued from caller threads and from delivery callbacks.
///
/// Caller threads wait for room in the bounded request channel. The network
/// thread is the only reader of that channel and must never wait on it, so
/// requests made there (from a callback) are parked and fed to the event loop
/// between polls, in the order they were made.
pub struct MqttLink {
    id: u64,
    client: AsyncClient,
    parked: Mutex<VecDeque<Request>>,
}

impl MqttLink {
    pub fn new(client: AsyncClient) -> Self {
        Self {
            id: NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed),
            client,
            parked: Mutex::new(VecDeque::new()),
        }
    }

    fn on_own_network_thread(&self) -> bool {
        POLLED_LINK.with(Cell::get) == Some(self.id)
    }

    fn mark_network_thread(&self) {
        POLLED_LINK.with(|polled| polled.set(Some(self.id)));
    }

    fn park(&self, request: Request) {
        self.parked.lock().push_back(request);
    }

    /// Hand the next parked request to the event loop.
    ///
    /// The event loop sends `pending` ahead of the channel and without its
    /// inflight check, so requests go over one per poll and only while no
    /// packet id collision is waiting for an ack.
    fn release_parked(&self, event_loop: &mut EventLoop) {
        if !event_loop.pending.is_empty() || event_loop.state.collision.is_some() {
            return;
        }
        if let Some(request) = self.parked.lock().pop_front() {
            event_loop.pending.push_back(request);
        }
    }

    /// Requests waiting for the network thread to pick them up
    pub fn parked_len(&self) -> usize {
        self.parked.lock().len()
    }
}

impl BrokerLink for MqttLink {
    fn subscribe(&self, filter: &str, qos: QoS) -> CommResult<()> {
        if self.on_own_network_thread() {
            self.park(Request::Subscribe(Subscribe::new(Filter::new(filter, qos), None)));
            return Ok(());
        }
        block_on(self.client.subscribe(filter, qos))
            .map_err(|e| CommError::subscribe_failure(filter, e.to_string()))
    }

    fn unsubscribe(&self, filter: &str) -> CommResult<()> {
        if self.on_own_network_thread() {
            self.park(Request::Unsubscribe(Unsubscribe::new(filter, None)));
            return Ok(());
        }
        block_on(self.client.unsubscribe(filter))
            .map_err(|e| CommError::subscribe_failure(filter, e.to_string()))
    }

    fn publish(&self, topic: &str, payload: Bytes, qos: QoS, retain: bool) -> CommResult<()> {
        if self.on_own_network_thread() {
            validate_topic(topic)?;
            let mut publish = Publish::new(topic, qos, payload, None);
            publish.retain = retain;
            self.park(Request::Publish(publish));
            return Ok(());
        }
        block_on(self.client.publish(topic, qos, retain, payload))
            .map_err(|e| CommError::publish_failure(topic, e.to_string()))
    }

    fn request_disconnect(&self) -> CommResult<()> {
        self.client
            .try_disconnect()
            .map_err(|e| CommError::connection_failure(format!("disconnect request failed: {e}")))
    }
}

/// Everything the network thread needs besides the event loop
struct NetworkContext {
    client_id: String,
    link: Arc<MqttLink>,
    policy: RetryPolicy,
    session: Arc<SessionSignal>,
    registry: Arc<SubscriptionRegistry>,
}

pub struct ConnectionManager {
    client_id: String,
    policy: RetryPolicy,
    runtime: Handle,
    link: Arc<MqttLink>,
    session: Arc<SessionSignal>,
    event_loop: Mutex<Option<EventLoop>>,
    shutdown_tx: watch::Sender<bool>,
    network_thread: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Prepare a broker session. Nothing touches the network until [`connect`](Self::connect).
    pub fn new(config: &CommConfig, runtime: Handle) -> CommResult<Self> {
        let client_id = resolve_client_id(&config.communicator.id);
        let options = configure_mqtt_options(&client_id, config)?;

        let (client, event_loop) = {
            let _guard = runtime.enter();
            AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY)
        };
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            client_id,
            policy: RetryPolicy::from_config(config),
            runtime,
            link: Arc::new(MqttLink::new(client)),
            session: Arc::new(SessionSignal::new()),
            event_loop: Mutex::new(Some(event_loop)),
            shutdown_tx,
            network_thread: Mutex::new(None),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The request side of the session, for the subscription registry
    pub fn link(&self) -> Arc<MqttLink> {
        self.link.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Start the network thread and block until the broker acknowledges the
    /// session, the retry budget runs out or a fatal error occurs.
    pub fn connect(&self, registry: Arc<SubscriptionRegistry>) -> CommResult<()> {
        let event_loop = self.event_loop.lock().take().ok_or_else(|| {
            CommError::connection_failure("connection manager already started")
        })?;

        let started = Instant::now();
        let deadline = self.policy.deadline(started);
        self.session.set_connecting();

        let context = NetworkContext {
            client_id: self.client_id.clone(),
            link: self.link.clone(),
            policy: self.policy,
            session: self.session.clone(),
            registry,
        };
        let runtime = self.runtime.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let span = crate::mqtt_span!(operation = "network_loop", client_id = %self.client_id);

        let handle = thread::Builder::new()
            .name("fast-comm-net".to_string())
            .spawn(move || {
                context.link.mark_network_thread();
                runtime.block_on(
                    run_network_loop(event_loop, context, shutdown_rx).instrument(span),
                );
            })
            .map_err(|e| {
                self.session.fail(CommError::connection_failure(e.to_string()));
                CommError::connection_failure(format!("failed to start network thread: {e}"))
            })?;
        *self.network_thread.lock() = Some(handle);

        info!(
            client_id = %self.client_id,
            timeout = ?self.policy.timeout,
            "Waiting for broker session"
        );

        if let Err(e) = self.session.wait_for_connection(deadline, &self.policy) {
            self.session
                .fail(CommError::connection_failure("connect abandoned by caller"));
            self.stop_network_thread();
            return Err(e);
        }
        Ok(())
    }

    /// Request DISCONNECT and stop the network thread. Never fails.
    pub fn disconnect(&self) {
        if self.session.state() == ConnectionState::Connected {
            if let Err(e) = self.link.request_disconnect() {
                debug!(client_id = %self.client_id, error = %e, "Disconnect request not queued");
            }
        }
        self.stop_network_thread();
    }

    fn stop_network_thread(&self) {
        self.shutdown_tx.send_replace(true);
        let handle = self.network_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(client_id = %self.client_id, "Network thread panicked");
            }
        }
        self.session.set_disconnected();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop_network_thread();
    }
}

/// Resolves at `deadline` while the session is still being established, never otherwise
async fn connect_deadline(deadline: Option<tokio::time::Instant>, connected: bool) {
    match deadline {
        Some(deadline) if !connected => tokio::time::sleep_until(deadline).await,
        _ => std::future::pending().await,
    }
}

async fn run_network_loop(
    mut event_loop: EventLoop,
    context: NetworkContext,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let started = Instant::now();
    let deadline = context
        .policy
        .deadline(started)
        .map(tokio::time::Instant::from_std);
    let mut connected = false;
    let mut attempts = 0u32;

    loop {
        if connected {
            context.link.release_parked(&mut event_loop);
        }

        let polled = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                if connected {
                    drain_disconnect(&mut event_loop).await;
                }
                break;
            }
            _ = connect_deadline(deadline, connected) => {
                context.session.fail(context.policy.timeout_error());
                break;
            }
            polled = event_loop.poll() => polled,
        };

        match polled {
            Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                EventRoute::ConnectionAcknowledged { success, code } => {
                    connected = connected || success;
                    context.session.on_connect(success, &code);
                }
                EventRoute::MessageReceived {
                    topic,
                    payload,
                    retain,
                } => {
                    trace!(topic = %topic, retain, "PUBLISH received");
                    context.registry.dispatch(Message::new(topic, payload));
                }
                EventRoute::Disconnected { reason } => {
                    context.session.on_disconnect(&reason);
                    break;
                }
                EventRoute::SubscriptionConfirmed {
                    packet_id,
                    reason_codes,
                } => {
                    debug!(packet_id, reason_codes = ?reason_codes, "SUBACK received");
                }
                EventRoute::InfrastructureEvent(event) => {
                    trace!(event = %event, "MQTT event");
                }
                EventRoute::OutgoingEvent => {}
            },
            Err(e) if connected => {
                context.session.on_disconnect(&e.to_string());
                break;
            }
            Err(e) => match MessageHandler::classify_error(&e) {
                FailureKind::Fatal => {
                    error!(error = %e, "Connection attempt failed permanently");
                    context
                        .session
                        .fail(CommError::connection_failure(e.to_string()));
                    break;
                }
                FailureKind::Retryable => {
                    attempts += 1;
                    if context.policy.is_exhausted(started, Instant::now()) {
                        warn!(attempts, error = %e, "Connect budget spent");
                        context.session.fail(context.policy.timeout_error());
                        break;
                    }
                    warn!(
                        attempt = attempts,
                        error = %e,
                        retry_in = ?context.policy.interval,
                        "Connection attempt failed"
                    );

                    tokio::select! {
                        biased;
                        _ = shutdown_rx.changed() => break,
                        _ = connect_deadline(deadline, connected) => {
                            context.session.fail(context.policy.timeout_error());
                            break;
                        }
                        _ = tokio::time::sleep(context.policy.interval) => {}
                    }
                }
            },
        }
    }

    if !connected {
        // Settle the connect phase for a waiter that is still blocked
        context.session.fail(CommError::connection_failure(
            "network thread stopped before the session was established",
        ));
    }
    info!(client_id = %context.client_id, attempts, "Network thread stopped");
}

/// Let the queued DISCONNECT reach the socket, bounded by [`DISCONNECT_GRACE`]
async fn drain_disconnect(event_loop: &mut EventLoop) {
    let drained = tokio::time::timeout(DISCONNECT_GRACE, async {
        while event_loop.poll().await.is_ok() {}
    })
    .await;

    if drained.is_err() {
        debug!("Disconnect did not complete within grace period");
    }
}
