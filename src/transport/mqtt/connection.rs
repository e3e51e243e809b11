//! Connection state, broker options and the connect signal
//!
//! This module holds the pieces of the connection manager that do not touch
//! the network: option construction, the retry policy and the one-shot signal
//! the constructing thread waits on.

use crate::config::CommConfig;
use crate::error::{CommError, CommResult};
use parking_lot::{Condvar, Mutex};
use rumqttc::v5::MqttOptions;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Upper bound on in-flight client requests queued to the network thread
pub const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Connection state for the broker session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Fixed-interval retry policy for the initial connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between attempts
    pub interval: Duration,
    /// Overall budget measured from the first attempt; `None` retries forever
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CommConfig) -> Self {
        Self {
            interval: config.retry_interval(),
            timeout: config.connect_timeout(),
        }
    }

    /// Deadline for the whole connect phase, `None` when unbounded
    pub fn deadline(&self, started: Instant) -> Option<Instant> {
        self.timeout.and_then(|t| started.checked_add(t))
    }

    /// True once the budget since `started` is spent
    pub fn is_exhausted(&self, started: Instant, now: Instant) -> bool {
        self.deadline(started).is_some_and(|deadline| now >= deadline)
    }

    pub fn timeout_error(&self) -> CommError {
        CommError::ConnectionTimeout {
            timeout: self.timeout.unwrap_or(Duration::MAX),
        }
    }
}

/// Resolve the client id; the client library rejects empty ids, so one is generated
pub fn resolve_client_id(configured: &str) -> String {
    if configured.is_empty() {
        format!("fast-comm-{}", uuid::Uuid::new_v4().simple())
    } else {
        configured.to_string()
    }
}

/// Build broker options from configuration
pub fn configure_mqtt_options(client_id: &str, config: &CommConfig) -> CommResult<MqttOptions> {
    config.validate()?;

    let mut options = MqttOptions::new(client_id, config.broker.host.as_str(), config.broker.port);
    options.set_keep_alive(config.keepalive());
    options.set_clean_start(true);

    if let Some(username) = config.get_username() {
        let password = config.get_password().unwrap_or_default();
        options.set_credentials(username, password);
    }

    Ok(options)
}

#[derive(Debug)]
enum ConnectOutcome {
    Pending,
    Established,
    Failed(CommError),
}

#[derive(Debug)]
struct SessionStatus {
    state: ConnectionState,
    outcome: ConnectOutcome,
}

/// Session state shared between the network thread and callers.
///
/// The outcome of the connect phase is set exactly once; waiters are woken
/// when it is.
#[derive(Debug)]
pub struct SessionSignal {
    status: Mutex<SessionStatus>,
    settled: Condvar,
}

impl SessionSignal {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(SessionStatus {
                state: ConnectionState::Disconnected,
                outcome: ConnectOutcome::Pending,
            }),
            settled: Condvar::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.status.lock().state
    }

    pub fn set_connecting(&self) {
        self.status.lock().state = ConnectionState::Connecting;
    }

    /// Local teardown; the network thread is gone so no notification will follow
    pub fn set_disconnected(&self) {
        self.status.lock().state = ConnectionState::Disconnected;
    }

    /// Connect notification; `success` false means the broker refused the session
    pub fn on_connect(&self, success: bool, code: &str) {
        let mut status = self.status.lock();
        if success {
            status.state = ConnectionState::Connected;
            if matches!(status.outcome, ConnectOutcome::Pending) {
                status.outcome = ConnectOutcome::Established;
            }
            self.settled.notify_all();
            info!(code = %code, "Broker session established");
        } else {
            warn!(code = %code, "Broker refused connection");
        }
    }

    /// Disconnect notification; never triggers a reconnect
    pub fn on_disconnect(&self, reason: &str) {
        let mut status = self.status.lock();
        let was = status.state;
        status.state = ConnectionState::Disconnected;
        if was == ConnectionState::Connected {
            warn!(reason = %reason, "Broker session lost");
        } else {
            info!(reason = %reason, "Broker session closed");
        }
    }

    /// Settle the connect phase with an error, unless it already settled
    pub fn fail(&self, error: CommError) {
        let mut status = self.status.lock();
        status.state = ConnectionState::Disconnected;
        if matches!(status.outcome, ConnectOutcome::Pending) {
            status.outcome = ConnectOutcome::Failed(error);
            self.settled.notify_all();
        }
    }

    /// Block until the connect phase settles or `deadline` passes.
    ///
    /// Without a deadline the wait is untimed.
    pub fn wait_for_connection(
        &self,
        deadline: Option<Instant>,
        policy: &RetryPolicy,
    ) -> CommResult<()> {
        let mut status = self.status.lock();
        loop {
            match std::mem::replace(&mut status.outcome, ConnectOutcome::Pending) {
                ConnectOutcome::Established => {
                    status.outcome = ConnectOutcome::Established;
                    return Ok(());
                }
                ConnectOutcome::Failed(error) => return Err(error),
                ConnectOutcome::Pending => {}
            }

            match deadline {
                Some(deadline) => {
                    if self.settled.wait_until(&mut status, deadline).timed_out()
                        && matches!(status.outcome, ConnectOutcome::Pending)
                    {
                        return Err(policy.timeout_error());
                    }
                }
                None => self.settled.wait(&mut status),
            }
        }
    }
}

impl Default for SessionSignal {
    fn default() -> Self {
        Self::new()
    }
}
