//! Pull-mode subscription backed by a FIFO

use super::{DeliveryMode, Message, Subscription};
use crate::error::{CommError, CommResult};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::trace;

/// Subscription that buffers messages until a caller retrieves them.
///
/// Concurrent retrievers compete: every message is handed to exactly one of
/// them, in arrival order.
pub struct QueueSubscription {
    filter: String,
    messages: Mutex<VecDeque<Message>>,
    not_empty: Condvar,
}

impl QueueSubscription {
    pub fn new(filter: &str) -> Self {
        Self {
            filter: filter.to_string(),
            messages: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        }
    }

    /// Number of messages waiting to be retrieved
    pub fn pending(&self) -> usize {
        self.messages.lock().len()
    }

    fn timeout_error(&self) -> CommError {
        CommError::ReceiveTimeout {
            filter: self.filter.clone(),
        }
    }
}

impl Subscription for QueueSubscription {
    fn filter(&self) -> &str {
        &self.filter
    }

    fn mode(&self) -> DeliveryMode {
        DeliveryMode::Queue
    }

    fn add_message(&self, message: Message) {
        let mut messages = self.messages.lock();
        messages.push_back(message);
        trace!(filter = %self.filter, pending = messages.len(), "Queued message");
        // One wakeup per message keeps competing retrievers from sleeping on a non-empty queue
        self.not_empty.notify_one();
    }

    fn get_message(&self, timeout: Option<Duration>) -> CommResult<Message> {
        // A duration too large for Instant arithmetic is as good as unbounded
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let mut messages = self.messages.lock();
        loop {
            if let Some(message) = messages.pop_front() {
                return Ok(message);
            }
            match deadline {
                Some(deadline) => {
                    if self
                        .not_empty
                        .wait_until(&mut messages, deadline)
                        .timed_out()
                    {
                        return messages.pop_front().ok_or_else(|| self.timeout_error());
                    }
                }
                None => self.not_empty.wait(&mut messages),
            }
        }
    }
}
