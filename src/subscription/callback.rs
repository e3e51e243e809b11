//! Push-mode subscription that invokes a user callback

use super::{DeliveryMode, Message, MessageCallback, Subscription};
use crate::error::{CommError, CommResult};
use std::time::Duration;

/// Subscription that delivers each message by calling a user function.
///
/// The callback runs synchronously on the network thread and stalls further
/// dispatch until it returns. It must not add or remove subscriptions.
pub struct CallbackSubscription {
    filter: String,
    callback: MessageCallback,
}

impl CallbackSubscription {
    pub fn new(filter: &str, callback: MessageCallback) -> Self {
        Self {
            filter: filter.to_string(),
            callback,
        }
    }
}

impl Subscription for CallbackSubscription {
    fn filter(&self) -> &str {
        &self.filter
    }

    fn mode(&self) -> DeliveryMode {
        DeliveryMode::Callback
    }

    fn add_message(&self, message: Message) {
        (self.callback)(message);
    }

    fn get_message(&self, _timeout: Option<Duration>) -> CommResult<Message> {
        Err(CommError::InvalidSubscriptionMode {
            filter: self.filter.clone(),
        })
    }
}
