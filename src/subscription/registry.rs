//! Registry of active subscriptions keyed by filter
//!
//! Mutation takes the write lock, dispatch and lookup take the read lock. The
//! lock is never held while a broker request is queued or while a message is
//! delivered, so a slow callback or a blocked retriever cannot stall
//! `add`/`remove` on other threads.

use super::{create, Delivery, Message, Subscription};
use crate::error::{CommError, CommResult};
use crate::topics::{has_wildcards, topic_matches, validate_filter};
use crate::transport::{BrokerLink, QoS};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SubscriptionRegistry {
    link: Arc<dyn BrokerLink>,
    subscriptions: RwLock<HashMap<String, Arc<dyn Subscription>>>,
}

impl SubscriptionRegistry {
    pub fn new(link: Arc<dyn BrokerLink>) -> Self {
        Self {
            link,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Register `filter` and issue the broker SUBSCRIBE
    pub fn add(&self, filter: &str, qos: QoS, delivery: Delivery) -> CommResult<()> {
        validate_filter(filter)?;

        {
            let mut subscriptions = self.subscriptions.write();
            if subscriptions.contains_key(filter) {
                return Err(CommError::DuplicateSubscription {
                    filter: filter.to_string(),
                });
            }
            subscriptions.insert(filter.to_string(), create(filter, delivery.clone()));
        }

        if let Err(e) = self.link.subscribe(filter, qos) {
            self.subscriptions.write().remove(filter);
            warn!(filter = %filter, error = %e, "SUBSCRIBE request rejected");
            return Err(e);
        }

        info!(filter = %filter, qos = ?qos, delivery = ?delivery, "Subscribed");
        Ok(())
    }

    /// Issue the broker UNSUBSCRIBE and drop the subscription.
    ///
    /// When the request cannot be queued the subscription stays registered,
    /// with any messages it already holds.
    pub fn remove(&self, filter: &str) -> CommResult<()> {
        let removed = self.subscriptions.write().remove(filter).ok_or_else(|| {
            CommError::SubscriptionNotFound {
                filter: filter.to_string(),
            }
        })?;

        if let Err(e) = self.link.unsubscribe(filter) {
            self.subscriptions
                .write()
                .entry(filter.to_string())
                .or_insert(removed);
            warn!(filter = %filter, error = %e, "UNSUBSCRIBE request rejected");
            return Err(e);
        }

        info!(filter = %filter, "Unsubscribed");
        Ok(())
    }

    /// Look up the subscription registered for `filter`
    pub fn get(&self, filter: &str) -> CommResult<Arc<dyn Subscription>> {
        self.subscriptions
            .read()
            .get(filter)
            .cloned()
            .ok_or_else(|| CommError::SubscriptionNotFound {
                filter: filter.to_string(),
            })
    }

    /// Route one inbound message to the subscription whose filter matches
    /// its topic. Returns false when no subscription matched.
    pub fn dispatch(&self, message: Message) -> bool {
        let target = {
            let subscriptions = self.subscriptions.read();
            Self::find_match(&subscriptions, &message.topic)
        };

        match target {
            Some(subscription) => {
                debug!(
                    topic = %message.topic,
                    filter = %subscription.filter(),
                    bytes = message.payload.len(),
                    "Dispatching message"
                );
                subscription.add_message(message);
                true
            }
            None => {
                warn!(topic = %message.topic, "No subscription matches inbound message, dropped");
                false
            }
        }
    }

    /// Exact filter first, then the wildcard filters in any order
    fn find_match(
        subscriptions: &HashMap<String, Arc<dyn Subscription>>,
        topic: &str,
    ) -> Option<Arc<dyn Subscription>> {
        if let Some(exact) = subscriptions.get(topic) {
            return Some(exact.clone());
        }
        subscriptions
            .iter()
            .find(|(filter, _)| has_wildcards(filter) && topic_matches(filter, topic))
            .map(|(_, subscription)| subscription.clone())
    }

    pub fn contains(&self, filter: &str) -> bool {
        self.subscriptions.read().contains_key(filter)
    }

    /// Active filters, sorted
    pub fn filters(&self) -> Vec<String> {
        let mut filters: Vec<String> = self.subscriptions.read().keys().cloned().collect();
        filters.sort();
        filters
    }

    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }
}
