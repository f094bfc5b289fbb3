//! Broadcast hub: in-memory fan-out of newly stored events to live subscribers.
//!
//! Delivery is best effort and at most once per connected subscriber. There is
//! no replay: a new subscriber sees only events published after it registered,
//! and is expected to query the store for history first.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::RelayError;
use crate::types::ContextEvent;

/// Handle identifying one registered subscriber.
pub type SubscriberId = u64;

/// Limits for a [`BroadcastHub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Maximum number of concurrently registered subscribers.
    pub max_subscribers: usize,
    /// Events buffered per subscriber before deliveries start being dropped.
    pub subscriber_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_subscribers: 1024,
            subscriber_buffer: 256,
        }
    }
}

#[derive(Default)]
struct Registry {
    next_id: SubscriberId,
    senders: HashMap<SubscriberId, mpsc::Sender<ContextEvent>>,
}

/// Owned publish/subscribe registry. Cheap to clone; clones share subscribers.
#[derive(Clone)]
pub struct BroadcastHub {
    config: HubConfig,
    registry: Arc<Mutex<Registry>>,
}

/// A live subscription. Dropping it unregisters the subscriber.
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<ContextEvent>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Wait for the next published event. `None` once unregistered.
    pub async fn recv(&mut self) -> Option<ContextEvent> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().senders.remove(&self.id);
        }
    }
}

impl BroadcastHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Result<Subscription, RelayError> {
        let mut registry = self.registry.lock();
        if registry.senders.len() >= self.config.max_subscribers {
            return Err(RelayError::SubscriberLimit {
                limit: self.config.max_subscribers,
            });
        }
        registry.next_id += 1;
        let id = registry.next_id;
        let (tx, rx) = mpsc::channel(self.config.subscriber_buffer.max(1));
        registry.senders.insert(id, tx);
        tracing::debug!(subscriber = id, total = registry.senders.len(), "subscriber registered");

        Ok(Subscription {
            id,
            receiver: rx,
            registry: Arc::downgrade(&self.registry),
        })
    }

    /// Deregister a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.registry.lock().senders.remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber = id, "subscriber removed");
        }
        removed
    }

    /// Deliver `event` to every registered subscriber.
    ///
    /// Returns the number of subscribers that accepted it. Subscribers whose
    /// receiver is gone are pruned; full buffers lose this delivery.
    pub fn publish(&self, event: &ContextEvent) -> usize {
        let mut registry = self.registry.lock();
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, tx) in &registry.senders {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        subscriber = id,
                        tx_hash = %event.tx_hash,
                        log_index = event.log_index,
                        "subscriber buffer full, dropping delivery"
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        for id in closed {
            registry.senders.remove(&id);
        }
        delivered
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.registry.lock().senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(log_index: u32) -> ContextEvent {
        ContextEvent {
            network_id: 8453,
            block_number: 10,
            tx_hash: "0xabc".into(),
            log_index,
            block_timestamp: 1_700_000_000,
            topic_hash: "0x01".into(),
            sequence_number: log_index as u64,
            author: "0x02".into(),
            payload_hash: "0x03".into(),
            uri_hash: "0x04".into(),
            meta_hash: "0x05".into(),
            context_id: "0x06".into(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let hub = BroadcastHub::default();
        let mut a = hub.subscribe().unwrap();
        let mut b = hub.subscribe().unwrap();
        assert_ne!(a.id, b.id);

        assert_eq!(hub.publish(&event(1)), 2);
        assert_eq!(a.recv().await.unwrap().log_index, 1);
        assert_eq!(b.recv().await.unwrap().log_index, 1);
    }

    #[tokio::test]
    async fn unsubscribed_stops_receiving() {
        let hub = BroadcastHub::default();
        let mut a = hub.subscribe().unwrap();
        let mut b = hub.subscribe().unwrap();

        assert!(hub.unsubscribe(a.id));
        assert!(!hub.unsubscribe(a.id));
        assert_eq!(hub.publish(&event(7)), 1);

        assert_eq!(b.recv().await.unwrap().log_index, 7);
        // Sender side was dropped on unsubscribe: the channel is closed and empty.
        assert!(a.recv().await.is_none());
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let hub = BroadcastHub::default();
        assert_eq!(hub.publish(&event(0)), 0);
        let sub = hub.subscribe().unwrap();
        drop(sub);
        assert!(hub.is_empty());
        assert_eq!(hub.publish(&event(1)), 0);
    }

    #[test]
    fn subscriber_limit_enforced() {
        let hub = BroadcastHub::new(HubConfig {
            max_subscribers: 1,
            subscriber_buffer: 4,
        });
        let _first = hub.subscribe().unwrap();
        assert!(matches!(
            hub.subscribe(),
            Err(RelayError::SubscriberLimit { limit: 1 })
        ));
    }

    #[test]
    fn full_buffer_drops_only_that_delivery() {
        let hub = BroadcastHub::new(HubConfig {
            max_subscribers: 4,
            subscriber_buffer: 1,
        });
        let mut sub = hub.subscribe().unwrap();
        assert_eq!(hub.publish(&event(1)), 1);
        assert_eq!(hub.publish(&event(2)), 0);
        assert_eq!(sub.receiver.try_recv().unwrap().log_index, 1);
        assert_eq!(hub.publish(&event(3)), 1);
        assert_eq!(sub.receiver.try_recv().unwrap().log_index, 3);
    }

    #[test]
    fn independent_hubs_do_not_share_subscribers() {
        let one = BroadcastHub::default();
        let two = BroadcastHub::default();
        let _sub = one.subscribe().unwrap();
        assert_eq!(two.publish(&event(0)), 0);
        assert_eq!(one.len(), 1);
    }
}
