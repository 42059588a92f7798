//! In-memory topic bus.
//!
//! Every send to a topic is delivered to all live subscribers of that topic.
//! Sending to a topic with no subscribers succeeds and delivers nothing, the
//! way a broker accepts writes nobody reads yet.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use super::{Delivery, Transport};
use crate::envelope::Envelope;
use crate::types::Result;

// =============================================================================
// Subscriber Management
// =============================================================================

#[derive(Debug)]
struct Subscriber {
    id: String,
    tx: mpsc::UnboundedSender<Delivery>,
}

/// Subscription receipt for managing subscriptions.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub topics: Vec<String>,
}

/// Statistics about bus usage.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BusStats {
    pub sends: u64,
    pub deliveries: u64,
    pub sends_per_topic: HashMap<String, u64>,
    pub active_subscribers: usize,
}

// =============================================================================
// InMemoryBus
// =============================================================================

/// In-process topic bus implementing `Transport`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBus {
    /// topic -> subscribers
    subscribers: Arc<RwLock<HashMap<String, Vec<Subscriber>>>>,
    stats: Arc<RwLock<BusStats>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one or more topics.
    ///
    /// Returns (subscription handle, receiver channel) for receiving deliveries.
    pub async fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        topics: Vec<String>,
    ) -> (Subscription, mpsc::UnboundedReceiver<Delivery>) {
        let subscriber_id = subscriber_id.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut subscribers = self.subscribers.write().await;
        for topic in &topics {
            subscribers.entry(topic.clone()).or_default().push(Subscriber {
                id: subscriber_id.clone(),
                tx: tx.clone(),
            });
        }

        let mut stats = self.stats.write().await;
        stats.active_subscribers = subscribers.values().map(Vec::len).sum();

        tracing::debug!(
            subscriber = %subscriber_id,
            topics = ?topics,
            "subscriber registered"
        );

        (
            Subscription {
                id: subscriber_id,
                topics,
            },
            rx,
        )
    }

    /// Remove a subscription from every topic it was registered on.
    pub async fn unsubscribe(&self, subscription: &Subscription) {
        let mut subscribers = self.subscribers.write().await;

        for topic in &subscription.topics {
            if let Some(subs) = subscribers.get_mut(topic) {
                subs.retain(|s| s.id != subscription.id);
            }
        }

        let mut stats = self.stats.write().await;
        stats.active_subscribers = subscribers.values().map(Vec::len).sum();

        tracing::debug!(subscriber = %subscription.id, "unsubscribed");
    }

    /// Drop subscribers whose receiver is gone. Returns the remaining count.
    async fn prune_closed(&self) -> usize {
        let mut subscribers = self.subscribers.write().await;
        for subs in subscribers.values_mut() {
            subs.retain(|s| {
                let open = !s.tx.is_closed();
                if !open {
                    tracing::debug!(subscriber = %s.id, "dropping closed subscriber");
                }
                open
            });
        }
        subscribers.retain(|_, subs| !subs.is_empty());
        subscribers.values().map(Vec::len).sum()
    }

    /// Get current bus statistics.
    pub async fn stats(&self) -> BusStats {
        self.stats.read().await.clone()
    }

    /// Reset send/delivery counters.
    pub async fn reset_stats(&self) {
        let mut stats = self.stats.write().await;
        stats.sends = 0;
        stats.deliveries = 0;
        stats.sends_per_topic.clear();
    }
}

#[async_trait]
impl Transport for InMemoryBus {
    async fn send(&self, destination: &str, key: Option<&str>, envelope: &Envelope) -> Result<()> {
        let delivery = Delivery {
            destination: destination.to_string(),
            key: key.map(str::to_string),
            envelope: envelope.clone(),
        };

        let mut delivered = 0u64;
        let mut closed = 0usize;
        {
            let subscribers = self.subscribers.read().await;
            let interested = subscribers
                .get(destination)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            for subscriber in interested {
                // A closed channel means the subscriber went away.
                if subscriber.tx.send(delivery.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed += 1;
                }
            }
        }

        let active = if closed > 0 {
            Some(self.prune_closed().await)
        } else {
            None
        };

        let mut stats = self.stats.write().await;
        if let Some(active) = active {
            stats.active_subscribers = active;
        }
        stats.sends += 1;
        stats.deliveries += delivered;
        *stats
            .sends_per_topic
            .entry(destination.to_string())
            .or_insert(0) += 1;

        tracing::debug!(
            destination,
            envelope_id = %envelope.id,
            delivered,
            "envelope sent"
        );

        Ok(())
    }
}
