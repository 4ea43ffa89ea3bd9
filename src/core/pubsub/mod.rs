// src/core/pubsub/mod.rs

//! The completion bus: a topic-tagged publish-subscribe channel that carries
//! completion events from pipeline workers back to the gateway, plus the
//! interrupt channel that flows the other way.

use crate::core::events::{CompletionEvent, Topic};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

// Export sub-modules.
pub mod channel_purger;
pub mod interrupt;

pub use interrupt::{InterruptBus, InterruptListener};

#[derive(Debug)]
struct Subscriber {
    id: u64,
    route_prefix: Bytes,
    tx: UnboundedSender<CompletionEvent>,
}

/// `CompletionBus` fans completion events out to every subscriber of their topic
/// whose route prefix matches the event's route.
///
/// Subscriber channels are unbounded so a publish never waits and never drops an
/// event for a live subscriber.
#[derive(Debug, Default)]
pub struct CompletionBus {
    topics: DashMap<Topic, Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl CompletionBus {
    pub fn new() -> Self {
        Default::default()
    }

    /// Subscribes to `topics`, receiving only events whose route starts with `route_prefix`.
    /// An empty prefix receives every event on those topics.
    pub fn subscribe(
        &self,
        topics: &[Topic],
        route_prefix: impl Into<Bytes>,
    ) -> CompletionSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let route_prefix = route_prefix.into();
        for topic in topics {
            self.topics.entry(*topic).or_default().push(Subscriber {
                id,
                route_prefix: route_prefix.clone(),
                tx: tx.clone(),
            });
        }
        CompletionSubscription { id, rx }
    }

    /// Publishes an event. Returns the number of subscribers it was delivered to.
    pub fn publish(&self, event: CompletionEvent) -> usize {
        let Some(subscribers) = self.topics.get(&event.topic) else {
            debug!("No subscribers on topic '{}' for {}", event.topic, event.identity);
            return 0;
        };

        let mut delivered = 0;
        for subscriber in subscribers
            .iter()
            .filter(|s| event.route.starts_with(&s.route_prefix))
        {
            if subscriber.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Removes subscribers whose receiving side has been dropped, and topics left
    /// with no subscribers.
    pub fn purge_closed(&self) -> usize {
        let mut purged_count = 0;
        self.topics.retain(|_topic, subscribers| {
            subscribers.retain(|s| {
                let open = !s.tx.is_closed();
                if !open {
                    purged_count += 1;
                }
                open
            });
            !subscribers.is_empty()
        });

        if purged_count > 0 {
            debug!("Purged {} closed completion subscribers.", purged_count);
        }
        purged_count
    }

    /// Returns the number of subscribers registered on a topic, including closed
    /// ones that have not been purged yet.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics.get(&topic).map_or(0, |s| s.len())
    }

    /// Returns true if the subscription with `id` is registered on `topic`.
    pub fn is_subscribed(&self, id: u64, topic: Topic) -> bool {
        self.topics
            .get(&topic)
            .is_some_and(|subs| subs.iter().any(|s| s.id == id))
    }
}

/// The receiving side of a bus subscription.
#[derive(Debug)]
pub struct CompletionSubscription {
    id: u64,
    rx: UnboundedReceiver<CompletionEvent>,
}

impl CompletionSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<CompletionEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<CompletionEvent> {
        self.rx.try_recv().ok()
    }
}
