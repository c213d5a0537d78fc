// Copyright (c) 2024 Stagecraft Systems
// Licence: GNU GPLv3
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! A generic topic-and-filter broadcast bus for DMX frames, playback status,
//! and session events. Publishers never block: delivery to a subscriber with
//! a full queue is silently dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::trace;

/// The closed set of topics the core publishes on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    DmxFrame,
    ProjectUpdate,
    PreviewSession,
    CueListPlayback,
    GlobalPlayback,
    SystemInfo,
    WifiStatus,
    WifiModeChange,
}

/// An opaque message carried on the bus. Variants map one-to-one onto the
/// payload column of the events table in the specification; integration glue
/// is responsible for constructing the right variant for each topic.
#[derive(Clone, Debug)]
pub enum Message {
    DmxFrame { universe: u32, channels: Arc<[u8; 512]> },
    CueListPlayback(Arc<crate::playback::PlaybackStatus>),
    GlobalPlayback(Arc<crate::playback::GlobalPlaybackStatus>),
    PreviewSession(Arc<String>),
    Text(Arc<String>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Subscriber {
    id: SubscriberId,
    topic: Topic,
    filter: String,
    sender: mpsc::Sender<Message>,
}

/// A handle returned from [`Bus::subscribe`]. Dropping it does not
/// automatically unsubscribe; call [`Bus::unsubscribe`] to release the slot.
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<Message>,
}

/// The in-process pub/sub bus.
pub struct Bus {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl Bus {
    pub fn new() -> Self {
        Bus {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber for `topic`. An empty filter matches every
    /// publish on this topic regardless of the publish's own filter.
    pub async fn subscribe(&self, topic: Topic, filter: impl Into<String>, buffer: usize) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(buffer.max(1));

        let mut subscribers = self.subscribers.write().await;
        subscribers.push(Subscriber {
            id,
            topic,
            filter: filter.into(),
            sender,
        });

        Subscription { id, receiver }
    }

    /// Remove a subscriber, closing its delivery queue.
    pub async fn unsubscribe(&self, id: SubscriberId) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|s| s.id != id);
    }

    /// Publish to subscribers of `topic` whose filter matches `filter`.
    ///
    /// A subscriber matches when its own filter is empty, the publish filter
    /// is empty, or the two are equal. Delivery never blocks: a full queue
    /// drops the message for that subscriber only.
    pub async fn publish(&self, topic: Topic, filter: &str, message: Message) {
        let subscribers = self.subscribers.read().await;
        for subscriber in subscribers.iter() {
            if subscriber.topic != topic {
                continue;
            }
            if !subscriber.filter.is_empty() && !filter.is_empty() && subscriber.filter != filter {
                continue;
            }
            if subscriber.sender.try_send(message.clone()).is_err() {
                trace!(?topic, subscriber = subscriber.id.0, "dropped message on full queue");
            }
        }
    }

    /// Publish to every subscriber of `topic`, ignoring filters entirely.
    pub async fn publish_all(&self, topic: Topic, message: Message) {
        let subscribers = self.subscribers.read().await;
        for subscriber in subscribers.iter() {
            if subscriber.topic != topic {
                continue;
            }
            if subscriber.sender.try_send(message.clone()).is_err() {
                trace!(?topic, subscriber = subscriber.id.0, "dropped message on full queue");
            }
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Bus::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_filters_match_everything() {
        let bus = Bus::new();
        let mut sub = bus.subscribe(Topic::SystemInfo, "", 4).await;
        bus.publish(Topic::SystemInfo, "anything", Message::Text(Arc::new("hi".into())))
            .await;
        let msg = sub.receiver.recv().await.unwrap();
        assert!(matches!(msg, Message::Text(_)));
    }

    #[tokio::test]
    async fn mismatched_filters_do_not_deliver() {
        let bus = Bus::new();
        let mut sub = bus.subscribe(Topic::CueListPlayback, "list-a", 4).await;
        bus.publish(Topic::CueListPlayback, "list-b", Message::Text(Arc::new("hi".into())))
            .await;
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_silently_without_blocking_publisher() {
        let bus = Bus::new();
        let sub = bus.subscribe(Topic::SystemInfo, "", 1).await;
        // Fill the single slot, then publish again: the second publish must
        // not block or error even though nothing is draining the queue.
        bus.publish(Topic::SystemInfo, "", Message::Text(Arc::new("one".into())))
            .await;
        bus.publish(Topic::SystemInfo, "", Message::Text(Arc::new("two".into())))
            .await;
        drop(sub);
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_subscriber() {
        let bus = Bus::new();
        let sub = bus.subscribe(Topic::SystemInfo, "", 4).await;
        bus.unsubscribe(sub.id).await;
        bus.publish(Topic::SystemInfo, "", Message::Text(Arc::new("hi".into())))
            .await;
        assert_eq!(bus.subscribers.read().await.len(), 0);
    }

    #[tokio::test]
    async fn publish_all_ignores_filters() {
        let bus = Bus::new();
        let mut sub = bus.subscribe(Topic::GlobalPlayback, "never-matches", 4).await;
        bus.publish_all(Topic::GlobalPlayback, Message::Text(Arc::new("hi".into())))
            .await;
        assert!(sub.receiver.recv().await.is_some());
    }
}
