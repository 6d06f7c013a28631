use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::matching::geo::GeoPoint;

/// Lifecycle event delivered to pool members
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    PoolFormed {
        pool_id: String,
        members: Vec<String>,
        pickup_zone: GeoPoint,
        departure_time: DateTime<Utc>,
        cost_per_member: i64,
        savings_message: String,
    },
    MemberLeft {
        pool_id: String,
        user_id: String,
        remaining_members: Vec<String>,
    },
    PoolCancelled {
        pool_id: String,
    },
    PoolCompleted {
        pool_id: String,
    },
}

/// An event addressed to one user's channel
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub recipient: String,
    pub event: PoolEvent,
}

/// One-way, best-effort delivery. Implementations must not block on the
/// recipient and never report delivery failures to the caller.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, notification: Notification);
}

/// Writes every notification to the log
#[derive(Debug, Default, Clone)]
pub struct LogPublisher;

#[async_trait]
impl NotificationPublisher for LogPublisher {
    async fn publish(&self, notification: Notification) {
        let payload = serde_json::to_string(&notification.event).unwrap_or_default();
        info!("Notify {}: {}", notification.recipient, payload);
    }
}

/// Per-user broadcast channels. Events for users with no live subscriber are
/// dropped.
#[derive(Debug)]
pub struct ChannelPublisher {
    channels: DashMap<String, broadcast::Sender<PoolEvent>>,
    capacity: usize,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Receive the events published to `user_id` from now on
    pub fn subscribe(&self, user_id: &str) -> broadcast::Receiver<PoolEvent> {
        self.channels
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

#[async_trait]
impl NotificationPublisher for ChannelPublisher {
    async fn publish(&self, notification: Notification) {
        let Notification { recipient, event } = notification;
        let delivered = match self.channels.get(&recipient) {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        };

        if !delivered {
            debug!("No live subscriber for {}, event dropped", recipient);
            self.channels
                .remove_if(&recipient, |_, sender| sender.receiver_count() == 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancelled(pool_id: &str) -> PoolEvent {
        PoolEvent::PoolCancelled {
            pool_id: pool_id.to_string(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_its_own_events() {
        let publisher = ChannelPublisher::new(8);
        let mut alice = publisher.subscribe("alice");
        let mut bob = publisher.subscribe("bob");

        publisher
            .publish(Notification {
                recipient: "alice".to_string(),
                event: cancelled("p1"),
            })
            .await;

        assert_eq!(alice.recv().await.unwrap(), cancelled("p1"));
        assert!(bob.try_recv().is_err());
    }

    #[tokio::test]
    async fn publishing_without_subscriber_is_dropped() {
        let publisher = ChannelPublisher::new(8);
        publisher
            .publish(Notification {
                recipient: "nobody".to_string(),
                event: cancelled("p1"),
            })
            .await;
        assert!(publisher.channels.is_empty());

        let rx = publisher.subscribe("carol");
        drop(rx);
        publisher
            .publish(Notification {
                recipient: "carol".to_string(),
                event: cancelled("p2"),
            })
            .await;
        assert!(publisher.channels.get("carol").is_none());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let value = serde_json::to_value(cancelled("p9")).unwrap();
        assert_eq!(value["type"], "pool_cancelled");
        assert_eq!(value["pool_id"], "p9");
    }
}
