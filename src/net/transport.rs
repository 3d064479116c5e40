//! Transport capability: topic-addressed byte messaging.
//!
//! The pipelines only ever publish bytes to a topic and consume an ordered
//! byte stream per topic; everything else (brokers, sockets, discovery) is
//! the transport implementation's business. Subscriptions start at the
//! current tail: a participant joining a room must never replay audio from
//! before it joined.

use anyhow::Result;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Topic-addressed pub/sub used by the send and receive pipelines.
pub trait Transport: Send + Sync {
    /// Publish one message to a topic.
    fn send(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Start consuming a topic from its current tail. Messages arrive in
    /// publish order.
    fn subscribe(&self, topic: &str) -> mpsc::UnboundedReceiver<Vec<u8>>;
}

/// In-process transport: fans every message out to the topic's live
/// subscribers. Backs tests and single-machine loopback sessions.
#[derive(Default)]
pub struct LocalTransport {
    topics: DashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for LocalTransport {
    fn send(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if let Some(mut subscribers) = self.topics.get_mut(topic) {
            // Dropped receivers fall out of the list here.
            subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        debug!("New subscriber on topic {}", topic);
        let (tx, rx) = mpsc::unbounded_channel();
        self.topics.entry(topic.to_string()).or_default().push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fanout_to_all_subscribers() {
        let transport = LocalTransport::new();
        let mut a = transport.subscribe("room-1");
        let mut b = transport.subscribe("room-1");

        transport.send("room-1", vec![1, 2, 3]).unwrap();

        assert_eq!(a.recv().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(b.recv().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let transport = LocalTransport::new();
        let mut a = transport.subscribe("room-1");

        transport.send("room-2", vec![9]).unwrap();
        transport.send("room-1", vec![1]).unwrap();

        assert_eq!(a.recv().await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_subscription_starts_at_tail() {
        let transport = LocalTransport::new();
        transport.send("room-1", vec![1]).unwrap();

        let mut late = transport.subscribe("room-1");
        transport.send("room-1", vec![2]).unwrap();

        // Only the message published after subscribing arrives.
        assert_eq!(late.recv().await.unwrap(), vec![2]);
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let transport = LocalTransport::new();
        let rx = transport.subscribe("room-1");
        drop(rx);

        transport.send("room-1", vec![1]).unwrap();
        assert!(transport.topics.get("room-1").unwrap().is_empty());
    }
}
