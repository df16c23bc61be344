//! Publish side of a message broker.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{BridgeError, Result};

/// A message broker that accepts published payloads.
///
/// Every publish uses QoS 0. `retain` asks the broker to keep the payload as
/// the topic's last known value for late subscribers.
pub trait Broker: Send + Sync {
    /// Publish `payload` to `topic`.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// A message captured by [`MemoryBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl PublishedMessage {
    /// Payload as UTF-8 text (lossy).
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// In-memory broker that records every publish.
///
/// Topics registered with [`fail_topic`](Self::fail_topic) are rejected with
/// [`BridgeError::Publish`]. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    messages: Vec<PublishedMessage>,
    failing: HashSet<String>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every future publish to `topic`.
    pub fn fail_topic(&self, topic: impl Into<String>) {
        self.lock().failing.insert(topic.into());
    }

    /// All accepted messages, in publish order.
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.lock().messages.clone()
    }

    /// The last accepted payload for `topic`.
    pub fn last(&self, topic: &str) -> Option<PublishedMessage> {
        self.lock()
            .messages
            .iter()
            .rev()
            .find(|m| m.topic == topic)
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        let mut state = self.lock();

        if state.failing.contains(topic) {
            return Err(BridgeError::publish(topic, "rejected by broker"));
        }

        state.messages.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            retain,
        });

        Ok(())
    }
}
