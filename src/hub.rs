//! Best-effort fan-out of relayed event frames.
//!
//! Frames are serialized once per publish and offered to every subscriber
//! with a single non-blocking send. A subscriber that cannot take the
//! frame (full buffer or gone) is removed on the spot; no consumer can
//! stall the relay or its peers.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Frames a subscriber can fall behind by before being dropped.
const SUBSCRIBER_BUFFER: usize = 32;

/// One frame, serialized once and shared by all subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedFrame {
    pub event: String,
    pub data: String,
}

/// Handle returned by [`BroadcastHub::subscribe`]. Dropping the receiver
/// is enough; the sender side is reaped on the next publish.
pub struct Subscriber {
    pub id: u64,
    pub rx: mpsc::Receiver<SerializedFrame>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    senders: HashMap<u64, mpsc::Sender<SerializedFrame>>,
}

#[derive(Default)]
pub struct BroadcastHub {
    inner: Mutex<Inner>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscriber {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.next_id += 1;
        let id = inner.next_id;
        inner.senders.insert(id, tx);
        Subscriber { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.senders.remove(&id);
    }

    /// Deliver a frame to every subscriber; failed sends remove the
    /// subscriber without affecting the others.
    pub fn publish(&self, event: &str, payload: &Value) {
        let frame = SerializedFrame {
            event: event.to_string(),
            data: payload.to_string(),
        };
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.senders.retain(|id, tx| match tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(e) => {
                debug!("dropping event subscriber {}: {}", id, e);
                false
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn delivers_to_all_subscribers() {
        let hub = BroadcastHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish("now", &json!({"title": "X"}));

        let frame = a.rx.recv().await.unwrap();
        assert_eq!(frame.event, "now");
        assert_eq!(frame.data, r#"{"title":"X"}"#);
        assert_eq!(b.rx.recv().await.unwrap(), frame);
    }

    #[tokio::test]
    async fn failing_subscriber_is_dropped_without_affecting_others() {
        let hub = BroadcastHub::new();
        let mut healthy = hub.subscribe();
        let gone = hub.subscribe();
        drop(gone.rx);
        assert_eq!(hub.subscriber_count(), 2);

        hub.publish("master_volume", &json!(42));

        assert_eq!(hub.subscriber_count(), 1);
        let frame = healthy.rx.recv().await.unwrap();
        assert_eq!(frame.event, "master_volume");
        assert_eq!(frame.data, "42");
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_once_its_buffer_fills() {
        let hub = BroadcastHub::new();
        let slow = hub.subscribe();

        // Never read; the buffer absorbs SUBSCRIBER_BUFFER frames, the
        // next publish fails the send and reaps the subscriber
        for i in 0..=SUBSCRIBER_BUFFER {
            hub.publish("now", &json!({"seq": i}));
        }
        assert_eq!(hub.subscriber_count(), 0);
        drop(slow);
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_handle() {
        let hub = BroadcastHub::new();
        let sub = hub.subscribe();
        hub.unsubscribe(sub.id);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
