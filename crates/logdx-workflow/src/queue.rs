//! Streaming delivery queue
//!
//! An ordered, closable, multi-producer/single-consumer channel that decouples
//! step completion in the engine from the consumer forwarding results to a
//! client. A consumer that is already waiting receives new messages by direct
//! handoff; otherwise messages are buffered in FIFO order.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_stream::Stream;

use crate::error::QueueError;

/// A timestamped message queued for real-time delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    /// Free-form message type (e.g. "message", "intent", "tool_call")
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl StreamMessage {
    /// Create a message stamped with the current time
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
            session_id: None,
        }
    }

    /// Tag the message with a session id
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// A stream of delivered messages, ending when the queue is closed and drained
pub type StreamMessageStream = Pin<Box<dyn Stream<Item = StreamMessage> + Send>>;

type Waiter = oneshot::Sender<Option<StreamMessage>>;

/// Receiving half of a direct handoff.
///
/// If the waiting future is dropped after a message was sent but before it
/// was read, the message goes back to the front of the buffer.
struct Handoff<'a> {
    queue: &'a StreamQueue,
    receiver: oneshot::Receiver<Option<StreamMessage>>,
}

impl Drop for Handoff<'_> {
    fn drop(&mut self) {
        self.receiver.close();
        if let Ok(Some(message)) = self.receiver.try_recv() {
            self.queue.state.lock().messages.push_front(message);
        }
    }
}

#[derive(Default)]
struct QueueState {
    messages: VecDeque<StreamMessage>,
    closed: bool,
    waiter: Option<Waiter>,
}

impl QueueState {
    /// A waiter whose future was dropped no longer counts as pending.
    fn has_live_waiter(&self) -> bool {
        self.waiter.as_ref().is_some_and(|w| !w.is_closed())
    }
}

/// Ordered, closable delivery queue shared between the engine and a consumer
#[derive(Default)]
pub struct StreamQueue {
    state: Mutex<QueueState>,
}

impl StreamQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, handing it directly to a waiting consumer if there is one.
    ///
    /// On a closed queue the message is dropped.
    pub fn add_message(&self, message: StreamMessage) {
        let mut state = self.state.lock();
        if state.closed {
            tracing::trace!(kind = %message.kind, "Dropping message on closed queue");
            return;
        }

        match state.waiter.take() {
            Some(waiter) => {
                // The receiver may have been dropped; keep the message in that case
                if let Err(Some(message)) = waiter.send(Some(message)) {
                    state.messages.push_back(message);
                }
            }
            None => state.messages.push_back(message),
        }
    }

    /// Take the next message, waiting while the queue is empty and open.
    ///
    /// Returns `Ok(None)` once the queue is closed and drained. Only one
    /// consumer may wait at a time; a second concurrent call fails with
    /// [`QueueError::AlreadyWaiting`].
    pub async fn get_message(&self) -> Result<Option<StreamMessage>, QueueError> {
        let mut handoff = {
            let mut state = self.state.lock();
            if let Some(message) = state.messages.pop_front() {
                return Ok(Some(message));
            }
            if state.closed {
                return Ok(None);
            }
            if state.has_live_waiter() {
                return Err(QueueError::AlreadyWaiting);
            }
            let (tx, rx) = oneshot::channel();
            state.waiter = Some(tx);
            Handoff {
                queue: self,
                receiver: rx,
            }
        };

        Ok((&mut handoff.receiver).await.unwrap_or(None))
    }

    /// Close the queue, releasing a pending consumer with `None`.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        if let Some(waiter) = state.waiter.take() {
            let _ = waiter.send(None);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().messages.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of buffered messages
    pub fn size(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Whether a consumer is currently suspended in [`get_message`](Self::get_message)
    pub fn is_waiting(&self) -> bool {
        self.state.lock().has_live_waiter()
    }

    /// Drain the queue as a stream that ends at the "no message" sentinel.
    pub fn stream(self: &Arc<Self>) -> StreamMessageStream {
        let queue = Arc::clone(self);
        Box::pin(async_stream::stream! {
            loop {
                match queue.get_message().await {
                    Ok(Some(message)) => yield message,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Delivery stream stopped: {}", e);
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, StreamExt};
    use serde_json::json;

    fn msg(text: &str) -> StreamMessage {
        StreamMessage::new("message", json!({ "content": text }))
    }

    async fn wait_for_waiter(queue: &StreamQueue) {
        while !queue.is_waiting() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_buffered_handoff() {
        let queue = StreamQueue::new();
        let sent = msg("hello");
        queue.add_message(sent.clone());
        assert_eq!(queue.size(), 1);

        let received = queue.get_message().await.unwrap();
        assert_eq!(received, Some(sent));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_direct_handoff_matches_buffered() {
        let queue = Arc::new(StreamQueue::new());
        let sent = msg("hello");

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get_message().await })
        };
        wait_for_waiter(&queue).await;

        queue.add_message(sent.clone());
        // Handed off, never buffered
        assert_eq!(queue.size(), 0);

        let received = consumer.await.unwrap().unwrap();
        assert_eq!(received, Some(sent));
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = StreamQueue::new();
        for text in ["a", "b", "c"] {
            queue.add_message(msg(text));
        }
        for text in ["a", "b", "c"] {
            let m = queue.get_message().await.unwrap().unwrap();
            assert_eq!(m.payload["content"], text);
        }
    }

    #[tokio::test]
    async fn test_close_releases_pending_waiter() {
        let queue = Arc::new(StreamQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get_message().await })
        };
        wait_for_waiter(&queue).await;

        queue.close();
        assert_eq!(consumer.await.unwrap().unwrap(), None);

        // Subsequent calls return the sentinel immediately
        assert_eq!(queue.get_message().await.unwrap(), None);
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn test_add_after_close_is_dropped() {
        let queue = StreamQueue::new();
        queue.close();
        queue.add_message(msg("late"));
        assert!(queue.is_empty());
        assert_eq!(queue.size(), 0);
        assert_eq!(queue.get_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_buffered_messages_survive_close() {
        let queue = StreamQueue::new();
        queue.add_message(msg("before close"));
        queue.close();
        let m = queue.get_message().await.unwrap().unwrap();
        assert_eq!(m.payload["content"], "before close");
        assert_eq!(queue.get_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_second_waiter_is_rejected() {
        let queue = Arc::new(StreamQueue::new());
        let first = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get_message().await })
        };
        wait_for_waiter(&queue).await;

        let second = queue.get_message().await;
        assert!(matches!(second, Err(QueueError::AlreadyWaiting)));

        // The first waiter is still served
        queue.add_message(msg("for first"));
        let m = first.await.unwrap().unwrap().unwrap();
        assert_eq!(m.payload["content"], "for first");
    }

    #[tokio::test]
    async fn test_dropped_waiter_does_not_lose_messages() {
        let queue = StreamQueue::new();
        {
            let pending = queue.get_message();
            // Poll once so the waiter registers, then drop the future
            let _ = tokio::time::timeout(std::time::Duration::from_millis(1), pending).await;
        }
        assert!(!queue.is_waiting());

        queue.add_message(msg("kept"));
        assert_eq!(queue.size(), 1);
        let m = queue.get_message().await.unwrap().unwrap();
        assert_eq!(m.payload["content"], "kept");
    }

    #[tokio::test]
    async fn test_cancelled_handoff_is_requeued_in_order() {
        let queue = StreamQueue::new();
        let mut pending = Box::pin(queue.get_message());
        assert!(pending.as_mut().now_or_never().is_none());
        assert!(queue.is_waiting());

        // Sent straight into the waiter, which is then dropped unread
        queue.add_message(msg("handed off"));
        assert_eq!(queue.size(), 0);
        drop(pending);

        assert_eq!(queue.size(), 1);
        queue.add_message(msg("after"));
        queue.close();

        let first = queue.get_message().await.unwrap().unwrap();
        assert_eq!(first.payload["content"], "handed off");
        let second = queue.get_message().await.unwrap().unwrap();
        assert_eq!(second.payload["content"], "after");
        assert_eq!(queue.get_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stream_drains_until_closed() {
        let queue = Arc::new(StreamQueue::new());
        queue.add_message(msg("one"));
        queue.add_message(msg("two"));

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue.add_message(msg("three"));
                queue.close();
            })
        };

        let collected: Vec<String> = queue
            .stream()
            .map(|m| m.payload["content"].as_str().unwrap_or_default().to_string())
            .collect()
            .await;
        producer.await.unwrap();
        assert_eq!(collected, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_concurrent_producers_keep_per_producer_order() {
        let queue = Arc::new(StreamQueue::new());
        let mut handles = Vec::new();
        for producer in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    queue.add_message(StreamMessage::new(
                        "message",
                        json!({ "producer": producer, "seq": i }),
                    ));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        queue.close();

        let mut last_seen = [-1i64; 4];
        let mut total = 0;
        while let Some(m) = queue.get_message().await.unwrap() {
            let producer = m.payload["producer"].as_u64().unwrap() as usize;
            let seq = m.payload["seq"].as_i64().unwrap();
            assert!(seq > last_seen[producer]);
            last_seen[producer] = seq;
            total += 1;
        }
        assert_eq!(total, 100);
    }

    #[test]
    fn test_stream_message_serializes_type_field() {
        let m = StreamMessage::new("status", json!({"step": "detect_intent"})).with_session("s-1");
        let value = serde_json::to_value(&m).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["session_id"], "s-1");
    }
}
