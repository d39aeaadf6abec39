//! Run event persistence.
//!
//! Appends are durable and sequenced per run. Subscriptions are best effort:
//! a subscriber whose buffer is full misses events rather than slowing the
//! append path.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use agentrun_core::{RunEvent, RunId};

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("Event store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events, assigning each the next sequence number of its run.
    /// Returns the assigned sequence numbers in order.
    async fn append(&self, events: Vec<RunEvent>) -> Result<Vec<u64>, EventStoreError>;

    /// All events of a run in sequence order.
    async fn load_events(&self, run_id: &RunId) -> Result<Vec<RunEvent>, EventStoreError>;

    /// Events of a run with `seq >= from_seq`, in sequence order.
    async fn load_events_from(
        &self,
        run_id: &RunId,
        from_seq: u64,
    ) -> Result<Vec<RunEvent>, EventStoreError>;

    /// Stream of events appended to a run from now on.
    async fn subscribe(&self, run_id: &RunId) -> Result<mpsc::Receiver<RunEvent>, EventStoreError>;
}

#[derive(Default)]
struct Inner {
    events: HashMap<RunId, Vec<RunEvent>>,
    subscribers: HashMap<RunId, Vec<mpsc::Sender<RunEvent>>>,
}

/// Process-local event store.
pub struct MemoryEventStore {
    inner: Mutex<Inner>,
    subscriber_buffer: usize,
}

impl MemoryEventStore {
    pub fn new(subscriber_buffer: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            subscriber_buffer: subscriber_buffer.max(1),
        }
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, events: Vec<RunEvent>) -> Result<Vec<u64>, EventStoreError> {
        let mut inner = self.inner.lock().await;
        let mut assigned = Vec::with_capacity(events.len());

        for mut event in events {
            let log = inner.events.entry(event.run_id.clone()).or_default();
            event.seq = log.len() as u64 + 1;
            assigned.push(event.seq);
            log.push(event.clone());

            if let Some(subs) = inner.subscribers.get_mut(&event.run_id) {
                subs.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(run_id = %event.run_id, seq = event.seq, "Subscriber buffer full, dropping event");
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        }

        Ok(assigned)
    }

    async fn load_events(&self, run_id: &RunId) -> Result<Vec<RunEvent>, EventStoreError> {
        self.load_events_from(run_id, 0).await
    }

    async fn load_events_from(
        &self,
        run_id: &RunId,
        from_seq: u64,
    ) -> Result<Vec<RunEvent>, EventStoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .get(run_id)
            .map(|log| {
                log.iter()
                    .filter(|e| e.seq >= from_seq)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn subscribe(&self, run_id: &RunId) -> Result<mpsc::Receiver<RunEvent>, EventStoreError> {
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        self.inner
            .lock()
            .await
            .subscribers
            .entry(run_id.clone())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_core::State;

    fn event(run: &str) -> RunEvent {
        RunEvent::state_changed(RunId::new(run), State::Intake, State::Explore, "")
    }

    #[tokio::test]
    async fn test_sequence_is_per_run() {
        let store = MemoryEventStore::default();
        let seqs = store
            .append(vec![event("a"), event("b"), event("a")])
            .await
            .unwrap();
        assert_eq!(seqs, vec![1, 1, 2]);

        let a = store.load_events(&RunId::new("a")).await.unwrap();
        assert_eq!(a.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_load_from_seq() {
        let store = MemoryEventStore::default();
        store
            .append((0..5).map(|_| event("a")).collect())
            .await
            .unwrap();
        let tail = store.load_events_from(&RunId::new("a"), 4).await.unwrap();
        assert_eq!(tail.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![4, 5]);
        assert!(store.load_events(&RunId::new("zzz")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_subscriber_drops_events() {
        let store = MemoryEventStore::new(2);
        let mut rx = store.subscribe(&RunId::new("a")).await.unwrap();

        store
            .append((0..4).map(|_| event("a")).collect())
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().seq, 1);
        assert_eq!(rx.recv().await.unwrap().seq, 2);
        assert!(rx.try_recv().is_err());

        // The append path kept every event.
        assert_eq!(store.load_events(&RunId::new("a")).await.unwrap().len(), 4);
    }
}
