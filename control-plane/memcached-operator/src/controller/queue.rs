//! Deduplicating work queue of Memcached keys.
//!
//! A key is queued at most once and processed by at most one worker at a
//! time. Adding a key that is being processed marks it dirty; it is queued
//! again when the worker calls [`WorkQueue::done`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::store::ObjectKey;

#[derive(Default)]
struct QueueState {
    queued: HashSet<ObjectKey>,
    in_flight: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
}

pub struct WorkQueue {
    tx: flume::Sender<ObjectKey>,
    rx: flume::Receiver<ObjectKey>,
    state: Mutex<QueueState>,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, rx) = flume::bounded(capacity.max(1));
        Arc::new(Self {
            tx,
            rx,
            state: Mutex::new(QueueState::default()),
        })
    }

    /// Enqueue `key` unless it is already waiting. Waits for room when the
    /// channel is full.
    pub async fn add(&self, key: ObjectKey) {
        {
            let mut state = self.state.lock().await;
            if state.queued.contains(&key) {
                trace!(%key, "already queued");
                return;
            }
            if state.in_flight.contains(&key) {
                trace!(%key, "in flight, marked dirty");
                state.dirty.insert(key);
                return;
            }
            state.queued.insert(key.clone());
        }
        // the queue owns a receiver, so the channel never disconnects
        let _ = self.tx.send_async(key).await;
    }

    /// Enqueue `key` once `delay` has passed, unless cancelled first.
    pub fn add_after(
        self: &Arc<Self>,
        key: ObjectKey,
        delay: Duration,
        cancel: CancellationToken,
    ) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => queue.add(key).await,
            }
        });
    }

    /// Next key to process, or `None` once cancelled. The key stays in
    /// flight until [`WorkQueue::done`].
    pub async fn next(&self, cancel: &CancellationToken) -> Option<ObjectKey> {
        let key = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            key = self.rx.recv_async() => key.ok()?,
        };
        let mut state = self.state.lock().await;
        state.queued.remove(&key);
        state.in_flight.insert(key.clone());
        Some(key)
    }

    /// Release `key`; requeue it if it was added while in flight.
    pub async fn done(self: &Arc<Self>, key: &ObjectKey) {
        let requeue = {
            let mut state = self.state.lock().await;
            state.in_flight.remove(key);
            state.dirty.remove(key)
        };
        if requeue {
            // sending from a worker could block every worker on a full
            // channel
            let queue = Arc::clone(self);
            let key = key.clone();
            tokio::spawn(async move { queue.add(key).await });
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
