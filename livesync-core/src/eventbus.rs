//! src/eventbus.rs
//!
//! In-process notification bus with guaranteed delivery to multiple
//! subscribers via bounded MPSC queues, plus the process-wide shutdown flag.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};

use crate::models::StreamerState;

/// Each subscriber gets its own `mpsc::Sender<StreamerState>` for guaranteed
/// delivery.
///
/// - If a subscriber's queue fills, `publish` will await until there is
///   space again (backpressure). Notifications are never dropped.
/// - If the subscriber has dropped its `Receiver`, the channel is closed and
///   sending to it is skipped.
#[derive(Clone)]
pub struct StatusBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<StreamerState>>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Default size for each subscriber's queue.
const DEFAULT_BUFFER_SIZE: usize = 1024;

impl StatusBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    /// Fires the shutdown flag. Long-lived loops watching the flag stop at
    /// their next suspension point; in-flight work is allowed to finish.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// A fresh receiver on the shutdown flag, for `select!` loops.
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Returns a receiver on which status notifications will be delivered.
    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<StreamerState> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    /// Publish a status notification to all subscribers.
    pub async fn publish(&self, state: StreamerState) {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        for s in senders {
            let _ = s.send(state.clone()).await;
        }
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StreamStatus;
    use chrono::Utc;
    use tokio::time::{Duration, sleep, timeout};

    fn state(account_id: &str, status: StreamStatus) -> StreamerState {
        StreamerState {
            account_id: account_id.to_string(),
            status,
            changed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_notifications() {
        let bus = StatusBus::new();

        let mut rx1 = bus.subscribe(Some(5)).await;
        let mut rx2 = bus.subscribe(Some(5)).await;

        bus.publish(state("100", StreamStatus::Live)).await;

        let evt1 = rx1.recv().await.expect("rx1 should get notification");
        let evt2 = rx2.recv().await.expect("rx2 should get notification");

        assert_eq!(evt1.account_id, "100");
        assert_eq!(evt1.status, StreamStatus::Live);
        assert_eq!(evt2.account_id, "100");
    }

    #[tokio::test]
    async fn test_no_drop_when_queue_is_full() {
        let bus = StatusBus::new();
        let mut rx = bus.subscribe(Some(1)).await;

        // Fill the queue.
        bus.publish(state("first", StreamStatus::Live)).await;

        // Spawn a task that sleeps and then reads both notifications.
        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let first = rx.recv().await.unwrap();
            let second = rx.recv().await.unwrap();
            (first, second)
        });

        // The second publish must wait until the subscriber reads.
        let publish_fut = bus.publish(state("second", StreamStatus::Offline));
        let publish_res = timeout(Duration::from_millis(500), publish_fut).await;
        assert!(publish_res.is_ok(), "publish should eventually succeed");

        let (evt1, evt2) = handle.await.unwrap();
        assert_eq!(evt1.account_id, "first");
        assert_eq!(evt2.account_id, "second");
    }

    #[tokio::test]
    async fn test_shutdown_flag_observed() {
        let bus = StatusBus::new();
        let mut shutdown_rx = bus.shutdown_rx();

        assert!(!bus.is_shutdown());
        bus.shutdown();
        assert!(bus.is_shutdown());

        shutdown_rx.changed().await.expect("watch should update");
        assert!(*shutdown_rx.borrow());
    }
}
