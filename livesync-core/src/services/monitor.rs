// File: src/services/monitor.rs
//
// Polls the streaming platform for the live status of all monitored accounts
// and publishes debounced transitions on the status bus.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info};

use crate::Error;
use crate::eventbus::StatusBus;
use crate::models::{StreamStatus, StreamerState};
use crate::platforms::StreamStatusSource;

/// Consecutive confirming polls required before a status change is committed.
/// Suppresses membership flapping on short API glitches or reconnects.
const CONFIRMATIONS_REQUIRED: u32 = 3;

/// Hysteresis progress for one account whose observations currently disagree
/// with its committed status.
#[derive(Debug, Clone, Copy)]
struct PendingChange {
    status: StreamStatus,
    count: u32,
}

#[derive(Default)]
struct MonitorState {
    states: HashMap<String, StreamerState>,
    pending: HashMap<String, PendingChange>,
    /// Set once the first successful poll has established the baseline.
    initialized: bool,
}

/// Owns the authoritative live/offline view of every monitored account.
///
/// The state map is only ever mutated under the internal lock; readers get
/// copies via [`StreamMonitor::get_state`], never references into the map.
pub struct StreamMonitor {
    source: Arc<dyn StreamStatusSource>,
    account_ids: Vec<String>,
    poll_interval: Duration,
    bus: Arc<StatusBus>,
    state: Mutex<MonitorState>,
}

impl StreamMonitor {
    pub fn new(
        source: Arc<dyn StreamStatusSource>,
        account_ids: Vec<String>,
        poll_interval: Duration,
        bus: Arc<StatusBus>,
    ) -> Self {
        Self {
            source,
            account_ids,
            poll_interval,
            bus,
            state: Mutex::new(MonitorState::default()),
        }
    }

    /// Spawns the background polling loop. The first poll happens one full
    /// interval after this call; the loop runs until the bus shutdown flag
    /// fires.
    pub fn start(self: Arc<Self>) {
        info!(
            interval = ?self.poll_interval,
            accounts = self.account_ids.len(),
            "starting stream monitor"
        );
        let monitor = self;
        let mut shutdown_rx = monitor.bus.shutdown_rx();
        tokio::spawn(async move {
            let mut ticker = interval_at(
                Instant::now() + monitor.poll_interval,
                monitor.poll_interval,
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = monitor.poll_once().await {
                            error!(error = %e, "could not update streamer states");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("stream monitor stopping");
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Snapshot read of an account's committed state. `None` until the first
    /// successful poll, or for unknown account ids.
    pub async fn get_state(&self, account_id: &str) -> Option<StreamerState> {
        let state = self.state.lock().await;
        state.states.get(account_id).cloned()
    }

    pub(crate) async fn poll_once(&self) -> Result<(), Error> {
        let live = self.source.live_account_ids(&self.account_ids).await?;
        let changed = {
            let mut state = self.state.lock().await;
            self.apply_observations(&mut state, &live)
        };
        // Published outside the lock; a slow consumer backpressures the poll
        // loop here rather than blocking state reads.
        for notification in changed {
            self.bus.publish(notification).await;
        }
        Ok(())
    }

    /// Folds one round of observations into the committed states, returning
    /// the notifications to publish.
    fn apply_observations(
        &self,
        state: &mut MonitorState,
        live: &HashSet<String>,
    ) -> Vec<StreamerState> {
        let now = Utc::now();
        let mut changed = Vec::new();

        if !state.initialized {
            // Baseline: commit every account directly and notify once each.
            for account_id in &self.account_ids {
                let status = observed_status(live, account_id);
                let streamer = StreamerState {
                    account_id: account_id.clone(),
                    status,
                    changed_at: now,
                };
                state.states.insert(account_id.clone(), streamer.clone());
                changed.push(streamer);
            }
            state.initialized = true;
            return changed;
        }

        let MonitorState {
            states, pending, ..
        } = state;
        for account_id in &self.account_ids {
            let observed = observed_status(live, account_id);
            let Some(current) = states.get_mut(account_id) else {
                continue;
            };
            if current.status == observed {
                if pending.remove(account_id).is_some() {
                    debug!(account_id = %account_id, "transient status flap absorbed");
                }
                continue;
            }
            match pending.get_mut(account_id) {
                None => {
                    pending.insert(
                        account_id.clone(),
                        PendingChange {
                            status: observed,
                            count: 1,
                        },
                    );
                }
                Some(change) if change.status == observed => {
                    change.count += 1;
                    if change.count >= CONFIRMATIONS_REQUIRED {
                        current.status = observed;
                        current.changed_at = now;
                        info!(
                            account_id = %account_id,
                            live = observed.is_live(),
                            "streamer status change confirmed"
                        );
                        changed.push(current.clone());
                        pending.remove(account_id);
                    }
                }
                Some(_) => {
                    // The candidate flipped before confirmation; the flicker
                    // reverted.
                    pending.remove(account_id);
                }
            }
        }
        changed
    }
}

fn observed_status(live: &HashSet<String>, account_id: &str) -> StreamStatus {
    if live.contains(account_id) {
        StreamStatus::Live
    } else {
        StreamStatus::Offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::MockStreamStatusSource;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::time::{advance, sleep};

    /// Mock source whose live set can be swapped between polls.
    fn scripted_source(live: Arc<StdMutex<HashSet<String>>>) -> Arc<MockStreamStatusSource> {
        let mut source = MockStreamStatusSource::new();
        source
            .expect_live_account_ids()
            .returning(move |_| Ok(live.lock().unwrap().clone()));
        Arc::new(source)
    }

    fn live_set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn monitor_with(
        live: Arc<StdMutex<HashSet<String>>>,
        accounts: &[&str],
        bus: Arc<StatusBus>,
    ) -> Arc<StreamMonitor> {
        Arc::new(StreamMonitor::new(
            scripted_source(live),
            accounts.iter().map(|id| id.to_string()).collect(),
            Duration::from_millis(10),
            bus,
        ))
    }

    #[tokio::test]
    async fn first_poll_notifies_every_account_once() {
        let live = Arc::new(StdMutex::new(live_set(&["1"])));
        let bus = Arc::new(StatusBus::new());
        let monitor = monitor_with(live, &["1", "2"], bus.clone());
        let mut rx = bus.subscribe(None).await;

        monitor.poll_once().await.unwrap();

        let mut statuses = HashMap::new();
        for _ in 0..2 {
            let state = rx.recv().await.unwrap();
            statuses.insert(state.account_id, state.status);
        }
        assert_eq!(statuses.get("1"), Some(&StreamStatus::Live));
        assert_eq!(statuses.get("2"), Some(&StreamStatus::Offline));
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[tokio::test]
    async fn change_commits_only_after_confirmation_threshold() {
        let live = Arc::new(StdMutex::new(HashSet::new()));
        let bus = Arc::new(StatusBus::new());
        let monitor = monitor_with(live.clone(), &["alice"], bus.clone());
        let mut rx = bus.subscribe(None).await;

        // Baseline: offline.
        monitor.poll_once().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().status, StreamStatus::Offline);

        *live.lock().unwrap() = live_set(&["alice"]);
        for _ in 0..2 {
            monitor.poll_once().await.unwrap();
            assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
        }

        // Third confirming observation commits and notifies exactly once.
        monitor.poll_once().await.unwrap();
        let state = rx.recv().await.unwrap();
        assert_eq!(state.account_id, "alice");
        assert_eq!(state.status, StreamStatus::Live);
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);

        let committed = monitor.get_state("alice").await.unwrap();
        assert_eq!(committed.status, StreamStatus::Live);
    }

    #[tokio::test]
    async fn single_poll_flicker_never_commits() {
        let live = Arc::new(StdMutex::new(HashSet::new()));
        let bus = Arc::new(StatusBus::new());
        let monitor = monitor_with(live.clone(), &["bob"], bus.clone());
        let mut rx = bus.subscribe(None).await;

        monitor.poll_once().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().status, StreamStatus::Offline);

        // live, offline, live: each reversal discards the pending change.
        for observed in [live_set(&["bob"]), HashSet::new(), live_set(&["bob"])] {
            *live.lock().unwrap() = observed;
            monitor.poll_once().await.unwrap();
            assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
        }

        let committed = monitor.get_state("bob").await.unwrap();
        assert_eq!(committed.status, StreamStatus::Offline);
    }

    #[tokio::test]
    async fn get_state_is_none_before_first_poll() {
        let live = Arc::new(StdMutex::new(HashSet::new()));
        let bus = Arc::new(StatusBus::new());
        let monitor = monitor_with(live, &["1"], bus);

        assert!(monitor.get_state("1").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_happens_after_one_interval() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let mut source = MockStreamStatusSource::new();
        source.expect_live_account_ids().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HashSet::new())
        });
        let bus = Arc::new(StatusBus::new());
        let monitor = Arc::new(StreamMonitor::new(
            Arc::new(source),
            vec!["1".to_string()],
            Duration::from_millis(100),
            bus.clone(),
        ));
        let mut rx = bus.subscribe(None).await;

        monitor.start();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 0);

        advance(Duration::from_millis(60)).await;
        let state = rx.recv().await.unwrap();
        assert_eq!(state.status, StreamStatus::Offline);
        assert!(polls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_errors_do_not_stop_the_loop() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let mut source = MockStreamStatusSource::new();
        source
            .expect_live_account_ids()
            .times(1)
            .returning(|_| Err(Error::Platform("boom".into())));
        source.expect_live_account_ids().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HashSet::new())
        });
        let bus = Arc::new(StatusBus::new());
        let monitor = Arc::new(StreamMonitor::new(
            Arc::new(source),
            vec!["1".to_string()],
            Duration::from_millis(10),
            bus.clone(),
        ));
        let mut rx = bus.subscribe(None).await;

        monitor.start();

        // The failed first poll is swallowed; the second establishes the
        // baseline.
        let state = rx.recv().await.unwrap();
        assert_eq!(state.account_id, "1");
        assert!(polls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_polling_loop() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let mut source = MockStreamStatusSource::new();
        source.expect_live_account_ids().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HashSet::new())
        });
        let bus = Arc::new(StatusBus::new());
        let monitor = Arc::new(StreamMonitor::new(
            Arc::new(source),
            vec!["1".to_string()],
            Duration::from_millis(10),
            bus.clone(),
        ));

        monitor.start();
        bus.shutdown();
        sleep(Duration::from_millis(5)).await;
        let after_shutdown = polls.load(Ordering::SeqCst);

        advance(Duration::from_millis(100)).await;
        sleep(Duration::from_millis(1)).await;
        assert_eq!(polls.load(Ordering::SeqCst), after_shutdown);
    }
}
