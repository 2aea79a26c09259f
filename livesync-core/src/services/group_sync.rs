// File: src/services/group_sync.rs
//
// Brings the server group's member list in line with the monitor's verdicts.
// Two triggers feed the same reconciliation routine: connect events from the
// chat server and status notifications from the monitor. Each trigger re-reads
// the group member list before acting, so racing reconciliations for the same
// account converge on the correct end state.

use std::sync::Arc;

use tokio::select;
use tracing::{debug, error, info, warn};

use crate::Error;
use crate::eventbus::StatusBus;
use crate::models::{AccountLinks, StreamStatus, StreamerState};
use crate::platforms::{ClientEnterView, ClientType, ConnectEventSource, GroupMembershipApi};
use crate::services::monitor::StreamMonitor;

pub struct GroupSync {
    membership: Arc<dyn GroupMembershipApi>,
    events: Arc<dyn ConnectEventSource>,
    monitor: Arc<StreamMonitor>,
    links: Arc<AccountLinks>,
    bus: Arc<StatusBus>,
    group_id: u64,
}

impl GroupSync {
    pub fn new(
        membership: Arc<dyn GroupMembershipApi>,
        events: Arc<dyn ConnectEventSource>,
        monitor: Arc<StreamMonitor>,
        links: Arc<AccountLinks>,
        bus: Arc<StatusBus>,
        group_id: u64,
    ) -> Self {
        Self {
            membership,
            events,
            monitor,
            links,
            bus,
            group_id,
        }
    }

    /// Registers the connect-event subscription and spawns the drain loop.
    /// Subscription failure is fatal; without it the hook cannot function.
    pub async fn start(self: Arc<Self>) -> Result<(), Error> {
        let mut connects = self.events.subscribe_connects().await?;
        let mut notifications = self.bus.subscribe(None).await;
        let mut shutdown_rx = self.bus.shutdown_rx();

        info!(group_id = self.group_id, "starting group sync hook");
        let sync = self;
        tokio::spawn(async move {
            loop {
                select! {
                    Some(state) = notifications.recv() => {
                        let sync = Arc::clone(&sync);
                        tokio::spawn(async move {
                            sync.handle_notification(state).await;
                        });
                    }
                    Some(event) = connects.recv() => {
                        let sync = Arc::clone(&sync);
                        tokio::spawn(async move {
                            sync.handle_connect(event).await;
                        });
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("group sync hook stopping");
                            return;
                        }
                    }
                    else => {
                        warn!("group sync event sources closed");
                        return;
                    }
                }
            }
        });
        Ok(())
    }

    async fn handle_connect(&self, event: ClientEnterView) {
        if event.client_type != ClientType::Voice {
            return;
        }
        let Some(account_id) = self.links.account_for_member(event.client_db_id) else {
            debug!(
                client_db_id = event.client_db_id,
                "connect event for unmonitored client"
            );
            return;
        };
        let Some(state) = self.monitor.get_state(account_id).await else {
            // No poll has completed yet; the baseline notification will
            // cover this client.
            debug!(account_id = %account_id, "no streamer state yet, ignoring connect");
            return;
        };
        self.reconcile(event.client_db_id, state.status).await;
    }

    async fn handle_notification(&self, state: StreamerState) {
        let Some(client_db_id) = self.links.member_for_account(&state.account_id) else {
            debug!(
                account_id = %state.account_id,
                "notification for unmapped account dropped"
            );
            return;
        };
        self.reconcile(client_db_id, state.status).await;
    }

    /// Read-then-act membership update. Any failure aborts this attempt only;
    /// the next trigger for the account retries the full sequence.
    async fn reconcile(&self, client_db_id: u64, status: StreamStatus) {
        let members = match self.membership.group_members(self.group_id).await {
            Ok(members) => members,
            Err(e) => {
                error!(
                    error = %e,
                    group_id = self.group_id,
                    "could not retrieve server group members"
                );
                return;
            }
        };
        let present = members.contains(&client_db_id);
        match (status.is_live(), present) {
            (true, true) | (false, false) => {
                debug!(
                    client_db_id,
                    group_id = self.group_id,
                    live = status.is_live(),
                    "group membership already in sync"
                );
            }
            (true, false) => {
                if let Err(e) = self
                    .membership
                    .add_group_member(self.group_id, client_db_id)
                    .await
                {
                    warn!(
                        error = %e,
                        client_db_id,
                        group_id = self.group_id,
                        "could not add client to server group"
                    );
                } else {
                    info!(
                        client_db_id,
                        group_id = self.group_id,
                        "added live streamer to server group"
                    );
                }
            }
            (false, true) => {
                if let Err(e) = self
                    .membership
                    .remove_group_member(self.group_id, client_db_id)
                    .await
                {
                    warn!(
                        error = %e,
                        client_db_id,
                        group_id = self.group_id,
                        "could not remove client from server group"
                    );
                } else {
                    info!(
                        client_db_id,
                        group_id = self.group_id,
                        "removed offline streamer from server group"
                    );
                }
            }
        }
    }
}
