// File: src/platforms/mod.rs

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Error;
use crate::models::ResolvedAccount;

/// TeamSpeak client connection kind as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    /// A regular voice client.
    Voice,
    /// A server query (non-voice) connection.
    Query,
}

impl ClientType {
    pub fn from_raw(raw: i64) -> Self {
        if raw == 0 {
            ClientType::Voice
        } else {
            ClientType::Query
        }
    }
}

/// A "client entered view" event from the chat server.
#[derive(Debug, Clone)]
pub struct ClientEnterView {
    pub client_db_id: u64,
    pub client_type: ClientType,
}

/// Batched live-status query against the streaming platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamStatusSource: Send + Sync {
    /// Returns the subset of `account_ids` that is currently broadcasting.
    async fn live_account_ids(&self, account_ids: &[String]) -> Result<HashSet<String>, Error>;
}

/// Batched login-name to account-id resolution.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountResolver: Send + Sync {
    /// Resolves login names to stable account ids in a single batched call.
    /// Names unknown to the platform are absent from the result.
    async fn resolve_accounts(&self, logins: &[String]) -> Result<Vec<ResolvedAccount>, Error>;
}

/// Query/mutate operations on a server group's member list.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupMembershipApi: Send + Sync {
    async fn group_members(&self, group_id: u64) -> Result<Vec<u64>, Error>;
    async fn add_group_member(&self, group_id: u64, client_db_id: u64) -> Result<(), Error>;
    async fn remove_group_member(&self, group_id: u64, client_db_id: u64) -> Result<(), Error>;
}

/// Subscription to the chat server's connect events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectEventSource: Send + Sync {
    /// Registers the subscription once and returns the event stream.
    /// Registration failure is fatal to the caller.
    async fn subscribe_connects(&self)
    -> Result<mpsc::UnboundedReceiver<ClientEnterView>, Error>;
}

pub mod teamspeak;
pub mod twitch;
