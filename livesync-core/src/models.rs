// src/models.rs
//
// Domain types shared by the monitor and the group-sync hook.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Broadcast status of a monitored account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Offline,
    Live,
}

impl StreamStatus {
    pub fn is_live(self) -> bool {
        matches!(self, StreamStatus::Live)
    }
}

/// Committed status of one monitored account. Owned by the monitor; everything
/// outside the monitor only ever sees copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamerState {
    /// Stable Twitch account id (not the login name).
    pub account_id: String,
    pub status: StreamStatus,
    /// When the committed status last changed (or was first established).
    pub changed_at: DateTime<Utc>,
}

/// A login name resolved to its stable account id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub login: String,
    pub account_id: String,
}

/// Immutable two-way mapping between TeamSpeak client database ids and Twitch
/// account ids. Built once at startup and shared read-only afterwards.
#[derive(Debug, Default)]
pub struct AccountLinks {
    member_to_account: HashMap<u64, String>,
    account_to_member: HashMap<String, u64>,
}

impl AccountLinks {
    /// Joins the configured (database id, twitch login) pairs with the resolver
    /// output. Pairs whose login did not resolve are dropped; login matching is
    /// case-insensitive since Twitch logins are lowercased server-side.
    pub fn build(pairs: &[(u64, String)], resolved: &[ResolvedAccount]) -> Self {
        let mut links = AccountLinks::default();
        for (db_id, login) in pairs {
            let account = resolved
                .iter()
                .find(|r| r.login.eq_ignore_ascii_case(login));
            if let Some(account) = account {
                links
                    .member_to_account
                    .insert(*db_id, account.account_id.clone());
                links
                    .account_to_member
                    .insert(account.account_id.clone(), *db_id);
            }
        }
        links
    }

    pub fn account_for_member(&self, client_db_id: u64) -> Option<&str> {
        self.member_to_account
            .get(&client_db_id)
            .map(String::as_str)
    }

    pub fn member_for_account(&self, account_id: &str) -> Option<u64> {
        self.account_to_member.get(account_id).copied()
    }

    /// All linked account ids, i.e. the set the monitor should poll.
    pub fn account_ids(&self) -> Vec<String> {
        self.account_to_member.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.member_to_account.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_to_account.is_empty()
    }
}
