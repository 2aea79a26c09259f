// File: src/platforms/twitch/client.rs

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use tracing::debug;

use crate::Error;
use crate::models::ResolvedAccount;
use crate::platforms::twitch::requests::{StreamsResponse, TokenValidation, UsersResponse};
use crate::platforms::{AccountResolver, StreamStatusSource};

const HELIX_BASE: &str = "https://api.twitch.tv/helix";
const OAUTH_VALIDATE_URL: &str = "https://id.twitch.tv/oauth2/validate";

/// Helix batches id/login query parameters at 100 entries per request.
const HELIX_BATCH_LIMIT: usize = 100;

/// A small wrapper client for the Helix endpoints the daemon needs: batched
/// live-stream lookup, batched user lookup and app-token validation.
pub struct TwitchClient {
    http: Arc<ReqwestClient>,
    bearer_token: String,
    client_id: String,
}

impl TwitchClient {
    /// - `bearer_token`: an app access token
    /// - `client_id`: the application's client id
    pub fn new(bearer_token: &str, client_id: &str) -> Self {
        Self {
            http: Arc::new(ReqwestClient::new()),
            bearer_token: bearer_token.to_string(),
            client_id: client_id.to_string(),
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("Client-Id", &self.client_id)
            .header("Authorization", format!("Bearer {}", self.bearer_token))
    }

    /// Validates the configured app access token. An invalid token is an
    /// `Error::Auth`; callers treat it as fatal at startup.
    pub async fn validate_token(&self) -> Result<TokenValidation, Error> {
        let resp = self
            .http
            .get(OAUTH_VALIDATE_URL)
            .header("Authorization", format!("OAuth {}", self.bearer_token))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Auth("Twitch app access token is invalid".into()));
        }
        if !resp.status().is_success() {
            return Err(Error::UnexpectedStatus {
                endpoint: "oauth2/validate",
                status: resp.status().as_u16(),
            });
        }
        let validation = resp.json::<TokenValidation>().await?;
        Ok(validation)
    }
}

#[async_trait]
impl StreamStatusSource for TwitchClient {
    async fn live_account_ids(&self, account_ids: &[String]) -> Result<HashSet<String>, Error> {
        let mut live = HashSet::new();
        for batch in account_ids.chunks(HELIX_BATCH_LIMIT) {
            let params: String = batch
                .iter()
                .map(|id| format!("&user_id={id}"))
                .collect();
            let url = format!("{HELIX_BASE}/streams?type=live&first={HELIX_BATCH_LIMIT}{params}");
            let resp = self.get(&url).send().await?;
            if !resp.status().is_success() {
                return Err(Error::UnexpectedStatus {
                    endpoint: "helix/streams",
                    status: resp.status().as_u16(),
                });
            }
            let parsed = resp.json::<StreamsResponse>().await?;
            debug!(streams = parsed.data.len(), "fetched live streams from Twitch API");
            live.extend(parsed.data.into_iter().map(|s| s.user_id));
        }
        Ok(live)
    }
}

#[async_trait]
impl AccountResolver for TwitchClient {
    async fn resolve_accounts(&self, logins: &[String]) -> Result<Vec<ResolvedAccount>, Error> {
        if logins.is_empty() {
            return Ok(Vec::new());
        }
        debug!(names = logins.len(), "fetching Twitch user ids");
        let mut accounts = Vec::new();
        for batch in logins.chunks(HELIX_BATCH_LIMIT) {
            let params: String = batch
                .iter()
                .map(|login| format!("&login={login}"))
                .collect();
            let url = format!("{HELIX_BASE}/users?{}", params.trim_start_matches('&'));
            let resp = self.get(&url).send().await?;
            if !resp.status().is_success() {
                return Err(Error::UnexpectedStatus {
                    endpoint: "helix/users",
                    status: resp.status().as_u16(),
                });
            }
            let parsed = resp.json::<UsersResponse>().await?;
            accounts.extend(parsed.data.into_iter().map(|u| ResolvedAccount {
                login: u.login,
                account_id: u.id,
            }));
        }
        debug!(ids = accounts.len(), "fetched Twitch user ids");
        Ok(accounts)
    }
}
