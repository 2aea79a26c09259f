// File: src/platforms/teamspeak/client.rs
//
// WebQuery client for the handful of server commands the daemon uses. All
// WebQuery values arrive as strings, numeric fields included.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::Error;
use crate::platforms::GroupMembershipApi;

/// Envelope every WebQuery response is wrapped in.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
struct QueryResponse<T> {
    #[serde(default)]
    body: Option<Vec<T>>,
    status: QueryStatus,
}

#[derive(Debug, Deserialize)]
struct QueryStatus {
    code: i64,
    message: String,
}

/// Response body of the `version` command.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub build: String,
    pub platform: String,
}

#[derive(Debug, Deserialize)]
struct GroupClientEntry {
    cldbid: String,
}

#[derive(Debug, Deserialize)]
struct DbIdEntry {
    cldbid: String,
}

pub struct TeamSpeakClient {
    http: Arc<ReqwestClient>,
    base_url: String,
    api_key: String,
    server_id: u64,
}

impl TeamSpeakClient {
    pub fn new(base_url: &str, api_key: &str, server_id: u64) -> Result<Self, Error> {
        // Parse once up front so a malformed base url fails at startup.
        Url::parse(base_url)?;
        Ok(Self {
            http: Arc::new(ReqwestClient::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            server_id,
        })
    }

    async fn run_command<T: DeserializeOwned>(
        &self,
        command: &'static str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, Error> {
        let mut url = Url::parse(&format!("{}/{}/{}", self.base_url, self.server_id, command))?;
        url.query_pairs_mut().extend_pairs(params.iter());
        let resp = self
            .http
            .get(url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::UnexpectedStatus {
                endpoint: command,
                status: resp.status().as_u16(),
            });
        }
        let envelope = resp.json::<QueryResponse<T>>().await?;
        if envelope.status.code != 0 {
            return Err(Error::QueryCommand {
                command,
                code: envelope.status.code,
                message: envelope.status.message,
            });
        }
        Ok(envelope.body.unwrap_or_default())
    }

    /// Server version probe, used once at startup to verify connectivity and
    /// the API key.
    pub async fn version(&self) -> Result<VersionInfo, Error> {
        let mut body = self.run_command::<VersionInfo>("version", &[]).await?;
        body.pop()
            .ok_or_else(|| Error::Platform("empty version response".into()))
    }

    /// Looks up a client's database id by its unique identifier.
    pub async fn client_db_id_from_uid(&self, client_uid: &str) -> Result<u64, Error> {
        let body = self
            .run_command::<DbIdEntry>("clientgetdbidfromuid", &[("cluid", client_uid.to_string())])
            .await?;
        let entry = body
            .first()
            .ok_or_else(|| Error::Platform(format!("no database id for uid {client_uid}")))?;
        parse_db_id(&entry.cldbid)
    }
}

fn parse_db_id(raw: &str) -> Result<u64, Error> {
    raw.parse::<u64>()
        .map_err(|_| Error::Parse(format!("invalid client database id: {raw}")))
}

#[async_trait]
impl GroupMembershipApi for TeamSpeakClient {
    async fn group_members(&self, group_id: u64) -> Result<Vec<u64>, Error> {
        let body = self
            .run_command::<GroupClientEntry>(
                "servergroupclientlist",
                &[("sgid", group_id.to_string())],
            )
            .await?;
        let mut members = Vec::with_capacity(body.len());
        for entry in body {
            match parse_db_id(&entry.cldbid) {
                Ok(id) => members.push(id),
                Err(e) => warn!(error = %e, "skipping malformed server group entry"),
            }
        }
        debug!(group_id, members = members.len(), "fetched server group members");
        Ok(members)
    }

    async fn add_group_member(&self, group_id: u64, client_db_id: u64) -> Result<(), Error> {
        self.run_command::<serde_json::Value>(
            "servergroupaddclient",
            &[
                ("sgid", group_id.to_string()),
                ("cldbid", client_db_id.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn remove_group_member(&self, group_id: u64, client_db_id: u64) -> Result<(), Error> {
        self.run_command::<serde_json::Value>(
            "servergroupdelclient",
            &[
                ("sgid", group_id.to_string()),
                ("cldbid", client_db_id.to_string()),
            ],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parses_ok_response() {
        let payload = r#"{
            "body": [
                {"cldbid": "5", "client_nickname": "alice"},
                {"cldbid": "7", "client_nickname": "bob"}
            ],
            "status": {"code": 0, "message": "ok"}
        }"#;

        let parsed: QueryResponse<GroupClientEntry> = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.status.code, 0);
        let body = parsed.body.unwrap();
        assert_eq!(body.len(), 2);
        assert_eq!(body[0].cldbid, "5");
    }

    #[test]
    fn envelope_parses_error_response_without_body() {
        let payload = r#"{"status": {"code": 1538, "message": "invalid parameter"}}"#;

        let parsed: QueryResponse<GroupClientEntry> = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.status.code, 1538);
        assert!(parsed.body.is_none());
    }

    #[test]
    fn db_id_parsing_rejects_garbage() {
        assert_eq!(parse_db_id("42").unwrap(), 42);
        assert!(parse_db_id("forty-two").is_err());
    }
}
