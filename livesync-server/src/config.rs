// livesync-server/src/config.rs
//
// Layered configuration: embedded defaults, then the TOML file, then
// LIVESYNC_-prefixed environment variables.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use livesync_core::Error;

pub const DEFAULT_CONFIG_PATH: &str = "livesync.toml";

const DEFAULT_CONFIG: &str = include_str!("../config/defaults.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub twitch: TwitchConfig,
    pub teamspeak: TeamSpeakConfig,
    pub sync: SyncConfig,
    #[serde(default)]
    pub accounts: Vec<AccountPair>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitchConfig {
    pub client_id: String,
    pub app_access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamSpeakConfig {
    pub base_url: String,
    pub events_url: String,
    pub api_key: String,
    pub server_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub poll_interval_secs: u64,
    pub server_group_id: u64,
}

/// One configured pairing between a TeamSpeak client and a Twitch account.
/// `member` is a client database id, or a client unique identifier that is
/// resolved at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountPair {
    pub member: String,
    pub twitch_login: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        dotenv::dotenv().ok();

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            DEFAULT_CONFIG,
            config::FileFormat::Toml,
        ));
        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("LIVESYNC")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| Error::Config(format!("could not load configuration: {e}")))?;
        let config: Config = settings
            .try_deserialize()
            .map_err(|e| Error::Config(format!("could not deserialize configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the commented default configuration for the operator to fill in.
    pub fn write_template(path: &Path) -> Result<(), Error> {
        fs::write(path, DEFAULT_CONFIG)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval_secs)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.sync.server_group_id == 0 {
            return Err(Error::Config("sync.server_group_id must be set".into()));
        }
        if self.sync.poll_interval_secs == 0 {
            return Err(Error::Config(
                "sync.poll_interval_secs must be at least 1".into(),
            ));
        }
        for (field, value) in [
            ("twitch.client_id", &self.twitch.client_id),
            ("twitch.app_access_token", &self.twitch.app_access_token),
            ("teamspeak.api_key", &self.teamspeak.api_key),
        ] {
            if value.is_empty() || value.starts_with('<') {
                return Err(Error::Config(format!("{field} is not configured")));
            }
        }
        Ok(())
    }
}
