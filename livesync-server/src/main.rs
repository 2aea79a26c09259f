// livesync-server/src/main.rs

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use livesync_core::Error;
use livesync_core::eventbus::StatusBus;
use livesync_core::models::AccountLinks;
use livesync_core::platforms::AccountResolver;
use livesync_core::platforms::teamspeak::{TeamSpeakClient, TsEventFeed};
use livesync_core::platforms::twitch::TwitchClient;
use livesync_core::services::{GroupSync, StreamMonitor};

mod config;
use crate::config::Config;

#[derive(Parser, Debug, Clone)]
#[command(name = "livesync")]
#[command(
    author,
    version,
    about = "Keeps a TeamSpeak server group in sync with Twitch live status"
)]
struct Args {
    /// Path to the TOML config file.
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("livesync=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub).expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    if !args.config.exists() {
        Config::write_template(&args.config)?;
        info!(
            path = %args.config.display(),
            "written default config, please update the values"
        );
        return Ok(());
    }

    let config = Config::load(&args.config)?;
    if let Err(e) = run(config).await {
        error!("server error: {e:?}");
        return Err(e.into());
    }
    info!("shut down livesync, goodbye!");
    Ok(())
}

async fn run(config: Config) -> Result<(), Error> {
    // 1) TeamSpeak query client; the version probe verifies connectivity and
    //    the API key before anything else starts.
    let teamspeak = Arc::new(TeamSpeakClient::new(
        &config.teamspeak.base_url,
        &config.teamspeak.api_key,
        config.teamspeak.server_id,
    )?);
    let version = teamspeak.version().await?;
    info!(
        version = %version.version,
        build = %version.build,
        platform = %version.platform,
        "retrieved TeamSpeak server version"
    );

    // 2) Account pairs from config; unique identifiers fall back to a
    //    database-id lookup.
    let mut pairs = Vec::new();
    for entry in &config.accounts {
        let db_id = match entry.member.parse::<u64>() {
            Ok(id) => id,
            Err(_) => match teamspeak.client_db_id_from_uid(&entry.member).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(
                        identifier = %entry.member,
                        error = %e,
                        "could not retrieve TeamSpeak database id"
                    );
                    continue;
                }
            },
        };
        pairs.push((db_id, entry.twitch_login.clone()));
    }
    info!(pairs = pairs.len(), "fetched account pairs");

    // 3) Twitch client; an invalid app access token is fatal.
    let twitch = Arc::new(TwitchClient::new(
        &config.twitch.app_access_token,
        &config.twitch.client_id,
    ));
    let validation = twitch.validate_token().await?;
    info!(
        client_id = %validation.client_id,
        expires_in = validation.expires_in,
        "validated Twitch app access token"
    );

    // 4) Resolve login names to stable account ids and build the link table.
    let logins: Vec<String> = pairs.iter().map(|(_, login)| login.clone()).collect();
    let resolved = twitch.resolve_accounts(&logins).await?;
    if resolved.len() != logins.len() {
        warn!(
            requested = logins.len(),
            resolved = resolved.len(),
            "some Twitch logins could not be resolved"
        );
    }
    let links = Arc::new(AccountLinks::build(&pairs, &resolved));
    if links.is_empty() {
        warn!("no monitorable account pairs configured, nothing to sync");
    }

    // 5) Wire the engine and start both halves.
    let bus = Arc::new(StatusBus::new());
    let monitor = Arc::new(StreamMonitor::new(
        twitch.clone(),
        links.account_ids(),
        config.poll_interval(),
        bus.clone(),
    ));
    monitor.clone().start();

    let events = Arc::new(TsEventFeed::new(
        &config.teamspeak.events_url,
        &config.teamspeak.api_key,
        bus.shutdown_rx(),
    ));
    let sync = Arc::new(GroupSync::new(
        teamspeak.clone(),
        events,
        monitor.clone(),
        links,
        bus.clone(),
        config.sync.server_group_id,
    ));
    sync.start().await?;

    wait_for_shutdown().await;
    info!("stopping stream monitor and group sync hook...");
    bus.shutdown();
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                error!(error = %e, "could not install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
