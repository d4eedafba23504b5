use std::collections::HashMap;
use std::env;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use spacebar_bridge::bridge::{self, RelayDirection};
use spacebar_bridge::config::Config;
use spacebar_bridge::gateway::{EndpointConfig, GatewaySession};
use spacebar_bridge::pairstore::{pair_id, PairStore};
use spacebar_bridge::rest::RestClient;

const CONFIG_PATH: &str = "config.json";
const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    let file_appender = tracing_appender::rolling::never(".", "spacebar_bridge.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    match run().await {
        Ok(()) => std::process::exit(0),
        Err(reason) => {
            tracing::error!(%reason, "fatal error, exiting");
            eprintln!("fatal: {reason}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<(), String> {
    let config = Config::load(CONFIG_PATH).map_err(|e| format!("failed to load {CONFIG_PATH}: {e}"))?;

    let (discord_db_url, spacebar_db_url) = config.database.connection_urls();
    let discord_store = PairStore::connect(&discord_db_url).await.map_err(|e| format!("failed to open discord pair store: {e}"))?;
    let spacebar_store = PairStore::connect(&spacebar_db_url).await.map_err(|e| format!("failed to open spacebar pair store: {e}"))?;

    let mut discord_to_spacebar = HashMap::new();
    let mut spacebar_to_discord = HashMap::new();
    let mut discord_pair_ids = Vec::new();
    let mut spacebar_pair_ids = Vec::new();
    for bridge_pair in &config.bridges {
        discord_to_spacebar.insert(bridge_pair.discord_channel_id, bridge_pair.spacebar_channel_id);
        spacebar_to_discord.insert(bridge_pair.spacebar_channel_id, bridge_pair.discord_channel_id);

        let forward = pair_id(bridge_pair.discord_channel_id, bridge_pair.spacebar_channel_id);
        discord_store.create_table(&forward).await.map_err(|e| format!("failed to create table {forward}: {e}"))?;
        discord_pair_ids.push(forward);

        let backward = pair_id(bridge_pair.spacebar_channel_id, bridge_pair.discord_channel_id);
        spacebar_store.create_table(&backward).await.map_err(|e| format!("failed to create table {backward}: {e}"))?;
        spacebar_pair_ids.push(backward);
    }

    let http = reqwest::Client::new();
    let discord_gateway = GatewaySession::new(
        EndpointConfig {
            name: "discord".into(),
            api_host: config.discord.host.clone(),
            cdn_host: config.discord.cdn_host.clone(),
            token: config.discord.token.clone(),
            compress: true,
            supports_presence: true,
            custom_status: config.custom_status.clone(),
            custom_status_emoji: config.custom_status_emoji.clone(),
        },
        http.clone(),
    );
    let spacebar_gateway = GatewaySession::new(
        EndpointConfig {
            name: "spacebar".into(),
            api_host: config.spacebar.host.clone(),
            cdn_host: config.spacebar.cdn_host.clone(),
            token: config.spacebar.token.clone(),
            compress: false,
            supports_presence: false,
            custom_status: None,
            custom_status_emoji: None,
        },
        http,
    );

    discord_gateway.spawn();
    spacebar_gateway.spawn();

    wait_until_ready(&[discord_gateway.clone(), spacebar_gateway.clone()]).await?;
    tracing::info!("both gateways ready, starting relay loops");

    let discord_rest = RestClient::new(config.discord.host.clone(), config.discord.token.clone()).map_err(|e| format!("failed to build discord REST client: {e}"))?;
    let spacebar_rest = RestClient::new(config.spacebar.host.clone(), config.spacebar.token.clone()).map_err(|e| format!("failed to build spacebar REST client: {e}"))?;

    let discord_to_spacebar_dir = RelayDirection {
        name: "discord->spacebar",
        source_gateway: discord_gateway.clone(),
        source_cdn_host: config.discord.cdn_host.clone(),
        source_pair_store: discord_store.clone(),
        target_rest: spacebar_rest,
        target_pair_store: spacebar_store.clone(),
        target_guild_id: Some(config.spacebar_guild_id),
        channel_map: discord_to_spacebar,
    };
    let spacebar_to_discord_dir = RelayDirection {
        name: "spacebar->discord",
        source_gateway: spacebar_gateway.clone(),
        source_cdn_host: config.spacebar.cdn_host.clone(),
        source_pair_store: spacebar_store.clone(),
        target_rest: discord_rest,
        target_pair_store: discord_store.clone(),
        target_guild_id: Some(config.discord_guild_id),
        channel_map: spacebar_to_discord,
    };

    let run_flag = Arc::new(std::sync::atomic::AtomicBool::new(true));
    spawn_cleanup_task(discord_store, discord_pair_ids, config.database.cleanup_days, config.database.pair_lifetime_days, run_flag.clone());
    spawn_cleanup_task(spacebar_store, spacebar_pair_ids, config.database.cleanup_days, config.database.pair_lifetime_days, run_flag.clone());

    let relay_task = tokio::spawn(bridge::run(discord_to_spacebar_dir, spacebar_to_discord_dir, run_flag.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = relay_task => {
            tracing::error!("relay loops exited on their own");
        }
    }

    run_flag.store(false, Ordering::SeqCst);
    discord_gateway.stop();
    spacebar_gateway.stop();
    Ok(())
}

/// Blocks until every session reports `ready`, or returns the first fatal
/// error reported by any of them.
async fn wait_until_ready(sessions: &[Arc<GatewaySession>]) -> Result<(), String> {
    loop {
        let mut all_ready = true;
        for session in sessions {
            if let Some(reason) = session.fatal_error().await {
                return Err(reason);
            }
            if !session.is_ready() {
                all_ready = false;
            }
        }
        if all_ready {
            return Ok(());
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

/// Deletes rows older than `pair_lifetime_days` every `cleanup_days`, per
/// the pair store's periodic-cleanup contract.
fn spawn_cleanup_task(store: PairStore, pair_ids: Vec<String>, cleanup_days: i64, pair_lifetime_days: i64, run: Arc<std::sync::atomic::AtomicBool>) {
    let interval = Duration::from_secs((cleanup_days.max(1) as u64) * 86_400);
    tokio::spawn(async move {
        while run.load(Ordering::SeqCst) {
            tokio::time::sleep(interval).await;
            if !run.load(Ordering::SeqCst) {
                break;
            }
            store.cleanup(&pair_ids, pair_lifetime_days).await;
        }
    });
}
