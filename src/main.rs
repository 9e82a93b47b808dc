#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

mod config;
mod db;
mod discord;
mod engine;
mod pagination;
mod retention;
mod sessions;
mod utils;

use config::Config;

/// Actor recorded on requests rolled back by the bot itself rather than a
/// reviewer.
const SYSTEM_ACTOR: &str = "system";

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::load()?);
    utils::logging::init_tracing(&config.logging.level, &config.logging.format);
    info!("fac review bot starting up");

    let db_manager = Arc::new(db::DatabaseManager::new(&config.database).await?);
    db_manager.migrate().await?;

    let http = discord::HttpHandle::new();
    let api = Arc::new(discord::DiscordApi::new(http.clone()));

    let engine = Arc::new(engine::RequestEngine::new(
        db_manager.request_store(),
        db_manager.guild_config_store(),
        api.clone(),
        api.clone(),
        api.clone(),
        SYSTEM_ACTOR.to_string(),
    ));

    let sessions = Arc::new(sessions::SessionStore::new(Duration::from_secs(
        config.sessions.ttl_secs,
    )));
    let _session_sweeper =
        sessions.spawn_sweeper(Duration::from_secs(config.sessions.sweep_interval_secs));

    let retention = Arc::new(retention::RetentionSweeper::new(
        db_manager.request_store(),
        &config.retention,
    ));
    let _retention_sweeper = retention.spawn();

    let discord_client = Arc::new(discord::DiscordClient::new(
        config.clone(),
        http,
        engine,
        sessions,
        db_manager.guild_config_store(),
    ));
    discord_client.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    discord_client.stop().await?;
    info!("fac review bot stopped");
    Ok(())
}
