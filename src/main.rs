use anyhow::Context;
use serde_json::Value;
use tracing::{info, warn};

use guild_leveling::{
    leveling::record::is_reserved,
    Config, DataStore,
};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    // ========================================================================
    // 1. Resolve configuration (environment only)
    // ========================================================================
    let config = Config::from_env().context("invalid configuration")?;

    // ========================================================================
    // 2. Open the store and load it into the cache
    // ========================================================================
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let document = rt.block_on(async {
        let store = DataStore::open(&config)
            .await
            .context("failed to open the data store")?;
        Ok::<_, anyhow::Error>(store.all())
    })?;

    // ========================================================================
    // 3. Summarise and dump
    // ========================================================================
    let Value::Object(guilds) = &document else {
        warn!("Store document is not an object");
        return Ok(());
    };
    for (guild_id, entry) in guilds {
        let users = entry
            .as_object()
            .map(|fields| fields.keys().filter(|key| !is_reserved(key)).count())
            .unwrap_or(0);
        info!("guild {}: {} users", guild_id, users);
    }
    info!("{} guilds in store", guilds.len());

    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}
