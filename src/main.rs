mod bot;
mod config;
mod platform;
mod webhook;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Default log filter; `RUST_LOG` overrides it. Debug mode lets the
/// Bot API request traces (emitted by teloxide-core) through.
fn default_filter(debug: bool) -> &'static str {
    if debug {
        "info,telegram_webhook_bridge=debug,teloxide_core=trace"
    } else {
        "info"
    }
}

/// Log a fatal error through tracing, with its cause chain, and hand it back
/// for `main` to return.
fn fatal(e: anyhow::Error) -> anyhow::Error {
    error!("{:#}", e);
    e
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; real environment variables win anyway.
    let dotenv = dotenvy::dotenv();

    // Resolve before logging starts so DEBUG can raise the default level.
    let config = Config::load();
    let debug = config.as_ref().map(|c| c.debug).unwrap_or(false);

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(debug).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Telegram to Webhook bridge...");
    if let Ok(path) = dotenv {
        info!("Loaded environment from: {}", path.display());
    }

    let config = config.context("Configuration error").map_err(fatal)?;

    info!("Configuration loaded successfully");
    info!("  Bots: {}", config.bots.len());
    info!("  Debug: {}", config.debug);
    if let Some(url) = &config.telegram_api_url {
        info!("  Bot API: {}", url);
    }

    // One independent worker per bot; they share nothing but the config
    // they were started with.
    let mut workers = JoinSet::new();
    for (index, bot) in config.bots.iter().cloned().enumerate() {
        workers.spawn(bot::run(
            index + 1,
            bot,
            config.telegram_api_url.clone(),
            config.debug,
        ));
    }

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            // An unusable token takes the whole process down with it.
            Ok(Err(e)) => {
                return Err(fatal(
                    anyhow::Error::new(e).context("Bot authorization failed"),
                ))
            }
            Err(e) => error!("Bot worker crashed: {}", e),
        }
    }

    warn!("All bots have stopped; idling until terminated");
    std::future::pending::<()>().await;

    Ok(())
}
