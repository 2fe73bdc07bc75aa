mod auth;
mod bootstrap;
mod health;
mod scheduler;

use anyhow::Result;
use leadsweep_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use leadsweep_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.tokens.clone(),
    )
    .await?;
    auth::spawn(&app.config.server.bind_address, app.config.server.port, app.tokens.clone())
        .await?;
    let _scheduler = scheduler::spawn(app.processor.clone());

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "leadsweep-server started"
    );

    let bot_runner = app.bot_runner;
    let bot_task = tokio::spawn(async move { bot_runner.start().await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        result = bot_task => {
            match result {
                Ok(Ok(())) => tracing::warn!(
                    event_name = "system.server.bot_stopped",
                    correlation_id = "runtime",
                    "bot runner stopped; scheduler keeps running without the bot"
                ),
                Ok(Err(error)) => tracing::error!(
                    event_name = "system.server.bot_failed",
                    correlation_id = "runtime",
                    error = %error,
                    "bot runner failed; scheduler keeps running without the bot"
                ),
                Err(error) => tracing::error!(
                    event_name = "system.server.bot_task_failed",
                    correlation_id = "runtime",
                    error = %error,
                    "bot runner task ended unexpectedly"
                ),
            }
            tokio::signal::ctrl_c().await?;
        }
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "leadsweep-server stopping"
    );

    Ok(())
}
