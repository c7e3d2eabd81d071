//! Run command - poll loop plus command handling

use anyhow::{Context, Result};
use news_digest_adapters::{
    outbox::{OutboxTransport, OutboxWriter},
    state::{InMemorySubscriptionStore, SqliteSubscriptionStore},
    telegram::{TelegramBotApi, TelegramBotTransport, TelegramPreviewSource, TelegramUpdates},
};
use news_digest_domain::{
    ChannelResult, CycleReport, DeliveryTransport, SourceGateway, SubscriptionStore, SystemClock,
    usecases::{CommandHandler, DeliveryController, Dispatcher, PollEngine},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::args::RunArgs;
use crate::commands::load_secret;
use crate::commands::normalize::build_normalizer;
use crate::config::AppConfig;

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    tracing::info!(
        once = args.once,
        outbox = ?args.outbox,
        ephemeral = args.ephemeral,
        state_db = %config.general.state_db_path.display(),
        interval_secs = config.polling.interval_secs,
        "Starting news-digest run"
    );

    // A single cycle into an outbox never talks to the Bot API
    let needs_bot = !args.once || args.outbox.is_none();
    let bot_api = if needs_bot {
        Some(build_bot_api(&config)?)
    } else {
        None
    };

    let store: Arc<dyn SubscriptionStore> = if args.ephemeral {
        tracing::warn!("Subscriptions are kept in memory and lost on exit");
        Arc::new(
            InMemorySubscriptionStore::new()
                .with_max_subscriptions(config.general.max_subscriptions),
        )
    } else {
        Arc::new(
            SqliteSubscriptionStore::new(&config.general.state_db_path)
                .await
                .context("Failed to initialize SQLite subscription store")?
                .with_max_subscriptions(config.general.max_subscriptions),
        )
    };

    let gateway = Arc::new(
        TelegramPreviewSource::with_base_url(
            &config.telegram.preview_base_url,
            Duration::from_secs(config.telegram.request_timeout_secs),
        )
        .context("Failed to initialize channel preview source")?,
    );

    let transport: Arc<dyn DeliveryTransport> = match (&args.outbox, &bot_api) {
        (Some(path), _) => {
            let writer = OutboxWriter::new(path.clone())
                .await
                .context("Failed to initialize outbox writer")?;
            tracing::info!(outbox = %path.display(), "Writing deliveries to outbox");
            Arc::new(OutboxTransport::new(writer))
        }
        (None, Some(api)) => Arc::new(TelegramBotTransport::new(api.clone())),
        (None, None) => anyhow::bail!("No delivery transport available"),
    };

    let delivery = Arc::new(DeliveryController::new(
        Arc::clone(&transport),
        config.delivery.delivery_config(),
    ));
    let normalizer = Arc::new(build_normalizer(&config)?);

    let engine = PollEngine::new(
        Arc::clone(&store),
        Arc::clone(&gateway),
        Arc::clone(&delivery),
        normalizer,
        config.polling.engine_config(),
    );

    if args.once {
        tracing::info!("Running single poll cycle");
        let report = engine.poll_once().await.context("Poll cycle failed")?;
        log_report(&report);
    } else {
        let api = bot_api.context("Bot API required for continuous mode")?;
        let updates = Arc::new(TelegramUpdates::new(
            api,
            Duration::from_secs(config.telegram.long_poll_timeout_secs),
        ));
        let commands = CommandHandler::new(Arc::clone(&store), Arc::new(SystemClock))
            .with_poll_interval(engine.config().poll_interval);
        let dispatcher = Dispatcher::new(updates, commands, Arc::clone(&delivery));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Set up graceful shutdown
        let signal = async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
            }
            let _ = shutdown_tx.send(true);
        };

        tokio::join!(
            engine.run(shutdown_rx.clone()),
            dispatcher.run(shutdown_rx),
            signal
        );
    }

    gateway.close().await;
    transport.close().await;

    tracing::info!("news-digest run completed");
    Ok(())
}

fn build_bot_api(config: &AppConfig) -> Result<TelegramBotApi> {
    let token = load_secret(&config.telegram.bot_token_env, "telegram bot token")?;
    TelegramBotApi::with_base_url(
        token,
        config.telegram.api_base_url.clone(),
        Duration::from_secs(config.telegram.request_timeout_secs),
    )
    .context("Failed to initialize Telegram Bot API client")
}

fn log_report(report: &CycleReport) {
    for outcome in &report.channels {
        match &outcome.result {
            ChannelResult::Advanced {
                from,
                to,
                delivered,
                dropped,
                failed_deliveries,
            } => {
                tracing::info!(
                    channel = %outcome.channel,
                    from = %from,
                    to = %to,
                    delivered,
                    dropped,
                    failed_deliveries,
                    "Channel advanced"
                );
            }
            ChannelResult::NoNewPosts => {
                tracing::debug!(channel = %outcome.channel, "No new posts");
            }
            ChannelResult::Failed { error } => {
                tracing::error!(channel = %outcome.channel, error = %error, "Channel failed");
            }
        }
    }

    tracing::info!(
        channels = report.channels.len(),
        delivered = report.delivered(),
        failed_channels = report.failed_channels(),
        "Poll cycle complete"
    );
}
