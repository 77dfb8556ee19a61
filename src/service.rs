//! Long-running relay: listener, dispatcher and HTTP server wired from one
//! [`Config`].

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{Config, TelegramMode};
use crate::media::Transcoder;
use crate::pipeline::{self, Dispatcher, HandlerSettings, MediaIngestionHandler};
use crate::server::{AppState, Server};
use crate::telegram::{
    ChannelListener, ChannelRef, TelegramApi, TelegramClient, TelegramDownloader,
    HOSTED_DOWNLOAD_LIMIT,
};
use crate::youtube;

/// Make Telegram deliver updates the way `telegram.mode` expects.
async fn register_updates(client: &TelegramClient, config: &Config) -> Result<()> {
    match config.telegram.mode {
        TelegramMode::Webhook => match config.telegram.webhook_url.as_deref() {
            Some(url) if !url.trim().is_empty() => {
                client
                    .set_webhook(url.trim(), config.telegram.webhook_secret.as_deref())
                    .await
                    .context("Failed to register Telegram webhook")?;
                info!("Registered Telegram webhook {}", url.trim());
            }
            _ => warn!(
                "telegram.webhook_url is not set; the webhook must already be registered with setWebhook"
            ),
        },
        TelegramMode::Polling => {
            if let Err(e) = client.delete_webhook().await {
                warn!("Could not clear a previous webhook: {:#}", e);
            }
        }
    }
    Ok(())
}

/// How long in-flight uploads get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub async fn run(config: Config) -> Result<()> {
    let bot_token = config
        .telegram
        .bot_token
        .clone()
        .context("telegram.bot_token is not set")?;
    let channel = ChannelRef::parse(config.telegram.channel.as_deref().unwrap_or_default())?;

    if config.telegram.mode == TelegramMode::Webhook && !config.server.enabled {
        anyhow::bail!("telegram.mode = \"webhook\" requires server.enabled = true");
    }

    let work_dir = config.work_dir();
    tokio::fs::create_dir_all(&work_dir)
        .await
        .with_context(|| format!("Failed to create work dir {}", work_dir.display()))?;

    let client = TelegramClient::with_api_base(bot_token, config.telegram.api_base.clone());
    register_updates(&client, &config).await?;
    let size_limit = client.is_hosted().then_some(HOSTED_DOWNLOAD_LIMIT);
    let api: Arc<dyn TelegramApi> = Arc::new(client);

    let downloader = Arc::new(TelegramDownloader::new(api.clone()).with_size_limit(size_limit));
    let uploader = Arc::new(youtube::build_uploader(&config)?);
    let handler = Arc::new(
        MediaIngestionHandler::new(downloader, uploader, HandlerSettings::from_config(&config))
            .with_transcoder(Transcoder::from_config(&config.transcode)),
    );

    let (queue, receiver) = pipeline::channel(config.pipeline.queue_capacity);
    let dispatcher = Dispatcher::new(receiver, handler, config.pipeline.max_concurrent_jobs);
    let dispatch_task = tokio::spawn(dispatcher.run());

    let listener = Arc::new(
        ChannelListener::new(api, channel, queue.clone())
            .with_poll_timeout(config.telegram.poll_timeout)
            .with_animations(config.telegram.include_animations),
    );

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    if config.telegram.mode == TelegramMode::Polling {
        let polling = listener.clone();
        tasks.spawn(async move {
            polling.run().await;
            Ok(())
        });
    } else {
        info!(
            "Listening for videos in {} (webhook at /telegram/webhook)",
            listener.channel()
        );
    }

    if config.server.enabled {
        let server = Server::new(AppState::new(config.clone(), listener.clone(), queue.clone()));
        tasks.spawn(server.run());
    }

    drop(queue);
    drop(listener);

    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown signal received"),
        Some(joined) = tasks.join_next() => match joined {
            Ok(Ok(())) => warn!("A service task exited unexpectedly"),
            Ok(Err(e)) => error!("Service task failed: {:#}", e),
            Err(e) => error!("Service task panicked: {}", e),
        },
    }

    // Dropping the listener and server releases the last queue senders,
    // which lets the dispatcher drain and stop.
    tasks.shutdown().await;

    match tokio::time::timeout(SHUTDOWN_GRACE, dispatch_task).await {
        Ok(Ok(summary)) => info!(
            "Stopped ({} published, {} skipped, {} errored)",
            summary.done, summary.skipped, summary.errored
        ),
        Ok(Err(e)) => error!("Dispatcher panicked: {}", e),
        Err(_) => warn!(
            "In-flight uploads did not finish within {}s; their local files may remain in {}",
            SHUTDOWN_GRACE.as_secs(),
            work_dir.display()
        ),
    }

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
