//! up-to-date daemon entry point.

use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::signal;

use up_to_date::auth::CredentialIndex;
use up_to_date::notify::TelegramNotifier;
use up_to_date::{shutdown_channel, Config, DockerEngine, Scheduler, ShutdownTrigger};

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration problems are reported before logging exists.
    let settings = match Config::load().and_then(|c| c.validate()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("up-to-date: invalid configuration: {e}");
            return ExitCode::from(2);
        }
    };

    env_logger::Builder::new()
        .filter_level(settings.log_level)
        .parse_default_env()
        .init();

    info!("Starting up-to-date {}", env!("CARGO_PKG_VERSION"));
    info!(
        "interval={:?} cleanup={} label_enable={} label={} rolling_label={} health_timeout={:?}",
        settings.interval,
        settings.cleanup,
        settings.label_enable,
        settings.label,
        settings.rolling_label,
        settings.health.timeout
    );

    let credentials = match &settings.docker_config {
        Some(path) => match CredentialIndex::load(path) {
            Ok(index) => {
                info!("Loaded {} registry credential(s) from {}", index.len(), path.display());
                index
            }
            Err(e) => {
                warn!("Ignoring registry credentials: {}", e);
                CredentialIndex::default()
            }
        },
        None => CredentialIndex::default(),
    };

    let engine = match DockerEngine::connect().await {
        Ok(engine) => engine,
        Err(e) => {
            error!("Docker is unreachable: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut scheduler = Scheduler::new(Arc::new(engine), credentials, settings.clone());
    match (&settings.telegram_api_token, &settings.telegram_chat_id) {
        (Some(token), chat_id) => {
            match TelegramNotifier::new(token, chat_id.as_deref().unwrap_or_default()) {
                Ok(notifier) => {
                    info!("Telegram notifications enabled");
                    scheduler = scheduler.with_notifier(Arc::new(notifier));
                }
                Err(e) => warn!("Telegram notifications disabled: {}", e),
            }
        }
        (None, _) => info!("Telegram notifications disabled: no API token"),
    }

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal(trigger).await {
            error!("Unable to listen for shutdown signal: {}", e);
        }
    });

    scheduler.run(shutdown).await;
    info!("Shutdown complete.");
    ExitCode::SUCCESS
}

/// Fires `trigger` on Ctrl+C or SIGTERM and keeps it alive afterwards.
async fn wait_for_signal(trigger: ShutdownTrigger) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = signal::ctrl_c() => res?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    signal::ctrl_c().await?;

    info!("Received shutdown signal, finishing current cycle...");
    trigger.trigger();
    std::future::pending::<()>().await;
    Ok(())
}
