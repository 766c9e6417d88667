mod config;
mod logging;
mod notifier;
mod paths;
mod probe;
mod reconcile;
mod recovery;
mod render;
mod scheduler;
mod status;
mod store;

use std::sync::Arc;
use tokio::sync::watch;

use crate::notifier::Notifier;
use crate::probe::MinecraftProber;
use crate::reconcile::{Policy, Reconciler};
use crate::render::NoticeRenderer;
use crate::scheduler::Schedule;
use crate::store::{ChannelId, DiscordStore, MessageStore};

#[tokio::main]
async fn main() {
    logging::init_logging();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path();
    if !config_path.exists() {
        tracing::warn!(
            "No config file at {}; using defaults and environment",
            config_path.display()
        );
    }
    let mut config = match config::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("[config] {e:#}");
            std::process::exit(1);
        }
    };
    config.apply_env();
    if let Err(e) = config.validate() {
        tracing::error!("[config] {e:#}");
        std::process::exit(1);
    }
    let token = match config::discord_token() {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("[config] {e:#}");
            std::process::exit(1);
        }
    };

    // ── Message store ─────────────────────────────────────────────────────────
    let store: Arc<dyn MessageStore> = match DiscordStore::new(
        &config.discord.api_base,
        &token,
        config.monitor.store_timeout(),
    ) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to build Discord client: {e}");
            std::process::exit(1);
        }
    };
    let channel_id = ChannelId(config.discord.channel_id.clone());

    // ── Recovery ──────────────────────────────────────────────────────────────
    let startup = match recovery::bootstrap(
        store.as_ref(),
        &channel_id,
        config.monitor.effective_recovery_window(),
    )
    .await
    {
        Ok(startup) => startup,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };
    tracing::info!(
        "Posting as {} ({}) in #{}",
        startup.me.username,
        startup.me.id,
        startup.channel.name.as_deref().unwrap_or(startup.channel.id.0.as_str())
    );

    // ── Reconciler ────────────────────────────────────────────────────────────
    let renderer = NoticeRenderer::new(&config.server, &config.notice, config.role_id());
    let notifier = Notifier::new(Arc::clone(&store), channel_id, renderer, &config.alerts);
    let policy = Policy {
        alert_on_player_change: config.alerts.on_player_change,
    };
    let reconciler = Reconciler::new(startup.recovered, notifier, policy);

    let prober = MinecraftProber::new(
        config.server.host.clone(),
        config.server.port,
        config.monitor.probe_timeout(),
    );

    // Graceful shutdown on Ctrl+C / SIGTERM.
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown requested; finishing the current cycle");
        let _ = stop_tx.send(true);
    });

    let schedule = Schedule {
        interval: config.monitor.poll_interval(),
        probe_immediately: config.monitor.probe_on_startup,
    };
    tracing::info!(
        "Watching {}:{} every {:?}",
        config.server.host,
        config.server.port,
        schedule.interval
    );

    // ── Poll loop ─────────────────────────────────────────────────────────────
    let reconciler = scheduler::run(schedule, Box::new(prober), reconciler, stop_rx).await;

    match reconciler.handle() {
        Some(handle) => tracing::info!(
            "Stopped; notice {handle} shows {}",
            reconciler.snapshot()
        ),
        None => tracing::info!("Stopped; no notice published"),
    }
}

/// Resolves on the first Ctrl+C, or SIGTERM on Unix. Never resolves if no
/// handler could be installed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Ctrl+C handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
