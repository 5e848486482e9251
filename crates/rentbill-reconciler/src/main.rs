//! Rentbill reconciler binary

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rentbill_common::{
    gateway::{LedgerGateway, Notifier, SettingsStore},
    VERSION,
};
use rentbill_hcloud::HcloudGateway;
use rentbill_reconciler::{
    config::StorageBackend,
    notify::{LogNotifier, TelegramNotifier},
    Reconciler, ReconcilerConfig, ReconcilerMetrics,
};
use rentbill_store::{run_migrations, InMemoryLedger, InMemorySettings, RedisLedger};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Rentbill reconciler v{}", VERSION);

    let config = ReconcilerConfig::load()?;
    info!(
        backend = ?config.storage.backend,
        interval_secs = config.scheduler.interval_secs,
        operators = config.telegram.operator_ids.len(),
        "Loaded configuration"
    );

    let (ledger, settings): (Arc<dyn LedgerGateway>, Arc<dyn SettingsStore>) =
        match config.storage.backend {
            StorageBackend::Redis => {
                let ledger = RedisLedger::connect(&config.storage.redis_url)
                    .await
                    .context("Failed to connect to Redis")?
                    .with_prefix(&config.storage.key_prefix);
                let report = run_migrations(&ledger).await?;
                info!(from = report.from_version, to = report.to_version, "Schema ready");
                let settings: Arc<dyn SettingsStore> = Arc::new(ledger.settings());
                let ledger: Arc<dyn LedgerGateway> = Arc::new(ledger);
                (ledger, settings)
            }
            StorageBackend::Memory => {
                warn!("Using in-memory ledger; state is lost on restart");
                let ledger = InMemoryLedger::new();
                run_migrations(&ledger).await?;
                let ledger: Arc<dyn LedgerGateway> = Arc::new(ledger);
                let settings: Arc<dyn SettingsStore> = Arc::new(InMemorySettings::new());
                (ledger, settings)
            }
        };

    if config.hcloud.token.is_empty() {
        warn!("No Hetzner Cloud token configured; provider calls will fail");
    }
    let resources = Arc::new(HcloudGateway::with_base_url(
        config.hcloud.token.clone(),
        &config.hcloud.base_url,
        config.scheduler.call_timeout(),
    ));

    let notifier: Arc<dyn Notifier> = match &config.telegram.bot_token {
        Some(token) if !token.is_empty() => Arc::new(TelegramNotifier::new(
            &config.telegram.api_base,
            token,
            config.telegram.operator_ids.clone(),
            config.scheduler.call_timeout(),
        )),
        _ => {
            warn!("No Telegram bot token configured; notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    let registry = prometheus::Registry::new();
    let metrics = ReconcilerMetrics::new()?;
    metrics.register(&registry)?;

    let reconciler = Arc::new(
        Reconciler::new(
            ledger,
            resources,
            notifier,
            settings,
            config.scheduler.clone(),
        )
        .with_metrics(metrics),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move { reconciler.run(shutdown_rx).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C signal handler")?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    worker.await.context("Reconciler task panicked")?;

    info!(
        metrics = %ReconcilerMetrics::render(&registry),
        "Reconciler shut down"
    );
    Ok(())
}
