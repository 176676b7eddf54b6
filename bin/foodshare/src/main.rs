//! # FoodShare Binary
//!
//! The entry point that assembles the application based on compile-time
//! features and owns the expiry sweeper for the life of the process.

use std::sync::Arc;

use anyhow::Context;
use fs_config::Settings;
use fs_core::{ExpirySweeper, Marketplace, Notifier};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "db-sqlite")]
use fs_db_sqlite::SqliteStore;

#[cfg(feature = "notify-log")]
use fs_notify_log::LogNotifier;

#[cfg(not(feature = "db-sqlite"))]
compile_error!("foodshare needs a storage backend; enable the `db-sqlite` feature");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings);

    // 1. Initialize Database Implementation
    let store = Arc::new(
        SqliteStore::connect(&settings.database.url, settings.database.max_connections)
            .await
            .context("opening sqlite store")?,
    );

    // 2. Initialize Notification Implementation
    let notifier = build_notifier(&settings);

    // 3. Wire the inbound surface; the HTTP layer mounts it once it exists
    let _marketplace = Arc::new(
        Marketplace::new(store.clone(), store.clone(), notifier)
            .with_default_radius(settings.discovery.default_radius_m),
    );

    // 4. Start the background sweep
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(store.clone())
        .with_interval(settings.sweeper.interval())
        .spawn(shutdown_rx);

    info!(
        radius_m = settings.discovery.default_radius_m,
        sweep_secs = settings.sweeper.interval_secs,
        "FoodShare running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown requested");

    let _ = shutdown_tx.send(true);
    sweeper.await.context("expiry sweeper task panicked")?;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum NotifierKind {
    Noop,
    Log,
}

fn notifier_kind(settings: &Settings) -> NotifierKind {
    if !settings.notifications.enabled {
        NotifierKind::Noop
    } else if cfg!(feature = "notify-log") {
        NotifierKind::Log
    } else {
        NotifierKind::Noop
    }
}

fn build_notifier(settings: &Settings) -> Arc<dyn Notifier> {
    match notifier_kind(settings) {
        #[cfg(feature = "notify-log")]
        NotifierKind::Log => Arc::new(LogNotifier::new(settings.notifications.frontend_url.clone())),
        _ => {
            info!(
                enabled = settings.notifications.enabled,
                "notification delivery off; claims and decisions will not be announced"
            );
            Arc::new(fs_core::NoopNotifier)
        }
    }
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log.level));

    if settings.log.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fs_config::{
        DatabaseSettings, DiscoverySettings, LogSettings, NotificationSettings, SweeperSettings,
    };

    fn settings(enabled: bool) -> Settings {
        Settings {
            database: DatabaseSettings {
                url: "sqlite::memory:".into(),
                max_connections: 1,
            },
            sweeper: SweeperSettings { interval_secs: 60 },
            discovery: DiscoverySettings {
                default_radius_m: 5_000.0,
            },
            notifications: NotificationSettings {
                enabled,
                frontend_url: "http://localhost:5173".into(),
            },
            log: LogSettings {
                level: "info".into(),
                json: false,
            },
        }
    }

    #[test]
    fn test_disabled_notifications_use_noop() {
        assert_eq!(notifier_kind(&settings(false)), NotifierKind::Noop);
    }

    #[cfg(feature = "notify-log")]
    #[test]
    fn test_enabled_notifications_use_log() {
        assert_eq!(notifier_kind(&settings(true)), NotifierKind::Log);
    }
}
