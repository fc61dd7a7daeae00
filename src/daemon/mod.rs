mod auth;
mod dbus;
mod health;
mod session;

use crate::core::settings::Settings;
use crate::core::store::FeedStore;
use crate::feeds::{FeedAdapter, HttpFeed};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub use auth::AuthWatcher;
pub use health::{HealthMonitor, HttpHealthProbe};
pub use session::PollingSession;

pub const DBUS_NAME: &str = "io.github.DisruptionPoller";
pub const DBUS_PATH: &str = "/io/github/DisruptionPoller";

pub async fn run() -> Result<()> {
    tracing::info!("Starting disruption-poller daemon");

    let settings = Settings::load()?;
    let session = PollingSession::new(settings.polling.coordinator_config());
    let adapter = FeedAdapter::new(FeedStore::new());
    let timeout = Duration::from_secs(settings.backend.timeout_secs);

    let token_path = settings.auth.resolved_token_path();
    let (_auth_watcher, auth_rx, _static_auth) = match &token_path {
        Some(path) => {
            let (watcher, rx) = AuthWatcher::start(path.clone())?;
            (Some(watcher), rx, None)
        }
        None => {
            tracing::warn!("No session token path available, treating session as authenticated");
            let (tx, rx) = watch::channel(true);
            (None, rx, Some(tx))
        }
    };
    session.set_authenticated(*auth_rx.borrow());

    let (health_rx, _static_health) = match &settings.backend.health_url {
        Some(url) => {
            let probe = HttpHealthProbe::new(url.as_str(), timeout)?;
            let interval = Duration::from_secs(settings.backend.health_interval_secs);
            let (rx, _handle) = HealthMonitor::new(probe, interval).spawn();
            (rx, None)
        }
        None => {
            tracing::info!("No backend health URL configured, assuming backend is reachable");
            let (tx, rx) = watch::channel(true);
            (rx, Some(tx))
        }
    };

    let mut handles = Vec::with_capacity(settings.feeds.len());
    for feed in &settings.feeds {
        let fetcher = Arc::new(HttpFeed::from_config(feed, token_path.clone(), timeout)?);
        let options = adapter
            .poll_options(&feed.key, fetcher, feed.interval())
            .requires_auth(feed.requires_auth)
            .pause_when_backend_down(feed.pause_when_backend_down);
        let handle = session
            .register_poll(options)
            .with_context(|| format!("Failed to register feed '{}'", feed.key))?;
        handles.push(handle);
    }

    {
        let session = session.clone();
        tokio::spawn(async move { session.follow_signals(health_rx, auth_rx).await });
    }

    let service = dbus::PollerService::new(session.clone(), adapter.store().clone());
    let _dbus_connection = dbus::start_dbus_server(service).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!(feeds = handles.len(), "Shutting down");
    for handle in &handles {
        handle.cleanup();
        adapter.store().remove(handle.key()).await;
        tracing::debug!(key = handle.key(), "Feed removed");
    }
    session.shutdown();
    Ok(())
}
