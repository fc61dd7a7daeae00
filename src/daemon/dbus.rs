use crate::core::models::StatusReport;
use crate::core::store::FeedStore;
use crate::daemon::session::PollingSession;
use crate::daemon::{DBUS_NAME, DBUS_PATH};
use anyhow::{Context, Result};
use chrono::Utc;
use zbus::interface;

pub struct PollerService {
    session: PollingSession,
    store: FeedStore,
}

impl PollerService {
    pub fn new(session: PollingSession, store: FeedStore) -> Self {
        Self { session, store }
    }

    async fn report(&self) -> StatusReport {
        let coordinator = self.session.coordinator();
        StatusReport {
            backend_available: coordinator.is_backend_available(),
            authenticated: coordinator.is_auth_granted(),
            polls: coordinator.poll_statuses(),
            feeds: self.store.all().await.into_iter().collect(),
            generated_at: Utc::now(),
        }
    }
}

#[interface(name = "io.github.DisruptionPoller")]
impl PollerService {
    async fn foreground_regained(&self) -> u32 {
        tracing::info!("D-Bus ForegroundRegained called");
        self.session.foreground().emit() as u32
    }

    async fn poll_status(&self) -> zbus::fdo::Result<String> {
        let report = self.report().await;
        serde_json::to_string(&report).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    #[zbus(property)]
    fn backend_available(&self) -> bool {
        self.session.coordinator().is_backend_available()
    }

    #[zbus(property)]
    fn authenticated(&self) -> bool {
        self.session.coordinator().is_auth_granted()
    }
}

pub async fn start_dbus_server(service: PollerService) -> Result<zbus::Connection> {
    let connection = zbus::connection::Builder::session()
        .context("Failed to connect to session D-Bus")?
        .name(DBUS_NAME)
        .context("Failed to request D-Bus name")?
        .serve_at(DBUS_PATH, service)
        .context("Failed to register D-Bus object")?
        .build()
        .await
        .context("Failed to start D-Bus server")?;

    tracing::info!(name = DBUS_NAME, path = DBUS_PATH, "D-Bus service started");
    Ok(connection)
}
