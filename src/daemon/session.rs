use crate::polling::{
    CoordinatorConfig, ForegroundSignal, PollError, PollHandle, PollOptions, PollingCoordinator,
};
use tokio::sync::watch;

/// One coordinator per application session, plus the plumbing that feeds it
/// availability, auth and foreground transitions.
#[derive(Clone)]
pub struct PollingSession {
    coordinator: PollingCoordinator,
    foreground: ForegroundSignal,
}

impl PollingSession {
    pub fn new(config: CoordinatorConfig) -> Self {
        let coordinator = PollingCoordinator::new(config);
        let foreground = ForegroundSignal::new();
        coordinator.setup_window_focus_listener(&foreground);

        Self {
            coordinator,
            foreground,
        }
    }

    pub fn coordinator(&self) -> &PollingCoordinator {
        &self.coordinator
    }

    pub fn foreground(&self) -> &ForegroundSignal {
        &self.foreground
    }

    pub fn register_poll(&self, options: PollOptions) -> Result<PollHandle, PollError> {
        self.coordinator.register(options)
    }

    /// Returns whether the value was a transition.
    pub fn set_backend_available(&self, available: bool) -> bool {
        if self.coordinator.is_backend_available() == available {
            return false;
        }

        if available {
            tracing::info!("Backend reachable again");
            self.coordinator.resume_health_aware_polls(true);
        } else {
            tracing::warn!("Backend unreachable");
            self.coordinator.pause_health_aware_polls();
        }
        true
    }

    /// Returns whether the value was a transition.
    pub fn set_authenticated(&self, authenticated: bool) -> bool {
        if self.coordinator.is_auth_granted() == authenticated {
            return false;
        }

        if authenticated {
            tracing::info!("Session authenticated");
            self.coordinator.resume_authenticated_polls();
        } else {
            tracing::info!("Session signed out");
            self.coordinator.pause_authenticated_polls();
        }
        true
    }

    /// Applies health and auth updates until both senders are gone.
    pub async fn follow_signals(
        &self,
        mut health: watch::Receiver<bool>,
        mut auth: watch::Receiver<bool>,
    ) {
        self.set_backend_available(*health.borrow_and_update());
        self.set_authenticated(*auth.borrow_and_update());

        let mut health_open = true;
        let mut auth_open = true;

        while health_open || auth_open {
            tokio::select! {
                changed = health.changed(), if health_open => match changed {
                    Ok(()) => {
                        let available = *health.borrow_and_update();
                        self.set_backend_available(available);
                    }
                    Err(_) => health_open = false,
                },
                changed = auth.changed(), if auth_open => match changed {
                    Ok(()) => {
                        let authenticated = *auth.borrow_and_update();
                        self.set_authenticated(authenticated);
                    }
                    Err(_) => auth_open = false,
                },
            }
        }

        tracing::debug!("Health and auth signals closed");
    }

    pub fn shutdown(&self) {
        self.coordinator.dispose();
    }
}
