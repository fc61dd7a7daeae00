use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub type PollFuture = BoxFuture<'static, anyhow::Result<()>>;
pub type PollCallback = Arc<dyn Fn() -> PollFuture + Send + Sync>;

/// Everything needed to register one periodic refresh.
#[derive(Clone)]
pub struct PollOptions {
    pub(crate) key: String,
    pub(crate) callback: PollCallback,
    pub(crate) interval: Duration,
    pub(crate) requires_auth: bool,
    pub(crate) pause_when_backend_down: bool,
}

impl PollOptions {
    pub fn new<F, Fut>(key: impl Into<String>, interval: Duration, callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback: PollCallback = Arc::new(move || -> PollFuture { Box::pin(callback()) });

        Self {
            key: key.into(),
            callback,
            interval,
            requires_auth: false,
            pause_when_backend_down: true,
        }
    }

    pub fn requires_auth(mut self, requires_auth: bool) -> Self {
        self.requires_auth = requires_auth;
        self
    }

    pub fn pause_when_backend_down(mut self, pause: bool) -> Self {
        self.pause_when_backend_down = pause;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for PollOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollOptions")
            .field("key", &self.key)
            .field("interval", &self.interval)
            .field("requires_auth", &self.requires_auth)
            .field("pause_when_backend_down", &self.pause_when_backend_down)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Unscheduled,
    Scheduled,
    Running,
    Paused,
    Disposed,
}

/// The two process-wide conditions a poll may be gated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Gates {
    pub auth_granted: bool,
    pub backend_available: bool,
}

impl Default for Gates {
    fn default() -> Self {
        Self {
            auth_granted: true,
            backend_available: true,
        }
    }
}

/// Read-only snapshot of one registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollStatus {
    pub key: String,
    pub state: PollState,
    pub is_paused: bool,
    pub explicitly_paused: bool,
    pub requires_auth: bool,
    pub pause_when_backend_down: bool,
    pub interval_ms: u64,
    pub registration_order: usize,
    pub runs: u64,
    pub failures: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed_at: Option<DateTime<Utc>>,
}

pub(crate) struct Registration {
    pub id: u64,
    pub key: String,
    pub callback: PollCallback,
    pub interval: Duration,
    pub requires_auth: bool,
    pub pause_when_backend_down: bool,
    pub explicitly_paused: bool,
    pub registration_order: usize,
    pub state: PollState,
    /// Bumped on every cancellation so a timer that already woke up can tell
    /// it has been superseded.
    pub epoch: u64,
    pub timer: Option<JoinHandle<()>>,
    pub in_flight: bool,
    /// Delay requested while a run was in flight, applied once it settles.
    pub pending_delay: Option<Duration>,
    /// Id of the replaced registration whose run is still in flight. Its
    /// completion is handed to this registration.
    pub superseded: Option<u64>,
    pub runs: u64,
    pub failures: u64,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl Registration {
    pub fn new(id: u64, registration_order: usize, options: PollOptions) -> Self {
        Self {
            id,
            key: options.key,
            callback: options.callback,
            interval: options.interval,
            requires_auth: options.requires_auth,
            pause_when_backend_down: options.pause_when_backend_down,
            explicitly_paused: false,
            registration_order,
            state: PollState::Unscheduled,
            epoch: 0,
            timer: None,
            in_flight: false,
            pending_delay: None,
            superseded: None,
            runs: 0,
            failures: 0,
            last_completed_at: None,
        }
    }

    pub fn gate_closed(&self, gates: Gates) -> bool {
        (self.requires_auth && !gates.auth_granted)
            || (self.pause_when_backend_down && !gates.backend_available)
    }

    pub fn is_paused(&self, gates: Gates) -> bool {
        self.explicitly_paused || self.gate_closed(gates)
    }

    /// Safe to call repeatedly; aborting a finished task is a no-op.
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.epoch = self.epoch.wrapping_add(1);
    }

    pub fn suspend(&mut self) {
        self.cancel_timer();
        self.pending_delay = None;
        self.state = PollState::Paused;
    }

    pub fn dispose(&mut self) {
        self.cancel_timer();
        self.pending_delay = None;
        self.state = PollState::Disposed;
    }

    pub fn status(&self, gates: Gates) -> PollStatus {
        PollStatus {
            key: self.key.clone(),
            state: self.state,
            is_paused: self.is_paused(gates),
            explicitly_paused: self.explicitly_paused,
            requires_auth: self.requires_auth,
            pause_when_backend_down: self.pause_when_backend_down,
            interval_ms: u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            registration_order: self.registration_order,
            runs: self.runs,
            failures: self.failures,
            last_completed_at: self.last_completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(requires_auth: bool, pause_when_backend_down: bool) -> Registration {
        let options = PollOptions::new("alerts", Duration::from_secs(10), || async { Ok(()) })
            .requires_auth(requires_auth)
            .pause_when_backend_down(pause_when_backend_down);
        Registration::new(1, 0, options)
    }

    #[test]
    fn test_options_defaults() {
        let options = PollOptions::new("feed", Duration::from_secs(5), || async { Ok(()) });
        assert_eq!(options.key(), "feed");
        assert!(!options.requires_auth);
        assert!(options.pause_when_backend_down);
    }

    #[test]
    fn test_gate_closed_only_for_applicable_gates() {
        let closed = Gates {
            auth_granted: false,
            backend_available: false,
        };

        assert!(registration(true, false).gate_closed(closed));
        assert!(registration(false, true).gate_closed(closed));
        assert!(!registration(false, false).gate_closed(closed));
        assert!(!registration(true, true).gate_closed(Gates::default()));
    }

    #[test]
    fn test_explicit_pause_counts_as_paused() {
        let mut reg = registration(false, false);
        assert!(!reg.is_paused(Gates::default()));

        reg.explicitly_paused = true;
        assert!(reg.is_paused(Gates::default()));
    }

    #[test]
    fn test_cancel_timer_is_idempotent() {
        let mut reg = registration(false, true);
        reg.cancel_timer();
        reg.cancel_timer();
        assert_eq!(reg.epoch, 2);
        assert!(reg.timer.is_none());
    }

    #[test]
    fn test_status_reports_derived_pause() {
        let reg = registration(true, true);
        let status = reg.status(Gates {
            auth_granted: false,
            backend_available: true,
        });

        assert!(status.is_paused);
        assert!(!status.explicitly_paused);
        assert_eq!(status.interval_ms, 10_000);
        assert_eq!(status.state, PollState::Unscheduled);
    }
}
