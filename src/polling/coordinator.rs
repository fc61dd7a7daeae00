use crate::polling::error::PollError;
use crate::polling::foreground::ForegroundSignal;
use crate::polling::registration::{Gates, PollCallback, PollOptions, PollState, PollStatus, Registration};
use chrono::Utc;
use futures::FutureExt;
use rand::Rng;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Offset between the first runs of polls registered back to back.
pub const STAGGER_STEP: Duration = Duration::from_secs(1);
/// Upper bound (exclusive) of the random delay used for jittered resumes.
pub const JITTER_MAX: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub stagger_step: Duration,
    pub jitter_max: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            stagger_step: STAGGER_STEP,
            jitter_max: JITTER_MAX,
        }
    }
}

struct Inner {
    this: Weak<Mutex<Inner>>,
    config: CoordinatorConfig,
    registry: Vec<Registration>,
    gates: Gates,
    next_id: u64,
    focus_listener: Option<JoinHandle<()>>,
    disposed: bool,
}

fn lock(shared: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn position(&self, key: &str) -> Option<usize> {
        self.registry.iter().position(|r| r.key == key)
    }

    fn position_of_id(&self, id: u64) -> Option<usize> {
        self.registry.iter().position(|r| r.id == id)
    }

    fn resume_delay(&self, use_jitter: bool) -> Duration {
        if !use_jitter {
            return Duration::ZERO;
        }

        let max_ms = u64::try_from(self.config.jitter_max.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }

        Duration::from_millis(rand::rng().random_range(0..max_ms))
    }

    /// Arms the registration's timer, replacing any pending one. While a run
    /// is in flight the delay is parked and applied when the run settles.
    fn schedule(&mut self, index: usize, delay: Duration) {
        let this = self.this.clone();
        let reg = &mut self.registry[index];

        if reg.in_flight {
            reg.pending_delay = Some(delay);
            reg.state = PollState::Running;
            return;
        }

        reg.cancel_timer();
        reg.state = PollState::Scheduled;

        let deadline = Instant::now() + delay;
        reg.timer = Some(tokio::spawn(fire(this, reg.id, reg.epoch, deadline)));

        tracing::trace!(key = %reg.key, delay_ms = delay.as_millis() as u64, "Scheduled poll");
    }

    fn suspend_where(&mut self, applies: impl Fn(&Registration) -> bool) -> usize {
        let mut count = 0;
        for reg in self.registry.iter_mut().filter(|r| applies(r)) {
            reg.suspend();
            count += 1;
        }
        count
    }

    fn resume_where(&mut self, applies: impl Fn(&Registration) -> bool, use_jitter: bool) -> usize {
        let gates = self.gates;
        let indices: Vec<usize> = self
            .registry
            .iter()
            .enumerate()
            .filter(|(_, r)| applies(r) && r.state == PollState::Paused && !r.is_paused(gates))
            .map(|(i, _)| i)
            .collect();

        for &index in &indices {
            let delay = self.resume_delay(use_jitter);
            self.schedule(index, delay);
        }

        indices.len()
    }

    fn begin_run(&mut self, id: u64, epoch: u64) -> Option<(String, PollCallback)> {
        if self.disposed {
            return None;
        }

        let gates = self.gates;
        let index = self.position_of_id(id)?;
        let reg = &mut self.registry[index];

        if reg.epoch != epoch {
            return None;
        }

        // Detach the handle so a later cancel cannot abort the running callback.
        reg.timer = None;

        if reg.is_paused(gates) {
            tracing::debug!(key = %reg.key, "Gate closed at fire time, skipping run");
            reg.state = PollState::Paused;
            return None;
        }

        reg.state = PollState::Running;
        reg.in_flight = true;
        Some((reg.key.clone(), Arc::clone(&reg.callback)))
    }

    fn finish_run(&mut self, id: u64, failed: bool) {
        if let Some(index) = self.position_of_id(id) {
            let reg = &mut self.registry[index];
            reg.in_flight = false;
            reg.runs += 1;
            if failed {
                reg.failures += 1;
            }
            reg.last_completed_at = Some(Utc::now());
            self.settle_run(index);
        } else if let Some(index) = self.registry.iter().position(|r| r.superseded == Some(id)) {
            let reg = &mut self.registry[index];
            reg.in_flight = false;
            reg.superseded = None;
            tracing::debug!(key = %reg.key, "Replaced poll's last run settled");
            self.settle_run(index);
        }
    }

    fn settle_run(&mut self, index: usize) {
        if self.disposed {
            return;
        }

        let gates = self.gates;
        let reg = &mut self.registry[index];
        if reg.is_paused(gates) {
            reg.state = PollState::Paused;
            reg.pending_delay = None;
            return;
        }

        let delay = reg.pending_delay.take().unwrap_or(reg.interval);
        self.schedule(index, delay);
    }
}

async fn fire(this: Weak<Mutex<Inner>>, id: u64, epoch: u64, deadline: Instant) {
    if deadline > Instant::now() {
        tokio::time::sleep_until(deadline).await;
    }

    let Some(shared) = this.upgrade() else {
        return;
    };
    let Some((key, callback)) = lock(&shared).begin_run(id, epoch) else {
        return;
    };
    drop(shared);

    tracing::debug!(key = %key, "Running poll");

    let outcome = AssertUnwindSafe(async { callback().await }).catch_unwind().await;
    let failed = match outcome {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            tracing::warn!(key = %key, error = %e, "Poll callback failed");
            true
        }
        Err(_) => {
            tracing::warn!(key = %key, "Poll callback panicked");
            true
        }
    };

    if let Some(shared) = this.upgrade() {
        lock(&shared).finish_run(id, failed);
    }
}

/// Per-session scheduler for periodic refreshes.
///
/// Cloning yields another handle to the same coordinator. Every method that
/// can arm a timer must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct PollingCoordinator {
    inner: Arc<Mutex<Inner>>,
}

impl PollingCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        let inner = Arc::new_cyclic(|this| {
            Mutex::new(Inner {
                this: this.clone(),
                config,
                registry: Vec::new(),
                gates: Gates::default(),
                next_id: 0,
                focus_listener: None,
                disposed: false,
            })
        });

        Self { inner }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    pub fn register(&self, options: PollOptions) -> Result<PollHandle, PollError> {
        if options.key.trim().is_empty() {
            return Err(PollError::EmptyKey);
        }
        if options.interval.is_zero() {
            return Err(PollError::InvalidInterval { key: options.key });
        }

        let mut inner = self.lock();
        if inner.disposed {
            return Err(PollError::Disposed);
        }

        let mut running = None;
        if let Some(index) = inner.position(&options.key) {
            let mut previous = inner.registry.remove(index);
            previous.dispose();
            if previous.in_flight {
                running = Some(previous.superseded.unwrap_or(previous.id));
            }
            tracing::debug!(key = %previous.key, in_flight = previous.in_flight, "Replacing existing poll registration");
        }

        let order = inner.registry.len();
        let id = inner.next_id;
        inner.next_id += 1;

        let key = options.key.clone();
        let mut reg = Registration::new(id, order, options);
        if running.is_some() {
            // First run waits for the replaced registration's run to settle.
            reg.in_flight = true;
            reg.superseded = running;
        }
        let gated = reg.gate_closed(inner.gates);
        inner.registry.push(reg);
        let index = inner.registry.len() - 1;

        if gated {
            inner.registry[index].state = PollState::Paused;
            tracing::info!(key = %key, "Registered poll while gated, starting paused");
        } else {
            let factor = u32::try_from(order).unwrap_or(u32::MAX);
            let delay = inner.config.stagger_step.saturating_mul(factor);
            inner.schedule(index, delay);
            tracing::info!(key = %key, order, delay_ms = delay.as_millis() as u64, "Registered poll");
        }

        Ok(PollHandle {
            coordinator: Arc::downgrade(&self.inner),
            key,
            id,
        })
    }

    pub fn pause(&self, key: &str) {
        let mut inner = self.lock();
        let Some(index) = inner.position(key) else {
            return;
        };

        let reg = &mut inner.registry[index];
        reg.explicitly_paused = true;
        reg.suspend();
        tracing::debug!(key, "Paused poll");
    }

    /// Clears an explicit pause and schedules the next run. Does nothing
    /// while one of the poll's gates is closed or if it is already active.
    pub fn resume(&self, key: &str, use_jitter: bool) {
        let mut inner = self.lock();
        let gates = inner.gates;
        let Some(index) = inner.position(key) else {
            return;
        };

        let reg = &mut inner.registry[index];
        if reg.gate_closed(gates) {
            tracing::debug!(key, "Gate closed, resume ignored");
            return;
        }
        if !reg.explicitly_paused && reg.state != PollState::Paused {
            return;
        }

        reg.explicitly_paused = false;
        let delay = inner.resume_delay(use_jitter);
        inner.schedule(index, delay);
        tracing::debug!(key, delay_ms = delay.as_millis() as u64, "Resumed poll");
    }

    pub fn pause_health_aware_polls(&self) {
        let mut inner = self.lock();
        inner.gates.backend_available = false;
        let paused = inner.suspend_where(|r| r.pause_when_backend_down);
        tracing::info!(paused, "Backend unavailable, paused health-aware polls");
    }

    pub fn resume_health_aware_polls(&self, use_jitter: bool) {
        let mut inner = self.lock();
        inner.gates.backend_available = true;
        let resumed = inner.resume_where(|r| r.pause_when_backend_down, use_jitter);
        tracing::info!(resumed, use_jitter, "Backend available, resumed health-aware polls");
    }

    pub fn pause_authenticated_polls(&self) {
        let mut inner = self.lock();
        inner.gates.auth_granted = false;
        let paused = inner.suspend_where(|r| r.requires_auth);
        tracing::info!(paused, "Signed out, paused authenticated polls");
    }

    pub fn resume_authenticated_polls(&self) {
        let mut inner = self.lock();
        inner.gates.auth_granted = true;
        let resumed = inner.resume_where(|r| r.requires_auth, false);
        tracing::info!(resumed, "Signed in, resumed authenticated polls");
    }

    pub fn is_backend_available(&self) -> bool {
        self.lock().gates.backend_available
    }

    pub fn is_auth_granted(&self) -> bool {
        self.lock().gates.auth_granted
    }

    pub fn get_poll_status(&self, key: &str) -> Option<PollStatus> {
        let inner = self.lock();
        let gates = inner.gates;
        inner
            .registry
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.status(gates))
    }

    pub fn get_registered_polls(&self) -> Vec<String> {
        self.lock().registry.iter().map(|r| r.key.clone()).collect()
    }

    pub fn poll_statuses(&self) -> Vec<PollStatus> {
        let inner = self.lock();
        let gates = inner.gates;
        inner.registry.iter().map(|r| r.status(gates)).collect()
    }

    /// Subscribes to foreground-regain events. Only the first call for the
    /// lifetime of the coordinator installs a listener; returns whether this
    /// call did.
    pub fn setup_window_focus_listener(&self, signal: &ForegroundSignal) -> bool {
        let mut inner = self.lock();
        if inner.disposed || inner.focus_listener.is_some() {
            return false;
        }

        let mut rx = signal.subscribe();
        let this = inner.this.clone();

        inner.focus_listener = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(()) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Coalescing lagged foreground signals");
                    }
                    Err(RecvError::Closed) => break,
                }

                let Some(inner) = this.upgrade() else {
                    break;
                };
                PollingCoordinator { inner }.trigger_foreground_refresh();
            }
        }));

        tracing::info!("Foreground listener registered");
        true
    }

    /// Runs every active, idle poll now and restarts its interval from this
    /// run. Returns how many polls were triggered.
    pub fn trigger_foreground_refresh(&self) -> usize {
        let mut inner = self.lock();
        if inner.disposed {
            return 0;
        }

        let gates = inner.gates;
        let indices: Vec<usize> = inner
            .registry
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_paused(gates) && !r.in_flight)
            .map(|(i, _)| i)
            .collect();

        for &index in &indices {
            inner.schedule(index, Duration::ZERO);
        }

        tracing::info!(refreshed = indices.len(), "Foreground regained, refreshing active polls");
        indices.len()
    }

    pub fn dispose(&self) {
        let mut inner = self.lock();
        if inner.disposed {
            return;
        }
        inner.disposed = true;

        if let Some(listener) = inner.focus_listener.take() {
            listener.abort();
        }

        for reg in inner.registry.iter_mut() {
            reg.dispose();
        }
        let count = inner.registry.len();
        inner.registry.clear();

        tracing::info!(count, "Polling coordinator disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }
}

impl Default for PollingCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

/// Returned by [`PollingCoordinator::register`]; removes that registration.
#[derive(Debug, Clone)]
pub struct PollHandle {
    coordinator: Weak<Mutex<Inner>>,
    key: String,
    id: u64,
}

impl PollHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Cancels the pending timer and unregisters. A handle whose key has
    /// since been re-registered leaves the newer registration alone.
    pub fn cleanup(&self) {
        let Some(shared) = self.coordinator.upgrade() else {
            return;
        };

        let mut inner = lock(&shared);
        let Some(index) = inner.position_of_id(self.id) else {
            return;
        };

        let mut reg = inner.registry.remove(index);
        reg.dispose();
        tracing::debug!(key = %self.key, "Poll cleaned up");
    }
}
