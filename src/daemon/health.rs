use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    async fn is_available(&self) -> bool;
}

pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build health-check HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn is_available(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                if !ok {
                    tracing::debug!(status = %response.status(), url = %self.url, "Health check returned error status");
                }
                ok
            }
            Err(e) => {
                tracing::debug!(error = %e, url = %self.url, "Health check request failed");
                false
            }
        }
    }
}

/// Probes the backend on a fixed interval and publishes availability
/// transitions. The receiver starts at `true`.
pub struct HealthMonitor<P> {
    probe: P,
    interval: Duration,
}

impl<P: HealthProbe> HealthMonitor<P> {
    pub fn new(probe: P, interval: Duration) -> Self {
        Self { probe, interval }
    }

    pub fn spawn(self) -> (watch::Receiver<bool>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(true);
        let handle = tokio::spawn(self.run(tx));
        (rx, handle)
    }

    async fn run(self, tx: watch::Sender<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let available = self.probe.is_available().await;
            if publish(&tx, available) {
                tracing::info!(available, "Backend availability changed");
            }

            if tx.is_closed() {
                break;
            }
        }
    }
}

fn publish(tx: &watch::Sender<bool>, available: bool) -> bool {
    tx.send_if_modified(|current| {
        if *current == available {
            return false;
        }
        *current = available;
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedProbe {
        results: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn is_available(&self) -> bool {
            let mut results = self.results.lock().unwrap();
            if results.len() > 1 {
                results.remove(0)
            } else {
                results.first().copied().unwrap_or(true)
            }
        }
    }

    #[test]
    fn test_publish_only_on_change() {
        let (tx, rx) = watch::channel(true);
        assert!(!publish(&tx, true));
        assert!(publish(&tx, false));
        assert!(!publish(&tx, false));
        assert!(!*rx.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_reports_transitions() {
        let probe = ScriptedProbe {
            results: Mutex::new(vec![true, false, false, true]),
        };
        let (mut rx, handle) = HealthMonitor::new(probe, Duration::from_secs(30)).spawn();

        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());

        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        drop(rx);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(handle.is_finished());
    }
}
