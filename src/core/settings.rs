use crate::polling::CoordinatorConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "disruption-poller";
const TOKEN_FILE: &str = "session-token";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub polling: PollingSettings,
    pub backend: BackendSettings,
    pub auth: AuthSettings,
    pub feeds: Vec<FeedConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub stagger_step_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        let defaults = CoordinatorConfig::default();
        Self {
            stagger_step_ms: defaults.stagger_step.as_millis() as u64,
            jitter_max_ms: defaults.jitter_max.as_millis() as u64,
        }
    }
}

impl PollingSettings {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            stagger_step: Duration::from_millis(self.stagger_step_ms),
            jitter_max: Duration::from_millis(self.jitter_max_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub health_url: Option<String>,
    pub health_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            health_url: None,
            health_interval_secs: 30,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub token_path: Option<PathBuf>,
}

impl AuthSettings {
    pub fn resolved_token_path(&self) -> Option<PathBuf> {
        self.token_path
            .clone()
            .or_else(|| dirs::config_dir().map(|p| p.join(APP_DIR).join(TOKEN_FILE)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub key: String,
    pub url: String,
    pub interval_secs: u64,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default = "default_true")]
    pub pause_when_backend_down: bool,
}

fn default_true() -> bool {
    true
}

impl FeedConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path().context("Could not determine config directory")?;

        if !path.exists() {
            tracing::info!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        settings.validate()?;

        tracing::info!(?path, feeds = settings.feeds.len(), "Loaded config");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend.health_interval_secs == 0 {
            anyhow::bail!("backend.health_interval_secs must be greater than 0");
        }
        if self.backend.timeout_secs == 0 {
            anyhow::bail!("backend.timeout_secs must be greater than 0");
        }

        let mut seen = HashSet::new();
        for feed in &self.feeds {
            if feed.key.trim().is_empty() {
                anyhow::bail!("feed key must not be empty (url: {})", feed.url);
            }
            if !seen.insert(feed.key.as_str()) {
                anyhow::bail!("duplicate feed key: {}", feed.key);
            }
            if feed.url.trim().is_empty() {
                anyhow::bail!("feed '{}' has an empty url", feed.key);
            }
            if feed.interval_secs == 0 {
                anyhow::bail!("feed '{}' must have interval_secs greater than 0", feed.key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(key: &str) -> FeedConfig {
        FeedConfig {
            key: key.to_string(),
            url: "https://transit.example/api/disruptions".to_string(),
            interval_secs: 30,
            requires_auth: false,
            pause_when_backend_down: true,
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.polling.stagger_step_ms, 1000);
        assert_eq!(settings.polling.jitter_max_ms, 5000);
        assert_eq!(settings.backend.health_interval_secs, 30);
        assert!(settings.backend.health_url.is_none());
        assert!(settings.feeds.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_coordinator_config_from_settings() {
        let polling = PollingSettings {
            stagger_step_ms: 250,
            jitter_max_ms: 0,
        };
        let config = polling.coordinator_config();
        assert_eq!(config.stagger_step, Duration::from_millis(250));
        assert_eq!(config.jitter_max, Duration::ZERO);
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.feeds = vec![feed("disruptions"), feed("routes")];
        assert!(settings.validate().is_ok());

        settings.feeds.push(feed("routes"));
        assert!(settings.validate().is_err());

        settings.feeds = vec![feed(" ")];
        assert!(settings.validate().is_err());

        let mut zero = feed("alerts");
        zero.interval_secs = 0;
        settings.feeds = vec![zero];
        assert!(settings.validate().is_err());

        settings.feeds.clear();
        settings.backend.timeout_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [polling]
            stagger_step_ms = 500

            [backend]
            health_url = "https://transit.example/health"
            health_interval_secs = 15

            [auth]
            token_path = "/tmp/transit-token"

            [[feeds]]
            key = "disruptions"
            url = "https://transit.example/api/disruptions"
            interval_secs = 30

            [[feeds]]
            key = "admin-users"
            url = "https://transit.example/api/admin/users"
            interval_secs = 120
            requires_auth = true
            pause_when_backend_down = false
        "#;

        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.polling.stagger_step_ms, 500);
        assert_eq!(settings.polling.jitter_max_ms, 5000);
        assert_eq!(settings.backend.health_interval_secs, 15);
        assert_eq!(settings.backend.timeout_secs, 10);
        assert_eq!(
            settings.auth.resolved_token_path(),
            Some(PathBuf::from("/tmp/transit-token"))
        );

        assert_eq!(settings.feeds.len(), 2);
        assert!(!settings.feeds[0].requires_auth);
        assert!(settings.feeds[0].pause_when_backend_down);
        assert!(settings.feeds[1].requires_auth);
        assert!(!settings.feeds[1].pause_when_backend_down);
        assert_eq!(settings.feeds[1].interval(), Duration::from_secs(120));
        assert!(settings.validate().is_ok());
    }
}
