use crate::core::settings::FeedConfig;
use crate::feeds::FeedFetcher;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

pub struct HttpFeed {
    key: String,
    url: String,
    client: reqwest::Client,
    token_path: Option<PathBuf>,
}

impl HttpFeed {
    pub fn new(key: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            key: key.into(),
            url: url.into(),
            client,
            token_path: None,
        })
    }

    pub fn from_config(
        config: &FeedConfig,
        token_path: Option<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut feed = Self::new(&config.key, &config.url, timeout)?;
        if config.requires_auth {
            feed.token_path = token_path;
        }
        Ok(feed)
    }

    fn load_token(&self) -> Result<Option<String>> {
        let Some(path) = &self.token_path else {
            return Ok(None);
        };

        let token = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session token from {}", path.display()))?;
        let token = token.trim();

        if token.is_empty() {
            anyhow::bail!("Session token at {} is empty", path.display());
        }
        Ok(Some(token.to_string()))
    }
}

#[async_trait]
impl FeedFetcher for HttpFeed {
    fn name(&self) -> &str {
        &self.key
    }

    async fn fetch(&self) -> Result<serde_json::Value> {
        let mut request = self.client.get(&self.url);
        if let Some(token) = self.load_token()? {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to fetch feed '{}'", self.key))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Feed '{}' returned {} - {}", self.key, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse feed '{}' as JSON", self.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(requires_auth: bool) -> FeedConfig {
        FeedConfig {
            key: "admin-users".to_string(),
            url: "https://transit.example/api/admin/users".to_string(),
            interval_secs: 60,
            requires_auth,
            pause_when_backend_down: true,
        }
    }

    #[test]
    fn test_public_feed_ignores_token_path() {
        let feed = HttpFeed::from_config(
            &config(false),
            Some(PathBuf::from("/nonexistent/token")),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(feed.name(), "admin-users");
        assert!(feed.load_token().unwrap().is_none());
    }

    #[test]
    fn test_authenticated_feed_reads_token() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  secret-token  ").unwrap();

        let feed = HttpFeed::from_config(
            &config(true),
            Some(file.path().to_path_buf()),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(feed.load_token().unwrap().as_deref(), Some("secret-token"));
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let feed = HttpFeed::from_config(
            &config(true),
            Some(PathBuf::from("/nonexistent/token")),
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(feed.load_token().is_err());
    }
}
