mod adapter;
mod http;

use anyhow::Result;
use async_trait::async_trait;

pub use adapter::FeedAdapter;
pub use http::HttpFeed;

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> Result<serde_json::Value>;
}
