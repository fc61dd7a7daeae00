use crate::core::store::FeedStore;
use crate::feeds::FeedFetcher;
use crate::polling::PollOptions;
use std::sync::Arc;
use std::time::Duration;

/// Turns a fetcher into a poll whose results land in a [`FeedStore`].
#[derive(Clone)]
pub struct FeedAdapter {
    store: FeedStore,
}

impl FeedAdapter {
    pub fn new(store: FeedStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    pub fn poll_options(
        &self,
        key: &str,
        fetcher: Arc<dyn FeedFetcher>,
        interval: Duration,
    ) -> PollOptions {
        let store = self.store.clone();
        let feed_key = key.to_string();

        PollOptions::new(key, interval, move || {
            let store = store.clone();
            let fetcher = Arc::clone(&fetcher);
            let key = feed_key.clone();

            async move {
                tracing::debug!(key = %key, fetcher = fetcher.name(), "Fetching feed");
                store.begin_fetch(&key).await;
                match fetcher.fetch().await {
                    Ok(data) => {
                        store.complete_fetch(&key, data).await;
                        Ok(())
                    }
                    Err(e) => {
                        store.fail_fetch(&key, format!("{e:#}")).await;
                        Err(e)
                    }
                }
            }
        })
    }
}
