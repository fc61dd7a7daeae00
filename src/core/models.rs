use crate::polling::PollStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Presentation state for one feed, as produced by the feed adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedState {
    pub data: Option<serde_json::Value>,
    /// First fetch in progress, nothing to show yet.
    pub loading: bool,
    /// Later fetch in progress; `data` still holds the previous result.
    pub is_refreshing: bool,
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FeedState {
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.loading || self.is_refreshing
    }
}

/// Snapshot served to `disruption-poller status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub backend_available: bool,
    pub authenticated: bool,
    pub polls: Vec<PollStatus>,
    pub feeds: BTreeMap<String, FeedState>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        let state = FeedState::default();
        assert!(!state.has_data());
        assert!(!state.is_busy());
        assert!(state.error.is_none());
    }
}
