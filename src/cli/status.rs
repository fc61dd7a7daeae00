use crate::core::models::{FeedState, StatusReport};
use crate::daemon::{DBUS_NAME, DBUS_PATH};
use crate::polling::PollStatus;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

pub async fn run(json: bool) -> Result<()> {
    let connection = zbus::Connection::session()
        .await
        .context("Failed to connect to session D-Bus")?;

    let body: String = connection
        .call_method(Some(DBUS_NAME), DBUS_PATH, Some(DBUS_NAME), "PollStatus", &())
        .await
        .context("Failed to call PollStatus - is the daemon running?")?
        .body()
        .deserialize()
        .context("Failed to deserialize response")?;

    let report: StatusReport =
        serde_json::from_str(&body).context("Failed to parse status report")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text_output(&report);
    }

    Ok(())
}

fn print_text_output(report: &StatusReport) {
    println!(
        "Backend: {}    Session: {}",
        if report.backend_available { "reachable" } else { "unreachable" },
        if report.authenticated { "signed in" } else { "signed out" },
    );

    if report.polls.is_empty() {
        println!("No polls registered");
        return;
    }

    println!();
    for poll in &report.polls {
        print_poll_line(poll, report.feeds.get(&poll.key));
    }
}

fn print_poll_line(poll: &PollStatus, feed: Option<&FeedState>) {
    let last = poll
        .last_completed_at
        .map(|at| format!(" (last run {})", format_age(at)))
        .unwrap_or_default();

    println!(
        "  {:<24} {:<10} every {:>5}s  runs {:>4}  failures {:>3}{}{}",
        poll.key,
        state_label(poll),
        poll.interval_ms / 1000,
        poll.runs,
        poll.failures,
        last,
        fetch_note(feed)
    );

    if let Some(error) = feed.and_then(|f| f.error.as_ref()) {
        println!("  {:<24} Error: {}", "", error);
    }
}

fn state_label(poll: &PollStatus) -> &'static str {
    if poll.is_paused {
        return "paused";
    }
    match poll.state {
        crate::polling::PollState::Running => "running",
        crate::polling::PollState::Scheduled => "scheduled",
        crate::polling::PollState::Paused => "paused",
        crate::polling::PollState::Unscheduled => "idle",
        crate::polling::PollState::Disposed => "disposed",
    }
}

fn fetch_note(feed: Option<&FeedState>) -> &'static str {
    match feed {
        Some(state) if state.is_busy() && !state.has_data() => "  [loading]",
        Some(state) if state.is_busy() => "  [refreshing]",
        _ => "",
    }
}

fn format_age(at: DateTime<Utc>) -> String {
    let seconds = Utc::now().signed_duration_since(at).num_seconds().max(0);

    if seconds < 60 {
        format!("{}s ago", seconds)
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else {
        format!("{}h {:02}m ago", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polling::PollState;
    use chrono::Duration;

    fn poll(state: PollState, is_paused: bool) -> PollStatus {
        PollStatus {
            key: "disruptions".to_string(),
            state,
            is_paused,
            explicitly_paused: false,
            requires_auth: false,
            pause_when_backend_down: true,
            interval_ms: 30_000,
            registration_order: 0,
            runs: 0,
            failures: 0,
            last_completed_at: None,
        }
    }

    #[test]
    fn test_state_label_prefers_pause() {
        assert_eq!(state_label(&poll(PollState::Scheduled, true)), "paused");
        assert_eq!(state_label(&poll(PollState::Scheduled, false)), "scheduled");
        assert_eq!(state_label(&poll(PollState::Running, false)), "running");
    }

    #[test]
    fn test_fetch_note() {
        let mut feed = FeedState::default();
        assert_eq!(fetch_note(None), "");
        assert_eq!(fetch_note(Some(&feed)), "");

        feed.loading = true;
        assert_eq!(fetch_note(Some(&feed)), "  [loading]");

        feed.loading = false;
        feed.is_refreshing = true;
        feed.data = Some(serde_json::json!([]));
        assert_eq!(fetch_note(Some(&feed)), "  [refreshing]");
    }

    #[test]
    fn test_format_age() {
        let now = Utc::now();
        assert_eq!(format_age(now + Duration::seconds(30)), "0s ago");
        assert_eq!(format_age(now - Duration::seconds(125)), "2m ago");
        assert_eq!(format_age(now - Duration::minutes(65)), "1h 05m ago");
    }
}
