use anyhow::{Context, Result};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const DEBOUNCE: Duration = Duration::from_millis(200);

/// A session counts as authenticated while its token file exists and is
/// non-empty.
pub fn token_present(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

fn publish_token_state(path: &Path, tx: &watch::Sender<bool>) -> bool {
    let authenticated = token_present(path);
    tx.send_if_modified(|current| {
        if *current == authenticated {
            return false;
        }
        *current = authenticated;
        true
    })
}

pub struct AuthWatcher {
    _watcher: RecommendedWatcher,
}

impl AuthWatcher {
    pub fn start(token_path: PathBuf) -> Result<(Self, watch::Receiver<bool>)> {
        let parent = token_path
            .parent()
            .map(Path::to_path_buf)
            .context("Session token path has no parent directory")?;
        let file_name = token_path
            .file_name()
            .map(|n| n.to_os_string())
            .context("Session token path has no file name")?;

        std::fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

        let (state_tx, state_rx) = watch::channel(token_present(&token_path));
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    if event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()))
                    {
                        let _ = notify_tx.send(());
                    }
                }
            },
            Config::default(),
        )?;

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", parent.display()))?;
        tracing::info!(?token_path, "Watching session token");

        tokio::spawn(async move {
            while notify_rx.recv().await.is_some() {
                tokio::time::sleep(DEBOUNCE).await;
                while notify_rx.try_recv().is_ok() {}

                if publish_token_state(&token_path, &state_tx) {
                    tracing::info!(authenticated = *state_tx.borrow(), "Session token changed");
                }
            }
        });

        Ok((Self { _watcher: watcher }, state_rx))
    }
}
