use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::server::AppState;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Reload the vendor config whenever its file changes
pub fn start_config_watcher(state: AppState) -> crate::error::Result<()> {
    start_config_watcher_with_interval(state, DEFAULT_POLL_INTERVAL)
}

fn is_config_change(event: &Event, config_path: &Path) -> bool {
    event.paths.iter().any(|p| p == config_path)
        && matches!(
            event.kind,
            EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any
        )
}

/// The directory to watch: editors often replace the file instead of
/// writing it in place
fn watch_target(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if config_path.is_file() && !parent.as_os_str().is_empty() => {
            parent.to_path_buf()
        }
        _ => config_path.to_path_buf(),
    }
}

fn start_config_watcher_with_interval(
    state: AppState,
    poll_interval: Duration,
) -> crate::error::Result<()> {
    let config_path = state.config_path.as_ref().clone();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let watched_file = config_path.clone();
    let mut watcher = PollWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) if is_config_change(&event, &watched_file) => {
                tracing::debug!(?event, "Config file event");
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "Config watcher error"),
        },
        Config::default()
            .with_poll_interval(poll_interval)
            .with_compare_contents(true),
    )?;

    let target = watch_target(&config_path);
    watcher.watch(&target, RecursiveMode::NonRecursive)?;

    tracing::info!(
        watched = %target.display(),
        config = %config_path.display(),
        "Watching configuration for changes"
    );

    tokio::spawn(async move {
        // The watcher stops when dropped
        let _watcher = watcher;

        while rx.recv().await.is_some() {
            match state.reload_config() {
                Ok(()) => {
                    let vendors = state.current_config().vendors.len();
                    tracing::info!(vendors, "Configuration reloaded");
                }
                Err(err) => {
                    tracing::error!(error = %err, "Failed to reload configuration, keeping previous");
                }
            }
        }
    });

    Ok(())
}
