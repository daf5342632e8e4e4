use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher as _};

use crate::error::Result;
use crate::store::ConfigStore;

const DEBOUNCE: Duration = Duration::from_millis(1000);

/// Watches the directory containing the store's config file and calls
/// [`ConfigStore::reload`] after events settle for [`DEBOUNCE`]. Multiple
/// filesystem events inside the debounce window collapse into a single
/// reload, matching the "exactly one `on_config_update` per change" contract.
///
/// The returned `notify::RecommendedWatcher` must be kept alive for as long
/// as watching should continue; dropping it stops the watch.
pub fn watch(store: Arc<ConfigStore>) -> Result<notify::RecommendedWatcher> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx)?;
    let dir = store
        .path()
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    let watched_file = store.path().to_path_buf();
    std::thread::Builder::new()
        .name("eye-config-watcher".into())
        .spawn(move || debounce_loop(rx, store, watched_file))
        .expect("spawning the config watcher thread");

    Ok(watcher)
}

fn debounce_loop(
    rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    store: Arc<ConfigStore>,
    watched_file: std::path::PathBuf,
) {
    let mut pending_since: Option<Instant> = None;
    loop {
        let wait = pending_since
            .map(|since| DEBOUNCE.saturating_sub(since.elapsed()))
            .unwrap_or(Duration::from_secs(3600));

        match rx.recv_timeout(wait) {
            Ok(Ok(event)) => {
                if event.paths.iter().any(|p| p == &watched_file) {
                    pending_since.get_or_insert_with(Instant::now);
                }
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "config watcher event error"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                if let Some(since) = pending_since {
                    if since.elapsed() >= DEBOUNCE {
                        pending_since = None;
                        match store.reload() {
                            Ok(true) => tracing::info!("config reloaded from disk"),
                            Ok(false) => {}
                            Err(e) => tracing::error!(error = %e, "config reload failed"),
                        }
                    }
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}
