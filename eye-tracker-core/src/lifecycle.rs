//! Common worker lifecycle: idempotent start/stop, CPU affinity, and a
//! config-store subscription with the two callbacks every worker gets.

use std::time::Duration;

use eye_config::{ConfigStore, EyeTrackConfig, TrackerConfig};
use std::sync::Arc;
use uuid::Uuid;

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pins the calling thread to the cores named in `mask`. A no-op (not an
/// error) when `mask` is empty, matching "sets CPU affinity if non-empty".
pub fn apply_affinity_mask(mask: &[usize]) {
    if mask.is_empty() {
        return;
    }
    let ids: Vec<core_affinity::CoreId> = core_affinity::get_core_ids()
        .unwrap_or_default()
        .into_iter()
        .filter(|c| mask.contains(&c.id))
        .collect();
    if let Some(id) = ids.first() {
        core_affinity::set_for_current(*id);
    } else {
        tracing::warn!(?mask, "affinity_mask selects no core on this host, ignoring");
    }
}

/// Tracks one worker's view of its tracker's config, firing
/// `on_config_update`/`on_tracker_config_update` from inside the worker's
/// own loop whenever `poll` observes a change -- a synchronous stand-in for
/// a subscriber thread that keeps every worker single-threaded.
pub struct ConfigWatch {
    store: Arc<ConfigStore>,
    uuid: Uuid,
    last_root: EyeTrackConfig,
}

impl ConfigWatch {
    pub fn new(store: Arc<ConfigStore>, uuid: Uuid) -> Self {
        let last_root = store.snapshot();
        Self { store, uuid, last_root }
    }

    pub fn current_tracker(&self) -> Option<TrackerConfig> {
        self.last_root.trackers.iter().find(|t| t.uuid == self.uuid).cloned()
    }

    pub fn root(&self) -> &EyeTrackConfig {
        &self.last_root
    }

    /// Re-snapshots the store and invokes the callbacks for whatever
    /// actually changed since the last poll.
    pub fn poll(
        &mut self,
        mut on_config_update: impl FnMut(&EyeTrackConfig),
        mut on_tracker_config_update: impl FnMut(&TrackerConfig),
    ) {
        let current = self.store.snapshot();
        if current == self.last_root {
            return;
        }
        let old_tracker = self.last_root.trackers.iter().find(|t| t.uuid == self.uuid).cloned();
        on_config_update(&current);
        if let Some(new_tracker) = current.trackers.iter().find(|t| t.uuid == self.uuid) {
            if old_tracker.as_ref() != Some(new_tracker) {
                on_tracker_config_update(new_tracker);
            }
        }
        self.last_root = current;
    }
}

/// A running worker: a control flag plus its join handle. `start`/`stop`
/// are idempotent; `stop` joins with a timeout and otherwise leaves the
/// thread detached (std::thread has no force-kill, so a wedged worker is
/// logged rather than terminated).
pub struct WorkerHandle {
    control: Option<thread_control::Control>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn(name: &str, body: impl FnOnce(thread_control::Flag) + Send + 'static) -> Self {
        let (flag, control) = thread_control::make_pair();
        let join = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))
            .expect("spawn worker thread");
        Self {
            control: Some(control),
            join: Some(join),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.control.as_ref().is_some_and(|c| !c.is_done())
    }

    /// Idempotent: no-op if already stopped.
    pub fn stop(&mut self) {
        let Some(control) = self.control.take() else {
            return;
        };
        control.stop();
        if let Some(join) = self.join.take() {
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            let name = join.thread().name().unwrap_or("worker").to_string();
            // JoinHandle::join has no timeout; poll is_finished instead so
            // a wedged worker doesn't block shutdown of the rest.
            std::thread::spawn(move || {
                let _ = done_tx.send(join.join());
            });
            if done_rx.recv_timeout(JOIN_TIMEOUT).is_err() {
                tracing::error!(worker = %name, "worker did not stop within timeout, abandoning");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eye_config::ConfigStore;
    use eye_types::TrackerPosition;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn temp_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("eye-tracker-core-test-{}.json", Uuid::new_v4()));
        p
    }

    #[test]
    fn worker_handle_stop_is_idempotent() {
        let mut handle = WorkerHandle::spawn("test-worker", |flag| {
            while flag.alive() {
                std::thread::sleep(Duration::from_millis(5));
            }
        });
        assert!(handle.is_alive());
        handle.stop();
        handle.stop();
        assert!(!handle.is_alive());
    }

    #[test]
    fn config_watch_poll_fires_root_callback_on_any_change() {
        let path = temp_path();
        let store = ConfigStore::open(&path).unwrap();
        let uuid = Uuid::new_v4();
        let mut watch = ConfigWatch::new(store.clone(), uuid);

        store
            .update(serde_json::json!({"osc": {"address": "localhost"}}))
            .unwrap();

        let root_fired = AtomicBool::new(false);
        let tracker_fired = AtomicBool::new(false);
        watch.poll(
            |_| root_fired.store(true, Ordering::SeqCst),
            |_| tracker_fired.store(true, Ordering::SeqCst),
        );
        assert!(root_fired.load(Ordering::SeqCst));
        assert!(!tracker_fired.load(Ordering::SeqCst));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn config_watch_poll_fires_tracker_callback_only_for_its_own_tracker() {
        let path = temp_path();
        let store = ConfigStore::open(&path).unwrap();
        let uuid = store
            .create_tracker(TrackerConfig::new("mouth", TrackerPosition::Mouth))
            .unwrap();
        let mut watch = ConfigWatch::new(store.clone(), uuid);

        let other = store
            .create_tracker(TrackerConfig::new("left_eye", TrackerPosition::LeftEye))
            .unwrap();

        let tracker_fired = AtomicBool::new(false);
        watch.poll(|_| {}, |_| tracker_fired.store(true, Ordering::SeqCst));
        assert!(
            !tracker_fired.load(Ordering::SeqCst),
            "unrelated tracker creation must not fire this tracker's callback"
        );

        store
            .update_tracker(uuid, serde_json::json!({"enabled": false}))
            .unwrap();
        watch.poll(|_| {}, |_| tracker_fired.store(true, Ordering::SeqCst));
        assert!(tracker_fired.load(Ordering::SeqCst));

        let _ = other;
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn poll_is_a_no_op_when_nothing_changed() {
        let path = temp_path();
        let store = ConfigStore::open(&path).unwrap();
        let mut watch = ConfigWatch::new(store.clone(), Uuid::new_v4());

        let calls = std::cell::Cell::new(0);
        watch.poll(|_| calls.set(calls.get() + 1), |_| calls.set(calls.get() + 1));
        assert_eq!(calls.get(), 0);
        std::fs::remove_file(&path).ok();
    }
}
