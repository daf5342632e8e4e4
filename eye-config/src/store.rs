use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{EyeTrackConfig, TrackerConfig};

const LOAD_RETRY_ATTEMPTS: u32 = 5;
const LOAD_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Delivered to subscribers after a change lands, carrying the snapshot
/// from just before the change so a subscriber can diff against the store's
/// current snapshot if it cares what moved.
#[derive(Debug, Clone)]
pub struct ConfigChanged {
    pub old: EyeTrackConfig,
}

/// Owns the on-disk config tree: validated load/save, a mutation API that
/// never persists a rejected update, and a broadcast of changes for
/// subscribers. Exclusively written by the orchestrator; workers only read
/// through [`ConfigStore::snapshot`] and [`ConfigStore::subscribe`].
pub struct ConfigStore {
    path: PathBuf,
    config: RwLock<EyeTrackConfig>,
    changes: tokio::sync::broadcast::Sender<ConfigChanged>,
}

impl ConfigStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Arc<Self>> {
        let path = path.into();
        let mut config = Self::load_from_disk(&path)?;
        let warnings = config.normalize();
        for w in &warnings {
            tracing::warn!(%w, "config repaired on load");
        }
        let (tx, _rx) = tokio::sync::broadcast::channel(32);
        let store = Arc::new(Self {
            path,
            config: RwLock::new(config),
            changes: tx,
        });
        store.save()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> EyeTrackConfig {
        self.config.read().clone()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ConfigChanged> {
        self.changes.subscribe()
    }

    /// Reads and validates the file at `path`. On parse or validation
    /// failure, preserves the broken file as `<path>.backup` and falls
    /// through to defaults so the caller always gets something usable.
    /// Transient permission errors are retried with a short backoff instead
    /// of failing outright, since another process may be mid-write.
    fn load_from_disk(path: &Path) -> Result<EyeTrackConfig> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            return Ok(EyeTrackConfig::default());
        }

        let mut attempt = 0;
        let raw = loop {
            match std::fs::read_to_string(path) {
                Ok(s) => break s,
                Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied
                    && attempt < LOAD_RETRY_ATTEMPTS =>
                {
                    attempt += 1;
                    tracing::warn!(attempt, "config file locked, retrying");
                    std::thread::sleep(LOAD_RETRY_BACKOFF);
                }
                Err(e) => return Err(e.into()),
            }
        };

        match serde_json::from_str::<EyeTrackConfig>(&raw).and_then(|cfg| {
            cfg.validate()
                .map(|()| cfg)
                .map_err(|_| serde::de::Error::custom("validation failed"))
        }) {
            Ok(cfg) => Ok(cfg),
            Err(e) => {
                tracing::error!(error = %e, "invalid config, preserving as .backup and using defaults");
                let backup = Self::backup_path(path);
                std::fs::rename(path, &backup)?;
                Ok(EyeTrackConfig::default())
            }
        }
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut s = path.as_os_str().to_owned();
        s.push(".backup");
        PathBuf::from(s)
    }

    /// Serializes in deterministic field order with stable 4-space
    /// indentation, so a filesystem watcher can tell a semantic change from
    /// a no-op rewrite by diffing bytes.
    pub fn save(&self) -> Result<()> {
        let config = self.config.read();
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        serde::Serialize::serialize(&*config, &mut ser)?;
        std::fs::write(&self.path, buf)?;
        Ok(())
    }

    /// Re-reads the file from disk; if it differs from the in-memory tree,
    /// swaps it in and notifies subscribers. Returns whether it changed.
    pub fn reload(&self) -> Result<bool> {
        let mut new = Self::load_from_disk(&self.path)?;
        let warnings = new.normalize();
        for w in &warnings {
            tracing::warn!(%w, "config repaired on reload");
        }
        let mut guard = self.config.write();
        if *guard == new {
            return Ok(false);
        }
        std::mem::swap(&mut *guard, &mut new);
        let old = new;
        drop(guard);
        let _ = self.changes.send(ConfigChanged { old });
        Ok(true)
    }

    fn mutate(&self, f: impl FnOnce(&mut EyeTrackConfig) -> Result<()>) -> Result<()> {
        let mut candidate = self.snapshot();
        f(&mut candidate)?;
        candidate.normalize();
        candidate.validate().map_err(Error::Validation)?;

        let mut guard = self.config.write();
        let old = std::mem::replace(&mut *guard, candidate);
        drop(guard);
        self.save()?;
        let _ = self.changes.send(ConfigChanged { old });
        Ok(())
    }

    /// Recursively merges `partial` into the tree and re-validates; on
    /// failure the store is left untouched and the error carries the
    /// rejected fields.
    pub fn update(&self, partial: serde_json::Value) -> Result<()> {
        self.mutate(|cfg| {
            let mut value = serde_json::to_value(&*cfg).expect("config always serializes");
            merge_json(&mut value, partial);
            *cfg = serde_json::from_value(value)
                .map_err(|e| Error::validation("$", e.to_string()))?;
            Ok(())
        })
    }

    pub fn update_tracker(&self, uuid: Uuid, partial: serde_json::Value) -> Result<()> {
        if !self.snapshot().trackers.iter().any(|t| t.uuid == uuid) {
            return Err(Error::NotFound(uuid));
        }
        self.mutate(|cfg| {
            let tracker = cfg
                .trackers
                .iter_mut()
                .find(|t| t.uuid == uuid)
                .expect("presence checked above");
            let mut value = serde_json::to_value(&*tracker).expect("tracker always serializes");
            merge_json(&mut value, partial);
            *tracker = serde_json::from_value(value)
                .map_err(|e| Error::validation(format!("trackers[{uuid}]"), e.to_string()))?;
            Ok(())
        })
    }

    pub fn create_tracker(&self, mut tracker: TrackerConfig) -> Result<Uuid> {
        if tracker.uuid.is_nil() {
            tracker.uuid = Uuid::new_v4();
        }
        let uuid = tracker.uuid;
        self.mutate(|cfg| {
            cfg.trackers.push(tracker);
            Ok(())
        })?;
        Ok(uuid)
    }

    pub fn delete_tracker(&self, uuid: Uuid) -> Result<()> {
        if !self.snapshot().trackers.iter().any(|t| t.uuid == uuid) {
            return Err(Error::NotFound(uuid));
        }
        self.mutate(|cfg| {
            cfg.trackers.retain(|t| t.uuid != uuid);
            Ok(())
        })
    }

    /// Resets every field of the named tracker except its uuid and name.
    pub fn reset_tracker(&self, uuid: Uuid) -> Result<()> {
        if !self.snapshot().trackers.iter().any(|t| t.uuid == uuid) {
            return Err(Error::NotFound(uuid));
        }
        self.mutate(|cfg| {
            if let Some(tracker) = cfg.trackers.iter_mut().find(|t| t.uuid == uuid) {
                tracker.reset_keep_identity();
            }
            Ok(())
        })
    }

    pub fn reset(&self) -> Result<()> {
        self.mutate(|cfg| {
            *cfg = EyeTrackConfig::default();
            Ok(())
        })
    }

    pub fn get_tracker_by_uuid(&self, uuid: Uuid) -> Result<TrackerConfig> {
        self.snapshot()
            .trackers
            .into_iter()
            .find(|t| t.uuid == uuid)
            .ok_or(Error::NotFound(uuid))
    }
}

/// Recursive partial merge: object fields in `patch` overwrite or descend
/// into the matching field of `target`; any other JSON type in `patch`
/// replaces `target` wholesale. Mirrors the original tracker's
/// `update_attributes`, generalized into a value-level merge so callers
/// don't need per-field setters.
fn merge_json(target: &mut serde_json::Value, patch: serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(&key) {
                    Some(target_value) => merge_json(target_value, patch_value),
                    None => {
                        target_map.insert(key, patch_value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eye_types::TrackerPosition;

    fn temp_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("eye-config-test-{}.json", Uuid::new_v4()));
        p
    }

    #[test]
    fn merge_json_descends_into_nested_objects() {
        let mut target = serde_json::json!({"osc": {"address": "127.0.0.1", "sending_port": 9000}});
        let patch = serde_json::json!({"osc": {"address": "localhost"}});
        merge_json(&mut target, patch);
        assert_eq!(target["osc"]["address"], "localhost");
        assert_eq!(target["osc"]["sending_port"], 9000);
    }

    #[test]
    fn update_rejects_invalid_partial_without_mutating_store() {
        let path = temp_path();
        let store = ConfigStore::open(&path).unwrap();
        let before = store.snapshot();
        let result = store.update(serde_json::json!({"osc": {"address": "not an address"}}));
        assert!(result.is_err());
        assert_eq!(store.snapshot(), before);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn update_rejects_type_mismatched_partial_without_mutating_store() {
        let path = temp_path();
        let store = ConfigStore::open(&path).unwrap();
        let before = store.snapshot();
        let result = store.update(serde_json::json!({"osc": {"sending_port": "not a port"}}));
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(store.snapshot(), before);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn update_tracker_rejects_type_mismatched_partial_without_mutating_store() {
        let path = temp_path();
        let store = ConfigStore::open(&path).unwrap();
        let uuid = store.snapshot().trackers[0].uuid;
        let before = store.snapshot();
        let result = store.update_tracker(uuid, serde_json::json!({"enabled": "not a bool"}));
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(store.snapshot(), before);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn create_then_delete_tracker_restores_previous_set() {
        let path = temp_path();
        let store = ConfigStore::open(&path).unwrap();
        let before = store.snapshot().trackers;
        let uuid = store
            .create_tracker(TrackerConfig::new("mouth", TrackerPosition::Mouth))
            .unwrap();
        store.delete_tracker(uuid).unwrap();
        assert_eq!(store.snapshot().trackers, before);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn reset_restores_defaults() {
        let path = temp_path();
        let store = ConfigStore::open(&path).unwrap();
        let baseline = store.snapshot();
        store
            .update(serde_json::json!({"debug": true}))
            .unwrap();
        assert_ne!(store.snapshot(), baseline);
        store.reset().unwrap();
        // `reset` assigns fresh uuids (EyeTrackConfig::default() generates
        // new ones each call), so compare structure rather than identity.
        let after = store.snapshot();
        assert!(!after.debug);
        assert_eq!(after.trackers.len(), baseline.trackers.len());
        std::fs::remove_file(&path).ok();
    }
}
