//! Owns the config store, one tracker per enabled `TrackerConfig`, and the
//! optional OSC command listener.

use std::sync::Arc;
use std::time::Duration;

use eye_config::ConfigStore;
use uuid::Uuid;

use crate::tracker::Tracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Stopped,
}

pub struct Orchestrator {
    store: Arc<ConfigStore>,
    trackers: Vec<Tracker>,
    command_listener: Option<std::thread::JoinHandle<()>>,
    listener_control: Option<thread_control::Control>,
    running: bool,
}

impl Orchestrator {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        let mut orch = Self {
            store,
            trackers: Vec::new(),
            command_listener: None,
            listener_control: None,
            running: false,
        };
        orch.setup_trackers();
        orch
    }

    pub fn status(&self) -> Status {
        if self.running {
            Status::Running
        } else {
            Status::Stopped
        }
    }

    pub fn tracker(&self, uuid: Uuid) -> Option<&Tracker> {
        self.trackers.iter().find(|t| t.uuid() == uuid)
    }

    pub fn trackers(&self) -> &[Tracker] {
        &self.trackers
    }

    /// Rebuilds the tracker set from the current config snapshot (one per
    /// enabled tracker). Only permitted while stopped.
    pub fn setup_trackers(&mut self) {
        assert!(!self.running, "cannot rebuild trackers while running");
        let config = self.store.snapshot();
        self.trackers = config
            .trackers
            .iter()
            .filter(|t| t.enabled)
            .map(Tracker::new)
            .collect();
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        let config = self.store.snapshot();
        for tracker in &mut self.trackers {
            tracker.start(self.store.clone(), config.affinity_mask.clone());
        }
        if config.osc.enable_receiving {
            self.command_listener = Some(self.spawn_command_listener());
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        for tracker in &mut self.trackers {
            tracker.stop();
        }
        if let Some(control) = self.listener_control.take() {
            control.stop();
        }
        if let Some(handle) = self.command_listener.take() {
            let _ = handle.join();
        }
        self.running = false;
    }

    pub fn restart(&mut self) {
        self.stop();
        self.start();
    }

    fn spawn_command_listener(&mut self) -> std::thread::JoinHandle<()> {
        let store = self.store.clone();
        let (flag, control) = thread_control::make_pair();
        self.listener_control = Some(control);
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("current-thread runtime");
            rt.block_on(async move {
                let endpoints = store.snapshot().osc;
                let listener = match eye_osc::CommandListener::bind(&endpoints.address, endpoints.receiver_port).await {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to bind osc command listener");
                        return;
                    }
                };
                while flag.is_alive() {
                    let config = store.snapshot().osc;
                    let recv = tokio::time::timeout(
                        Duration::from_millis(500),
                        listener.recv_command(&config.endpoints),
                    )
                    .await;
                    match recv {
                        Ok(Ok(Some(command))) => handle_command(&store, command),
                        Ok(Ok(None)) => {}
                        Ok(Err(e)) => tracing::warn!(error = %e, "osc command recv failed"),
                        Err(_timeout) => {}
                    }
                }
            });
        })
    }
}

fn handle_command(store: &Arc<ConfigStore>, command: eye_osc::Command) {
    match command {
        eye_osc::Command::Recalibrate => tracing::info!("received recalibrate command"),
        eye_osc::Command::Recenter => tracing::info!("received recenter command"),
        eye_osc::Command::SyncBlink => {
            let current = store.snapshot().osc.sync_blink;
            if let Err(e) = store.update(serde_json::json!({"osc": {"sync_blink": !current}})) {
                tracing::warn!(error = %e, "failed to toggle sync_blink");
            }
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("eye-tracker-core-orch-test-{}.json", Uuid::new_v4()));
        p
    }

    #[test]
    fn setup_trackers_builds_one_tracker_per_enabled_config() {
        let path = temp_path();
        let store = ConfigStore::open(&path).unwrap();
        let orch = Orchestrator::new(store);
        assert_eq!(orch.trackers().len(), 2);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn start_stop_is_idempotent_and_toggles_status() {
        let path = temp_path();
        let store = ConfigStore::open(&path).unwrap();
        let mut orch = Orchestrator::new(store);

        assert_eq!(orch.status(), Status::Stopped);
        orch.start();
        orch.start();
        assert_eq!(orch.status(), Status::Running);

        orch.stop();
        orch.stop();
        assert_eq!(orch.status(), Status::Stopped);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn restart_leaves_orchestrator_running() {
        let path = temp_path();
        let store = ConfigStore::open(&path).unwrap();
        let mut orch = Orchestrator::new(store);
        orch.start();
        orch.restart();
        assert_eq!(orch.status(), Status::Running);
        orch.stop();
        std::fs::remove_file(&path).ok();
    }
}
