//! A Tracker composes one capture, detector, and transmitter worker around
//! a uuid's queues, plus the two visualization streams external consumers
//! (a web UI, say) can read from.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eye_config::{ConfigStore, TrackerConfig};
use eye_queue::{PopError, Reader};
use eye_types::AnnotatedFrame;
use uuid::Uuid;

use crate::lifecycle::{apply_affinity_mask, ConfigWatch, WorkerHandle};
use crate::queues::TrackerQueues;

const QUEUE_POP_TIMEOUT: Duration = Duration::from_millis(500);
const CAPTURE_IDLE_SLEEP: Duration = Duration::from_millis(5);

pub struct Tracker {
    uuid: Uuid,
    name: String,
    capture: Option<WorkerHandle>,
    detector: Option<WorkerHandle>,
    transmitter: Option<WorkerHandle>,
    queues: Arc<TrackerQueues>,
}

impl Tracker {
    pub fn new(tracker: &TrackerConfig) -> Self {
        Self {
            uuid: tracker.uuid,
            name: tracker.name.clone(),
            capture: None,
            detector: None,
            transmitter: None,
            queues: Arc::new(TrackerQueues::new(&tracker.name)),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn pre_detection_viz(&self) -> &Reader<eye_capture::CapturedFrame> {
        &self.queues.pre_viz_r
    }

    pub fn post_detection_viz(&self) -> &Reader<AnnotatedFrame> {
        &self.queues.post_viz_r
    }

    pub fn is_running(&self) -> bool {
        self.capture.as_ref().is_some_and(WorkerHandle::is_alive)
    }

    /// Spawns the capture/detector/transmitter workers. Idempotent: a
    /// no-op if already running.
    pub fn start(&mut self, store: Arc<ConfigStore>, affinity_mask: Vec<usize>) {
        if self.is_running() {
            return;
        }
        let uuid = self.uuid;
        let name = self.name.clone();

        self.capture = Some(spawn_capture_worker(
            uuid,
            &name,
            store.clone(),
            affinity_mask.clone(),
            self.queues.clone(),
        ));
        self.detector = Some(spawn_detector_worker(
            uuid,
            &name,
            store.clone(),
            affinity_mask.clone(),
            self.queues.clone(),
        ));
        self.transmitter = Some(spawn_transmitter_worker(
            uuid,
            &name,
            store,
            affinity_mask,
            self.queues.clone(),
        ));
    }

    /// Stops all owned workers and drains the three queues to release
    /// buffered frames.
    pub fn stop(&mut self) {
        if let Some(mut h) = self.capture.take() {
            h.stop();
        }
        if let Some(mut h) = self.detector.take() {
            h.stop();
        }
        if let Some(mut h) = self.transmitter.take() {
            h.stop();
        }
        self.queues.drain();
    }

    pub fn restart(&mut self, store: Arc<ConfigStore>, affinity_mask: Vec<usize>) {
        self.stop();
        self.start(store, affinity_mask);
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_capture_worker(
    uuid: Uuid,
    name: &str,
    store: Arc<ConfigStore>,
    affinity_mask: Vec<usize>,
    queues: Arc<TrackerQueues>,
) -> WorkerHandle {
    WorkerHandle::spawn(&format!("Capture {name}"), move |flag| {
        apply_affinity_mask(&affinity_mask);
        let mut watch = ConfigWatch::new(store, uuid);
        let mut camera = watch.current_tracker().map(|t| t.camera).unwrap_or_default();

        let mut worker = eye_capture::CaptureWorker::new();
        while flag.is_alive() {
            watch.poll(|_| {}, |tracker| camera = tracker.camera.clone());
            if worker.step(&camera, &queues.pre_viz_w, &queues.frames_w).is_none() {
                std::thread::sleep(CAPTURE_IDLE_SLEEP);
            }
        }
    })
}

fn spawn_detector_worker(
    uuid: Uuid,
    name: &str,
    store: Arc<ConfigStore>,
    affinity_mask: Vec<usize>,
    queues: Arc<TrackerQueues>,
) -> WorkerHandle {
    WorkerHandle::spawn(&format!("Detector {name}"), move |flag| {
        apply_affinity_mask(&affinity_mask);
        let mut watch = ConfigWatch::new(store, uuid);
        let initial = watch
            .current_tracker()
            .unwrap_or_else(|| TrackerConfig::new("unknown", eye_types::TrackerPosition::Undefined));
        let position = initial.position;
        let mut algorithm = initial.algorithm;

        let mut chain = eye_detect::DetectorChain::new(algorithm.clone());
        while flag.is_alive() {
            watch.poll(|_| {}, |tracker| algorithm = tracker.algorithm.clone());
            chain.reconfigure(algorithm.clone());
            match queues.frames_r.pop_timeout(QUEUE_POP_TIMEOUT) {
                Ok(captured) => {
                    let (result, annotated) = chain.run(&captured.frame, position);
                    queues.osc_w.push(result);
                    queues.post_viz_w.push(annotated);
                }
                Err(PopError::Empty(_)) => continue,
                Err(PopError::Closed(_)) => break,
            }
        }
    })
}

fn spawn_transmitter_worker(
    uuid: Uuid,
    name: &str,
    store: Arc<ConfigStore>,
    affinity_mask: Vec<usize>,
    queues: Arc<TrackerQueues>,
) -> WorkerHandle {
    WorkerHandle::spawn(&format!("Transmitter {name}"), move |flag| {
        apply_affinity_mask(&affinity_mask);
        let mut watch = ConfigWatch::new(store, uuid);
        let initial = watch
            .current_tracker()
            .unwrap_or_else(|| TrackerConfig::new("unknown", eye_types::TrackerPosition::Undefined));
        let mut osc_config = watch.root().osc.clone();
        let min_cutoff = initial.algorithm.min_cutoff;
        let beta = initial.algorithm.speed_coefficient;
        let mut new_filter_params = None::<(f64, f64)>;

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("current-thread runtime");
        let mut transmitter = match rt.block_on(eye_osc::Transmitter::bind(min_cutoff, beta)) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "failed to bind osc transmitter socket");
                return;
            }
        };

        let mut last_sent = None::<Instant>;
        while flag.is_alive() {
            watch.poll(
                |root| osc_config = root.osc.clone(),
                |tracker| new_filter_params = Some((tracker.algorithm.min_cutoff, tracker.algorithm.speed_coefficient)),
            );
            if let Some((min_cutoff, beta)) = new_filter_params.take() {
                transmitter.reconfigure(min_cutoff, beta);
            }
            match queues.osc_r.pop_timeout(QUEUE_POP_TIMEOUT) {
                Ok(data) => {
                    let now = Instant::now();
                    let dt = last_sent.map(|prev| now.duration_since(prev).as_secs_f64()).unwrap_or(0.0);
                    last_sent = Some(now);
                    let target = (osc_config.address.as_str(), osc_config.sending_port);
                    if let Err(e) = rt.block_on(transmitter.send(target, &osc_config, data, dt)) {
                        tracing::warn!(error = %e, "osc send failed");
                    }
                }
                Err(PopError::Empty(_)) => continue,
                Err(PopError::Closed(_)) => break,
            }
        }
    })
}
