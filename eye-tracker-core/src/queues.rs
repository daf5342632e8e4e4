//! Queue capacities and overflow policies for one tracker's pipeline, per
//! the bounded-queue contract: frames and osc results are a renewable
//! resource (drop-oldest), visualization frames are best-effort
//! (drop-newest).

use eye_queue::{bounded, OverflowPolicy, Reader, Writer};

pub const CAPTURE_TO_DETECTOR_CAPACITY: usize = 60;
pub const DETECTOR_TO_OSC_CAPACITY: usize = 60;
pub const DETECTOR_TO_VIZ_CAPACITY: usize = 15;
pub const CAPTURE_TO_VIZ_CAPACITY: usize = 15;

/// Whole-queue flush threshold for the capture→detector frame queue, per the
/// real-time budget's `qsize > 50` backpressure rule. Scoped to that queue
/// only; the detector→osc queue has no such literal and just evicts one item
/// at a time as it fills.
const FRAME_QUEUE_HIGH_WATERMARK: usize = 50;

fn renewable<T>(name: &str, capacity: usize, high_watermark: Option<usize>) -> (Writer<T>, Reader<T>) {
    bounded(name, capacity, OverflowPolicy::DropOldest { high_watermark })
}

fn best_effort<T>(name: &str, capacity: usize) -> (Writer<T>, Reader<T>) {
    bounded(name, capacity, OverflowPolicy::DropNewest)
}

/// The three bounded queues and two visualization streams one tracker
/// owns, named per tracker so logs and metrics can tell them apart.
pub struct TrackerQueues {
    pub frames_w: Writer<eye_capture::CapturedFrame>,
    pub frames_r: Reader<eye_capture::CapturedFrame>,
    pub osc_w: Writer<eye_types::EyeData>,
    pub osc_r: Reader<eye_types::EyeData>,
    pub pre_viz_w: Writer<eye_capture::CapturedFrame>,
    pub pre_viz_r: Reader<eye_capture::CapturedFrame>,
    pub post_viz_w: Writer<eye_types::AnnotatedFrame>,
    pub post_viz_r: Reader<eye_types::AnnotatedFrame>,
}

impl TrackerQueues {
    pub fn new(tracker_name: &str) -> Self {
        let (frames_w, frames_r) = renewable(
            &format!("{tracker_name}/frames"),
            CAPTURE_TO_DETECTOR_CAPACITY,
            Some(FRAME_QUEUE_HIGH_WATERMARK),
        );
        let (osc_w, osc_r) = renewable(&format!("{tracker_name}/osc"), DETECTOR_TO_OSC_CAPACITY, None);
        let (pre_viz_w, pre_viz_r) = best_effort(&format!("{tracker_name}/pre_viz"), CAPTURE_TO_VIZ_CAPACITY);
        let (post_viz_w, post_viz_r) = best_effort(&format!("{tracker_name}/post_viz"), DETECTOR_TO_VIZ_CAPACITY);
        Self {
            frames_w,
            frames_r,
            osc_w,
            osc_r,
            pre_viz_w,
            pre_viz_r,
            post_viz_w,
            post_viz_r,
        }
    }

    /// Drains buffered frames so `stop()` releases held memory promptly.
    pub fn drain(&self) {
        self.frames_r.drain();
        self.osc_r.drain();
        self.pre_viz_r.drain();
        self.post_viz_r.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queues_are_named_per_tracker_and_sized_per_contract() {
        let queues = TrackerQueues::new("left_eye");
        assert_eq!(queues.frames_w.name(), "left_eye/frames");
        assert_eq!(queues.osc_w.name(), "left_eye/osc");
        assert_eq!(queues.pre_viz_w.name(), "left_eye/pre_viz");
        assert_eq!(queues.post_viz_w.name(), "left_eye/post_viz");

        assert_eq!(queues.frames_w.capacity(), CAPTURE_TO_DETECTOR_CAPACITY);
        assert_eq!(queues.osc_w.capacity(), DETECTOR_TO_OSC_CAPACITY);
        assert_eq!(queues.pre_viz_w.capacity(), CAPTURE_TO_VIZ_CAPACITY);
        assert_eq!(queues.post_viz_w.capacity(), DETECTOR_TO_VIZ_CAPACITY);
    }

    #[test]
    fn drain_empties_all_four_queues() {
        let queues = TrackerQueues::new("mouth");
        queues.osc_w.push(eye_types::EyeData::new(0.0, 0.0, 0.0, eye_types::TrackerPosition::Mouth));
        queues.post_viz_w.push(eye_types::AnnotatedFrame::new(1, 1));
        assert!(!queues.osc_r.is_empty());
        assert!(!queues.post_viz_r.is_empty());

        queues.drain();
        assert_eq!(queues.osc_r.len(), 0);
        assert_eq!(queues.post_viz_r.len(), 0);
    }
}
