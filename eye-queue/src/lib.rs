//! Bounded, single-writer/single-reader queues for frames and detection
//! results, generalizing `channellib`'s bounded-channel wrapper with the
//! overflow policies the pipeline's real-time budget needs: drop-oldest with
//! a high-watermark whole-queue flush for frame queues, and silent
//! drop-newest for visualization queues.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// What a writer does when [`Writer::push`] finds the queue full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest queued item to make room. If `high_watermark` is
    /// set and the queue's length exceeds it, the whole queue is drained
    /// and the episode logged once, instead of evicting one item at a time.
    DropOldest { high_watermark: Option<usize> },
    /// Drop the incoming item and leave the queue untouched.
    DropNewest,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PopError {
    #[error("queue '{0}' is empty")]
    Empty(String),
    #[error("queue '{0}' is closed")]
    Closed(String),
}

struct Shared {
    name: String,
    capacity: usize,
    policy: OverflowPolicy,
    len: AtomicUsize,
}

/// Creates a bounded queue, returning its writer and reader halves.
///
/// Dropping every [`Writer`] closes the queue: a [`Reader`] blocked in
/// [`Reader::pop_timeout`] returns `Err(PopError::Closed)` immediately
/// instead of waiting out its timeout.
pub fn bounded<T>(name: impl Into<String>, capacity: usize, policy: OverflowPolicy) -> (Writer<T>, Reader<T>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    let shared = Arc::new(Shared {
        name: name.into(),
        capacity,
        policy,
        len: AtomicUsize::new(0),
    });
    (
        Writer {
            tx,
            evict_rx: rx.clone(),
            shared: shared.clone(),
        },
        Reader { rx, shared },
    )
}

pub struct Writer<T> {
    tx: crossbeam_channel::Sender<T>,
    evict_rx: crossbeam_channel::Receiver<T>,
    shared: Arc<Shared>,
}

impl<T> Writer<T> {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn len(&self) -> usize {
        self.shared.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-blocking enqueue applying this queue's [`OverflowPolicy`].
    pub fn push(&self, mut item: T) {
        match self.shared.policy {
            OverflowPolicy::DropOldest { high_watermark } => {
                if let Some(watermark) = high_watermark {
                    if self.len() > watermark {
                        self.flush_and_log(watermark);
                    }
                }
                loop {
                    match self.tx.try_send(item) {
                        Ok(()) => {
                            self.shared.len.fetch_add(1, Ordering::AcqRel);
                            return;
                        }
                        Err(crossbeam_channel::TrySendError::Full(returned)) => {
                            if self.evict_rx.try_recv().is_ok() {
                                self.shared.len.fetch_sub(1, Ordering::AcqRel);
                            }
                            item = returned;
                        }
                        Err(crossbeam_channel::TrySendError::Disconnected(_)) => return,
                    }
                }
            }
            OverflowPolicy::DropNewest => match self.tx.try_send(item) {
                Ok(()) => {
                    self.shared.len.fetch_add(1, Ordering::AcqRel);
                }
                Err(_) => {
                    tracing::trace!(queue = %self.shared.name, "queue full, dropping frame");
                }
            },
        }
    }

    fn flush_and_log(&self, watermark: usize) {
        tracing::warn!(
            queue = %self.shared.name,
            len = self.len(),
            watermark,
            "queue over high watermark, flushing"
        );
        while self.evict_rx.try_recv().is_ok() {
            self.shared.len.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

pub struct Reader<T> {
    rx: crossbeam_channel::Receiver<T>,
    shared: Arc<Shared>,
}

impl<T> Reader<T> {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn len(&self) -> usize {
        self.shared.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocking dequeue with a timeout. Returns `Closed` as soon as every
    /// writer is gone, even if `timeout` has not elapsed.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, PopError> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => {
                self.shared.len.fetch_sub(1, Ordering::AcqRel);
                Ok(item)
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                Err(PopError::Empty(self.shared.name.clone()))
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Err(PopError::Closed(self.shared.name.clone()))
            }
        }
    }

    pub fn try_pop(&self) -> Result<T, PopError> {
        match self.rx.try_recv() {
            Ok(item) => {
                self.shared.len.fetch_sub(1, Ordering::AcqRel);
                Ok(item)
            }
            Err(crossbeam_channel::TryRecvError::Empty) => {
                Err(PopError::Empty(self.shared.name.clone()))
            }
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                Err(PopError::Closed(self.shared.name.clone()))
            }
        }
    }

    /// Drains every buffered item without blocking; used by worker shutdown
    /// to release held frame buffers promptly.
    pub fn drain(&self) {
        while self.try_pop().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn capacity_invariant_holds_under_sustained_overflow() {
        let (w, r) = bounded::<u32>(
            "frames",
            60,
            OverflowPolicy::DropOldest {
                high_watermark: Some(50),
            },
        );
        for i in 0..120u32 {
            w.push(i);
            assert!(w.len() <= 60);
        }
        drop(w);
        r.drain();
    }

    #[test]
    fn viz_queue_drops_newest_silently_when_full() {
        let (w, r) = bounded::<u32>("viz", 2, OverflowPolicy::DropNewest);
        w.push(1);
        w.push(2);
        w.push(3); // dropped, queue stays [1, 2]
        assert_eq!(w.len(), 2);
        assert_eq!(r.try_pop().unwrap(), 1);
        assert_eq!(r.try_pop().unwrap(), 2);
        assert_eq!(r.try_pop(), Err(PopError::Empty("viz".into())));
    }

    #[test]
    fn closing_writer_unblocks_pending_pop_immediately() {
        let (w, r) = bounded::<u32>("frames", 4, OverflowPolicy::DropNewest);
        drop(w);
        let result = r.pop_timeout(Duration::from_secs(5));
        assert_eq!(result, Err(PopError::Closed("frames".into())));
    }

    #[test]
    fn pop_timeout_returns_empty_when_nothing_queued() {
        let (_w, r) = bounded::<u32>("frames", 4, OverflowPolicy::DropNewest);
        let result = r.pop_timeout(Duration::from_millis(10));
        assert_eq!(result, Err(PopError::Empty("frames".into())));
    }

    #[test]
    fn drop_oldest_evicts_to_keep_newest() {
        let (w, r) = bounded::<u32>("frames", 3, OverflowPolicy::DropOldest { high_watermark: None });
        w.push(1);
        w.push(2);
        w.push(3);
        w.push(4); // evicts 1
        assert_eq!(r.try_pop().unwrap(), 2);
        assert_eq!(r.try_pop().unwrap(), 3);
        assert_eq!(r.try_pop().unwrap(), 4);
    }
}
