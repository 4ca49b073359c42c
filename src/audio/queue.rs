//! Bounded per-subscriber frame queue
//!
//! The producer is the capture callback, which must never block, so `push`
//! resolves a full queue by dropping a frame instead of waiting. The consumer
//! blocks in `pop` on a condition variable until a frame arrives, the timeout
//! elapses or the queue is closed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::domain::AudioFrame;

/// Default queue capacity in frames
pub const DEFAULT_MAX_FRAMES: usize = 1024;

/// What to do with a frame pushed into a full queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Discard the incoming frame; the reader keeps the oldest backlog
    #[default]
    DropNewest,
    /// Evict the oldest buffered frame to make room; the reader stays live
    DropOldest,
}

struct QueueState {
    frames: VecDeque<Arc<AudioFrame>>,
    closed: bool,
}

/// Bounded FIFO of shared frames with a non-blocking producer side
pub struct FrameQueue {
    capacity: usize,
    policy: DropPolicy,
    state: Mutex<QueueState>,
    available: Condvar,
    dropped: AtomicU64,
}

impl FrameQueue {
    /// Create a queue holding at most `max_frames` frames (clamped to at least one)
    #[must_use]
    pub fn new(max_frames: usize, policy: DropPolicy) -> Self {
        let capacity = max_frames.max(1);
        Self {
            capacity,
            policy,
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity.min(DEFAULT_MAX_FRAMES)),
                closed: false,
            }),
            available: Condvar::new(),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a frame without blocking
    ///
    /// Returns `false` if a frame was dropped (backpressure) or the queue is
    /// closed. Under [`DropPolicy::DropOldest`] the incoming frame is kept and
    /// the evicted one is counted as dropped.
    pub fn push(&self, frame: Arc<AudioFrame>) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }

        let accepted = if state.frames.len() < self.capacity {
            state.frames.push_back(frame);
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if self.policy == DropPolicy::DropOldest {
                state.frames.pop_front();
                state.frames.push_back(frame);
            }
            false
        };
        drop(state);

        self.available.notify_one();
        accepted
    }

    /// Dequeue the next frame
    ///
    /// `None` waits indefinitely, `Some(Duration::ZERO)` polls. Returns `None`
    /// on timeout or when the queue has been closed.
    pub fn pop(&self, timeout: Option<Duration>) -> Option<Arc<AudioFrame>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();

        loop {
            if state.closed {
                return None;
            }
            if let Some(frame) = state.frames.pop_front() {
                return Some(frame);
            }

            match deadline {
                None => {
                    state = self
                        .available
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    state = self
                        .available
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    /// Close the queue, discard buffered frames and wake every blocked reader
    ///
    /// Idempotent. Subsequent pushes are no-ops.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.frames.clear();
        drop(state);
        self.available.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of buffered frames
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames lost to backpressure so far
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FrameSamples, StreamFormat};
    use std::thread;

    fn frame(sequence: u64) -> Arc<AudioFrame> {
        Arc::new(AudioFrame {
            samples: FrameSamples::F32(Arc::from(vec![0.0f32; 4])),
            format: StreamFormat::default(),
            sequence,
        })
    }

    fn drain(queue: &FrameQueue) -> Vec<u64> {
        std::iter::from_fn(|| queue.pop(Some(Duration::ZERO)))
            .map(|f| f.sequence)
            .collect()
    }

    #[test]
    fn fifo_order() {
        let queue = FrameQueue::new(8, DropPolicy::DropNewest);
        for i in 0..5 {
            assert!(queue.push(frame(i)));
        }
        assert_eq!(drain(&queue), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn full_queue_drops_incoming_frames() {
        let queue = FrameQueue::new(3, DropPolicy::DropNewest);
        let accepted: Vec<bool> = (0..6).map(|i| queue.push(frame(i))).collect();

        assert_eq!(accepted, vec![true, true, true, false, false, false]);
        assert_eq!(queue.dropped(), 3);
        assert_eq!(drain(&queue), vec![0, 1, 2]);
    }

    #[test]
    fn drop_oldest_keeps_latest_frames() {
        let queue = FrameQueue::new(3, DropPolicy::DropOldest);
        for i in 0..6 {
            queue.push(frame(i));
        }
        assert_eq!(queue.dropped(), 3);
        assert_eq!(drain(&queue), vec![3, 4, 5]);
    }

    #[test]
    fn capacity_is_at_least_one() {
        let queue = FrameQueue::new(0, DropPolicy::DropNewest);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.push(frame(0)));
        assert!(!queue.push(frame(1)));
    }

    #[test]
    fn zero_timeout_polls() {
        let queue = FrameQueue::new(4, DropPolicy::DropNewest);
        let start = Instant::now();
        assert!(queue.pop(Some(Duration::ZERO)).is_none());
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn positive_timeout_expires() {
        let queue = FrameQueue::new(4, DropPolicy::DropNewest);
        let start = Instant::now();
        assert!(queue.pop(Some(Duration::from_millis(30))).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn blocked_pop_receives_later_push() {
        let queue = Arc::new(FrameQueue::new(4, DropPolicy::DropNewest));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop(None).map(|f| f.sequence))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(frame(7));
        assert_eq!(consumer.join().unwrap(), Some(7));
    }

    #[test]
    fn close_wakes_blocked_reader() {
        let queue = Arc::new(FrameQueue::new(4, DropPolicy::DropNewest));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop(None))
        };
        thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        queue.close();
        assert!(consumer.join().unwrap().is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn close_discards_and_rejects() {
        let queue = FrameQueue::new(4, DropPolicy::DropNewest);
        queue.push(frame(0));
        queue.push(frame(1));

        queue.close();
        queue.close();

        assert!(queue.is_closed());
        assert!(queue.is_empty());
        assert!(!queue.push(frame(2)));
        assert!(queue.pop(Some(Duration::ZERO)).is_none());
    }
}
