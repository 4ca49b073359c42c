//! Microphone capture hub with pub-sub fan-out
//!
//! One input stream feeds any number of subscribers. Every subscriber owns a
//! bounded [`FrameQueue`], so a slow reader only loses its own frames.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use super::capture::{CaptureBackend, CaptureStream, FrameSink};
use super::queue::{DropPolicy, FrameQueue};
use crate::Result;
use crate::domain::{AudioFrame, FrameSamples, StreamFormat};
use crate::ports::{AudioStreamPort, FrameReader};

struct Subscriber {
    name: String,
    queue: Arc<FrameQueue>,
}

struct HubState {
    next_id: u64,
    sequence: u64,
    running: bool,
    subscribers: HashMap<u64, Subscriber>,
}

struct HubInner {
    format: StreamFormat,
    policy: DropPolicy,
    state: Mutex<HubState>,
}

impl HubInner {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capture callback body: stamp the frame and fan it out
    fn publish(&self, samples: FrameSamples) {
        let (frame, queues) = {
            let mut state = self.lock();
            if !state.running {
                return;
            }
            let sequence = state.sequence;
            state.sequence += 1;
            let queues: Vec<(u64, Arc<FrameQueue>)> = state
                .subscribers
                .iter()
                .map(|(id, sub)| (*id, Arc::clone(&sub.queue)))
                .collect();
            let frame = Arc::new(AudioFrame {
                samples,
                format: self.format,
                sequence,
            });
            (frame, queues)
        };

        for (id, queue) in queues {
            if !queue.push(Arc::clone(&frame)) && !queue.is_closed() {
                tracing::debug!(
                    subscriber = id,
                    sequence = frame.sequence,
                    dropped = queue.dropped(),
                    "subscriber queue full, frame dropped"
                );
            }
        }
    }

    fn unsubscribe(&self, id: u64) {
        let removed = self.lock().subscribers.remove(&id);
        if let Some(sub) = removed {
            sub.queue.close();
            tracing::debug!(subscriber = id, name = %sub.name, "capture subscriber closed");
        }
    }
}

/// Owns the input stream and the subscriber table
pub struct AudioCaptureHub {
    inner: Arc<HubInner>,
    backend: Arc<dyn CaptureBackend>,
    stream: Mutex<Option<Box<dyn CaptureStream>>>,
}

impl AudioCaptureHub {
    /// Create a stopped hub
    #[must_use]
    pub fn new(backend: Arc<dyn CaptureBackend>, format: StreamFormat, policy: DropPolicy) -> Self {
        Self {
            inner: Arc::new(HubInner {
                format,
                policy,
                state: Mutex::new(HubState {
                    next_id: 1,
                    sequence: 0,
                    running: false,
                    subscribers: HashMap::new(),
                }),
            }),
            backend,
            stream: Mutex::new(None),
        }
    }

    /// Register a subscriber; allowed before [`start`](Self::start)
    #[must_use]
    pub fn subscribe(&self, name: &str, max_frames: usize) -> AudioStreamReader {
        let queue = Arc::new(FrameQueue::new(max_frames, self.inner.policy));
        let id = {
            let mut state = self.inner.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.insert(
                id,
                Subscriber {
                    name: name.to_string(),
                    queue: Arc::clone(&queue),
                },
            );
            id
        };

        tracing::debug!(subscriber = id, name, capacity = queue.capacity(), "capture subscriber added");
        AudioStreamReader {
            id,
            name: name.to_string(),
            queue,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Close a subscription by handle
    pub fn close(&self, reader: &AudioStreamReader) {
        reader.close();
    }

    /// Open the input stream
    ///
    /// Idempotent. The frame sequence restarts at zero on every start.
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if the backend cannot open any stream
    pub fn start(&self) -> Result<()> {
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        if stream.is_some() {
            return Ok(());
        }

        {
            let mut state = self.inner.lock();
            state.sequence = 0;
            state.running = true;
        }

        let hub = Arc::downgrade(&self.inner);
        let sink: FrameSink = Arc::new(move |samples| {
            if let Some(hub) = hub.upgrade() {
                hub.publish(samples);
            }
        });

        match self.backend.open(self.inner.format, sink) {
            Ok(opened) => {
                tracing::info!(
                    device = opened.device_name(),
                    sample_rate = self.inner.format.sample_rate,
                    channels = self.inner.format.channels,
                    "audio capture started"
                );
                *stream = Some(opened);
                Ok(())
            }
            Err(e) => {
                self.inner.lock().running = false;
                tracing::error!(error = %e, "failed to start audio capture");
                Err(e)
            }
        }
    }

    /// Close every subscriber and release the input stream
    ///
    /// Idempotent. Blocked readers wake with `None`.
    pub fn stop(&self) {
        let closed = {
            let mut state = self.inner.lock();
            state.running = false;
            let closed = state.subscribers.len();
            for (_, sub) in state.subscribers.drain() {
                sub.queue.close();
            }
            closed
        };

        let stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stream) = stream {
            if let Err(e) = stream.stop() {
                tracing::warn!(error = %e, "failed to stop capture stream");
            }
            tracing::info!(subscribers = closed, "audio capture stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    #[must_use]
    pub fn format(&self) -> StreamFormat {
        self.inner.format
    }
}

impl Drop for AudioCaptureHub {
    fn drop(&mut self) {
        self.stop();
    }
}

impl AudioStreamPort for AudioCaptureHub {
    fn subscribe(&self, name: &str, max_frames: usize) -> Box<dyn FrameReader> {
        Box::new(Self::subscribe(self, name, max_frames))
    }

    fn start(&self) -> Result<()> {
        Self::start(self)
    }

    fn stop(&self) {
        Self::stop(self);
    }

    fn is_running(&self) -> bool {
        Self::is_running(self)
    }

    fn subscriber_count(&self) -> usize {
        Self::subscriber_count(self)
    }

    fn format(&self) -> StreamFormat {
        Self::format(self)
    }
}

/// Handle to one capture subscription
///
/// Dropping the handle closes the subscription.
pub struct AudioStreamReader {
    id: u64,
    name: String,
    queue: Arc<FrameQueue>,
    hub: Weak<HubInner>,
}

impl AudioStreamReader {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next frame, see [`FrameQueue::pop`]
    #[must_use]
    pub fn read(&self, timeout: Option<Duration>) -> Option<Arc<AudioFrame>> {
        self.queue.pop(timeout)
    }

    /// Close the subscription; idempotent
    pub fn close(&self) {
        self.queue.close();
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

impl FrameReader for AudioStreamReader {
    fn read(&self, timeout: Option<Duration>) -> Option<Arc<AudioFrame>> {
        Self::read(self, timeout)
    }

    fn close(&self) {
        Self::close(self);
    }

    fn is_closed(&self) -> bool {
        Self::is_closed(self)
    }

    fn dropped(&self) -> u64 {
        Self::dropped(self)
    }
}

impl Drop for AudioStreamReader {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::{ManualCaptureBackend, ManualFeed};
    use std::thread;

    fn hub() -> (AudioCaptureHub, ManualFeed) {
        let backend = ManualCaptureBackend::new();
        let feed = backend.feed();
        let hub = AudioCaptureHub::new(
            Arc::new(backend),
            StreamFormat::default(),
            DropPolicy::DropNewest,
        );
        (hub, feed)
    }

    fn sequences(reader: &AudioStreamReader) -> Vec<u64> {
        std::iter::from_fn(|| reader.read(Some(Duration::ZERO)))
            .map(|f| f.sequence)
            .collect()
    }

    #[test]
    fn ids_are_never_reused() {
        let (hub, _) = hub();
        let a = hub.subscribe("a", 4);
        let first = a.id();
        drop(a);
        let b = hub.subscribe("b", 4);
        assert_eq!(first, 1);
        assert!(b.id() > first);
    }

    #[test]
    fn fan_out_to_every_subscriber() {
        let (hub, feed) = hub();
        let a = hub.subscribe("a", 16);
        let b = hub.subscribe("b", 16);
        hub.start().unwrap();

        for _ in 0..5 {
            feed.push_f32(&[0.1; 8]);
        }

        assert_eq!(sequences(&a), vec![0, 1, 2, 3, 4]);
        assert_eq!(sequences(&b), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn frames_carry_hub_format() {
        let (hub, feed) = hub();
        let reader = hub.subscribe("fmt", 4);
        hub.start().unwrap();
        feed.push_f32(&[0.5; 4]);

        let frame = reader.read(Some(Duration::ZERO)).unwrap();
        assert_eq!(frame.format, hub.format());
        assert_eq!(frame.samples.len(), 4);
    }

    #[test]
    fn sequence_resets_on_restart() {
        let (hub, feed) = hub();
        hub.start().unwrap();
        let first = hub.subscribe("first", 8);
        feed.push_f32(&[0.0; 2]);
        feed.push_f32(&[0.0; 2]);
        assert_eq!(sequences(&first), vec![0, 1]);

        hub.stop();
        assert!(first.is_closed());

        let second = hub.subscribe("second", 8);
        hub.start().unwrap();
        feed.push_f32(&[0.0; 2]);
        assert_eq!(sequences(&second), vec![0]);
    }

    #[test]
    fn slow_reader_does_not_affect_others() {
        let (hub, feed) = hub();
        let slow = hub.subscribe("slow", 2);
        let fast = hub.subscribe("fast", 16);
        hub.start().unwrap();

        for _ in 0..6 {
            feed.push_f32(&[0.0; 2]);
        }

        assert_eq!(sequences(&slow), vec![0, 1]);
        assert_eq!(slow.dropped(), 4);
        assert_eq!(sequences(&fast), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(fast.dropped(), 0);
    }

    #[test]
    fn closed_reader_receives_nothing() {
        let (hub, feed) = hub();
        let reader = hub.subscribe("gone", 8);
        hub.start().unwrap();
        feed.push_f32(&[0.0; 2]);

        hub.close(&reader);
        reader.close();
        feed.push_f32(&[0.0; 2]);

        assert!(reader.read(Some(Duration::ZERO)).is_none());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn double_stop_leaves_no_subscribers() {
        let (hub, _) = hub();
        let _a = hub.subscribe("a", 4);
        let _b = hub.subscribe("b", 4);
        hub.start().unwrap();
        assert_eq!(hub.subscriber_count(), 2);

        hub.stop();
        hub.stop();
        assert_eq!(hub.subscriber_count(), 0);
        assert!(!hub.is_running());
    }

    #[test]
    fn start_is_idempotent() {
        let (hub, feed) = hub();
        let reader = hub.subscribe("r", 8);
        hub.start().unwrap();
        feed.push_f32(&[0.0; 2]);
        hub.start().unwrap();
        feed.push_f32(&[0.0; 2]);
        assert_eq!(sequences(&reader), vec![0, 1]);
    }

    #[test]
    fn stop_wakes_blocked_reader() {
        let (hub, _) = hub();
        let hub = Arc::new(hub);
        hub.start().unwrap();
        let reader = hub.subscribe("blocked", 4);

        let waiter = thread::spawn(move || reader.read(None).is_none());
        thread::sleep(Duration::from_millis(20));
        hub.stop();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn close_wakes_blocked_reader() {
        let (hub, _) = hub();
        hub.start().unwrap();
        let reader = hub.subscribe("blocked", 4);
        let other = hub.subscribe("other", 4);

        thread::scope(|s| {
            let waiter = s.spawn(|| reader.read(None));
            thread::sleep(Duration::from_millis(20));
            hub.close(&reader);
            assert!(waiter.join().unwrap().is_none());
        });

        assert!(reader.is_closed());
        assert!(!other.is_closed());
        assert_eq!(hub.subscriber_count(), 1);
        assert!(hub.is_running());
    }

    #[test]
    fn failed_start_reports_device_error() {
        let backend = ManualCaptureBackend::new().with_open_failure();
        let hub = AudioCaptureHub::new(
            Arc::new(backend),
            StreamFormat::default(),
            DropPolicy::DropNewest,
        );
        let err = hub.start().unwrap_err();
        assert!(matches!(err, crate::Error::Device(_)));
        assert!(!hub.is_running());
    }
}
