//! Capture backends feeding the [`AudioCaptureHub`](super::AudioCaptureHub)
//!
//! A backend opens one input stream and invokes the supplied sink once per
//! hardware block. cpal streams are not `Send` on every platform, so the real
//! backend keeps its stream on a dedicated thread that lives until `stop`.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, StreamTrait};

use super::device;
use crate::domain::{FrameSamples, SampleFormat, StreamFormat};
use crate::{Error, Result};

/// Callback invoked with a private copy of every captured block
pub type FrameSink = Arc<dyn Fn(FrameSamples) + Send + Sync>;

/// Opens input streams
pub trait CaptureBackend: Send + Sync {
    /// Open a stream delivering blocks in `format` to `sink`
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if no stream could be opened
    fn open(&self, format: StreamFormat, sink: FrameSink) -> Result<Box<dyn CaptureStream>>;
}

/// Handle to an open input stream
pub trait CaptureStream: Send {
    /// Name of the device the stream was opened on
    fn device_name(&self) -> &str;

    /// Stop the stream and release the device
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if the runtime reports a failure while stopping
    fn stop(self: Box<Self>) -> Result<()>;
}

/// Microphone capture through cpal
#[derive(Debug, Clone, Default)]
pub struct CpalCaptureBackend {
    device_name: Option<String>,
}

impl CpalCaptureBackend {
    /// Create a backend, optionally targeting a device by name
    #[must_use]
    pub const fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl CaptureBackend for CpalCaptureBackend {
    fn open(&self, format: StreamFormat, sink: FrameSink) -> Result<Box<dyn CaptureStream>> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let wanted = self.device_name.clone();

        let handle = std::thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || -> Result<()> {
                let (stream, device) = match open_input_stream(wanted.as_deref(), format, sink) {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return Ok(());
                    }
                };
                let _ = ready_tx.send(Ok(device));

                // Parked until stop() or the handle is dropped
                let _ = stop_rx.recv();

                let paused = stream.pause().map_err(|e| Error::Device(e.to_string()));
                drop(stream);
                paused
            })?;

        match ready_rx.recv() {
            Ok(Ok(device)) => Ok(Box::new(CpalCaptureStream {
                device,
                stop_tx,
                handle: Some(handle),
            })),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::Device("capture thread exited before opening a stream".to_string()))
            }
        }
    }
}

fn open_input_stream(
    wanted: Option<&str>,
    format: StreamFormat,
    sink: FrameSink,
) -> Result<(cpal::Stream, String)> {
    let host = cpal::default_host();
    let device = device::select_input_device(&host, wanted)?;
    let name = device.name().unwrap_or_else(|_| "default".to_string());

    let mut config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(format.block_size),
    };

    let stream = match build_stream(&device, &config, format.sample_format, Arc::clone(&sink)) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(error = %e, block_size = format.block_size, "fixed block size rejected, retrying with device default");
            config.buffer_size = cpal::BufferSize::Default;
            build_stream(&device, &config, format.sample_format, sink)
                .map_err(|e| Error::Device(format!("failed to open input stream: {e}")))?
        }
    };

    stream
        .play()
        .map_err(|e| Error::Device(format!("failed to start input stream: {e}")))?;

    tracing::debug!(
        device = %name,
        sample_rate = format.sample_rate,
        channels = format.channels,
        "audio capture stream opened"
    );
    Ok((stream, name))
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: SampleFormat,
    sink: FrameSink,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError> {
    let err_callback = |err| {
        tracing::error!(error = %err, "audio capture error");
    };

    match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                sink(FrameSamples::F32(Arc::from(data)));
            },
            err_callback,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                sink(FrameSamples::I16(Arc::from(data)));
            },
            err_callback,
            None,
        ),
    }
}

struct CpalCaptureStream {
    device: String,
    stop_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl CaptureStream for CpalCaptureStream {
    fn device_name(&self) -> &str {
        &self.device
    }

    fn stop(mut self: Box<Self>) -> Result<()> {
        let _ = self.stop_tx.send(());
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(result)) => result,
            Some(Err(_)) => Err(Error::Device("capture thread panicked".to_string())),
            None => Ok(()),
        }
    }
}

/// Capture backend driven by hand instead of hardware
///
/// Used for headless servers and tests: frames are injected through the
/// [`ManualFeed`] returned by [`ManualCaptureBackend::feed`] and delivered
/// only while a stream is open.
#[derive(Clone, Default)]
pub struct ManualCaptureBackend {
    sink: Arc<Mutex<Option<FrameSink>>>,
    fail_open: bool,
}

impl ManualCaptureBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `open` fail with a device error
    #[must_use]
    pub fn with_open_failure(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Handle for injecting blocks into the open stream
    #[must_use]
    pub fn feed(&self) -> ManualFeed {
        ManualFeed {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl CaptureBackend for ManualCaptureBackend {
    fn open(&self, _format: StreamFormat, sink: FrameSink) -> Result<Box<dyn CaptureStream>> {
        if self.fail_open {
            return Err(Error::Device("manual capture configured to fail".to_string()));
        }
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        Ok(Box::new(ManualStream {
            sink: Arc::clone(&self.sink),
        }))
    }
}

struct ManualStream {
    sink: Arc<Mutex<Option<FrameSink>>>,
}

impl CaptureStream for ManualStream {
    fn device_name(&self) -> &str {
        "manual"
    }

    fn stop(self: Box<Self>) -> Result<()> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

/// Injects captured blocks into a [`ManualCaptureBackend`] stream
#[derive(Clone)]
pub struct ManualFeed {
    sink: Arc<Mutex<Option<FrameSink>>>,
}

impl ManualFeed {
    /// Deliver one block; returns `false` if no stream is open
    pub fn push(&self, samples: FrameSamples) -> bool {
        let sink = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        sink.is_some_and(|sink| {
            sink(samples);
            true
        })
    }

    /// Deliver one block of float samples
    pub fn push_f32(&self, samples: &[f32]) -> bool {
        self.push(FrameSamples::F32(Arc::from(samples)))
    }
}
