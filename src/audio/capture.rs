//! Audio capture pipeline: microphone → 16 kHz mono PCM16 chunks.
//!
//! [`AudioCapture::start`] opens an [`InputDevice`], converts every hardware
//! buffer on the device thread (downmix, resample, quantise) and hands fixed
//! size [`AudioChunk`]s to the session over a bounded channel. The returned
//! [`CaptureStream`] owns the device for its lifetime; [`CaptureStream::stop`]
//! releases it synchronously and no chunk is yielded afterwards.
//!
//! [`CpalMicrophone`] is the production [`InputDevice`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;

use super::chunker::ChunkAssembler;
use super::device::{DeviceError, InputCallback, InputDevice, InputFormat, StreamHandle};
use super::resample::{downmix_into, Resampler};
use crate::config::INPUT_SAMPLE_RATE;

/// Chunks buffered between the device thread and the session task.
const CHUNK_CHANNEL_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A fixed-size window of signed 16-bit mono samples at the wire input rate.
///
/// Ownership moves to the transport on send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
    /// Always [`INPUT_SAMPLE_RATE`] for chunks produced by [`AudioCapture`].
    pub sample_rate: u32,
}

// ---------------------------------------------------------------------------
// InputConverter
// ---------------------------------------------------------------------------

/// Device-thread state: scratch buffers reused between callbacks, the
/// resampler phase and the chunk window.
struct InputConverter {
    mono: Vec<f32>,
    resampled: Vec<f32>,
    resampler: Resampler,
    assembler: ChunkAssembler,
}

impl InputConverter {
    fn new(chunk_samples: usize) -> Self {
        Self {
            mono: Vec::new(),
            resampled: Vec::new(),
            resampler: Resampler::new(),
            assembler: ChunkAssembler::new(chunk_samples, INPUT_SAMPLE_RATE),
        }
    }

    fn push(&mut self, data: &[f32], format: InputFormat, emit: impl FnMut(AudioChunk)) {
        downmix_into(data, format.channels, &mut self.mono);
        self.resampler.process_into(
            &self.mono,
            format.sample_rate,
            INPUT_SAMPLE_RATE,
            &mut self.resampled,
        );
        self.assembler.push(&self.resampled, emit);
    }
}

// ---------------------------------------------------------------------------
// AudioCapture / CaptureStream
// ---------------------------------------------------------------------------

/// Capture pipeline factory. One [`CaptureStream`] per session.
#[derive(Debug, Clone)]
pub struct AudioCapture {
    chunk_samples: usize,
}

impl AudioCapture {
    /// `chunk_samples` is the size of every emitted [`AudioChunk`].
    pub fn new(chunk_samples: usize) -> Self {
        Self {
            chunk_samples: chunk_samples.max(1),
        }
    }

    /// Acquire `device` and start streaming chunks.
    ///
    /// # Errors
    ///
    /// Returns the device's [`DeviceError`] when acquisition fails; nothing
    /// has been captured and nothing is left open in that case.
    pub fn start(&self, device: &dyn InputDevice) -> Result<CaptureStream, DeviceError> {
        let (tx, rx) = mpsc::channel::<AudioChunk>(CHUNK_CHANNEL_DEPTH);
        let active = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&active);
        let mut converter = InputConverter::new(self.chunk_samples);
        let on_data: InputCallback = Box::new(move |data, format| {
            if !flag.load(Ordering::Acquire) {
                return;
            }
            converter.push(data, format, |chunk| {
                if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(chunk) {
                    log::warn!("capture: session is not keeping up, dropping a chunk");
                }
            });
        });

        let handle = device.open(on_data)?;
        log::debug!("capture: microphone acquired");

        Ok(CaptureStream {
            chunks: rx,
            handle,
            active,
        })
    }
}

/// A running capture. Dropping it releases the microphone.
pub struct CaptureStream {
    chunks: mpsc::Receiver<AudioChunk>,
    handle: StreamHandle,
    active: Arc<AtomicBool>,
}

impl std::fmt::Debug for CaptureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStream")
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl CaptureStream {
    /// Next captured chunk; `None` once stopped or when the device stream
    /// has ended.
    pub async fn next(&mut self) -> Option<AudioChunk> {
        if !self.handle.is_open() {
            return None;
        }
        self.chunks.recv().await
    }

    /// Disconnect and release the microphone.
    ///
    /// Synchronous and idempotent; chunks still buffered are discarded.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        self.handle.release();
        self.chunks.close();
        while self.chunks.try_recv().is_ok() {}
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// CpalMicrophone
// ---------------------------------------------------------------------------

/// Microphone backed by `cpal`, opened on a dedicated `audio-capture` thread.
#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone {
    /// Device name — `None` selects the host default.
    device_name: Option<String>,
}

impl CpalMicrophone {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl InputDevice for CpalMicrophone {
    fn open(&self, on_data: InputCallback) -> Result<StreamHandle, DeviceError> {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), DeviceError>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let name = self.device_name.clone();

        let thread = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match build_input_stream(name.as_deref(), on_data) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Blocks until the handle is released (sender dropped).
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| DeviceError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(StreamHandle::new(move || {
                drop(stop_tx);
                let _ = thread.join();
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(DeviceError::Thread("capture thread exited during setup".into()))
            }
        }
    }
}

fn select_input_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, DeviceError> {
    match name {
        None => host
            .default_input_device()
            .ok_or(DeviceError::NoDevice("input")),
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| DeviceError::NotFound(name.to_string())),
    }
}

fn build_input_stream(
    name: Option<&str>,
    mut on_data: InputCallback,
) -> Result<cpal::Stream, DeviceError> {
    let host = cpal::default_host();
    let device = select_input_device(&host, name)?;
    let supported = device.default_input_config()?;

    let format = InputFormat {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
    };
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let on_error = |err: cpal::StreamError| {
        log::error!("capture: cpal stream error: {err}");
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| on_data(data, format),
            on_error,
            None,
        )?,
        cpal::SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::new();
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| s as f32 / 32_768.0));
                    on_data(&scratch, format);
                },
                on_error,
                None,
            )?
        }
        other => return Err(DeviceError::UnsupportedFormat(format!("{other:?}"))),
    };

    stream.play()?;
    log::info!(
        "capture: input stream started ({} Hz, {} ch)",
        format.sample_rate,
        format.channels
    );
    Ok(stream)
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// In-memory microphone for tests. Frames are pushed with
/// [`FakeMicrophone::feed`]; `fail` makes acquisition fail.
#[cfg(test)]
pub struct FakeMicrophone {
    pub format: InputFormat,
    pub fail: bool,
    /// Records "capture" on release when set.
    pub releases: Option<super::device::ReleaseLog>,
    callback: Arc<std::sync::Mutex<Option<InputCallback>>>,
    open: Arc<AtomicBool>,
}

#[cfg(test)]
impl FakeMicrophone {
    pub fn new() -> Self {
        Self {
            format: InputFormat {
                sample_rate: INPUT_SAMPLE_RATE,
                channels: 1,
            },
            fail: false,
            releases: None,
            callback: Arc::default(),
            open: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Deliver `data` as if the hardware had produced it.
    pub fn feed(&self, data: &[f32]) {
        if let Some(cb) = self.callback.lock().unwrap().as_mut() {
            cb(data, self.format);
        }
    }

    /// `true` while a stream is held open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl InputDevice for FakeMicrophone {
    fn open(&self, on_data: InputCallback) -> Result<StreamHandle, DeviceError> {
        if self.fail {
            return Err(DeviceError::NoDevice("input"));
        }
        *self.callback.lock().unwrap() = Some(on_data);
        self.open.store(true, Ordering::SeqCst);

        let callback = Arc::clone(&self.callback);
        let open = Arc::clone(&self.open);
        let releases = self.releases.clone();
        Ok(StreamHandle::new(move || {
            callback.lock().unwrap().take();
            open.store(false, Ordering::SeqCst);
            if let Some(releases) = releases {
                releases.lock().unwrap().push("capture");
            }
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
