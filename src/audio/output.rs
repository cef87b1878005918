//! Speaker output via `cpal`.
//!
//! [`CpalSpeaker`] opens the output device on a dedicated `audio-playback`
//! thread. Enqueued audio is resampled to the device rate and appended to a
//! shared FIFO that the device callback drains; an empty FIFO plays silence.
//! Consecutive enqueues therefore play back-to-back without a gap.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::device::{AudioSink, DeviceError, OutputDevice, StreamHandle};
use super::resample::Resampler;

type SampleQueue = Arc<Mutex<VecDeque<f32>>>;

#[derive(Debug, Clone, Copy)]
struct OutputFormat {
    sample_rate: u32,
    channels: u16,
}

// ---------------------------------------------------------------------------
// CpalSpeaker
// ---------------------------------------------------------------------------

/// Output device backed by `cpal`.
#[derive(Debug, Clone, Default)]
pub struct CpalSpeaker {
    /// Device name — `None` selects the host default.
    device_name: Option<String>,
}

impl CpalSpeaker {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl OutputDevice for CpalSpeaker {
    fn open(&self) -> Result<Box<dyn AudioSink>, DeviceError> {
        let queue: SampleQueue = Arc::new(Mutex::new(VecDeque::new()));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<OutputFormat, DeviceError>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let name = self.device_name.clone();
        let device_queue = Arc::clone(&queue);

        let thread = std::thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || {
                let (stream, format) = match build_output_stream(name.as_deref(), device_queue) {
                    Ok(ok) => ok,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(format));
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| DeviceError::Thread(e.to_string()))?;

        let format = match ready_rx.recv() {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(DeviceError::Thread("playback thread exited during setup".into()));
            }
        };

        Ok(Box::new(CpalSink {
            queue,
            device_rate: format.sample_rate,
            resampler: Resampler::new(),
            converted: Vec::new(),
            handle: StreamHandle::new(move || {
                drop(stop_tx);
                let _ = thread.join();
            }),
        }))
    }
}

/// Open output stream returned by [`CpalSpeaker::open`].
struct CpalSink {
    queue: SampleQueue,
    device_rate: u32,
    /// Phase carried between consecutive response chunks.
    resampler: Resampler,
    converted: Vec<f32>,
    handle: StreamHandle,
}

impl AudioSink for CpalSink {
    fn enqueue(&mut self, samples: &[f32], sample_rate: u32) {
        self.resampler
            .process_into(samples, sample_rate, self.device_rate, &mut self.converted);
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.extend(self.converted.iter().copied());
    }

    fn flush(&mut self) {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.resampler.reset();
    }

    fn release(&mut self) {
        self.flush();
        self.handle.release();
    }
}

fn select_output_device(
    host: &cpal::Host,
    name: Option<&str>,
) -> Result<cpal::Device, DeviceError> {
    match name {
        None => host
            .default_output_device()
            .ok_or(DeviceError::NoDevice("output")),
        Some(name) => host
            .output_devices()?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| DeviceError::NotFound(name.to_string())),
    }
}

/// Fill `out` (interleaved, `channels` wide) from the queue, padding with
/// silence when it runs dry.
fn fill_frames<T>(out: &mut [T], channels: usize, queue: &SampleQueue, convert: impl Fn(f32) -> T)
where
    T: Copy,
{
    let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
    for frame in out.chunks_mut(channels.max(1)) {
        let value = convert(queue.pop_front().unwrap_or(0.0));
        for slot in frame.iter_mut() {
            *slot = value;
        }
    }
}

fn build_output_stream(
    name: Option<&str>,
    queue: SampleQueue,
) -> Result<(cpal::Stream, OutputFormat), DeviceError> {
    let host = cpal::default_host();
    let device = select_output_device(&host, name)?;
    let supported = device.default_output_config()?;

    let format = OutputFormat {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
    };
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = format.channels as usize;

    let on_error = |err: cpal::StreamError| {
        log::error!("playback: cpal stream error: {err}");
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                fill_frames(out, channels, &queue, |s| s)
            },
            on_error,
            None,
        )?,
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            move |out: &mut [i16], _: &cpal::OutputCallbackInfo| {
                fill_frames(out, channels, &queue, super::resample::quantize_i16)
            },
            on_error,
            None,
        )?,
        other => return Err(DeviceError::UnsupportedFormat(format!("{other:?}"))),
    };

    stream.play()?;
    log::info!(
        "playback: output stream started ({} Hz, {} ch)",
        format.sample_rate,
        format.channels
    );
    Ok((stream, format))
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// Shared view of what a [`FakeSpeaker`] sink has been asked to do.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct FakeSpeakerLog {
    /// Samples enqueued and not yet flushed.
    pub queued: usize,
    pub enqueues: usize,
    pub flushes: usize,
    pub open: bool,
}

/// In-memory output device for tests.
#[cfg(test)]
#[derive(Default)]
pub struct FakeSpeaker {
    pub fail: bool,
    pub log: Arc<Mutex<FakeSpeakerLog>>,
    /// Records "flush" and "release" when set.
    pub releases: Option<super::device::ReleaseLog>,
}

#[cfg(test)]
impl FakeSpeaker {
    pub fn is_open(&self) -> bool {
        self.log.lock().unwrap().open
    }
}

#[cfg(test)]
impl OutputDevice for FakeSpeaker {
    fn open(&self) -> Result<Box<dyn AudioSink>, DeviceError> {
        if self.fail {
            return Err(DeviceError::NoDevice("output"));
        }
        self.log.lock().unwrap().open = true;
        Ok(Box::new(FakeSink {
            log: Arc::clone(&self.log),
            releases: self.releases.clone(),
        }))
    }
}

#[cfg(test)]
pub struct FakeSink {
    log: Arc<Mutex<FakeSpeakerLog>>,
    releases: Option<super::device::ReleaseLog>,
}

#[cfg(test)]
impl FakeSink {
    pub fn new(log: Arc<Mutex<FakeSpeakerLog>>) -> Self {
        log.lock().unwrap().open = true;
        Self {
            log,
            releases: None,
        }
    }

    fn record(&self, what: &'static str) {
        if let Some(releases) = &self.releases {
            releases.lock().unwrap().push(what);
        }
    }
}

#[cfg(test)]
impl AudioSink for FakeSink {
    fn enqueue(&mut self, samples: &[f32], _sample_rate: u32) {
        let mut log = self.log.lock().unwrap();
        log.queued += samples.len();
        log.enqueues += 1;
    }

    fn flush(&mut self) {
        self.record("flush");
        let mut log = self.log.lock().unwrap();
        log.queued = 0;
        log.flushes += 1;
    }

    fn release(&mut self) {
        self.record("release");
        let mut log = self.log.lock().unwrap();
        log.queued = 0;
        log.open = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
