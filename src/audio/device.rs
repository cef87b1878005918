//! Audio device seams shared by capture and playback.
//!
//! [`InputDevice`] and [`OutputDevice`] are the only places the session
//! touches hardware. The cpal implementations live in
//! [`crate::audio::capture`] and [`crate::audio::output`]; tests substitute
//! in-memory devices.
//!
//! `cpal::Stream` is not `Send` on every platform, so cpal streams are parked
//! on a dedicated thread and represented to the rest of the crate by a
//! [`StreamHandle`]: an RAII guard whose release runs exactly once, either on
//! [`StreamHandle::release`] or on drop.

use thiserror::Error;

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Errors that can occur while acquiring or running an audio device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no {0} device found on the default audio host")]
    NoDevice(&'static str),

    #[error("audio device '{0}' not found")]
    NotFound(String),

    #[error("failed to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("audio thread failed: {0}")]
    Thread(String),
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard for an open hardware stream.
///
/// Releasing is synchronous: when [`release`](Self::release) returns, the
/// device callback has stopped and the hardware handle is closed.
pub struct StreamHandle {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl StreamHandle {
    /// Wrap a release action. It runs at most once.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Stop the stream and close the device. Idempotent.
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    /// `true` until the stream has been released.
    pub fn is_open(&self) -> bool {
        self.release.is_some()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("open", &self.is_open())
            .finish()
    }
}

/// Order in which test devices and transports were released.
#[cfg(test)]
pub type ReleaseLog = std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>;

// ---------------------------------------------------------------------------
// Input side
// ---------------------------------------------------------------------------

/// Native layout of the frames an input device delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Callback invoked on the device's real-time thread with interleaved `f32`
/// frames in `[-1.0, 1.0]`.
pub type InputCallback = Box<dyn FnMut(&[f32], InputFormat) + Send + 'static>;

/// A microphone that can be opened once per session.
pub trait InputDevice: Send + Sync {
    /// Acquire the device and start delivering frames to `on_data`.
    ///
    /// Must fail before any frame is delivered when the device cannot be
    /// acquired.
    fn open(&self, on_data: InputCallback) -> Result<StreamHandle, DeviceError>;
}

// ---------------------------------------------------------------------------
// Output side
// ---------------------------------------------------------------------------

/// An open output stream fed with mono `f32` samples.
///
/// Samples are played in the order they are enqueued with no gap between
/// consecutive calls.
pub trait AudioSink: Send {
    /// Append mono samples recorded at `sample_rate` to the play queue.
    fn enqueue(&mut self, samples: &[f32], sample_rate: u32);

    /// Drop everything queued but not yet played.
    fn flush(&mut self);

    /// Stop the stream and close the device. Idempotent.
    fn release(&mut self);
}

/// A speaker that can be opened once per session.
pub trait OutputDevice: Send + Sync {
    fn open(&self) -> Result<Box<dyn AudioSink>, DeviceError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn release_runs_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut handle = StreamHandle::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.is_open());
        handle.release();
        handle.release();
        assert!(!handle.is_open());
        drop(handle);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        drop(StreamHandle::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stream_handle_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<StreamHandle>();
        assert_send::<Box<dyn AudioSink>>();
    }
}
