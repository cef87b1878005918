//! Audio I/O — microphone capture pipeline and gapless playback scheduling.
//!
//! # Pipeline
//!
//! ```text
//! Capture:  InputDevice (cpal thread) → downmix_into → Resampler (16 kHz)
//!           → ChunkAssembler (i16 windows) → CaptureStream (mpsc) → session
//!
//! Playback: session → decode_pcm16 → PlaybackScheduler::schedule
//!           → AudioSink (cpal thread, FIFO) ; finished ids → session
//! ```

pub mod capture;
pub mod chunker;
pub mod device;
pub mod output;
pub mod playback;
pub mod resample;

pub use capture::{AudioCapture, AudioChunk, CaptureStream, CpalMicrophone};
pub use chunker::ChunkAssembler;
pub use device::{
    AudioSink, DeviceError, InputCallback, InputDevice, InputFormat, OutputDevice, StreamHandle,
};
pub use output::CpalSpeaker;
pub use playback::{PlaybackScheduler, ScheduledSource, Slot, SourceId};
pub use resample::{decode_pcm16, downmix_into, encode_pcm16, quantize_i16, Resampler};
