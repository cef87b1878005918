//! Fixed-window chunk assembler for outbound microphone audio.
//!
//! The device delivers buffers of whatever size the hardware likes; the wire
//! wants a continuous stream of equal-sized signed 16-bit windows.
//! [`ChunkAssembler`] quantises incoming `f32` samples straight into a
//! preallocated window and hands the window off once it is full.
//!
//! # Example
//!
//! ```rust
//! use voice_session::audio::ChunkAssembler;
//!
//! let mut asm = ChunkAssembler::new(4, 16_000);
//! let mut out = Vec::new();
//! asm.push(&[0.0, 0.5, -0.5, 1.0, 0.25], |chunk| out.push(chunk));
//! assert_eq!(out.len(), 1);
//! assert_eq!(out[0].samples, vec![0, 16_383, -16_384, i16::MAX]);
//! assert_eq!(asm.pending(), 1);
//! ```

use super::capture::AudioChunk;
use super::resample::quantize_i16;

/// Accumulates samples into fixed-size [`AudioChunk`] windows.
///
/// Each window is allocated once with its final capacity; no per-sample
/// allocation happens.
pub struct ChunkAssembler {
    window: Vec<i16>,
    chunk_samples: usize,
    sample_rate: u32,
}

impl ChunkAssembler {
    /// Create an assembler emitting windows of `chunk_samples` samples.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_samples == 0`.
    pub fn new(chunk_samples: usize, sample_rate: u32) -> Self {
        assert!(chunk_samples > 0, "ChunkAssembler window must be > 0");
        Self {
            window: Vec::with_capacity(chunk_samples),
            chunk_samples,
            sample_rate,
        }
    }

    /// Quantise `samples` into the current window, calling `emit` for every
    /// window that fills up.
    pub fn push(&mut self, samples: &[f32], mut emit: impl FnMut(AudioChunk)) {
        for &s in samples {
            self.window.push(quantize_i16(s));
            if self.window.len() == self.chunk_samples {
                let full = std::mem::replace(
                    &mut self.window,
                    Vec::with_capacity(self.chunk_samples),
                );
                emit(AudioChunk {
                    samples: full,
                    sample_rate: self.sample_rate,
                });
            }
        }
    }

    /// Number of samples waiting in the partial window.
    pub fn pending(&self) -> usize {
        self.window.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(asm: &mut ChunkAssembler, samples: &[f32]) -> Vec<AudioChunk> {
        let mut out = Vec::new();
        asm.push(samples, |c| out.push(c));
        out
    }

    #[test]
    fn below_window_emits_nothing() {
        let mut asm = ChunkAssembler::new(8, 16_000);
        assert!(collect(&mut asm, &[0.1; 7]).is_empty());
        assert_eq!(asm.pending(), 7);
    }

    #[test]
    fn exact_window_emits_one_chunk() {
        let mut asm = ChunkAssembler::new(4, 16_000);
        let out = collect(&mut asm, &[0.0; 4]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].samples.len(), 4);
        assert_eq!(out[0].sample_rate, 16_000);
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn windows_span_multiple_pushes() {
        let mut asm = ChunkAssembler::new(4, 16_000);
        assert!(collect(&mut asm, &[1.0, 1.0, 1.0]).is_empty());
        let out = collect(&mut asm, &[-1.0, -1.0, -1.0, -1.0, -1.0, 0.0]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].samples, vec![i16::MAX, i16::MAX, i16::MAX, i16::MIN]);
        assert_eq!(out[1].samples, vec![i16::MIN; 4]);
        assert_eq!(asm.pending(), 1);
    }

    #[test]
    fn every_chunk_has_fixed_size() {
        let mut asm = ChunkAssembler::new(4096, 16_000);
        let out = collect(&mut asm, &vec![0.2; 4096 * 3 + 100]);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|c| c.samples.len() == 4096));
    }

    #[test]
    #[should_panic(expected = "ChunkAssembler window must be > 0")]
    fn zero_window_panics() {
        let _ = ChunkAssembler::new(0, 16_000);
    }
}
