//! Sample-format conversion, channel mixing and resampling.
//!
//! Capture path: device frames → [`downmix_into`] → [`Resampler`]
//! (→ 16 kHz) → [`quantize_i16`] per sample into a chunk window.
//!
//! Playback path: PCM16 bytes → [`decode_pcm16`] → [`Resampler`] (24 kHz →
//! device rate).
//!
//! Both write into caller-owned scratch buffers so the audio callback can
//! reuse its allocations between invocations.

// ---------------------------------------------------------------------------
// Quantisation
// ---------------------------------------------------------------------------

/// Convert one `f32` sample in `[-1.0, 1.0]` to signed 16-bit.
///
/// Out-of-range input is clamped; negative values scale by 32768 and
/// positive values by 32767 so both extremes are reachable.
///
/// ```rust
/// use voice_session::audio::quantize_i16;
///
/// assert_eq!(quantize_i16(1.0), i16::MAX);
/// assert_eq!(quantize_i16(-1.0), i16::MIN);
/// assert_eq!(quantize_i16(3.5), i16::MAX);
/// assert_eq!(quantize_i16(0.0), 0);
/// ```
#[inline]
pub fn quantize_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32_768.0) as i16
    } else {
        (s * 32_767.0) as i16
    }
}

/// Decode little-endian PCM16 bytes into `f32` samples in `[-1.0, 1.0)`.
///
/// A trailing odd byte is ignored.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0)
        .collect()
}

/// Encode `i16` samples as little-endian bytes.
pub fn encode_pcm16(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// Channel mixing
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono into `out`.
///
/// `out` is cleared first. With `channels == 0` it is left empty.
pub fn downmix_into(samples: &[f32], channels: u16, out: &mut Vec<f32>) {
    out.clear();
    match channels {
        0 => {}
        1 => out.extend_from_slice(samples),
        n => {
            let n = n as usize;
            out.extend(
                samples
                    .chunks_exact(n)
                    .map(|frame| frame.iter().sum::<f32>() / n as f32),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Resampling
// ---------------------------------------------------------------------------

/// Linear-interpolation resampler for one continuous stream that arrives in
/// buffers of arbitrary size.
///
/// The fractional read position and the last input sample carry over from
/// one call to the next, so buffer boundaries leave no phase seam and the
/// total output length tracks the exact rate ratio. A change of rates starts
/// the stream over.
///
/// ```rust
/// use voice_session::audio::Resampler;
///
/// let mut rs = Resampler::new();
/// let mut out = Vec::new();
/// let mut total = 0;
/// for _ in 0..10 {
///     rs.process_into(&[0.5_f32; 240], 24_000, 48_000, &mut out);
///     total += out.len();
/// }
/// // 2400 in → 4800 out, less the final half-step still held back.
/// assert!(total.abs_diff(4_800) <= 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Resampler {
    rates: (u32, u32),
    /// Read position relative to the start of the next buffer. Values in
    /// `[-1.0, 0.0)` interpolate from `last`.
    pos: f64,
    last: f32,
}

impl Resampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the carried position, e.g. after the queue was flushed.
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.last = 0.0;
    }

    /// Resample the next `samples` of the stream from `from_rate` to
    /// `to_rate` Hz into `out`.
    ///
    /// `out` is cleared first. Equal rates copy the input unchanged.
    pub fn process_into(
        &mut self,
        samples: &[f32],
        from_rate: u32,
        to_rate: u32,
        out: &mut Vec<f32>,
    ) {
        out.clear();

        if self.rates != (from_rate, to_rate) {
            self.rates = (from_rate, to_rate);
            self.reset();
        }

        if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
            out.extend_from_slice(samples);
            return;
        }

        let Some(&tail) = samples.last() else {
            return;
        };

        let step = from_rate as f64 / to_rate as f64;
        let len = samples.len() as f64;
        out.reserve((len / step) as usize + 1);

        while self.pos < len - 1.0 {
            let base = self.pos.floor();
            let frac = (self.pos - base) as f32;
            let idx = base as isize;
            let a = if idx < 0 { self.last } else { samples[idx as usize] };
            let b = samples[(idx + 1) as usize];
            out.push(a + (b - a) * frac);
            self.pos += step;
        }

        // pos >= len - 1 here, so the carried position stays >= -1.
        self.pos -= len;
        self.last = tail;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- quantize / pcm16 --------------------------------------------------

    #[test]
    fn quantize_clamps_out_of_range() {
        assert_eq!(quantize_i16(1.5), i16::MAX);
        assert_eq!(quantize_i16(-7.0), i16::MIN);
    }

    #[test]
    fn quantize_half_scale() {
        assert_eq!(quantize_i16(0.5), 16_383);
        assert_eq!(quantize_i16(-0.5), -16_384);
    }

    #[test]
    fn decode_pcm16_little_endian() {
        // 0x4000 = 16384 → 0.5; 0xC000 = -16384 → -0.5
        let out = decode_pcm16(&[0x00, 0x40, 0x00, 0xC0]);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn decode_pcm16_ignores_trailing_odd_byte() {
        assert_eq!(decode_pcm16(&[0x00, 0x00, 0x7F]).len(), 1);
    }

    #[test]
    fn encode_pcm16_matches_decode() {
        let bytes = encode_pcm16(&[i16::MIN, 0, 16_384]);
        assert_eq!(bytes, vec![0x00, 0x80, 0x00, 0x00, 0x00, 0x40]);
        let back = decode_pcm16(&bytes);
        assert!((back[0] + 1.0).abs() < 1e-6);
        assert!((back[2] - 0.5).abs() < 1e-6);
    }

    // ---- downmix -----------------------------------------------------------

    #[test]
    fn downmix_already_mono() {
        let mut out = Vec::new();
        downmix_into(&[0.1_f32, 0.2, 0.3], 1, &mut out);
        assert_eq!(out, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn downmix_two_channel() {
        let mut out = Vec::new();
        downmix_into(&[1.0_f32, -1.0, 0.5, 0.5], 2, &mut out);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downmix_reuses_buffer() {
        let mut out = vec![9.0_f32; 8];
        downmix_into(&[0.4_f32; 4], 4, &mut out);
        assert_eq!(out.len(), 1);
        assert!((out[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn downmix_zero_channels() {
        let mut out = vec![1.0_f32];
        downmix_into(&[1.0_f32, 2.0], 0, &mut out);
        assert!(out.is_empty());
    }

    // ---- resample ----------------------------------------------------------

    fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
        let mut out = Vec::new();
        Resampler::new().process_into(samples, from_rate, to_rate, &mut out);
        out
    }

    /// Feed `samples` in `block`-sized buffers and concatenate the output.
    fn resample_in_blocks(samples: &[f32], block: usize, from_rate: u32, to_rate: u32) -> Vec<f32> {
        let mut rs = Resampler::new();
        let mut scratch = Vec::new();
        let mut out = Vec::new();
        for buf in samples.chunks(block) {
            rs.process_into(buf, from_rate, to_rate, &mut scratch);
            out.extend_from_slice(&scratch);
        }
        out
    }

    fn sine(len: usize, rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn resample_same_rate_is_copy() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        assert_eq!(resample(&input, 16_000, 16_000), input);
    }

    #[test]
    fn resample_empty_input() {
        assert!(resample(&[], 48_000, 16_000).is_empty());
    }

    #[test]
    fn resample_48k_to_16k_output_length() {
        assert_eq!(resample(&[0.5_f32; 480], 48_000, 16_000).len(), 160);
    }

    #[test]
    fn resample_44100_to_16k_output_length() {
        let out = resample(&vec![0.0_f32; 44_100], 44_100, 16_000);
        assert!(out.len().abs_diff(16_000) <= 1, "got {}", out.len());
    }

    #[test]
    fn resample_constant_signal_preserves_amplitude() {
        for &s in &resample(&[0.5_f32; 480], 48_000, 16_000) {
            assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
        }
    }

    #[test]
    fn resample_24k_to_44100() {
        let out = resample(&vec![0.0_f32; 24_000], 24_000, 44_100);
        assert!(out.len().abs_diff(44_100) <= 1, "got {}", out.len());
    }

    #[test]
    fn small_buffers_do_not_drift() {
        // 100 hardware callbacks of 512 frames at 44.1 kHz.
        let out = resample_in_blocks(&vec![0.0_f32; 51_200], 512, 44_100, 16_000);
        let expected = 51_200.0 * 16_000.0 / 44_100.0;
        assert!(
            (out.len() as f64 - expected).abs() <= 1.0,
            "got {} expected ~{expected:.1}",
            out.len()
        );
    }

    #[test]
    fn buffer_boundaries_leave_no_seam() {
        let input = sine(44_100, 44_100);
        let whole = resample(&input, 44_100, 16_000);
        let blocked = resample_in_blocks(&input, 512, 44_100, 16_000);

        assert!(whole.len().abs_diff(blocked.len()) <= 1);
        for (i, (a, b)) in whole.iter().zip(&blocked).enumerate() {
            assert!((a - b).abs() < 1e-3, "sample {i}: {a} vs {b}");
        }
    }

    #[test]
    fn rate_change_restarts_the_stream() {
        let mut rs = Resampler::new();
        let mut out = Vec::new();
        rs.process_into(&[0.5_f32; 100], 48_000, 16_000, &mut out);
        rs.process_into(&[0.25_f32; 480], 48_000, 16_000, &mut out);
        // 100 input samples leave the read position on the last one.
        assert!((out[0] - 0.5).abs() < 1e-6, "carried sample: {}", out[0]);

        rs.process_into(&[0.25_f32; 480], 44_100, 16_000, &mut out);
        assert!((out[0] - 0.25).abs() < 1e-6);
    }
}
