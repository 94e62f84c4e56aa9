//! Linear-interpolation sample rate conversion.
//!
//! Deliberately not a polyphase or windowed-sinc design: quality is traded
//! for simplicity and determinism, which is adequate ahead of a mel
//! frontend that discards phase anyway.

/// Sample rate expected by the acoustic model.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Resample `samples` from `src_rate` to `dst_rate` by linear interpolation.
///
/// Output length is `floor(len * dst_rate / src_rate)`. When the rates are
/// equal the input is returned as-is without allocation.
pub fn resample(samples: Vec<f32>, src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples;
    }

    let new_len = (samples.len() as u64 * dst_rate as u64 / src_rate as u64) as usize;
    let ratio = src_rate as f64 / dst_rate as f64;
    let last = samples.len() - 1;

    let mut result = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let src_idx = i as f64 * ratio;
        let lo = (src_idx as usize).min(last);
        let hi = (lo + 1).min(last);
        let frac = (src_idx - lo as f64) as f32;
        result.push(samples[lo] * (1.0 - frac) + samples[hi] * frac);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_at_equal_rates() {
        let samples = vec![0.1, -0.2, 0.3, -0.4];
        let ptr = samples.as_ptr();
        let result = resample(samples, 16000, 16000);
        // Same buffer, not a copy.
        assert_eq!(result.as_ptr(), ptr);
        assert_eq!(result, vec![0.1, -0.2, 0.3, -0.4]);
    }

    #[test]
    fn test_output_length_is_floored() {
        for (len, src, expected) in [
            (44100usize, 44100u32, 16000usize),
            (44101, 44100, 16000),
            (1000, 48000, 333),
            (7, 8000, 14),
            (1, 48000, 0),
        ] {
            let samples = vec![0.0f32; len];
            let out = resample(samples, src, TARGET_SAMPLE_RATE);
            assert_eq!(
                out.len(),
                expected,
                "len={} src={} gave {}",
                len,
                src,
                out.len()
            );
        }
    }

    #[test]
    fn test_downsample_by_two_picks_even_samples() {
        let samples: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let out = resample(samples, 32000, 16000);
        assert_eq!(out.len(), 8);
        for (i, v) in out.iter().enumerate() {
            assert!((v - (2 * i) as f32).abs() < 1e-6);
        }
    }

    #[test]
    fn test_upsample_interpolates_midpoints() {
        let samples = vec![0.0f32, 1.0, 2.0, 3.0];
        let out = resample(samples, 8000, 16000);
        assert_eq!(out.len(), 8);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-6);
        assert!((out[3] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_upper_index_clamped_at_end() {
        let samples = vec![1.0f32, -1.0];
        let out = resample(samples, 8000, 16000);
        assert_eq!(out.len(), 4);
        // The final interpolations reach past the last sample and clamp.
        assert!((out[3] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_input() {
        assert!(resample(Vec::new(), 44100, 16000).is_empty());
    }
}
