//! Log-mel filterbank feature extraction.
//!
//! Converts 16 kHz mono f32 audio into the log-mel representation the
//! Conformer encoder was trained on (NeMo-style parameters):
//!
//! - FFT size: 512
//! - Hop length: 160 (10ms)
//! - Window length: 400 (25ms), symmetric Hann
//! - Mel bands: 128, HTK mel scale, triangular filters
//! - Natural log of mel energies, floored at 1e-10
//! - Per-utterance normalization to zero mean and unit variance per band
//!
//! The normalization step is mandatory. The encoder consumes normalized
//! features and produces silently degraded text without it.

use ndarray::Array2;
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

use super::error::AsrError;

/// FFT size used for the short-time transform.
pub const N_FFT: usize = 512;

/// Number of samples between successive frames (10ms at 16kHz).
pub const HOP_LENGTH: usize = 160;

/// Analysis window length (25ms at 16kHz).
pub const WIN_LENGTH: usize = 400;

/// Number of one-sided frequency bins.
pub const NUM_FREQ_BINS: usize = N_FFT / 2 + 1;

/// Floor applied to mel energies before the log.
const LOG_FLOOR: f64 = 1e-10;

/// Floor applied to the per-band standard deviation during normalization.
const STD_FLOOR: f64 = 1e-10;

#[inline]
fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

#[inline]
fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0f64.powf(mel / 2595.0) - 1.0)
}

/// Mel filterbank feature extractor.
///
/// The filterbank matrix, analysis window, and FFT plan are built once at
/// startup; extraction itself allocates only per-utterance buffers.
pub struct MelFilterbank {
    n_mels: usize,
    /// Triangular filter matrix, shape `[n_mels, NUM_FREQ_BINS]`.
    filterbank: Array2<f64>,
    /// Precomputed symmetric Hann window of `WIN_LENGTH` coefficients.
    window: Vec<f64>,
    r2c: Arc<dyn RealToComplex<f64>>,
}

impl MelFilterbank {
    /// Build the extractor for the given band count and sample rate.
    pub fn new(n_mels: usize, sample_rate: u32) -> Self {
        let filterbank = build_filterbank(n_mels, sample_rate);

        // Symmetric Hann: w[i] = 0.5 * (1 - cos(2*pi*i / (W-1)))
        let denom = (WIN_LENGTH - 1) as f64;
        let window = (0..WIN_LENGTH)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / denom).cos()))
            .collect();

        let r2c = RealFftPlanner::<f64>::new().plan_fft_forward(N_FFT);

        Self {
            n_mels,
            filterbank,
            window,
            r2c,
        }
    }

    /// Number of mel bands per frame.
    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    /// Number of frames produced for `num_samples` input samples.
    pub fn num_frames(&self, num_samples: usize) -> usize {
        if num_samples < WIN_LENGTH {
            0
        } else {
            (num_samples - WIN_LENGTH) / HOP_LENGTH + 1
        }
    }

    /// Extract normalized log-mel features from 16 kHz mono samples.
    ///
    /// # Arguments
    /// * `samples` - Mono f32 samples at 16 kHz
    ///
    /// # Returns
    /// * `Result<Array2<f32>, AsrError>` - Feature matrix of shape
    ///   `[frames, n_mels]`. Inputs shorter than one window yield a matrix
    ///   with zero rows; callers decide whether that is acceptable.
    pub fn extract(&self, samples: &[f32]) -> Result<Array2<f32>, AsrError> {
        let num_frames = self.num_frames(samples.len());
        let mut features = Array2::<f32>::zeros((num_frames, self.n_mels));
        if num_frames == 0 {
            return Ok(features);
        }

        let mut input = self.r2c.make_input_vec();
        let mut spectrum = self.r2c.make_output_vec();
        let mut scratch = self.r2c.make_scratch_vec();
        let mut power = vec![0.0f64; NUM_FREQ_BINS];

        for frame in 0..num_frames {
            let start = frame * HOP_LENGTH;

            // Windowed frame, zero-padded to the FFT size.
            input.fill(0.0);
            for i in 0..WIN_LENGTH {
                input[i] = samples[start + i] as f64 * self.window[i];
            }

            self.r2c
                .process_with_scratch(&mut input, &mut spectrum, &mut scratch)
                .map_err(|e| AsrError::InferenceFailed(format!("FFT failed: {}", e)))?;

            one_sided_power(&spectrum, &mut power);

            for (m, filter) in self.filterbank.outer_iter().enumerate() {
                let mut energy = 0.0f64;
                for (k, &p) in power.iter().enumerate() {
                    energy += p * filter[k];
                }
                features[[frame, m]] = energy.max(LOG_FLOOR).ln() as f32;
            }
        }

        self.normalize(&mut features);
        Ok(features)
    }

    /// Normalize each mel band to zero mean and unit variance across the
    /// utterance.
    fn normalize(&self, features: &mut Array2<f32>) {
        let frames = features.nrows();
        if frames == 0 {
            return;
        }

        for m in 0..self.n_mels {
            let mut sum = 0.0f64;
            for t in 0..frames {
                sum += features[[t, m]] as f64;
            }
            let mean = sum / frames as f64;

            let mut sum_sq = 0.0f64;
            for t in 0..frames {
                let diff = features[[t, m]] as f64 - mean;
                sum_sq += diff * diff;
            }
            let std = (sum_sq / frames as f64).sqrt().max(STD_FLOOR);

            for t in 0..frames {
                features[[t, m]] = ((features[[t, m]] as f64 - mean) / std) as f32;
            }
        }
    }
}

/// Power spectrum `Re^2 + Im^2` over the one-sided bins.
fn one_sided_power(spectrum: &[Complex<f64>], power: &mut [f64]) {
    for (p, c) in power.iter_mut().zip(spectrum.iter()) {
        *p = c.re * c.re + c.im * c.im;
    }
}

/// Build the `[n_mels, NUM_FREQ_BINS]` triangular filter matrix.
///
/// `n_mels + 2` points are spaced evenly on the HTK mel scale between 0 Hz
/// and Nyquist, converted back to Hz, and mapped to FFT bin indices with
/// `k = floor((N_FFT + 1) * hz / sample_rate)`. Filter `m` rises over
/// `[k_m, k_{m+1})` and falls over `[k_{m+1}, k_{m+2})`.
fn build_filterbank(n_mels: usize, sample_rate: u32) -> Array2<f64> {
    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(sample_rate as f64 / 2.0);

    let bin_points: Vec<usize> = (0..n_mels + 2)
        .map(|i| {
            let mel = mel_min + i as f64 * (mel_max - mel_min) / (n_mels + 1) as f64;
            let hz = mel_to_hz(mel);
            ((N_FFT + 1) as f64 * hz / sample_rate as f64).floor() as usize
        })
        .collect();

    let mut filterbank = Array2::<f64>::zeros((n_mels, NUM_FREQ_BINS));
    for m in 0..n_mels {
        let (left, center, right) = (bin_points[m], bin_points[m + 1], bin_points[m + 2]);
        for k in left..center.min(NUM_FREQ_BINS) {
            filterbank[[m, k]] = (k - left) as f64 / (center - left) as f64;
        }
        for k in center..right.min(NUM_FREQ_BINS) {
            filterbank[[m, k]] = (right - k) as f64 / (right - center) as f64;
        }
    }

    filterbank
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic noise-like signal so every band varies across frames.
    fn pseudo_noise(len: usize) -> Vec<f32> {
        let mut state = 0x2545F4914F6CDD1Du64;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 33) as f64 / (1u64 << 31) as f64 - 0.5) as f32
            })
            .collect()
    }

    #[test]
    fn test_filterbank_shape() {
        let mel = MelFilterbank::new(128, 16000);
        assert_eq!(mel.filterbank.shape(), &[128, NUM_FREQ_BINS]);
        assert_eq!(NUM_FREQ_BINS, 257);
    }

    #[test]
    fn test_filterbank_values_in_unit_range() {
        let mel = MelFilterbank::new(128, 16000);
        for &v in mel.filterbank.iter() {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_hann_window_shape() {
        let mel = MelFilterbank::new(128, 16000);
        assert_eq!(mel.window.len(), WIN_LENGTH);
        assert!(mel.window[0].abs() < 1e-12);
        assert!(mel.window[WIN_LENGTH - 1].abs() < 1e-12);
        // Symmetric
        for i in 0..WIN_LENGTH / 2 {
            assert!((mel.window[i] - mel.window[WIN_LENGTH - 1 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_mel_scale_round_trip() {
        for hz in [0.0, 100.0, 700.0, 4000.0, 8000.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((back - hz).abs() < 1e-6, "{} -> {}", hz, back);
        }
    }

    #[test]
    fn test_frame_count() {
        let mel = MelFilterbank::new(128, 16000);
        assert_eq!(mel.num_frames(16000), (16000 - WIN_LENGTH) / HOP_LENGTH + 1);
        assert_eq!(mel.num_frames(WIN_LENGTH), 1);
        assert_eq!(mel.num_frames(WIN_LENGTH + HOP_LENGTH), 2);

        let samples = pseudo_noise(16000);
        let features = mel.extract(&samples).unwrap();
        assert_eq!(features.nrows(), mel.num_frames(16000));
        assert_eq!(features.ncols(), 128);
    }

    #[test]
    fn test_short_input_yields_no_frames() {
        let mel = MelFilterbank::new(128, 16000);
        assert_eq!(mel.num_frames(WIN_LENGTH - 1), 0);

        let features = mel.extract(&pseudo_noise(WIN_LENGTH - 1)).unwrap();
        assert_eq!(features.nrows(), 0);

        let features = mel.extract(&[]).unwrap();
        assert_eq!(features.nrows(), 0);
    }

    #[test]
    fn test_normalization_zero_mean_unit_variance() {
        let mel = MelFilterbank::new(128, 16000);
        let samples = pseudo_noise(32000);
        let features = mel.extract(&samples).unwrap();
        let frames = features.nrows();
        assert!(frames > 1);

        for m in 0..128 {
            let mut sum = 0.0f64;
            let mut sum_sq = 0.0f64;
            for t in 0..frames {
                sum += features[[t, m]] as f64;
            }
            let mean = sum / frames as f64;
            for t in 0..frames {
                let d = features[[t, m]] as f64 - mean;
                sum_sq += d * d;
            }
            let var = sum_sq / frames as f64;

            assert!(mean.abs() < 1e-5, "band {} mean {}", m, mean);
            assert!((var - 1.0).abs() < 1e-3, "band {} variance {}", m, var);
        }
    }

    #[test]
    fn test_all_values_finite_for_silence() {
        // Pure zeros exercise the log floor; nothing may become NaN or inf.
        let mel = MelFilterbank::new(128, 16000);
        let features = mel.extract(&vec![0.0f32; 8000]).unwrap();
        for &v in features.iter() {
            assert!(v.is_finite());
        }
    }

    #[test]
    fn test_tone_concentrates_energy() {
        // A 1 kHz tone, before normalization, should put its strongest
        // response into a band whose filter covers 1 kHz. Verified via the
        // filterbank directly: find the peak bin of the band that responds
        // most to the 1 kHz FFT bin.
        let mel = MelFilterbank::new(128, 16000);
        let bin_1khz = (1000.0 * (N_FFT + 1) as f64 / 16000.0) as usize;
        let best_band = (0..128)
            .max_by(|&a, &b| {
                mel.filterbank[[a, bin_1khz]]
                    .partial_cmp(&mel.filterbank[[b, bin_1khz]])
                    .unwrap()
            })
            .unwrap();
        assert!(mel.filterbank[[best_band, bin_1khz]] > 0.0);
    }
}
