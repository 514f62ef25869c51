//! Spectral fingerprints for speaker clustering
//!
//! Each speech interval is summarized as a fixed-length vector: mean and
//! standard deviation of 13 MFCCs across time, plus means of their first
//! and second temporal derivatives. Intervals shorter than
//! [`MIN_INTERVAL_SECONDS`] are too unreliable to fingerprint and are
//! discarded by the caller.

use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// 25 ms analysis frame at 16 kHz
pub const FRAME_SIZE: usize = 400;
/// 10 ms hop at 16 kHz
pub const HOP_SIZE: usize = 160;
/// Cepstral coefficients kept per frame
pub const N_MFCC: usize = 13;
/// Minimum interval length worth fingerprinting (seconds)
pub const MIN_INTERVAL_SECONDS: f64 = 0.3;
/// mean + std of the MFCCs, plus means of delta and delta-delta
pub const FINGERPRINT_DIM: usize = N_MFCC * 4;

const N_MELS: usize = 40;

/// MFCC fingerprint extractor
///
/// Plans the FFT and filterbank once; one instance serves a whole
/// diarization run.
pub struct MfccExtractor {
    window: Vec<f32>,
    mel_filterbank: Vec<Vec<f32>>,
    dct_basis: Vec<Vec<f32>>,
    fft: Arc<dyn RealToComplex<f32>>,
}

impl MfccExtractor {
    pub fn new(sample_rate: u32) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        Self {
            window: hann_window(FRAME_SIZE),
            mel_filterbank: create_mel_filterbank(sample_rate, FRAME_SIZE, N_MELS),
            dct_basis: create_dct_basis(N_MFCC, N_MELS),
            fft: planner.plan_fft_forward(FRAME_SIZE),
        }
    }

    /// Fingerprint one speech interval
    ///
    /// Returns `None` when the interval is too short to produce stable
    /// statistics; such intervals never reach clustering.
    pub fn fingerprint(&self, samples: &[f32]) -> Option<Vec<f32>> {
        let mel_frames =
            log_mel_spectrogram(samples, &self.window, &self.mel_filterbank, &self.fft)?;

        // Deltas need at least one neighbor on each side
        if mel_frames.len() < 3 {
            return None;
        }

        let mfcc: Vec<Vec<f32>> = mel_frames
            .iter()
            .map(|mel| {
                self.dct_basis
                    .iter()
                    .map(|row| row.iter().zip(mel.iter()).map(|(b, m)| b * m).sum())
                    .collect()
            })
            .collect();

        let delta = temporal_delta(&mfcc);
        let delta2 = temporal_delta(&delta);

        let mut fingerprint = Vec::with_capacity(FINGERPRINT_DIM);
        fingerprint.extend(column_means(&mfcc));
        fingerprint.extend(column_stds(&mfcc));
        fingerprint.extend(column_means(&delta));
        fingerprint.extend(column_means(&delta2));

        Some(fingerprint)
    }
}

/// 80-mel log filterbank energies, one row per frame
///
/// Input features for the speaker-embedding network.
pub fn log_mel_frames(samples: &[f32], sample_rate: u32, n_mels: usize) -> Vec<Vec<f32>> {
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FRAME_SIZE);
    let window = hann_window(FRAME_SIZE);
    let filterbank = create_mel_filterbank(sample_rate, FRAME_SIZE, n_mels);
    log_mel_spectrogram(samples, &window, &filterbank, &fft).unwrap_or_default()
}

/// Framed log-mel spectrogram, `None` when no full frame fits
fn log_mel_spectrogram(
    samples: &[f32],
    window: &[f32],
    filterbank: &[Vec<f32>],
    fft: &Arc<dyn RealToComplex<f32>>,
) -> Option<Vec<Vec<f32>>> {
    if samples.len() < FRAME_SIZE {
        return None;
    }

    let mut spectrum = fft.make_output_vec();
    let mut frames = Vec::with_capacity((samples.len() - FRAME_SIZE) / HOP_SIZE + 1);

    let mut start = 0;
    while start + FRAME_SIZE <= samples.len() {
        let mut buf: Vec<f32> = samples[start..start + FRAME_SIZE]
            .iter()
            .zip(window.iter())
            .map(|(s, w)| s * w)
            .collect();

        fft.process(&mut buf, &mut spectrum).ok()?;

        let power: Vec<f32> = spectrum.iter().map(|c| c.norm_sqr()).collect();

        let mel_frame: Vec<f32> = filterbank
            .iter()
            .map(|filter| {
                let sum: f32 = filter.iter().zip(power.iter()).map(|(w, p)| w * p).sum();
                // Log mel with floor to avoid log(0)
                sum.max(1e-10).ln()
            })
            .collect();

        frames.push(mel_frame);
        start += HOP_SIZE;
    }

    Some(frames)
}

/// Central-difference temporal derivative, endpoints one-sided
fn temporal_delta(frames: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let t = frames.len();
    if t < 2 {
        return frames.to_vec();
    }
    let dim = frames[0].len();

    (0..t)
        .map(|i| {
            let (prev, next, span) = if i == 0 {
                (0, 1, 1.0)
            } else if i == t - 1 {
                (t - 2, t - 1, 1.0)
            } else {
                (i - 1, i + 1, 2.0)
            };
            (0..dim)
                .map(|d| (frames[next][d] - frames[prev][d]) / span)
                .collect()
        })
        .collect()
}

fn column_means(frames: &[Vec<f32>]) -> Vec<f32> {
    let t = frames.len().max(1) as f32;
    let dim = frames.first().map(Vec::len).unwrap_or(0);
    (0..dim)
        .map(|d| frames.iter().map(|f| f[d]).sum::<f32>() / t)
        .collect()
}

fn column_stds(frames: &[Vec<f32>]) -> Vec<f32> {
    let means = column_means(frames);
    let t = frames.len().max(1) as f32;
    means
        .iter()
        .enumerate()
        .map(|(d, mean)| {
            let var = frames.iter().map(|f| (f[d] - mean).powi(2)).sum::<f32>() / t;
            var.sqrt()
        })
        .collect()
}

/// Symmetric Hann window
fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let n = (len - 1) as f32;
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n).cos())
        })
        .collect()
}

/// Create mel filterbank (compatible with torchaudio/librosa)
/// Uses Hz-based interpolation (not bin indices) for better accuracy
pub(crate) fn create_mel_filterbank(
    sample_rate: u32,
    n_fft: usize,
    n_mels: usize,
) -> Vec<Vec<f32>> {
    let num_bins = n_fft / 2 + 1;
    let fmax = sample_rate as f32 / 2.0;

    // Convert Hz to Mel (HTK formula)
    let hz_to_mel = |hz: f32| -> f32 { 2595.0 * (1.0 + hz / 700.0).log10() };
    let mel_to_hz = |mel: f32| -> f32 { 700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0) };

    // Frequencies for each FFT bin
    let all_freqs: Vec<f32> = (0..num_bins)
        .map(|i| i as f32 * fmax / (num_bins - 1) as f32)
        .collect();

    // Mel points: left edge, centers, right edge
    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(fmax);
    let f_pts: Vec<f32> = (0..=n_mels + 1)
        .map(|i| {
            let mel = mel_min + i as f32 * (mel_max - mel_min) / (n_mels + 1) as f32;
            mel_to_hz(mel)
        })
        .collect();

    let f_diff: Vec<f32> = (0..n_mels + 1).map(|i| f_pts[i + 1] - f_pts[i]).collect();

    // Triangular filters
    let mut filterbank = vec![vec![0.0f32; num_bins]; n_mels];

    for m in 0..n_mels {
        for (k, &freq) in all_freqs.iter().enumerate() {
            let lower = (freq - f_pts[m]) / f_diff[m];
            let upper = (f_pts[m + 2] - freq) / f_diff[m + 1];
            filterbank[m][k] = lower.min(upper).max(0.0);
        }
    }

    filterbank
}

/// Orthonormal DCT-II basis, `n_out` rows over `n_in` mel bands
fn create_dct_basis(n_out: usize, n_in: usize) -> Vec<Vec<f32>> {
    let scale = (2.0 / n_in as f32).sqrt();
    (0..n_out)
        .map(|k| {
            let row_scale = if k == 0 {
                scale / 2.0f32.sqrt()
            } else {
                scale
            };
            (0..n_in)
                .map(|m| {
                    let angle =
                        std::f32::consts::PI * k as f32 * (2.0 * m as f32 + 1.0) / (2.0 * n_in as f32);
                    row_scale * angle.cos()
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 16_000;

    fn tone(freq: f32, seconds: f64) -> Vec<f32> {
        let n = (seconds * SAMPLE_RATE as f64) as usize;
        (0..n)
            .map(|i| (i as f32 * freq * 2.0 * std::f32::consts::PI / SAMPLE_RATE as f32).sin() * 0.5)
            .collect()
    }

    fn euclidean(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    #[test]
    fn test_fingerprint_dimension() {
        let extractor = MfccExtractor::new(SAMPLE_RATE);
        let fp = extractor.fingerprint(&tone(440.0, 0.5)).unwrap();
        assert_eq!(fp.len(), FINGERPRINT_DIM);
        assert!(fp.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_too_short_interval_rejected() {
        let extractor = MfccExtractor::new(SAMPLE_RATE);
        // Under two hops of audio: not enough frames for deltas
        assert!(extractor.fingerprint(&tone(440.0, 0.02)).is_none());
    }

    #[test]
    fn test_distinct_tones_separate() {
        let extractor = MfccExtractor::new(SAMPLE_RATE);
        let low_a = extractor.fingerprint(&tone(200.0, 0.5)).unwrap();
        let low_b = extractor.fingerprint(&tone(210.0, 0.5)).unwrap();
        let high = extractor.fingerprint(&tone(3000.0, 0.5)).unwrap();

        let near = euclidean(&low_a, &low_b);
        let far = euclidean(&low_a, &high);
        assert!(far > near, "expected {} > {}", far, near);
    }

    #[test]
    fn test_mel_filterbank_shape() {
        let filterbank = create_mel_filterbank(SAMPLE_RATE, FRAME_SIZE, N_MELS);
        assert_eq!(filterbank.len(), N_MELS);
        assert_eq!(filterbank[0].len(), FRAME_SIZE / 2 + 1);
    }

    #[test]
    fn test_log_mel_frames_shape() {
        let frames = log_mel_frames(&tone(440.0, 0.5), SAMPLE_RATE, 80);
        assert!(!frames.is_empty());
        assert_eq!(frames[0].len(), 80);
    }
}
