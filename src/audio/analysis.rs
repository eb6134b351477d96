//! # Chunk Analysis
//!
//! Derives the metering signals for one processed chunk: loudness in dB,
//! stereo panning, and a 32-band spectral snapshot scaled for UI display.
//! Analysis runs on the pre-clamp frames so that a hot, gain-boosted signal
//! meters above 0 dBFS instead of being flattened by the output clamp.

use rustfft::{num_complex::Complex, FftPlanner};

use super::convert::StereoBuffer;

/// Loudness reported for a silent chunk, in dB. Deliberately distinct from
/// the smoothing bootstrap floor of -100 dB.
pub const SILENCE_FLOOR_DB: f32 = -96.0;

/// Number of spectrum bands sent to the UI.
pub const SPECTRUM_BANDS: usize = 32;

/// Display range for spectrum normalization, in dB.
const SPECTRUM_MIN_DB: f32 = -80.0;
const SPECTRUM_MAX_DB: f32 = 0.0;

/// Below this combined channel energy, panning reads centered.
const PAN_SILENCE_THRESHOLD: f32 = 1e-4;

/// Instantaneous (un-smoothed) metering values for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMeters {
    /// Loudness of the mono mix in dB, floored at [`SILENCE_FLOOR_DB`].
    pub rms_db: f32,
    /// Left/right energy balance in [-1, 1]; negative leans left.
    pub panning: f32,
    /// Normalized spectrum, [`SPECTRUM_BANDS`] values in [0, 1].
    pub spectrum: Vec<f32>,
}

/// Analyzer holding a reusable FFT planner.
///
/// Chunks may arrive with any frame count, so plans are created per length;
/// the planner caches them across calls.
pub struct ChunkAnalyzer {
    planner: FftPlanner<f32>,
}

impl ChunkAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Analyze one buffer of stereo frames.
    pub fn analyze(&mut self, frames: &StereoBuffer) -> ChunkMeters {
        let rms_left = rms(&frames.left);
        let rms_right = rms(&frames.right);
        let mono = frames.mono_mix();

        let mono_rms = rms(&mono);
        let rms_db = if mono_rms > 0.0 {
            20.0 * mono_rms.log10()
        } else {
            SILENCE_FLOOR_DB
        };

        let denominator = rms_left + rms_right;
        let panning = if denominator > PAN_SILENCE_THRESHOLD {
            ((rms_right - rms_left) / denominator).clamp(-1.0, 1.0)
        } else {
            0.0
        };

        ChunkMeters {
            rms_db,
            panning,
            spectrum: self.spectrum(&mono),
        }
    }

    /// Hann-windowed magnitude spectrum of the mono mix, reduced to
    /// [`SPECTRUM_BANDS`] geometrically spaced bands over the lower half of
    /// the one-sided spectrum, normalized into [0, 1].
    fn spectrum(&mut self, mono: &[f32]) -> Vec<f32> {
        let n = mono.len();
        if n == 0 {
            return vec![0.0; SPECTRUM_BANDS];
        }

        let mut buffer: Vec<Complex<f32>> = mono
            .iter()
            .enumerate()
            .map(|(i, &sample)| Complex::new(sample * hann(i, n), 0.0))
            .collect();
        self.planner.plan_fft_forward(n).process(&mut buffer);

        // One-sided spectrum in dB, magnitudes normalized by 2/N. The epsilon
        // keeps log10 finite on empty bins.
        let one_sided = n / 2 + 1;
        let scale = 2.0 / n as f32;
        let bins_db: Vec<f32> = buffer[..one_sided]
            .iter()
            .map(|c| 20.0 * (c.norm() * scale + 1e-10).log10())
            .collect();

        // Only the lower half of the one-sided spectrum is displayed.
        let effective_len = (one_sided as f32 * 0.5) as usize;
        let indices = band_indices(effective_len, one_sided - 1);

        indices
            .into_iter()
            .map(|i| {
                let db = bins_db[i];
                ((db - SPECTRUM_MIN_DB) / (SPECTRUM_MAX_DB - SPECTRUM_MIN_DB)).clamp(0.0, 1.0)
            })
            .collect()
    }
}

impl Default for ChunkAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Symmetric Hann window coefficient for position `i` of `n`.
fn hann(i: usize, n: usize) -> f32 {
    if n < 2 {
        return 1.0;
    }
    0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos())
}

/// Geometrically spaced bin indices from 1 to `effective_len - 1`,
/// truncated to integers and clamped to the available bin range. Buffers too
/// short to span a geometric range collapse every band onto index 0.
fn band_indices(effective_len: usize, max_index: usize) -> Vec<usize> {
    if effective_len < 2 {
        return vec![0; SPECTRUM_BANDS];
    }

    let stop = (effective_len - 1) as f64;
    (0..SPECTRUM_BANDS)
        .map(|i| {
            let t = i as f64 / (SPECTRUM_BANDS - 1) as f64;
            let value = (t * stop.ln()).exp();
            (value as usize).min(max_index)
        })
        .collect()
}

/// Root-mean-square of a sample slice; 0.0 for an empty slice.
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo(left: Vec<f32>, right: Vec<f32>) -> StereoBuffer {
        StereoBuffer { left, right }
    }

    #[test]
    fn test_silence_hits_the_floor() {
        let mut analyzer = ChunkAnalyzer::new();
        let meters = analyzer.analyze(&stereo(vec![0.0; 1024], vec![0.0; 1024]));

        assert_eq!(meters.rms_db, SILENCE_FLOOR_DB);
        assert_eq!(meters.panning, 0.0);
        assert_eq!(meters.spectrum.len(), SPECTRUM_BANDS);
        assert!(meters.spectrum.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_panning_left_only() {
        let mut analyzer = ChunkAnalyzer::new();
        let meters = analyzer.analyze(&stereo(vec![0.5; 256], vec![0.0; 256]));
        assert!(meters.panning <= -0.9, "panning {}", meters.panning);
    }

    #[test]
    fn test_panning_right_only() {
        let mut analyzer = ChunkAnalyzer::new();
        let meters = analyzer.analyze(&stereo(vec![0.0; 256], vec![0.5; 256]));
        assert!(meters.panning >= 0.9, "panning {}", meters.panning);
    }

    #[test]
    fn test_spectrum_shape_and_range() {
        let mut analyzer = ChunkAnalyzer::new();
        let tone: Vec<f32> = (0..1024)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        let meters = analyzer.analyze(&stereo(tone.clone(), tone));

        assert_eq!(meters.spectrum.len(), SPECTRUM_BANDS);
        assert!(meters.spectrum.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!(meters.spectrum.iter().any(|&v| v > 0.0), "tone left no energy");
    }

    #[test]
    fn test_full_scale_sine_loudness() {
        // RMS of a full-scale sine is 1/sqrt(2) => about -3 dB.
        let mut analyzer = ChunkAnalyzer::new();
        let tone: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 100.0 * i as f32 / 44100.0).sin())
            .collect();
        let meters = analyzer.analyze(&stereo(tone.clone(), tone));

        assert!((meters.rms_db + 3.01).abs() < 0.2, "rms_db {}", meters.rms_db);
    }

    #[test]
    fn test_short_buffer_degenerates_gracefully() {
        let mut analyzer = ChunkAnalyzer::new();
        for n in [0usize, 1, 2, 3] {
            let meters = analyzer.analyze(&stereo(vec![0.1; n], vec![0.1; n]));
            assert_eq!(meters.spectrum.len(), SPECTRUM_BANDS);
            assert!(meters.spectrum.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn test_empty_buffer_is_silent() {
        let mut analyzer = ChunkAnalyzer::new();
        let meters = analyzer.analyze(&stereo(vec![], vec![]));
        assert_eq!(meters.rms_db, SILENCE_FLOOR_DB);
        assert_eq!(meters.panning, 0.0);
    }
}
