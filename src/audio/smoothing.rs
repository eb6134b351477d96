//! # Meter Smoothing
//!
//! Exponential smoothing of the per-chunk metering values so the UI meters
//! move steadily instead of flickering. Each metering channel bootstraps
//! differently:
//!
//! - **Loudness** starts at a -100 dB sentinel and takes the first measured
//!   value directly once it rises above that floor.
//! - **Panning** always decays from a zero-initialized accumulator; silence
//!   should read centered, so there is no direct bootstrap.
//! - **Spectrum** assigns directly whenever the previous vector is absent or
//!   of a different length.

use super::analysis::ChunkMeters;

/// Sentinel the loudness accumulator starts from. Values below -99 dB mark
/// the accumulator as not yet bootstrapped; the silence floor reported by
/// analysis is -96 dB, safely above it.
pub const BOOTSTRAP_FLOOR_DB: f32 = -100.0;

/// Smoothing state carried across chunks.
#[derive(Debug, Clone)]
pub struct MeterSmoother {
    rms_db: f32,
    panning: f32,
    spectrum: Option<Vec<f32>>,
}

impl MeterSmoother {
    pub fn new() -> Self {
        Self {
            rms_db: BOOTSTRAP_FLOOR_DB,
            panning: 0.0,
            spectrum: None,
        }
    }

    /// Fold one chunk's raw meters into the running averages and return the
    /// smoothed values. `alpha` is the pole of the EMA: 0 disables smoothing
    /// entirely, values toward 1 integrate over longer windows.
    pub fn smooth(&mut self, alpha: f32, raw: &ChunkMeters) -> ChunkMeters {
        if self.rms_db < BOOTSTRAP_FLOOR_DB + 1.0 {
            self.rms_db = raw.rms_db;
        } else {
            self.rms_db = alpha * self.rms_db + (1.0 - alpha) * raw.rms_db;
        }

        self.panning = alpha * self.panning + (1.0 - alpha) * raw.panning;

        match &mut self.spectrum {
            Some(previous) if previous.len() == raw.spectrum.len() => {
                for (prev, curr) in previous.iter_mut().zip(raw.spectrum.iter()) {
                    *prev = alpha * *prev + (1.0 - alpha) * curr;
                }
            }
            _ => self.spectrum = Some(raw.spectrum.clone()),
        }

        ChunkMeters {
            rms_db: self.rms_db,
            panning: self.panning,
            spectrum: self.spectrum.clone().unwrap_or_default(),
        }
    }
}

impl Default for MeterSmoother {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meters(rms_db: f32, panning: f32, spectrum: Vec<f32>) -> ChunkMeters {
        ChunkMeters {
            rms_db,
            panning,
            spectrum,
        }
    }

    #[test]
    fn test_loudness_bootstraps_to_first_value() {
        let mut smoother = MeterSmoother::new();
        let out = smoother.smooth(0.9, &meters(-20.0, 0.0, vec![0.0; 32]));
        assert_eq!(out.rms_db, -20.0);
    }

    #[test]
    fn test_zero_alpha_tracks_instantly() {
        let mut smoother = MeterSmoother::new();
        smoother.smooth(0.0, &meters(-40.0, -0.5, vec![0.2; 32]));
        let out = smoother.smooth(0.0, &meters(-10.0, 0.5, vec![0.8; 32]));

        assert_eq!(out.rms_db, -10.0);
        assert_eq!(out.panning, 0.5);
        assert!(out.spectrum.iter().all(|&v| v == 0.8));
    }

    #[test]
    fn test_smoothed_burst_lags_instantaneous() {
        let mut smoother = MeterSmoother::new();
        smoother.smooth(0.9, &meters(-96.0, 0.0, vec![0.0; 32]));
        let out = smoother.smooth(0.9, &meters(-6.0, 0.0, vec![1.0; 32]));

        assert!(out.rms_db < -6.0, "smoothed {} should lag the burst", out.rms_db);
    }

    #[test]
    fn test_panning_decays_from_center() {
        let mut smoother = MeterSmoother::new();
        let out = smoother.smooth(0.5, &meters(-20.0, 1.0, vec![0.0; 32]));
        // First call is already an EMA step, not an assignment.
        assert!((out.panning - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_spectrum_reassigns_on_length_change() {
        let mut smoother = MeterSmoother::new();
        smoother.smooth(0.9, &meters(-20.0, 0.0, vec![0.5; 32]));
        let out = smoother.smooth(0.9, &meters(-20.0, 0.0, vec![1.0; 16]));

        assert_eq!(out.spectrum.len(), 16);
        assert!(out.spectrum.iter().all(|&v| v == 1.0));
    }
}
