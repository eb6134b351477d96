//! # Per-Session Audio Pipeline
//!
//! One pipeline instance lives for the duration of a session and is called
//! once per incoming chunk: decode → gain → optional low-pass → analyze →
//! smooth → encode. All stage state (filter delay line, smoothing
//! accumulators, FFT plans) is owned here, so chunk-to-chunk continuity is
//! guaranteed as long as the caller keeps feeding the same instance.
//!
//! Analysis sees the pre-clamp signal; the output bytes are clamped during
//! encoding. Capture consumers receive the encoded (clamped) bytes.

use super::analysis::{ChunkAnalyzer, ChunkMeters};
use super::convert::{decode_chunk, encode_chunk};
use super::filter::LowPassFilter;
use super::smoothing::MeterSmoother;

const DEFAULT_FRAME_SIZE: usize = 1024;
const DEFAULT_CUTOFF_HZ: f32 = 1000.0;
const DEFAULT_INTEGRATION_TIME_S: f32 = 0.5;

/// Stateful processing chain for one audio session.
pub struct AudioPipeline {
    sample_rate: u32,
    channels: u16,
    frame_size: usize,
    gain_db: f32,
    filter_enabled: bool,
    cutoff_hz: f32,
    alpha: f32,
    filter: LowPassFilter,
    analyzer: ChunkAnalyzer,
    smoother: MeterSmoother,
}

impl AudioPipeline {
    /// Build a pipeline with default DSP settings: unity gain, filter off at
    /// a 1 kHz cutoff, 0.5 s meter integration.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self::with_frame_size(sample_rate, channels, DEFAULT_FRAME_SIZE)
    }

    /// Build a pipeline with an explicit frame size. The frame size only
    /// feeds the metering time constant; chunks of any length still process.
    pub fn with_frame_size(sample_rate: u32, channels: u16, frame_size: usize) -> Self {
        Self {
            sample_rate,
            channels,
            frame_size,
            gain_db: 0.0,
            filter_enabled: false,
            cutoff_hz: DEFAULT_CUTOFF_HZ,
            alpha: smoothing_alpha(frame_size, sample_rate, DEFAULT_INTEGRATION_TIME_S),
            filter: LowPassFilter::new(DEFAULT_CUTOFF_HZ, sample_rate),
            analyzer: ChunkAnalyzer::new(),
            smoother: MeterSmoother::new(),
        }
    }

    /// Apply a `set_params` update in place.
    ///
    /// The filter only stays enabled when a cutoff is present. A changed
    /// cutoff recomputes the coefficients and discards the delay line;
    /// merely toggling `filter_enabled` leaves the delay line alone.
    pub fn update_settings(
        &mut self,
        gain_db: f32,
        filter_enabled: bool,
        cutoff_hz: Option<f32>,
        integration_time_s: f32,
    ) {
        self.gain_db = gain_db;
        self.filter_enabled = cutoff_hz.is_some() && filter_enabled;
        self.alpha = smoothing_alpha(self.frame_size, self.sample_rate, integration_time_s);

        if let Some(cutoff) = cutoff_hz {
            if cutoff != self.cutoff_hz {
                self.cutoff_hz = cutoff;
                self.filter.redesign(cutoff, self.sample_rate);
            }
        }
    }

    /// Process one chunk of raw PCM bytes. Returns the processed bytes
    /// (clamped, stereo interleaved) and the smoothed metering payload.
    pub fn process_chunk(&mut self, bytes: &[u8]) -> (Vec<u8>, ChunkMeters) {
        let mut frames = decode_chunk(bytes, self.channels);

        let gain = 10f32.powf(self.gain_db / 20.0);
        for sample in frames.left.iter_mut().chain(frames.right.iter_mut()) {
            *sample *= gain;
        }

        if self.filter_enabled {
            self.filter.apply(&mut frames);
        }

        let raw = self.analyzer.analyze(&frames);
        let meters = self.smoother.smooth(self.alpha, &raw);

        (encode_chunk(&frames), meters)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn cutoff_hz(&self) -> f32 {
        self.cutoff_hz
    }

    pub fn filter_enabled(&self) -> bool {
        self.filter_enabled
    }

    #[cfg(test)]
    fn filter_has_state(&self) -> bool {
        self.filter.has_state()
    }
}

/// EMA pole from the meter integration time: `alpha = exp(-dt / tau)` with
/// `dt` the duration of one frame buffer. Integration times at or below 1 ms
/// disable smoothing outright.
fn smoothing_alpha(frame_size: usize, sample_rate: u32, integration_time_s: f32) -> f32 {
    if integration_time_s <= 0.001 {
        return 0.0;
    }
    let dt = frame_size as f32 / sample_rate as f32;
    (-dt / integration_time_s).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        let mut bytes = vec![0u8; samples.len() * 2];
        LittleEndian::write_i16_into(samples, &mut bytes);
        bytes
    }

    fn pcm_samples(bytes: &[u8]) -> Vec<i16> {
        let mut out = vec![0i16; bytes.len() / 2];
        LittleEndian::read_i16_into(bytes, &mut out);
        out
    }

    #[test]
    fn test_mono_input_doubles_output_bytes() {
        let mut pipeline = AudioPipeline::new(44100, 1);
        let input = pcm_bytes(&vec![500i16; 1024]);
        let (output, _) = pipeline.process_chunk(&input);
        assert_eq!(output.len(), input.len() * 2);
    }

    #[test]
    fn test_stereo_output_length_matches_input() {
        let mut pipeline = AudioPipeline::new(44100, 2);
        let input = pcm_bytes(&vec![500i16; 2048]);
        let (output, _) = pipeline.process_chunk(&input);
        assert_eq!(output.len(), input.len());
    }

    #[test]
    fn test_six_db_gain_doubles_amplitude() {
        let mut pipeline = AudioPipeline::new(44100, 2);
        pipeline.update_settings(6.0, false, Some(1000.0), 0.0);

        let (output, _) = pipeline.process_chunk(&pcm_bytes(&[1000, 1000]));
        let samples = pcm_samples(&output);

        assert!((1990..=2010).contains(&samples[0]), "sample {}", samples[0]);
    }

    #[test]
    fn test_extreme_gain_clips_instead_of_wrapping() {
        let mut pipeline = AudioPipeline::new(44100, 2);
        pipeline.update_settings(20.0, false, Some(1000.0), 0.0);

        let (output, _) = pipeline.process_chunk(&pcm_bytes(&vec![32000i16; 100]));
        let samples = pcm_samples(&output);

        assert!(samples.iter().all(|&s| s >= 32700));
        assert!(samples.iter().all(|&s| s <= 32767));
    }

    #[test]
    fn test_silence_meters_at_floor() {
        let mut pipeline = AudioPipeline::new(44100, 2);
        let (_, meters) = pipeline.process_chunk(&pcm_bytes(&vec![0i16; 2048]));
        assert_eq!(meters.rms_db, -96.0);
        assert_eq!(meters.panning, 0.0);
    }

    #[test]
    fn test_smoothing_lags_burst_and_zero_integration_does_not() {
        let mut smoothed = AudioPipeline::new(44100, 2);
        smoothed.update_settings(0.0, false, Some(1000.0), 0.5);
        smoothed.process_chunk(&pcm_bytes(&vec![0i16; 2048]));
        let (_, lagging) = smoothed.process_chunk(&pcm_bytes(&vec![20000i16; 2048]));

        let mut instant = AudioPipeline::new(44100, 2);
        instant.update_settings(0.0, false, Some(1000.0), 0.0);
        instant.process_chunk(&pcm_bytes(&vec![0i16; 2048]));
        let (_, tracking) = instant.process_chunk(&pcm_bytes(&vec![20000i16; 2048]));

        assert!(lagging.rms_db < tracking.rms_db);
    }

    #[test]
    fn test_filter_state_carries_across_chunks() {
        let chunk: Vec<i16> = (0..2048).map(|i| ((i as f32 * 0.5).sin() * 12000.0) as i16).collect();
        let bytes = pcm_bytes(&chunk);

        let mut pipeline = AudioPipeline::new(44100, 2);
        pipeline.update_settings(0.0, true, Some(1000.0), 0.0);
        let (first, _) = pipeline.process_chunk(&bytes);
        let (second, _) = pipeline.process_chunk(&bytes);

        // Identical input chunks, different output: the delay line carried.
        assert_ne!(first, second);

        // A fresh pipeline fed the same first chunk reproduces it exactly.
        let mut fresh = AudioPipeline::new(44100, 2);
        fresh.update_settings(0.0, true, Some(1000.0), 0.0);
        let (replayed, _) = fresh.process_chunk(&bytes);
        assert_eq!(first, replayed);
    }

    #[test]
    fn test_cutoff_change_resets_filter_state() {
        let mut pipeline = AudioPipeline::new(44100, 2);
        pipeline.update_settings(0.0, true, Some(1000.0), 0.0);
        pipeline.process_chunk(&pcm_bytes(&vec![4000i16; 512]));
        assert!(pipeline.filter_has_state());

        pipeline.update_settings(0.0, true, Some(500.0), 0.0);
        assert!(!pipeline.filter_has_state());
    }

    #[test]
    fn test_enable_toggle_keeps_filter_state() {
        let mut pipeline = AudioPipeline::new(44100, 2);
        pipeline.update_settings(0.0, true, Some(1000.0), 0.0);
        pipeline.process_chunk(&pcm_bytes(&vec![4000i16; 512]));

        pipeline.update_settings(0.0, false, Some(1000.0), 0.0);
        pipeline.update_settings(0.0, true, Some(1000.0), 0.0);
        assert!(pipeline.filter_has_state());
    }

    #[test]
    fn test_missing_cutoff_disables_filter() {
        let mut pipeline = AudioPipeline::new(44100, 2);
        pipeline.update_settings(0.0, true, None, 0.5);
        assert!(!pipeline.filter_enabled());
    }
}
