//! # PCM Sample Conversion
//!
//! Converts between the wire format (raw little-endian 16-bit PCM bytes) and
//! the internal representation (normalized floating-point stereo frames).
//! All processing downstream of this module works on stereo float buffers,
//! regardless of whether the client sent mono or stereo audio.
//!
//! ## Conversion Rules:
//! - **Decode**: i16 samples are scaled by 1/32768 into [-1.0, 1.0]
//! - **Mono input**: duplicated into identical left/right channels
//! - **Stereo input**: consecutive sample pairs become (L, R) frames; an odd
//!   trailing sample is discarded
//! - **Encode**: samples are clamped to [-1.0, 1.0] before scaling by 32767,
//!   preventing integer wraparound on hot signals

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// A buffer of stereo audio frames in planar layout.
///
/// `left` and `right` always have the same length; one index across both
/// vectors is one frame.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoBuffer {
    /// Number of frames in the buffer.
    pub fn frame_count(&self) -> usize {
        self.left.len()
    }

    /// Mono mix: arithmetic mean of left and right per frame.
    pub fn mono_mix(&self) -> Vec<f32> {
        self.left
            .iter()
            .zip(self.right.iter())
            .map(|(l, r)| (l + r) * 0.5)
            .collect()
    }
}

/// Decode raw little-endian 16-bit PCM bytes into normalized stereo frames.
///
/// `channel_count` of 1 duplicates the mono stream into both channels; any
/// other value is treated as interleaved stereo. A trailing odd sample in
/// stereo input is truncated, matching the wire contract: clients may send
/// chunks of any byte length, and the unpaired remainder carries no frame.
pub fn decode_chunk(bytes: &[u8], channel_count: u16) -> StereoBuffer {
    let mut cursor = Cursor::new(bytes);
    let mut samples = Vec::with_capacity(bytes.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample as f32 / 32768.0);
    }

    if channel_count == 1 {
        StereoBuffer {
            right: samples.clone(),
            left: samples,
        }
    } else {
        // Truncate an odd sample count so every frame has both channels.
        let frames = samples.len() / 2;
        let mut left = Vec::with_capacity(frames);
        let mut right = Vec::with_capacity(frames);
        for pair in samples.chunks_exact(2) {
            left.push(pair[0]);
            right.push(pair[1]);
        }
        StereoBuffer { left, right }
    }
}

/// Encode stereo frames back into interleaved little-endian 16-bit PCM.
///
/// Input is clamped to [-1.0, 1.0] before narrowing; without the clamp a
/// gain-boosted signal would wrap around the i16 range.
pub fn encode_chunk(frames: &StereoBuffer) -> Vec<u8> {
    let mut bytes = vec![0u8; frames.frame_count() * 4];
    let mut offset = 0;
    for (l, r) in frames.left.iter().zip(frames.right.iter()) {
        let l = (l.clamp(-1.0, 1.0) * 32767.0) as i16;
        let r = (r.clamp(-1.0, 1.0) * 32767.0) as i16;
        LittleEndian::write_i16(&mut bytes[offset..offset + 2], l);
        LittleEndian::write_i16(&mut bytes[offset + 2..offset + 4], r);
        offset += 4;
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        let mut bytes = vec![0u8; samples.len() * 2];
        LittleEndian::write_i16_into(samples, &mut bytes);
        bytes
    }

    #[test]
    fn test_stereo_decode_pairs_channels() {
        let bytes = pcm_bytes(&[16000, -16000, 8000, -8000]);
        let frames = decode_chunk(&bytes, 2);

        assert_eq!(frames.frame_count(), 2);
        assert!((frames.left[0] - 16000.0 / 32768.0).abs() < 1e-6);
        assert!((frames.right[0] + 16000.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn test_mono_decode_duplicates() {
        let bytes = pcm_bytes(&[1000, 2000, 3000]);
        let frames = decode_chunk(&bytes, 1);

        assert_eq!(frames.frame_count(), 3);
        assert_eq!(frames.left, frames.right);
    }

    #[test]
    fn test_odd_sample_truncated() {
        // 5 samples cannot form stereo frames evenly; the trailing one drops.
        let bytes = pcm_bytes(&[1, 2, 3, 4, 5]);
        let frames = decode_chunk(&bytes, 2);

        assert_eq!(frames.frame_count(), 2);
        assert_eq!(encode_chunk(&frames).len(), 8);
    }

    #[test]
    fn test_roundtrip_length_rounds_down_to_frame_multiple() {
        for len in [0usize, 2, 4, 6, 10] {
            let samples: Vec<i16> = (0..len as i16).collect();
            let bytes = pcm_bytes(&samples);
            let out = encode_chunk(&decode_chunk(&bytes, 2));
            assert_eq!(out.len(), (bytes.len() / 4) * 4);
        }
    }

    #[test]
    fn test_encode_clamps_instead_of_wrapping() {
        let frames = StereoBuffer {
            left: vec![2.5, -3.0],
            right: vec![1.0, -1.0],
        };
        let bytes = encode_chunk(&frames);
        let mut out = [0i16; 4];
        LittleEndian::read_i16_into(&bytes, &mut out);

        assert_eq!(out[0], 32767);
        assert_eq!(out[2], -32767);
    }

    #[test]
    fn test_mono_mix_is_channel_mean() {
        let frames = StereoBuffer {
            left: vec![1.0, 0.0],
            right: vec![0.0, 0.5],
        };
        assert_eq!(frames.mono_mix(), vec![0.5, 0.25]);
    }
}
