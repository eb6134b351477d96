//! # Capture Sink
//!
//! Persists the processed audio stream of one session. While a capture is
//! active, processed chunks append to a `.raw` temporary file that opens
//! lazily on the first write; stopping reads the raw bytes back, encodes a
//! playable 16-bit WAV next to it, deletes the temporary, and hands the
//! finished recording's metadata to the caller for cataloguing.
//!
//! ## Lifecycle:
//! `IDLE → CAPTURING → IDLE`. Starting while already capturing resets the
//! in-flight state; stopping while idle (or before any chunk was written)
//! yields nothing and creates no record.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Process-wide capture sequence number. Concurrent sessions can start
/// captures within the same clock second, so the timestamp alone does not
/// make a filename unique.
static CAPTURE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// DSP settings snapshot stored with a recording, taken at capture start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub gain: f32,
    pub cutoff: f32,
    pub filter: bool,
}

/// Everything known about a finished capture, ready for the catalog.
#[derive(Debug, Clone)]
pub struct FinishedCapture {
    pub filename: String,
    pub duration_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub settings: CaptureSettings,
    pub session_id: String,
    pub channels: u16,
    pub sample_rate: u32,
}

/// State held only while a capture is running.
struct ActiveCapture {
    settings: CaptureSettings,
    session_id: String,
    sample_rate: u32,
    channels: u16,
    started_at: DateTime<Utc>,
    filename: String,
    raw_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

/// Per-session capture sink. The owning session loop serializes all access,
/// so the sink itself carries no locking.
pub struct CaptureSink {
    recordings_dir: PathBuf,
    active: Option<ActiveCapture>,
}

impl CaptureSink {
    pub fn new(recordings_dir: impl AsRef<Path>) -> Self {
        Self {
            recordings_dir: recordings_dir.as_ref().to_path_buf(),
            active: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Begin a new capture, discarding any in-flight one. The filename is
    /// derived from the UTC start timestamp.
    pub fn start(
        &mut self,
        settings: CaptureSettings,
        session_id: &str,
        sample_rate: u32,
        channels: u16,
    ) {
        // Starting over discards any in-flight capture's buffered state.
        if let Some(previous) = self.active.take() {
            drop(previous.writer);
            if previous.raw_path.exists() {
                let _ = std::fs::remove_file(&previous.raw_path);
            }
            debug!(session_id = %previous.session_id, "Discarded in-flight capture");
        }

        let started_at = Utc::now();
        let stamp = format!(
            "{}_{}",
            started_at.format("%Y%m%d_%H%M%S"),
            CAPTURE_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        );
        let filename = format!("rec_{}.wav", stamp);
        let raw_path = self.recordings_dir.join(format!("rec_{}.raw", stamp));

        info!(
            session_id,
            filename = %filename,
            sample_rate,
            channels,
            "Capture started"
        );

        self.active = Some(ActiveCapture {
            settings,
            session_id: session_id.to_string(),
            sample_rate,
            channels,
            started_at,
            filename,
            raw_path,
            writer: None,
        });
    }

    /// Append processed bytes to the capture stream. A no-op while idle.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        if active.writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&active.raw_path)?;
            active.writer = Some(BufWriter::new(file));
        }

        if let Some(writer) = active.writer.as_mut() {
            writer.write_all(bytes)?;
        }
        Ok(())
    }

    /// Finalize the capture into a WAV file. Returns `None` when idle or
    /// when no chunk was ever written. Always leaves the sink idle.
    pub fn stop(&mut self) -> io::Result<Option<FinishedCapture>> {
        let Some(mut active) = self.active.take() else {
            return Ok(None);
        };

        if let Some(mut writer) = active.writer.take() {
            writer.flush()?;
        }

        // Zero chunks written: the temp file never materialized.
        if !active.raw_path.exists() {
            debug!(session_id = %active.session_id, "Capture stopped with no audio");
            return Ok(None);
        }

        let pcm = std::fs::read(&active.raw_path)?;
        std::fs::remove_file(&active.raw_path)?;

        let mut samples = vec![0i16; pcm.len() / 2];
        LittleEndian::read_i16_into(&pcm[..samples.len() * 2], &mut samples);

        let header = wav::Header::new(
            wav::header::WAV_FORMAT_PCM,
            active.channels,
            active.sample_rate,
            16,
        );
        let mut out = File::create(self.recordings_dir.join(&active.filename))?;
        wav::write(header, &wav::BitDepth::Sixteen(samples), &mut out)?;

        // 2 bytes per sample times the channel count per frame.
        let duration_seconds =
            pcm.len() as f64 / (2.0 * active.channels as f64 * active.sample_rate as f64);

        info!(
            session_id = %active.session_id,
            filename = %active.filename,
            duration_seconds,
            "Capture finalized"
        );

        Ok(Some(FinishedCapture {
            filename: active.filename,
            duration_seconds,
            started_at: active.started_at,
            settings: active.settings,
            session_id: active.session_id,
            channels: active.channels,
            sample_rate: active.sample_rate,
        }))
    }
}
