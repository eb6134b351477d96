//! # WebSocket Audio Session Protocol
//!
//! One WebSocket connection is one audio session. Clients connect to
//! `/ws/audio?session_id=<id>` and interleave two kinds of frames on the
//! same socket:
//!
//! - **Binary**: raw little-endian 16-bit PCM chunks. Each chunk runs
//!   through the session's pipeline and produces one metering reply; while a
//!   capture is active the processed bytes also append to the capture sink.
//! - **Text**: JSON commands tagged by `action` — `init`, `start_record`,
//!   `stop_record`, `set_params`.
//!
//! ## Protocol States:
//! `AWAITING_SESSION_ID → ACTIVE → CLOSED`. A connection without a
//! non-empty `session_id` query parameter is refused with close code 4000
//! before becoming active. Disconnecting finalizes any in-flight capture and
//! purges every recording the session created.
//!
//! The actor processes exactly one message at a time, so chunk ordering is
//! FIFO per session and the pipeline's filter/smoothing continuity holds.

use crate::audio::pipeline::AudioPipeline;
use crate::capture::{CaptureSettings, CaptureSink};
use crate::catalog::CaptureRecord;
use crate::error::AppResult;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Close code sent when a connection arrives without a session id.
const MISSING_SESSION_CLOSE_CODE: u16 = 4000;

fn default_sample_rate() -> u32 {
    44100
}

fn default_channels() -> u16 {
    2
}

fn default_integration_time() -> f32 {
    0.5
}

fn default_cutoff_freq() -> f32 {
    1000.0
}

/// Client commands, decoded once from the text frame's `action` tag.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    /// Rebuild the pipeline from scratch for a new stream format.
    Init {
        #[serde(default = "default_sample_rate")]
        sample_rate: u32,
        #[serde(default = "default_channels")]
        channels: u16,
    },

    /// Open a capture with the given (or current) stream format.
    StartRecord {
        sample_rate: Option<u32>,
        channels: Option<u16>,
    },

    /// Finalize the capture and persist a catalog record.
    StopRecord,

    /// Update DSP and metering parameters in place. Every field carries the
    /// stream defaults, so partial updates quietly reset omitted parameters.
    SetParams {
        #[serde(default)]
        gain: f32,
        #[serde(default)]
        filter_enabled: bool,
        #[serde(default = "default_cutoff_freq")]
        cutoff_freq: f32,
        #[serde(default = "default_integration_time")]
        integration_time: f32,
    },
}

/// Events sent back to the client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Per-chunk metering feedback.
    Meter {
        rms: f32,
        spectrum: Vec<f32>,
        panning: f32,
    },

    /// A `stop_record` finalized successfully.
    RecordingSaved { id: i64, filename: String },
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

/// Actor owning one session's pipeline and capture sink.
pub struct AudioSocket {
    /// None when the client never supplied a (non-empty) session id; such a
    /// connection is refused in `started` and processes nothing.
    session_id: Option<String>,
    state: web::Data<AppState>,
    pipeline: AudioPipeline,
    recorder: CaptureSink,
    /// Configured frames-per-chunk, reused when `init` rebuilds the pipeline.
    frame_size: usize,
}

impl AudioSocket {
    pub fn new(session_id: Option<String>, state: web::Data<AppState>) -> Self {
        let config = state.get_config();
        Self {
            session_id: session_id.filter(|id| !id.is_empty()),
            pipeline: AudioPipeline::with_frame_size(
                config.audio.sample_rate,
                config.audio.channels,
                config.audio.frame_size,
            ),
            recorder: CaptureSink::new(&config.storage.recordings_dir),
            frame_size: config.audio.frame_size,
            state,
        }
    }

    /// Run one audio chunk through the pipeline, feed the capture sink when
    /// recording, and return the metering reply.
    fn process_chunk(&mut self, data: &[u8]) -> AppResult<String> {
        let (processed, meters) = self.pipeline.process_chunk(data);

        if self.recorder.is_recording() {
            self.recorder.write(&processed)?;
        }

        let event = ServerEvent::Meter {
            rms: meters.rms_db,
            spectrum: meters.spectrum,
            panning: meters.panning,
        };
        Ok(serde_json::to_string(&event)?)
    }

    /// Apply one command and return any replies to send. Malformed or
    /// unknown commands are logged and ignored; they never end the session.
    fn handle_command(&mut self, text: &str) -> Vec<String> {
        match serde_json::from_str::<Command>(text) {
            Ok(Command::Init {
                sample_rate,
                channels,
            }) => {
                // Wholesale replacement: fresh filter, smoothing and FFT
                // state, exactly as if the connection had just begun.
                self.pipeline =
                    AudioPipeline::with_frame_size(sample_rate, channels, self.frame_size);
                info!(sample_rate, channels, "Pipeline initialized");
                Vec::new()
            }

            Ok(Command::StartRecord {
                sample_rate,
                channels,
            }) => {
                let sample_rate = sample_rate.unwrap_or_else(|| self.pipeline.sample_rate());
                let channels = channels.unwrap_or_else(|| self.pipeline.channels());
                let settings = CaptureSettings {
                    gain: self.pipeline.gain_db(),
                    cutoff: self.pipeline.cutoff_hz(),
                    filter: self.pipeline.filter_enabled(),
                };
                let session_id = self.session_id.clone().unwrap_or_default();

                self.recorder.start(settings, &session_id, sample_rate, channels);
                info!(session_id = %session_id, sample_rate, channels, "Recording started");
                Vec::new()
            }

            Ok(Command::StopRecord) => match self.finalize_capture() {
                Ok(Some(record)) => {
                    info!(filename = %record.filename, id = record.id, "Recording saved");
                    let event = ServerEvent::RecordingSaved {
                        id: record.id,
                        filename: record.filename,
                    };
                    match serde_json::to_string(&event) {
                        Ok(json) => vec![json],
                        Err(err) => {
                            error!(error = %err, "Failed to serialize recording_saved event");
                            Vec::new()
                        }
                    }
                }
                Ok(None) => Vec::new(),
                Err(err) => {
                    error!(error = %err, "Failed to finalize recording");
                    Vec::new()
                }
            },

            Ok(Command::SetParams {
                gain,
                filter_enabled,
                cutoff_freq,
                integration_time,
            }) => {
                self.pipeline
                    .update_settings(gain, filter_enabled, Some(cutoff_freq), integration_time);
                debug!(gain, filter_enabled, cutoff_freq, integration_time, "Parameters updated");
                Vec::new()
            }

            Err(err) => {
                warn!(error = %err, "Ignoring malformed command");
                Vec::new()
            }
        }
    }

    /// Stop the capture sink and, when it produced a file, register it in
    /// the catalog.
    fn finalize_capture(&mut self) -> std::io::Result<Option<CaptureRecord>> {
        Ok(self
            .recorder
            .stop()?
            .map(|finished| self.state.catalog.create(finished)))
    }

    /// Session-end cleanup: finalize an in-flight capture (no reply, the
    /// peer is gone) and purge every recording this session created, both
    /// catalog entries and backing files. Filesystem failures are logged and
    /// the purge continues.
    fn disconnect_cleanup(&mut self) {
        let Some(session_id) = self.session_id.clone() else {
            return;
        };

        if self.recorder.is_recording() {
            if let Err(err) = self.finalize_capture() {
                error!(error = %err, "Failed to finalize capture on disconnect");
            }
        }

        let recordings_dir = PathBuf::from(self.state.get_config().storage.recordings_dir);
        let records = self.state.catalog.session_records(&session_id);
        info!(
            session_id = %session_id,
            count = records.len(),
            "Purging session recordings"
        );

        for record in records {
            let path = recordings_dir.join(&record.filename);
            if path.exists() {
                if let Err(err) = std::fs::remove_file(&path) {
                    error!(
                        filename = %record.filename,
                        error = %err,
                        "Failed to delete recording file"
                    );
                }
            }
            self.state.catalog.delete(&record.filename);
        }

        self.state.decrement_active_sessions();
    }
}

impl Actor for AudioSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        match &self.session_id {
            Some(session_id) => {
                info!(session_id = %session_id, "WebSocket session connected");
                self.state.increment_active_sessions();
            }
            None => {
                warn!("WebSocket connection without session_id, refusing");
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Other(MISSING_SESSION_CLOSE_CODE),
                    description: Some("session_id is required".to_string()),
                }));
                ctx.stop();
            }
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(session_id) = &self.session_id {
            info!(session_id = %session_id, "WebSocket session disconnected");
        }
        self.disconnect_cleanup();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for AudioSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        // A refused connection (no session id) processes nothing while its
        // close completes.
        if self.session_id.is_none() {
            return;
        }

        match msg {
            Ok(ws::Message::Binary(data)) => match self.process_chunk(&data) {
                Ok(reply) => ctx.text(reply),
                Err(err) => {
                    error!(error = %err, "Audio pipeline failure, closing session");
                    ctx.close(None);
                    ctx.stop();
                }
            },
            Ok(ws::Message::Text(text)) => {
                for reply in self.handle_command(&text) {
                    ctx.text(reply);
                }
            }
            Ok(ws::Message::Ping(payload)) => {
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!(?reason, "WebSocket closed by peer");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// HTTP entry point upgrading to the session protocol.
pub async fn audio_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<SessionQuery>,
) -> ActixResult<HttpResponse> {
    ws::start(
        AudioSocket::new(query.into_inner().session_id, state),
        &req,
        stream,
    )
}
