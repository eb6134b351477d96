//! # Configuration Management
//!
//! Layered application configuration:
//! 1. Built-in defaults (the `Default` impl below)
//! 2. `config.toml` in the working directory, when present
//! 3. Environment variables with the `APP_` prefix
//!    (e.g. `APP_SERVER_PORT=9000`), plus bare `HOST`/`PORT` overrides used
//!    by deployment platforms
//!
//! The merged configuration is validated once at startup so a bad value
//! fails the process early instead of a session later.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Defaults for pipelines created before a session sends `init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz assumed for new sessions.
    pub sample_rate: u32,
    /// Channel count assumed for new sessions (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Frames per chunk used for the metering time constant.
    pub frame_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding finalized recordings and in-flight temp streams.
    pub recordings_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            audio: AudioConfig {
                sample_rate: 44100,
                channels: 2,
                frame_size: 1024,
            },
            storage: StorageConfig {
                recordings_dir: "recordings_data".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, then `config.toml`, then `APP_*`
    /// environment variables, with `HOST`/`PORT` handled specially for
    /// deployment platforms that set them bare.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if !(1..=2).contains(&self.audio.channels) {
            return Err(anyhow::anyhow!(
                "Audio channel count must be 1 or 2, got {}",
                self.audio.channels
            ));
        }

        if self.audio.frame_size == 0 {
            return Err(anyhow::anyhow!("Audio frame size must be greater than 0"));
        }

        if self.storage.recordings_dir.is_empty() {
            return Err(anyhow::anyhow!("Recordings directory cannot be empty"));
        }

        Ok(())
    }
}
