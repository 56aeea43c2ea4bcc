//! Configuration management for PeerLens
//!
//! Provides configuration loading, saving, and validation for connection
//! parameters, sampling thresholds, and logging.

use crate::errors::PeerLensError;
use crate::peer::transport::IceServer;
use crate::sampler::SamplerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerLensConfig {
    pub connection: ConnectionConfig,
    pub sampler: SamplerConfig,
    pub logging: LoggingConfig,
}

/// Peer connection and ICE configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// STUN server used for candidate discovery
    pub stun_server: String,
    /// Optional TURN relays offered alongside STUN
    pub turn_servers: Vec<IceServer>,
    /// Milliseconds allowed per negotiation step before the attempt aborts
    pub negotiation_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            stun_server: "stun:stun.l.google.com:19302".to_string(),
            turn_servers: Vec::new(),
            negotiation_timeout_ms: 10_000,
        }
    }
}

impl ConnectionConfig {
    /// Full ICE server list: the STUN server followed by any TURN relays.
    pub fn ice_servers(&self) -> Vec<IceServer> {
        let mut servers = vec![IceServer::stun(self.stun_server.clone())];
        servers.extend(self.turn_servers.iter().cloned());
        servers
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level applied when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PeerLensConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, PeerLensError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            PeerLensError::configuration(format!("failed to read config file: {}", e))
        })?;

        let config: PeerLensConfig = toml::from_str(&contents).map_err(|e| {
            PeerLensError::configuration(format!("failed to parse config file: {}", e))
        })?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), PeerLensError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PeerLensError::configuration(format!("failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            PeerLensError::configuration(format!("failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            PeerLensError::configuration(format!("failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("peerlens.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.connection.stun_server.trim().is_empty() {
            return Err("STUN server must not be empty".to_string());
        }
        if self.connection.negotiation_timeout_ms == 0 {
            return Err("Negotiation timeout must be positive".to_string());
        }

        if self.sampler.tick_interval_ms == 0 {
            return Err("Tick interval must be positive".to_string());
        }
        if self.sampler.video_interval_ms < self.sampler.tick_interval_ms {
            return Err("Video checkpoint interval must be at least one tick".to_string());
        }
        if !(0.0..=255.0).contains(&self.sampler.audio_threshold) {
            return Err("Audio threshold must be between 0 and 255".to_string());
        }
        if !(0.0..=255.0).contains(&self.sampler.video_threshold) {
            return Err("Video threshold must be between 0 and 255".to_string());
        }

        Ok(())
    }
}
