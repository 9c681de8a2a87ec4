use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::ConfigError;

/// Smallest ring buffer the decode loop accepts, in sample frames
pub const MIN_RING_BUFFER_FRAMES: usize = 4096;

/// Engine tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the decoded-sample ring buffer, in sample frames
    pub ring_buffer_frames: usize,
    /// How far into the file the first frame header may be
    pub probe_window_bytes: usize,
    /// Search window for the second header of a free-format stream
    pub free_format_window_bytes: usize,
    /// Candidate headers examined before free format is rejected
    pub free_format_candidates: usize,
    /// Search window for the first audio frame after a VBR index frame
    pub resync_window_bytes: usize,
    pub build_seek_index: bool,
    pub gapless: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ring_buffer_frames: 16384,
            probe_window_bytes: 0x10_0000,
            free_format_window_bytes: 0x2_0000,
            free_format_candidates: 8,
            resync_window_bytes: 0x2_0000,
            build_seek_index: true,
            gapless: true,
        }
    }
}

impl EngineConfig {
    /// Copy with out-of-range values pulled back to usable ones
    pub fn validated(&self) -> Self {
        let mut config = self.clone();
        config.ring_buffer_frames = config.ring_buffer_frames.max(MIN_RING_BUFFER_FRAMES);
        config.free_format_candidates = config.free_format_candidates.max(1);
        config
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: EngineConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        let config = Self::load_config(&config_path).unwrap_or_default();

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Use an explicit configuration file instead of the per-user one
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let config = Self::load_config(&config_path)?;

        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn get_config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut EngineConfig),
    {
        updater(&mut self.config);
        self.save_config()
    }

    pub fn set_ring_buffer_frames(&mut self, frames: usize) -> Result<(), ConfigError> {
        self.config.ring_buffer_frames = frames.max(MIN_RING_BUFFER_FRAMES);
        self.save_config()
    }

    pub fn set_gapless_enabled(&mut self, enabled: bool) -> Result<(), ConfigError> {
        self.config.gapless = enabled;
        self.save_config()
    }

    pub fn set_seek_index_enabled(&mut self, enabled: bool) -> Result<(), ConfigError> {
        self.config.build_seek_index = enabled;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = EngineConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("mpeg-engine");

        std::fs::create_dir_all(&config_dir)
            .map_err(ConfigError::IoError)?;

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
        if !path.exists() {
            return Ok(EngineConfig::default());
        }

        let config_content = std::fs::read_to_string(path)
            .map_err(ConfigError::IoError)?;

        let config: EngineConfig = toml::from_str(&config_content)
            .map_err(ConfigError::DeserializationError)?;

        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(ConfigError::IoError)?;
        }

        let config_content = toml::to_string_pretty(&self.config)
            .map_err(ConfigError::SerializationError)?;

        std::fs::write(&self.config_path, config_content)
            .map_err(ConfigError::IoError)?;

        Ok(())
    }
}
