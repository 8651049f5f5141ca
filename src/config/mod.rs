use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::selection::HardwareKind;
use crate::error::ConfigError;

/// Decoder configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecoderConfig {
    /// Maximum number of decoded frames held ahead of the consumer
    pub buffer_capacity: usize,
    /// Sleep while the frame buffer is full, in milliseconds
    pub active_poll_ms: u64,
    /// Sleep while parked at end of stream, in milliseconds
    pub idle_poll_ms: u64,
    /// Read buffer used between the byte source and the demuxer
    pub io_buffer_size: usize,
    /// Restart from the beginning instead of stopping at end of stream
    pub looping: bool,
    /// Allow hardware-accelerated decoder implementations
    pub hardware_decoding: bool,
    /// Hardware device kinds that may be used when hardware decoding is allowed
    pub hardware_targets: Vec<HardwareKind>,
    /// Distance from the expected position after which a reader resynchronises
    pub seek_lenience_ms: f64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 5,
            active_poll_ms: 1,
            idle_poll_ms: 50,
            io_buffer_size: 4096,
            looping: false,
            hardware_decoding: false,
            hardware_targets: HardwareKind::ALL.to_vec(),
            seek_lenience_ms: 2500.0,
        }
    }
}

impl DecoderConfig {
    pub fn active_poll(&self) -> Duration {
        Duration::from_millis(self.active_poll_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Reject values the decode loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid("buffer_capacity must be at least 1".to_string()));
        }
        if self.active_poll_ms == 0 || self.idle_poll_ms == 0 {
            return Err(ConfigError::Invalid("poll intervals must be at least 1ms".to_string()));
        }
        if self.io_buffer_size == 0 {
            return Err(ConfigError::Invalid("io_buffer_size must be at least 1".to_string()));
        }
        if !self.seek_lenience_ms.is_finite() || self.seek_lenience_ms < 0.0 {
            return Err(ConfigError::Invalid("seek_lenience_ms must be a non-negative number".to_string()));
        }
        Ok(())
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: DecoderConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load from the default location under the user's config directory
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    /// Load from an explicit file; a missing file yields defaults
    pub fn with_path(config_path: PathBuf) -> Result<Self, ConfigError> {
        let config = Self::load_config(&config_path)?;
        config.validate()?;

        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn get_config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut DecoderConfig),
    {
        let mut updated = self.config.clone();
        updater(&mut updated);
        updated.validate()?;
        self.config = updated;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = DecoderConfig::default();
        self.save_config()
    }

    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("stream-decoder");

        Ok(config_dir.join("config.toml"))
    }

    pub fn load_config(path: &Path) -> Result<DecoderConfig, ConfigError> {
        if !path.exists() {
            return Ok(DecoderConfig::default());
        }

        let config_content = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;

        let config: DecoderConfig =
            toml::from_str(&config_content).map_err(ConfigError::DeserializationError)?;

        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::IoError)?;
        }

        let config_content =
            toml::to_string_pretty(&self.config).map_err(ConfigError::SerializationError)?;

        std::fs::write(&self.config_path, config_content).map_err(ConfigError::IoError)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config_manager = ConfigManager {
            config: DecoderConfig::default(),
            config_path,
        };

        (config_manager, temp_dir)
    }

    #[test]
    fn test_decoder_config_default() {
        let config = DecoderConfig::default();

        assert_eq!(config.buffer_capacity, 5);
        assert_eq!(config.active_poll(), Duration::from_millis(1));
        assert_eq!(config.idle_poll(), Duration::from_millis(50));
        assert_eq!(config.io_buffer_size, 4096);
        assert!(!config.looping);
        assert!(!config.hardware_decoding);
        assert_eq!(config.hardware_targets.len(), HardwareKind::ALL.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = DecoderConfig {
            buffer_capacity: 8,
            looping: true,
            hardware_decoding: true,
            hardware_targets: vec![HardwareKind::Vaapi, HardwareKind::Cuda],
            ..DecoderConfig::default()
        };

        let serialized = toml::to_string(&config).unwrap();
        let deserialized: DecoderConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(config, deserialized);
        assert!(serialized.contains("vaapi"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: DecoderConfig = toml::from_str("looping = true\n").unwrap();

        assert!(config.looping);
        assert_eq!(config.buffer_capacity, 5);
        assert_eq!(config.idle_poll_ms, 50);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = DecoderConfig {
            buffer_capacity: 0,
            ..DecoderConfig::default()
        };

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_save_and_load_config() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.config.buffer_capacity = 3;
        config_manager.config.looping = true;
        config_manager.save_config().unwrap();

        let loaded_config = ConfigManager::load_config(&config_manager.config_path).unwrap();

        assert_eq!(loaded_config.buffer_capacity, 3);
        assert!(loaded_config.looping);
    }

    #[test]
    fn test_load_nonexistent_config() {
        let temp_dir = TempDir::new().unwrap();
        let nonexistent_path = temp_dir.path().join("nonexistent.toml");

        let config = ConfigManager::load_config(&nonexistent_path).unwrap();

        assert_eq!(config, DecoderConfig::default());
    }

    #[test]
    fn test_load_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");

        fs::write(&config_path, "invalid toml content [[[").unwrap();

        let result = ConfigManager::load_config(&config_path);

        match result {
            Err(ConfigError::DeserializationError(_)) => {}
            _ => panic!("Expected DeserializationError"),
        }
    }

    #[test]
    fn test_with_path_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "io_buffer_size = 0\n").unwrap();

        assert!(matches!(
            ConfigManager::with_path(config_path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_update_config() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager
            .update_config(|config| {
                config.hardware_decoding = true;
                config.idle_poll_ms = 20;
            })
            .unwrap();

        assert!(config_manager.config.hardware_decoding);

        let loaded_config = ConfigManager::load_config(&config_manager.config_path).unwrap();
        assert!(loaded_config.hardware_decoding);
        assert_eq!(loaded_config.idle_poll_ms, 20);
    }

    #[test]
    fn test_update_config_keeps_previous_on_invalid() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        let result = config_manager.update_config(|config| config.active_poll_ms = 0);

        assert!(result.is_err());
        assert_eq!(config_manager.config.active_poll_ms, 1);
    }

    #[test]
    fn test_reset_to_defaults() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.config.buffer_capacity = 9;
        config_manager.reset_to_defaults().unwrap();

        assert_eq!(config_manager.config, DecoderConfig::default());
    }

    #[test]
    fn test_config_path_creation() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("nested").join("config").join("config.toml");

        let config_manager = ConfigManager {
            config: DecoderConfig::default(),
            config_path: nested_path.clone(),
        };

        config_manager.save_config().unwrap();

        assert!(nested_path.exists());
    }
}
