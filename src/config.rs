use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default model file name inside the models directory
pub const MODEL_FILENAME: &str = "SER_model.safetensors";

/// Directory that held the model before it moved under `models/`
pub const LEGACY_MODEL_DIR: &str = "Deep Learning";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to get home directory")]
    NoHomeDir,

    #[error("Model not found at {primary:?} or {legacy:?}")]
    ModelNotFound { primary: PathBuf, legacy: PathBuf },
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: u32,

    /// Root that relative paths below are resolved against
    pub base_dir: PathBuf,
    pub models_dir: PathBuf,
    pub examples_dir: PathBuf,

    /// Explicit model file, bypasses primary/legacy lookup
    pub model_path: Option<PathBuf>,

    // HTTP interface
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            base_dir: PathBuf::from("."),
            models_dir: PathBuf::from("models"),
            examples_dir: PathBuf::from("data").join("examples"),
            model_path: None,
            host: "127.0.0.1".to_string(),
            port: 8501,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load config from file, or create default
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        std::fs::write(path, content).map_err(write_err)
    }

    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".ser"))
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::default_config_dir()?.join("config.json"))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Primary model location
    pub fn primary_model_path(&self) -> PathBuf {
        self.resolve(&self.models_dir.join(MODEL_FILENAME))
    }

    /// Legacy model location, checked when the primary one is absent
    pub fn legacy_model_path(&self) -> PathBuf {
        self.resolve(&Path::new(LEGACY_MODEL_DIR).join(MODEL_FILENAME))
    }

    /// Directory with the bundled example clips
    pub fn examples_path(&self) -> PathBuf {
        self.resolve(&self.examples_dir)
    }

    /// Get the model file path
    ///
    /// An explicit `model_path` is returned as-is (existence is checked by the
    /// loader); otherwise the primary location wins over the legacy one.
    pub fn get_model_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.model_path {
            return Ok(self.resolve(path));
        }

        let primary = self.primary_model_path();
        if primary.exists() {
            return Ok(primary);
        }

        let legacy = self.legacy_model_path();
        if legacy.exists() {
            return Ok(legacy);
        }

        Err(ConfigError::ModelNotFound { primary, legacy })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.port, 8501);
        assert!(config.model_path.is_none());
        assert_eq!(
            config.primary_model_path(),
            Path::new(".").join("models").join(MODEL_FILENAME)
        );
    }

    #[test]
    fn test_missing_config_file_gives_default() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_save_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            port: 9000,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap().port, 9000);

        // Missing keys fall back to defaults
        std::fs::write(&path, r#"{"host": "0.0.0.0"}"#).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.host, "0.0.0.0");
        assert_eq!(loaded.port, 8501);
    }

    #[test]
    fn test_invalid_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_model_path_primary_then_legacy() {
        let dir = tempdir().unwrap();
        let config = Config {
            base_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        assert!(matches!(
            config.get_model_path(),
            Err(ConfigError::ModelNotFound { .. })
        ));

        let legacy = config.legacy_model_path();
        std::fs::create_dir_all(legacy.parent().unwrap()).unwrap();
        std::fs::write(&legacy, b"x").unwrap();
        assert_eq!(config.get_model_path().unwrap(), legacy);

        let primary = config.primary_model_path();
        std::fs::create_dir_all(primary.parent().unwrap()).unwrap();
        std::fs::write(&primary, b"x").unwrap();
        assert_eq!(config.get_model_path().unwrap(), primary);
    }

    #[test]
    fn test_explicit_model_path_wins() {
        let config = Config {
            base_dir: PathBuf::from("/srv/ser"),
            model_path: Some(PathBuf::from("custom.safetensors")),
            ..Default::default()
        };
        assert_eq!(
            config.get_model_path().unwrap(),
            PathBuf::from("/srv/ser/custom.safetensors")
        );
    }
}
