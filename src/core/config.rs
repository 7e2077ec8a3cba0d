use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Model used when neither the environment nor the config file names one.
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

/// Startup configuration failures. These are the only process-fatal
/// errors; everything after startup renders into the transcript instead.
#[derive(Debug)]
pub enum ConfigError {
    MissingApiKey,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingApiKey => {
                write!(f, "ANTHROPIC_API_KEY environment variable not set")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Optional on-disk configuration. An absent file is the default config,
/// not an error.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    pub default_model: Option<String>,
}

impl ConfigFile {
    pub fn load() -> ConfigFile {
        match config_path() {
            Some(path) => Self::load_from_path(&path).unwrap_or_default(),
            None => ConfigFile::default(),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<ConfigFile, Box<dyn std::error::Error>> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            let config: ConfigFile = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(ConfigFile::default())
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

/// Resolved runtime configuration consumed by the core.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
}

impl Config {
    /// Load configuration from the environment, falling back to the
    /// config file for the model choice. A missing API key is fatal.
    pub fn load() -> Result<Config, ConfigError> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let file = ConfigFile::load();
        let model = env::var("CLAUDE_MODEL")
            .ok()
            .filter(|model| !model.is_empty())
            .or(file.default_model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Config { api_key, model })
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "permacommons", "valet")
}

fn config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of a provider credential file under the config directory.
/// Credential acquisition itself belongs to the providers.
pub fn credential_path(file_name: &str) -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = ConfigFile::load_from_path(&path).unwrap();
        assert!(config.default_model.is_none());
    }

    #[test]
    fn config_file_round_trips_default_model() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = ConfigFile {
            default_model: Some("claude-3-opus-20240229".to_string()),
        };
        config.save_to_path(&path).unwrap();

        let loaded = ConfigFile::load_from_path(&path).unwrap();
        assert_eq!(
            loaded.default_model.as_deref(),
            Some("claude-3-opus-20240229")
        );
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "default_model = [not toml").unwrap();
        assert!(ConfigFile::load_from_path(&path).is_err());
    }
}
