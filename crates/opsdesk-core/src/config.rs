use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::ConfigError;
use crate::provider::Provider;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MAX_OPERATIONS: u64 = 500_000;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub ollama_url: Option<String>,
    pub api_base_url: Option<String>,
    pub schema_path: Option<PathBuf>,
    pub max_operations: Option<u64>,
    pub user_id: Option<i64>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::Gemini.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Load the user's config. The first run writes the defaults so there
    /// is a file to edit.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        if !config_path.exists() {
            let config = Self::new();
            if let Err(e) = config.save_to(&config_path) {
                warn!(path = %config_path.display(), error = %e, "Could not write default config");
            }
            return Ok(config);
        }
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn provider(&self) -> Result<Provider, ConfigError> {
        match &self.provider {
            None => Ok(Provider::Gemini),
            Some(name) => {
                Provider::from_str(name).ok_or_else(|| ConfigError::UnknownProvider(name.clone()))
            }
        }
    }

    /// Environment first, then the config file.
    pub fn gemini_api_key(&self) -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.gemini_api_key.clone())
    }

    pub fn api_base_url(&self) -> String {
        std::env::var("OPSDESK_API_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub fn ollama_url(&self) -> String {
        self.ollama_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
    }

    pub fn max_operations(&self) -> u64 {
        self.max_operations.unwrap_or(DEFAULT_MAX_OPERATIONS)
    }

    pub fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;

        Ok(config_dir.join("opsdesk").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.provider.as_deref(), Some("gemini"));
        assert_eq!(config.max_operations(), DEFAULT_MAX_OPERATIONS);
        assert_eq!(config.ollama_url(), DEFAULT_OLLAMA_URL);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.provider = Some("ollama".to_string());
        config.model = Some("qwen2.5-coder".to_string());
        config.user_id = Some(3);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.provider().unwrap(), Provider::Ollama);
        assert_eq!(loaded.model.as_deref(), Some("qwen2.5-coder"));
        assert_eq!(loaded.user_id, Some(3));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let mut config = Config::new();
        config.provider = Some("palm".to_string());
        assert!(matches!(
            config.provider(),
            Err(ConfigError::UnknownProvider(name)) if name == "palm"
        ));
    }

    #[test]
    fn test_corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }
}
