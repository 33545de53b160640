use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::services::converter::unit::BRIDGE_CURRENCY;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub currency: CurrencyConfig,
    pub crypto: CryptoConfig,
    pub favorites: FavoritesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Currency that mixed money expressions are shown in
    pub display_currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyConfig {
    pub enabled: bool,
    pub refresh_interval_secs: u64,
    pub stale_after_secs: u64,
    /// Fiat rate sources, tried in order
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    pub enabled: bool,
    pub refresh_interval_secs: u64,
    pub stale_after_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FavoritesConfig {
    pub path: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            display_currency: BRIDGE_CURRENCY.to_string(),
        }
    }
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval_secs: 3600,
            stale_after_secs: 172_800,
            sources: vec!["er-api".to_string(), "ecb".to_string()],
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval_secs: 60,
            stale_after_secs: 3600,
        }
    }
}

impl CurrencyConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl CryptoConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
            })
            .join("nova")
            .join("converter.toml")
    }

    /// Load config from the default path, or return defaults if not found
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`. Problems are logged and yield defaults.
    pub fn load_from(path: &Path) -> Self {
        let mut config = if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => config,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to parse config");
                        Self::default()
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read config");
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        config.validate();
        config
    }

    /// Validate and clamp config values to acceptable ranges
    fn validate(&mut self) {
        self.general.display_currency = self.general.display_currency.trim().to_uppercase();
        if self.general.display_currency.is_empty() {
            self.general.display_currency = BRIDGE_CURRENCY.to_string();
        }
        self.currency.refresh_interval_secs = self.currency.refresh_interval_secs.clamp(60, 86_400);
        self.crypto.refresh_interval_secs = self.crypto.refresh_interval_secs.clamp(30, 3600);
        self.currency.stale_after_secs = self
            .currency
            .stale_after_secs
            .max(self.currency.refresh_interval_secs);
        self.crypto.stale_after_secs = self
            .crypto
            .stale_after_secs
            .max(self.crypto.refresh_interval_secs);
        self.currency.sources.retain(|s| !s.trim().is_empty());
        if self.currency.sources.is_empty() {
            self.currency.sources = CurrencyConfig::default().sources;
        }
    }

    /// Where favorites are stored
    pub fn favorites_path(&self) -> PathBuf {
        self.favorites
            .path
            .clone()
            .unwrap_or_else(crate::services::favorites::default_path)
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))?;

        Ok(())
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::config_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml"));
        assert_eq!(config.general.display_currency, "USD");
        assert_eq!(config.currency.sources, vec!["er-api", "ecb"]);
        assert_eq!(config.crypto.refresh_interval_secs, 60);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("converter.toml");
        fs::write(&path, "[general]\ndisplay_currency = \"eur\"\n").unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.general.display_currency, "EUR");
        assert!(config.currency.enabled);
        assert_eq!(config.currency.refresh_interval_secs, 3600);
    }

    #[test]
    fn test_invalid_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("converter.toml");
        fs::write(&path, "[currency\nenabled = ").unwrap();

        let config = Config::load_from(&path);
        assert!(config.currency.enabled);
        assert_eq!(config.general.display_currency, "USD");
    }

    #[test]
    fn test_validate_clamps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("converter.toml");
        fs::write(
            &path,
            "[currency]\nrefresh_interval_secs = 5\nsources = []\n\n[crypto]\nrefresh_interval_secs = 99999\nstale_after_secs = 10\n",
        )
        .unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.currency.refresh_interval_secs, 60);
        assert_eq!(config.currency.sources, vec!["er-api", "ecb"]);
        assert_eq!(config.crypto.refresh_interval_secs, 3600);
        assert_eq!(config.crypto.stale_after_secs, 3600);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("converter.toml");

        let mut config = Config::default();
        config.general.display_currency = "GBP".to_string();
        config.crypto.enabled = false;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded.general.display_currency, "GBP");
        assert!(!loaded.crypto.enabled);
    }
}
