//! Configuration file support for the lift tools.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/lift/config.toml`.

use crate::{Error, Result, Rounding, RoundingDirection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub user: UserConfig,

    #[serde(default)]
    pub rounding: RoundingConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Which user the CLI acts for
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default = "default_user_id")]
    pub id: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: default_user_id(),
        }
    }
}

/// Fallback plate rounding for sets whose prescription carries none
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundingConfig {
    #[serde(default = "default_increment")]
    pub increment: f64,

    #[serde(default)]
    pub direction: RoundingDirection,
}

impl Default for RoundingConfig {
    fn default() -> Self {
        Self {
            increment: default_increment(),
            direction: RoundingDirection::default(),
        }
    }
}

impl RoundingConfig {
    pub fn to_rounding(&self) -> Result<Rounding> {
        if !(self.increment.is_finite() && self.increment > 0.0) {
            return Err(Error::Config(format!(
                "rounding.increment must be positive, got {}",
                self.increment
            )));
        }
        Ok(Rounding {
            increment: self.increment,
            direction: self.direction,
        })
    }
}

/// Program catalog location
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    /// Defaults to `<data_dir>/programs` when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("lift")
}

fn default_user_id() -> String {
    "default".into()
}

fn default_increment() -> f64 {
    2.5
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("lift").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Directory holding program TOML files
    pub fn catalog_dir(&self) -> PathBuf {
        self.catalog
            .dir
            .clone()
            .unwrap_or_else(|| self.data.data_dir.join("programs"))
    }

    /// Path of the JSON state document
    pub fn state_path(&self) -> PathBuf {
        self.data.data_dir.join("state.json")
    }
}
