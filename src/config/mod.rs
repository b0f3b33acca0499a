//! Scanner Configuration
//!
//! User settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::geometry::Size;
use crate::session::{Continuation, ScanKind};

/// Scanner settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Recognition engine settings
    pub engine: EngineSettings,
    /// Scan behaviour
    pub scan: ScanSettings,
    /// Preview display settings
    pub display: DisplaySettings,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Recognition engine settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Directory holding the engine's resource files
    pub resource_path: Option<PathBuf>,
}

impl EngineSettings {
    /// Resource path to hand to the engine, falling back to the working directory
    pub fn resource_path(&self) -> PathBuf {
        self.resource_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Scan behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Card kind to scan for
    pub kind: ScanKind,
    /// End the session after the first recognized card
    pub stop_after_result: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            kind: ScanKind::Identity,
            stop_after_result: true,
        }
    }
}

impl ScanSettings {
    /// Listener verdict matching `stop_after_result`
    pub fn after_result(&self) -> Continuation {
        if self.stop_after_result {
            Continuation::Stop
        } else {
            Continuation::Continue
        }
    }
}

/// Preview display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Preview width in points
    pub screen_width: f64,
    /// Preview height in points
    pub screen_height: f64,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            screen_width: 390.0,
            screen_height: 844.0,
        }
    }
}

impl DisplaySettings {
    pub fn screen_size(&self) -> Size {
        Size::new(self.screen_width, self.screen_height)
    }
}

/// Get the configuration file path
pub fn default_config_path() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "cardscanner", "CardScanner")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(proj_dirs.config_dir().join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<ScannerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: ScannerConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Load configuration, using defaults if the file does not exist
pub fn load_or_default(path: &Path) -> Result<ScannerConfig> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(ScannerConfig::default())
    }
}

/// Save configuration to file
pub fn save_config(config: &ScannerConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
