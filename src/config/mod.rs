//! Viewer preferences stored in a `viewer.toml` file.
//!
//! Every field is optional in the file; missing fields take the values in
//! [`defaults`]. A file that is not valid TOML yields the defaults as well.
//!
//! # Examples
//!
//! ```no_run
//! use dicom_viewport::config::{self, ViewerConfig};
//! use dicom_viewport::layout::LayoutId;
//!
//! let mut config = config::load().unwrap_or_default();
//! config.default_layout = LayoutId::Mixed;
//! config::save(&config).expect("Failed to save config");
//! ```

pub mod defaults;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enums::SortBy;
use crate::error::Result;
use crate::layout::LayoutId;
use crate::tools::Tool;

const CONFIG_FILE: &str = "viewer.toml";
const APP_NAME: &str = "dicom-viewport";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub default_layout: LayoutId,
    pub default_tool: Tool,
    pub frame_interval_ms: u64,
    pub sort_by: SortBy,
    pub volume_preset: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            default_layout: defaults::DEFAULT_LAYOUT,
            default_tool: defaults::DEFAULT_TOOL,
            frame_interval_ms: defaults::DEFAULT_FRAME_INTERVAL_MS,
            sort_by: defaults::DEFAULT_SORT_BY,
            volume_preset: defaults::DEFAULT_VOLUME_PRESET.to_string(),
        }
    }
}

impl ViewerConfig {
    /// Resize coalescing window, clamped to a sane range.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.clamp(
            defaults::MIN_FRAME_INTERVAL_MS,
            defaults::MAX_FRAME_INTERVAL_MS,
        ))
    }
}

fn get_default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

pub fn load() -> Result<ViewerConfig> {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Ok(ViewerConfig::default())
}

pub fn save(config: &ViewerConfig) -> Result<()> {
    if let Some(path) = get_default_config_path() {
        return save_to_path(config, &path);
    }
    Ok(())
}

pub fn load_from_path(path: &Path) -> Result<ViewerConfig> {
    let content = fs::read_to_string(path)?;
    match toml::from_str(&content) {
        Ok(config) => Ok(config),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "invalid viewer config; using defaults");
            Ok(ViewerConfig::default())
        }
    }
}

pub fn save_to_path(config: &ViewerConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}
