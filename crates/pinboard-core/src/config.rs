//! Board configuration.

use crate::storage::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which selected item the normalize operations match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizePolicy {
    /// Match the largest item.
    #[default]
    Largest,
    /// Match the smallest item.
    Smallest,
    /// Match the average.
    Mean,
}

/// Tunables for a board. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Maximum undo depth. Zero means unlimited.
    pub undo_limit: usize,
    /// Offset between successive images of one insert batch.
    pub insert_offset: f64,
    pub normalize_policy: NormalizePolicy,
    /// Space left between arranged items.
    pub arrange_gap: f64,
    /// Target width/height ratio for the optimal grid arrangement.
    pub optimal_aspect: f64,
    /// Crop handle size at scale 1.
    pub crop_handle_size: f64,
    /// Margin around the items for the scrollable canvas rect.
    pub canvas_margin: f64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            undo_limit: 100,
            insert_offset: 50.0,
            normalize_policy: NormalizePolicy::Largest,
            arrange_gap: 0.0,
            optimal_aspect: 1.0,
            crop_handle_size: 15.0,
            canvas_margin: 1000.0,
        }
    }
}

impl BoardConfig {
    pub fn from_json(json: &str) -> StorageResult<Self> {
        serde_json::from_str(json).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    pub fn to_json(&self) -> StorageResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> StorageResult<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)
            .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&json).map_err(|e| match e {
            StorageError::Serialization(msg) => {
                StorageError::Serialization(format!("Failed to parse {}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Default config file location.
    ///
    /// On Unix: `~/.config/pinboard/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir()
            .or_else(dirs::home_dir)
            .map(|base| base.join("pinboard").join("config.json"))
    }
}
