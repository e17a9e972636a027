// SPDX-License-Identifier: GPL-3.0-only

//! Session configuration records
//!
//! [`FilterSettings`] is the single record holding every on-device filter
//! toggle and coefficient, so filter state has one owner instead of a set
//! of order-dependent switches. [`SessionConfig`] wraps it with the output
//! mode selections and persists as JSON under the user config directory.

use crate::constants::{
    AMPLITUDE_THRESHOLD_DEFAULT, FLYING_PIXEL_DEFAULT, SCATTERING_THRESHOLD_DEFAULT,
    TNR_RATIO_DEFAULT,
};
use crate::errors::{DeviceError, DeviceResult};
use crate::wire::{DepthMode, FrameRate, IrMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// On-device image processing filter state
///
/// `None` on an optional coefficient means the filter is disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Global depth offset (mm)
    pub depth_offset: i16,
    /// Pixels below this amplitude are discarded
    pub amplitude_threshold: u16,
    /// Pixels above this scattering measure are discarded
    pub scattering_threshold: u16,
    /// Guided filter epsilon; None = disabled
    pub guided_filter: Option<u16>,
    /// 3x3 spatial median filter
    pub median_filter: bool,
    /// Flying-pixel removal edge threshold; None = disabled
    pub flying_pixel_filter: Option<u16>,
    /// Temporal noise reduction blend ratio; None = disabled
    pub tnr_filter: Option<f32>,
    /// Auto exposure control
    pub auto_exposure: bool,
    /// Illumination (laser diode) enable
    pub illumination: bool,
    /// Motion blur check threshold
    pub motion_blur_threshold: u16,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            depth_offset: 0,
            amplitude_threshold: AMPLITUDE_THRESHOLD_DEFAULT,
            scattering_threshold: SCATTERING_THRESHOLD_DEFAULT,
            guided_filter: None,
            median_filter: false,
            flying_pixel_filter: Some(FLYING_PIXEL_DEFAULT),
            tnr_filter: Some(TNR_RATIO_DEFAULT),
            auto_exposure: true,
            illumination: true,
            motion_blur_threshold: 0,
        }
    }
}

/// Persistable session defaults
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Filter state applied after connect
    pub filters: FilterSettings,
    /// Depth output mode
    pub depth_mode: DepthMode,
    /// IR plane content
    pub ir_mode: IrMode,
    /// Acquisition frame rate
    pub frame_rate: FrameRate,
    /// Device path used by the last session
    pub last_device_path: Option<String>,
}

impl SessionConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tofcam").join("config.json"))
    }

    /// Load a config from a JSON file
    pub fn load(path: &Path) -> DeviceResult<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| DeviceError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| DeviceError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded session config");
        Ok(config)
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist yet
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path).unwrap_or_else(|e| {
                info!(error = %e, "Ignoring unreadable config, using defaults");
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    /// Save the config as JSON, creating parent directories as needed
    pub fn save(&self, path: &Path) -> DeviceResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DeviceError::WriteFailed(format!("{}: {}", parent.display(), e)))?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| DeviceError::WriteFailed(e.to_string()))?;
        std::fs::write(path, data)
            .map_err(|e| DeviceError::WriteFailed(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Saved session config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_defaults() {
        let filters = FilterSettings::default();
        assert_eq!(filters.amplitude_threshold, 5);
        assert_eq!(filters.scattering_threshold, 100);
        assert_eq!(filters.flying_pixel_filter, Some(300));
        assert_eq!(filters.tnr_filter, Some(0.5));
        assert!(filters.guided_filter.is_none());
        assert!(!filters.median_filter);
    }

    #[test]
    fn test_config_json_round_trip() {
        let mut config = SessionConfig::default();
        config.filters.guided_filter = Some(1200);
        config.frame_rate = FrameRate::Fps15;
        config.depth_mode = DepthMode::PointCloud;

        let json = serde_json::to_string(&config).unwrap();
        let back: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = SessionConfig::load(Path::new("/nonexistent/tofcam.json")).unwrap_err();
        assert_eq!(err.code(), -11);
    }
}
