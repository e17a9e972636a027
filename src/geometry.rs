// SPDX-License-Identifier: GPL-3.0-only

//! Lens calibration records and depth unprojection
//!
//! Calibration is read from the device once at connect time and exposed
//! read-only for the rest of the session. Unprojection uses the plain
//! pinhole model; distortion coefficients are published for callers that
//! undistort themselves but are not applied here.

use crate::wire::{DistortionParam, ExtrinsicParam, IntrinsicParam};
use serde::{Deserialize, Serialize};

/// Intrinsics and distortion for one lens
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LensCalibration {
    pub intrinsics: IntrinsicParam,
    pub distortion: DistortionParam,
}

/// Complete calibration block read from the device at connect time
///
/// The color lens and the depth-to-color extrinsics are only present on
/// depth+RGB devices.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationData {
    /// Depth lens calibration
    pub depth: LensCalibration,
    /// Color lens calibration (depth+RGB devices only)
    pub color: Option<LensCalibration>,
    /// Depth-to-color rigid transform (depth+RGB devices only)
    pub extrinsics: Option<ExtrinsicParam>,
}

/// Unproject one depth sample to camera-space coordinates (meters)
///
/// `u`, `v` are pixel coordinates, `depth_mm` the depth plane sample.
pub fn unproject(intr: &IntrinsicParam, u: u32, v: u32, depth_mm: u16) -> [f32; 3] {
    let z = depth_mm as f32 / 1000.0;
    let x = (u as f32 - intr.cx) * z / intr.fx;
    let y = (v as f32 - intr.cy) * z / intr.fy;
    [x, y, z]
}

/// Normalize a raw IR/amplitude sample to 0..1
pub fn normalize_intensity(raw: u16) -> f32 {
    (raw.min(crate::constants::AMPLITUDE_MAX) as f32) / crate::constants::AMPLITUDE_MAX as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_intrinsics() -> IntrinsicParam {
        IntrinsicParam {
            fx: 580.0,
            fy: 580.0,
            cx: 320.0,
            cy: 240.0,
        }
    }

    #[test]
    fn test_unproject_principal_point() {
        // A sample at the principal point lies on the optical axis
        let p = unproject(&test_intrinsics(), 320, 240, 1000);
        assert_eq!(p, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unproject_off_axis() {
        let intr = test_intrinsics();
        let p = unproject(&intr, 900, 240, 2000);
        // x = (900 - 320) * 2.0 / 580 = 2.0
        assert!((p[0] - 2.0).abs() < 1e-6);
        assert!(p[1].abs() < 1e-6);
        assert!((p[2] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_intensity_clamps() {
        assert_eq!(normalize_intensity(0), 0.0);
        assert_eq!(normalize_intensity(4095), 1.0);
        // Values beyond the 12-bit range clamp instead of overflowing
        assert_eq!(normalize_intensity(u16::MAX), 1.0);
    }
}
