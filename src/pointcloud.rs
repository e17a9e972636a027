// SPDX-License-Identifier: GPL-3.0-only

//! Point-cloud derivation and export
//!
//! The stream always carries depth + IR planes; point-cloud output is
//! derived host-side by unprojecting the depth plane through the
//! connect-time depth intrinsics. Invalid samples become all-zero points
//! so the output array stays index-aligned with the pixel grid.

use crate::constants::DEPTH_INVALID;
use crate::errors::{DeviceError, DeviceResult};
use crate::geometry::{normalize_intensity, unproject};
use crate::wire::{CloudPoint, IntrinsicParam};
use las::{Builder, Writer};
use std::path::Path;
use tracing::{debug, info};

/// Convert depth + IR planes into point-cloud samples
///
/// `out` must hold exactly one point per pixel. Samples that are invalid
/// or beyond `max_depth_mm` produce the zero point.
pub fn fill_cloud(
    depth: &[u16],
    ir: &[u16],
    width: u32,
    intrinsics: &IntrinsicParam,
    max_depth_mm: u16,
    out: &mut [CloudPoint],
) {
    debug_assert_eq!(depth.len(), out.len());
    debug_assert_eq!(ir.len(), out.len());

    for (i, point) in out.iter_mut().enumerate() {
        let d = depth[i];
        if d == DEPTH_INVALID || d > max_depth_mm {
            *point = CloudPoint::default();
            continue;
        }
        let u = i as u32 % width;
        let v = i as u32 / width;
        let [x, y, z] = unproject(intrinsics, u, v, d);
        *point = CloudPoint {
            x,
            y,
            z,
            intensity: normalize_intensity(ir[i]),
        };
    }
}

/// Export point-cloud samples as a LAS/LAZ file
///
/// Zero points (invalid samples) are skipped. The output is compressed
/// when the path ends in .laz.
pub fn export_point_cloud_las(points: &[CloudPoint], output_path: &Path) -> DeviceResult<()> {
    let valid: Vec<&CloudPoint> = points.iter().filter(|p| p.z > 0.0).collect();
    if valid.is_empty() {
        return Err(DeviceError::Failed("no valid points to export".into()));
    }

    let (mut min, mut max) = ([f64::MAX; 3], [f64::MIN; 3]);
    for p in &valid {
        for (axis, value) in [p.x as f64, p.y as f64, p.z as f64].into_iter().enumerate() {
            min[axis] = min[axis].min(value);
            max[axis] = max[axis].max(value);
        }
    }

    let mut builder = Builder::from((1, 4));
    builder.point_format.is_compressed = output_path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("laz"));

    // 1 mm precision, centered offsets
    let scale = 0.001;
    builder.transforms = las::Vector {
        x: las::Transform {
            scale,
            offset: (min[0] + max[0]) / 2.0,
        },
        y: las::Transform {
            scale,
            offset: (min[1] + max[1]) / 2.0,
        },
        z: las::Transform {
            scale,
            offset: (min[2] + max[2]) / 2.0,
        },
    };

    let header = builder
        .into_header()
        .map_err(|e| DeviceError::WriteFailed(format!("LAS header: {}", e)))?;
    let mut writer = Writer::from_path(output_path, header)
        .map_err(|e| DeviceError::WriteFailed(format!("{}: {}", output_path.display(), e)))?;

    for p in &valid {
        let mut point = las::Point::default();
        point.x = p.x as f64;
        point.y = p.y as f64;
        point.z = p.z as f64;
        point.intensity = (p.intensity * u16::MAX as f32) as u16;
        writer
            .write_point(point)
            .map_err(|e| DeviceError::WriteFailed(format!("LAS point: {}", e)))?;
    }
    writer
        .close()
        .map_err(|e| DeviceError::WriteFailed(format!("LAS close: {}", e)))?;

    info!(
        points = valid.len(),
        path = %output_path.display(),
        "Point cloud exported"
    );
    debug!(skipped = points.len() - valid.len(), "Invalid samples skipped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_intrinsics() -> IntrinsicParam {
        IntrinsicParam {
            fx: 580.0,
            fy: 580.0,
            cx: 1.0,
            cy: 1.0,
        }
    }

    #[test]
    fn test_fill_cloud_matches_unprojection() {
        // 2x2 frame with one invalid and one out-of-range sample
        let depth = [1000u16, 0, 2000, 6000];
        let ir = [2048u16, 0, 4095, 100];
        let mut out = [CloudPoint::default(); 4];

        fill_cloud(&depth, &ir, 2, &test_intrinsics(), 5000, &mut out);

        // Pixel (0, 0) at 1 m
        assert!((out[0].z - 1.0).abs() < 1e-6);
        assert!((out[0].x - (0.0 - 1.0) / 580.0).abs() < 1e-6);
        assert!((out[0].intensity - 0.5).abs() < 1e-2);
        // Invalid sample stays zeroed
        assert_eq!(out[1], CloudPoint::default());
        // Pixel (0, 1) at 2 m, full intensity
        assert!((out[2].z - 2.0).abs() < 1e-6);
        assert_eq!(out[2].intensity, 1.0);
        // Beyond max depth
        assert_eq!(out[3], CloudPoint::default());
    }

    #[test]
    fn test_export_rejects_empty_cloud() {
        let points = [CloudPoint::default(); 8];
        let path = std::env::temp_dir().join("tofcam_empty.las");
        let err = export_point_cloud_las(&points, &path).unwrap_err();
        assert_eq!(err.code(), -1);
    }

    #[test]
    fn test_export_writes_las_file() {
        let points = [
            CloudPoint {
                x: 0.1,
                y: 0.2,
                z: 1.0,
                intensity: 0.5,
            },
            CloudPoint {
                x: -0.1,
                y: 0.0,
                z: 2.0,
                intensity: 1.0,
            },
            CloudPoint::default(),
        ];
        let path = std::env::temp_dir().join("tofcam_cloud.las");
        export_point_cloud_las(&points, &path).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.len() > 0);
        let _ = std::fs::remove_file(&path);
    }
}
