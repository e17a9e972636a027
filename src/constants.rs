// SPDX-License-Identifier: GPL-3.0-only

//! Crate-wide constants: device identity, frame geometry, parameter ranges

use std::ops::RangeInclusive;
use std::time::Duration;

/// USB vendor ID of the TF-series camera modules
pub const VENDOR_ID: u16 = 0x2b4c;

/// USB product ID of the depth-only module (TF-M100)
pub const PRODUCT_ID_DEPTH: u16 = 0x8776;

/// USB product ID of the depth+RGB module (TF-C100)
pub const PRODUCT_ID_DEPTH_RGB: u16 = 0x8778;

/// Product name prefix used to match V4L2 card names during discovery
pub const PRODUCT_NAME_PREFIX: &str = "TF-";

/// Native depth/IR frame width in pixels
pub const FRAME_WIDTH: u16 = 640;

/// Native depth/IR frame height in pixels
pub const FRAME_HEIGHT: u16 = 480;

/// Samples per frame plane (width * height)
pub const FRAME_PIXELS: usize = FRAME_WIDTH as usize * FRAME_HEIGHT as usize;

/// Magic marker at the start of every raw frame ("TOF0", little endian)
pub const RAW_FRAME_MAGIC: u32 = u32::from_le_bytes(*b"TOF0");

/// Maximum representable amplitude/IR sample (12-bit sensor output)
pub const AMPLITUDE_MAX: u16 = 4095;

/// Depth value marking an invalid sample in the depth plane
pub const DEPTH_INVALID: u16 = 0;

/// How long a frame read blocks before giving up
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Capture channel depth; newest frame wins, older queued frames are drained
pub const FRAME_CHANNEL_CAPACITY: usize = 4;

/// Global depth offset range (mm)
pub const DEPTH_OFFSET_RANGE: RangeInclusive<i16> = 0..=4095;

/// Amplitude check threshold range
pub const AMPLITUDE_THRESHOLD_RANGE: RangeInclusive<u16> = 0..=4095;

/// Default amplitude check threshold
pub const AMPLITUDE_THRESHOLD_DEFAULT: u16 = 5;

/// Scattering check threshold range
pub const SCATTERING_THRESHOLD_RANGE: RangeInclusive<u16> = 0..=4095;

/// Default scattering check threshold
pub const SCATTERING_THRESHOLD_DEFAULT: u16 = 100;

/// Guided filter epsilon coefficient range
pub const GUIDED_EPSILON_RANGE: RangeInclusive<u16> = 1..=8000;

/// Flying-pixel edge check threshold range
pub const FLYING_PIXEL_RANGE: RangeInclusive<u16> = 0..=4095;

/// Default flying-pixel edge check threshold
pub const FLYING_PIXEL_DEFAULT: u16 = 300;

/// Temporal noise reduction blend ratio range (current frame vs previous)
pub const TNR_RATIO_RANGE: RangeInclusive<f32> = 0.0..=1.0;

/// Default TNR blend ratio
pub const TNR_RATIO_DEFAULT: f32 = 0.5;

/// TNR ratio is carried as an integer register in thousandths
pub const TNR_RATIO_SCALE: f32 = 1000.0;

/// Motion blur check threshold range
pub const MOTION_BLUR_RANGE: RangeInclusive<u16> = 0..=255;

/// Minimum measurable depth reported by the capability record (mm)
pub const DEPTH_RANGE_MIN_MM: u16 = 200;

/// Maximum measurable depth reported by the capability record (mm)
pub const DEPTH_RANGE_MAX_MM: u16 = 5000;

/// Path prefix for simulated devices, e.g. "sim:0"
pub const SIM_PATH_PREFIX: &str = "sim:";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_pixels() {
        assert_eq!(FRAME_PIXELS, 307_200);
    }

    #[test]
    fn test_raw_frame_magic_spells_tof0() {
        assert_eq!(RAW_FRAME_MAGIC.to_le_bytes(), *b"TOF0");
    }

    #[test]
    fn test_defaults_inside_ranges() {
        assert!(AMPLITUDE_THRESHOLD_RANGE.contains(&AMPLITUDE_THRESHOLD_DEFAULT));
        assert!(SCATTERING_THRESHOLD_RANGE.contains(&SCATTERING_THRESHOLD_DEFAULT));
        assert!(FLYING_PIXEL_RANGE.contains(&FLYING_PIXEL_DEFAULT));
        assert!(TNR_RATIO_RANGE.contains(&TNR_RATIO_DEFAULT));
    }
}
