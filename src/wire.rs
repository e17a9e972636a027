// SPDX-License-Identifier: GPL-3.0-only

//! Wire structures and enumerations shared with the device module
//!
//! Every struct here is `#[repr(C)]` with explicit reserved fields in place
//! of compiler padding, so the in-memory layout *is* the serialization
//! contract. Layout is locked in by the size/offset tests below; changing
//! any field is a wire-format break.

use crate::constants;
use crate::errors::DeviceError;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Output data format requested at connect time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataFormat {
    /// x, y, z, intensity output
    #[default]
    Xyzi = 0,
    /// z, intensity output
    Zi = 1,
    /// z only output
    Z = 2,
}

impl TryFrom<u8> for DataFormat {
    type Error = DeviceError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Xyzi),
            1 => Ok(Self::Zi),
            2 => Ok(Self::Z),
            other => Err(DeviceError::InvalidParam(format!(
                "unknown data format {}",
                other
            ))),
        }
    }
}

/// Depth output mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum DepthMode {
    /// Depth (mm) + IR planes
    #[default]
    DepthIr = 0,
    /// Point cloud samples (meters)
    PointCloud = 1,
    /// Raw phase data (declared, not supported)
    RawPhase = 2,
    /// Raw sensor data (declared, not supported)
    RawData = 3,
}

impl DepthMode {
    /// Raw phase/data modes exist in the wire contract but no shipped
    /// firmware produces them.
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::DepthIr | Self::PointCloud)
    }
}

impl TryFrom<u8> for DepthMode {
    type Error = DeviceError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::DepthIr),
            1 => Ok(Self::PointCloud),
            2 => Ok(Self::RawPhase),
            3 => Ok(Self::RawData),
            other => Err(DeviceError::InvalidParam(format!(
                "unknown depth mode {}",
                other
            ))),
        }
    }
}

/// IR plane content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum IrMode {
    /// Modulated amplitude data
    #[default]
    Amplitude = 0,
    /// Total intensity data
    Intensity = 1,
}

impl TryFrom<u8> for IrMode {
    type Error = DeviceError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Amplitude),
            1 => Ok(Self::Intensity),
            other => Err(DeviceError::InvalidParam(format!(
                "unknown IR output mode {}",
                other
            ))),
        }
    }
}

/// Device power / operation mode
///
/// Streaming can only be started from Active or Retention mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum OperationMode {
    /// Illumination on
    Active = 0,
    /// Initial mode after connect
    #[default]
    Retention = 1,
    /// Default mode at power on
    Sleep = 2,
}

impl TryFrom<u8> for OperationMode {
    type Error = DeviceError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Active),
            1 => Ok(Self::Retention),
            2 => Ok(Self::Sleep),
            other => Err(DeviceError::InvalidParam(format!(
                "unknown operation mode {}",
                other
            ))),
        }
    }
}

/// Supported frame rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameRate {
    /// 30 fps
    #[default]
    Fps30 = 30,
    /// 15 fps
    Fps15 = 15,
    /// 7.5 fps, reported as 8
    Fps8 = 8,
}

impl FrameRate {
    /// Nominal frames per second
    pub fn fps(&self) -> u8 {
        *self as u8
    }

    /// Frame interval for pacing a capture loop
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_micros(1_000_000 / self.fps() as u64)
    }
}

impl TryFrom<u8> for FrameRate {
    type Error = DeviceError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            30 => Ok(Self::Fps30),
            15 => Ok(Self::Fps15),
            8 => Ok(Self::Fps8),
            other => Err(DeviceError::InvalidParam(format!(
                "unsupported frame rate {} fps",
                other
            ))),
        }
    }
}

/// Frame type tag carried in frame metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum FrameType {
    DepthIr = 0,
    PointCloud = 1,
    Color = 2,
}

impl TryFrom<i32> for FrameType {
    type Error = DeviceError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::DepthIr),
            1 => Ok(Self::PointCloud),
            2 => Ok(Self::Color),
            other => Err(DeviceError::InvalidParam(format!(
                "unknown frame type {}",
                other
            ))),
        }
    }
}

/// Signed status codes shared across all wire operations
///
/// Zero is success, positive values are advisory, negative values identify
/// a failure. The Rust API surfaces failures as [`DeviceError`]; this enum
/// exists for the numeric contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StatusCode {
    Queued = 2,
    Warning = 1,
    Success = 0,
    Failed = -1,
    NotFound = -2,
    OpenFailed = -3,
    GetFrameFailed = -4,
    WriteFailed = -5,
    ReadFailed = -6,
    Unsupported = -7,
    OutOfRange = -8,
    NotOpened = -9,
    InvalidParam = -10,
    ConfigLoadFailed = -11,
}

impl StatusCode {
    /// The raw signed code
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

/// Descriptor for one discovered device
///
/// Produced by [`crate::transport::discover`], consumed by
/// [`crate::session::DeviceSession::connect`].
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DevicePath {
    /// Discovery index
    pub index: u8,
    /// Product name, NUL padded
    pub product_name: [u8; 16],
    /// OS device path ("/dev/video0", "sim:0"), NUL padded
    pub device_path: [u8; 256],
    /// Requested output format, a [`DataFormat`] scalar
    pub data_format: u8,
}

impl DevicePath {
    pub fn new(index: u8, product_name: &str, device_path: &str, format: DataFormat) -> Self {
        Self {
            index,
            product_name: fill_fixed(product_name),
            device_path: fill_fixed(device_path),
            data_format: format as u8,
        }
    }

    /// The OS device path as a string
    pub fn path(&self) -> String {
        fixed_str(&self.device_path)
    }

    /// The product name as a string
    pub fn name(&self) -> String {
        fixed_str(&self.product_name)
    }
}

/// Static device identity record, populated at connect time
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DeviceInfo {
    /// Vendor name, NUL padded
    pub vendor_name: [u8; 16],
    /// Device name, NUL padded
    pub device_name: [u8; 16],
    /// Product name, NUL padded
    pub product_name: [u8; 8],
    /// Serial number, NUL padded
    pub serial_number: [u8; 16],
    /// Firmware version bytes (major, minor, patch, build hi, build lo)
    pub firmware_version: [u8; 5],
    /// Keeps the following u16 fields naturally aligned
    pub reserved: u8,
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// 0 = depth only, 1 = depth + RGB
    pub device_type: u16,
    /// Native frame width
    pub width: u16,
    /// Native frame height
    pub height: u16,
}

impl DeviceInfo {
    /// True for depth+RGB devices
    pub fn has_color_camera(&self) -> bool {
        self.device_type == 1
    }

    pub fn vendor(&self) -> String {
        fixed_str(&self.vendor_name)
    }

    pub fn product(&self) -> String {
        fixed_str(&self.product_name)
    }

    pub fn serial(&self) -> String {
        fixed_str(&self.serial_number)
    }

    /// Firmware version formatted as "major.minor.patch (build)"
    pub fn firmware(&self) -> String {
        let v = &self.firmware_version;
        let build = u16::from_be_bytes([v[3], v[4]]);
        format!("{}.{}.{} ({})", v[0], v[1], v[2], build)
    }
}

/// Lens intrinsic parameters (pinhole model)
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct IntrinsicParam {
    /// Focal length x (pixels)
    pub fx: f32,
    /// Focal length y (pixels)
    pub fy: f32,
    /// Principal point x (pixels)
    pub cx: f32,
    /// Principal point y (pixels)
    pub cy: f32,
}

/// Lens distortion coefficients (Brown-Conrady plus skew)
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct DistortionParam {
    /// Radial coefficient, 1st order
    pub k1: f32,
    /// Radial coefficient, 2nd order
    pub k2: f32,
    /// Radial coefficient, 3rd order
    pub k3: f32,
    /// Tangential coefficient
    pub p1: f32,
    /// Tangential coefficient
    pub p2: f32,
    /// Axis skew
    pub skew: f32,
}

/// Rigid transform relating the depth and color camera frames
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct ExtrinsicParam {
    /// 3x3 rotation matrix, row major
    pub rotation: [f32; 9],
    /// Translation vector (meters)
    pub translation: [f32; 3],
}

/// Per-frame metadata delivered with every successful read
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct FrameInfo {
    /// A [`FrameType`] scalar
    pub frame_type: i32,
    /// Frame width in pixels
    pub width: i32,
    /// Frame height in pixels
    pub height: i32,
    /// Keeps frame_id naturally aligned
    pub reserved: u32,
    /// Monotonic frame counter, strictly increasing per session
    pub frame_id: i64,
    /// Capture timestamp, milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Sensor temperature (degrees C)
    pub sensor_temp: f32,
    /// Laser diode temperature (degrees C)
    pub ld_temp: f32,
    /// Integration time (ms)
    pub integration_time: f32,
    /// Embedded metadata line from the sensor readout
    pub embedded_line: [u8; 80],
    /// Pads the record to an 8-byte multiple
    pub reserved2: u32,
}

/// One point-cloud sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct CloudPoint {
    /// X coordinate (meters)
    pub x: f32,
    /// Y coordinate (meters)
    pub y: f32,
    /// Z coordinate (meters)
    pub z: f32,
    /// Normalized intensity (0..1)
    pub intensity: f32,
}

/// Header preceding every raw frame on the capture stream
///
/// A raw frame is this header followed by the depth plane and then the IR
/// plane, each width*height little-endian u16 samples.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RawFrameHeader {
    /// Must equal [`constants::RAW_FRAME_MAGIC`]
    pub magic: u32,
    /// A [`FrameType`] scalar
    pub frame_type: u8,
    /// An [`IrMode`] scalar describing the IR plane
    pub ir_mode: u8,
    /// Frame width in pixels
    pub width: u16,
    /// Frame height in pixels
    pub height: u16,
    /// Keeps integration_time naturally aligned
    pub reserved: u16,
    /// Integration time (ms)
    pub integration_time: f32,
    /// Monotonic frame counter
    pub frame_id: i64,
    /// Capture timestamp, milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Sensor temperature (degrees C)
    pub sensor_temp: f32,
    /// Laser diode temperature (degrees C)
    pub ld_temp: f32,
    /// Embedded metadata line from the sensor readout
    pub embedded_line: [u8; 80],
}

impl RawFrameHeader {
    /// Parse a header from the front of a capture buffer
    ///
    /// Returns None if the buffer is short or the magic does not match.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < std::mem::size_of::<Self>() {
            return None;
        }
        let header: Self =
            bytemuck::pod_read_unaligned(&buf[..std::mem::size_of::<Self>()]);
        if header.magic != constants::RAW_FRAME_MAGIC {
            return None;
        }
        Some(header)
    }

    /// Expected payload length in bytes: two u16 planes of width*height
    pub fn payload_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Per-frame metadata derived from this header
    pub fn frame_info(&self) -> FrameInfo {
        FrameInfo {
            frame_type: self.frame_type as i32,
            width: self.width as i32,
            height: self.height as i32,
            reserved: 0,
            frame_id: self.frame_id,
            timestamp: self.timestamp,
            sensor_temp: self.sensor_temp,
            ld_temp: self.ld_temp,
            integration_time: self.integration_time,
            embedded_line: self.embedded_line,
            reserved2: 0,
        }
    }
}

/// Read a NUL-padded fixed-size field as a string
pub fn fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Write a string into a NUL-padded fixed-size field, truncating if needed
pub fn fill_fixed<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let bytes = s.as_bytes();
    let len = bytes.len().min(N);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_wire_struct_sizes() {
        assert_eq!(size_of::<DevicePath>(), 274);
        assert_eq!(size_of::<DeviceInfo>(), 72);
        assert_eq!(size_of::<IntrinsicParam>(), 16);
        assert_eq!(size_of::<DistortionParam>(), 24);
        assert_eq!(size_of::<ExtrinsicParam>(), 48);
        assert_eq!(size_of::<FrameInfo>(), 128);
        assert_eq!(size_of::<CloudPoint>(), 16);
        assert_eq!(size_of::<RawFrameHeader>(), 120);
    }

    #[test]
    fn test_status_code_values() {
        assert_eq!(StatusCode::Success.as_i32(), 0);
        assert_eq!(StatusCode::Queued.as_i32(), 2);
        assert_eq!(StatusCode::ConfigLoadFailed.as_i32(), -11);
    }

    #[test]
    fn test_fixed_str_round_trip() {
        let field: [u8; 16] = fill_fixed("TF-M100");
        assert_eq!(fixed_str(&field), "TF-M100");
        // Truncation keeps the first N bytes
        let short: [u8; 4] = fill_fixed("TF-M100");
        assert_eq!(fixed_str(&short), "TF-M");
    }

    #[test]
    fn test_device_path_accessors() {
        let path = DevicePath::new(3, "TF-C100", "/dev/video2", DataFormat::Zi);
        assert_eq!(path.index, 3);
        assert_eq!(path.name(), "TF-C100");
        assert_eq!(path.path(), "/dev/video2");
        assert_eq!(DataFormat::try_from(path.data_format).unwrap(), DataFormat::Zi);
    }

    #[test]
    fn test_frame_rate_scalars() {
        assert_eq!(FrameRate::try_from(30).unwrap(), FrameRate::Fps30);
        assert_eq!(FrameRate::try_from(8).unwrap().fps(), 8);
        assert!(FrameRate::try_from(25).is_err());
    }

    #[test]
    fn test_raw_header_parse_rejects_bad_magic() {
        let mut header = RawFrameHeader::zeroed();
        header.magic = crate::constants::RAW_FRAME_MAGIC;
        header.width = 4;
        header.height = 2;
        let bytes = bytemuck::bytes_of(&header).to_vec();
        let parsed = RawFrameHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.payload_len(), 32);

        let mut bad = bytes.clone();
        bad[0] ^= 0xff;
        assert!(RawFrameHeader::parse(&bad).is_none());
        assert!(RawFrameHeader::parse(&bytes[..10]).is_none());
    }

    #[test]
    fn test_unsupported_depth_modes() {
        assert!(DepthMode::DepthIr.is_supported());
        assert!(DepthMode::PointCloud.is_supported());
        assert!(!DepthMode::RawPhase.is_supported());
        assert!(!DepthMode::RawData.is_supported());
    }
}
