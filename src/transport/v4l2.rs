// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 transport for real TF-series modules
//!
//! The module enumerates as a UVC video node. Frame data arrives on the
//! capture queue as raw frames in the crate's stream layout (header +
//! depth plane + IR plane, fourcc "TOFD"); parameters, identity and
//! calibration are exposed through a vendor control class and read with
//! plain and extended control ioctls.

use super::{FrameSender, ParamId, RawFrame, Transport};
use crate::constants::{
    DEPTH_RANGE_MAX_MM, DEPTH_RANGE_MIN_MM, FRAME_HEIGHT, FRAME_WIDTH, PRODUCT_NAME_PREFIX,
};
use crate::errors::{DeviceError, DeviceResult};
use crate::geometry::{CalibrationData, LensCalibration};
use crate::wire::{
    DataFormat, DeviceInfo, DevicePath, DistortionParam, ExtrinsicParam, IntrinsicParam,
    RawFrameHeader, fixed_str,
};
use bytemuck::{Pod, Zeroable};
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

/// Vendor control class of the TF-series modules
const TOF_CTRL_CLASS: u32 = 0x00a8_0000;
const TOF_CID_BASE: u32 = TOF_CTRL_CLASS | 0x900;

/// Vendor control IDs
///
/// These mirror the register map in the module firmware; blob controls
/// (device info, calibration) are read with VIDIOC_G_EXT_CTRLS.
mod cid {
    use super::TOF_CID_BASE;

    pub const DEPTH_OFFSET: u32 = TOF_CID_BASE;
    pub const AMPLITUDE_THRESHOLD: u32 = TOF_CID_BASE + 1;
    pub const SCATTERING_THRESHOLD: u32 = TOF_CID_BASE + 2;
    pub const GUIDED_FILTER_ENABLE: u32 = TOF_CID_BASE + 3;
    pub const GUIDED_FILTER_EPSILON: u32 = TOF_CID_BASE + 4;
    pub const MEDIAN_FILTER_ENABLE: u32 = TOF_CID_BASE + 5;
    pub const FLYING_PIXEL_ENABLE: u32 = TOF_CID_BASE + 6;
    pub const FLYING_PIXEL_THRESHOLD: u32 = TOF_CID_BASE + 7;
    pub const TNR_ENABLE: u32 = TOF_CID_BASE + 8;
    pub const TNR_RATIO: u32 = TOF_CID_BASE + 9;
    pub const AUTO_EXPOSURE: u32 = TOF_CID_BASE + 10;
    pub const OPERATION_MODE: u32 = TOF_CID_BASE + 11;
    pub const ILLUMINATION: u32 = TOF_CID_BASE + 12;
    pub const MOTION_BLUR_THRESHOLD: u32 = TOF_CID_BASE + 13;
    pub const DEPTH_MODE: u32 = TOF_CID_BASE + 14;
    pub const IR_MODE: u32 = TOF_CID_BASE + 15;
    pub const FRAME_RATE: u32 = TOF_CID_BASE + 16;
    pub const DEPTH_MIN_DISTANCE: u32 = TOF_CID_BASE + 17;
    pub const DEPTH_MAX_DISTANCE: u32 = TOF_CID_BASE + 18;
    pub const DEVICE_INFO: u32 = TOF_CID_BASE + 32;
    pub const DEPTH_INTRINSICS: u32 = TOF_CID_BASE + 33;
    pub const COLOR_INTRINSICS: u32 = TOF_CID_BASE + 34;
    pub const EXTRINSICS: u32 = TOF_CID_BASE + 35;
}

fn param_cid(id: ParamId) -> u32 {
    match id {
        ParamId::DepthOffset => cid::DEPTH_OFFSET,
        ParamId::AmplitudeThreshold => cid::AMPLITUDE_THRESHOLD,
        ParamId::ScatteringThreshold => cid::SCATTERING_THRESHOLD,
        ParamId::GuidedFilterEnable => cid::GUIDED_FILTER_ENABLE,
        ParamId::GuidedFilterEpsilon => cid::GUIDED_FILTER_EPSILON,
        ParamId::MedianFilterEnable => cid::MEDIAN_FILTER_ENABLE,
        ParamId::FlyingPixelEnable => cid::FLYING_PIXEL_ENABLE,
        ParamId::FlyingPixelThreshold => cid::FLYING_PIXEL_THRESHOLD,
        ParamId::TnrEnable => cid::TNR_ENABLE,
        ParamId::TnrRatio => cid::TNR_RATIO,
        ParamId::AutoExposure => cid::AUTO_EXPOSURE,
        ParamId::OperationMode => cid::OPERATION_MODE,
        ParamId::Illumination => cid::ILLUMINATION,
        ParamId::MotionBlurThreshold => cid::MOTION_BLUR_THRESHOLD,
        ParamId::DepthMode => cid::DEPTH_MODE,
        ParamId::IrMode => cid::IR_MODE,
        ParamId::FrameRate => cid::FRAME_RATE,
    }
}

// V4L2 ioctl codes, from include/uapi/linux/videodev2.h
const VIDIOC_QUERYCAP: libc::c_ulong = 0x8068_5600;
const VIDIOC_G_CTRL: libc::c_ulong = 0xc008_561b;
const VIDIOC_S_CTRL: libc::c_ulong = 0xc008_561c;
const VIDIOC_G_EXT_CTRLS: libc::c_ulong = 0xc040_5647;

#[repr(C)]
struct V4l2Capability {
    driver: [u8; 16],
    card: [u8; 32],
    bus_info: [u8; 32],
    version: u32,
    capabilities: u32,
    device_caps: u32,
    reserved: [u32; 3],
}

#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

#[repr(C)]
struct V4l2ExtControl {
    id: u32,
    size: u32,
    reserved2: [u32; 1],
    value_or_ptr: u64, // union of value and pointer
}

#[repr(C)]
struct V4l2ExtControls {
    which: u32,
    count: u32,
    error_idx: u32,
    request_fd: i32,
    reserved: [u32; 1],
    controls: *mut V4l2ExtControl,
}

/// Calibration intrinsics + distortion as stored in the module, Q16.16
/// fixed point
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
#[repr(C)]
struct WireLensCalibration {
    fx: i32,
    fy: i32,
    cx: i32,
    cy: i32,
    k1: i32,
    k2: i32,
    k3: i32,
    p1: i32,
    p2: i32,
    skew: i32,
    reserved: [u32; 2],
}

impl WireLensCalibration {
    fn to_lens(self) -> LensCalibration {
        let q = |v: i32| v as f32 / 65536.0;
        LensCalibration {
            intrinsics: IntrinsicParam {
                fx: q(self.fx),
                fy: q(self.fy),
                cx: q(self.cx),
                cy: q(self.cy),
            },
            distortion: DistortionParam {
                k1: q(self.k1),
                k2: q(self.k2),
                k3: q(self.k3),
                p1: q(self.p1),
                p2: q(self.p2),
                skew: q(self.skew),
            },
        }
    }
}

/// Depth-to-color transform as stored in the module: rotation in Q2.30,
/// translation in micrometers
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
#[repr(C)]
struct WireExtrinsics {
    rotation: [i32; 9],
    translation: [i32; 3],
    reserved: [u32; 4],
}

impl WireExtrinsics {
    fn to_extrinsics(self) -> ExtrinsicParam {
        let mut rotation = [0.0f32; 9];
        for (out, raw) in rotation.iter_mut().zip(self.rotation) {
            *out = raw as f32 / (1u32 << 30) as f32;
        }
        let mut translation = [0.0f32; 3];
        for (out, raw) in translation.iter_mut().zip(self.translation) {
            *out = raw as f32 / 1_000_000.0;
        }
        ExtrinsicParam {
            rotation,
            translation,
        }
    }
}

/// Enumerate TF-series modules among the system video nodes
///
/// Matches by V4L2 card name prefix. Returns an empty vec when nothing
/// matches or enumeration itself fails.
pub fn enumerate() -> Vec<DevicePath> {
    let nodes = v4l::context::enum_devices();
    let mut found = Vec::new();

    for node in nodes {
        let path = node.path().to_string_lossy().into_owned();
        let dev = match Device::with_path(&path) {
            Ok(dev) => dev,
            Err(e) => {
                debug!(path = %path, error = %e, "Skipping unopenable video node");
                continue;
            }
        };
        let caps = match dev.query_caps() {
            Ok(caps) => caps,
            Err(e) => {
                debug!(path = %path, error = %e, "Skipping node without capabilities");
                continue;
            }
        };
        if !caps.card.starts_with(PRODUCT_NAME_PREFIX) {
            continue;
        }

        info!(path = %path, card = %caps.card, "Found ToF module");
        found.push(DevicePath::new(
            found.len() as u8,
            &caps.card,
            &path,
            DataFormat::Xyzi,
        ));
    }

    found
}

/// Transport backed by a kernel video node
pub struct V4l2Transport {
    path: String,
    device_info: DeviceInfo,
    calibration: CalibrationData,
    depth_range: (u16, u16),
    running: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<()>>,
}

impl V4l2Transport {
    /// Open the module at a discovered device path
    pub fn open(dev_path: &DevicePath) -> DeviceResult<Self> {
        let path = dev_path.path();
        let file = File::open(&path)
            .map_err(|e| DeviceError::OpenFailed(format!("{}: {}", path, e)))?;
        let fd = file.as_raw_fd();

        let caps = query_capability(fd)
            .ok_or_else(|| DeviceError::OpenFailed(format!("{}: QUERYCAP failed", path)))?;
        debug!(
            driver = %fixed_str(&caps.driver),
            bus = %fixed_str(&caps.bus_info),
            "Queried node capability"
        );
        let card = fixed_str(&caps.card);
        if !card.starts_with(PRODUCT_NAME_PREFIX) {
            return Err(DeviceError::NotFound(format!(
                "{} is not a ToF module (card: {})",
                path, card
            )));
        }

        let device_info: DeviceInfo = read_blob_control(fd, cid::DEVICE_INFO).ok_or_else(|| {
            DeviceError::OpenFailed(format!("{}: device info control unavailable", path))
        })?;

        let depth: WireLensCalibration =
            read_blob_control(fd, cid::DEPTH_INTRINSICS).ok_or_else(|| {
                DeviceError::ConfigLoadFailed(format!(
                    "{}: depth calibration unavailable",
                    path
                ))
            })?;
        let color: Option<WireLensCalibration> = if device_info.has_color_camera() {
            read_blob_control(fd, cid::COLOR_INTRINSICS)
        } else {
            None
        };
        let extrinsics: Option<WireExtrinsics> = if device_info.has_color_camera() {
            read_blob_control(fd, cid::EXTRINSICS)
        } else {
            None
        };
        let calibration = CalibrationData {
            depth: depth.to_lens(),
            color: color.map(WireLensCalibration::to_lens),
            extrinsics: extrinsics.map(WireExtrinsics::to_extrinsics),
        };

        let depth_range = (
            get_control(fd, cid::DEPTH_MIN_DISTANCE).unwrap_or(DEPTH_RANGE_MIN_MM as i32) as u16,
            get_control(fd, cid::DEPTH_MAX_DISTANCE).unwrap_or(DEPTH_RANGE_MAX_MM as i32) as u16,
        );

        info!(
            path = %path,
            serial = %device_info.serial(),
            firmware = %device_info.firmware(),
            "Opened ToF module"
        );

        Ok(Self {
            path,
            device_info,
            calibration,
            depth_range,
            running: Arc::new(AtomicBool::new(false)),
            capture_thread: None,
        })
    }

    fn control_fd(&self) -> DeviceResult<File> {
        File::open(&self.path)
            .map_err(|e| DeviceError::OpenFailed(format!("{}: {}", self.path, e)))
    }
}

impl Transport for V4l2Transport {
    fn device_info(&self) -> DeviceResult<DeviceInfo> {
        Ok(self.device_info)
    }

    fn calibration(&self) -> DeviceResult<CalibrationData> {
        Ok(self.calibration.clone())
    }

    fn depth_range(&self) -> DeviceResult<(u16, u16)> {
        Ok(self.depth_range)
    }

    fn read_param(&mut self, id: ParamId) -> DeviceResult<i32> {
        let file = self.control_fd()?;
        get_control(file.as_raw_fd(), param_cid(id))
            .ok_or_else(|| DeviceError::ReadFailed(format!("control {:?}", id)))
    }

    fn write_param(&mut self, id: ParamId, value: i32) -> DeviceResult<()> {
        let file = self.control_fd()?;
        set_control(file.as_raw_fd(), param_cid(id), value)
            .map_err(|e| DeviceError::WriteFailed(format!("control {:?}: {}", id, e)))
    }

    fn start_stream(&mut self, sink: FrameSender) -> DeviceResult<()> {
        if self.capture_thread.is_some() {
            return Err(DeviceError::Failed("stream already running".into()));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let path = self.path.clone();
        let thread = std::thread::spawn(move || {
            if let Err(e) = capture_loop(&path, sink, running) {
                warn!(path = %path, error = %e, "Capture loop failed");
            }
        });
        self.capture_thread = Some(thread);
        Ok(())
    }

    fn stop_stream(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.capture_thread.take() {
            if thread.join().is_err() {
                warn!(path = %self.path, "Capture thread panicked");
            }
        }
    }
}

impl Drop for V4l2Transport {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

/// Capture loop: owns the streaming open of the video node for its whole
/// lifetime, pushes parsed raw frames into the channel
fn capture_loop(
    path: &str,
    sink: FrameSender,
    running: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut dev = Device::with_path(path)?;

    let fourcc = v4l::FourCC::new(b"TOFD");
    let mut format = dev.format()?;
    format.width = FRAME_WIDTH as u32;
    format.height = FRAME_HEIGHT as u32;
    format.fourcc = fourcc;
    let actual = dev.set_format(&format)?;
    if actual.fourcc != fourcc {
        warn!(
            path,
            got = ?actual.fourcc,
            "Node did not accept the TOFD stream format"
        );
    }

    let mut stream = MmapStream::with_buffers(&mut dev, Type::VideoCapture, 4)?;
    info!(path, "V4L2 capture stream started");

    let header_len = std::mem::size_of::<RawFrameHeader>();
    let mut bad_frames = 0u64;
    let mut dropped = 0u64;

    while running.load(Ordering::SeqCst) {
        let (buf, _meta) = match stream.next() {
            Ok(item) => item,
            Err(e) => {
                warn!(path, error = %e, "Frame dequeue failed");
                std::thread::sleep(std::time::Duration::from_millis(10));
                continue;
            }
        };

        let Some(header) = RawFrameHeader::parse(buf) else {
            bad_frames += 1;
            if bad_frames % 30 == 1 {
                warn!(path, bad_frames, "Discarding frame with bad header");
            }
            continue;
        };
        let payload_len = header.payload_len();
        if buf.len() < header_len + payload_len {
            bad_frames += 1;
            if bad_frames % 30 == 1 {
                warn!(
                    path,
                    got = buf.len(),
                    expected = header_len + payload_len,
                    "Discarding short frame"
                );
            }
            continue;
        }

        let frame = RawFrame {
            header,
            payload: buf[header_len..header_len + payload_len].to_vec(),
        };
        match sink.try_send(frame) {
            Ok(()) => {}
            Err(std::sync::mpsc::TrySendError::Full(_)) => {
                dropped += 1;
                if dropped % 30 == 1 {
                    debug!(path, dropped, "Capture channel full, frame dropped");
                }
            }
            Err(std::sync::mpsc::TrySendError::Disconnected(_)) => break,
        }
    }

    info!(path, "V4L2 capture loop ended");
    Ok(())
}

/// QUERYCAP for driver/card identification
fn query_capability(fd: i32) -> Option<V4l2Capability> {
    let mut caps = V4l2Capability {
        driver: [0; 16],
        card: [0; 32],
        bus_info: [0; 32],
        version: 0,
        capabilities: 0,
        device_caps: 0,
        reserved: [0; 3],
    };
    let result = unsafe { libc::ioctl(fd, VIDIOC_QUERYCAP, &mut caps as *mut _) };
    (result == 0).then_some(caps)
}

/// Read a simple integer control
fn get_control(fd: i32, id: u32) -> Option<i32> {
    let mut ctrl = V4l2Control { id, value: 0 };
    let result = unsafe { libc::ioctl(fd, VIDIOC_G_CTRL, &mut ctrl as *mut _) };
    (result == 0).then_some(ctrl.value)
}

/// Write a simple integer control
fn set_control(fd: i32, id: u32, value: i32) -> std::io::Result<()> {
    let ctrl = V4l2Control { id, value };
    let result = unsafe { libc::ioctl(fd, VIDIOC_S_CTRL, &ctrl as *const _) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Read a fixed-size blob control via VIDIOC_G_EXT_CTRLS
fn read_blob_control<T: Pod + Zeroable>(fd: i32, id: u32) -> Option<T> {
    let mut value = T::zeroed();
    let mut ext_ctrl = V4l2ExtControl {
        id,
        size: std::mem::size_of::<T>() as u32,
        reserved2: [0],
        value_or_ptr: &mut value as *mut T as u64,
    };
    let mut ext_ctrls = V4l2ExtControls {
        which: TOF_CTRL_CLASS,
        count: 1,
        error_idx: 0,
        request_fd: 0,
        reserved: [0],
        controls: &mut ext_ctrl,
    };
    let result = unsafe { libc::ioctl(fd, VIDIOC_G_EXT_CTRLS, &mut ext_ctrls as *mut _) };
    if result == 0 {
        Some(value)
    } else {
        debug!(id, "Blob control not available");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_q16_16_lens_conversion() {
        let wire = WireLensCalibration {
            fx: 580 * 65536,
            fy: 580 * 65536,
            cx: 320 * 65536,
            cy: 240 * 65536,
            k1: -(65536 / 10),
            ..Default::default()
        };
        let lens = wire.to_lens();
        assert!((lens.intrinsics.fx - 580.0).abs() < 1e-3);
        assert!((lens.intrinsics.cy - 240.0).abs() < 1e-3);
        assert!((lens.distortion.k1 + 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_extrinsics_conversion() {
        let mut wire = WireExtrinsics::default();
        wire.rotation[0] = 1 << 30; // 1.0 in Q2.30
        wire.translation[0] = 25_000; // 25 mm in micrometers
        let ext = wire.to_extrinsics();
        assert!((ext.rotation[0] - 1.0).abs() < 1e-6);
        assert!((ext.translation[0] - 0.025).abs() < 1e-6);
    }

    #[test]
    fn test_every_param_has_a_distinct_cid() {
        let ids = [
            ParamId::DepthOffset,
            ParamId::AmplitudeThreshold,
            ParamId::ScatteringThreshold,
            ParamId::GuidedFilterEnable,
            ParamId::GuidedFilterEpsilon,
            ParamId::MedianFilterEnable,
            ParamId::FlyingPixelEnable,
            ParamId::FlyingPixelThreshold,
            ParamId::TnrEnable,
            ParamId::TnrRatio,
            ParamId::AutoExposure,
            ParamId::OperationMode,
            ParamId::Illumination,
            ParamId::MotionBlurThreshold,
            ParamId::DepthMode,
            ParamId::IrMode,
            ParamId::FrameRate,
        ];
        let mut cids: Vec<u32> = ids.iter().map(|&id| param_cid(id)).collect();
        cids.sort_unstable();
        cids.dedup();
        assert_eq!(cids.len(), ids.len());
    }
}
