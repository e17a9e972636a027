// SPDX-License-Identifier: GPL-3.0-only

//! Device transport abstraction
//!
//! The session never talks to hardware directly; it owns a boxed
//! [`Transport`] so the device layer is swappable:
//!
//! ```text
//! ┌──────────────────┐
//! │  DeviceSession   │  ← public SDK facade
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  Transport trait │  ← identity, registers, raw frame stream
//! └────────┬─────────┘
//!          │
//!     ┌────┴─────┐
//!     ▼          ▼
//! ┌───────┐  ┌───────┐
//! │ v4l2  │  │  sim  │
//! └───────┘  └───────┘
//! ```
//!
//! `v4l2` drives real TF-series modules through the kernel UVC node; `sim`
//! synthesizes frames and registers for tests and hardware-free hosts.

pub mod frame_loop;
pub mod sim;
pub mod v4l2;

use crate::constants::SIM_PATH_PREFIX;
use crate::errors::DeviceResult;
use crate::geometry::CalibrationData;
use crate::wire::{DeviceInfo, DevicePath, RawFrameHeader};
use std::sync::mpsc::{Receiver, SyncSender};

/// Register-style parameter identifiers understood by every transport
///
/// Enable flags and coefficients are distinct registers; disabling a
/// filter leaves its last coefficient in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    DepthOffset,
    AmplitudeThreshold,
    ScatteringThreshold,
    GuidedFilterEnable,
    GuidedFilterEpsilon,
    MedianFilterEnable,
    FlyingPixelEnable,
    FlyingPixelThreshold,
    TnrEnable,
    /// Blend ratio in thousandths (0..=1000)
    TnrRatio,
    AutoExposure,
    OperationMode,
    Illumination,
    MotionBlurThreshold,
    DepthMode,
    IrMode,
    FrameRate,
}

/// One frame as delivered by a transport capture stream
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub header: RawFrameHeader,
    /// Depth plane then IR plane, little-endian u16 samples
    pub payload: Vec<u8>,
}

/// Sending side of the capture channel, held by the transport
pub type FrameSender = SyncSender<RawFrame>;

/// Receiving side of the capture channel, drained by the session
pub type FrameReceiver = Receiver<RawFrame>;

/// Owned handle to one physical or simulated device
///
/// Implementations hold the open device node and the capture thread.
/// `Transport` is object safe; sessions store a `Box<dyn Transport>`.
pub trait Transport: Send {
    /// Static identity record read from the device
    fn device_info(&self) -> DeviceResult<DeviceInfo>;

    /// Factory calibration block
    fn calibration(&self) -> DeviceResult<CalibrationData>;

    /// Measurable depth range as (min mm, max mm)
    fn depth_range(&self) -> DeviceResult<(u16, u16)>;

    /// Read one parameter register
    fn read_param(&mut self, id: ParamId) -> DeviceResult<i32>;

    /// Write one parameter register
    fn write_param(&mut self, id: ParamId, value: i32) -> DeviceResult<()>;

    /// Start the capture stream, delivering raw frames into `sink`
    ///
    /// Frames that do not fit the channel are dropped by the capture
    /// thread; the newest frame always wins.
    fn start_stream(&mut self, sink: FrameSender) -> DeviceResult<()>;

    /// Stop the capture stream and join the capture thread. Idempotent.
    fn stop_stream(&mut self);
}

/// Enumerate attached TF-series devices
///
/// Returns an empty vec when nothing is attached. With
/// `include_simulated`, a simulated device is appended after the real
/// ones so hardware keeps the low indices.
pub fn discover(include_simulated: bool) -> Vec<DevicePath> {
    let mut devices = v4l2::enumerate();
    if include_simulated {
        devices.extend(sim::enumerate(devices.len() as u8));
    }
    devices
}

/// Open the transport matching a discovered device path
pub fn open(path: &DevicePath) -> DeviceResult<Box<dyn Transport>> {
    if path.path().starts_with(SIM_PATH_PREFIX) {
        Ok(Box::new(sim::SimTransport::open(path)?))
    } else {
        Ok(Box::new(v4l2::V4l2Transport::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::DataFormat;

    #[test]
    fn test_discover_simulated_appends_entry() {
        let with_sim = discover(true);
        let without = discover(false);
        assert_eq!(with_sim.len(), without.len() + 1);
        let sim = with_sim.last().unwrap();
        assert!(sim.path().starts_with(SIM_PATH_PREFIX));
    }

    #[test]
    fn test_open_unknown_path_is_not_found() {
        let path = DevicePath::new(0, "TF-M100", "/dev/null", DataFormat::Xyzi);
        assert!(open(&path).is_err());
    }
}
