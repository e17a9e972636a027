// SPDX-License-Identifier: GPL-3.0-only

//! Simulated transport
//!
//! Synthesizes a scrolling-ramp depth scene with a matching IR plane at
//! the configured frame rate, and backs every parameter register with an
//! in-memory map. Used by the test suite and by the CLI `--simulated`
//! flag on hosts without hardware.

use super::frame_loop::{CaptureLoop, LoopAction};
use super::{FrameSender, ParamId, RawFrame, Transport};
use crate::constants::{
    AMPLITUDE_MAX, AMPLITUDE_THRESHOLD_DEFAULT, DEPTH_RANGE_MAX_MM, DEPTH_RANGE_MIN_MM,
    FLYING_PIXEL_DEFAULT, FRAME_HEIGHT, FRAME_WIDTH, PRODUCT_ID_DEPTH, PRODUCT_ID_DEPTH_RGB,
    RAW_FRAME_MAGIC, SCATTERING_THRESHOLD_DEFAULT, SIM_PATH_PREFIX, VENDOR_ID,
};
use crate::errors::{DeviceError, DeviceResult};
use crate::geometry::{CalibrationData, LensCalibration};
use crate::wire::{
    DataFormat, DepthMode, DeviceInfo, DevicePath, DistortionParam, ExtrinsicParam, FrameRate,
    FrameType, IntrinsicParam, IrMode, OperationMode, RawFrameHeader, fill_fixed,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Depth-only product simulated when the device path names TF-M100
const PRODUCT_DEPTH_ONLY: &str = "TF-M100";

/// Depth+RGB product simulated by default
const PRODUCT_DEPTH_RGB: &str = "TF-C100";

/// Enumerate the simulated device
///
/// `start_index` continues the numbering after the real devices so
/// hardware keeps the low indices.
pub fn enumerate(start_index: u8) -> Vec<DevicePath> {
    vec![DevicePath::new(
        start_index,
        PRODUCT_DEPTH_RGB,
        &format!("{}{}", SIM_PATH_PREFIX, 0),
        DataFormat::Xyzi,
    )]
}

/// Simulated device transport
pub struct SimTransport {
    info: DeviceInfo,
    calibration: CalibrationData,
    registers: HashMap<ParamId, i32>,
    capture: Option<CaptureLoop>,
    /// Survives stream restarts so frame ids stay strictly increasing
    next_frame_id: Arc<AtomicI64>,
}

impl SimTransport {
    /// Open a simulated device
    ///
    /// The simulated product follows the requested product name: TF-M100
    /// behaves as a depth-only module, anything else as depth+RGB.
    pub fn open(path: &DevicePath) -> DeviceResult<Self> {
        let p = path.path();
        if !p.starts_with(SIM_PATH_PREFIX) {
            return Err(DeviceError::NotFound(format!(
                "{} is not a simulated device path",
                p
            )));
        }
        let depth_only = path.name() == PRODUCT_DEPTH_ONLY;
        info!(path = %p, depth_only, "Opening simulated device");

        Ok(Self {
            info: device_info(depth_only),
            calibration: calibration(depth_only),
            registers: default_registers(),
            capture: None,
            next_frame_id: Arc::new(AtomicI64::new(1)),
        })
    }
}

impl Transport for SimTransport {
    fn device_info(&self) -> DeviceResult<DeviceInfo> {
        Ok(self.info)
    }

    fn calibration(&self) -> DeviceResult<CalibrationData> {
        Ok(self.calibration.clone())
    }

    fn depth_range(&self) -> DeviceResult<(u16, u16)> {
        Ok((DEPTH_RANGE_MIN_MM, DEPTH_RANGE_MAX_MM))
    }

    fn read_param(&mut self, id: ParamId) -> DeviceResult<i32> {
        self.registers
            .get(&id)
            .copied()
            .ok_or_else(|| DeviceError::ReadFailed(format!("no register for {:?}", id)))
    }

    fn write_param(&mut self, id: ParamId, value: i32) -> DeviceResult<()> {
        // The firmware rejects the declared-but-unshipped raw modes
        if id == ParamId::DepthMode {
            let mode = DepthMode::try_from(value as u8).ok().filter(|m| m.is_supported());
            if mode.is_none() {
                return Err(DeviceError::Unsupported(format!(
                    "depth mode {} is not supported",
                    value
                )));
            }
        }
        self.registers.insert(id, value);
        Ok(())
    }

    fn start_stream(&mut self, sink: FrameSender) -> DeviceResult<()> {
        if self.capture.is_some() {
            return Err(DeviceError::Failed("stream already running".into()));
        }
        let mode = self.read_param(ParamId::OperationMode)?;
        if mode == OperationMode::Sleep as i32 {
            return Err(DeviceError::Failed("device is in sleep mode".into()));
        }

        let fps = FrameRate::try_from(self.read_param(ParamId::FrameRate)? as u8)
            .unwrap_or_default();
        let ir_mode = self.read_param(ParamId::IrMode)? as u8;
        let depth_offset = self.read_param(ParamId::DepthOffset)? as i32;
        let next_id = Arc::clone(&self.next_frame_id);

        self.capture = Some(CaptureLoop::spawn(
            "sim-capture",
            move || Ok(SceneState::new(sink, fps, ir_mode, depth_offset, next_id)),
            SceneState::produce_frame,
        ));
        debug!(fps = fps.fps(), "Simulated stream started");
        Ok(())
    }

    fn stop_stream(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
            debug!("Simulated stream stopped");
        }
    }
}

/// Capture-thread state for the synthetic scene
struct SceneState {
    sink: FrameSender,
    interval: Duration,
    ir_mode: u8,
    depth_offset: i32,
    next_id: Arc<AtomicI64>,
    integration_time: f32,
    dropped: u64,
}

impl SceneState {
    fn new(
        sink: FrameSender,
        fps: FrameRate,
        ir_mode: u8,
        depth_offset: i32,
        next_id: Arc<AtomicI64>,
    ) -> Self {
        // Longer integration at lower frame rates, like the real module
        let integration_time = match fps {
            FrameRate::Fps30 => 8.0,
            FrameRate::Fps15 => 12.0,
            FrameRate::Fps8 => 16.0,
        };
        Self {
            sink,
            interval: fps.interval(),
            ir_mode,
            depth_offset,
            next_id,
            integration_time,
            dropped: 0,
        }
    }

    fn produce_frame(&mut self) -> LoopAction {
        std::thread::sleep(self.interval);

        let frame_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = synthesize_frame(
            frame_id,
            self.ir_mode,
            self.depth_offset,
            self.integration_time,
        );

        match self.sink.try_send(frame) {
            Ok(()) => LoopAction::Continue,
            Err(std::sync::mpsc::TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped % 30 == 1 {
                    debug!(dropped = self.dropped, "Capture channel full, frame dropped");
                }
                LoopAction::Continue
            }
            // Receiver gone: the session stopped without telling us
            Err(std::sync::mpsc::TrySendError::Disconnected(_)) => LoopAction::Stop,
        }
    }
}

/// Build one synthetic frame: a diagonal depth ramp scrolling with the
/// frame counter, an IR plane correlated with it, and a sprinkling of
/// invalid (zero) depth samples
fn synthesize_frame(frame_id: i64, ir_mode: u8, depth_offset: i32, integration_time: f32) -> RawFrame {
    let width = FRAME_WIDTH as usize;
    let height = FRAME_HEIGHT as usize;
    let span = (DEPTH_RANGE_MAX_MM - DEPTH_RANGE_MIN_MM) as usize;
    let scroll = (frame_id as usize) * 8;

    let mut depth = vec![0u16; width * height];
    let mut ir = vec![0u16; width * height];
    for v in 0..height {
        for u in 0..width {
            let i = v * width + u;
            // Every 97th sample is left invalid, like edge dropouts
            if i % 97 == 0 {
                ir[i] = 3;
                continue;
            }
            let ramp = (u + v + scroll) % span;
            let d = DEPTH_RANGE_MIN_MM as i32 + ramp as i32 + depth_offset;
            depth[i] = d.clamp(0, u16::MAX as i32) as u16;
            // Nearer surfaces return more light
            ir[i] = (AMPLITUDE_MAX as usize - ramp * AMPLITUDE_MAX as usize / span) as u16;
        }
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let sensor_temp = 42.5 + ((frame_id % 20) as f32) * 0.05;
    let embedded = format!(
        "SIM id={} ts={} tint={:.1} mode={}",
        frame_id, timestamp, integration_time, ir_mode
    );

    let header = RawFrameHeader {
        magic: RAW_FRAME_MAGIC,
        frame_type: FrameType::DepthIr as u8,
        ir_mode,
        width: FRAME_WIDTH,
        height: FRAME_HEIGHT,
        reserved: 0,
        integration_time,
        frame_id,
        timestamp,
        sensor_temp,
        ld_temp: sensor_temp - 4.0,
        embedded_line: fill_fixed(&embedded),
    };

    let mut payload = Vec::with_capacity(width * height * 4);
    payload.extend_from_slice(bytemuck::cast_slice(&depth));
    payload.extend_from_slice(bytemuck::cast_slice(&ir));

    RawFrame { header, payload }
}

fn device_info(depth_only: bool) -> DeviceInfo {
    let (product, product_id, device_type) = if depth_only {
        (PRODUCT_DEPTH_ONLY, PRODUCT_ID_DEPTH, 0)
    } else {
        (PRODUCT_DEPTH_RGB, PRODUCT_ID_DEPTH_RGB, 1)
    };
    DeviceInfo {
        vendor_name: fill_fixed("tofcam"),
        device_name: fill_fixed("TF ToF module"),
        product_name: fill_fixed(product),
        serial_number: fill_fixed("SIM0000001"),
        firmware_version: [5, 1, 2, 0, 42],
        reserved: 0,
        vendor_id: VENDOR_ID,
        product_id,
        device_type,
        width: FRAME_WIDTH,
        height: FRAME_HEIGHT,
    }
}

fn calibration(depth_only: bool) -> CalibrationData {
    let depth = LensCalibration {
        intrinsics: IntrinsicParam {
            fx: 580.0,
            fy: 580.0,
            cx: 320.0,
            cy: 240.0,
        },
        distortion: DistortionParam {
            k1: -0.086,
            k2: 0.031,
            k3: -0.004,
            p1: 0.0007,
            p2: -0.0002,
            skew: 0.0,
        },
    };
    if depth_only {
        return CalibrationData {
            depth,
            color: None,
            extrinsics: None,
        };
    }

    let color = LensCalibration {
        intrinsics: IntrinsicParam {
            fx: 602.0,
            fy: 602.0,
            cx: 331.5,
            cy: 243.2,
        },
        distortion: DistortionParam {
            k1: 0.042,
            k2: -0.117,
            k3: 0.009,
            p1: -0.0003,
            p2: 0.0009,
            skew: 0.0,
        },
    };
    // Color camera sits 25 mm to the side of the depth lens
    let mut rotation = [0.0f32; 9];
    rotation[0] = 1.0;
    rotation[4] = 1.0;
    rotation[8] = 1.0;
    let extrinsics = ExtrinsicParam {
        rotation,
        translation: [0.025, 0.0, 0.0],
    };

    CalibrationData {
        depth,
        color: Some(color),
        extrinsics: Some(extrinsics),
    }
}

fn default_registers() -> HashMap<ParamId, i32> {
    let mut regs = HashMap::new();
    regs.insert(ParamId::DepthOffset, 0);
    regs.insert(ParamId::AmplitudeThreshold, AMPLITUDE_THRESHOLD_DEFAULT as i32);
    regs.insert(ParamId::ScatteringThreshold, SCATTERING_THRESHOLD_DEFAULT as i32);
    regs.insert(ParamId::GuidedFilterEnable, 0);
    regs.insert(ParamId::GuidedFilterEpsilon, 1);
    regs.insert(ParamId::MedianFilterEnable, 0);
    regs.insert(ParamId::FlyingPixelEnable, 1);
    regs.insert(ParamId::FlyingPixelThreshold, FLYING_PIXEL_DEFAULT as i32);
    regs.insert(ParamId::TnrEnable, 1);
    regs.insert(ParamId::TnrRatio, 500);
    regs.insert(ParamId::AutoExposure, 1);
    // Power-on state is sleep; connect moves the device to retention
    regs.insert(ParamId::OperationMode, OperationMode::Sleep as i32);
    regs.insert(ParamId::Illumination, 1);
    regs.insert(ParamId::MotionBlurThreshold, 0);
    regs.insert(ParamId::DepthMode, DepthMode::DepthIr as i32);
    regs.insert(ParamId::IrMode, IrMode::Amplitude as i32);
    regs.insert(ParamId::FrameRate, FrameRate::Fps30 as i32);
    regs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FRAME_CHANNEL_CAPACITY;
    use std::sync::mpsc;

    fn open_sim() -> SimTransport {
        let paths = enumerate(0);
        SimTransport::open(&paths[0]).unwrap()
    }

    #[test]
    fn test_open_rejects_real_paths() {
        let path = DevicePath::new(0, "TF-M100", "/dev/video0", DataFormat::Xyzi);
        assert!(SimTransport::open(&path).is_err());
    }

    #[test]
    fn test_register_round_trip() {
        let mut sim = open_sim();
        sim.write_param(ParamId::DepthOffset, 123).unwrap();
        assert_eq!(sim.read_param(ParamId::DepthOffset).unwrap(), 123);
    }

    #[test]
    fn test_raw_modes_rejected() {
        let mut sim = open_sim();
        let err = sim
            .write_param(ParamId::DepthMode, DepthMode::RawPhase as i32)
            .unwrap_err();
        assert_eq!(err.code(), -7);
    }

    #[test]
    fn test_sleep_mode_blocks_stream() {
        let mut sim = open_sim();
        let (tx, _rx) = mpsc::sync_channel(FRAME_CHANNEL_CAPACITY);
        // Power-on default is sleep mode
        assert!(sim.start_stream(tx).is_err());
    }

    #[test]
    fn test_stream_delivers_increasing_frame_ids() {
        let mut sim = open_sim();
        sim.write_param(ParamId::OperationMode, OperationMode::Retention as i32)
            .unwrap();
        let (tx, rx) = mpsc::sync_channel(FRAME_CHANNEL_CAPACITY);
        sim.start_stream(tx).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        sim.stop_stream();

        assert_eq!(first.header.magic, RAW_FRAME_MAGIC);
        assert_eq!(first.payload.len(), first.header.payload_len());
        assert!(second.header.frame_id > first.header.frame_id);
    }

    #[test]
    fn test_synthetic_frame_has_invalid_samples() {
        let frame = synthesize_frame(7, 0, 0, 8.0);
        let plane = crate::constants::FRAME_PIXELS * 2;
        // The payload byte buffer is not u16 aligned, decode explicitly
        let depth: Vec<u16> = frame.payload[..plane]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(depth[0], 0);
        assert!(depth.iter().any(|&d| d >= DEPTH_RANGE_MIN_MM));
    }
}
