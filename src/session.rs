// SPDX-License-Identifier: GPL-3.0-only

//! Device session facade
//!
//! One [`DeviceSession`] represents one connected camera. It owns the
//! transport handle, the identity and calibration records read at connect
//! time, and the [`FilterSettings`] configuration record. All operations
//! take `&mut self`; a session is `Send` but callers must serialize
//! access to one instance.
//!
//! Lifecycle: constructed → connected → streaming → stopped →
//! disconnected. `stop` and `disconnect` are idempotent; `start` succeeds
//! exactly once per connect/stop cycle.

use crate::config::{FilterSettings, SessionConfig};
use crate::constants::{
    AMPLITUDE_THRESHOLD_RANGE, DEPTH_OFFSET_RANGE, FLYING_PIXEL_RANGE, FRAME_CHANNEL_CAPACITY,
    FRAME_PIXELS, GUIDED_EPSILON_RANGE, MOTION_BLUR_RANGE, READ_TIMEOUT,
    SCATTERING_THRESHOLD_RANGE, TNR_RATIO_RANGE, TNR_RATIO_SCALE,
};
use crate::errors::{DeviceError, DeviceResult};
use crate::geometry::{CalibrationData, LensCalibration};
use crate::pointcloud;
use crate::transport::{self, FrameReceiver, ParamId, RawFrame, Transport};
use crate::wire::{
    CloudPoint, DepthMode, DeviceInfo, DevicePath, ExtrinsicParam, FrameInfo, FrameRate,
    FrameType, IrMode, OperationMode,
};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::mpsc;
use tracing::{debug, info};

/// Session facade for one ToF camera
pub struct DeviceSession {
    transport: Option<Box<dyn Transport>>,
    streaming: bool,
    device_info: Option<DeviceInfo>,
    calibration: Option<CalibrationData>,
    depth_range: (u16, u16),
    filters: FilterSettings,
    depth_mode: DepthMode,
    ir_mode: IrMode,
    frame_rx: Option<FrameReceiver>,
    last_frame_id: i64,
    depth_scratch: Vec<u16>,
    ir_scratch: Vec<u16>,
}

impl DeviceSession {
    /// Create a session with no device attached
    ///
    /// Allocates the internal plane buffers; performs no device I/O.
    pub fn new() -> Self {
        Self {
            transport: None,
            streaming: false,
            device_info: None,
            calibration: None,
            depth_range: (0, 0),
            filters: FilterSettings::default(),
            depth_mode: DepthMode::DepthIr,
            ir_mode: IrMode::Amplitude,
            frame_rx: None,
            last_frame_id: 0,
            depth_scratch: vec![0; FRAME_PIXELS],
            ir_scratch: vec![0; FRAME_PIXELS],
        }
    }

    // ===== Lifecycle =====

    /// Connect to a discovered device and initialize its parameters
    ///
    /// Opens the transport, reads identity and calibration, moves the
    /// device to retention mode and pushes the session's filter settings
    /// and output modes down to it.
    pub fn connect(&mut self, path: &DevicePath) -> DeviceResult<()> {
        if self.transport.is_some() {
            return Err(DeviceError::Failed("session is already connected".into()));
        }

        let mut transport = transport::open(path)?;
        let device_info = transport.device_info()?;
        let calibration = transport.calibration()?;
        let depth_range = transport.depth_range()?;

        transport.write_param(ParamId::OperationMode, OperationMode::Retention as i32)?;

        info!(
            device = %path.path(),
            product = %device_info.product(),
            serial = %device_info.serial(),
            "Connected"
        );

        self.transport = Some(transport);
        self.device_info = Some(device_info);
        self.calibration = Some(calibration);
        self.depth_range = depth_range;
        self.last_frame_id = 0;

        let filters = self.filters.clone();
        let (depth_mode, ir_mode) = (self.depth_mode, self.ir_mode);
        if let Err(e) = self
            .write_filters(&filters)
            .and_then(|_| self.write_modes(depth_mode, ir_mode))
        {
            self.disconnect();
            return Err(e);
        }
        Ok(())
    }

    /// Release the device. Idempotent; stops streaming first if needed.
    pub fn disconnect(&mut self) {
        if self.streaming {
            if let Some(transport) = self.transport.as_mut() {
                transport.stop_stream();
            }
            self.streaming = false;
            self.frame_rx = None;
        }
        if self.transport.take().is_some() {
            info!("Disconnected");
        }
        self.device_info = None;
        self.calibration = None;
        self.depth_range = (0, 0);
    }

    /// True while a device is connected
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// True while the capture stream is running
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    // ===== Streaming =====

    /// Start frame acquisition
    ///
    /// Fails with [`DeviceError::NotOpened`] before connect, and with
    /// [`DeviceError::Failed`] when already streaming or when the device
    /// is in sleep mode.
    pub fn start(&mut self) -> DeviceResult<()> {
        if self.streaming {
            return Err(DeviceError::Failed("stream already started".into()));
        }
        let transport = self.transport.as_mut().ok_or(DeviceError::NotOpened)?;

        let mode = transport.read_param(ParamId::OperationMode)?;
        if mode == OperationMode::Sleep as i32 {
            return Err(DeviceError::Failed(
                "device is in sleep mode; set retention or active mode first".into(),
            ));
        }

        let (tx, rx) = mpsc::sync_channel(FRAME_CHANNEL_CAPACITY);
        transport.start_stream(tx)?;
        self.frame_rx = Some(rx);
        self.streaming = true;
        debug!("Stream started");
        Ok(())
    }

    /// Stop frame acquisition. Idempotent while connected.
    pub fn stop(&mut self) -> DeviceResult<()> {
        let transport = self.transport.as_mut().ok_or(DeviceError::NotOpened)?;
        if self.streaming {
            transport.stop_stream();
            self.streaming = false;
            self.frame_rx = None;
            debug!("Stream stopped");
        }
        Ok(())
    }

    /// Read the newest depth + IR frame into caller buffers
    ///
    /// Both buffers must hold exactly width*height samples; on any error
    /// they are left untouched. Blocks until a fresh frame arrives or the
    /// read timeout elapses.
    pub fn read_depth_ir_frame(
        &mut self,
        depth: &mut [u16],
        ir: &mut [u16],
    ) -> DeviceResult<FrameInfo> {
        self.ensure_streaming()?;
        if self.depth_mode != DepthMode::DepthIr {
            return Err(DeviceError::Unsupported(
                "session is in point-cloud output mode".into(),
            ));
        }
        let pixels = self.frame_pixels()?;
        if depth.len() != pixels || ir.len() != pixels {
            return Err(DeviceError::InvalidParam(format!(
                "buffers must hold {} samples (depth: {}, ir: {})",
                pixels,
                depth.len(),
                ir.len()
            )));
        }

        let frame = self.next_frame()?;
        check_frame_dims(&frame, pixels)?;
        let plane = pixels * 2;
        bytemuck::cast_slice_mut::<u16, u8>(depth).copy_from_slice(&frame.payload[..plane]);
        bytemuck::cast_slice_mut::<u16, u8>(ir).copy_from_slice(&frame.payload[plane..plane * 2]);
        Ok(frame.header.frame_info())
    }

    /// Read the newest frame as a point cloud into a caller buffer
    ///
    /// The buffer must hold exactly width*height points, one per pixel;
    /// invalid depth samples produce all-zero points.
    pub fn read_point_cloud_frame(
        &mut self,
        points: &mut [CloudPoint],
    ) -> DeviceResult<FrameInfo> {
        self.ensure_streaming()?;
        if self.depth_mode != DepthMode::PointCloud {
            return Err(DeviceError::Unsupported(
                "session is in depth/IR output mode".into(),
            ));
        }
        let pixels = self.frame_pixels()?;
        if points.len() != pixels {
            return Err(DeviceError::InvalidParam(format!(
                "point buffer must hold {} samples, got {}",
                pixels,
                points.len()
            )));
        }
        let intrinsics = self
            .calibration
            .as_ref()
            .ok_or(DeviceError::NotOpened)?
            .depth
            .intrinsics;
        let max_depth = self.depth_range.1;

        let frame = self.next_frame()?;
        check_frame_dims(&frame, pixels)?;
        let plane = pixels * 2;
        bytemuck::cast_slice_mut::<u16, u8>(&mut self.depth_scratch[..pixels])
            .copy_from_slice(&frame.payload[..plane]);
        bytemuck::cast_slice_mut::<u16, u8>(&mut self.ir_scratch[..pixels])
            .copy_from_slice(&frame.payload[plane..plane * 2]);

        let width = frame.header.width as u32;
        pointcloud::fill_cloud(
            &self.depth_scratch[..pixels],
            &self.ir_scratch[..pixels],
            width,
            &intrinsics,
            max_depth,
            points,
        );

        let mut info = frame.header.frame_info();
        info.frame_type = FrameType::PointCloud as i32;
        Ok(info)
    }

    // ===== Filter parameters =====

    /// Set the global depth offset (mm)
    pub fn set_depth_offset(&mut self, offset_mm: i16) -> DeviceResult<()> {
        check_range("depth offset", offset_mm, DEPTH_OFFSET_RANGE)?;
        self.write_param(ParamId::DepthOffset, offset_mm as i32)?;
        self.filters.depth_offset = offset_mm;
        Ok(())
    }

    /// Current global depth offset (mm)
    pub fn get_depth_offset(&mut self) -> DeviceResult<i16> {
        Ok(self.read_param(ParamId::DepthOffset)? as i16)
    }

    /// Set the amplitude check threshold for discarding weak pixels
    pub fn set_amplitude_threshold(&mut self, threshold: u16) -> DeviceResult<()> {
        check_range("amplitude threshold", threshold, AMPLITUDE_THRESHOLD_RANGE)?;
        self.write_param(ParamId::AmplitudeThreshold, threshold as i32)?;
        self.filters.amplitude_threshold = threshold;
        Ok(())
    }

    /// Current amplitude check threshold
    pub fn get_amplitude_threshold(&mut self) -> DeviceResult<u16> {
        Ok(self.read_param(ParamId::AmplitudeThreshold)? as u16)
    }

    /// Set the scattering check threshold for discarding scattered pixels
    pub fn set_scattering_threshold(&mut self, threshold: u16) -> DeviceResult<()> {
        check_range("scattering threshold", threshold, SCATTERING_THRESHOLD_RANGE)?;
        self.write_param(ParamId::ScatteringThreshold, threshold as i32)?;
        self.filters.scattering_threshold = threshold;
        Ok(())
    }

    /// Current scattering check threshold
    pub fn get_scattering_threshold(&mut self) -> DeviceResult<u16> {
        Ok(self.read_param(ParamId::ScatteringThreshold)? as u16)
    }

    /// Enable the guided filter with the given epsilon coefficient
    pub fn set_guided_filter(&mut self, epsilon: u16) -> DeviceResult<()> {
        check_range("guided filter epsilon", epsilon, GUIDED_EPSILON_RANGE)?;
        self.write_param(ParamId::GuidedFilterEpsilon, epsilon as i32)?;
        self.write_param(ParamId::GuidedFilterEnable, 1)?;
        self.filters.guided_filter = Some(epsilon);
        Ok(())
    }

    /// Disable the guided filter
    pub fn clear_guided_filter(&mut self) -> DeviceResult<()> {
        self.write_param(ParamId::GuidedFilterEnable, 0)?;
        self.filters.guided_filter = None;
        Ok(())
    }

    /// Enable the 3x3 spatial median filter
    pub fn set_median_filter(&mut self) -> DeviceResult<()> {
        self.write_param(ParamId::MedianFilterEnable, 1)?;
        self.filters.median_filter = true;
        Ok(())
    }

    /// Disable the 3x3 spatial median filter
    pub fn clear_median_filter(&mut self) -> DeviceResult<()> {
        self.write_param(ParamId::MedianFilterEnable, 0)?;
        self.filters.median_filter = false;
        Ok(())
    }

    /// Enable flying-pixel removal with the given edge check threshold
    pub fn set_flying_pixel_filter(&mut self, edge_threshold: u16) -> DeviceResult<()> {
        check_range("flying pixel threshold", edge_threshold, FLYING_PIXEL_RANGE)?;
        self.write_param(ParamId::FlyingPixelThreshold, edge_threshold as i32)?;
        self.write_param(ParamId::FlyingPixelEnable, 1)?;
        self.filters.flying_pixel_filter = Some(edge_threshold);
        Ok(())
    }

    /// Disable flying-pixel removal
    pub fn clear_flying_pixel_filter(&mut self) -> DeviceResult<()> {
        self.write_param(ParamId::FlyingPixelEnable, 0)?;
        self.filters.flying_pixel_filter = None;
        Ok(())
    }

    /// Enable temporal noise reduction with the given blend ratio (0..=1)
    pub fn set_tnr_filter(&mut self, ratio: f32) -> DeviceResult<()> {
        check_range("TNR ratio", ratio, TNR_RATIO_RANGE)?;
        let scaled = (ratio * TNR_RATIO_SCALE).round() as i32;
        self.write_param(ParamId::TnrRatio, scaled)?;
        self.write_param(ParamId::TnrEnable, 1)?;
        self.filters.tnr_filter = Some(ratio);
        Ok(())
    }

    /// Disable temporal noise reduction
    pub fn clear_tnr_filter(&mut self) -> DeviceResult<()> {
        self.write_param(ParamId::TnrEnable, 0)?;
        self.filters.tnr_filter = None;
        Ok(())
    }

    /// Enable or disable auto exposure
    pub fn set_auto_exposure(&mut self, enable: bool) -> DeviceResult<()> {
        self.write_param(ParamId::AutoExposure, enable as i32)?;
        self.filters.auto_exposure = enable;
        Ok(())
    }

    /// Set the device operation mode
    ///
    /// Streaming can only be started from Active or Retention mode.
    pub fn set_operation_mode(&mut self, mode: OperationMode) -> DeviceResult<()> {
        self.write_param(ParamId::OperationMode, mode as i32)
    }

    /// Current device operation mode
    pub fn get_operation_mode(&mut self) -> DeviceResult<OperationMode> {
        OperationMode::try_from(self.read_param(ParamId::OperationMode)? as u8)
    }

    /// Switch the illumination (laser diode) on or off
    pub fn set_illumination(&mut self, enable: bool) -> DeviceResult<()> {
        self.write_param(ParamId::Illumination, enable as i32)?;
        self.filters.illumination = enable;
        Ok(())
    }

    /// Current illumination state
    pub fn get_illumination(&mut self) -> DeviceResult<bool> {
        Ok(self.read_param(ParamId::Illumination)? != 0)
    }

    /// Set the motion blur check threshold
    pub fn set_motion_blur_threshold(&mut self, threshold: u16) -> DeviceResult<()> {
        check_range("motion blur threshold", threshold, MOTION_BLUR_RANGE)?;
        self.write_param(ParamId::MotionBlurThreshold, threshold as i32)?;
        self.filters.motion_blur_threshold = threshold;
        Ok(())
    }

    /// Current motion blur check threshold
    pub fn get_motion_blur_threshold(&mut self) -> DeviceResult<u16> {
        Ok(self.read_param(ParamId::MotionBlurThreshold)? as u16)
    }

    // ===== Output modes =====

    /// Select the depth output mode
    ///
    /// Rejected while streaming; the raw phase/data modes are declared in
    /// the wire contract but unsupported.
    pub fn set_depth_mode(&mut self, mode: DepthMode) -> DeviceResult<()> {
        if !mode.is_supported() {
            return Err(DeviceError::Unsupported(format!(
                "depth mode {:?} is not supported",
                mode
            )));
        }
        if self.streaming {
            return Err(DeviceError::Failed(
                "stop the stream before changing the output mode".into(),
            ));
        }
        self.write_param(ParamId::DepthMode, mode as i32)?;
        self.depth_mode = mode;
        Ok(())
    }

    /// Switch to point-cloud output (disables depth/IR reads)
    pub fn set_point_cloud_mode(&mut self) -> DeviceResult<()> {
        self.set_depth_mode(DepthMode::PointCloud)
    }

    /// Switch back to depth/IR output
    pub fn clear_point_cloud_mode(&mut self) -> DeviceResult<()> {
        self.set_depth_mode(DepthMode::DepthIr)
    }

    /// Current depth output mode
    pub fn get_depth_mode(&self) -> DepthMode {
        self.depth_mode
    }

    /// Select the IR plane content (amplitude or intensity)
    pub fn set_ir_mode(&mut self, mode: IrMode) -> DeviceResult<()> {
        self.write_param(ParamId::IrMode, mode as i32)?;
        self.ir_mode = mode;
        Ok(())
    }

    /// Current IR plane content
    pub fn get_ir_mode(&mut self) -> DeviceResult<IrMode> {
        IrMode::try_from(self.read_param(ParamId::IrMode)? as u8)
    }

    /// Set the acquisition frame rate
    pub fn set_frame_rate(&mut self, rate: FrameRate) -> DeviceResult<()> {
        self.write_param(ParamId::FrameRate, rate as i32)
    }

    /// Current acquisition frame rate
    pub fn get_frame_rate(&mut self) -> DeviceResult<FrameRate> {
        FrameRate::try_from(self.read_param(ParamId::FrameRate)? as u8)
    }

    // ===== Identity and calibration =====

    /// Static identity record read at connect time
    pub fn device_info(&self) -> DeviceResult<&DeviceInfo> {
        self.device_info.as_ref().ok_or(DeviceError::NotOpened)
    }

    /// Firmware version bytes
    pub fn get_firmware_version(&self) -> DeviceResult<[u8; 5]> {
        Ok(self.device_info()?.firmware_version)
    }

    /// Device serial number
    pub fn get_serial_number(&self) -> DeviceResult<String> {
        Ok(self.device_info()?.serial())
    }

    /// Product name
    pub fn get_product_name(&self) -> DeviceResult<String> {
        Ok(self.device_info()?.product())
    }

    /// Measurable depth range as (min mm, max mm)
    pub fn get_depth_range(&self) -> DeviceResult<(u16, u16)> {
        if self.transport.is_none() {
            return Err(DeviceError::NotOpened);
        }
        Ok(self.depth_range)
    }

    /// Depth lens intrinsics and distortion
    pub fn get_depth_lens(&self) -> DeviceResult<LensCalibration> {
        Ok(self.calibration()?.depth)
    }

    /// Color lens intrinsics and distortion (depth+RGB devices only)
    pub fn get_color_lens(&self) -> DeviceResult<LensCalibration> {
        self.calibration()?.color.ok_or_else(|| {
            DeviceError::Unsupported("depth-only device has no color camera".into())
        })
    }

    /// Depth-to-color extrinsic transform (depth+RGB devices only)
    pub fn get_extrinsics(&self) -> DeviceResult<ExtrinsicParam> {
        self.calibration()?.extrinsics.ok_or_else(|| {
            DeviceError::Unsupported("depth-only device has no color camera".into())
        })
    }

    // ===== Configuration record =====

    /// Snapshot of the session's filter configuration record
    pub fn filter_settings(&self) -> &FilterSettings {
        &self.filters
    }

    /// Apply a saved configuration to the connected device
    ///
    /// Every value is validated first; nothing is written unless the
    /// whole record is valid, so the device and the session record never
    /// diverge halfway.
    pub fn apply_config(&mut self, config: &SessionConfig) -> DeviceResult<()> {
        if self.transport.is_none() {
            return Err(DeviceError::NotOpened);
        }
        validate_filters(&config.filters)?;
        if !config.depth_mode.is_supported() {
            return Err(DeviceError::Unsupported(format!(
                "depth mode {:?} is not supported",
                config.depth_mode
            )));
        }
        if self.streaming && config.depth_mode != self.depth_mode {
            return Err(DeviceError::Failed(
                "stop the stream before changing the output mode".into(),
            ));
        }

        self.write_filters(&config.filters)?;
        self.write_modes(config.depth_mode, config.ir_mode)?;
        self.write_param(ParamId::FrameRate, config.frame_rate as i32)?;
        self.filters = config.filters.clone();
        self.depth_mode = config.depth_mode;
        self.ir_mode = config.ir_mode;
        info!("Applied session config");
        Ok(())
    }

    // ===== Internals =====

    fn calibration(&self) -> DeviceResult<&CalibrationData> {
        self.calibration.as_ref().ok_or(DeviceError::NotOpened)
    }

    fn ensure_streaming(&self) -> DeviceResult<()> {
        if self.transport.is_none() {
            return Err(DeviceError::NotOpened);
        }
        if !self.streaming {
            return Err(DeviceError::GetFrameFailed("stream not started".into()));
        }
        Ok(())
    }

    fn frame_pixels(&self) -> DeviceResult<usize> {
        let info = self.device_info()?;
        Ok(info.width as usize * info.height as usize)
    }

    fn write_param(&mut self, id: ParamId, value: i32) -> DeviceResult<()> {
        self.transport
            .as_mut()
            .ok_or(DeviceError::NotOpened)?
            .write_param(id, value)
    }

    fn read_param(&mut self, id: ParamId) -> DeviceResult<i32> {
        self.transport
            .as_mut()
            .ok_or(DeviceError::NotOpened)?
            .read_param(id)
    }

    /// Push a validated filter record down to the device
    fn write_filters(&mut self, filters: &FilterSettings) -> DeviceResult<()> {
        validate_filters(filters)?;
        self.write_param(ParamId::DepthOffset, filters.depth_offset as i32)?;
        self.write_param(
            ParamId::AmplitudeThreshold,
            filters.amplitude_threshold as i32,
        )?;
        self.write_param(
            ParamId::ScatteringThreshold,
            filters.scattering_threshold as i32,
        )?;
        if let Some(epsilon) = filters.guided_filter {
            self.write_param(ParamId::GuidedFilterEpsilon, epsilon as i32)?;
        }
        self.write_param(
            ParamId::GuidedFilterEnable,
            filters.guided_filter.is_some() as i32,
        )?;
        self.write_param(ParamId::MedianFilterEnable, filters.median_filter as i32)?;
        if let Some(threshold) = filters.flying_pixel_filter {
            self.write_param(ParamId::FlyingPixelThreshold, threshold as i32)?;
        }
        self.write_param(
            ParamId::FlyingPixelEnable,
            filters.flying_pixel_filter.is_some() as i32,
        )?;
        if let Some(ratio) = filters.tnr_filter {
            self.write_param(ParamId::TnrRatio, (ratio * TNR_RATIO_SCALE).round() as i32)?;
        }
        self.write_param(ParamId::TnrEnable, filters.tnr_filter.is_some() as i32)?;
        self.write_param(ParamId::AutoExposure, filters.auto_exposure as i32)?;
        self.write_param(ParamId::Illumination, filters.illumination as i32)?;
        self.write_param(
            ParamId::MotionBlurThreshold,
            filters.motion_blur_threshold as i32,
        )?;
        Ok(())
    }

    fn write_modes(&mut self, depth_mode: DepthMode, ir_mode: IrMode) -> DeviceResult<()> {
        self.write_param(ParamId::DepthMode, depth_mode as i32)?;
        self.write_param(ParamId::IrMode, ir_mode as i32)?;
        self.depth_mode = depth_mode;
        self.ir_mode = ir_mode;
        Ok(())
    }

    /// Wait for the newest frame, draining any queued backlog
    ///
    /// Frame ids are strictly increasing per session; frames with stale
    /// ids are discarded.
    fn next_frame(&mut self) -> DeviceResult<RawFrame> {
        let rx = self.frame_rx.as_ref().ok_or(DeviceError::NotOpened)?;

        let mut newest = None;
        while let Ok(frame) = rx.try_recv() {
            newest = Some(frame);
        }
        let mut frame = match newest {
            Some(frame) => frame,
            None => rx.recv_timeout(READ_TIMEOUT).map_err(|_| {
                DeviceError::GetFrameFailed("timed out waiting for a frame".into())
            })?,
        };
        while frame.header.frame_id <= self.last_frame_id {
            frame = rx.recv_timeout(READ_TIMEOUT).map_err(|_| {
                DeviceError::GetFrameFailed("timed out waiting for a fresh frame".into())
            })?;
        }
        if frame.payload.len() != frame.header.payload_len() {
            return Err(DeviceError::GetFrameFailed(format!(
                "payload size mismatch: {} vs {}",
                frame.payload.len(),
                frame.header.payload_len()
            )));
        }
        self.last_frame_id = frame.header.frame_id;
        Ok(frame)
    }
}

impl Default for DeviceSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("connected", &self.is_connected())
            .field("streaming", &self.streaming)
            .field("depth_mode", &self.depth_mode)
            .field("last_frame_id", &self.last_frame_id)
            .finish()
    }
}

/// Reject frames whose declared dimensions disagree with the device record
fn check_frame_dims(frame: &RawFrame, pixels: usize) -> DeviceResult<()> {
    let frame_pixels = frame.header.width as usize * frame.header.height as usize;
    if frame_pixels != pixels {
        return Err(DeviceError::GetFrameFailed(format!(
            "frame is {}x{}, device reports {} pixels",
            frame.header.width, frame.header.height, pixels
        )));
    }
    Ok(())
}

/// Range check shared by every setter; violations never touch the device
fn check_range<T>(param: &'static str, value: T, range: RangeInclusive<T>) -> DeviceResult<()>
where
    T: PartialOrd + fmt::Display + fmt::Debug + Copy,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(DeviceError::out_of_range(param, value, range))
    }
}

/// Validate a whole filter record before any register write
fn validate_filters(filters: &FilterSettings) -> DeviceResult<()> {
    check_range("depth offset", filters.depth_offset, DEPTH_OFFSET_RANGE)?;
    check_range(
        "amplitude threshold",
        filters.amplitude_threshold,
        AMPLITUDE_THRESHOLD_RANGE,
    )?;
    check_range(
        "scattering threshold",
        filters.scattering_threshold,
        SCATTERING_THRESHOLD_RANGE,
    )?;
    if let Some(epsilon) = filters.guided_filter {
        check_range("guided filter epsilon", epsilon, GUIDED_EPSILON_RANGE)?;
    }
    if let Some(threshold) = filters.flying_pixel_filter {
        check_range("flying pixel threshold", threshold, FLYING_PIXEL_RANGE)?;
    }
    if let Some(ratio) = filters.tnr_filter {
        check_range("TNR ratio", ratio, TNR_RATIO_RANGE)?;
    }
    check_range(
        "motion blur threshold",
        filters.motion_blur_threshold,
        MOTION_BLUR_RANGE,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_disconnected() {
        let session = DeviceSession::new();
        assert!(!session.is_connected());
        assert!(!session.is_streaming());
    }

    #[test]
    fn test_operations_before_connect_are_not_opened() {
        let mut session = DeviceSession::new();
        assert_eq!(session.start().unwrap_err().code(), -9);
        assert_eq!(session.stop().unwrap_err().code(), -9);
        assert_eq!(session.set_depth_offset(10).unwrap_err().code(), -9);
        assert_eq!(session.get_serial_number().unwrap_err().code(), -9);
        assert_eq!(session.get_depth_lens().unwrap_err().code(), -9);
        assert_eq!(session.get_depth_range().unwrap_err().code(), -9);
    }

    #[test]
    fn test_range_check_runs_before_any_transport_access() {
        let mut session = DeviceSession::new();
        let err = session.set_tnr_filter(1.5).unwrap_err();
        assert_eq!(err.code(), -8);
    }

    #[test]
    fn test_validate_filters_rejects_bad_record() {
        let mut filters = FilterSettings::default();
        filters.guided_filter = Some(9000);
        assert_eq!(validate_filters(&filters).unwrap_err().code(), -8);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut session = DeviceSession::new();
        session.disconnect();
        session.disconnect();
        assert!(!session.is_connected());
    }
}
