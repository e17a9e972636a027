// SPDX-License-Identifier: GPL-3.0-only

//! tofcam - SDK for TF-series Time-of-Flight depth cameras
//!
//! This library provides device discovery, connection, streaming control,
//! frame retrieval and on-device filter configuration for TF-series ToF
//! modules, plus a simulated device for development without hardware.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`session`]: The device session facade, one instance per camera
//! - [`transport`]: Swappable device layer (V4L2 hardware, simulator)
//! - [`wire`]: Fixed-layout structures and enums shared with the device
//! - [`geometry`]: Lens calibration records and depth unprojection
//! - [`pointcloud`]: Point-cloud derivation and LAS export
//! - [`config`]: Filter settings record and persisted session defaults
//! - [`logging`]: Console and file logging control
//!
//! # Example
//!
//! ```no_run
//! use tofcam::{DeviceSession, transport};
//!
//! let mut session = DeviceSession::new();
//! let devices = transport::discover(false);
//! if let Some(path) = devices.first() {
//!     session.connect(path)?;
//!     session.start()?;
//!     let info = session.device_info()?;
//!     let pixels = info.width as usize * info.height as usize;
//!     let mut depth = vec![0u16; pixels];
//!     let mut ir = vec![0u16; pixels];
//!     let frame = session.read_depth_ir_frame(&mut depth, &mut ir)?;
//!     println!("frame {} at {} C", frame.frame_id, frame.sensor_temp);
//!     session.stop()?;
//! }
//! # Ok::<(), tofcam::DeviceError>(())
//! ```

pub mod config;
pub mod constants;
pub mod errors;
pub mod geometry;
pub mod logging;
pub mod pointcloud;
pub mod session;
pub mod transport;
pub mod wire;

// Re-export commonly used types
pub use config::{FilterSettings, SessionConfig};
pub use errors::{DeviceError, DeviceResult};
pub use geometry::{CalibrationData, LensCalibration};
pub use logging::set_log_status;
pub use session::DeviceSession;
pub use wire::{
    CloudPoint, DataFormat, DepthMode, DeviceInfo, DevicePath, DistortionParam, ExtrinsicParam,
    FrameInfo, FrameRate, FrameType, IntrinsicParam, IrMode, OperationMode, StatusCode,
};
