// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing attached (and simulated) devices
//! - Dumping device identity and calibration
//! - Streaming with live statistics
//! - Saving a depth or IR snapshot as 16-bit PNG
//! - Capturing a point cloud to LAS/LAZ

use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tofcam::wire::CloudPoint;
use tofcam::{DeviceSession, SessionConfig, pointcloud, transport};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// List all matching devices
pub fn list_devices(simulated: bool) -> CliResult {
    let devices = transport::discover(simulated);
    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    println!("Available devices:");
    println!();
    for device in &devices {
        println!("  [{}] {} ({})", device.index, device.name(), device.path());
    }
    Ok(())
}

/// Print identity, depth range and calibration for one device
pub fn show_info(device: usize, simulated: bool) -> CliResult {
    let mut session = connect(device, simulated)?;

    let info = *session.device_info()?;
    println!("Vendor:        {}", info.vendor());
    println!("Product:       {}", info.product());
    println!("Serial:        {}", info.serial());
    println!("Firmware:      {}", info.firmware());
    println!(
        "Type:          {}",
        if info.has_color_camera() {
            "depth + RGB"
        } else {
            "depth only"
        }
    );
    println!("Resolution:    {}x{}", info.width, info.height);

    let (min, max) = session.get_depth_range()?;
    println!("Depth range:   {} - {} mm", min, max);

    let depth = session.get_depth_lens()?;
    println!(
        "Depth lens:    fx={:.1} fy={:.1} cx={:.1} cy={:.1}",
        depth.intrinsics.fx, depth.intrinsics.fy, depth.intrinsics.cx, depth.intrinsics.cy
    );
    println!(
        "Distortion:    k1={:.4} k2={:.4} k3={:.4} p1={:.4} p2={:.4}",
        depth.distortion.k1,
        depth.distortion.k2,
        depth.distortion.k3,
        depth.distortion.p1,
        depth.distortion.p2
    );

    if info.has_color_camera() {
        let color = session.get_color_lens()?;
        println!(
            "Color lens:    fx={:.1} fy={:.1} cx={:.1} cy={:.1}",
            color.intrinsics.fx, color.intrinsics.fy, color.intrinsics.cx, color.intrinsics.cy
        );
        let ext = session.get_extrinsics()?;
        println!(
            "Baseline:      {:.1} mm",
            ext.translation[0].abs() * 1000.0
        );
    }

    session.disconnect();
    Ok(())
}

/// Stream frames and print live statistics until the duration elapses or
/// Ctrl+C is pressed
pub fn stream(device: usize, simulated: bool, duration: u64) -> CliResult {
    let mut session = connect(device, simulated)?;
    let info = *session.device_info()?;
    let pixels = info.width as usize * info.height as usize;

    session.clear_point_cloud_mode()?;
    session.start()?;
    println!("Streaming... (press Ctrl+C to stop early)");

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_handler = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_handler.store(true, Ordering::SeqCst);
    })?;

    let mut depth = vec![0u16; pixels];
    let mut ir = vec![0u16; pixels];
    let start = Instant::now();
    let target = Duration::from_secs(duration);
    let mut frames = 0u64;
    let mut window_start = Instant::now();
    let mut window_frames = 0u32;

    while start.elapsed() < target && !stop_flag.load(Ordering::SeqCst) {
        let frame = session.read_depth_ir_frame(&mut depth, &mut ir)?;
        frames += 1;
        window_frames += 1;

        let elapsed = window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = window_frames as f64 / elapsed.as_secs_f64();
            print!(
                "\rframe {:>6}  {:.1} fps  sensor {:.1} C  tint {:.1} ms   ",
                frame.frame_id, fps, frame.sensor_temp, frame.integration_time
            );
            std::io::Write::flush(&mut std::io::stdout())?;
            window_start = Instant::now();
            window_frames = 0;
        }
    }
    println!();

    session.stop()?;
    session.disconnect();
    println!("Read {} frames in {:.1} s", frames, start.elapsed().as_secs_f64());
    Ok(())
}

/// Save one frame's depth (or IR) plane as a 16-bit grayscale PNG
pub fn snapshot(device: usize, simulated: bool, output: Option<PathBuf>, ir_plane: bool) -> CliResult {
    let mut session = connect(device, simulated)?;
    let info = *session.device_info()?;
    let pixels = info.width as usize * info.height as usize;

    session.clear_point_cloud_mode()?;
    session.start()?;
    let mut depth = vec![0u16; pixels];
    let mut ir = vec![0u16; pixels];
    let frame = session.read_depth_ir_frame(&mut depth, &mut ir)?;
    session.stop()?;
    session.disconnect();

    let kind = if ir_plane { "ir" } else { "depth" };
    let path = match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            path
        }
        None => {
            let dir = default_output_dir();
            std::fs::create_dir_all(&dir)?;
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            dir.join(format!("{}_{}.png", kind, timestamp))
        }
    };

    let plane = if ir_plane { ir } else { depth };
    let image = image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::from_raw(
        info.width as u32,
        info.height as u32,
        plane,
    )
    .ok_or("plane does not match frame dimensions")?;
    image.save(&path)?;

    println!(
        "Saved {} frame {} to {}",
        kind,
        frame.frame_id,
        path.display()
    );
    Ok(())
}

/// Capture one point-cloud frame and export it as LAS/LAZ
pub fn capture_points(device: usize, simulated: bool, output: Option<PathBuf>) -> CliResult {
    let mut session = connect(device, simulated)?;
    let info = *session.device_info()?;
    let pixels = info.width as usize * info.height as usize;

    session.set_point_cloud_mode()?;
    session.start()?;
    let mut points = vec![CloudPoint::default(); pixels];
    let frame = session.read_point_cloud_frame(&mut points)?;
    session.stop()?;
    session.disconnect();

    let path = match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            path
        }
        None => {
            let dir = default_output_dir();
            std::fs::create_dir_all(&dir)?;
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            dir.join(format!("cloud_{}.las", timestamp))
        }
    };

    pointcloud::export_point_cloud_las(&points, &path)?;
    println!("Saved point cloud frame {} to {}", frame.frame_id, path.display());
    Ok(())
}

/// Discover devices and connect a session to the selected index
fn connect(device: usize, simulated: bool) -> Result<DeviceSession, Box<dyn std::error::Error>> {
    let devices = transport::discover(simulated);
    if devices.is_empty() {
        return Err("No devices found. Try --simulated.".into());
    }
    if device >= devices.len() {
        return Err(format!(
            "Device index {} out of range (max {})",
            device,
            devices.len() - 1
        )
        .into());
    }

    let path = devices[device];
    println!("Using device: {} ({})", path.name(), path.path());

    let mut session = DeviceSession::new();
    session.connect(&path)?;

    // Saved defaults apply on top of the device's power-on state
    session.apply_config(&SessionConfig::load_or_default())?;
    Ok(session)
}

/// Default output directory for snapshots and point clouds
fn default_output_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tofcam")
}
