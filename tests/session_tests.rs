// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the session contract, run against the simulated
//! transport

use tofcam::wire::{CloudPoint, DataFormat, DevicePath, FrameRate, OperationMode};
use tofcam::{DeviceError, DeviceSession, transport};

/// Device path of the simulated depth+RGB module
fn sim_path() -> DevicePath {
    DevicePath::new(0, "TF-C100", "sim:0", DataFormat::Xyzi)
}

/// Device path simulating the depth-only module
fn sim_depth_only_path() -> DevicePath {
    DevicePath::new(0, "TF-M100", "sim:0", DataFormat::Xyzi)
}

fn connected_session() -> DeviceSession {
    let mut session = DeviceSession::new();
    session.connect(&sim_path()).unwrap();
    session
}

fn frame_buffers(session: &DeviceSession) -> (Vec<u16>, Vec<u16>) {
    let info = session.device_info().unwrap();
    let pixels = info.width as usize * info.height as usize;
    (vec![0u16; pixels], vec![0u16; pixels])
}

#[test]
fn test_operations_before_connect_fail_with_negative_codes() {
    let mut session = DeviceSession::new();
    let mut depth = vec![0u16; 4];
    let mut ir = vec![0u16; 4];

    assert!(session.start().unwrap_err().code() < 0);
    assert!(session.stop().unwrap_err().code() < 0);
    assert!(
        session
            .read_depth_ir_frame(&mut depth, &mut ir)
            .unwrap_err()
            .code()
            < 0
    );
    assert!(session.set_amplitude_threshold(10).unwrap_err().code() < 0);
    assert!(session.get_frame_rate().unwrap_err().code() < 0);
    assert_eq!(session.get_serial_number().unwrap_err(), DeviceError::NotOpened);
}

#[test]
fn test_discovery_without_hardware_reports_no_simulated_entries() {
    let devices = transport::discover(false);
    assert!(devices.iter().all(|d| !d.path().starts_with("sim:")));
}

#[test]
fn test_discovery_with_simulator_is_never_empty() {
    let devices = transport::discover(true);
    assert!(!devices.is_empty());
}

#[test]
fn test_connect_twice_fails() {
    let mut session = connected_session();
    let err = session.connect(&sim_path()).unwrap_err();
    assert_eq!(err.code(), -1);
}

#[test]
fn test_start_succeeds_exactly_once_per_cycle() {
    let mut session = connected_session();

    session.start().unwrap();
    assert_eq!(session.start().unwrap_err().code(), -1);

    // Stop intervenes: start is allowed again
    session.stop().unwrap();
    session.start().unwrap();
    assert!(session.is_streaming());
    session.disconnect();
}

#[test]
fn test_stop_is_idempotent_while_connected() {
    let mut session = connected_session();
    session.start().unwrap();
    session.stop().unwrap();
    session.stop().unwrap();
    session.disconnect();
    // After disconnect there is no device to stop
    assert_eq!(session.stop().unwrap_err(), DeviceError::NotOpened);
}

#[test]
fn test_sleep_mode_blocks_start() {
    let mut session = connected_session();
    session.set_operation_mode(OperationMode::Sleep).unwrap();
    assert_eq!(session.start().unwrap_err().code(), -1);

    session.set_operation_mode(OperationMode::Active).unwrap();
    session.start().unwrap();
}

#[test]
fn test_read_before_start_fails_without_touching_buffers() {
    let mut session = connected_session();
    let (mut depth, mut ir) = frame_buffers(&session);
    let err = session.read_depth_ir_frame(&mut depth, &mut ir).unwrap_err();
    assert_eq!(err.code(), -4);
    assert!(depth.iter().all(|&d| d == 0));
    assert!(ir.iter().all(|&d| d == 0));
}

#[test]
fn test_read_rejects_wrong_buffer_sizes() {
    let mut session = connected_session();
    session.start().unwrap();

    let (mut depth, _) = frame_buffers(&session);
    let mut short_ir = vec![0u16; 16];
    let err = session
        .read_depth_ir_frame(&mut depth, &mut short_ir)
        .unwrap_err();
    assert_eq!(err.code(), -10);
    assert!(depth.iter().all(|&d| d == 0));
}

#[test]
fn test_frame_ids_strictly_increase() {
    let mut session = connected_session();
    session.start().unwrap();
    let (mut depth, mut ir) = frame_buffers(&session);

    let mut last_id = 0i64;
    for _ in 0..5 {
        let info = session.read_depth_ir_frame(&mut depth, &mut ir).unwrap();
        assert!(info.frame_id > last_id, "frame ids must strictly increase");
        assert_eq!(info.width, 640);
        assert_eq!(info.height, 480);
        last_id = info.frame_id;
    }
    // The scene contains real samples
    assert!(depth.iter().any(|&d| d > 0));
    assert!(ir.iter().any(|&a| a > 0));
}

#[test]
fn test_frame_ids_survive_stop_start() {
    let mut session = connected_session();
    let (mut depth, mut ir) = frame_buffers(&session);

    session.start().unwrap();
    let before = session.read_depth_ir_frame(&mut depth, &mut ir).unwrap();
    session.stop().unwrap();
    session.start().unwrap();
    let after = session.read_depth_ir_frame(&mut depth, &mut ir).unwrap();
    assert!(after.frame_id > before.frame_id);
}

#[test]
fn test_setter_getter_round_trips() {
    let mut session = connected_session();

    session.set_depth_offset(250).unwrap();
    assert_eq!(session.get_depth_offset().unwrap(), 250);

    session.set_amplitude_threshold(42).unwrap();
    assert_eq!(session.get_amplitude_threshold().unwrap(), 42);

    session.set_scattering_threshold(900).unwrap();
    assert_eq!(session.get_scattering_threshold().unwrap(), 900);

    session.set_motion_blur_threshold(128).unwrap();
    assert_eq!(session.get_motion_blur_threshold().unwrap(), 128);

    session.set_frame_rate(FrameRate::Fps15).unwrap();
    assert_eq!(session.get_frame_rate().unwrap(), FrameRate::Fps15);

    session.set_illumination(false).unwrap();
    assert!(!session.get_illumination().unwrap());

    session.set_operation_mode(OperationMode::Active).unwrap();
    assert_eq!(
        session.get_operation_mode().unwrap(),
        OperationMode::Active
    );
}

#[test]
fn test_filter_record_follows_setters() {
    let mut session = connected_session();

    session.set_guided_filter(1200).unwrap();
    session.set_tnr_filter(0.25).unwrap();
    session.set_median_filter().unwrap();
    session.clear_flying_pixel_filter().unwrap();

    let filters = session.filter_settings();
    assert_eq!(filters.guided_filter, Some(1200));
    assert_eq!(filters.tnr_filter, Some(0.25));
    assert!(filters.median_filter);
    assert!(filters.flying_pixel_filter.is_none());

    session.clear_guided_filter().unwrap();
    assert!(session.filter_settings().guided_filter.is_none());
}

#[test]
fn test_out_of_range_values_are_rejected() {
    let mut session = connected_session();
    let before = session.filter_settings().clone();

    assert_eq!(session.set_depth_offset(-1).unwrap_err().code(), -8);
    assert_eq!(session.set_amplitude_threshold(4096).unwrap_err().code(), -8);
    assert_eq!(session.set_scattering_threshold(5000).unwrap_err().code(), -8);
    assert_eq!(session.set_guided_filter(0).unwrap_err().code(), -8);
    assert_eq!(session.set_guided_filter(8001).unwrap_err().code(), -8);
    assert_eq!(session.set_flying_pixel_filter(4096).unwrap_err().code(), -8);
    assert_eq!(session.set_tnr_filter(-0.1).unwrap_err().code(), -8);
    assert_eq!(session.set_tnr_filter(1.01).unwrap_err().code(), -8);
    assert_eq!(session.set_motion_blur_threshold(256).unwrap_err().code(), -8);

    // A rejected value never reaches the configuration record
    assert_eq!(session.filter_settings(), &before);
}

#[test]
fn test_malformed_frame_rate_scalar_is_invalid_param() {
    let err = FrameRate::try_from(25u8).unwrap_err();
    assert_eq!(err.code(), -10);
}

#[test]
fn test_point_cloud_mode_gates_reads() {
    let mut session = connected_session();
    session.set_point_cloud_mode().unwrap();
    session.start().unwrap();

    let (mut depth, mut ir) = frame_buffers(&session);
    let err = session.read_depth_ir_frame(&mut depth, &mut ir).unwrap_err();
    assert_eq!(err.code(), -7);

    let mut points = vec![CloudPoint::default(); depth.len()];
    let info = session.read_point_cloud_frame(&mut points).unwrap();
    assert_eq!(info.frame_type, 1);

    // And the other way around: cloud reads need point-cloud mode
    session.stop().unwrap();
    session.clear_point_cloud_mode().unwrap();
    session.start().unwrap();
    let err = session.read_point_cloud_frame(&mut points).unwrap_err();
    assert_eq!(err.code(), -7);
}

#[test]
fn test_mode_change_rejected_while_streaming() {
    let mut session = connected_session();
    session.start().unwrap();
    assert_eq!(session.set_point_cloud_mode().unwrap_err().code(), -1);
}

#[test]
fn test_point_cloud_matches_pinhole_geometry() {
    let mut session = connected_session();
    let intr = session.get_depth_lens().unwrap().intrinsics;
    session.set_point_cloud_mode().unwrap();
    session.start().unwrap();

    let info = *session.device_info().unwrap();
    let width = info.width as usize;
    let mut points = vec![CloudPoint::default(); width * info.height as usize];
    session.read_point_cloud_frame(&mut points).unwrap();

    let (i, point) = points
        .iter()
        .enumerate()
        .find(|(_, p)| p.z > 0.0)
        .expect("scene contains valid samples");
    let u = (i % width) as f32;
    let v = (i / width) as f32;
    assert!((point.x - (u - intr.cx) * point.z / intr.fx).abs() < 1e-5);
    assert!((point.y - (v - intr.cy) * point.z / intr.fy).abs() < 1e-5);
    assert!(point.intensity >= 0.0 && point.intensity <= 1.0);
}

#[test]
fn test_depth_only_device_has_no_color_calibration() {
    let mut session = DeviceSession::new();
    session.connect(&sim_depth_only_path()).unwrap();

    assert_eq!(session.get_product_name().unwrap(), "TF-M100");
    assert!(!session.device_info().unwrap().has_color_camera());
    assert_eq!(session.get_color_lens().unwrap_err().code(), -7);
    assert_eq!(session.get_extrinsics().unwrap_err().code(), -7);
}

#[test]
fn test_identity_getters_on_color_device() {
    let session = connected_session();

    assert_eq!(session.get_product_name().unwrap(), "TF-C100");
    assert_eq!(session.get_serial_number().unwrap(), "SIM0000001");
    assert_eq!(session.get_firmware_version().unwrap(), [5, 1, 2, 0, 42]);

    let depth = session.get_depth_lens().unwrap();
    assert!(depth.intrinsics.fx > 0.0);
    let ext = session.get_extrinsics().unwrap();
    assert!((ext.rotation[0] - 1.0).abs() < 1e-6);
    assert!(ext.translation[0] > 0.0);

    let (min, max) = session.get_depth_range().unwrap();
    assert!(min < max);
}

#[test]
fn test_disconnect_invalidates_identity() {
    let mut session = connected_session();
    session.start().unwrap();
    session.disconnect();
    session.disconnect();

    assert!(!session.is_connected());
    assert_eq!(session.get_serial_number().unwrap_err(), DeviceError::NotOpened);
    assert_eq!(session.get_depth_lens().unwrap_err(), DeviceError::NotOpened);
}
