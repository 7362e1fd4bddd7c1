use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use detection_overlay::error::PipelineError;
use detection_overlay::frame::{DeviceOrientation, PixelFormat};
use detection_overlay::ingest::{
    CaptureDevice, CaptureSession, DevicePosition, OrientationSensor, SessionConfig,
    SyntheticCamera,
};

fn camera(fps: u32) -> Box<dyn CaptureDevice> {
    Box::new(SyntheticCamera::new("stub://back_camera", fps).expect("camera"))
}

fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn front_camera_only_is_device_unavailable() {
    let front = SyntheticCamera::new("stub://selfie", 30)
        .expect("camera")
        .with_position(DevicePosition::Front);
    let result = CaptureSession::configure(
        vec![Box::new(front)],
        SessionConfig::default(),
        OrientationSensor::default(),
    );
    assert!(matches!(result, Err(PipelineError::DeviceUnavailable(_))));
}

#[test]
fn picks_back_camera_among_several() {
    let front = SyntheticCamera::new("stub://selfie", 30)
        .expect("camera")
        .with_position(DevicePosition::Front);
    let session = CaptureSession::configure(
        vec![Box::new(front), camera(30)],
        SessionConfig::default(),
        OrientationSensor::default(),
    )
    .expect("configure");
    assert_eq!(session.geometry().width, 480);
    assert_eq!(session.geometry().height, 360);
}

#[test]
fn slow_consumer_causes_discards_not_backlog() {
    let config = SessionConfig {
        preset: detection_overlay::ingest::SessionPreset::Low,
        pixel_format: PixelFormat::Rgb24,
        ..SessionConfig::default()
    };
    let mut session =
        CaptureSession::configure(vec![camera(200)], config, OrientationSensor::default())
            .expect("configure");

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        session
            .start(move |frame| {
                seen.lock().unwrap().push(frame.sequence);
                std::thread::sleep(Duration::from_millis(40));
            })
            .expect("start");
    }
    assert!(wait_for(Duration::from_secs(5), || {
        session.stats().frames_discarded > 0
    }));
    session.stop();

    let stats = session.stats();
    assert!(stats.frames_captured > stats.frames_delivered);
    let indices = seen.lock().unwrap().clone();
    assert!(indices.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn rotation_is_picked_up_by_later_frames() {
    let sensor = OrientationSensor::new(DeviceOrientation::Portrait);
    let config = SessionConfig {
        preset: detection_overlay::ingest::SessionPreset::Low,
        ..SessionConfig::default()
    };
    let mut session =
        CaptureSession::configure(vec![camera(200)], config, sensor.clone()).expect("configure");

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        session
            .start(move |frame| seen.lock().unwrap().push(frame.orientation))
            .expect("start");
    }
    assert!(wait_for(Duration::from_secs(5), || !seen.lock().unwrap().is_empty()));
    sensor.set(DeviceOrientation::LandscapeLeft);
    assert!(wait_for(Duration::from_secs(5), || {
        seen.lock()
            .unwrap()
            .contains(&DeviceOrientation::LandscapeLeft)
    }));
    session.stop();

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], DeviceOrientation::Portrait);
}
