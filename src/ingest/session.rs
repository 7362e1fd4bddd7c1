//! Capture session: device configuration and the capture/delivery threads.
//!
//! Configuration runs the same sequence a camera stack does: pick the device, attach it
//! as input with the requested preset, attach a video data output in the requested pixel
//! format, then read the active format's dimensions under the device lock.
//!
//! Running, the session owns two threads. The capture thread reads buffers at sensor
//! rate; the delivery thread hands each frame to the consumer callback. When the consumer
//! is still busy with the previous frame, late frames are discarded.

use crossbeam_channel::{bounded, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};

use super::device::{discover, CaptureDevice, DevicePosition, DeviceType, SessionPreset};
use super::orientation::OrientationSensor;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::{BufferGeometry, Frame, PixelFormat};

const READ_ERROR_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub device_type: DeviceType,
    pub position: DevicePosition,
    pub preset: SessionPreset,
    pub pixel_format: PixelFormat,
    pub discard_late_frames: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::BuiltInWideAngle,
            position: DevicePosition::Back,
            preset: SessionPreset::Medium,
            pixel_format: PixelFormat::Yuv420BiPlanarFullRange,
            discard_late_frames: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub frames_delivered: u64,
    pub frames_discarded: u64,
    pub read_errors: u64,
}

#[derive(Default)]
struct Counters {
    captured: AtomicU64,
    delivered: AtomicU64,
    discarded: AtomicU64,
    read_errors: AtomicU64,
}

struct Running {
    stop: Arc<AtomicBool>,
    capture: JoinHandle<Box<dyn CaptureDevice>>,
    delivery: JoinHandle<()>,
}

pub struct CaptureSession {
    config: SessionConfig,
    device: Option<Box<dyn CaptureDevice>>,
    geometry: BufferGeometry,
    orientation: OrientationSensor,
    counters: Arc<Counters>,
    running: Option<Running>,
}

impl CaptureSession {
    /// Configures a session over the first device matching `config`.
    pub fn configure(
        devices: Vec<Box<dyn CaptureDevice>>,
        config: SessionConfig,
        orientation: OrientationSensor,
    ) -> PipelineResult<Self> {
        let mut device = discover(devices, config.device_type, config.position).ok_or_else(|| {
            PipelineError::DeviceUnavailable(format!(
                "{:?} camera at position {:?}",
                config.device_type, config.position
            ))
        })?;

        if !device.supports_preset(config.preset) {
            return Err(PipelineError::SessionConfigurationFailure(format!(
                "Could not add video input to the session: preset {:?} unsupported by {}",
                config.preset,
                device.unique_id()
            )));
        }
        device.set_active_preset(config.preset).map_err(|e| {
            PipelineError::SessionConfigurationFailure(format!(
                "Could not add video input to the session: {:#}",
                e
            ))
        })?;

        if !device.supports_format(config.pixel_format) {
            return Err(PipelineError::SessionConfigurationFailure(format!(
                "Could not add video data output to the session: {:?} unsupported by {}",
                config.pixel_format,
                device.unique_id()
            )));
        }

        let geometry = match device.lock_for_configuration() {
            Ok(()) => {
                let (width, height) = device.active_dimensions();
                device.unlock_for_configuration();
                BufferGeometry::new(width, height)
            }
            Err(e) => {
                log::error!(
                    "capture: could not lock {} to read its format: {:#}",
                    device.unique_id(),
                    e
                );
                BufferGeometry::default()
            }
        };

        log::info!(
            "capture: configured {} preset={:?} format={:?} buffer={}x{}",
            device.unique_id(),
            config.preset,
            config.pixel_format,
            geometry.width,
            geometry.height
        );

        Ok(Self {
            config,
            device: Some(device),
            geometry,
            orientation,
            counters: Arc::new(Counters::default()),
            running: None,
        })
    }

    pub fn geometry(&self) -> BufferGeometry {
        self.geometry
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn orientation(&self) -> &OrientationSensor {
        &self.orientation
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Starts capture. `on_frame` runs on the session's delivery thread.
    pub fn start<F>(&mut self, mut on_frame: F) -> Result<()>
    where
        F: FnMut(Frame) + Send + 'static,
    {
        if self.running.is_some() {
            return Err(anyhow!("capture session already running"));
        }
        let mut device = self
            .device
            .take()
            .ok_or_else(|| anyhow!("capture device released"))?;

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded::<Frame>(1);
        let format = self.config.pixel_format;
        let discard_late = self.config.discard_late_frames;
        let orientation = self.orientation.clone();

        let capture_stop = stop.clone();
        let capture_counters = self.counters.clone();
        let capture = std::thread::spawn(move || {
            let mut sequence = 0u64;
            while !capture_stop.load(Ordering::SeqCst) {
                let buffer = match device.read_buffer(format) {
                    Ok(buffer) => buffer,
                    Err(e) => {
                        capture_counters.read_errors.fetch_add(1, Ordering::Relaxed);
                        log::warn!("capture: read from {} failed: {:#}", device.unique_id(), e);
                        std::thread::sleep(READ_ERROR_BACKOFF);
                        continue;
                    }
                };
                capture_counters.captured.fetch_add(1, Ordering::Relaxed);
                let frame = Frame::new(buffer, orientation.current(), sequence);
                sequence += 1;

                if discard_late {
                    match tx.try_send(frame) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            capture_counters.discarded.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                } else if tx.send(frame).is_err() {
                    break;
                }
            }
            device
        });

        let delivery_counters = self.counters.clone();
        let delivery = std::thread::spawn(move || {
            for frame in rx.iter() {
                delivery_counters.delivered.fetch_add(1, Ordering::Relaxed);
                on_frame(frame);
            }
        });

        self.running = Some(Running {
            stop,
            capture,
            delivery,
        });
        log::info!("capture: session started");
        Ok(())
    }

    /// Stops capture, waits for both threads and takes the device back.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.stop.store(true, Ordering::SeqCst);
        match running.capture.join() {
            Ok(device) => self.device = Some(device),
            Err(_) => log::error!("capture: capture thread panicked; device lost"),
        }
        if running.delivery.join().is_err() {
            log::error!("capture: delivery thread panicked");
        }
        log::info!("capture: session stopped");
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.counters.captured.load(Ordering::Relaxed),
            frames_delivered: self.counters.delivered.load(Ordering::Relaxed),
            frames_discarded: self.counters.discarded.load(Ordering::Relaxed),
            read_errors: self.counters.read_errors.load(Ordering::Relaxed),
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
