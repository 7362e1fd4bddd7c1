//! Synthetic camera for tests and the demo (`stub://` URIs).

use anyhow::{anyhow, Result};
use rand::Rng;
use std::time::{Duration, Instant};

use super::device::{CaptureDevice, DevicePosition, DeviceType, SessionPreset};
use crate::frame::{ImageBuffer, PixelFormat};

pub struct SyntheticCamera {
    uri: String,
    device_type: DeviceType,
    position: DevicePosition,
    preset: SessionPreset,
    fps: u32,
    frame_count: u64,
    /// Simulated scene state; a bright block drifts across the frame.
    scene_state: u32,
    locked: bool,
    lock_fails: bool,
    next_frame_at: Option<Instant>,
}

impl SyntheticCamera {
    pub fn new(uri: &str, fps: u32) -> Result<Self> {
        if !uri.starts_with("stub://") {
            return Err(anyhow!("synthetic camera requires a stub:// uri, got {}", uri));
        }
        Ok(Self {
            uri: uri.to_string(),
            device_type: DeviceType::BuiltInWideAngle,
            position: DevicePosition::Back,
            preset: SessionPreset::default(),
            fps: fps.max(1),
            frame_count: 0,
            scene_state: 0,
            locked: false,
            lock_fails: false,
            next_frame_at: None,
        })
    }

    pub fn with_position(mut self, position: DevicePosition) -> Self {
        self.position = position;
        self
    }

    /// Simulates a device that refuses configuration locks.
    pub fn with_lock_failure(mut self) -> Self {
        self.lock_fails = true;
        self
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn pace(&mut self) {
        let interval = Duration::from_secs(1) / self.fps;
        let now = Instant::now();
        let due = self.next_frame_at.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        self.next_frame_at = Some(due.max(now) + interval);
    }

    fn generate_luma(&mut self, width: u32, height: u32) -> Vec<u8> {
        let (w, h) = (width as usize, height as usize);
        if self.frame_count.is_multiple_of(10) {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let block = (w / 8).max(1);
        let block_x = (self.scene_state as usize * block) % w;
        let block_y = h / 3;
        let mut rng = rand::thread_rng();
        let mut luma = vec![0u8; w * h];
        for (i, px) in luma.iter_mut().enumerate() {
            let (x, y) = (i % w, i / w);
            let inside = x >= block_x && x < block_x + block && y >= block_y && y < block_y + block;
            let base: u8 = if inside { 220 } else { 64 };
            *px = base.saturating_add(rng.gen_range(0..8));
        }
        luma
    }
}

impl CaptureDevice for SyntheticCamera {
    fn unique_id(&self) -> &str {
        &self.uri
    }

    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn position(&self) -> DevicePosition {
        self.position
    }

    fn supports_preset(&self, _preset: SessionPreset) -> bool {
        true
    }

    fn supports_format(&self, format: PixelFormat) -> bool {
        matches!(
            format,
            PixelFormat::Yuv420BiPlanarFullRange | PixelFormat::Rgb24
        )
    }

    fn set_active_preset(&mut self, preset: SessionPreset) -> Result<()> {
        self.preset = preset;
        Ok(())
    }

    fn lock_for_configuration(&mut self) -> Result<()> {
        if self.lock_fails {
            return Err(anyhow!("device {} is locked by another client", self.uri));
        }
        self.locked = true;
        Ok(())
    }

    fn unlock_for_configuration(&mut self) {
        self.locked = false;
    }

    fn active_dimensions(&self) -> (u32, u32) {
        self.preset.dimensions()
    }

    fn read_buffer(&mut self, format: PixelFormat) -> Result<ImageBuffer> {
        self.pace();
        self.frame_count += 1;
        let (width, height) = self.preset.dimensions();
        let luma = self.generate_luma(width, height);
        let data = match format {
            PixelFormat::Yuv420BiPlanarFullRange => {
                let mut planes = luma;
                planes.resize(planes.len() + planes.len() / 2, 128);
                planes
            }
            PixelFormat::Rgb24 => luma.iter().flat_map(|&l| [l, l, l]).collect(),
        };
        Ok(ImageBuffer::new(data, width, height, format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_well_formed_buffers() {
        let mut camera = SyntheticCamera::new("stub://back", 1000).unwrap();
        camera.set_active_preset(SessionPreset::Low).unwrap();
        for format in [PixelFormat::Yuv420BiPlanarFullRange, PixelFormat::Rgb24] {
            let buffer = camera.read_buffer(format).unwrap();
            assert_eq!((buffer.width, buffer.height), (192, 144));
            assert!(buffer.validate().is_ok());
        }
        assert_eq!(camera.frames_captured(), 2);
    }

    #[test]
    fn rejects_non_stub_uri() {
        assert!(SyntheticCamera::new("rtsp://camera", 10).is_err());
    }
}
