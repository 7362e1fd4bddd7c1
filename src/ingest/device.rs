use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::frame::{ImageBuffer, PixelFormat};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    BuiltInWideAngle,
    BuiltInTelephoto,
    BuiltInUltraWide,
    External,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePosition {
    Back,
    Front,
    Unspecified,
}

/// Capture resolution presets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPreset {
    Low,
    #[default]
    Medium,
    High,
    Hd1920x1080,
}

impl SessionPreset {
    /// Native (landscape) buffer dimensions for the preset.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            SessionPreset::Low => (192, 144),
            SessionPreset::Medium => (480, 360),
            SessionPreset::High => (1280, 720),
            SessionPreset::Hd1920x1080 => (1920, 1080),
        }
    }
}

impl FromStr for SessionPreset {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(SessionPreset::Low),
            "medium" => Ok(SessionPreset::Medium),
            "high" => Ok(SessionPreset::High),
            "hd1920x1080" | "1080p" => Ok(SessionPreset::Hd1920x1080),
            other => Err(anyhow::anyhow!("unknown session preset '{}'", other)),
        }
    }
}

/// A camera the capture session can drive.
///
/// `read_buffer` blocks until the sensor produces the next frame.
pub trait CaptureDevice: Send {
    fn unique_id(&self) -> &str;

    fn device_type(&self) -> DeviceType;

    fn position(&self) -> DevicePosition;

    fn supports_preset(&self, preset: SessionPreset) -> bool;

    fn supports_format(&self, format: PixelFormat) -> bool;

    fn set_active_preset(&mut self, preset: SessionPreset) -> Result<()>;

    /// Exclusive access to read or change the active format.
    fn lock_for_configuration(&mut self) -> Result<()>;

    fn unlock_for_configuration(&mut self);

    /// Width and height of the active format. Meaningful only while locked.
    fn active_dimensions(&self) -> (u32, u32);

    fn read_buffer(&mut self, format: PixelFormat) -> Result<ImageBuffer>;
}

/// Picks the first device matching `device_type` and `position`.
pub fn discover(
    devices: Vec<Box<dyn CaptureDevice>>,
    device_type: DeviceType,
    position: DevicePosition,
) -> Option<Box<dyn CaptureDevice>> {
    devices
        .into_iter()
        .find(|d| d.device_type() == device_type && d.position() == position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_parsing() {
        assert_eq!("Medium".parse::<SessionPreset>().unwrap(), SessionPreset::Medium);
        assert_eq!("1080p".parse::<SessionPreset>().unwrap(), SessionPreset::Hd1920x1080);
        assert!("ultra".parse::<SessionPreset>().is_err());
    }

    #[test]
    fn preset_dimensions_are_landscape() {
        for preset in [
            SessionPreset::Low,
            SessionPreset::Medium,
            SessionPreset::High,
            SessionPreset::Hd1920x1080,
        ] {
            let (w, h) = preset.dimensions();
            assert!(w > h);
        }
    }
}
