//! Captured frames and their capture-time metadata.
//!
//! - `ImageBuffer`: owned pixel planes. Not `Clone`; a buffer moves from the capture
//!   context into exactly one detection request and is dropped when that request ends.
//! - `Frame`: a buffer tagged with the device orientation at capture time.
//! - `BufferGeometry`: native frame dimensions, fixed for a capture session.
//! - `ImageOrientation`: the orientation a detector should assume for a buffer.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::geometry::Size;

// ----------------------------------------------------------------------------
// Pixel formats
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Planar Y followed by interleaved CbCr at quarter resolution (NV12), full range.
    #[default]
    Yuv420BiPlanarFullRange,
    Rgb24,
}

impl PixelFormat {
    /// Number of bytes a `width` x `height` buffer occupies in this format.
    pub fn expected_len(self, width: u32, height: u32) -> Option<usize> {
        let plane = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Yuv420BiPlanarFullRange => {
                if width % 2 != 0 || height % 2 != 0 {
                    return None;
                }
                plane.checked_add(plane / 2)
            }
            PixelFormat::Rgb24 => plane.checked_mul(3),
        }
    }
}

// ----------------------------------------------------------------------------
// ImageBuffer
// ----------------------------------------------------------------------------

/// Pixel data for one captured frame.
///
/// Not `Clone`: the pipeline never holds two copies of a frame.
pub struct ImageBuffer {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl ImageBuffer {
    /// Wrap raw planes. Length is checked when a detection request is built, not here,
    /// so a malformed buffer costs one frame instead of failing the capture context.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Confirms the planes match the declared dimensions and format.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::DetectionRequestFailure(format!(
                "empty image buffer {}x{}",
                self.width, self.height
            )));
        }
        let expected = self
            .format
            .expected_len(self.width, self.height)
            .ok_or_else(|| {
                PipelineError::DetectionRequestFailure(format!(
                    "invalid {:?} dimensions {}x{}",
                    self.format, self.width, self.height
                ))
            })?;
        if self.data.len() != expected {
            return Err(PipelineError::DetectionRequestFailure(format!(
                "{:?} buffer length mismatch: expected {}, got {}",
                self.format,
                expected,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Packed RGB copy of the buffer for backends that consume RGB.
    pub fn to_rgb(&self) -> Result<Vec<u8>> {
        match self.format {
            PixelFormat::Rgb24 => {
                let expected = PixelFormat::Rgb24
                    .expected_len(self.width, self.height)
                    .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
                if self.data.len() != expected {
                    return Err(anyhow!(
                        "RGB frame length mismatch: expected {}, got {}",
                        expected,
                        self.data.len()
                    ));
                }
                Ok(self.data.clone())
            }
            PixelFormat::Yuv420BiPlanarFullRange => nv12_to_rgb(&self.data, self.width, self.height),
        }
    }
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let expected = PixelFormat::Yuv420BiPlanarFullRange
        .expected_len(width, height)
        .ok_or_else(|| anyhow!("NV12 frame dimensions invalid: {}x{}", width, height))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }
    let y_plane = w * h;

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(y + 1.402_f32 * v);
            rgb[offset + 1] = clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v);
            rgb[offset + 2] = clamp_to_u8(y + 1.772_f32 * u);
        }
    }

    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

// ----------------------------------------------------------------------------
// Orientation
// ----------------------------------------------------------------------------

/// Physical orientation of the device when a frame was captured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOrientation {
    #[default]
    Unknown,
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
    FaceUp,
    FaceDown,
}

impl DeviceOrientation {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            DeviceOrientation::Unknown => 0,
            DeviceOrientation::Portrait => 1,
            DeviceOrientation::PortraitUpsideDown => 2,
            DeviceOrientation::LandscapeLeft => 3,
            DeviceOrientation::LandscapeRight => 4,
            DeviceOrientation::FaceUp => 5,
            DeviceOrientation::FaceDown => 6,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => DeviceOrientation::Portrait,
            2 => DeviceOrientation::PortraitUpsideDown,
            3 => DeviceOrientation::LandscapeLeft,
            4 => DeviceOrientation::LandscapeRight,
            5 => DeviceOrientation::FaceUp,
            6 => DeviceOrientation::FaceDown,
            _ => DeviceOrientation::Unknown,
        }
    }
}

/// Orientation of buffer contents as handed to the detector (EXIF order).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOrientation {
    Up,
    UpMirrored,
    Down,
    DownMirrored,
    LeftMirrored,
    Right,
    RightMirrored,
    Left,
}

impl ImageOrientation {
    /// Fixed mapping from the back camera's device orientation to buffer orientation.
    pub fn from_device(orientation: DeviceOrientation) -> Self {
        match orientation {
            DeviceOrientation::PortraitUpsideDown => ImageOrientation::Left,
            DeviceOrientation::LandscapeLeft => ImageOrientation::UpMirrored,
            DeviceOrientation::LandscapeRight => ImageOrientation::Down,
            DeviceOrientation::Portrait => ImageOrientation::Up,
            DeviceOrientation::Unknown | DeviceOrientation::FaceUp | DeviceOrientation::FaceDown => {
                ImageOrientation::Up
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Frame + geometry
// ----------------------------------------------------------------------------

/// One captured frame, owned by the pipeline until its detection request finishes.
pub struct Frame {
    pub buffer: ImageBuffer,
    pub orientation: DeviceOrientation,
    /// Capture-order sequence number assigned by the frame source.
    pub sequence: u64,
}

impl Frame {
    pub fn new(buffer: ImageBuffer, orientation: DeviceOrientation, sequence: u64) -> Self {
        Self {
            buffer,
            orientation,
            sequence,
        }
    }
}

/// Native pixel dimensions reported by the capture device at configuration time.
///
/// Zero when the device could not be locked to read its active format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferGeometry {
    pub width: u32,
    pub height: u32,
}

impl BufferGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_unset(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn size(&self) -> Size {
        Size::new(self.width as f64, self.height as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let buffer = ImageBuffer::new(nv12, 2, 2, PixelFormat::Yuv420BiPlanarFullRange);
        assert_eq!(buffer.to_rgb()?, vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn rgb_pass_through_validates_length() {
        let good = ImageBuffer::new(vec![1u8; 9], 1, 3, PixelFormat::Rgb24);
        assert_eq!(good.to_rgb().unwrap(), vec![1u8; 9]);
        let short = ImageBuffer::new(vec![1u8; 8], 1, 3, PixelFormat::Rgb24);
        assert!(short.to_rgb().is_err());
    }

    #[test]
    fn validate_rejects_malformed_buffers() {
        let ok = ImageBuffer::new(vec![0u8; 6], 2, 2, PixelFormat::Yuv420BiPlanarFullRange);
        assert!(ok.validate().is_ok());

        let short = ImageBuffer::new(vec![0u8; 5], 2, 2, PixelFormat::Yuv420BiPlanarFullRange);
        assert!(matches!(
            short.validate(),
            Err(PipelineError::DetectionRequestFailure(_))
        ));

        let odd = ImageBuffer::new(vec![0u8; 4], 3, 1, PixelFormat::Yuv420BiPlanarFullRange);
        assert!(odd.validate().is_err());

        let empty = ImageBuffer::new(Vec::new(), 0, 0, PixelFormat::Rgb24);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn orientation_mapping_table() {
        use DeviceOrientation::*;
        assert_eq!(ImageOrientation::from_device(Portrait), ImageOrientation::Up);
        assert_eq!(
            ImageOrientation::from_device(LandscapeLeft),
            ImageOrientation::UpMirrored
        );
        assert_eq!(
            ImageOrientation::from_device(LandscapeRight),
            ImageOrientation::Down
        );
        assert_eq!(
            ImageOrientation::from_device(PortraitUpsideDown),
            ImageOrientation::Left
        );
        assert_eq!(ImageOrientation::from_device(FaceUp), ImageOrientation::Up);
        assert_eq!(ImageOrientation::from_device(Unknown), ImageOrientation::Up);
    }

    #[test]
    fn device_orientation_round_trips_through_u8() {
        for o in [
            DeviceOrientation::Unknown,
            DeviceOrientation::Portrait,
            DeviceOrientation::PortraitUpsideDown,
            DeviceOrientation::LandscapeLeft,
            DeviceOrientation::LandscapeRight,
            DeviceOrientation::FaceUp,
            DeviceOrientation::FaceDown,
        ] {
            assert_eq!(DeviceOrientation::from_u8(o.to_u8()), o);
        }
    }

    #[test]
    fn unset_geometry() {
        assert!(BufferGeometry::default().is_unset());
        assert!(!BufferGeometry::new(1280, 720).is_unset());
    }
}
