use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::detect::artifact::ModelArtifact;
use crate::detect::backend::DetectorBackend;
use crate::detect::result::{ClassLabel, RecognizedObject};
use crate::frame::{ImageBuffer, ImageOrientation};
use crate::geometry::NormalizedRect;

/// Scripted backend for tests and the synthetic demo.
///
/// Its "model" is a JSON artifact listing what to report for successive frames; the
/// script repeats once exhausted:
///
/// ```json
/// { "frames": [ { "objects": [ { "label": "cup", "confidence": 0.91,
///                                "box": [0.1, 0.2, 0.3, 0.4] } ] } ] }
/// ```
pub struct StubBackend {
    frames: Vec<StubFrame>,
    cursor: usize,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct StubFrame {
    #[serde(default)]
    pub objects: Vec<StubObject>,
    /// Simulated inference time.
    #[serde(default)]
    pub latency_ms: u64,
    /// Report an inference error instead of a result.
    #[serde(default)]
    pub fail: bool,
}

impl StubFrame {
    pub fn objects(objects: Vec<StubObject>) -> Self {
        Self {
            objects,
            ..Self::default()
        }
    }

    pub fn failure() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct StubObject {
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: [f64; 4],
}

impl StubObject {
    pub fn new(label: &str, confidence: f32, bbox: NormalizedRect) -> Self {
        Self {
            label: label.to_string(),
            confidence,
            bbox: [bbox.x, bbox.y, bbox.w, bbox.h],
        }
    }
}

#[derive(Debug, Deserialize)]
struct StubModelFile {
    frames: Vec<StubFrame>,
}

impl StubBackend {
    pub fn scripted(frames: Vec<StubFrame>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// Parses a JSON stub model. Malformed or empty scripts are load errors.
    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Self> {
        let raw = std::fs::read_to_string(&artifact.path)
            .with_context(|| format!("failed to read stub model {}", artifact.path.display()))?;
        let model: StubModelFile = serde_json::from_str(&raw)
            .with_context(|| format!("invalid stub model {}", artifact.path.display()))?;
        if model.frames.is_empty() {
            return Err(anyhow!("stub model {} has no frames", artifact.name));
        }
        for (i, frame) in model.frames.iter().enumerate() {
            for object in &frame.objects {
                let [x, y, w, h] = object.bbox;
                if !NormalizedRect::new(x, y, w, h).is_valid() {
                    return Err(anyhow!(
                        "stub model frame {} has out-of-range box {:?}",
                        i,
                        object.bbox
                    ));
                }
            }
        }
        Ok(Self::scripted(model.frames))
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(
        &mut self,
        _image: &ImageBuffer,
        _orientation: ImageOrientation,
    ) -> Result<Vec<RecognizedObject>> {
        if self.frames.is_empty() {
            return Ok(Vec::new());
        }
        let frame = &self.frames[self.cursor % self.frames.len()];
        self.cursor = self.cursor.wrapping_add(1);

        if frame.latency_ms > 0 {
            std::thread::sleep(Duration::from_millis(frame.latency_ms));
        }
        if frame.fail {
            return Err(anyhow!("scripted inference failure"));
        }
        Ok(frame
            .objects
            .iter()
            .map(|object| {
                let [x, y, w, h] = object.bbox;
                RecognizedObject {
                    bounding_box: NormalizedRect::new(x, y, w, h),
                    labels: vec![ClassLabel {
                        identifier: object.label.clone(),
                        confidence: object.confidence,
                    }],
                }
            })
            .collect())
    }
}
