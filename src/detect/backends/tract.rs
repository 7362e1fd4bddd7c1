#![cfg(feature = "backend-tract")]

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tract_onnx::prelude::*;

use crate::detect::artifact::ModelArtifact;
use crate::detect::backend::DetectorBackend;
use crate::detect::result::{ClassLabel, RecognizedObject};
use crate::frame::{ImageBuffer, ImageOrientation};
use crate::geometry::NormalizedRect;

const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Tract-based backend for YOLOv5-style ONNX exports.
///
/// Expects a single `[1, N, 5 + classes]` output of `(cx, cy, w, h, objectness, scores..)`
/// in input-pixel units. Buffers are resized nearest-neighbour to the square model input
/// and treated as upright.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    decoder: Decoder,
}

impl TractBackend {
    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Self> {
        let size = DEFAULT_INPUT_SIZE as usize;
        let model = tract_onnx::onnx()
            .model_for_path(&artifact.path)
            .with_context(|| format!("failed to load ONNX model from {}", artifact.path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size: DEFAULT_INPUT_SIZE,
            decoder: Decoder {
                input_size: DEFAULT_INPUT_SIZE as f32,
                labels: read_labels(&artifact.labels_path()),
                confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
                iou_threshold: DEFAULT_IOU_THRESHOLD,
            },
        })
    }

    fn build_input(&self, image: &ImageBuffer) -> Result<Tensor> {
        let rgb = image.to_rgb()?;
        let (src_w, src_h) = (image.width as usize, image.height as usize);
        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            let sx = (x * src_w / size).min(src_w - 1);
            let sy = (y * src_h / size).min(src_h - 1);
            rgb[(sy * src_w + sx) * 3 + c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<RecognizedObject>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output was not rank 3")?;
        self.decoder.decode_rows(view)
    }
}

/// Labels sidecar, one class name per line. A missing file means numbered classes.
fn read_labels(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            log::warn!("tract: could not read labels {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Turns raw `(cx, cy, w, h, objectness, scores..)` rows into lower-left boxes.
struct Decoder {
    input_size: f32,
    labels: Vec<String>,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl Decoder {
    fn label_for(&self, class: usize) -> String {
        self.labels
            .get(class)
            .cloned()
            .unwrap_or_else(|| format!("class_{class}"))
    }

    fn decode_rows(&self, view: tract_ndarray::ArrayView3<f32>) -> Result<Vec<RecognizedObject>> {
        let (_, rows, width) = view.dim();
        if width < 6 {
            return Err(anyhow!("unexpected output row width {}", width));
        }
        let size = self.input_size;
        let mut candidates = Vec::new();
        for row in 0..rows {
            let at = |k: usize| view[[0, row, k]];
            let objectness = at(4);
            let (class, score) = (5..width)
                .map(|k| (k - 5, at(k)))
                .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            let confidence = objectness * score;
            if !confidence.is_finite() || confidence < self.confidence_threshold {
                continue;
            }
            let (cx, cy, w, h) = (at(0) / size, at(1) / size, at(2) / size, at(3) / size);
            let x0 = (cx - w / 2.0).clamp(0.0, 1.0);
            let x1 = (cx + w / 2.0).clamp(0.0, 1.0);
            let top = (cy - h / 2.0).clamp(0.0, 1.0);
            let bottom = (cy + h / 2.0).clamp(0.0, 1.0);
            candidates.push(Candidate {
                class,
                confidence,
                x0,
                top,
                x1,
                bottom,
            });
        }

        let kept = non_max_suppression(candidates, self.iou_threshold);
        Ok(kept
            .into_iter()
            .map(|c| RecognizedObject {
                // Flip to a lower-left origin.
                bounding_box: NormalizedRect::new(
                    c.x0 as f64,
                    (1.0 - c.bottom) as f64,
                    (c.x1 - c.x0) as f64,
                    (c.bottom - c.top) as f64,
                ),
                labels: vec![ClassLabel {
                    identifier: self.label_for(c.class),
                    confidence: c.confidence,
                }],
            })
            .collect())
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    class: usize,
    confidence: f32,
    x0: f32,
    top: f32,
    x1: f32,
    bottom: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x1 - self.x0).max(0.0) * (self.bottom - self.top).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let w = (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0);
        let h = (self.bottom.min(other.bottom) - self.top.max(other.top)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Greedy per-class suppression, highest confidence first.
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Candidate> = Vec::new();
    for cand in candidates {
        let overlaps = kept
            .iter()
            .any(|k| k.class == cand.class && k.iou(&cand) > iou_threshold);
        if !overlaps {
            kept.push(cand);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(
        &mut self,
        image: &ImageBuffer,
        _orientation: ImageOrientation,
    ) -> Result<Vec<RecognizedObject>> {
        let input = self.build_input(image)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }
}
