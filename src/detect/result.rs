use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedRect;

/// One candidate label for a recognized object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassLabel {
    pub identifier: String,
    pub confidence: f32,
}

/// Raw backend output: a box plus its ranked labels, best first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecognizedObject {
    pub bounding_box: NormalizedRect,
    pub labels: Vec<ClassLabel>,
}

/// A detected object reduced to its top label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub bounding_box: NormalizedRect,
}

/// Everything the detector found in one submitted frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    /// Keeps the top label of each object. Objects without labels or with a box outside
    /// the unit square are dropped; confidences are clamped into `[0, 1]`.
    pub fn from_objects(objects: Vec<RecognizedObject>) -> Self {
        let detections = objects
            .into_iter()
            .filter(|object| object.bounding_box.is_valid())
            .filter_map(|object| {
                let top = object.labels.into_iter().next()?;
                Some(Detection {
                    label: top.identifier,
                    confidence: sanitize_confidence(top.confidence),
                    bounding_box: object.bounding_box,
                })
            })
            .collect();
        Self { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

fn sanitize_confidence(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(id: &str, confidence: f32) -> ClassLabel {
        ClassLabel {
            identifier: id.to_string(),
            confidence,
        }
    }

    #[test]
    fn keeps_only_top_label() {
        let result = DetectionResult::from_objects(vec![RecognizedObject {
            bounding_box: NormalizedRect::new(0.1, 0.1, 0.2, 0.2),
            labels: vec![label("dog", 0.8), label("cat", 0.15)],
        }]);
        assert_eq!(result.len(), 1);
        assert_eq!(result.detections[0].label, "dog");
        assert_eq!(result.detections[0].confidence, 0.8);
    }

    #[test]
    fn drops_unlabeled_and_out_of_range_objects() {
        let result = DetectionResult::from_objects(vec![
            RecognizedObject {
                bounding_box: NormalizedRect::new(0.1, 0.1, 0.2, 0.2),
                labels: vec![],
            },
            RecognizedObject {
                bounding_box: NormalizedRect::new(0.9, 0.1, 0.5, 0.2),
                labels: vec![label("car", 0.9)],
            },
            RecognizedObject {
                bounding_box: NormalizedRect::FULL,
                labels: vec![label("person", 1.7)],
            },
        ]);
        assert_eq!(result.len(), 1);
        assert_eq!(result.detections[0].label, "person");
        assert_eq!(result.detections[0].confidence, 1.0);
    }
}
