//! Detection → screen geometry.
//!
//! Both entry points take the overlay as an explicit value, mutate it, and return the
//! `Transaction` a surface must commit to show the same state.

use std::f64::consts::FRAC_PI_2;

use crate::detect::{Detection, DetectionResult};
use crate::frame::BufferGeometry;
use crate::geometry::{AffineTransform, Point, Rect};
use crate::overlay::layer::{
    Color, Layer, OverlayLayer, TextStyle, LABEL_LAYER_NAME, RECT_LAYER_NAME,
};
use crate::overlay::transaction::{LayerOp, Transaction};

const CORNER_RADIUS: f64 = 7.0;
const LABEL_INSET: f64 = 10.0;

/// A detection placed on screen. Rebuilt for every result and every layout change.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayAnnotation {
    pub label: String,
    pub confidence: f32,
    pub text: String,
    /// Box in overlay (native buffer pixel) space.
    pub layer_rect: Rect,
    /// Box in the parent view's space after the overlay transform.
    pub screen_rect: Rect,
}

pub fn label_text(label: &str, confidence: f32) -> String {
    format!("{label}\nConfidence: {confidence:.2}")
}

/// Replace every annotation with one per detection in `result`.
pub fn render(
    overlay: &mut OverlayLayer,
    geometry: BufferGeometry,
    result: &DetectionResult,
) -> (Vec<OverlayAnnotation>, Transaction) {
    let mut tx = Transaction::begin();
    tx.push(LayerOp::ClearAnnotations);
    overlay.layer.sublayers.clear();

    let mut annotations = Vec::with_capacity(result.len());
    for detection in &result.detections {
        let object_bounds = detection
            .bounding_box
            .to_image_rect(geometry.width, geometry.height);
        let mut shape = rounded_rect_layer(object_bounds);
        shape.sublayers.push(text_layer(object_bounds, detection));

        annotations.push(OverlayAnnotation {
            label: detection.label.clone(),
            confidence: detection.confidence,
            text: label_text(&detection.label, detection.confidence),
            layer_rect: object_bounds,
            screen_rect: overlay.convert_rect_to_parent(object_bounds),
        });
        overlay.layer.sublayers.push(shape.clone());
        tx.push(LayerOp::AddAnnotation(shape));
    }
    (annotations, tx)
}

/// Uniform buffer → screen scale. Width and height swap because buffers are landscape
/// while the view is portrait. Non-finite ratios (unset geometry) fall back to `1.0`.
pub fn overlay_scale(geometry: BufferGeometry, layer_bounds: Rect) -> f64 {
    let x_scale = layer_bounds.size.width / geometry.height as f64;
    let y_scale = layer_bounds.size.height / geometry.width as f64;
    let scale = x_scale.max(y_scale);
    if scale.is_finite() {
        scale
    } else {
        1.0
    }
}

/// Re-fit the overlay after the parent's bounds changed.
///
/// Rotates a quarter turn, scales uniformly, flips Y (detections use a lower-left
/// origin) and centres the overlay on the parent.
pub fn update_overlay_transform(
    overlay: &mut OverlayLayer,
    geometry: BufferGeometry,
    parent_bounds: Rect,
) -> Transaction {
    let scale = overlay_scale(geometry, parent_bounds);
    overlay.scale = scale;
    overlay.layer.bounds = Rect::from_size(geometry.size());
    overlay.layer.transform = AffineTransform::rotation(FRAC_PI_2).scaled_by(scale, -scale);
    overlay.layer.position = parent_bounds.center();

    let mut tx = Transaction::begin();
    tx.push(LayerOp::SetOverlayGeometry {
        bounds: overlay.layer.bounds,
        position: overlay.layer.position,
        transform: overlay.layer.transform,
    });
    tx
}

/// Screen-space annotations for the overlay's current children, e.g. after a relayout.
pub fn project_annotations(overlay: &OverlayLayer) -> Vec<Rect> {
    overlay
        .annotations()
        .iter()
        .map(|shape| overlay.convert_rect_to_parent(shape.bounds))
        .collect()
}

fn rounded_rect_layer(bounds: Rect) -> Layer {
    let mut layer = Layer::new(RECT_LAYER_NAME, bounds, Point::new(bounds.mid_x(), bounds.mid_y()));
    layer.background = Some(Color::HIGHLIGHT);
    layer.corner_radius = CORNER_RADIUS;
    layer
}

/// Label centred in its box and turned a quarter, so its box swaps the object's axes.
fn text_layer(bounds: Rect, detection: &Detection) -> Layer {
    let label_bounds = Rect::new(
        0.0,
        0.0,
        (bounds.size.height - LABEL_INSET).max(0.0),
        (bounds.size.width - LABEL_INSET).max(0.0),
    );
    let mut layer = Layer::new(
        LABEL_LAYER_NAME,
        label_bounds,
        Point::new(bounds.mid_x(), bounds.mid_y()),
    );
    layer.transform = AffineTransform::rotation(FRAC_PI_2);
    layer.text = Some(TextStyle {
        string: label_text(&detection.label, detection.confidence),
        foreground: Color::BLACK,
        shadow_opacity: 0.7,
        shadow_offset: (2.0, 2.0),
        contents_scale: 2.0,
    });
    layer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::NormalizedRect;

    fn detection(label: &str, confidence: f32, bbox: NormalizedRect) -> Detection {
        Detection {
            label: label.to_string(),
            confidence,
            bounding_box: bbox,
        }
    }

    fn phone_bounds() -> Rect {
        Rect::new(0.0, 0.0, 390.0, 844.0)
    }

    #[test]
    fn unset_geometry_scales_by_one() {
        let geometry = BufferGeometry::new(0, 0);
        assert_eq!(overlay_scale(geometry, phone_bounds()), 1.0);
        assert_eq!(overlay_scale(geometry, Rect::ZERO), 1.0);

        let mut overlay = OverlayLayer::new(geometry, phone_bounds());
        update_overlay_transform(&mut overlay, geometry, phone_bounds());
        assert_eq!(overlay.scale, 1.0);
        assert!(overlay.layer.transform.a.is_finite());
    }

    #[test]
    fn scale_fills_portrait_view() {
        let geometry = BufferGeometry::new(1280, 720);
        let scale = overlay_scale(geometry, phone_bounds());
        assert!((scale - 844.0 / 1280.0).abs() < 1e-12);
    }

    #[test]
    fn full_frame_box_covers_transformed_overlay() {
        let geometry = BufferGeometry::new(1280, 720);
        let mut overlay = OverlayLayer::new(geometry, phone_bounds());
        update_overlay_transform(&mut overlay, geometry, phone_bounds());

        let result = DetectionResult {
            detections: vec![detection("person", 0.87, NormalizedRect::FULL)],
        };
        let (annotations, tx) = render(&mut overlay, geometry, &result);

        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].layer_rect, Rect::new(0.0, 0.0, 1280.0, 720.0));
        assert!(annotations[0]
            .screen_rect
            .approx_eq(&overlay.frame_in_parent(), 1e-6));

        let scale = 844.0 / 1280.0;
        let expected = Rect::new(
            195.0 - 720.0 * scale / 2.0,
            0.0,
            720.0 * scale,
            844.0,
        );
        assert!(annotations[0].screen_rect.approx_eq(&expected, 1e-6));
        assert!(tx.actions_disabled());
        assert_eq!(tx.ops()[0], LayerOp::ClearAnnotations);
    }

    #[test]
    fn render_replaces_previous_annotations() {
        let geometry = BufferGeometry::new(640, 480);
        let mut overlay = OverlayLayer::new(geometry, phone_bounds());
        let two = DetectionResult {
            detections: vec![
                detection("cup", 0.5, NormalizedRect::new(0.0, 0.0, 0.5, 0.5)),
                detection("book", 0.25, NormalizedRect::new(0.5, 0.5, 0.5, 0.5)),
            ],
        };
        render(&mut overlay, geometry, &two);
        assert_eq!(overlay.annotations().len(), 2);

        let (annotations, _) = render(&mut overlay, geometry, &DetectionResult::default());
        assert!(annotations.is_empty());
        assert!(overlay.annotations().is_empty());
    }

    #[test]
    fn label_layer_shows_identifier_and_confidence() {
        let geometry = BufferGeometry::new(640, 480);
        let mut overlay = OverlayLayer::new(geometry, phone_bounds());
        let result = DetectionResult {
            detections: vec![detection(
                "bottle",
                0.456,
                NormalizedRect::new(0.25, 0.25, 0.5, 0.25),
            )],
        };
        let (annotations, _) = render(&mut overlay, geometry, &result);
        assert_eq!(annotations[0].text, "bottle\nConfidence: 0.46");

        let shape = &overlay.annotations()[0];
        assert_eq!(shape.name, RECT_LAYER_NAME);
        assert_eq!(shape.bounds, Rect::new(160.0, 120.0, 320.0, 120.0));
        assert_eq!(shape.corner_radius, 7.0);
        let label = &shape.sublayers[0];
        assert_eq!(label.bounds, Rect::new(0.0, 0.0, 110.0, 310.0));
        assert_eq!(label.position, Point::new(320.0, 180.0));
        assert_eq!(
            label.text.as_ref().map(|t| t.string.as_str()),
            Some("bottle\nConfidence: 0.46")
        );
    }

    #[test]
    fn relayout_reprojects_existing_annotations() {
        let geometry = BufferGeometry::new(1280, 720);
        let mut overlay = OverlayLayer::new(geometry, phone_bounds());
        update_overlay_transform(&mut overlay, geometry, phone_bounds());
        let result = DetectionResult {
            detections: vec![detection("cat", 0.9, NormalizedRect::FULL)],
        };
        render(&mut overlay, geometry, &result);

        let landscape = Rect::new(0.0, 0.0, 844.0, 390.0);
        update_overlay_transform(&mut overlay, geometry, landscape);
        let rects = project_annotations(&overlay);
        assert_eq!(rects.len(), 1);
        assert!(rects[0].approx_eq(&overlay.frame_in_parent(), 1e-6));
        assert!((overlay.frame_in_parent().mid_x() - 422.0).abs() < 1e-6);
    }
}
