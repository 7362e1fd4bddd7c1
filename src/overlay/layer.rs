use serde::Serialize;

use crate::frame::BufferGeometry;
use crate::geometry::{AffineTransform, Point, Rect};

pub const OVERLAY_LAYER_NAME: &str = "Detection Overlay Layer";
pub const PREVIEW_LAYER_NAME: &str = "Preview Layer";
pub const RECT_LAYER_NAME: &str = "Object Rect Layer";
pub const LABEL_LAYER_NAME: &str = "Object Label Layer";

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const HIGHLIGHT: Color = Color::rgba(1.0, 1.0, 0.2, 0.4);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

/// How the camera preview fills its layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum VideoGravity {
    Resize,
    ResizeAspect,
    #[default]
    ResizeAspectFill,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TextStyle {
    pub string: String,
    pub foreground: Color,
    pub shadow_opacity: f32,
    pub shadow_offset: (f64, f64),
    pub contents_scale: f64,
}

/// Presentation-independent description of one layer.
///
/// `position` is where the centre of `bounds` sits in the parent; `transform` is applied
/// around that centre.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Layer {
    pub name: String,
    pub bounds: Rect,
    pub position: Point,
    pub transform: AffineTransform,
    pub background: Option<Color>,
    pub corner_radius: f64,
    pub text: Option<TextStyle>,
    pub sublayers: Vec<Layer>,
}

impl Layer {
    pub fn new(name: &str, bounds: Rect, position: Point) -> Self {
        Self {
            name: name.to_string(),
            bounds,
            position,
            transform: AffineTransform::IDENTITY,
            background: None,
            corner_radius: 0.0,
            text: None,
            sublayers: Vec::new(),
        }
    }

    /// Maps a rectangle in this layer's bounds space into its parent's space.
    pub fn convert_rect_to_parent(&self, rect: Rect) -> Rect {
        let anchor = self.bounds.center();
        let corners = [
            Point::new(rect.min_x(), rect.min_y()),
            Point::new(rect.max_x(), rect.min_y()),
            Point::new(rect.min_x(), rect.max_y()),
            Point::new(rect.max_x(), rect.max_y()),
        ]
        .map(|c| {
            let p = self
                .transform
                .apply(Point::new(c.x - anchor.x, c.y - anchor.y));
            Point::new(self.position.x + p.x, self.position.y + p.y)
        });
        Rect::bounding(&corners)
    }

    /// Frame this layer occupies in its parent.
    pub fn frame(&self) -> Rect {
        self.convert_rect_to_parent(self.bounds)
    }
}

/// The annotation layer that sits over the camera preview.
///
/// Its bounds are the capture buffer in native pixels; `transform` maps them onto the
/// screen. Annotations are direct children.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayLayer {
    pub layer: Layer,
    pub scale: f64,
}

impl OverlayLayer {
    pub fn new(geometry: BufferGeometry, parent_bounds: Rect) -> Self {
        let layer = Layer::new(
            OVERLAY_LAYER_NAME,
            Rect::from_size(geometry.size()),
            parent_bounds.center(),
        );
        Self { layer, scale: 1.0 }
    }

    pub fn annotations(&self) -> &[Layer] {
        &self.layer.sublayers
    }

    pub fn convert_rect_to_parent(&self, rect: Rect) -> Rect {
        self.layer.convert_rect_to_parent(rect)
    }

    pub fn frame_in_parent(&self) -> Rect {
        self.layer.frame()
    }
}
