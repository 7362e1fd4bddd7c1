//! Overlay presentation model.
//!
//! The overlay is plain data (`OverlayLayer`) so geometry can be computed and tested
//! without a live surface. Every change reaches a surface as a `Transaction`, committed
//! atomically with implicit animations off.

mod layer;
mod render;
mod transaction;

pub use layer::{
    Color, Layer, OverlayLayer, TextStyle, VideoGravity, LABEL_LAYER_NAME, OVERLAY_LAYER_NAME,
    PREVIEW_LAYER_NAME, RECT_LAYER_NAME,
};
pub use render::{
    label_text, overlay_scale, project_annotations, render, update_overlay_transform,
    OverlayAnnotation,
};
pub use transaction::{LayerOp, LayerTree, OverlaySurface, Transaction, RECENT_COMMITS};
