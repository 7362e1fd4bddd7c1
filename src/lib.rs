//! Live detection overlay
//!
//! This crate draws object-detection results over a live camera preview.
//!
//! # Architecture
//!
//! Frames flow in one direction through three execution contexts:
//!
//! 1. **Capture**: a `CaptureSession` reads frames from a `CaptureDevice` and hands each
//!    one, stamped with the device orientation, to `PipelineCoordinator::on_frame`.
//! 2. **Detection**: the `Detector` runs inference asynchronously on its own workers and
//!    reports every completed request, tagged with its sequence token.
//! 3. **Render**: the `RenderContext` is the only writer of overlay state. It drops
//!    results older than the last one drawn and commits each frame's annotations as one
//!    non-animated `Transaction`.
//!
//! # Module Structure
//!
//! - `ingest`: capture devices, the capture session and the orientation sensor
//! - `detect`: model artifacts, detector backends and the detector worker pool
//! - `overlay`: layer model, overlay transform and annotation rendering
//! - `coordinator`: lifecycle state, request tokens and the render context
//! - `frame`, `geometry`, `error`: shared types
//! - `config`, `ui`: ambient glue used by the demo binary

pub mod config;
pub mod coordinator;
pub mod detect;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod overlay;
pub mod ui;

pub use config::PipelineConfig;
pub use coordinator::{
    CoordinatorState, CoordinatorStats, PipelineCoordinator, RenderContext, RenderEvent,
    RenderStats,
};
pub use detect::{
    BackendRegistry, Completion, DetectionRequest, DetectionResult, Detector, DetectorBackend,
    DetectorSettings, ModelArtifact, ModelBundle,
};
pub use error::{PipelineError, PipelineResult};
pub use frame::{
    BufferGeometry, DeviceOrientation, Frame, ImageBuffer, ImageOrientation, PixelFormat,
};
pub use geometry::{AffineTransform, NormalizedRect, Point, Rect, Size};
pub use ingest::{CaptureDevice, CaptureSession, OrientationSensor, SessionConfig, SyntheticCamera};
pub use overlay::{
    render, update_overlay_transform, LayerTree, OverlayAnnotation, OverlayLayer, OverlaySurface,
    Transaction,
};
