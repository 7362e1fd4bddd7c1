use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::detect::DetectionResult;
use crate::frame::BufferGeometry;
use crate::geometry::Rect;
use crate::overlay::{
    project_annotations, render, update_overlay_transform, LayerOp, OverlayAnnotation,
    OverlayLayer, OverlaySurface, Transaction, VideoGravity,
};

/// Work marshalled onto the render context.
#[derive(Clone, Debug)]
pub enum RenderEvent {
    Detections { token: u64, result: DetectionResult },
    Layout { parent_bounds: Rect },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub rendered: u64,
    /// Results older than the last one drawn.
    pub stale: u64,
    /// Results that arrived with no overlay attached.
    pub detached: u64,
    pub commit_failures: u64,
}

struct Attached<S> {
    surface: S,
    overlay: OverlayLayer,
    parent_bounds: Rect,
}

/// Sole owner and writer of overlay state.
///
/// Lives on the thread that may touch the presentation surface and is driven by
/// `pump` / `drain` from that thread.
pub struct RenderContext<S> {
    events: Receiver<RenderEvent>,
    geometry: BufferGeometry,
    attached: Option<Attached<S>>,
    last_rendered: u64,
    annotations: Vec<OverlayAnnotation>,
    stats: RenderStats,
}

impl<S: OverlaySurface> RenderContext<S> {
    pub(crate) fn new(events: Receiver<RenderEvent>, geometry: BufferGeometry) -> Self {
        Self {
            events,
            geometry,
            attached: None,
            last_rendered: 0,
            annotations: Vec::new(),
            stats: RenderStats::default(),
        }
    }

    /// Installs the preview and an empty overlay on `surface`, fitted to `parent_bounds`.
    pub fn attach(&mut self, mut surface: S, parent_bounds: Rect) -> Result<()> {
        if self.attached.is_some() {
            self.detach();
        }
        let mut overlay = OverlayLayer::new(self.geometry, parent_bounds);
        let mut tx = Transaction::begin();
        tx.push(LayerOp::InstallPreview {
            frame: parent_bounds,
            gravity: VideoGravity::ResizeAspectFill,
        });
        tx.push(LayerOp::InstallOverlay {
            bounds: overlay.layer.bounds,
            position: overlay.layer.position,
        });
        for op in update_overlay_transform(&mut overlay, self.geometry, parent_bounds).ops() {
            tx.push(op.clone());
        }
        surface.commit(tx)?;
        log::info!(
            "overlay attached: buffer {}x{}, view {}x{}, scale {:.3}",
            self.geometry.width,
            self.geometry.height,
            parent_bounds.size.width,
            parent_bounds.size.height,
            overlay.scale
        );
        self.attached = Some(Attached {
            surface,
            overlay,
            parent_bounds,
        });
        Ok(())
    }

    /// Removes the overlay and hands back the surface. Later results are discarded.
    pub fn detach(&mut self) -> Option<S> {
        let mut attached = self.attached.take()?;
        let mut tx = Transaction::begin();
        tx.push(LayerOp::RemoveOverlay);
        if let Err(e) = attached.surface.commit(tx) {
            log::warn!("overlay detach commit failed: {:#}", e);
        }
        self.annotations.clear();
        log::info!("overlay detached");
        Some(attached.surface)
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    pub fn surface(&self) -> Option<&S> {
        self.attached.as_ref().map(|a| &a.surface)
    }

    pub fn overlay(&self) -> Option<&OverlayLayer> {
        self.attached.as_ref().map(|a| &a.overlay)
    }

    /// Annotations from the most recent render, in current screen space.
    pub fn annotations(&self) -> &[OverlayAnnotation] {
        &self.annotations
    }

    pub fn last_rendered_token(&self) -> Option<u64> {
        (self.last_rendered > 0).then_some(self.last_rendered)
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Waits up to `timeout` for one event, then handles everything already queued.
    /// Returns the number of events handled.
    pub fn pump(&mut self, timeout: Duration) -> usize {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                self.handle(event);
                1 + self.drain()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Handles every queued event without waiting.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    pub fn handle(&mut self, event: RenderEvent) {
        match event {
            RenderEvent::Detections { token, result } => self.on_detections(token, result),
            RenderEvent::Layout { parent_bounds } => self.on_layout(parent_bounds),
        }
    }

    fn on_detections(&mut self, token: u64, result: DetectionResult) {
        let Some(attached) = self.attached.as_mut() else {
            self.stats.detached += 1;
            log::debug!("result {} discarded: overlay detached", token);
            return;
        };
        if token <= self.last_rendered {
            self.stats.stale += 1;
            log::debug!(
                "result {} discarded: older than rendered {}",
                token,
                self.last_rendered
            );
            return;
        }

        let mut overlay = attached.overlay.clone();
        let (annotations, tx) = render(&mut overlay, self.geometry, &result);
        if let Err(e) = attached.surface.commit(tx) {
            self.stats.commit_failures += 1;
            log::error!("overlay commit for result {} failed: {:#}", token, e);
            return;
        }
        attached.overlay = overlay;
        self.last_rendered = token;
        self.stats.rendered += 1;
        log::debug!("result {} rendered with {} annotation(s)", token, annotations.len());
        self.annotations = annotations;
    }

    fn on_layout(&mut self, parent_bounds: Rect) {
        let Some(attached) = self.attached.as_mut() else {
            return;
        };
        let mut overlay = attached.overlay.clone();
        let mut tx = update_overlay_transform(&mut overlay, self.geometry, parent_bounds);
        tx.push(LayerOp::InstallPreview {
            frame: parent_bounds,
            gravity: VideoGravity::ResizeAspectFill,
        });
        if let Err(e) = attached.surface.commit(tx) {
            self.stats.commit_failures += 1;
            log::error!("overlay relayout failed: {:#}", e);
            return;
        }
        for (annotation, screen_rect) in self
            .annotations
            .iter_mut()
            .zip(project_annotations(&overlay))
        {
            annotation.screen_rect = screen_rect;
        }
        attached.overlay = overlay;
        attached.parent_bounds = parent_bounds;
        log::debug!(
            "overlay relayout to {}x{} (scale {:.3})",
            parent_bounds.size.width,
            parent_bounds.size.height,
            attached.overlay.scale
        );
    }

    pub fn parent_bounds(&self) -> Option<Rect> {
        self.attached.as_ref().map(|a| a.parent_bounds)
    }
}
