use anyhow::{anyhow, Result};
use std::collections::VecDeque;

use crate::geometry::{AffineTransform, Point, Rect};
use crate::overlay::layer::{Layer, VideoGravity, OVERLAY_LAYER_NAME, PREVIEW_LAYER_NAME};

/// A single mutation of the presentation tree.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerOp {
    InstallPreview { frame: Rect, gravity: VideoGravity },
    InstallOverlay { bounds: Rect, position: Point },
    SetOverlayGeometry {
        bounds: Rect,
        position: Point,
        transform: AffineTransform,
    },
    ClearAnnotations,
    AddAnnotation(Layer),
    RemoveOverlay,
}

/// Mutations applied together: a surface shows either none or all of them.
#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    ops: Vec<LayerOp>,
    disable_actions: bool,
}

impl Transaction {
    /// New transaction with implicit animations disabled.
    pub fn begin() -> Self {
        Self {
            ops: Vec::new(),
            disable_actions: true,
        }
    }

    pub fn push(&mut self, op: LayerOp) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[LayerOp] {
        &self.ops
    }

    pub fn actions_disabled(&self) -> bool {
        self.disable_actions
    }

    fn touches_annotations(&self) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, LayerOp::ClearAnnotations))
    }
}

/// Presentation surface the render context commits to.
///
/// Implementations are only ever called from the render context.
pub trait OverlaySurface {
    fn commit(&mut self, transaction: Transaction) -> Result<()>;
}

/// Transactions `LayerTree` keeps for inspection; older ones are only counted.
pub const RECENT_COMMITS: usize = 16;

/// In-memory surface: keeps the committed tree, commit counters and the most recent
/// transactions.
#[derive(Debug, Default)]
pub struct LayerTree {
    preview: Option<Layer>,
    overlay: Option<Layer>,
    recent: VecDeque<Transaction>,
    commit_count: usize,
    render_commits: usize,
}

impl LayerTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preview(&self) -> Option<&Layer> {
        self.preview.as_ref()
    }

    pub fn overlay(&self) -> Option<&Layer> {
        self.overlay.as_ref()
    }

    pub fn annotations(&self) -> &[Layer] {
        self.overlay
            .as_ref()
            .map(|o| o.sublayers.as_slice())
            .unwrap_or(&[])
    }

    /// Up to `RECENT_COMMITS` transactions, oldest first.
    pub fn recent_commits(&self) -> impl Iterator<Item = &Transaction> {
        self.recent.iter()
    }

    pub fn last_commit(&self) -> Option<&Transaction> {
        self.recent.back()
    }

    /// Every successful commit since creation.
    pub fn commit_count(&self) -> usize {
        self.commit_count
    }

    /// Commits that touched annotations.
    pub fn render_commits(&self) -> usize {
        self.render_commits
    }

    fn apply(&mut self, op: &LayerOp) -> Result<()> {
        match op {
            LayerOp::InstallPreview { frame, gravity } => {
                log::trace!("preview installed at {:?} with {:?}", frame, gravity);
                self.preview = Some(Layer::new(
                    PREVIEW_LAYER_NAME,
                    Rect::from_size(frame.size),
                    frame.center(),
                ));
            }
            LayerOp::InstallOverlay { bounds, position } => {
                self.overlay = Some(Layer::new(OVERLAY_LAYER_NAME, *bounds, *position));
            }
            LayerOp::SetOverlayGeometry {
                bounds,
                position,
                transform,
            } => {
                let overlay = self.overlay_mut()?;
                overlay.bounds = *bounds;
                overlay.position = *position;
                overlay.transform = *transform;
            }
            LayerOp::ClearAnnotations => self.overlay_mut()?.sublayers.clear(),
            LayerOp::AddAnnotation(layer) => self.overlay_mut()?.sublayers.push(layer.clone()),
            LayerOp::RemoveOverlay => self.overlay = None,
        }
        Ok(())
    }

    fn overlay_mut(&mut self) -> Result<&mut Layer> {
        self.overlay
            .as_mut()
            .ok_or_else(|| anyhow!("no overlay layer installed"))
    }
}

impl OverlaySurface for LayerTree {
    fn commit(&mut self, transaction: Transaction) -> Result<()> {
        // Apply to a scratch copy so a failing op leaves the visible tree untouched.
        let mut staged = LayerTree {
            preview: self.preview.clone(),
            overlay: self.overlay.clone(),
            ..LayerTree::default()
        };
        for op in transaction.ops() {
            staged.apply(op)?;
        }
        self.preview = staged.preview;
        self.overlay = staged.overlay;
        self.commit_count += 1;
        if transaction.touches_annotations() {
            self.render_commits += 1;
        }
        if self.recent.len() == RECENT_COMMITS {
            self.recent.pop_front();
        }
        self.recent.push_back(transaction);
        Ok(())
    }
}
