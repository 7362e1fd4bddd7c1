use anyhow::Result;

use crate::detect::result::RecognizedObject;
use crate::frame::{ImageBuffer, ImageOrientation};

/// Inference backend driven by a detector worker.
///
/// Each worker owns its backend instance, so `detect` takes `&mut self` and needs no
/// internal locking. Implementations must not retain the buffer past the call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one buffer. Boxes are normalized, origin at the lower-left.
    fn detect(
        &mut self,
        image: &ImageBuffer,
        orientation: ImageOrientation,
    ) -> Result<Vec<RecognizedObject>>;

    /// Optional warm-up hook, run once on the worker before the first request.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
