//! Pipeline coordinator.
//!
//! Bridges the capture context (`on_frame`), the detector's completion context
//! (`on_detection_complete`) and the render context (`RenderContext`). The coordinator
//! itself never touches overlay state: completions travel to the render context over a
//! channel, tagged with the token of the request that produced them.
//!
//! Lifecycle: `Idle → AwaitingModel → Ready`, or `AwaitingModel → Failed` when the model
//! cannot be loaded. `Failed` is terminal; frames keep arriving and are dropped.

mod render_context;

pub use render_context::{RenderContext, RenderEvent, RenderStats};

use crossbeam_channel::{unbounded, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::detect::{Completion, CompletionHandler, DetectionRequest, Detector};
use crate::error::PipelineResult;
use crate::frame::{BufferGeometry, Frame};
use crate::geometry::Rect;
use crate::overlay::OverlaySurface;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    AwaitingModel,
    Ready,
    Failed,
}

/// Counter snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub frames_seen: u64,
    pub submitted: u64,
    /// Frames that arrived while no detector was available.
    pub dropped_inactive: u64,
    /// Frames whose request could not be built or dispatched.
    pub dropped_failed: u64,
    pub completed: u64,
}

#[derive(Default)]
struct Counters {
    frames_seen: AtomicU64,
    submitted: AtomicU64,
    dropped_inactive: AtomicU64,
    dropped_failed: AtomicU64,
    completed: AtomicU64,
}

/// What a detector worker needs to hand a completion to the render context.
///
/// Holds no reference to the coordinator, so a worker never keeps it alive.
#[derive(Clone)]
struct CompletionSink {
    events: Sender<RenderEvent>,
    counters: Arc<Counters>,
}

impl CompletionSink {
    fn deliver(&self, completion: Completion) {
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        let token = completion.token;
        if self
            .events
            .send(RenderEvent::Detections {
                token,
                result: completion.result,
            })
            .is_err()
        {
            log::debug!("render context gone, discarding result {}", token);
        }
    }
}

struct Inner {
    state: Mutex<CoordinatorState>,
    detector: RwLock<Option<Detector>>,
    next_token: AtomicU64,
    sink: CompletionSink,
}

/// Cheap to clone; clones share one pipeline.
#[derive(Clone)]
pub struct PipelineCoordinator {
    inner: Arc<Inner>,
}

impl PipelineCoordinator {
    /// Creates a coordinator and the render context that will draw its results.
    pub fn new<S: OverlaySurface>(geometry: BufferGeometry) -> (Self, RenderContext<S>) {
        let (tx, rx) = unbounded();
        let coordinator = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CoordinatorState::Idle),
                detector: RwLock::new(None),
                next_token: AtomicU64::new(1),
                sink: CompletionSink {
                    events: tx,
                    counters: Arc::new(Counters::default()),
                },
            }),
        };
        (coordinator, RenderContext::new(rx, geometry))
    }

    pub fn state(&self) -> CoordinatorState {
        match self.inner.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, next: CoordinatorState) {
        let mut guard = match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        log::debug!("coordinator: {:?} -> {:?}", *guard, next);
        *guard = next;
    }

    /// Loads the detector. `load` receives the handler the detector must call for every
    /// completed request.
    ///
    /// Only valid from `Idle`; later calls are ignored. Returns the resulting state.
    pub fn start<F>(&self, load: F) -> CoordinatorState
    where
        F: FnOnce(CompletionHandler) -> PipelineResult<Detector>,
    {
        {
            let mut guard = match self.inner.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if *guard != CoordinatorState::Idle {
                log::warn!("coordinator: start ignored in state {:?}", *guard);
                return *guard;
            }
            *guard = CoordinatorState::AwaitingModel;
        }

        let sink = self.inner.sink.clone();
        let handler: CompletionHandler = Arc::new(move |completion| sink.deliver(completion));
        match load(handler) {
            Ok(detector) => {
                log::info!(
                    "coordinator: detector ready (backend={}, model={})",
                    detector.backend_name(),
                    detector.model_name()
                );
                match self.inner.detector.write() {
                    Ok(mut slot) => *slot = Some(detector),
                    Err(poisoned) => *poisoned.into_inner() = Some(detector),
                }
                self.set_state(CoordinatorState::Ready);
            }
            Err(e) => {
                log::error!("coordinator: detection disabled: {}", e);
                self.set_state(CoordinatorState::Failed);
            }
        }
        self.state()
    }

    /// Capture-context entry point. Never blocks on inference.
    pub fn on_frame(&self, frame: Frame) {
        let counters = &self.inner.sink.counters;
        counters.frames_seen.fetch_add(1, Ordering::Relaxed);

        let guard = match self.inner.detector.read() {
            Ok(guard) => guard,
            Err(_) => {
                log::error!(
                    "coordinator: detector lock poisoned, frame {} dropped",
                    frame.sequence
                );
                counters.dropped_failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        let Some(detector) = guard.as_ref() else {
            counters.dropped_inactive.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let token = self.inner.next_token.fetch_add(1, Ordering::SeqCst);
        let sequence = frame.sequence;
        match DetectionRequest::from_frame(token, frame).and_then(|req| detector.submit(req)) {
            Ok(()) => {
                counters.submitted.fetch_add(1, Ordering::Relaxed);
                log::trace!("frame {} submitted as request {}", sequence, token);
            }
            Err(e) => {
                counters.dropped_failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("frame {} dropped: {}", sequence, e);
            }
        }
    }

    /// Detector-context entry point: forwards a completion to the render context.
    pub fn on_detection_complete(&self, completion: Completion) {
        self.inner.sink.deliver(completion);
    }

    /// Asks the render context to refit the overlay to new parent bounds.
    pub fn layout_changed(&self, parent_bounds: Rect) {
        if self
            .inner
            .sink
            .events
            .send(RenderEvent::Layout { parent_bounds })
            .is_err()
        {
            log::debug!("render context gone, layout change ignored");
        }
    }

    /// Stops issuing requests and waits for the detector's workers. Results still in
    /// flight are delivered, and discarded if the overlay is already detached.
    pub fn shutdown(&self) {
        let detector = match self.inner.detector.write() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if detector.is_some() {
            drop(detector);
            log::info!("coordinator: detector stopped");
        }
    }

    pub fn stats(&self) -> CoordinatorStats {
        let c = &self.inner.sink.counters;
        CoordinatorStats {
            frames_seen: c.frames_seen.load(Ordering::Relaxed),
            submitted: c.submitted.load(Ordering::Relaxed),
            dropped_inactive: c.dropped_inactive.load(Ordering::Relaxed),
            dropped_failed: c.dropped_failed.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectionResult, StubBackend, StubFrame, StubObject};
    use crate::error::PipelineError;
    use crate::frame::{DeviceOrientation, ImageBuffer, PixelFormat};
    use crate::geometry::NormalizedRect;
    use crate::overlay::LayerTree;
    use std::time::Duration;

    fn frame(sequence: u64) -> Frame {
        Frame::new(
            ImageBuffer::new(vec![0u8; 6], 2, 2, PixelFormat::Yuv420BiPlanarFullRange),
            DeviceOrientation::Portrait,
            sequence,
        )
    }

    #[test]
    fn frames_before_start_are_dropped_quietly() {
        let (coordinator, _render) = PipelineCoordinator::new::<LayerTree>(BufferGeometry::new(2, 2));
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        coordinator.on_frame(frame(0));
        let stats = coordinator.stats();
        assert_eq!(stats.frames_seen, 1);
        assert_eq!(stats.dropped_inactive, 1);
        assert_eq!(stats.submitted, 0);
    }

    #[test]
    fn missing_model_is_terminal() {
        let (coordinator, _render) = PipelineCoordinator::new::<LayerTree>(BufferGeometry::new(2, 2));
        let state = coordinator.start(|_| {
            Err(PipelineError::ModelArtifactMissing("Model file is missing!".into()))
        });
        assert_eq!(state, CoordinatorState::Failed);

        let restarted = coordinator.start(|handler| {
            Ok(Detector::spawn(
                "stub".into(),
                vec![Box::new(StubBackend::scripted(vec![]))],
                1,
                handler,
            ))
        });
        assert_eq!(restarted, CoordinatorState::Failed);
    }

    #[test]
    fn ready_coordinator_submits_and_completes() {
        let (coordinator, mut render) =
            PipelineCoordinator::new::<LayerTree>(BufferGeometry::new(2, 2));
        let script = vec![StubFrame::objects(vec![StubObject::new(
            "cup",
            0.9,
            NormalizedRect::FULL,
        )])];
        let state = coordinator.start(|handler| {
            Ok(Detector::spawn(
                "stub".into(),
                vec![Box::new(StubBackend::scripted(script))],
                4,
                handler,
            ))
        });
        assert_eq!(state, CoordinatorState::Ready);

        coordinator.on_frame(frame(0));
        let handled = render.pump(Duration::from_secs(5));
        assert_eq!(handled, 1);
        assert_eq!(coordinator.stats().submitted, 1);
        assert_eq!(coordinator.stats().completed, 1);
    }

    #[test]
    fn malformed_frames_are_dropped_not_fatal() {
        let (coordinator, _render) = PipelineCoordinator::new::<LayerTree>(BufferGeometry::new(2, 2));
        coordinator.start(|handler| {
            Ok(Detector::spawn(
                "stub".into(),
                vec![Box::new(StubBackend::scripted(vec![]))],
                4,
                handler,
            ))
        });
        coordinator.on_frame(Frame::new(
            ImageBuffer::new(vec![1, 2, 3], 2, 2, PixelFormat::Yuv420BiPlanarFullRange),
            DeviceOrientation::Portrait,
            0,
        ));
        assert_eq!(coordinator.stats().dropped_failed, 1);
        assert_eq!(coordinator.state(), CoordinatorState::Ready);
    }

    #[test]
    fn completions_after_render_context_drop_are_discarded() {
        let (coordinator, render) = PipelineCoordinator::new::<LayerTree>(BufferGeometry::new(2, 2));
        drop(render);
        coordinator.on_detection_complete(Completion {
            token: 1,
            result: DetectionResult::default(),
        });
        assert_eq!(coordinator.stats().completed, 1);
    }
}
