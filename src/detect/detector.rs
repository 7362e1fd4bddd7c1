//! Asynchronous detector.
//!
//! Requests are queued to a fixed pool of worker threads, each owning its own backend.
//! `submit` never blocks the caller: a full queue rejects the request. With more than
//! one worker, completions may arrive out of submission order; callers order them with
//! the request token.

use crossbeam_channel::{bounded, Sender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::detect::artifact::ModelArtifact;
use crate::detect::backend::DetectorBackend;
use crate::detect::result::DetectionResult;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::{Frame, ImageBuffer, ImageOrientation};

pub const DEFAULT_DETECTOR_WORKERS: usize = 2;
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

/// One buffer + orientation submitted for inference.
pub struct DetectionRequest {
    pub token: u64,
    pub orientation: ImageOrientation,
    buffer: ImageBuffer,
}

impl DetectionRequest {
    /// Builds a request from a captured frame. Fails on a malformed buffer.
    pub fn from_frame(token: u64, frame: Frame) -> PipelineResult<Self> {
        frame.buffer.validate()?;
        Ok(Self {
            token,
            orientation: ImageOrientation::from_device(frame.orientation),
            buffer: frame.buffer,
        })
    }

    pub fn buffer(&self) -> &ImageBuffer {
        &self.buffer
    }
}

/// Result for one request, tagged with the request's token.
#[derive(Clone, Debug)]
pub struct Completion {
    pub token: u64,
    pub result: DetectionResult,
}

/// Called on a detector worker thread for every completed request.
pub type CompletionHandler = Arc<dyn Fn(Completion) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DetectorSettings {
    pub workers: usize,
    pub queue_depth: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_DETECTOR_WORKERS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

pub struct Detector {
    backend_name: &'static str,
    model_name: String,
    queue: Option<Sender<DetectionRequest>>,
    workers: Vec<JoinHandle<()>>,
}

impl Detector {
    /// Loads one backend per worker from `artifact` and starts the pool.
    ///
    /// Any load failure is reported as `ModelArtifactMissing`: a model that cannot be
    /// loaded is as unusable as one that is absent.
    pub fn load<L>(
        artifact: &ModelArtifact,
        settings: DetectorSettings,
        load_backend: L,
        on_complete: CompletionHandler,
    ) -> PipelineResult<Self>
    where
        L: Fn(&ModelArtifact) -> anyhow::Result<Box<dyn DetectorBackend>>,
    {
        let workers = settings.workers.max(1);
        let mut backends = Vec::with_capacity(workers);
        for _ in 0..workers {
            let backend = load_backend(artifact).map_err(|e| {
                PipelineError::ModelArtifactMissing(format!(
                    "model {} at {} could not be loaded: {:#}",
                    artifact.name,
                    artifact.path.display(),
                    e
                ))
            })?;
            backends.push(backend);
        }
        log::info!(
            "detector: loaded model {} (sha256 {}) with {} worker(s)",
            artifact.name,
            artifact.digest_hex(),
            workers
        );
        Ok(Self::spawn(
            artifact.name.clone(),
            backends,
            settings.queue_depth,
            on_complete,
        ))
    }

    /// Starts a pool over already-constructed backends.
    pub fn spawn(
        model_name: String,
        backends: Vec<Box<dyn DetectorBackend>>,
        queue_depth: usize,
        on_complete: CompletionHandler,
    ) -> Self {
        let backend_name = backends.first().map(|b| b.name()).unwrap_or("none");
        let (tx, rx) = bounded::<DetectionRequest>(queue_depth.max(1));
        let workers = backends
            .into_iter()
            .enumerate()
            .map(|(id, mut backend)| {
                let rx = rx.clone();
                let on_complete = on_complete.clone();
                std::thread::spawn(move || {
                    if let Err(e) = backend.warm_up() {
                        log::warn!("detector worker {}: warm-up failed: {:#}", id, e);
                    }
                    for request in rx.iter() {
                        match backend.detect(&request.buffer, request.orientation) {
                            Ok(objects) => on_complete(Completion {
                                token: request.token,
                                result: DetectionResult::from_objects(objects),
                            }),
                            Err(e) => {
                                log::warn!(
                                    "detector worker {}: request {} failed: {:#}",
                                    id,
                                    request.token,
                                    e
                                );
                            }
                        }
                    }
                    log::debug!("detector worker {} stopped", id);
                })
            })
            .collect();

        Self {
            backend_name,
            model_name,
            queue: Some(tx),
            workers,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Hands a request to the pool without waiting for inference.
    pub fn submit(&self, request: DetectionRequest) -> PipelineResult<()> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| PipelineError::DetectionRequestFailure("detector stopped".into()))?;
        match queue.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(request)) => Err(PipelineError::DetectionRequestFailure(
                format!("detector overloaded, request {} dropped", request.token),
            )),
            Err(TrySendError::Disconnected(_)) => Err(PipelineError::DetectionRequestFailure(
                "detector stopped".into(),
            )),
        }
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        // Closing the queue lets workers finish what they hold and exit.
        self.queue.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("detector worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::stub::{StubBackend, StubFrame, StubObject};
    use crate::frame::{DeviceOrientation, PixelFormat};
    use crate::geometry::NormalizedRect;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    fn frame(orientation: DeviceOrientation) -> Frame {
        Frame::new(
            ImageBuffer::new(vec![0u8; 6], 2, 2, PixelFormat::Yuv420BiPlanarFullRange),
            orientation,
            0,
        )
    }

    fn one_object() -> StubFrame {
        StubFrame::objects(vec![StubObject::new("cup", 0.5, NormalizedRect::FULL)])
    }

    #[test]
    fn request_captures_orientation_at_construction() {
        let req = DetectionRequest::from_frame(1, frame(DeviceOrientation::LandscapeLeft)).unwrap();
        assert_eq!(req.orientation, ImageOrientation::UpMirrored);
        assert_eq!(req.token, 1);
    }

    #[test]
    fn malformed_frame_is_rejected() {
        let bad = Frame::new(
            ImageBuffer::new(vec![0u8; 3], 2, 2, PixelFormat::Yuv420BiPlanarFullRange),
            DeviceOrientation::Portrait,
            0,
        );
        assert!(matches!(
            DetectionRequest::from_frame(1, bad),
            Err(PipelineError::DetectionRequestFailure(_))
        ));
    }

    #[test]
    fn completes_submitted_requests() {
        let (tx, rx) = unbounded();
        let handler: CompletionHandler = Arc::new(move |c| {
            let _ = tx.send(c);
        });
        let detector = Detector::spawn(
            "stub".into(),
            vec![Box::new(StubBackend::scripted(vec![one_object()]))],
            4,
            handler,
        );
        for token in 1..=3 {
            let req = DetectionRequest::from_frame(token, frame(DeviceOrientation::Portrait))
                .unwrap();
            detector.submit(req).unwrap();
        }
        let mut tokens: Vec<u64> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap().token)
            .collect();
        tokens.sort();
        assert_eq!(tokens, vec![1, 2, 3]);
        drop(detector);
    }

    #[test]
    fn full_queue_rejects_without_blocking() {
        let handler: CompletionHandler = Arc::new(|_| {});
        let slow = StubFrame::objects(vec![]).with_latency_ms(300);
        let detector = Detector::spawn(
            "stub".into(),
            vec![Box::new(StubBackend::scripted(vec![slow]))],
            1,
            handler,
        );
        let mut rejected = 0;
        for token in 1..=5 {
            let req = DetectionRequest::from_frame(token, frame(DeviceOrientation::Portrait))
                .unwrap();
            if let Err(PipelineError::DetectionRequestFailure(msg)) = detector.submit(req) {
                assert!(msg.contains("overloaded"));
                rejected += 1;
            }
        }
        assert!(rejected >= 3, "expected most requests rejected, got {rejected}");
    }

    #[test]
    fn failed_inference_produces_no_completion() {
        let (tx, rx) = unbounded();
        let handler: CompletionHandler = Arc::new(move |c| {
            let _ = tx.send(c);
        });
        let detector = Detector::spawn(
            "stub".into(),
            vec![Box::new(StubBackend::scripted(vec![StubFrame::failure()]))],
            4,
            handler,
        );
        let req = DetectionRequest::from_frame(7, frame(DeviceOrientation::Portrait)).unwrap();
        detector.submit(req).unwrap();
        drop(detector);
        assert!(rx.try_recv().is_err());
    }
}
