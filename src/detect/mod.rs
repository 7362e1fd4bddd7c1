mod artifact;
mod backend;
pub mod backends;
mod detector;
mod registry;
mod result;

pub use artifact::{ModelArtifact, ModelBundle, DEFAULT_MODEL_NAME};
pub use backend::DetectorBackend;
pub use backends::{StubBackend, StubFrame, StubObject};
pub use detector::{
    Completion, CompletionHandler, DetectionRequest, Detector, DetectorSettings,
    DEFAULT_DETECTOR_WORKERS, DEFAULT_QUEUE_DEPTH,
};
pub use registry::{BackendLoader, BackendRegistry};
pub use result::{ClassLabel, Detection, DetectionResult, RecognizedObject};
