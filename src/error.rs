use thiserror::Error;

/// Failures surfaced by the capture → detect → overlay pipeline.
///
/// Only `DeviceUnavailable` and `SessionConfigurationFailure` abort a session.
/// `ModelArtifactMissing` disables detection for the lifetime of the coordinator,
/// and `DetectionRequestFailure` costs exactly one frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no capture device matches {0}")]
    DeviceUnavailable(String),
    #[error("could not configure capture session: {0}")]
    SessionConfigurationFailure(String),
    #[error("model artifact unavailable: {0}")]
    ModelArtifactMissing(String),
    #[error("detection request failed: {0}")]
    DetectionRequestFailure(String),
}

impl PipelineError {
    /// True for kinds that end the capture session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::DeviceUnavailable(_) | PipelineError::SessionConfigurationFailure(_)
        )
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_session_errors_are_fatal() {
        assert!(PipelineError::DeviceUnavailable("back camera".into()).is_fatal());
        assert!(PipelineError::SessionConfigurationFailure("input".into()).is_fatal());
        assert!(!PipelineError::ModelArtifactMissing("yolov5s".into()).is_fatal());
        assert!(!PipelineError::DetectionRequestFailure("overloaded".into()).is_fatal());
    }

    #[test]
    fn messages_are_stable() {
        let err = PipelineError::ModelArtifactMissing("Model file is missing!".into());
        assert_eq!(
            err.to_string(),
            "model artifact unavailable: Model file is missing!"
        );
    }
}
