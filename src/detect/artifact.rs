//! Bundled model artifacts.
//!
//! A bundle is a read-only directory of named resources. The detector is built once
//! from the artifact `<name>.<extension>` inside it.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};

pub const DEFAULT_MODEL_NAME: &str = "yolov5s";

/// Read-only directory holding model resources.
#[derive(Clone, Debug)]
pub struct ModelBundle {
    root: PathBuf,
}

impl ModelBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `name.extension` if it exists in the bundle.
    pub fn url_for_resource(&self, name: &str, extension: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return None;
        }
        let path = self.root.join(format!("{name}.{extension}"));
        path.is_file().then_some(path)
    }
}

/// A located model file plus its content digest.
#[derive(Clone, Debug)]
pub struct ModelArtifact {
    pub name: String,
    pub path: PathBuf,
    digest: [u8; 32],
}

impl ModelArtifact {
    pub fn locate(bundle: &ModelBundle, name: &str, extension: &str) -> PipelineResult<Self> {
        let path = bundle.url_for_resource(name, extension).ok_or_else(|| {
            PipelineError::ModelArtifactMissing(format!(
                "Model file is missing! ({}.{} in {})",
                name,
                extension,
                bundle.root().display()
            ))
        })?;
        let bytes = std::fs::read(&path).map_err(|e| {
            PipelineError::ModelArtifactMissing(format!(
                "failed to read model {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self {
            name: name.to_string(),
            path,
            digest: Sha256::digest(&bytes).into(),
        })
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    /// Optional sidecar with one class label per line (`<name>.labels`).
    pub fn labels_path(&self) -> PathBuf {
        self.path.with_extension("labels")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_artifact_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = ModelBundle::new(dir.path());
        let err = ModelArtifact::locate(&bundle, "yolov5s", "json").unwrap_err();
        match err {
            PipelineError::ModelArtifactMissing(msg) => {
                assert!(msg.starts_with("Model file is missing!"))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn locates_artifact_and_hashes_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tiny.json"), b"{}").unwrap();
        let bundle = ModelBundle::new(dir.path());
        let artifact = ModelArtifact::locate(&bundle, "tiny", "json").unwrap();
        assert_eq!(artifact.name, "tiny");
        assert_eq!(
            artifact.digest_hex(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
        assert_eq!(artifact.labels_path(), dir.path().join("tiny.labels"));
    }

    #[test]
    fn resource_names_cannot_escape_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = ModelBundle::new(dir.path());
        assert!(bundle.url_for_resource("../etc/passwd", "json").is_none());
        assert!(bundle.url_for_resource("", "json").is_none());
    }
}
