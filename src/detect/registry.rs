use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use super::artifact::ModelArtifact;
use super::backend::DetectorBackend;
use super::backends::StubBackend;

/// Builds a backend instance from a located model artifact.
pub type BackendLoader = fn(&ModelArtifact) -> Result<Box<dyn DetectorBackend>>;

struct Entry {
    extension: &'static str,
    loader: BackendLoader,
}

/// Named backend loaders, each paired with the artifact extension it consumes.
pub struct BackendRegistry {
    entries: BTreeMap<&'static str, Entry>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("stub", "json", |artifact| {
            Ok(Box::new(StubBackend::from_artifact(artifact)?))
        });
        #[cfg(feature = "backend-tract")]
        registry.register("tract", "onnx", |artifact| {
            Ok(Box::new(super::backends::TractBackend::from_artifact(
                artifact,
            )?))
        });
        registry
    }

    pub fn register(&mut self, name: &'static str, extension: &'static str, loader: BackendLoader) {
        self.entries.insert(name, Entry { extension, loader });
    }

    /// Artifact extension and loader for `name`.
    pub fn get(&self, name: &str) -> Result<(&'static str, BackendLoader)> {
        self.entries
            .get(name)
            .map(|entry| (entry.extension, entry.loader))
            .ok_or_else(|| {
                anyhow!(
                    "backend '{}' not available (built with: {})",
                    name,
                    self.list().join(", ")
                )
            })
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
