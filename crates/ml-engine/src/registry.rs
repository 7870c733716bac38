use prediction_core::ModelKey;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::artifact::{ModelArtifact, ESTIMATOR_FILE, MANIFEST_FILE};
use crate::error::{MLError, MLResult};

/// Per-model load status, reported by the health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub valuation: bool,
    pub health: bool,
    pub growth: bool,
}

impl ModelStatus {
    pub fn all_loaded(&self) -> bool {
        self.valuation && self.health && self.growth
    }
}

/// The three classifiers, each present only if it loaded cleanly.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    valuation: Option<Arc<ModelArtifact>>,
    health: Option<Arc<ModelArtifact>>,
    growth: Option<Arc<ModelArtifact>>,
}

/// Directory holding a model's files under the models root.
pub fn model_dir(models_path: &Path, key: ModelKey) -> PathBuf {
    models_path.join(key.as_str())
}

fn dir_has_model_files(dir: &Path) -> bool {
    dir.is_dir() && dir.join(MANIFEST_FILE).is_file() && dir.join(ESTIMATOR_FILE).is_file()
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every model found under `models_path`.
    ///
    /// Never fails: a model whose directory is missing or whose files do not
    /// parse is skipped and the registry reports itself as not ready.
    pub fn load(models_path: &Path) -> Self {
        tracing::info!("Loading prediction models from {}", models_path.display());

        let mut registry = Self::empty();
        let mut loaded: Vec<&str> = Vec::new();
        let mut skipped: Vec<&str> = Vec::new();

        for key in ModelKey::ALL {
            let dir = model_dir(models_path, key);
            if !dir_has_model_files(&dir) {
                tracing::warn!("{key} model: no exported files in {}, skipping", dir.display());
                skipped.push(key.as_str());
                continue;
            }
            match ModelArtifact::load(key, &dir) {
                Ok(artifact) => {
                    tracing::info!(
                        "{key} model loaded: {} ({}, {} features, classes {:?})",
                        artifact.manifest.name,
                        artifact.estimator.kind(),
                        artifact.n_features(),
                        artifact.decoder.classes
                    );
                    registry.insert(artifact);
                    loaded.push(key.as_str());
                }
                Err(e) => {
                    tracing::warn!("{key} model failed to load: {e}");
                    skipped.push(key.as_str());
                }
            }
        }

        tracing::info!(
            "Model registry ready={} (loaded: [{}], skipped: [{}])",
            registry.is_ready(),
            loaded.join(", "),
            skipped.join(", ")
        );
        registry
    }

    pub fn from_artifacts(artifacts: impl IntoIterator<Item = ModelArtifact>) -> Self {
        let mut registry = Self::empty();
        for artifact in artifacts {
            registry.insert(artifact);
        }
        registry
    }

    fn insert(&mut self, artifact: ModelArtifact) {
        let slot = match artifact.key {
            ModelKey::Valuation => &mut self.valuation,
            ModelKey::Health => &mut self.health,
            ModelKey::Growth => &mut self.growth,
        };
        *slot = Some(Arc::new(artifact));
    }

    fn slot(&self, key: ModelKey) -> Option<&Arc<ModelArtifact>> {
        match key {
            ModelKey::Valuation => self.valuation.as_ref(),
            ModelKey::Health => self.health.as_ref(),
            ModelKey::Growth => self.growth.as_ref(),
        }
    }

    /// Look up a model. Never substitutes another model for a missing one.
    pub fn get(&self, key: ModelKey) -> MLResult<Arc<ModelArtifact>> {
        self.slot(key).cloned().ok_or(MLError::ModelNotLoaded(key))
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            valuation: self.valuation.is_some(),
            health: self.health.is_some(),
            growth: self.growth.is_some(),
        }
    }

    /// True only if all three models are loaded.
    pub fn is_ready(&self) -> bool {
        self.status().all_loaded()
    }
}

/// Shared handle to the current registry with a readiness flag.
///
/// Inference takes a cheap snapshot of the registry. Reloading holds the
/// write lock for the whole load, so no snapshot can be taken mid-reload.
pub struct ModelHandle {
    current: RwLock<Arc<ModelRegistry>>,
    ready: AtomicBool,
    models_path: PathBuf,
}

impl ModelHandle {
    pub fn new(registry: ModelRegistry, models_path: impl Into<PathBuf>) -> Self {
        let ready = registry.is_ready();
        Self {
            current: RwLock::new(Arc::new(registry)),
            ready: AtomicBool::new(ready),
            models_path: models_path.into(),
        }
    }

    /// Load from disk once, before traffic is accepted.
    pub fn load(models_path: impl Into<PathBuf>) -> Self {
        let models_path = models_path.into();
        let registry = ModelRegistry::load(&models_path);
        Self::new(registry, models_path)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn models_path(&self) -> &Path {
        &self.models_path
    }

    pub async fn snapshot(&self) -> Arc<ModelRegistry> {
        self.current.read().await.clone()
    }

    pub async fn status(&self) -> ModelStatus {
        self.snapshot().await.status()
    }

    /// Status without waiting on the registry lock; `None` while a reload
    /// holds it.
    pub fn try_status(&self) -> Option<ModelStatus> {
        self.current.try_read().ok().map(|current| current.status())
    }

    /// Stop-the-world reload from the models directory.
    pub async fn reload(&self) -> MLResult<ModelStatus> {
        let mut current = self.current.write().await;
        self.ready.store(false, Ordering::Release);

        let path = self.models_path.clone();
        let registry = match tokio::task::spawn_blocking(move || ModelRegistry::load(&path)).await {
            Ok(registry) => registry,
            Err(e) => {
                // Keep serving the previous models.
                self.ready.store(current.is_ready(), Ordering::Release);
                return Err(MLError::Other(format!("model reload task failed: {e}")));
            }
        };

        let status = registry.status();
        *current = Arc::new(registry);
        self.ready.store(status.all_loaded(), Ordering::Release);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_missing_model_is_not_substituted() {
        let registry = ModelRegistry::from_artifacts([fixtures::valuation_model()]);
        assert!(registry.get(ModelKey::Valuation).is_ok());
        assert!(matches!(
            registry.get(ModelKey::Health),
            Err(MLError::ModelNotLoaded(ModelKey::Health))
        ));
        assert!(!registry.is_ready());
    }

    #[test]
    fn test_load_skips_broken_models() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_model(&model_dir(dir.path(), ModelKey::Valuation), &fixtures::valuation_model())
            .unwrap();
        let health_dir = model_dir(dir.path(), ModelKey::Health);
        std::fs::create_dir_all(&health_dir).unwrap();
        std::fs::write(health_dir.join(MANIFEST_FILE), "{}").unwrap();
        std::fs::write(health_dir.join(ESTIMATOR_FILE), "not json").unwrap();

        let registry = ModelRegistry::load(dir.path());
        let status = registry.status();
        assert!(status.valuation);
        assert!(!status.health);
        assert!(!status.growth);
        assert!(!registry.is_ready());
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_models() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ModelHandle::load(dir.path());
        assert!(!handle.is_ready());

        for model in [
            fixtures::valuation_model(),
            fixtures::health_model(),
            fixtures::growth_model(),
        ] {
            fixtures::write_model(&model_dir(dir.path(), model.key), &model).unwrap();
        }

        let status = handle.reload().await.unwrap();
        assert!(status.all_loaded());
        assert!(handle.is_ready());
        assert!(handle.snapshot().await.get(ModelKey::Growth).is_ok());
    }

    #[tokio::test]
    async fn test_status_does_not_wait_for_reload() {
        let handle = ModelHandle::new(fixtures::registry(), "./does-not-exist");
        assert_eq!(handle.try_status(), Some(handle.status().await));

        let guard = handle.current.write().await;
        assert_eq!(handle.try_status(), None);
        assert!(handle.is_ready());
        drop(guard);

        assert!(handle.try_status().is_some_and(|s| s.all_loaded()));
    }
}
