use prediction_core::ModelKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{MLError, MLResult};
use crate::estimator::Estimator;
use crate::label::LabelDecoder;
use crate::transform::FeatureTransformer;

/// Confidence reported when the estimator cannot produce class probabilities.
pub const FALLBACK_CONFIDENCE: f64 = 0.85;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const TRANSFORMER_FILE: &str = "transformer.json";
pub const LABEL_ENCODER_FILE: &str = "label_encoder.json";
pub const ESTIMATOR_FILE: &str = "estimator.json";
pub const BACKGROUND_FILE: &str = "background.json";

/// Which explanation strategy applies to a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    GlobalImportance,
    TreeAttribution,
    SamplingAttribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub name: String,
    pub family: ModelFamily,
    pub classes: Vec<String>,
}

/// A fully loaded model: transformer, estimator and label decoder.
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub key: ModelKey,
    pub manifest: ModelManifest,
    pub transformer: FeatureTransformer,
    pub decoder: LabelDecoder,
    pub estimator: Estimator,
    /// Reference rows in transformed space for sampling attribution
    pub background: Option<Vec<Vec<f64>>>,
}

/// Result of running one model on one feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub class_index: usize,
    pub label: String,
    pub confidence: f64,
    pub transformed: Vec<f64>,
    pub probabilities: Option<Vec<f64>>,
}

impl ModelArtifact {
    pub fn new(
        key: ModelKey,
        manifest: ModelManifest,
        transformer: FeatureTransformer,
        decoder: LabelDecoder,
        mut estimator: Estimator,
        background: Option<Vec<Vec<f64>>>,
    ) -> MLResult<Self> {
        transformer.validate()?;
        estimator.prepare(transformer.n_features())?;

        if decoder.len() != estimator.n_classes() {
            return Err(MLError::InvalidArtifact(format!(
                "{key}: label encoder has {} classes, estimator has {}",
                decoder.len(),
                estimator.n_classes()
            )));
        }
        let mut declared = manifest.classes.clone();
        let mut decoded = decoder.classes.clone();
        declared.sort();
        decoded.sort();
        if declared != decoded {
            return Err(MLError::InvalidArtifact(format!(
                "{key}: manifest classes {:?} do not match label encoder {:?}",
                manifest.classes, decoder.classes
            )));
        }

        Ok(Self {
            key,
            manifest,
            transformer,
            decoder,
            estimator,
            background,
        })
    }

    /// Load a model from its directory.
    pub fn load(key: ModelKey, dir: &Path) -> MLResult<Self> {
        let manifest: ModelManifest = read_json(&dir.join(MANIFEST_FILE))?;
        let transformer: FeatureTransformer = read_json(&dir.join(TRANSFORMER_FILE))?;
        let decoder: LabelDecoder = read_json(&dir.join(LABEL_ENCODER_FILE))?;
        let estimator: Estimator = read_json(&dir.join(ESTIMATOR_FILE))?;

        let background_path = dir.join(BACKGROUND_FILE);
        let background = if background_path.is_file() {
            Some(read_json::<Vec<Vec<f64>>>(&background_path)?)
        } else {
            None
        };

        Self::new(key, manifest, transformer, decoder, estimator, background)
    }

    pub fn family(&self) -> ModelFamily {
        self.manifest.family
    }

    pub fn n_features(&self) -> usize {
        self.transformer.n_features()
    }

    /// Transform, classify and decode one raw feature vector.
    pub fn infer(&self, raw: &[f64]) -> MLResult<Inference> {
        let transformed = self.transformer.transform(raw)?;
        let class_index = self.estimator.predict(&transformed);
        let label = self.decoder.decode(class_index)?.to_string();

        let probabilities = self.estimator.predict_proba(&transformed);
        let confidence = match &probabilities {
            Some(p) => p.get(class_index).copied().unwrap_or(FALLBACK_CONFIDENCE),
            None => FALLBACK_CONFIDENCE,
        };

        Ok(Inference {
            class_index,
            label,
            confidence,
            transformed,
            probabilities,
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> MLResult<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| MLError::InvalidArtifact(format!("{}: {e}", path.display())))?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_infer_valuation_fixture() {
        let model = fixtures::valuation_model();
        let result = model.infer(&[15.0, 1.2, 18.0, 0.4, 12.0]).unwrap();
        assert_eq!(result.label, "UNDERVALUED");
        assert_eq!(result.class_index, 0);
        let probs = result.probabilities.unwrap();
        assert!((result.confidence - probs[0]).abs() < 1e-12);
    }

    #[test]
    fn test_fallback_confidence_without_probabilities() {
        let model = fixtures::growth_model_without_probability();
        let result = model.infer(&[0.3, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
        assert!(result.probabilities.is_none());
    }

    #[test]
    fn test_rejects_mismatched_classes() {
        let model = fixtures::valuation_model();
        let mut manifest = model.manifest.clone();
        manifest.classes = vec!["A".into(), "B".into(), "C".into()];
        let err = ModelArtifact::new(
            ModelKey::Valuation,
            manifest,
            model.transformer.clone(),
            model.decoder.clone(),
            model.estimator.clone(),
            None,
        );
        assert!(matches!(err, Err(MLError::InvalidArtifact(_))));
    }

    #[test]
    fn test_load_round_trip_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_model(dir.path(), &fixtures::health_model()).unwrap();

        let loaded = ModelArtifact::load(ModelKey::Health, dir.path()).unwrap();
        assert_eq!(loaded.family(), ModelFamily::TreeAttribution);
        assert_eq!(loaded.n_features(), 8);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ModelArtifact::load(ModelKey::Growth, dir.path()).is_err());
    }
}
