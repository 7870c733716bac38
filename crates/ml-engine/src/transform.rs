use serde::{Deserialize, Serialize};

use crate::error::{MLError, MLResult};

/// Fitted feature transformer applied before the estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureTransformer {
    /// `(x - mean) / scale`; a zero scale leaves the centred value unscaled.
    StandardScaler { mean: Vec<f64>, scale: Vec<f64> },
    Passthrough { n_features: usize },
}

impl FeatureTransformer {
    pub fn n_features(&self) -> usize {
        match self {
            FeatureTransformer::StandardScaler { mean, .. } => mean.len(),
            FeatureTransformer::Passthrough { n_features } => *n_features,
        }
    }

    pub fn validate(&self) -> MLResult<()> {
        if let FeatureTransformer::StandardScaler { mean, scale } = self {
            if mean.len() != scale.len() {
                return Err(MLError::InvalidArtifact(format!(
                    "scaler mean has {} entries but scale has {}",
                    mean.len(),
                    scale.len()
                )));
            }
            if mean.iter().chain(scale.iter()).any(|v| !v.is_finite()) {
                return Err(MLError::InvalidArtifact(
                    "scaler parameters must be finite".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn transform(&self, raw: &[f64]) -> MLResult<Vec<f64>> {
        let expected = self.n_features();
        if raw.len() != expected {
            return Err(MLError::ShapeMismatch {
                expected,
                actual: raw.len(),
            });
        }

        Ok(match self {
            FeatureTransformer::StandardScaler { mean, scale } => raw
                .iter()
                .zip(mean.iter().zip(scale.iter()))
                .map(|(x, (m, s))| {
                    let s = if *s == 0.0 { 1.0 } else { *s };
                    (x - m) / s
                })
                .collect(),
            FeatureTransformer::Passthrough { .. } => raw.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_scaler() {
        let t = FeatureTransformer::StandardScaler {
            mean: vec![10.0, 1.0],
            scale: vec![2.0, 0.0],
        };
        assert_eq!(t.transform(&[14.0, 3.0]).unwrap(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let t = FeatureTransformer::Passthrough { n_features: 3 };
        assert!(matches!(
            t.transform(&[1.0]),
            Err(MLError::ShapeMismatch { expected: 3, actual: 1 })
        ));
    }

    #[test]
    fn test_deserialize_tagged() {
        let t: FeatureTransformer =
            serde_json::from_str(r#"{"type":"standard_scaler","mean":[0.0],"scale":[1.0]}"#)
                .unwrap();
        assert_eq!(t.n_features(), 1);
    }
}
