use ml_engine::ModelArtifact;

use crate::error::Degraded;

/// The model's global importance scores, one per feature.
pub(crate) fn global_importance(model: &ModelArtifact, n_features: usize) -> Result<Vec<f64>, Degraded> {
    let importances = model
        .estimator
        .feature_importances()
        .ok_or(Degraded::MissingCapability("feature importances"))?;
    if importances.len() != n_features {
        return Err(Degraded::ShapeMismatch {
            expected: n_features,
            actual: importances.len(),
        });
    }
    Ok(importances.to_vec())
}

/// Coefficient times transformed value, per feature.
pub(crate) fn linear_attribution(model: &ModelArtifact, transformed: &[f64]) -> Result<Vec<f64>, Degraded> {
    let coef = model
        .estimator
        .linear_coefficients()
        .ok_or(Degraded::MissingCapability("linear coefficients"))?;
    if coef.len() != transformed.len() {
        return Err(Degraded::ShapeMismatch {
            expected: transformed.len(),
            actual: coef.len(),
        });
    }
    Ok(coef.iter().zip(transformed).map(|(c, x)| c * x).collect())
}
