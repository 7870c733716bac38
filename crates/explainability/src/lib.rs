//! Per-model explanations: top contributing features plus a reason sentence.
//!
//! Each model family has an ordered list of attribution methods. Methods are
//! tried in order and the first that succeeds is rendered; failures are
//! logged and never reach the caller.

mod error;
pub mod format;
mod importance;
mod kernel_shap;
mod tree_shap;

use ml_engine::{Inference, ModelArtifact, ModelFamily};
use prediction_core::FeatureAttribution;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::Degraded;

pub use format::{format_value, readable_name, FALLBACK_REASON};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionMethod {
    GlobalImportance,
    TreeShap,
    KernelShap,
    LinearCoefficients,
    RawMagnitude,
}

impl AttributionMethod {
    /// Attempt order for a model family.
    pub fn chain(family: ModelFamily) -> &'static [AttributionMethod] {
        use AttributionMethod::*;
        match family {
            ModelFamily::GlobalImportance => &[GlobalImportance, RawMagnitude],
            ModelFamily::TreeAttribution => &[TreeShap, GlobalImportance, RawMagnitude],
            ModelFamily::SamplingAttribution => &[KernelShap, LinearCoefficients, RawMagnitude],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainerConfig {
    /// Background rows kept for sampling attribution
    pub max_background: usize,
    /// Coalition budget for sampling attribution
    pub n_samples: usize,
    pub top_k: usize,
    /// Fixed seed for background subsampling and coalition sampling.
    /// `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            max_background: 30,
            n_samples: 50,
            top_k: 3,
            seed: Some(42),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// At most `top_k` entries, sorted by impact descending
    pub top_features: Vec<FeatureAttribution>,
    pub reason: String,
    /// `None` only when there were no features to explain
    pub method: Option<AttributionMethod>,
}

impl Explanation {
    fn empty() -> Self {
        Self {
            top_features: Vec::new(),
            reason: FALLBACK_REASON.to_string(),
            method: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Explainer {
    config: ExplainerConfig,
}

impl Explainer {
    pub fn new(config: ExplainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExplainerConfig {
        &self.config
    }

    /// Explain one inference. `names` and `values` are the raw features in
    /// model order. Never fails.
    pub fn explain(
        &self,
        model: &ModelArtifact,
        inference: &Inference,
        names: &[String],
        values: &[f64],
    ) -> Explanation {
        let n = names.len().min(values.len());
        if n == 0 {
            return Explanation::empty();
        }
        let (names, values) = (&names[..n], &values[..n]);

        for &method in AttributionMethod::chain(model.family()) {
            match self.attribute(method, model, inference, values) {
                Ok(scores) if scores.len() == n && scores.iter().all(|s| s.is_finite()) => {
                    tracing::debug!(model = %model.key, ?method, "explanation computed");
                    return self.render(method, &scores, names, values);
                }
                Ok(scores) => tracing::warn!(
                    model = %model.key,
                    ?method,
                    "explanation degraded: {} scores for {n} features",
                    scores.len()
                ),
                Err(e) => tracing::warn!(model = %model.key, ?method, "explanation degraded: {e}"),
            }
        }
        Explanation::empty()
    }

    fn attribute(
        &self,
        method: AttributionMethod,
        model: &ModelArtifact,
        inference: &Inference,
        values: &[f64],
    ) -> Result<Vec<f64>, Degraded> {
        let transformed = &inference.transformed;
        match method {
            AttributionMethod::GlobalImportance => importance::global_importance(model, values.len()),
            AttributionMethod::TreeShap => {
                let terms = model
                    .estimator
                    .tree_terms(inference.class_index)
                    .ok_or(Degraded::MissingCapability("tree structure"))?;
                tree_shap::tree_shap(&terms, transformed)
            }
            AttributionMethod::KernelShap => self.sampling_attribution(model, inference),
            AttributionMethod::LinearCoefficients => {
                importance::linear_attribution(model, transformed)
            }
            AttributionMethod::RawMagnitude => {
                if transformed.len() == values.len() {
                    Ok(transformed.clone())
                } else {
                    Ok(values.to_vec())
                }
            }
        }
    }

    fn sampling_attribution(
        &self,
        model: &ModelArtifact,
        inference: &Inference,
    ) -> Result<Vec<f64>, Degraded> {
        if inference.probabilities.is_none() {
            return Err(Degraded::MissingCapability("class probabilities"));
        }
        let background = model
            .background
            .as_deref()
            .filter(|rows| !rows.is_empty())
            .ok_or(Degraded::EmptyBackground)?;

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let sampled: Vec<Vec<f64>>;
        let background = if background.len() > self.config.max_background {
            sampled = index::sample(&mut rng, background.len(), self.config.max_background)
                .iter()
                .map(|i| background[i].clone())
                .collect();
            &sampled[..]
        } else {
            background
        };

        kernel_shap::kernel_shap(
            |row| model.estimator.predict_proba(row),
            &inference.transformed,
            background,
            inference.class_index,
            self.config.n_samples,
            &mut rng,
        )
    }

    fn render(
        &self,
        method: AttributionMethod,
        scores: &[f64],
        names: &[String],
        values: &[f64],
    ) -> Explanation {
        let top = top_indices(scores, self.config.top_k);
        let top_features: Vec<FeatureAttribution> = top
            .iter()
            .map(|&i| FeatureAttribution {
                name: names[i].clone(),
                value: values[i],
                impact: scores[i].abs(),
            })
            .collect();

        let reason = match method {
            AttributionMethod::RawMagnitude => {
                let top_names: Vec<&str> = top.iter().map(|&i| names[i].as_str()).collect();
                format::key_metrics_reason(&top_names)
            }
            _ => {
                let sentences: Vec<String> = top
                    .iter()
                    .map(|&i| {
                        let (name, value, score) = (names[i].as_str(), values[i], scores[i]);
                        match method {
                            AttributionMethod::GlobalImportance => {
                                format::importance_sentence(name, value, score.abs())
                            }
                            AttributionMethod::LinearCoefficients => {
                                format::coefficient_sentence(name, value, score.abs())
                            }
                            _ => format::attribution_sentence(name, value, score),
                        }
                    })
                    .collect();
                format::join_sentences(&sentences)
            }
        };

        Explanation {
            top_features,
            reason,
            method: Some(method),
        }
    }
}

/// Indices of the `k` largest |score|, ties kept in feature order.
fn top_indices(scores: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].abs().total_cmp(&scores[a].abs()));
    order.truncate(k);
    order
}
