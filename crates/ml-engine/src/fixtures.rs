//! Small hand-built models with known behaviour, for tests.

use prediction_core::ModelKey;
use std::path::Path;

use crate::artifact::{
    ModelArtifact, ModelFamily, ModelManifest, BACKGROUND_FILE, ESTIMATOR_FILE,
    LABEL_ENCODER_FILE, MANIFEST_FILE, TRANSFORMER_FILE,
};
use crate::boosted::GradientBoostedTrees;
use crate::error::MLResult;
use crate::estimator::Estimator;
use crate::forest::RandomForest;
use crate::label::LabelDecoder;
use crate::registry::ModelRegistry;
use crate::svm::{Kernel, SupportVectorClassifier};
use crate::transform::FeatureTransformer;
use crate::tree::DecisionTree;

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn stump(feature: i64, threshold: f64, left: f64, right: f64) -> DecisionTree {
    DecisionTree {
        children_left: vec![1, -1, -1],
        children_right: vec![2, -1, -1],
        feature: vec![feature, -2, -2],
        threshold: vec![threshold, -2.0, -2.0],
        value: vec![vec![0.0], vec![left], vec![right]],
        cover: vec![100.0, 50.0, 50.0],
    }
}

/// Boosted trees over the five valuation ratios, standard-scaled.
/// The ABC reference stock (pe 15, pb 1.2, roe 18, d/e 0.4, margin 12) is UNDERVALUED.
pub fn valuation_model() -> ModelArtifact {
    let classes = labels(&["UNDERVALUED", "FAIR", "OVERVALUED"]);
    let estimator = Estimator::GradientBoosting(GradientBoostedTrees {
        n_classes: 3,
        base_score: vec![0.0, 0.0, 0.0],
        trees: vec![
            stump(0, 0.0, 1.0, -1.0),
            stump(1, 0.0, -0.5, 0.5),
            stump(3, 0.0, -1.0, 1.0),
        ],
        feature_importances: vec![0.4, 0.1, 0.15, 0.25, 0.1],
    });

    build(
        ModelKey::Valuation,
        "valuation-xgb",
        ModelFamily::GlobalImportance,
        classes,
        FeatureTransformer::StandardScaler {
            mean: vec![20.0, 2.0, 15.0, 1.0, 10.0],
            scale: vec![5.0, 1.0, 5.0, 0.5, 5.0],
        },
        estimator,
        None,
    )
}

/// Two-tree random forest over the eight health deltas.
pub fn health_model() -> ModelArtifact {
    let classes = labels(&["EXCELLENT", "FAIR", "POOR"]);
    let growth_split = DecisionTree {
        children_left: vec![1, -1, -1],
        children_right: vec![2, -1, -1],
        feature: vec![0, -2, -2],
        threshold: vec![0.05, -2.0, -2.0],
        value: vec![vec![8.0, 4.0, 8.0], vec![0.0, 2.0, 8.0], vec![8.0, 2.0, 0.0]],
        cover: vec![20.0, 10.0, 10.0],
    };
    let debt_split = DecisionTree {
        children_left: vec![1, 2, -1, -1, -1],
        children_right: vec![4, 3, -1, -1, -1],
        feature: vec![3, 6, -2, -2, -2],
        threshold: vec![0.1, 0.0, -2.0, -2.0, -2.0],
        value: vec![
            vec![12.0, 9.0, 9.0],
            vec![11.0, 6.0, 3.0],
            vec![7.0, 2.0, 1.0],
            vec![4.0, 4.0, 2.0],
            vec![1.0, 3.0, 6.0],
        ],
        cover: vec![20.0, 10.0, 6.0, 4.0, 10.0],
    };
    let estimator = Estimator::RandomForest(RandomForest {
        n_classes: 3,
        trees: vec![growth_split, debt_split],
        feature_importances: None,
    });

    build(
        ModelKey::Health,
        "health-rf",
        ModelFamily::TreeAttribution,
        classes,
        FeatureTransformer::Passthrough { n_features: 8 },
        estimator,
        None,
    )
}

fn growth_classifier(kernel: Kernel, probability: bool) -> SupportVectorClassifier {
    // One support vector per class along the revenue and EBITDA CAGR axes;
    // every pair votes for the nearer vector.
    let mut support_vectors = Vec::new();
    for (revenue, ebitda) in [(0.3, 0.25), (0.15, 0.12), (0.03, 0.02), (-0.1, -0.12)] {
        let mut sv = vec![0.0; 9];
        sv[0] = revenue;
        sv[1] = ebitda;
        support_vectors.push(sv);
    }
    SupportVectorClassifier {
        kernel,
        support_vectors,
        n_support: vec![1, 1, 1, 1],
        dual_coef: vec![
            vec![1.0, -1.0, -1.0, -1.0],
            vec![1.0, 1.0, -1.0, -1.0],
            vec![1.0, 1.0, 1.0, -1.0],
        ],
        intercept: vec![0.0; 6],
        prob_a: probability.then(|| vec![-5.0; 6]),
        prob_b: probability.then(|| vec![0.0; 6]),
    }
}

fn growth_background() -> Vec<Vec<f64>> {
    let rows = [
        (0.20, 0.18, 0.10, 0.05),
        (0.10, 0.08, 0.05, 0.02),
        (0.02, 0.01, 0.00, 0.10),
        (-0.05, -0.08, -0.02, 0.15),
        (0.12, 0.15, 0.07, 0.04),
        (0.05, 0.03, 0.02, 0.08),
    ];
    rows.iter()
        .map(|(rev, ebitda, book, vol)| {
            let mut row = vec![0.0; 9];
            row[0] = *rev;
            row[1] = *ebitda;
            row[2] = *book;
            row[3] = *vol;
            row
        })
        .collect()
}

fn growth_with(kernel: Kernel, probability: bool, background: Option<Vec<Vec<f64>>>) -> ModelArtifact {
    build(
        ModelKey::Growth,
        "growth-svm",
        ModelFamily::SamplingAttribution,
        labels(&["STRONG_GROWTH", "MODERATE_GROWTH", "WEAK_GROWTH", "DECLINING"]),
        FeatureTransformer::Passthrough { n_features: 9 },
        Estimator::SupportVector(growth_classifier(kernel, probability)),
        background,
    )
}

/// RBF support vector classifier over the nine growth metrics, with
/// probability output and background rows.
pub fn growth_model() -> ModelArtifact {
    growth_with(Kernel::Rbf { gamma: 10.0 }, true, Some(growth_background()))
}

pub fn growth_model_without_probability() -> ModelArtifact {
    growth_with(Kernel::Rbf { gamma: 10.0 }, false, Some(growth_background()))
}

/// Linear kernel without probabilities: exposes coefficients only.
pub fn linear_growth_model() -> ModelArtifact {
    growth_with(Kernel::Linear, false, Some(growth_background()))
}

pub fn growth_model_with_background(background: Option<Vec<Vec<f64>>>) -> ModelArtifact {
    growth_with(Kernel::Rbf { gamma: 10.0 }, true, background)
}

pub fn registry() -> ModelRegistry {
    ModelRegistry::from_artifacts([valuation_model(), health_model(), growth_model()])
}

#[allow(clippy::too_many_arguments)]
fn build(
    key: ModelKey,
    name: &str,
    family: ModelFamily,
    classes: Vec<String>,
    transformer: FeatureTransformer,
    estimator: Estimator,
    background: Option<Vec<Vec<f64>>>,
) -> ModelArtifact {
    let manifest = ModelManifest {
        name: name.to_string(),
        family,
        classes: classes.clone(),
    };
    ModelArtifact::new(
        key,
        manifest,
        transformer,
        LabelDecoder::new(classes),
        estimator,
        background,
    )
    .expect("fixture model is valid")
}

/// Write a model in the on-disk layout read by [`ModelArtifact::load`].
pub fn write_model(dir: &Path, model: &ModelArtifact) -> MLResult<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(MANIFEST_FILE), serde_json::to_string(&model.manifest)?)?;
    std::fs::write(dir.join(TRANSFORMER_FILE), serde_json::to_string(&model.transformer)?)?;
    std::fs::write(dir.join(LABEL_ENCODER_FILE), serde_json::to_string(&model.decoder)?)?;
    std::fs::write(dir.join(ESTIMATOR_FILE), serde_json::to_string(&model.estimator)?)?;
    if let Some(background) = &model.background {
        std::fs::write(dir.join(BACKGROUND_FILE), serde_json::to_string(background)?)?;
    }
    Ok(())
}
