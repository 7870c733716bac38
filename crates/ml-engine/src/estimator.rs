use serde::{Deserialize, Serialize};

use crate::boosted::GradientBoostedTrees;
use crate::error::MLResult;
use crate::forest::RandomForest;
use crate::svm::SupportVectorClassifier;
use crate::tree::DecisionTree;

/// A fitted classifier loaded from `estimator.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Estimator {
    GradientBoosting(GradientBoostedTrees),
    RandomForest(RandomForest),
    SupportVector(SupportVectorClassifier),
}

/// One tree's share of a class output, used for exact tree attribution.
#[derive(Debug, Clone, Copy)]
pub struct TreeTerm<'a> {
    pub tree: &'a DecisionTree,
    /// Index into the tree's leaf value vector
    pub output: usize,
    pub weight: f64,
}

impl Estimator {
    /// Validate against the transformer's width and normalise where needed.
    pub fn prepare(&mut self, n_features: usize) -> MLResult<()> {
        match self {
            Estimator::GradientBoosting(m) => m.prepare(n_features),
            Estimator::RandomForest(m) => m.prepare(n_features),
            Estimator::SupportVector(m) => m.prepare(n_features),
        }
    }

    pub fn n_classes(&self) -> usize {
        match self {
            Estimator::GradientBoosting(m) => m.n_classes,
            Estimator::RandomForest(m) => m.n_classes,
            Estimator::SupportVector(m) => m.n_classes(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Estimator::GradientBoosting(_) => "gradient_boosting",
            Estimator::RandomForest(_) => "random_forest",
            Estimator::SupportVector(_) => "support_vector",
        }
    }

    pub fn predict(&self, x: &[f64]) -> usize {
        match self {
            Estimator::SupportVector(m) => m.predict(x),
            Estimator::GradientBoosting(m) => argmax(&m.predict_proba(x)),
            Estimator::RandomForest(m) => argmax(&m.predict_proba(x)),
        }
    }

    /// Class probabilities, if the estimator can produce them.
    pub fn predict_proba(&self, x: &[f64]) -> Option<Vec<f64>> {
        match self {
            Estimator::GradientBoosting(m) => Some(m.predict_proba(x)),
            Estimator::RandomForest(m) => Some(m.predict_proba(x)),
            Estimator::SupportVector(m) => m.predict_proba(x),
        }
    }

    /// Global (instance-independent) importance per feature.
    pub fn feature_importances(&self) -> Option<&[f64]> {
        match self {
            Estimator::GradientBoosting(m) if !m.feature_importances.is_empty() => {
                Some(&m.feature_importances)
            }
            Estimator::RandomForest(m) => m.feature_importances.as_deref(),
            _ => None,
        }
    }

    pub fn linear_coefficients(&self) -> Option<Vec<f64>> {
        match self {
            Estimator::SupportVector(m) => m.linear_coefficients(),
            _ => None,
        }
    }

    /// Trees and weights whose summed leaf outputs give the class score.
    pub fn tree_terms(&self, class: usize) -> Option<Vec<TreeTerm<'_>>> {
        if class >= self.n_classes() {
            return None;
        }
        match self {
            Estimator::GradientBoosting(m) => Some(
                m.class_trees(class)
                    .into_iter()
                    .map(|(tree, weight)| TreeTerm {
                        tree,
                        output: 0,
                        weight,
                    })
                    .collect(),
            ),
            Estimator::RandomForest(m) => Some(
                m.class_trees()
                    .into_iter()
                    .map(|(tree, weight)| TreeTerm {
                        tree,
                        output: class,
                        weight,
                    })
                    .collect(),
            ),
            Estimator::SupportVector(_) => None,
        }
    }
}

/// Index of the largest value; the first one wins on ties.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_boosted_predict() {
        let json = r#"{
            "type": "gradient_boosting",
            "n_classes": 2,
            "trees": [{
                "children_left": [1, -1, -1],
                "children_right": [2, -1, -1],
                "feature": [0, -2, -2],
                "threshold": [0.0, 0.0, 0.0],
                "value": [[0.0], [-1.0], [1.0]],
                "cover": [2.0, 1.0, 1.0]
            }]
        }"#;
        let mut est: Estimator = serde_json::from_str(json).unwrap();
        est.prepare(1).unwrap();
        assert_eq!(est.kind(), "gradient_boosting");
        assert_eq!(est.predict(&[-1.0]), 0);
        assert_eq!(est.predict(&[1.0]), 1);
        assert!(est.feature_importances().is_none());
        assert_eq!(est.tree_terms(1).unwrap().len(), 1);
        assert!(est.tree_terms(2).is_none());
    }
}
