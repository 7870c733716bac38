use serde::{Deserialize, Serialize};

use crate::error::{MLError, MLResult};
use crate::tree::DecisionTree;

/// Gradient-boosted tree classifier evaluated natively.
///
/// Trees are stored round-robin by class: tree `t` adds to the margin of
/// class `t % n_groups`. Binary models keep a single margin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    pub n_classes: usize,
    #[serde(default)]
    pub base_score: Vec<f64>,
    pub trees: Vec<DecisionTree>,
    #[serde(default)]
    pub feature_importances: Vec<f64>,
}

impl GradientBoostedTrees {
    /// Number of margin outputs (1 for binary classification).
    pub fn n_groups(&self) -> usize {
        if self.n_classes == 2 {
            1
        } else {
            self.n_classes
        }
    }

    pub(crate) fn prepare(&mut self, n_features: usize) -> MLResult<()> {
        if self.n_classes < 2 {
            return Err(MLError::InvalidArtifact(
                "boosted model needs at least two classes".to_string(),
            ));
        }
        if self.trees.is_empty() {
            return Err(MLError::InvalidArtifact("boosted model has no trees".to_string()));
        }
        let groups = self.n_groups();
        if !self.base_score.is_empty() && self.base_score.len() != groups {
            return Err(MLError::InvalidArtifact(format!(
                "base_score has {} entries, expected {groups}",
                self.base_score.len()
            )));
        }
        if !self.feature_importances.is_empty() && self.feature_importances.len() != n_features {
            return Err(MLError::InvalidArtifact(format!(
                "feature_importances has {} entries, expected {n_features}",
                self.feature_importances.len()
            )));
        }
        for tree in &self.trees {
            tree.validate(n_features, 1)?;
        }
        Ok(())
    }

    pub fn margins(&self, x: &[f64]) -> Vec<f64> {
        let groups = self.n_groups();
        let mut margins = if self.base_score.is_empty() {
            vec![0.0; groups]
        } else {
            self.base_score.clone()
        };
        for (t, tree) in self.trees.iter().enumerate() {
            margins[t % groups] += tree.predict(x)[0];
        }
        margins
    }

    pub fn predict_proba(&self, x: &[f64]) -> Vec<f64> {
        let margins = self.margins(x);
        if self.n_classes == 2 {
            let p = sigmoid(margins[0]);
            vec![1.0 - p, p]
        } else {
            softmax(&margins)
        }
    }

    /// Trees contributing to `class`, with the sign applied to their output.
    pub(crate) fn class_trees(&self, class: usize) -> Vec<(&DecisionTree, f64)> {
        if self.n_classes == 2 {
            let sign = if class == 1 { 1.0 } else { -1.0 };
            self.trees.iter().map(|t| (t, sign)).collect()
        } else {
            self.trees
                .iter()
                .enumerate()
                .filter(|(t, _)| t % self.n_classes == class)
                .map(|(_, tree)| (tree, 1.0))
                .collect()
        }
    }
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub(crate) fn softmax(margins: &[f64]) -> Vec<f64> {
    let max = margins.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = margins.iter().map(|m| (m - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::stump;

    #[test]
    fn test_round_robin_margins() {
        let model = GradientBoostedTrees {
            n_classes: 3,
            base_score: vec![0.5, 0.5, 0.5],
            trees: vec![
                stump(0, 1.0, vec![1.0], vec![-1.0]),
                stump(0, 1.0, vec![0.0], vec![0.0]),
                stump(0, 1.0, vec![-1.0], vec![1.0]),
                stump(0, 1.0, vec![0.5], vec![0.5]),
            ],
            feature_importances: vec![1.0],
        };

        let margins = model.margins(&[0.0]);
        assert_eq!(margins, vec![2.0, 0.5, -0.5]);

        let proba = model.predict_proba(&[0.0]);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(proba[0] > proba[1] && proba[1] > proba[2]);
        assert_eq!(model.class_trees(0).len(), 2);
    }

    #[test]
    fn test_binary_uses_sigmoid() {
        let model = GradientBoostedTrees {
            n_classes: 2,
            base_score: vec![],
            trees: vec![stump(0, 1.0, vec![0.0], vec![2.0])],
            feature_importances: vec![],
        };
        let proba = model.predict_proba(&[0.0]);
        assert!((proba[0] - 0.5).abs() < 1e-12);
        assert_eq!(model.class_trees(0)[0].1, -1.0);
    }
}
