use serde::{Deserialize, Serialize};

use crate::error::{MLError, MLResult};
use crate::tree::DecisionTree;

/// Random forest classifier. Leaf values hold per-class counts or
/// fractions; they are normalised when the model is prepared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_classes: usize,
    pub trees: Vec<DecisionTree>,
    #[serde(default)]
    pub feature_importances: Option<Vec<f64>>,
}

impl RandomForest {
    pub(crate) fn prepare(&mut self, n_features: usize) -> MLResult<()> {
        if self.trees.is_empty() {
            return Err(MLError::InvalidArtifact("forest has no trees".to_string()));
        }
        for tree in &mut self.trees {
            tree.validate(n_features, self.n_classes)?;
            tree.normalize_values();
        }

        match &self.feature_importances {
            Some(imp) if imp.len() != n_features => {
                return Err(MLError::InvalidArtifact(format!(
                    "feature_importances has {} entries, expected {n_features}",
                    imp.len()
                )));
            }
            Some(_) => {}
            None => self.feature_importances = Some(self.derived_importances(n_features)),
        }
        Ok(())
    }

    /// Cover-weighted split frequency, normalised to sum to one.
    fn derived_importances(&self, n_features: usize) -> Vec<f64> {
        let mut totals = vec![0.0; n_features];
        for tree in &self.trees {
            for (total, cover) in totals.iter_mut().zip(tree.split_cover(n_features)) {
                *total += cover;
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }

    pub fn predict_proba(&self, x: &[f64]) -> Vec<f64> {
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, v) in proba.iter_mut().zip(tree.predict(x)) {
                *p += v;
            }
        }
        let n = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        proba
    }

    pub(crate) fn class_trees(&self) -> Vec<(&DecisionTree, f64)> {
        let weight = 1.0 / self.trees.len() as f64;
        self.trees.iter().map(|t| (t, weight)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::stump;

    #[test]
    fn test_forest_averages_normalised_leaves() {
        let mut forest = RandomForest {
            n_classes: 2,
            trees: vec![
                stump(0, 0.5, vec![30.0, 0.0], vec![0.0, 70.0]),
                stump(1, 0.5, vec![5.0, 5.0], vec![1.0, 3.0]),
            ],
            feature_importances: None,
        };
        forest.prepare(2).unwrap();

        let proba = forest.predict_proba(&[0.0, 1.0]);
        assert!((proba[0] - 0.625).abs() < 1e-12);
        assert!((proba[1] - 0.375).abs() < 1e-12);

        let imp = forest.feature_importances.as_ref().unwrap();
        assert!((imp[0] - 0.5).abs() < 1e-12);
    }
}
