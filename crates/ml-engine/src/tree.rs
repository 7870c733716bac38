use serde::{Deserialize, Serialize};

use crate::error::{MLError, MLResult};

/// A single decision tree in struct-of-arrays form.
///
/// Node `i` is a leaf when `children_left[i] < 0`. Internal nodes send a
/// sample left when `x[feature[i]] <= threshold[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<Vec<f64>>,
    /// Training sample weight reaching each node
    pub cover: Vec<f64>,
}

impl DecisionTree {
    pub fn node_count(&self) -> usize {
        self.children_left.len()
    }

    pub fn is_leaf(&self, node: usize) -> bool {
        self.children_left[node] < 0
    }

    pub fn validate(&self, n_features: usize, n_outputs: usize) -> MLResult<()> {
        let n = self.node_count();
        if n == 0 {
            return Err(MLError::InvalidArtifact("tree has no nodes".to_string()));
        }
        if self.children_right.len() != n
            || self.feature.len() != n
            || self.threshold.len() != n
            || self.value.len() != n
            || self.cover.len() != n
        {
            return Err(MLError::InvalidArtifact(
                "tree node arrays have inconsistent lengths".to_string(),
            ));
        }

        for node in 0..n {
            if self.value[node].len() != n_outputs {
                return Err(MLError::InvalidArtifact(format!(
                    "node {node} has {} outputs, expected {n_outputs}",
                    self.value[node].len()
                )));
            }
            if self.is_leaf(node) {
                continue;
            }

            let (left, right) = (self.children_left[node], self.children_right[node]);
            // Children always follow their parent, which rules out cycles.
            for child in [left, right] {
                if child <= node as i64 || child as usize >= n {
                    return Err(MLError::InvalidArtifact(format!(
                        "node {node} has invalid child {child}"
                    )));
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature as usize >= n_features {
                return Err(MLError::InvalidArtifact(format!(
                    "node {node} splits on feature {feature}, model has {n_features}"
                )));
            }
        }
        Ok(())
    }

    /// Index of the leaf reached by `x`.
    pub fn leaf_index(&self, x: &[f64]) -> usize {
        let mut node = 0usize;
        while !self.is_leaf(node) {
            let f = self.feature[node] as usize;
            node = if x[f] <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        node
    }

    pub fn predict(&self, x: &[f64]) -> &[f64] {
        &self.value[self.leaf_index(x)]
    }

    /// Rescale every node's output vector to sum to one.
    pub(crate) fn normalize_values(&mut self) {
        for row in &mut self.value {
            let total: f64 = row.iter().sum();
            if total > 0.0 {
                row.iter_mut().for_each(|v| *v /= total);
            }
        }
    }

    /// Cover-weighted split counts per feature.
    pub(crate) fn split_cover(&self, n_features: usize) -> Vec<f64> {
        let mut totals = vec![0.0; n_features];
        for node in 0..self.node_count() {
            if !self.is_leaf(node) {
                totals[self.feature[node] as usize] += self.cover[node];
            }
        }
        totals
    }
}

#[cfg(test)]
pub(crate) fn stump(feature: i64, threshold: f64, left: Vec<f64>, right: Vec<f64>) -> DecisionTree {
    DecisionTree {
        children_left: vec![1, -1, -1],
        children_right: vec![2, -1, -1],
        feature: vec![feature, -2, -2],
        threshold: vec![threshold, -2.0, -2.0],
        value: vec![vec![0.0; left.len()], left, right],
        cover: vec![100.0, 30.0, 70.0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_goes_left_on_equal() {
        let tree = stump(0, 0.5, vec![1.0], vec![2.0]);
        assert_eq!(tree.predict(&[0.5]), &[1.0]);
        assert_eq!(tree.predict(&[0.51]), &[2.0]);
    }

    #[test]
    fn test_validate_rejects_bad_feature() {
        let tree = stump(3, 0.5, vec![1.0], vec![2.0]);
        assert!(tree.validate(2, 1).is_err());
        assert!(tree.validate(4, 1).is_ok());
    }

    #[test]
    fn test_validate_rejects_backward_child() {
        let mut tree = stump(0, 0.5, vec![1.0], vec![2.0]);
        tree.children_right[0] = 0;
        assert!(tree.validate(1, 1).is_err());
    }
}
