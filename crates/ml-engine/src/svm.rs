use serde::{Deserialize, Serialize};

use crate::error::{MLError, MLResult};

const MIN_PROB: f64 = 1e-7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Kernel {
    Linear,
    Rbf { gamma: f64 },
    Poly { gamma: f64, coef0: f64, degree: i32 },
    Sigmoid { gamma: f64, coef0: f64 },
}

impl Kernel {
    pub fn apply(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Kernel::Linear => dot(a, b),
            Kernel::Rbf { gamma } => {
                let dist: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
                (-gamma * dist).exp()
            }
            Kernel::Poly {
                gamma,
                coef0,
                degree,
            } => (gamma * dot(a, b) + coef0).powi(*degree),
            Kernel::Sigmoid { gamma, coef0 } => (gamma * dot(a, b) + coef0).tanh(),
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// One-vs-one support vector classifier.
///
/// Support vectors are grouped by class (`n_support[c]` rows each).
/// `dual_coef` has `n_classes - 1` rows. The decision value of pair `(i, j)`
/// is the kernel expansion plus `intercept[pair]`; a positive value votes
/// for `i`. Pairs are ordered `(0,1), (0,2), .., (1,2), ..`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportVectorClassifier {
    pub kernel: Kernel,
    pub support_vectors: Vec<Vec<f64>>,
    pub n_support: Vec<usize>,
    pub dual_coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
    /// Platt scaling parameters per pair; both present enables probabilities
    #[serde(default)]
    pub prob_a: Option<Vec<f64>>,
    #[serde(default)]
    pub prob_b: Option<Vec<f64>>,
}

impl SupportVectorClassifier {
    pub fn n_classes(&self) -> usize {
        self.n_support.len()
    }

    fn n_pairs(&self) -> usize {
        let k = self.n_classes();
        k * (k.saturating_sub(1)) / 2
    }

    pub(crate) fn prepare(&mut self, n_features: usize) -> MLResult<()> {
        let k = self.n_classes();
        if k < 2 {
            return Err(MLError::InvalidArtifact(
                "support vector model needs at least two classes".to_string(),
            ));
        }
        let n_sv: usize = self.n_support.iter().sum();
        if self.support_vectors.len() != n_sv {
            return Err(MLError::InvalidArtifact(format!(
                "expected {n_sv} support vectors, found {}",
                self.support_vectors.len()
            )));
        }
        if self.support_vectors.iter().any(|sv| sv.len() != n_features) {
            return Err(MLError::InvalidArtifact(format!(
                "support vectors must have {n_features} features"
            )));
        }
        if self.dual_coef.len() != k - 1 || self.dual_coef.iter().any(|row| row.len() != n_sv) {
            return Err(MLError::InvalidArtifact(format!(
                "dual_coef must be {} x {n_sv}",
                k - 1
            )));
        }
        let pairs = self.n_pairs();
        if self.intercept.len() != pairs {
            return Err(MLError::InvalidArtifact(format!(
                "intercept has {} entries, expected {pairs}",
                self.intercept.len()
            )));
        }
        match (&self.prob_a, &self.prob_b) {
            (Some(a), Some(b)) if a.len() != pairs || b.len() != pairs => {
                return Err(MLError::InvalidArtifact(
                    "probability parameters must have one entry per class pair".to_string(),
                ));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(MLError::InvalidArtifact(
                    "prob_a and prob_b must be provided together".to_string(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    pub fn has_probability(&self) -> bool {
        self.prob_a.is_some() && self.prob_b.is_some()
    }

    fn starts(&self) -> Vec<usize> {
        let mut starts = Vec::with_capacity(self.n_support.len());
        let mut acc = 0;
        for n in &self.n_support {
            starts.push(acc);
            acc += n;
        }
        starts
    }

    /// One decision value per class pair.
    pub fn decision_values(&self, x: &[f64]) -> Vec<f64> {
        let k = self.n_classes();
        let starts = self.starts();
        let kvalue: Vec<f64> = self
            .support_vectors
            .iter()
            .map(|sv| self.kernel.apply(x, sv))
            .collect();

        let mut values = Vec::with_capacity(self.n_pairs());
        let mut pair = 0;
        for i in 0..k {
            for j in (i + 1)..k {
                let (si, sj) = (starts[i], starts[j]);
                let (ci, cj) = (self.n_support[i], self.n_support[j]);
                let coef_i = &self.dual_coef[j - 1];
                let coef_j = &self.dual_coef[i];

                let mut sum = 0.0;
                for s in si..si + ci {
                    sum += coef_i[s] * kvalue[s];
                }
                for s in sj..sj + cj {
                    sum += coef_j[s] * kvalue[s];
                }
                values.push(sum + self.intercept[pair]);
                pair += 1;
            }
        }
        values
    }

    /// Majority vote over all pairs; ties go to the lowest class index.
    pub fn predict(&self, x: &[f64]) -> usize {
        let k = self.n_classes();
        let decisions = self.decision_values(x);
        let mut votes = vec![0usize; k];
        let mut pair = 0;
        for i in 0..k {
            for j in (i + 1)..k {
                if decisions[pair] > 0.0 {
                    votes[i] += 1;
                } else {
                    votes[j] += 1;
                }
                pair += 1;
            }
        }
        let mut best = 0;
        for (class, count) in votes.iter().enumerate() {
            if *count > votes[best] {
                best = class;
            }
        }
        best
    }

    /// Platt-scaled pairwise probabilities coupled into class probabilities.
    /// `None` when the model was exported without probability parameters.
    pub fn predict_proba(&self, x: &[f64]) -> Option<Vec<f64>> {
        let (prob_a, prob_b) = match (&self.prob_a, &self.prob_b) {
            (Some(a), Some(b)) => (a, b),
            _ => return None,
        };
        let k = self.n_classes();
        let decisions = self.decision_values(x);

        let mut pairwise = vec![vec![0.0; k]; k];
        let mut pair = 0;
        for i in 0..k {
            for j in (i + 1)..k {
                let p = platt(decisions[pair], prob_a[pair], prob_b[pair])
                    .clamp(MIN_PROB, 1.0 - MIN_PROB);
                pairwise[i][j] = p;
                pairwise[j][i] = 1.0 - p;
                pair += 1;
            }
        }

        if k == 2 {
            return Some(vec![pairwise[0][1], pairwise[1][0]]);
        }
        Some(couple_pairwise(&pairwise))
    }

    /// Weight vector of the first class pair. Linear kernels only.
    pub fn linear_coefficients(&self) -> Option<Vec<f64>> {
        if self.kernel != Kernel::Linear {
            return None;
        }
        let starts = self.starts();
        let n_features = self.support_vectors.first()?.len();
        let mut coef = vec![0.0; n_features];

        let (i, j) = (0usize, 1usize);
        let class_i = starts[i]..starts[i] + self.n_support[i];
        let class_j = starts[j]..starts[j] + self.n_support[j];
        for s in class_i {
            let alpha = self.dual_coef[j - 1][s];
            for (c, v) in coef.iter_mut().zip(&self.support_vectors[s]) {
                *c += alpha * v;
            }
        }
        for s in class_j {
            let alpha = self.dual_coef[i][s];
            for (c, v) in coef.iter_mut().zip(&self.support_vectors[s]) {
                *c += alpha * v;
            }
        }
        Some(coef)
    }
}

fn platt(decision: f64, a: f64, b: f64) -> f64 {
    let f_apb = decision * a + b;
    if f_apb >= 0.0 {
        (-f_apb).exp() / (1.0 + (-f_apb).exp())
    } else {
        1.0 / (1.0 + f_apb.exp())
    }
}

/// Iterative pairwise coupling (Wu, Lin and Weng, method 2).
fn couple_pairwise(r: &[Vec<f64>]) -> Vec<f64> {
    let k = r.len();
    let max_iter = 100.max(k);
    let eps = 0.005 / k as f64;

    let mut q = vec![vec![0.0; k]; k];
    for t in 0..k {
        for j in 0..t {
            q[t][t] += r[j][t] * r[j][t];
            q[t][j] = q[j][t];
        }
        for j in (t + 1)..k {
            q[t][t] += r[j][t] * r[j][t];
            q[t][j] = -r[j][t] * r[t][j];
        }
    }

    let mut p = vec![1.0 / k as f64; k];
    let mut qp = vec![0.0; k];
    for _ in 0..max_iter {
        let mut pqp = 0.0;
        for t in 0..k {
            qp[t] = (0..k).map(|j| q[t][j] * p[j]).sum();
            pqp += p[t] * qp[t];
        }
        let max_error = qp
            .iter()
            .map(|v| (v - pqp).abs())
            .fold(0.0_f64, f64::max);
        if max_error < eps {
            break;
        }

        for t in 0..k {
            let diff = (-qp[t] + pqp) / q[t][t];
            p[t] += diff;
            pqp = (pqp + diff * (diff * q[t][t] + 2.0 * qp[t])) / (1.0 + diff) / (1.0 + diff);
            for j in 0..k {
                qp[j] = (qp[j] + diff * q[t][j]) / (1.0 + diff);
                p[j] /= 1.0 + diff;
            }
        }
    }
    p
}
