//! Model-agnostic sampling attribution (Kernel SHAP).
//!
//! Coalitions of features are evaluated against a background sample and the
//! attributions recovered by a weighted least-squares fit constrained to sum
//! to `f(x) - E[f]`.

use nalgebra::{DMatrix, DVector};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use std::collections::HashMap;

use crate::error::Degraded;

#[derive(Debug, Clone)]
struct Coalition {
    mask: Vec<bool>,
    weight: f64,
}

/// Attributions for output `class` of `predict` at `x`.
///
/// `predict` returns class probabilities, or `None` if unavailable.
pub(crate) fn kernel_shap<F>(
    predict: F,
    x: &[f64],
    background: &[Vec<f64>],
    class: usize,
    n_samples: usize,
    rng: &mut StdRng,
) -> Result<Vec<f64>, Degraded>
where
    F: Fn(&[f64]) -> Option<Vec<f64>>,
{
    let m = x.len();
    if background.is_empty() {
        return Err(Degraded::EmptyBackground);
    }
    if let Some(row) = background.iter().find(|row| row.len() != m) {
        return Err(Degraded::ShapeMismatch {
            expected: m,
            actual: row.len(),
        });
    }

    let class_output = |row: &[f64]| -> Result<f64, Degraded> {
        let probs = predict(row).ok_or(Degraded::MissingCapability("class probabilities"))?;
        probs.get(class).copied().ok_or(Degraded::ShapeMismatch {
            expected: class + 1,
            actual: probs.len(),
        })
    };

    let fx = class_output(x)?;
    let mut fnull = 0.0;
    for row in background {
        fnull += class_output(row)?;
    }
    fnull /= background.len() as f64;
    let delta = fx - fnull;

    // Features equal to x in every background row cannot change the output.
    let varying: Vec<usize> = (0..m)
        .filter(|&j| background.iter().any(|row| !is_close(row[j], x[j])))
        .collect();

    let mut phi = vec![0.0; m];
    match varying.len() {
        0 => return Ok(phi),
        1 => {
            phi[varying[0]] = delta;
            return Ok(phi);
        }
        _ => {}
    }

    let coalitions = sample_coalitions(varying.len(), n_samples, rng)?;

    let mut synthetic = vec![0.0; m];
    let mut ey_adj = Vec::with_capacity(coalitions.len());
    for coalition in &coalitions {
        let mut total = 0.0;
        for row in background {
            synthetic.copy_from_slice(row);
            for (k, &j) in varying.iter().enumerate() {
                if coalition.mask[k] {
                    synthetic[j] = x[j];
                }
            }
            total += class_output(&synthetic)?;
        }
        ey_adj.push(total / background.len() as f64 - fnull);
    }

    let weights = solve(&coalitions, &ey_adj, delta)?;
    for (k, &j) in varying.iter().enumerate() {
        phi[j] = weights[k];
    }
    Ok(phi)
}

fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// All index subsets of `0..n` with `size` elements, in lexicographic order.
fn combinations(n: usize, size: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut idx: Vec<usize> = (0..size).collect();
    if size == 0 || size > n {
        return out;
    }
    loop {
        out.push(idx.clone());
        let mut i = size;
        while i > 0 && idx[i - 1] == i - 1 + n - size {
            i -= 1;
        }
        if i == 0 {
            return out;
        }
        idx[i - 1] += 1;
        for j in i..size {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

/// Choose coalitions under the Shapley kernel: subset sizes whose full
/// enumeration fits the budget are enumerated, the rest are sampled.
fn sample_coalitions(m: usize, n_samples: usize, rng: &mut StdRng) -> Result<Vec<Coalition>, Degraded> {
    let mut budget = n_samples;
    if m <= 30 {
        budget = budget.min((1usize << m) - 2);
    }

    let num_subset_sizes = (m - 1).div_ceil(2);
    let num_paired = (m - 1) / 2;

    let mut weight_vector: Vec<f64> = (1..=num_subset_sizes)
        .map(|i| (m - 1) as f64 / (i * (m - i)) as f64)
        .collect();
    for w in weight_vector.iter_mut().take(num_paired) {
        *w *= 2.0;
    }
    let total: f64 = weight_vector.iter().sum();
    weight_vector.iter_mut().for_each(|w| *w /= total);

    let complement = |mask: &[bool]| -> Vec<bool> { mask.iter().map(|b| !b).collect() };

    let mut samples: Vec<Coalition> = Vec::new();
    let mut num_full = 0;
    let mut samples_left = budget;
    let mut remaining = weight_vector.clone();

    for size in 1..=num_subset_sizes {
        let paired = size <= num_paired;
        let mut nsubsets = binomial(m, size);
        if paired {
            nsubsets *= 2.0;
        }
        if samples_left as f64 * remaining[size - 1] / nsubsets < 1.0 - 1e-8 {
            break;
        }

        num_full += 1;
        samples_left = samples_left.saturating_sub(nsubsets as usize);
        if remaining[size - 1] < 1.0 {
            let scale = 1.0 - remaining[size - 1];
            remaining.iter_mut().for_each(|w| *w /= scale);
        }

        let mut w = weight_vector[size - 1] / binomial(m, size);
        if paired {
            w /= 2.0;
        }
        for combo in combinations(m, size) {
            let mut mask = vec![false; m];
            for i in combo {
                mask[i] = true;
            }
            if paired {
                let other = complement(&mask);
                samples.push(Coalition { mask, weight: w });
                samples.push(Coalition { mask: other, weight: w });
            } else {
                samples.push(Coalition { mask, weight: w });
            }
        }
    }

    let n_fixed = samples.len();
    if num_full < num_subset_sizes && samples_left > 0 {
        let mut size_weights = weight_vector.clone();
        for w in size_weights.iter_mut().take(num_paired) {
            *w /= 2.0;
        }
        let dist = WeightedIndex::new(&size_weights[num_full..])
            .map_err(|e| Degraded::Numerical(format!("coalition size weights: {e}")))?;

        // mask -> (index, complement stored right after it)
        let mut used: HashMap<Vec<bool>, (usize, bool)> = HashMap::new();
        let max_draws = 4 * samples_left;
        let mut draws = 0;
        while samples_left > 0 && draws < max_draws {
            draws += 1;
            let size = dist.sample(rng) + num_full + 1;
            let paired = size <= num_paired;
            let mut mask = vec![false; m];
            for i in rand::seq::index::sample(rng, m, size).iter() {
                mask[i] = true;
            }

            if let Some(&(index, has_pair)) = used.get(&mask) {
                samples[index].weight += 1.0;
                if has_pair {
                    samples[index + 1].weight += 1.0;
                }
                continue;
            }

            let index = samples.len();
            samples_left -= 1;
            let other = complement(&mask);
            samples.push(Coalition {
                mask: mask.clone(),
                weight: 1.0,
            });
            let has_pair = samples_left > 0 && paired;
            if has_pair {
                samples_left -= 1;
                samples.push(Coalition {
                    mask: other,
                    weight: 1.0,
                });
            }
            used.insert(mask, (index, has_pair));
        }

        let weight_left: f64 = weight_vector[num_full..].iter().sum();
        let sampled: f64 = samples[n_fixed..].iter().map(|s| s.weight).sum();
        if sampled > 0.0 {
            for s in &mut samples[n_fixed..] {
                s.weight *= weight_left / sampled;
            }
        }
    }

    Ok(samples)
}

/// Weighted least squares with the efficiency constraint folded in by
/// eliminating the last feature.
fn solve(coalitions: &[Coalition], ey_adj: &[f64], delta: f64) -> Result<Vec<f64>, Degraded> {
    let n = coalitions.len();
    let m = coalitions
        .first()
        .map(|c| c.mask.len())
        .ok_or_else(|| Degraded::Numerical("no coalitions sampled".to_string()))?;
    let last = m - 1;
    let z = |r: usize, c: usize| if coalitions[r].mask[c] { 1.0 } else { 0.0 };

    let x = DMatrix::from_fn(n, last, |r, c| z(r, c) - z(r, last));
    let y = DVector::from_vec((0..n).map(|r| ey_adj[r] - z(r, last) * delta).collect());
    let w = DVector::from_vec(coalitions.iter().map(|c| c.weight).collect());

    let xtw = x.transpose() * DMatrix::from_diagonal(&w);
    let a = &xtw * &x;
    let b = &xtw * &y;
    let solution = a
        .svd(true, true)
        .solve(&b, 1e-12)
        .map_err(|e| Degraded::Numerical(e.to_string()))?;

    let mut phi: Vec<f64> = solution.iter().copied().collect();
    let assigned: f64 = phi.iter().sum();
    phi.push(delta - assigned);

    if phi.iter().any(|v| !v.is_finite()) {
        return Err(Degraded::Numerical("non-finite attribution".to_string()));
    }
    Ok(phi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn softmax_model(x: &[f64]) -> Option<Vec<f64>> {
        let a = 2.0 * x[0] - x[1] + 0.5 * x[2] * x[3];
        let b = -a + x[4];
        let max = a.max(b);
        let (ea, eb) = ((a - max).exp(), (b - max).exp());
        Some(vec![ea / (ea + eb), eb / (ea + eb)])
    }

    fn background() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.0, 0.0, 0.0, 0.0],
            vec![1.0, 0.5, -1.0, 0.2, 0.3],
            vec![-0.5, 1.0, 0.5, -0.4, 0.1],
            vec![0.2, -0.3, 1.5, 1.0, -0.2],
        ]
    }

    #[test]
    fn test_attributions_are_efficient() {
        let x = [1.5, -0.5, 0.8, 0.6, 0.4];
        let bg = background();
        let mut rng = StdRng::seed_from_u64(7);
        let phi = kernel_shap(softmax_model, &x, &bg, 1, 50, &mut rng).unwrap();

        let fx = softmax_model(&x).unwrap()[1];
        let fnull: f64 = bg.iter().map(|r| softmax_model(r).unwrap()[1]).sum::<f64>() / bg.len() as f64;
        let total: f64 = phi.iter().sum();
        assert!((total - (fx - fnull)).abs() < 1e-9);
    }

    #[test]
    fn test_exact_for_additive_model_with_full_enumeration() {
        // Linear model: attributions equal w_j * (x_j - mean_j).
        let model = |x: &[f64]| Some(vec![0.3 * x[0] - 0.2 * x[1] + 0.1 * x[2]]);
        let x = [1.0, 2.0, 3.0];
        let bg = vec![vec![0.0, 0.0, 0.0], vec![2.0, 1.0, 1.0]];
        let mut rng = StdRng::seed_from_u64(1);
        let phi = kernel_shap(model, &x, &bg, 0, 50, &mut rng).unwrap();

        assert!((phi[0] - 0.3 * (1.0 - 1.0)).abs() < 1e-9);
        assert!((phi[1] + 0.2 * (2.0 - 0.5)).abs() < 1e-9);
        assert!((phi[2] - 0.1 * (3.0 - 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_constant_features_get_zero() {
        let x = [1.0, 2.0];
        let bg = vec![vec![1.0, 0.0], vec![1.0, 1.0]];
        let model = |x: &[f64]| Some(vec![x[0] + x[1]]);
        let mut rng = StdRng::seed_from_u64(1);
        let phi = kernel_shap(model, &x, &bg, 0, 50, &mut rng).unwrap();
        assert_eq!(phi[0], 0.0);
        assert!((phi[1] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_degrades_without_probabilities_or_background() {
        let mut rng = StdRng::seed_from_u64(1);
        let none = |_: &[f64]| -> Option<Vec<f64>> { None };
        assert!(matches!(
            kernel_shap(none, &[1.0, 2.0], &[vec![0.0, 0.0]], 0, 50, &mut rng),
            Err(Degraded::MissingCapability(_))
        ));

        let model = |x: &[f64]| Some(vec![x[0]]);
        assert!(matches!(
            kernel_shap(model, &[1.0], &[], 0, 50, &mut rng),
            Err(Degraded::EmptyBackground)
        ));
        assert!(matches!(
            kernel_shap(model, &[1.0, 2.0], &[vec![0.0]], 0, 50, &mut rng),
            Err(Degraded::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_seeded_sampling_is_deterministic() {
        let x = [1.5, -0.5, 0.8, 0.6, 0.4];
        let bg = background();
        let a = kernel_shap(softmax_model, &x, &bg, 0, 20, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = kernel_shap(softmax_model, &x, &bg, 0, 20, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_combinations() {
        assert_eq!(
            combinations(4, 2),
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        assert!((binomial(9, 4) - 126.0).abs() < 1e-9);
    }
}
