//! Exact per-instance attribution for tree ensembles (path-dependent TreeSHAP).

use ml_engine::{DecisionTree, TreeTerm};

use crate::error::Degraded;

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: i64,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

const ROOT: PathElement = PathElement {
    feature: -1,
    zero_fraction: 1.0,
    one_fraction: 1.0,
    pweight: 1.0,
};

/// Attribution of each feature to the weighted sum of the given trees' outputs.
pub(crate) fn tree_shap(terms: &[TreeTerm<'_>], x: &[f64]) -> Result<Vec<f64>, Degraded> {
    if terms.is_empty() {
        return Err(Degraded::MissingCapability("trees for the predicted class"));
    }
    let mut phi = vec![0.0; x.len()];
    for term in terms {
        if term.tree.cover.iter().any(|c| !(*c > 0.0)) {
            return Err(Degraded::Numerical("tree has a node with zero cover".to_string()));
        }
        let mut tree_phi = vec![0.0; x.len()];
        let walker = Walker {
            tree: term.tree,
            x,
            output: term.output,
        };
        walker.recurse(0, &[ROOT], 0, 1.0, 1.0, -1, &mut tree_phi);
        for (total, v) in phi.iter_mut().zip(tree_phi) {
            *total += term.weight * v;
        }
    }
    if phi.iter().any(|v| !v.is_finite()) {
        return Err(Degraded::Numerical("non-finite attribution".to_string()));
    }
    Ok(phi)
}

struct Walker<'a> {
    tree: &'a DecisionTree,
    x: &'a [f64],
    output: usize,
}

impl Walker<'_> {
    #[allow(clippy::too_many_arguments)]
    fn recurse(
        &self,
        node: usize,
        parent_path: &[PathElement],
        depth: usize,
        zero_fraction: f64,
        one_fraction: f64,
        feature: i64,
        phi: &mut [f64],
    ) {
        let mut path: Vec<PathElement> = parent_path[..depth.min(parent_path.len())].to_vec();
        path.resize(depth + 1, ROOT);
        extend(&mut path, depth, zero_fraction, one_fraction, feature);
        let mut depth = depth;

        let tree = self.tree;
        if tree.is_leaf(node) {
            let leaf_value = tree.value[node][self.output];
            for i in 1..=depth {
                let w = unwound_sum(&path, depth, i);
                let el = path[i];
                phi[el.feature as usize] += w * (el.one_fraction - el.zero_fraction) * leaf_value;
            }
            return;
        }

        let split = tree.feature[node];
        let left = tree.children_left[node] as usize;
        let right = tree.children_right[node] as usize;
        let (hot, cold) = if self.x[split as usize] <= tree.threshold[node] {
            (left, right)
        } else {
            (right, left)
        };
        let cover = tree.cover[node];
        let hot_zero = tree.cover[hot] / cover;
        let cold_zero = tree.cover[cold] / cover;

        // A feature already on the path is undone before splitting on it again.
        let mut incoming_zero = 1.0;
        let mut incoming_one = 1.0;
        if let Some(index) = (1..=depth).find(|&i| path[i].feature == split) {
            incoming_zero = path[index].zero_fraction;
            incoming_one = path[index].one_fraction;
            unwind(&mut path, depth, index);
            depth -= 1;
        }

        self.recurse(hot, &path, depth + 1, hot_zero * incoming_zero, incoming_one, split, phi);
        self.recurse(cold, &path, depth + 1, cold_zero * incoming_zero, 0.0, split, phi);
    }
}

fn extend(path: &mut [PathElement], depth: usize, zero_fraction: f64, one_fraction: f64, feature: i64) {
    path[depth] = PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    };
    let d = depth as f64;
    for i in (0..depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i as f64 + 1.0) / (d + 1.0);
        path[i].pweight = zero_fraction * path[i].pweight * (d - i as f64) / (d + 1.0);
    }
}

fn unwind(path: &mut [PathElement], depth: usize, index: usize) {
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let d = depth as f64;
    let mut next_one_portion = path[depth].pweight;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * (d + 1.0) / ((i as f64 + 1.0) * one_fraction);
            next_one_portion = tmp - path[i].pweight * zero_fraction * (d - i as f64) / (d + 1.0);
        } else {
            path[i].pweight = path[i].pweight * (d + 1.0) / (zero_fraction * (d - i as f64));
        }
    }
    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
}

fn unwound_sum(path: &[PathElement], depth: usize, index: usize) -> f64 {
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let d = depth as f64;
    let mut next_one_portion = path[depth].pweight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one_portion * (d + 1.0) / ((i as f64 + 1.0) * one_fraction);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero_fraction * ((d - i as f64) / (d + 1.0));
        } else if zero_fraction != 0.0 {
            total += (path[i].pweight / zero_fraction) / ((d - i as f64) / (d + 1.0));
        }
    }
    total
}
