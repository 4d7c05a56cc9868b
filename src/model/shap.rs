//! Exact path-dependent TreeSHAP (Lundberg et al., "Consistent Individualized
//! Feature Attribution for Tree Ensembles", Algorithm 2).
//!
//! Attributions are computed in the ensemble's raw output space: probability
//! for random forests (per-tree values averaged), log-odds for boosting.
//! In both cases `expected_value + Σ phi == raw_output(x)`.

use std::sync::Arc;

use super::tree::{EnsembleKind, Node, Tree, TreeEnsemble};

#[derive(Debug, thiserror::Error)]
pub enum ShapError {
    #[error("tree {tree} node {node} has no positive cover")]
    MissingCover { tree: usize, node: usize },
    #[error("expected {expected} features, got {got}")]
    WidthMismatch { expected: usize, got: usize },
}

/// TreeSHAP backend bound to one classifier.
#[derive(Debug, Clone)]
pub struct TreeShap {
    ensemble: Arc<TreeEnsemble>,
    expected_value: f64,
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

impl TreeShap {
    /// Fails when any node lacks a positive cover, since the path-dependent
    /// algorithm needs the training distribution at every split.
    pub fn new(ensemble: Arc<TreeEnsemble>) -> Result<Self, ShapError> {
        for (t, tree) in ensemble.trees.iter().enumerate() {
            for (n, node) in tree.nodes.iter().enumerate() {
                match node.cover() {
                    Some(c) if c > 0.0 && c.is_finite() => {}
                    _ => return Err(ShapError::MissingCover { tree: t, node: n }),
                }
            }
        }

        let sum: f64 = ensemble.trees.iter().map(tree_expected_value).sum();
        let expected_value = match ensemble.kind {
            EnsembleKind::RandomForest => sum / ensemble.trees.len() as f64,
            EnsembleKind::GradientBoosting { base_score } => base_score + sum,
        };

        Ok(Self {
            ensemble,
            expected_value,
        })
    }

    /// Mean raw output over the training distribution.
    pub fn expected_value(&self) -> f64 {
        self.expected_value
    }

    /// One attribution per transformed feature, towards the positive class.
    pub fn shap_values(&self, x: &[f64]) -> Result<Vec<f64>, ShapError> {
        let n_features = self.ensemble.n_features;
        if x.len() != n_features {
            return Err(ShapError::WidthMismatch {
                expected: n_features,
                got: x.len(),
            });
        }

        let mut phi = vec![0.0; n_features];
        for tree in &self.ensemble.trees {
            recurse(tree, 0, x, &mut phi, &[], 1.0, 1.0, None);
        }

        if let EnsembleKind::RandomForest = self.ensemble.kind {
            let n = self.ensemble.trees.len() as f64;
            for v in &mut phi {
                *v /= n;
            }
        }
        Ok(phi)
    }
}

fn tree_expected_value(tree: &Tree) -> f64 {
    let root_cover = tree.nodes[0].cover().unwrap_or(1.0);
    tree.nodes
        .iter()
        .filter_map(|node| match node {
            Node::Leaf { value, cover } => Some(value * cover.unwrap_or(0.0) / root_cover),
            Node::Split { .. } => None,
        })
        .sum()
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &Tree,
    node_idx: usize,
    x: &[f64],
    phi: &mut [f64],
    parent_path: &[PathElement],
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let mut path = parent_path.to_vec();
    extend(&mut path, zero_fraction, one_fraction, feature);

    match &tree.nodes[node_idx] {
        Node::Leaf { value, .. } => {
            for i in 1..path.len() {
                let w = unwound_sum(&path, i);
                let el = path[i];
                if let Some(f) = el.feature {
                    phi[f] += w * (el.one_fraction - el.zero_fraction) * value;
                }
            }
        }
        Node::Split {
            feature: split_feature,
            threshold,
            left,
            right,
            cover,
        } => {
            let (hot, cold) = if x[*split_feature] <= *threshold {
                (*left, *right)
            } else {
                (*right, *left)
            };
            let cover = cover.unwrap_or(1.0);
            let hot_zero = tree.nodes[hot].cover().unwrap_or(0.0) / cover;
            let cold_zero = tree.nodes[cold].cover().unwrap_or(0.0) / cover;

            // Undo an earlier split on the same feature so it is counted once.
            let mut incoming_zero = 1.0;
            let mut incoming_one = 1.0;
            if let Some(k) = path.iter().position(|e| e.feature == Some(*split_feature)) {
                incoming_zero = path[k].zero_fraction;
                incoming_one = path[k].one_fraction;
                unwind(&mut path, k);
            }

            recurse(
                tree,
                hot,
                x,
                phi,
                &path,
                hot_zero * incoming_zero,
                incoming_one,
                Some(*split_feature),
            );
            recurse(
                tree,
                cold,
                x,
                phi,
                &path,
                cold_zero * incoming_zero,
                0.0,
                Some(*split_feature),
            );
        }
    }
}

fn extend(
    path: &mut Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let denom = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i + 1) as f64 / denom;
        path[i].weight = zero_fraction * path[i].weight * (depth - i) as f64 / denom;
    }
}

fn unwind(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let denom = (depth + 1) as f64;
    let mut next_one_portion = path[depth].weight;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = path[i].weight;
            path[i].weight = next_one_portion * denom / ((i + 1) as f64 * one);
            next_one_portion = tmp - path[i].weight * zero * (depth - i) as f64 / denom;
        } else {
            path[i].weight = path[i].weight * denom / (zero * (depth - i) as f64);
        }
    }

    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

/// Total permutation weight of the path with element `index` removed.
fn unwound_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let mut next_one_portion = path[depth].weight;
    let mut total = 0.0;

    if one != 0.0 {
        for i in (0..depth).rev() {
            let tmp = next_one_portion / ((i + 1) as f64 * one);
            total += tmp;
            next_one_portion = path[i].weight - tmp * zero * (depth - i) as f64;
        }
    } else {
        for i in (0..depth).rev() {
            total += path[i].weight / (zero * (depth - i) as f64);
        }
    }
    total * (depth + 1) as f64
}
