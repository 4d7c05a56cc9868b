//! Decision-tree ensembles as exported by the training pipeline.
//!
//! Two ensemble flavours are supported:
//! - **Random forest**: every leaf stores P(batting team wins); the ensemble
//!   output is the mean over trees.
//! - **Gradient boosting**: leaves store additive log-odds; the ensemble
//!   output is `sigmoid(base_score + Σ leaves)`.
//!
//! Splits follow the usual convention: `x[feature] <= threshold` goes left.

use serde::{Deserialize, Serialize};

use super::ModelError;

/// Deepest root-to-leaf path accepted from an artifact. TreeSHAP recurses
/// once per level, so this also bounds its stack use.
pub const MAX_TREE_DEPTH: usize = 64;

/// One node of a fitted tree.
///
/// `cover` is the (weighted) number of training samples that reached the
/// node. It is optional for inference but required by TreeSHAP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        cover: Option<f64>,
    },
    Leaf {
        value: f64,
        #[serde(default)]
        cover: Option<f64>,
    },
}

impl Node {
    pub fn cover(&self) -> Option<f64> {
        match self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => *cover,
        }
    }
}

/// A single tree stored as a flat node array; node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Walk from the root to a leaf and return its value.
    pub fn leaf_value(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Structural checks. Children must point strictly forward, which also
    /// rules out cycles, so `leaf_value` always terminates. Every node except
    /// the root has exactly one parent and sits at most [`MAX_TREE_DEPTH`]
    /// levels down.
    fn validate(&self, tree_idx: usize, n_features: usize) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::Invalid(format!("tree {} has no nodes", tree_idx)));
        }
        let n = self.nodes.len();
        // Parents precede children, so one forward pass settles every depth.
        let mut depth: Vec<Option<usize>> = vec![None; n];
        depth[0] = Some(0);
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                threshold,
                left,
                right,
                ..
            } = node
            {
                if *feature >= n_features {
                    return Err(ModelError::Invalid(format!(
                        "tree {} node {} splits on feature {} (model has {})",
                        tree_idx, i, feature, n_features
                    )));
                }
                if !threshold.is_finite() {
                    return Err(ModelError::Invalid(format!(
                        "tree {} node {} has a non-finite threshold",
                        tree_idx, i
                    )));
                }
                for child in [*left, *right] {
                    if child <= i || child >= n {
                        return Err(ModelError::Invalid(format!(
                            "tree {} node {} has out-of-order child {}",
                            tree_idx, i, child
                        )));
                    }
                    if depth[child].is_some() {
                        return Err(ModelError::Invalid(format!(
                            "tree {} node {} has more than one parent",
                            tree_idx, child
                        )));
                    }
                    let Some(d) = depth[i] else {
                        continue;
                    };
                    if d + 1 > MAX_TREE_DEPTH {
                        return Err(ModelError::Invalid(format!(
                            "tree {} is deeper than {} levels",
                            tree_idx, MAX_TREE_DEPTH
                        )));
                    }
                    depth[child] = Some(d + 1);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnsembleKind {
    RandomForest,
    GradientBoosting { base_score: f64 },
}

/// A fitted binary tree-ensemble classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub kind: EnsembleKind,
    /// Width of the transformed feature vector the trees were fit on.
    pub n_features: usize,
    /// Static (impurity/gain based) importance per transformed feature.
    pub feature_importances: Vec<f64>,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::Invalid("ensemble has no trees".into()));
        }
        if self.feature_importances.len() != self.n_features {
            return Err(ModelError::Invalid(format!(
                "{} feature importances for {} features",
                self.feature_importances.len(),
                self.n_features
            )));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(i, self.n_features)?;
        }
        Ok(())
    }

    /// Raw ensemble output: a probability for forests, log-odds for boosting.
    pub fn raw_output(&self, x: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.leaf_value(x)).sum();
        match self.kind {
            EnsembleKind::RandomForest => sum / self.trees.len() as f64,
            EnsembleKind::GradientBoosting { base_score } => base_score + sum,
        }
    }

    /// `[P(class 0), P(class 1)]` for one transformed row.
    pub fn predict_proba(&self, x: &[f64]) -> Result<[f64; 2], ModelError> {
        if x.len() != self.n_features {
            return Err(ModelError::Inference(format!(
                "expected {} features, got {}",
                self.n_features,
                x.len()
            )));
        }
        let p1 = match self.kind {
            EnsembleKind::RandomForest => self.raw_output(x),
            EnsembleKind::GradientBoosting { .. } => sigmoid(self.raw_output(x)),
        };
        if !p1.is_finite() {
            return Err(ModelError::Inference("non-finite probability".into()));
        }
        let p1 = p1.clamp(0.0, 1.0);
        Ok([1.0 - p1, p1])
    }
}

pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
