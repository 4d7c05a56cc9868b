pub mod pipeline;
pub mod shap;
pub mod tree;

pub use pipeline::{Pipeline, Preprocessor};
pub use shap::TreeShap;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use pipeline::PipelineArtifact;

/// File name of the metadata artifact, looked up next to the model.
pub const MODEL_INFO_FILE: &str = "model_info.json";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model artifact not found: {0}")]
    ArtifactMissing(PathBuf),
    #[error("model artifact path is not a file: {0}")]
    NotAFile(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt artifact {path}: {source}")]
    ArtifactCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid model: {0}")]
    Invalid(String),
    #[error("feature transform failed: {0}")]
    Transform(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Fit-time feature lists, needed to name transformed features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub numerical_features: Vec<String>,
    pub categorical_features: Vec<String>,
}

impl ModelInfo {
    /// Whether these lists name exactly the preprocessor's columns, in order.
    pub fn describes(&self, preprocessor: &Preprocessor) -> bool {
        self.numerical_features == preprocessor.numerical.columns
            && self.categorical_features == preprocessor.categorical.columns
    }
}

/// Everything loaded from storage at startup. Read-only afterwards.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub pipeline: Pipeline,
    pub info: Option<ModelInfo>,
    /// `None` when the classifier cannot back TreeSHAP.
    pub shap: Option<TreeShap>,
}

impl LoadedModel {
    /// Transformed feature names in classifier column order.
    pub fn feature_names(&self) -> Vec<String> {
        self.pipeline.preprocessor.feature_names()
    }
}

/// Path of the metadata artifact that accompanies `model_path`.
pub fn model_info_path(model_path: &Path) -> PathBuf {
    match model_path.parent() {
        Some(dir) => dir.join(MODEL_INFO_FILE),
        None => PathBuf::from(MODEL_INFO_FILE),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let bytes = std::fs::read(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ModelError::ArtifactCorrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the pipeline, its metadata and the SHAP backend.
///
/// Only the primary artifact is mandatory. A missing or unreadable
/// `model_info.json`, one whose feature lists disagree with the
/// preprocessor, and an unusable SHAP backend are logged and leave the
/// corresponding field empty.
pub fn load(model_path: &Path) -> Result<LoadedModel, ModelError> {
    if !model_path.exists() {
        return Err(ModelError::ArtifactMissing(model_path.to_path_buf()));
    }
    if !model_path.is_file() {
        return Err(ModelError::NotAFile(model_path.to_path_buf()));
    }

    let artifact: PipelineArtifact = read_json(model_path)?;
    let pipeline = Pipeline::from_artifact(artifact)?;
    info!(
        "Model loaded from {} ({} trees, {} features)",
        model_path.display(),
        pipeline.classifier.trees.len(),
        pipeline.classifier.n_features
    );

    let info_path = model_info_path(model_path);
    let info = if info_path.is_file() {
        match read_json::<ModelInfo>(&info_path) {
            Ok(info) if info.describes(&pipeline.preprocessor) => {
                debug!("Model info loaded from {}", info_path.display());
                Some(info)
            }
            Ok(_) => {
                warn!(
                    "Ignoring model info at {}: feature lists do not match the model",
                    info_path.display()
                );
                None
            }
            Err(e) => {
                warn!("Ignoring model info: {}", e);
                None
            }
        }
    } else {
        debug!("No model info at {}", info_path.display());
        None
    };

    let shap = match TreeShap::new(pipeline.classifier.clone()) {
        Ok(shap) => {
            debug!(
                "TreeSHAP explainer initialised (expected value {:.4})",
                shap.expected_value()
            );
            Some(shap)
        }
        Err(e) => {
            debug!("TreeSHAP unavailable, using feature importance instead: {}", e);
            None
        }
    };

    Ok(LoadedModel {
        pipeline,
        info,
        shap,
    })
}
