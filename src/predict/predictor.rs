use rand::Rng;
use std::path::Path;
use tracing::{debug, error, warn};

use super::explainer::{default_attributions, Explainer};
use super::features::{build_features, DEFAULT_BATTING_TEAM};
use super::models::{PredictionResult, RawMatch};
use crate::model::{self, LoadedModel, ModelError};

/// Range of the placeholder probability served without a model.
pub const MOCK_PROBABILITY_RANGE: std::ops::RangeInclusive<f64> = 0.55..=0.85;

/// Seam between the service layer and whatever produces predictions.
pub trait WinPredictor: Send + Sync {
    /// Never fails: degraded paths still return a well-formed result.
    fn predict(&self, raw: &RawMatch) -> PredictionResult;

    /// Whether a real model backs the predictions.
    fn model_loaded(&self) -> bool;
}

enum State {
    NoModel,
    Ready(LoadedModel),
}

/// Model-backed predictor with a mock fallback.
///
/// The model is loaded once at construction; there is no reload.
pub struct Predictor {
    state: State,
    explainer: Explainer,
}

impl Predictor {
    /// Load the model at `model_path`.
    ///
    /// A missing or corrupt artifact leaves the predictor in mock mode.
    /// Only a misconfigured path (e.g. a directory) is an error.
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        let state = match model::load(model_path) {
            Ok(model) => State::Ready(model),
            Err(ModelError::ArtifactMissing(path)) => {
                warn!(
                    "Model file not found: {} – serving mock predictions",
                    path.display()
                );
                State::NoModel
            }
            Err(e @ ModelError::NotAFile(_)) => return Err(e),
            Err(e) => {
                error!("Error loading model: {} – serving mock predictions", e);
                State::NoModel
            }
        };
        Ok(Self {
            state,
            explainer: Explainer::default(),
        })
    }

    /// Predictor around an already-loaded model.
    #[cfg(test)]
    pub fn from_model(model: LoadedModel) -> Self {
        Self {
            state: State::Ready(model),
            explainer: Explainer::default(),
        }
    }

    /// Predictor that only serves mock results.
    #[cfg(test)]
    pub fn without_model() -> Self {
        Self {
            state: State::NoModel,
            explainer: Explainer::default(),
        }
    }

    fn predict_with_model(
        &self,
        model: &LoadedModel,
        raw: &RawMatch,
    ) -> Result<PredictionResult, ModelError> {
        let record = build_features(raw);
        let [_, batting_win] = model.pipeline.predict_proba(&record)?;
        let label = model.pipeline.predict(&record)?;
        debug!(
            "P({} wins) = {:.4} against {}",
            record.batting_team, batting_win, record.bowling_team
        );

        let winner = if label == 1 {
            record.batting_team.clone()
        } else {
            record.bowling_team.clone()
        };
        let explanation = self.explainer.explain(&record, model);

        Ok(PredictionResult {
            winner,
            probability: batting_win,
            explanation,
        })
    }
}

/// Placeholder result: the declared primary team with a moderately
/// confident random probability.
pub fn mock_prediction(raw: &RawMatch) -> PredictionResult {
    let winner = ["team1", "batting_team"]
        .iter()
        .find_map(|k| {
            raw.get(*k)
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
        })
        .unwrap_or(DEFAULT_BATTING_TEAM)
        .to_string();
    let probability = rand::thread_rng().gen_range(MOCK_PROBABILITY_RANGE);
    PredictionResult {
        winner,
        probability,
        explanation: default_attributions(),
    }
}

impl WinPredictor for Predictor {
    fn predict(&self, raw: &RawMatch) -> PredictionResult {
        match &self.state {
            State::NoModel => mock_prediction(raw),
            State::Ready(model) => match self.predict_with_model(model, raw) {
                Ok(result) => result,
                Err(e) => {
                    error!("Error during prediction: {} – serving mock prediction", e);
                    mock_prediction(raw)
                }
            },
        }
    }

    fn model_loaded(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("model_loaded", &self.model_loaded())
            .finish()
    }
}
