//! Caller-facing adapter around a [`WinPredictor`].
//!
//! Maps the external request into the predictor's raw input, then shapes the
//! result: confidence bucket, sanitised explanation, contextual factors and a
//! probability rounded to two decimals.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::ModelError;
use crate::predict::explainer::{default_attributions, MAX_ATTRIBUTIONS};
use crate::predict::features::DEFAULT_TOSS_DECISION;
use crate::predict::{Attribution, Impact, Predictor, RawMatch, WinPredictor};

fn default_match_type() -> String {
    "T20".to_string()
}

/// Request body for a single prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchInput {
    pub team1: String,
    pub team2: String,
    pub venue: String,
    #[serde(default)]
    pub toss_winner: Option<String>,
    #[serde(default)]
    pub toss_decision: Option<String>,
    #[serde(default)]
    pub runs_required: Option<f64>,
    #[serde(default)]
    pub balls_remaining: Option<f64>,
    #[serde(default)]
    pub wickets_in_hand: Option<f64>,
    #[serde(default)]
    pub target_match: Option<f64>,
    #[serde(default)]
    pub current_run_rate: Option<f64>,
    #[serde(default)]
    pub required_run_rate: Option<f64>,
    #[serde(default = "default_match_type")]
    pub match_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// `high` above 0.7, `medium` above 0.6, otherwise `low`.
    pub fn from_probability(p: f64) -> Self {
        if p > 0.7 {
            Confidence::High
        } else if p > 0.6 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub winner: String,
    /// P(team1 wins), rounded to two decimals.
    pub probability: f64,
    pub confidence: Confidence,
    pub explanation: Vec<Attribution>,
    pub factors: BTreeMap<String, String>,
}

pub fn round2(p: f64) -> f64 {
    (p * 100.0).round() / 100.0
}

/// Predictor input for a request. `team1` is always treated as batting.
fn to_raw(input: &MatchInput) -> RawMatch {
    let mut raw = RawMatch::new();
    raw.insert("team1".into(), json!(input.team1));
    raw.insert("team2".into(), json!(input.team2));
    raw.insert("batting_team".into(), json!(input.team1));
    raw.insert("bowling_team".into(), json!(input.team2));
    raw.insert("venue".into(), json!(input.venue));
    raw.insert(
        "toss_winner".into(),
        json!(input.toss_winner.as_deref().unwrap_or(&input.team1)),
    );
    raw.insert(
        "toss_decision".into(),
        json!(input.toss_decision.as_deref().unwrap_or(DEFAULT_TOSS_DECISION)),
    );

    let numeric = [
        ("runs_required", input.runs_required),
        ("balls_remaining", input.balls_remaining),
        ("wickets_in_hand", input.wickets_in_hand),
        ("target_match", input.target_match),
        ("current_run_rate", input.current_run_rate),
        ("required_run_rate", input.required_run_rate),
    ];
    for (key, value) in numeric {
        if let Some(v) = value {
            raw.insert(key.into(), Value::from(v));
        }
    }
    raw
}

/// Per-entry coercion; an empty sequence is replaced by the default list.
fn sanitize_explanation(explanation: Vec<Attribution>) -> Vec<Attribution> {
    if explanation.is_empty() {
        warn!("Predictor returned an empty explanation, using defaults");
        return default_attributions();
    }
    explanation
        .into_iter()
        .take(MAX_ATTRIBUTIONS)
        .map(|a| {
            let feature = if a.feature.trim().is_empty() {
                "Unknown".to_string()
            } else {
                a.feature
            };
            if a.value.is_finite() {
                Attribution {
                    feature,
                    value: a.value,
                    impact: a.impact,
                }
            } else {
                Attribution {
                    feature,
                    value: 0.0,
                    impact: Impact::Neutral,
                }
            }
        })
        .collect()
}

fn factors(input: &MatchInput) -> BTreeMap<String, String> {
    let mut factors = BTreeMap::new();
    factors.insert(
        "toss".to_string(),
        match &input.toss_winner {
            Some(w) => format!("Won by {}", w),
            None => "N/A".to_string(),
        },
    );
    factors.insert(
        "toss_decision".to_string(),
        input.toss_decision.clone().unwrap_or_else(|| "N/A".to_string()),
    );
    factors.insert("venue".to_string(), input.venue.clone());
    factors.insert("match_type".to_string(), input.match_type.clone());
    factors
}

#[derive(Clone)]
pub struct PredictionService {
    predictor: Arc<dyn WinPredictor>,
}

impl PredictionService {
    pub fn new(predictor: Arc<dyn WinPredictor>) -> Self {
        Self { predictor }
    }

    /// Build a service over a [`Predictor`] loaded from `model_path`.
    /// Blocks on file I/O.
    pub fn from_model_path(model_path: &Path) -> Result<Self, ModelError> {
        let predictor = Predictor::load(model_path)?;
        Ok(Self::new(Arc::new(predictor)))
    }

    pub fn model_loaded(&self) -> bool {
        self.predictor.model_loaded()
    }

    pub async fn predict(&self, input: &MatchInput) -> PredictionResponse {
        let raw = to_raw(input);
        let result = self.predictor.predict(&raw);
        debug!(
            "{} vs {}: winner {} (p={:.4})",
            input.team1, input.team2, result.winner, result.probability
        );

        PredictionResponse {
            confidence: Confidence::from_probability(result.probability),
            probability: round2(result.probability),
            winner: result.winner,
            explanation: sanitize_explanation(result.explanation),
            factors: factors(input),
        }
    }
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("model_loaded", &self.model_loaded())
            .finish()
    }
}
