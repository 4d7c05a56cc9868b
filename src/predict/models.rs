use serde::{Deserialize, Serialize};

/// Loosely-typed caller input as consumed by the predictor.
pub type RawMatch = serde_json::Map<String, serde_json::Value>;

/// Canonical single-row feature set the pipeline was fit on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub batting_team: String,
    pub bowling_team: String,
    pub venue: String,
    pub toss_winner: String,
    pub toss_decision: String,
    pub runs_required: f64,
    pub balls_remaining: f64,
    pub wickets_in_hand: f64,
    pub target_match: f64,
    pub current_run_rate: f64,
    pub required_run_rate: f64,
}

impl FeatureRecord {
    /// Numeric column by training-time name; `None` for unknown columns.
    pub fn numeric(&self, column: &str) -> Option<f64> {
        match column {
            "runs_required" => Some(self.runs_required),
            "balls_remaining" => Some(self.balls_remaining),
            "wickets_in_hand" => Some(self.wickets_in_hand),
            "target_match" => Some(self.target_match),
            "current_run_rate" => Some(self.current_run_rate),
            "required_run_rate" => Some(self.required_run_rate),
            _ => None,
        }
    }

    /// Categorical column by training-time name; `None` for unknown columns.
    pub fn categorical(&self, column: &str) -> Option<&str> {
        match column {
            "batting_team" => Some(&self.batting_team),
            "bowling_team" => Some(&self.bowling_team),
            "venue" => Some(&self.venue),
            "toss_winner" => Some(&self.toss_winner),
            "toss_decision" => Some(&self.toss_decision),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Positive,
    Negative,
    Neutral,
}

impl Impact {
    pub fn of(value: f64) -> Self {
        if value > 0.0 {
            Impact::Positive
        } else if value < 0.0 {
            Impact::Negative
        } else {
            Impact::Neutral
        }
    }
}

/// Signed contribution of one feature to the batting-team win probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub feature: String,
    pub value: f64,
    pub impact: Impact,
}

impl Attribution {
    /// Attribution whose impact follows the sign of `value`.
    pub fn signed(feature: impl Into<String>, value: f64) -> Self {
        Self {
            feature: feature.into(),
            value,
            impact: Impact::of(value),
        }
    }
}

/// Output of one prediction call.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub winner: String,
    /// P(batting team wins), unrounded.
    pub probability: f64,
    /// Ordered by descending `|value|`.
    pub explanation: Vec<Attribution>,
}
