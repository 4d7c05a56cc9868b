//! Per-feature attribution for a single prediction.
//!
//! Strategies are tried in order until one yields a non-empty ranking:
//! 1. **TreeSHAP** over the transformed row (needs the SHAP backend)
//! 2. **Importance heuristic**: static feature importance scaled by the
//!    current match state (needs `ModelInfo`)
//! 3. **Constant defaults**, so callers always get at least one entry.

use tracing::{debug, warn};

use super::models::{Attribution, FeatureRecord};
use crate::model::LoadedModel;

/// Longest explanation ever returned.
pub const MAX_ATTRIBUTIONS: usize = 10;
/// Longest explanation from the importance heuristic.
pub const MAX_HEURISTIC_ATTRIBUTIONS: usize = 5;
/// Attributions at or below this magnitude are dropped.
pub const MIN_MAGNITUDE: f64 = 0.01;

const CATEGORICAL_PREFIXES: [&str; 5] = [
    "batting_team",
    "bowling_team",
    "venue",
    "toss_winner",
    "toss_decision",
];

#[derive(Debug, thiserror::Error)]
pub enum ExplainError {
    #[error("attribution backend unavailable")]
    BackendUnavailable,
    #[error("model info missing")]
    MissingModelInfo,
    #[error("attribution failed: {0}")]
    Compute(String),
}

/// One step of the attribution fallback chain.
///
/// `Ok(None)` means "nothing worth reporting, try the next strategy".
pub trait AttributionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn attribute(
        &self,
        record: &FeatureRecord,
        model: &LoadedModel,
    ) -> Result<Option<Vec<Attribution>>, ExplainError>;
}

/// Fixed explanation used when nothing model-derived is available.
pub fn default_attributions() -> Vec<Attribution> {
    vec![
        Attribution::signed("runs_required", 0.15),
        Attribution::signed("wickets_in_hand", 0.12),
        Attribution::signed("required_run_rate", -0.10),
        Attribution::signed("balls_remaining", 0.08),
        Attribution::signed("current_run_rate", 0.06),
    ]
}

/// Drop negligible entries, sort by descending magnitude, cap at `limit`.
/// Returns `None` when nothing survives.
fn rank(mut list: Vec<Attribution>, limit: usize) -> Option<Vec<Attribution>> {
    list.retain(|a| a.value.abs() > MIN_MAGNITUDE);
    list.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
    list.truncate(limit);
    (!list.is_empty()).then_some(list)
}

// ── TreeSHAP ─────────────────────────────────────────────────────────────────

pub struct TreeShapAttribution;

impl AttributionStrategy for TreeShapAttribution {
    fn name(&self) -> &'static str {
        "treeshap"
    }

    fn attribute(
        &self,
        record: &FeatureRecord,
        model: &LoadedModel,
    ) -> Result<Option<Vec<Attribution>>, ExplainError> {
        let shap = model.shap.as_ref().ok_or(ExplainError::BackendUnavailable)?;
        let row = model
            .pipeline
            .transform(record)
            .map_err(|e| ExplainError::Compute(e.to_string()))?;
        let phi = shap
            .shap_values(&row)
            .map_err(|e| ExplainError::Compute(e.to_string()))?;
        if phi.iter().any(|v| !v.is_finite()) {
            return Err(ExplainError::Compute("non-finite SHAP value".into()));
        }

        let names = model.feature_names();
        let list = phi
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                let name = names
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("feature_{}", i));
                Attribution::signed(name, v)
            })
            .collect();
        Ok(rank(list, MAX_ATTRIBUTIONS))
    }
}

// ── Importance heuristic ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Direction {
    Positive,
    /// Negative when the value exceeds the threshold.
    NegativeAbove(f64),
}

#[derive(Debug, Clone, Copy)]
enum Scale {
    /// `value / divisor`
    Linear(f64),
    /// `min(value / divisor, 1)`
    Capped(f64),
}

#[derive(Debug, Clone, Copy)]
struct HeuristicRule {
    field: &'static str,
    direction: Direction,
    scale: Scale,
}

impl HeuristicRule {
    fn apply(&self, importance: f64, value: f64) -> f64 {
        let sign = match self.direction {
            Direction::Positive => 1.0,
            Direction::NegativeAbove(t) if value > t => -1.0,
            Direction::NegativeAbove(_) => 1.0,
        };
        let factor = match self.scale {
            Scale::Linear(d) => value / d,
            Scale::Capped(d) => (value / d).min(1.0),
        };
        sign * importance * factor
    }
}

const HEURISTIC_RULES: [HeuristicRule; 5] = [
    HeuristicRule {
        field: "runs_required",
        direction: Direction::NegativeAbove(100.0),
        scale: Scale::Linear(200.0),
    },
    HeuristicRule {
        field: "wickets_in_hand",
        direction: Direction::Positive,
        scale: Scale::Linear(10.0),
    },
    HeuristicRule {
        field: "balls_remaining",
        direction: Direction::Positive,
        scale: Scale::Linear(120.0),
    },
    HeuristicRule {
        field: "required_run_rate",
        direction: Direction::NegativeAbove(8.0),
        scale: Scale::Capped(10.0),
    },
    HeuristicRule {
        field: "current_run_rate",
        direction: Direction::Positive,
        scale: Scale::Capped(10.0),
    },
];

/// Importance used when a feature has no entry in the importance vector.
const FALLBACK_IMPORTANCE: f64 = 0.1;

pub struct ImportanceHeuristic;

impl AttributionStrategy for ImportanceHeuristic {
    fn name(&self) -> &'static str {
        "importance"
    }

    fn attribute(
        &self,
        record: &FeatureRecord,
        model: &LoadedModel,
    ) -> Result<Option<Vec<Attribution>>, ExplainError> {
        let info = model.info.as_ref().ok_or(ExplainError::MissingModelInfo)?;
        let names = model.feature_names();
        let importances = model.pipeline.feature_importances();

        let mut list = Vec::with_capacity(HEURISTIC_RULES.len());
        for rule in &HEURISTIC_RULES {
            if !info.numerical_features.iter().any(|f| f == rule.field) {
                continue;
            }
            let Some(idx) = names.iter().position(|n| n == rule.field) else {
                continue;
            };
            let value = record.numeric(rule.field).ok_or_else(|| {
                ExplainError::Compute(format!("record has no field '{}'", rule.field))
            })?;
            let importance = importances.get(idx).copied().unwrap_or(FALLBACK_IMPORTANCE);
            let contribution = rule.apply(importance, value);
            if !contribution.is_finite() {
                return Err(ExplainError::Compute(format!(
                    "non-finite contribution for '{}'",
                    rule.field
                )));
            }
            list.push(Attribution::signed(display_name(rule.field), contribution));
        }
        Ok(rank(list, MAX_HEURISTIC_ATTRIBUTIONS))
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Human-readable feature label: `runs_required` → `Runs Required`,
/// `batting_team_India` → `Batting Team: India`.
pub fn display_name(name: &str) -> String {
    for prefix in CATEGORICAL_PREFIXES {
        if let Some(rest) = name.strip_prefix(prefix).and_then(|r| r.strip_prefix('_')) {
            if !rest.is_empty() {
                return format!("{}: {}", title_case(&prefix.replace('_', " ")), rest);
            }
        }
    }
    title_case(&name.replace('_', " "))
}

// ── Chain ────────────────────────────────────────────────────────────────────

pub struct Explainer {
    strategies: Vec<Box<dyn AttributionStrategy>>,
}

impl Default for Explainer {
    fn default() -> Self {
        Self::new(vec![Box::new(TreeShapAttribution), Box::new(ImportanceHeuristic)])
    }
}

impl Explainer {
    pub fn new(strategies: Vec<Box<dyn AttributionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Ranked attributions; never empty, at most [`MAX_ATTRIBUTIONS`].
    pub fn explain(&self, record: &FeatureRecord, model: &LoadedModel) -> Vec<Attribution> {
        for strategy in &self.strategies {
            match strategy.attribute(record, model) {
                Ok(Some(mut list)) if !list.is_empty() => {
                    list.truncate(MAX_ATTRIBUTIONS);
                    return list;
                }
                Ok(_) => debug!("{} attribution produced no entries", strategy.name()),
                Err(e @ (ExplainError::BackendUnavailable | ExplainError::MissingModelInfo)) => {
                    debug!("{} attribution skipped: {}", strategy.name(), e)
                }
                Err(e) => warn!("{} attribution failed: {}", strategy.name(), e),
            }
        }
        default_attributions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{self, tests::sample_model_path};
    use std::sync::Arc;
    use crate::predict::features::build_features;
    use crate::predict::models::Impact;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn sample() -> LoadedModel {
        model::load(&sample_model_path()).unwrap()
    }

    fn record(v: serde_json::Value) -> FeatureRecord {
        build_features(v.as_object().unwrap())
    }

    fn assert_well_formed(list: &[Attribution]) {
        assert!(!list.is_empty() && list.len() <= MAX_ATTRIBUTIONS);
        for pair in list.windows(2) {
            assert!(pair[0].value.abs() >= pair[1].value.abs());
        }
        for a in list {
            assert_eq!(a.impact, Impact::of(a.value));
        }
    }

    #[test]
    fn treeshap_is_preferred_when_available() {
        let model = sample();
        let r = record(json!({"team1": "India", "team2": "Australia", "venue": "MCG"}));
        let list = TreeShapAttribution.attribute(&r, &model).unwrap().unwrap();
        assert_well_formed(&list);
        assert!(list.iter().all(|a| a.value.abs() > MIN_MAGNITUDE));
        // Raw encoded names, not display names.
        assert!(list.iter().any(|a| a.feature == "batting_team_India"));
        assert_eq!(Explainer::default().explain(&r, &model), list);
    }

    #[test]
    fn treeshap_values_sum_to_model_output() {
        let model = sample();
        let r = record(json!({"team1": "India", "team2": "England", "runs_required": 60}));
        let row = model.pipeline.transform(&r).unwrap();
        let shap = model.shap.as_ref().unwrap();
        let phi = shap.shap_values(&row).unwrap();
        let [_, p1] = model.pipeline.predict_proba(&r).unwrap();
        assert_relative_eq!(phi.iter().sum::<f64>() + shap.expected_value(), p1, epsilon = 1e-9);
    }

    #[test]
    fn heuristic_used_without_shap_backend() {
        let mut model = sample();
        model.shap = None;
        let r = record(json!({
            "team1": "India",
            "team2": "Australia",
            "runs_required": 120,
            "wickets_in_hand": 5,
            "required_run_rate": 9.0,
        }));
        let list = Explainer::default().explain(&r, &model);
        assert_well_formed(&list);
        assert!(list.len() <= MAX_HEURISTIC_ATTRIBUTIONS);

        let runs = list.iter().find(|a| a.feature == "Runs Required").unwrap();
        assert_relative_eq!(runs.value, -0.24 * 120.0 / 200.0, epsilon = 1e-12);
        let rrr = list.iter().find(|a| a.feature == "Required Run Rate").unwrap();
        assert_relative_eq!(rrr.value, -0.24 * 0.9, epsilon = 1e-12);
        let wickets = list.iter().find(|a| a.feature == "Wickets In Hand").unwrap();
        assert_relative_eq!(wickets.value, 0.20 * 0.5, epsilon = 1e-12);
    }

    #[test]
    fn heuristic_directions_flip_at_thresholds() {
        let mut model = sample();
        model.shap = None;
        let r = record(json!({"runs_required": 90, "required_run_rate": 6.0}));
        let list = ImportanceHeuristic.attribute(&r, &model).unwrap().unwrap();
        let runs = list.iter().find(|a| a.feature == "Runs Required").unwrap();
        assert_eq!(runs.impact, Impact::Positive);
        let rrr = list.iter().find(|a| a.feature == "Required Run Rate").unwrap();
        assert_eq!(rrr.impact, Impact::Positive);
    }

    #[test]
    fn constants_when_everything_else_is_missing() {
        let mut model = sample();
        model.shap = None;
        model.info = None;
        let r = record(json!({}));
        assert!(matches!(
            ImportanceHeuristic.attribute(&r, &model),
            Err(ExplainError::MissingModelInfo)
        ));
        assert_eq!(Explainer::default().explain(&r, &model), default_attributions());
    }

    #[test]
    fn negligible_heuristic_falls_through_to_constants() {
        let mut model = sample();
        model.shap = None;
        let mut classifier = (*model.pipeline.classifier).clone();
        classifier.feature_importances = vec![0.0; classifier.n_features];
        model.pipeline.classifier = Arc::new(classifier);

        let r = record(json!({"team1": "India", "team2": "Australia"}));
        assert!(ImportanceHeuristic.attribute(&r, &model).unwrap().is_none());
        assert_eq!(Explainer::default().explain(&r, &model), default_attributions());
    }

    #[test]
    fn heuristic_skips_fields_absent_from_model_info() {
        let mut model = sample();
        model.shap = None;
        if let Some(info) = model.info.as_mut() {
            info.numerical_features.retain(|f| f != "wickets_in_hand");
        }
        let r = record(json!({
            "team1": "India",
            "team2": "Australia",
            "wickets_in_hand": 3,
            "balls_remaining": 36,
        }));
        let list = ImportanceHeuristic.attribute(&r, &model).unwrap().unwrap();
        assert!(list.iter().all(|a| a.feature != "Wickets In Hand"));
        // Remaining fields keep their own importances.
        let balls = list.iter().find(|a| a.feature == "Balls Remaining").unwrap();
        assert_relative_eq!(balls.value, 0.14 * 36.0 / 120.0, epsilon = 1e-12);
        let runs = list.iter().find(|a| a.feature == "Runs Required").unwrap();
        assert_relative_eq!(runs.value, -0.24 * 150.0 / 200.0, epsilon = 1e-12);
    }

    #[test]
    fn default_list_is_ranked() {
        let list = default_attributions();
        assert_eq!(list.len(), 5);
        assert_well_formed(&list);
    }

    #[test]
    fn rank_filters_and_caps() {
        let list: Vec<Attribution> = (0..15)
            .map(|i| {
                let value = if i % 2 == 0 { 0.005 } else { -(i as f64) };
                Attribution::signed(format!("f{}", i), value)
            })
            .collect();
        let ranked = rank(list, MAX_ATTRIBUTIONS).unwrap();
        assert_eq!(ranked.len(), 7);
        assert_eq!(ranked[0].feature, "f13");
        assert!(rank(vec![Attribution::signed("x", 0.01)], 5).is_none());
    }

    #[test]
    fn display_names() {
        assert_eq!(display_name("runs_required"), "Runs Required");
        assert_eq!(display_name("batting_team_India"), "Batting Team: India");
        assert_eq!(display_name("venue_Wankhede Stadium"), "Venue: Wankhede Stadium");
        assert_eq!(display_name("toss_decision_field"), "Toss Decision: field");
    }

    struct Failing;

    impl AttributionStrategy for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn attribute(
            &self,
            _: &FeatureRecord,
            _: &LoadedModel,
        ) -> Result<Option<Vec<Attribution>>, ExplainError> {
            Err(ExplainError::Compute("boom".into()))
        }
    }

    #[test]
    fn failing_strategy_falls_through() {
        let model = sample();
        let explainer = Explainer::new(vec![Box::new(Failing), Box::new(ImportanceHeuristic)]);
        let r = record(json!({}));
        let list = explainer.explain(&r, &model);
        assert_eq!(list, ImportanceHeuristic.attribute(&r, &model).unwrap().unwrap());
    }
}
