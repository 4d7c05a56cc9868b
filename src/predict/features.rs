//! Normalises caller-supplied match fields into a [`FeatureRecord`].
//!
//! Resolution order per field: semantic key, then legacy alias, then a fixed
//! default. Missing or malformed values never fail the build.

use serde_json::Value;

use super::models::{FeatureRecord, RawMatch};

pub const DEFAULT_BATTING_TEAM: &str = "Team 1";
pub const DEFAULT_BOWLING_TEAM: &str = "Team 2";
pub const DEFAULT_VENUE: &str = "Unknown Venue";
pub const DEFAULT_TOSS_DECISION: &str = "bat";

pub const DEFAULT_RUNS_REQUIRED: f64 = 150.0;
pub const DEFAULT_BALLS_REMAINING: f64 = 120.0;
pub const DEFAULT_WICKETS_IN_HAND: f64 = 10.0;
pub const DEFAULT_TARGET: f64 = 250.0;
pub const DEFAULT_CURRENT_RUN_RATE: f64 = 6.0;
pub const DEFAULT_REQUIRED_RUN_RATE: f64 = 7.5;

/// Non-blank text; numbers are accepted and stringified.
fn text(raw: &RawMatch, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Finite number, from a JSON number or a numeric string.
fn number(raw: &RawMatch, key: &str) -> Option<f64> {
    let v = match raw.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

fn text_or(raw: &RawMatch, keys: &[&str], default: &str) -> String {
    keys.iter()
        .find_map(|k| text(raw, k))
        .unwrap_or_else(|| default.to_string())
}

pub fn build_features(raw: &RawMatch) -> FeatureRecord {
    let batting_team = text_or(raw, &["batting_team", "team1"], DEFAULT_BATTING_TEAM);
    let bowling_team = text_or(raw, &["bowling_team", "team2"], DEFAULT_BOWLING_TEAM);
    let toss_winner = text_or(raw, &["toss_winner"], &batting_team);

    FeatureRecord {
        venue: text_or(raw, &["venue"], DEFAULT_VENUE),
        toss_decision: text_or(raw, &["toss_decision"], DEFAULT_TOSS_DECISION),
        runs_required: number(raw, "runs_required").unwrap_or(DEFAULT_RUNS_REQUIRED),
        balls_remaining: number(raw, "balls_remaining").unwrap_or(DEFAULT_BALLS_REMAINING),
        wickets_in_hand: number(raw, "wickets_in_hand").unwrap_or(DEFAULT_WICKETS_IN_HAND),
        target_match: number(raw, "target_match").unwrap_or(DEFAULT_TARGET),
        current_run_rate: number(raw, "current_run_rate").unwrap_or(DEFAULT_CURRENT_RUN_RATE),
        required_run_rate: number(raw, "required_run_rate").unwrap_or(DEFAULT_REQUIRED_RUN_RATE),
        batting_team,
        bowling_team,
        toss_winner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> RawMatch {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn minimal_input_resolves_defaults() {
        let r = build_features(&raw(json!({"team1": "A", "team2": "B", "venue": "X"})));
        assert_eq!(r.batting_team, "A");
        assert_eq!(r.bowling_team, "B");
        assert_eq!(r.venue, "X");
        assert_eq!(r.toss_winner, "A");
        assert_eq!(r.toss_decision, "bat");
        assert_eq!(r.runs_required, 150.0);
        assert_eq!(r.balls_remaining, 120.0);
        assert_eq!(r.wickets_in_hand, 10.0);
        assert_eq!(r.target_match, 250.0);
        assert_eq!(r.current_run_rate, 6.0);
        assert_eq!(r.required_run_rate, 7.5);
    }

    #[test]
    fn semantic_keys_win_over_aliases() {
        let r = build_features(&raw(json!({
            "team1": "A",
            "team2": "B",
            "batting_team": "B",
            "bowling_team": "A",
        })));
        assert_eq!(r.batting_team, "B");
        assert_eq!(r.bowling_team, "A");
        assert_eq!(r.toss_winner, "B");
    }

    #[test]
    fn empty_input_never_fails() {
        let r = build_features(&RawMatch::new());
        assert_eq!(r.batting_team, DEFAULT_BATTING_TEAM);
        assert_eq!(r.bowling_team, DEFAULT_BOWLING_TEAM);
        assert_eq!(r.venue, DEFAULT_VENUE);
    }

    #[test]
    fn malformed_values_fall_back() {
        let r = build_features(&raw(json!({
            "team1": "",
            "batting_team": null,
            "runs_required": "lots",
            "balls_remaining": true,
            "wickets_in_hand": [3],
            "toss_decision": "  ",
        })));
        assert_eq!(r.batting_team, DEFAULT_BATTING_TEAM);
        assert_eq!(r.runs_required, DEFAULT_RUNS_REQUIRED);
        assert_eq!(r.balls_remaining, DEFAULT_BALLS_REMAINING);
        assert_eq!(r.wickets_in_hand, DEFAULT_WICKETS_IN_HAND);
        assert_eq!(r.toss_decision, DEFAULT_TOSS_DECISION);
    }

    #[test]
    fn numeric_strings_are_parsed() {
        let r = build_features(&raw(json!({"runs_required": " 42 ", "current_run_rate": 8})));
        assert_eq!(r.runs_required, 42.0);
        assert_eq!(r.current_run_rate, 8.0);
    }
}
