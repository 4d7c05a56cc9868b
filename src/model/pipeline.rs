//! Preprocessing + classifier pipeline.
//!
//! The preprocessor mirrors a column transformer: numeric columns first
//! (optionally standardised), then one-hot encoded categorical columns.
//! Unknown categories encode as all zeros.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::tree::TreeEnsemble;
use super::ModelError;
use crate::predict::models::FeatureRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericTransform {
    pub columns: Vec<String>,
    /// Standard-scaler parameters; both absent means passthrough.
    #[serde(default)]
    pub mean: Option<Vec<f64>>,
    #[serde(default)]
    pub scale: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotTransform {
    pub columns: Vec<String>,
    /// Vocabulary per column, in encoding order.
    pub categories: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessor {
    pub numerical: NumericTransform,
    pub categorical: OneHotTransform,
}

impl Preprocessor {
    pub fn output_width(&self) -> usize {
        self.numerical.columns.len()
            + self
                .categorical
                .categories
                .iter()
                .map(Vec::len)
                .sum::<usize>()
    }

    fn validate(&self) -> Result<(), ModelError> {
        let n = self.numerical.columns.len();
        for (label, v) in [("mean", &self.numerical.mean), ("scale", &self.numerical.scale)] {
            if let Some(v) = v {
                if v.len() != n {
                    return Err(ModelError::Invalid(format!(
                        "scaler {} has {} entries for {} numeric columns",
                        label,
                        v.len(),
                        n
                    )));
                }
            }
        }
        if let Some(scale) = &self.numerical.scale {
            if scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err(ModelError::Invalid("scaler has a zero or non-finite scale".into()));
            }
        }
        if self.categorical.columns.len() != self.categorical.categories.len() {
            return Err(ModelError::Invalid(format!(
                "{} categorical columns but {} vocabularies",
                self.categorical.columns.len(),
                self.categorical.categories.len()
            )));
        }
        Ok(())
    }

    /// Encode one record into the dense row the classifier was fit on.
    pub fn transform(&self, record: &FeatureRecord) -> Result<Vec<f64>, ModelError> {
        let mut row = Vec::with_capacity(self.output_width());

        for (i, column) in self.numerical.columns.iter().enumerate() {
            let mut v = record.numeric(column).ok_or_else(|| {
                ModelError::Transform(format!("unknown numeric column '{}'", column))
            })?;
            if let Some(mean) = &self.numerical.mean {
                v -= mean[i];
            }
            if let Some(scale) = &self.numerical.scale {
                v /= scale[i];
            }
            row.push(v);
        }

        for (column, vocab) in self.categorical.columns.iter().zip(&self.categorical.categories) {
            let value = record.categorical(column).ok_or_else(|| {
                ModelError::Transform(format!("unknown categorical column '{}'", column))
            })?;
            row.extend(vocab.iter().map(|c| if c == value { 1.0 } else { 0.0 }));
        }

        Ok(row)
    }

    /// Output names: numeric columns verbatim, then `{column}_{category}`
    /// for each one-hot slot.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = self.numerical.columns.clone();
        for (column, vocab) in self.categorical.columns.iter().zip(&self.categorical.categories) {
            names.extend(vocab.iter().map(|c| format!("{}_{}", column, c)));
        }
        names
    }
}

/// The trained artifact: preprocessor followed by the classifier.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub preprocessor: Preprocessor,
    pub classifier: Arc<TreeEnsemble>,
}

/// On-disk layout of the pipeline artifact.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PipelineArtifact {
    pub preprocessor: Preprocessor,
    pub classifier: TreeEnsemble,
}

impl Pipeline {
    pub(crate) fn from_artifact(artifact: PipelineArtifact) -> Result<Self, ModelError> {
        artifact.preprocessor.validate()?;
        artifact.classifier.validate()?;
        let width = artifact.preprocessor.output_width();
        if width != artifact.classifier.n_features {
            return Err(ModelError::Invalid(format!(
                "preprocessor emits {} features, classifier expects {}",
                width, artifact.classifier.n_features
            )));
        }
        Ok(Self {
            preprocessor: artifact.preprocessor,
            classifier: Arc::new(artifact.classifier),
        })
    }

    pub fn transform(&self, record: &FeatureRecord) -> Result<Vec<f64>, ModelError> {
        self.preprocessor.transform(record)
    }

    pub fn predict_proba(&self, record: &FeatureRecord) -> Result<[f64; 2], ModelError> {
        let row = self.transform(record)?;
        self.classifier.predict_proba(&row)
    }

    /// Class label; 1 means the batting team wins.
    pub fn predict(&self, record: &FeatureRecord) -> Result<u8, ModelError> {
        let [_, p1] = self.predict_proba(record)?;
        Ok(u8::from(p1 > 0.5))
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.classifier.feature_importances
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::tests::stump;
    use crate::model::tree::EnsembleKind;
    use crate::predict::features::build_features;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn preprocessor() -> Preprocessor {
        Preprocessor {
            numerical: NumericTransform {
                columns: vec!["runs_required".into(), "wickets_in_hand".into()],
                mean: Some(vec![100.0, 5.0]),
                scale: Some(vec![50.0, 2.5]),
            },
            categorical: OneHotTransform {
                columns: vec!["batting_team".into(), "toss_decision".into()],
                categories: vec![
                    vec!["Australia".into(), "India".into()],
                    vec!["bat".into(), "field".into()],
                ],
            },
        }
    }

    fn record() -> FeatureRecord {
        let raw = json!({"team1": "India", "team2": "Australia", "venue": "MCG"});
        build_features(raw.as_object().unwrap())
    }

    #[test]
    fn transform_scales_and_one_hot_encodes() {
        let row = preprocessor().transform(&record()).unwrap();
        assert_eq!(row.len(), 6);
        assert_relative_eq!(row[0], 1.0, epsilon = 1e-12); // (150 - 100) / 50
        assert_relative_eq!(row[1], 2.0, epsilon = 1e-12); // (10 - 5) / 2.5
        assert_eq!(&row[2..], &[0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn unknown_category_encodes_as_zeros() {
        let raw = json!({"team1": "Nepal", "team2": "India", "venue": "MCG"});
        let record = build_features(raw.as_object().unwrap());
        let row = preprocessor().transform(&record).unwrap();
        assert_eq!(&row[2..4], &[0.0, 0.0]);
    }

    #[test]
    fn unknown_column_is_a_transform_error() {
        let mut p = preprocessor();
        p.numerical.columns.push("strike_rate".into());
        p.numerical.mean = None;
        p.numerical.scale = None;
        assert!(matches!(p.transform(&record()), Err(ModelError::Transform(_))));
    }

    #[test]
    fn feature_names_expand_vocabulary() {
        let names = preprocessor().feature_names();
        assert_eq!(
            names,
            vec![
                "runs_required",
                "wickets_in_hand",
                "batting_team_Australia",
                "batting_team_India",
                "toss_decision_bat",
                "toss_decision_field",
            ]
        );
    }

    #[test]
    fn width_mismatch_fails_validation() {
        let artifact = PipelineArtifact {
            preprocessor: preprocessor(),
            classifier: TreeEnsemble {
                kind: EnsembleKind::RandomForest,
                n_features: 3,
                feature_importances: vec![0.3, 0.3, 0.4],
                trees: vec![stump(0, 0.2, 0.8)],
            },
        };
        assert!(matches!(Pipeline::from_artifact(artifact), Err(ModelError::Invalid(_))));
    }

    #[test]
    fn predict_agrees_with_predict_proba() {
        let artifact = PipelineArtifact {
            preprocessor: preprocessor(),
            classifier: TreeEnsemble {
                kind: EnsembleKind::RandomForest,
                n_features: 6,
                feature_importances: vec![0.5, 0.1, 0.1, 0.2, 0.05, 0.05],
                trees: vec![stump(3, 0.3, 0.9)],
            },
        };
        let pipeline = Pipeline::from_artifact(artifact).unwrap();
        let [_, p1] = pipeline.predict_proba(&record()).unwrap();
        assert_relative_eq!(p1, 0.9, epsilon = 1e-12);
        assert_eq!(pipeline.predict(&record()).unwrap(), 1);
    }
}
