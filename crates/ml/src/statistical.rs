use std::sync::Arc;

use pulse_core::{ClassificationResult, ClassifierSource};

use crate::encoder::TfidfEncoder;
use crate::error::ModelError;
use crate::logistic::LogisticRegression;
use crate::CategoryClassifier;

/// Trained TF-IDF + logistic regression classifier. Scores are class
/// probabilities over the full model label set.
#[derive(Clone)]
pub struct StatisticalClassifier {
    encoder: Arc<TfidfEncoder>,
    model: Arc<LogisticRegression>,
}

impl StatisticalClassifier {
    pub fn new(encoder: Arc<TfidfEncoder>, model: Arc<LogisticRegression>) -> Self {
        Self { encoder, model }
    }
}

impl CategoryClassifier for StatisticalClassifier {
    fn name(&self) -> &'static str {
        "tfidf-logistic"
    }

    fn classify(&self, text: &str) -> Result<ClassificationResult, ModelError> {
        let row = self.encoder.encode(text);
        let probs = self.model.predict_proba(&row)?;

        let confidence = probs.iter().copied().fold(0.0_f64, f64::max) as f32;
        let scores = self
            .model
            .classes()
            .iter()
            .cloned()
            .zip(probs.into_iter().map(|p| p as f32))
            .collect();

        ClassificationResult::from_scores(scores, confidence, ClassifierSource::Model)
            .ok_or(ModelError::NoClasses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ModelArtifacts, TrainingCorpus, TrainingOptions};

    fn classifier() -> StatisticalClassifier {
        let artifacts =
            ModelArtifacts::train(&TrainingCorpus::demo(), TrainingOptions::default()).unwrap();
        StatisticalClassifier::new(Arc::new(artifacts.encoder), Arc::new(artifacts.classifier))
    }

    #[test]
    fn ranks_the_full_label_set() {
        let clf = classifier();
        let result = clf.classify("Water leaking from kitchen pipe").unwrap();

        assert_eq!(result.source, ClassifierSource::Model);
        assert_eq!(result.ranked.len(), 7);
        assert_eq!(result.category, result.ranked[0].category);
        assert_eq!(result.category.as_str(), "Plumbing");
        let total = result.ranked.iter().map(|s| s.score).sum::<f32>();
        assert!((total - 1.0).abs() < 1e-4);
        assert!((result.confidence - result.ranked[0].score).abs() < 1e-6);
    }

    #[test]
    fn unknown_words_do_not_fail() {
        let result = classifier().classify("qwerty zxcv").unwrap();
        assert!(!result.ranked.is_empty());
    }
}
