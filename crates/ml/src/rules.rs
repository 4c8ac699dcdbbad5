use std::sync::Arc;

use pulse_core::{Category, ClassificationResult, ClassifierSource, KeywordTable};

use crate::error::ModelError;
use crate::CategoryClassifier;

const MAX_RULE_CONFIDENCE: f32 = 0.95;

/// Keyword-count classifier over the configured keyword table. Never fails.
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    keywords: Arc<KeywordTable>,
}

impl RuleClassifier {
    pub fn new(keywords: Arc<KeywordTable>) -> Self {
        Self { keywords }
    }

    pub fn classify_rules(&self, text: &str) -> ClassificationResult {
        let lower = text.to_lowercase();
        let scores = self
            .keywords
            .hit_counts(&lower)
            .filter(|(_, hits)| *hits > 0)
            .map(|(category, hits)| (category.clone(), hits))
            .collect::<Vec<(Category, usize)>>();

        let total = scores.iter().map(|(_, hits)| hits).sum::<usize>();
        if total == 0 {
            return ClassificationResult::general_sentinel();
        }

        // first table entry wins ties
        let mut best = 0;
        for (hits_index, (_, hits)) in scores.iter().enumerate() {
            if *hits > scores[best].1 {
                best = hits_index;
            }
        }
        let share = scores[best].1 as f32 / total as f32;
        let confidence = (0.5 + share * 0.5).min(MAX_RULE_CONFIDENCE);

        let shares = scores
            .into_iter()
            .map(|(category, hits)| (category, hits as f32 / total as f32))
            .collect();

        ClassificationResult::from_scores(shares, confidence, ClassifierSource::Rules)
            .unwrap_or_else(ClassificationResult::general_sentinel)
    }
}

impl CategoryClassifier for RuleClassifier {
    fn name(&self) -> &'static str {
        "rules"
    }

    fn classify(&self, text: &str) -> Result<ClassificationResult, ModelError> {
        Ok(self.classify_rules(text))
    }
}
