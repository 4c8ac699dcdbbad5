use std::sync::Arc;

use pulse_core::ClassificationResult;
use tracing::warn;

use crate::rules::RuleClassifier;
use crate::CategoryClassifier;

/// Ordered chain of classification strategies. Each strategy is tried in
/// turn; the rule classifier terminates the chain and cannot fail.
#[derive(Clone)]
pub struct HybridClassifier {
    strategies: Vec<Arc<dyn CategoryClassifier>>,
    rules: RuleClassifier,
}

impl HybridClassifier {
    pub fn new(strategies: Vec<Arc<dyn CategoryClassifier>>, rules: RuleClassifier) -> Self {
        Self { strategies, rules }
    }

    pub fn rules_only(rules: RuleClassifier) -> Self {
        Self::new(Vec::new(), rules)
    }

    /// Name of the first strategy in the chain.
    pub fn primary(&self) -> &'static str {
        self.strategies
            .first()
            .map(|strategy| strategy.name())
            .unwrap_or_else(|| self.rules.name())
    }

    pub fn classify_text(&self, text: &str) -> ClassificationResult {
        for strategy in &self.strategies {
            match strategy.classify(text) {
                Ok(result) => return result,
                Err(error) => {
                    warn!(strategy = strategy.name(), error = %error, "classifier strategy failed, trying next");
                }
            }
        }
        self.rules.classify_rules(text)
    }
}
