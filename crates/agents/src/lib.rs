use std::sync::Arc;
use std::time::Instant;

use pulse_core::{
    classify_urgency, join_text, Category, ChatAdvice, ChatPrefillAdvisor, ClassificationResult,
    ClassifierSource, ComplaintItem, InputError, ScoredCategory, UrgencyLevel,
};
use pulse_ml::{ClusterReport, Diagnosis, ModelInfo, PulseMlStack};
use pulse_observability::AppMetrics;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

pub const TOP_K: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedPrediction {
    pub category: Category,
    pub urgency: UrgencyLevel,
    pub confidence: f32,
    pub source: ClassifierSource,
    pub candidates: Vec<ScoredCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    #[serde(flatten)]
    pub advice: ChatAdvice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelSet {
    pub labels: Vec<Category>,
    pub source: ClassifierSource,
}

/// Request-facing facade over the shared model stack. Holds no per-request
/// state, so one instance serves concurrent callers.
#[derive(Clone)]
pub struct ComplaintService {
    ml_stack: PulseMlStack,
    advisor: ChatPrefillAdvisor,
    metrics: Arc<AppMetrics>,
}

impl ComplaintService {
    pub fn new(ml_stack: PulseMlStack, metrics: Arc<AppMetrics>) -> Self {
        Self {
            advisor: ChatPrefillAdvisor::new(ml_stack.keywords.clone()),
            ml_stack,
            metrics,
        }
    }

    pub fn ml_stack(&self) -> &PulseMlStack {
        &self.ml_stack
    }

    pub fn model(&self) -> Option<&ModelInfo> {
        self.ml_stack.model()
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }

    /// Ranked categories for free text. Empty text is accepted and lands on
    /// the rule sentinel.
    #[instrument(skip(self, text), fields(chars = text.len()))]
    pub fn classify(&self, text: &str) -> ClassificationResult {
        let started = Instant::now();
        self.metrics.inc_request("classify");

        let result = self.run_classifier(text);

        self.metrics.observe_latency(started.elapsed());
        info!(category = %result.category, source = result.source.as_str(), confidence = result.confidence, "complaint classified");
        result
    }

    /// Like [`Self::classify`] but rejects blank text and keeps every label.
    #[instrument(skip(self, text))]
    pub fn predict_category(&self, text: &str) -> Result<ClassificationResult, InputError> {
        let started = Instant::now();
        self.metrics.inc_request("predict_category");

        if text.trim().is_empty() {
            self.metrics.inc_rejected("predict_category");
            return Err(InputError::EmptyText);
        }

        let result = self.run_classifier(text);
        self.metrics.observe_latency(started.elapsed());
        Ok(result)
    }

    #[instrument(skip(self, title, description))]
    pub fn classify_combined(
        &self,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<CombinedPrediction, InputError> {
        let started = Instant::now();
        self.metrics.inc_request("classify_combined");

        let text = join_text(&[title.unwrap_or_default(), description.unwrap_or_default()]);
        if text.is_empty() {
            self.metrics.inc_rejected("classify_combined");
            return Err(InputError::EmptyTitleDescription);
        }

        let result = self.run_classifier(&text);
        let urgency = classify_urgency(&text);

        self.metrics.observe_latency(started.elapsed());
        info!(category = %result.category, urgency = %urgency, "combined prediction");

        Ok(CombinedPrediction {
            category: result.category,
            urgency,
            confidence: result.confidence,
            source: result.source,
            candidates: result.ranked,
        })
    }

    #[instrument(skip(self, items), fields(items = items.len()))]
    pub fn cluster(
        &self,
        items: &[ComplaintItem],
        n_clusters: Option<usize>,
    ) -> Result<ClusterReport, InputError> {
        let started = Instant::now();
        self.metrics.inc_request("cluster");

        let report = match self.ml_stack.cluster_engine.cluster(items, n_clusters) {
            Ok(report) => report,
            Err(error) => {
                self.metrics.inc_rejected("cluster");
                return Err(error);
            }
        };

        self.metrics.inc_cluster_request(report.fallback_used);
        self.metrics.observe_latency(started.elapsed());
        info!(
            algorithm = ?report.algorithm,
            clusters = report.clusters.len(),
            fallback_used = report.fallback_used,
            "complaints clustered"
        );
        Ok(report)
    }

    #[instrument(skip(self, message))]
    pub fn advise_chat(&self, session_id: Option<String>, message: &str) -> ChatReply {
        self.metrics.inc_request("chat");

        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let advice = self.advisor.advise(message);

        info!(
            session_id = %session_id,
            suggested = ?advice.suggested_category,
            urgency = %advice.urgency,
            "chat advice"
        );
        ChatReply { session_id, advice }
    }

    pub fn list_labels(&self) -> LabelSet {
        let (labels, source) = self.ml_stack.labels();
        LabelSet { labels, source }
    }

    #[instrument(skip(self, text))]
    pub fn diagnose(&self, text: &str) -> Diagnosis {
        self.metrics.inc_request("diagnose");
        self.ml_stack.diagnose(text)
    }

    fn run_classifier(&self, text: &str) -> ClassificationResult {
        let result = self.ml_stack.classifier.classify_text(text);
        if self.ml_stack.model_loaded() {
            self.metrics.inc_ml_inference();
            if result.source == ClassifierSource::Rules {
                self.metrics.inc_classifier_fallback();
            }
        }
        result
    }
}

pub fn top_k(result: &ClassificationResult) -> Vec<ScoredCategory> {
    result.top_k(TOP_K).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{ComplaintId, KeywordTable, MemberId};
    use pulse_ml::{ModelArtifacts, TrainingCorpus, TrainingOptions};

    fn rules_service() -> ComplaintService {
        ComplaintService::new(
            PulseMlStack::rules_only(Arc::new(KeywordTable::default())),
            AppMetrics::shared(),
        )
    }

    fn model_service() -> ComplaintService {
        let artifacts =
            ModelArtifacts::train(&TrainingCorpus::demo(), TrainingOptions::default()).unwrap();
        ComplaintService::new(
            PulseMlStack::with_artifacts(artifacts, Arc::new(KeywordTable::default())),
            AppMetrics::shared(),
        )
    }

    #[test]
    fn kitchen_leak_scenario_on_rules() {
        let result = rules_service().classify("Water leaking from kitchen pipe");
        assert_eq!(result.category.as_str(), "plumbing");
        assert!(result.confidence >= 0.5);
        assert_eq!(result.ranked[0].category.as_str(), "plumbing");
    }

    #[test]
    fn classify_accepts_empty_text() {
        let result = rules_service().classify("");
        assert_eq!(result.category.as_str(), "general");
        assert_eq!(result.confidence, 0.35);
    }

    #[test]
    fn predict_category_rejects_blank_text() {
        let service = rules_service();
        assert_eq!(service.predict_category("  ").unwrap_err(), InputError::EmptyText);
        assert_eq!(service.metrics().snapshot().rejected_total, 1);
    }

    #[test]
    fn combined_rejects_empty_title_and_description() {
        let service = rules_service();
        assert_eq!(
            service.classify_combined(Some(" "), None).unwrap_err(),
            InputError::EmptyTitleDescription
        );
    }

    #[test]
    fn combined_uses_model_and_triage_urgency() {
        let prediction = model_service()
            .classify_combined(Some("Light switch sparking"), Some("short circuit in the hall"))
            .unwrap();
        assert_eq!(prediction.source, ClassifierSource::Model);
        assert_eq!(prediction.category.as_str(), "Electrical");
        assert_eq!(prediction.urgency, UrgencyLevel::High);
        assert_eq!(prediction.candidates.len(), 7);
    }

    #[test]
    fn cluster_counts_fallbacks() {
        let service = rules_service();
        let items = (0..7_i64)
            .map(|i| ComplaintItem::new("leak", "").with_id(ComplaintId::from(i)))
            .collect::<Vec<_>>();
        let report = service.cluster(&items, None).unwrap();

        assert_eq!(report.clusters.len(), 1);
        assert_eq!(report.clusters[0].members[0], MemberId::Id(ComplaintId::from(0_i64)));
        assert_eq!(service.metrics().snapshot().cluster_fallback_total, 1);
        assert_eq!(service.cluster(&[], None).unwrap_err(), InputError::EmptyBatch);
    }

    #[test]
    fn chat_generates_session_when_missing() {
        let service = rules_service();
        let reply = service.advise_chat(None, "urgent leak in bathroom now");
        assert!(!reply.session_id.is_empty());
        assert_eq!(reply.advice.urgency, UrgencyLevel::High);

        let kept = service.advise_chat(Some("s-1".to_string()), "hello");
        assert_eq!(kept.session_id, "s-1");

        let json = serde_json::to_value(&kept).unwrap();
        assert_eq!(json["urgency"], "low");
        assert!(json["prefill"]["title"].is_string());
    }

    #[test]
    fn labels_report_their_source() {
        assert_eq!(rules_service().list_labels().source, ClassifierSource::Rules);
        let labels = model_service().list_labels();
        assert_eq!(labels.source, ClassifierSource::Model);
        assert!(labels.labels.contains(&Category::from("Plumbing")));
    }
}
