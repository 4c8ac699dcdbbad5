mod artifacts;
mod cluster;
mod encoder;
mod error;
mod hybrid;
mod logistic;
mod rules;
mod statistical;

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pulse_core::{Category, ClassificationResult, ClassifierSource, KeywordTable};
use serde::Serialize;
use tracing::{debug, info, warn};

pub use artifacts::{
    LabeledExample, ModelArtifacts, TrainingCorpus, TrainingOptions, ARTIFACT_FORMAT_VERSION,
};
pub use cluster::{
    default_cluster_count, ClusterAlgorithm, ClusterEngine, ClusterReport, KMEANS_SEED,
    SMALL_BATCH_LIMIT,
};
pub use encoder::{SparseVector, TfidfEncoder, TokenWeight, DEFAULT_MAX_FEATURES};
pub use error::{ArtifactError, ClusterError, ModelError};
pub use hybrid::HybridClassifier;
pub use logistic::{LogisticOptions, LogisticRegression};
pub use rules::RuleClassifier;
pub use statistical::StatisticalClassifier;

pub const DEFAULT_MODEL_PATH: &str = "ml_models/complaint_model_v1.json";
pub const DIAGNOSE_TOP_TOKENS: usize = 8;

/// Capability shared by every classification strategy: text to a ranked
/// category list. Failures are returned, never panicked, so a chain can
/// move on to the next strategy.
pub trait CategoryClassifier: Send + Sync {
    fn name(&self) -> &'static str;
    fn classify(&self, text: &str) -> Result<ClassificationResult, ModelError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub labels: Vec<Category>,
    pub features: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    pub predicted: Category,
    pub confidence: f32,
    pub source: ClassifierSource,
    pub top_tokens: Vec<TokenWeight>,
}

#[derive(Debug, Clone)]
pub struct StackOptions {
    pub model_path: PathBuf,
    pub training_data: Option<PathBuf>,
    pub keywords_path: Option<PathBuf>,
    pub train_demo: bool,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            training_data: None,
            keywords_path: None,
            train_demo: false,
        }
    }
}

impl StackOptions {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| {
            env::var(key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            model_path: non_empty("PULSE_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            training_data: non_empty("PULSE_TRAINING_DATA").map(PathBuf::from),
            keywords_path: non_empty("PULSE_KEYWORDS_PATH").map(PathBuf::from),
            train_demo: non_empty("PULSE_TRAIN_DEMO")
                .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}

/// Read-only model state built once at startup and shared by reference
/// with every request.
#[derive(Clone)]
pub struct PulseMlStack {
    pub keywords: Arc<KeywordTable>,
    pub classifier: Arc<HybridClassifier>,
    pub cluster_engine: ClusterEngine,
    encoder: Option<Arc<TfidfEncoder>>,
    model: Option<ModelInfo>,
}

impl PulseMlStack {
    pub fn load_default() -> Self {
        Self::load(&StackOptions::from_env())
    }

    /// Load-or-fallback: saved artifact, then training data, then the demo
    /// corpus when enabled, then rules only. Never fails.
    pub fn load(options: &StackOptions) -> Self {
        let keywords = Arc::new(load_keywords(options.keywords_path.as_deref()));

        match load_artifacts(options) {
            Some(artifacts) => Self::with_artifacts(artifacts, keywords),
            None => {
                info!("no trained model available, running in rule-based fallback mode");
                Self::rules_only(keywords)
            }
        }
    }

    pub fn rules_only(keywords: Arc<KeywordTable>) -> Self {
        let classifier = Arc::new(HybridClassifier::rules_only(RuleClassifier::new(
            keywords.clone(),
        )));

        Self {
            cluster_engine: ClusterEngine::new(None, classifier.clone()),
            keywords,
            classifier,
            encoder: None,
            model: None,
        }
    }

    pub fn with_artifacts(artifacts: ModelArtifacts, keywords: Arc<KeywordTable>) -> Self {
        let model = ModelInfo {
            version: artifacts.model_version.clone(),
            trained_at: artifacts.trained_at,
            labels: artifacts.labels().to_vec(),
            features: artifacts.encoder.dims(),
        };
        let encoder = Arc::new(artifacts.encoder);
        let statistical = StatisticalClassifier::new(encoder.clone(), Arc::new(artifacts.classifier));

        let classifier = Arc::new(HybridClassifier::new(
            vec![Arc::new(statistical) as Arc<dyn CategoryClassifier>],
            RuleClassifier::new(keywords.clone()),
        ));

        Self {
            cluster_engine: ClusterEngine::new(Some(encoder.clone()), classifier.clone()),
            keywords,
            classifier,
            encoder: Some(encoder),
            model: Some(model),
        }
    }

    pub fn model(&self) -> Option<&ModelInfo> {
        self.model.as_ref()
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// The trained model's labels, or the keyword-table categories when
    /// running on rules alone.
    pub fn labels(&self) -> (Vec<Category>, ClassifierSource) {
        match &self.model {
            Some(model) => (model.labels.clone(), ClassifierSource::Model),
            None => (self.keywords.categories(), ClassifierSource::Rules),
        }
    }

    pub fn diagnose(&self, text: &str) -> Diagnosis {
        let result = self.classifier.classify_text(text);
        let top_tokens = self
            .encoder
            .as_ref()
            .map(|encoder| encoder.top_features(&encoder.encode(text), DIAGNOSE_TOP_TOKENS))
            .unwrap_or_default();

        Diagnosis {
            predicted: result.category,
            confidence: result.confidence,
            source: result.source,
            top_tokens,
        }
    }
}

fn load_keywords(path: Option<&Path>) -> KeywordTable {
    let Some(path) = path else {
        return KeywordTable::default();
    };

    match KeywordTable::from_json_path(path) {
        Ok(table) => {
            info!(path = %path.display(), categories = table.entries().len(), "loaded keyword table");
            table
        }
        Err(error) => {
            warn!(path = %path.display(), error = %error, "keyword table unusable, using built-in table");
            KeywordTable::default()
        }
    }
}

fn load_artifacts(options: &StackOptions) -> Option<ModelArtifacts> {
    if options.model_path.exists() {
        match ModelArtifacts::load(&options.model_path) {
            Ok(artifacts) => {
                info!(
                    path = %options.model_path.display(),
                    version = %artifacts.model_version,
                    "loaded model artifacts"
                );
                return Some(artifacts);
            }
            Err(error) => {
                warn!(path = %options.model_path.display(), error = %error, "model artifacts failed to load");
            }
        }
    } else {
        debug!(path = %options.model_path.display(), "no model artifacts on disk");
    }

    if let Some(data) = &options.training_data {
        let trained = TrainingCorpus::from_path(data)
            .and_then(|corpus| ModelArtifacts::train(&corpus, TrainingOptions::default()));
        match trained {
            Ok(artifacts) => {
                if let Err(error) = artifacts.save(&options.model_path) {
                    warn!(path = %options.model_path.display(), error = %error, "could not persist trained model");
                }
                return Some(artifacts);
            }
            Err(error) => {
                warn!(path = %data.display(), error = %error, "training from corpus failed");
            }
        }
    }

    if options.train_demo {
        match ModelArtifacts::train(&TrainingCorpus::demo(), TrainingOptions::default()) {
            Ok(artifacts) => return Some(artifacts),
            Err(error) => warn!(error = %error, "demo model training failed"),
        }
    }

    None
}
