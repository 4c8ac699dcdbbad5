use std::path::PathBuf;

use thiserror::Error;

/// Failure of the statistical classifier at inference time. Always
/// recovered by the rule strategy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("feature vector has {found} dimensions, model expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("model produced non-finite probabilities")]
    NonFinite,
    #[error("model has an empty label set")]
    NoClasses,
}

/// Failure of a clustering algorithm. Always recovered by grouping items
/// on their predicted category.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClusterError {
    #[error("cluster count must be positive")]
    ZeroClusters,
    #[error("requested {k} clusters for {items} items")]
    TooManyClusters { k: usize, items: usize },
    #[error("requested {k} clusters but only {distinct} distinct points")]
    TooFewDistinctPoints { k: usize, distinct: usize },
    #[error("non-finite value in cluster computation")]
    NonFinite,
    #[error("batch could not be vectorized: {0}")]
    Vectorize(String),
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid model artifact json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid training csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("unsupported training data format: {0}")]
    UnsupportedFormat(String),
    #[error("artifact format version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("encoder has {encoder} features but classifier expects {classifier}")]
    DimensionMismatch { encoder: usize, classifier: usize },
    #[error("corrupt encoder state: {0}")]
    CorruptEncoder(&'static str),
    #[error("training corpus is empty")]
    EmptyCorpus,
    #[error("corpus produced an empty vocabulary")]
    EmptyVocabulary,
    #[error("training requires at least two categories, found {0}")]
    TooFewClasses(usize),
}

impl ArtifactError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
