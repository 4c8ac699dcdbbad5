use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use pulse_core::Category;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::encoder::{TfidfEncoder, DEFAULT_MAX_FEATURES};
use crate::error::ArtifactError;
use crate::logistic::{LogisticOptions, LogisticRegression};

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

const DEMO_EXAMPLES: &[(&str, &str)] = &[
    ("Water leakage in kitchen sink, pipe leaking", "Plumbing"),
    ("Bathroom tap leaking and no water pressure", "Plumbing"),
    ("Power outage in living room after storm", "Electrical"),
    ("Light switch sparking when turning on", "Electrical"),
    ("Door hinge stuck, wood chipped", "Carpentry"),
    ("Kitchen cabinet loose, needs fixing", "Carpentry"),
    ("Entrance corridor lights not working", "Electrical"),
    ("House painting required at lobby", "Painting"),
    ("Housekeeping needed in basement", "Cleaning"),
    ("Housekeeping required in stairs and corridor", "Cleaning"),
    ("Security guard absent last night", "Security"),
    ("Strange person noticed near gate", "Security"),
    ("Broken tiles at balcony, needs repair", "Other"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledExample {
    pub text: String,
    pub category: Category,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    description: Option<String>,
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonlRow {
    #[serde(alias = "description")]
    text: Option<String>,
    category: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingCorpus {
    examples: Vec<LabeledExample>,
}

impl TrainingCorpus {
    /// Small built-in facility complaint corpus.
    pub fn demo() -> Self {
        Self::from_pairs(DEMO_EXAMPLES.iter().copied())
    }

    fn from_pairs<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            examples: pairs
                .map(|(text, category)| LabeledExample {
                    text: text.to_string(),
                    category: Category::new(category),
                })
                .collect(),
        }
    }

    /// Loads `.csv` (columns `description`, `category`) or `.jsonl`
    /// (`text`/`description` and `category` per line). Rows missing either
    /// field are skipped.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        let raw = fs::read_to_string(path).map_err(|error| ArtifactError::io(path, error))?;

        let rows = match extension.as_str() {
            "csv" => parse_csv(&raw)?,
            "jsonl" => parse_jsonl(&raw)?,
            other => return Err(ArtifactError::UnsupportedFormat(other.to_string())),
        };

        let corpus = Self {
            examples: rows
                .into_iter()
                .filter_map(|(text, category)| {
                    let text = text?.trim().to_string();
                    let category = category?.trim().to_string();
                    (!text.is_empty() && !category.is_empty()).then(|| LabeledExample {
                        text,
                        category: Category::new(category),
                    })
                })
                .collect(),
        };

        if corpus.is_empty() {
            return Err(ArtifactError::EmptyCorpus);
        }
        Ok(corpus)
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn examples(&self) -> &[LabeledExample] {
        &self.examples
    }
}

fn parse_csv(raw: &str) -> Result<Vec<(Option<String>, Option<String>)>, ArtifactError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw.as_bytes());
    let mut rows = Vec::new();
    for record in reader.deserialize::<CsvRow>() {
        let row = record?;
        rows.push((row.description, row.category));
    }
    Ok(rows)
}

fn parse_jsonl(raw: &str) -> Result<Vec<(Option<String>, Option<String>)>, ArtifactError> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| -> Result<_, ArtifactError> {
            let row: JsonlRow = serde_json::from_str(line)?;
            Ok((row.text, row.category))
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct TrainingOptions {
    pub max_features: usize,
    pub logistic: LogisticOptions,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            max_features: DEFAULT_MAX_FEATURES,
            logistic: LogisticOptions::default(),
        }
    }
}

/// Fitted encoder and classifier, versioned and persisted together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifacts {
    pub format_version: u32,
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    pub encoder: TfidfEncoder,
    pub classifier: LogisticRegression,
}

impl ModelArtifacts {
    pub fn train(corpus: &TrainingCorpus, options: TrainingOptions) -> Result<Self, ArtifactError> {
        if corpus.is_empty() {
            return Err(ArtifactError::EmptyCorpus);
        }

        let texts = corpus
            .examples()
            .iter()
            .map(|example| example.text.as_str())
            .collect::<Vec<_>>();
        let labels = corpus
            .examples()
            .iter()
            .map(|example| example.category.clone())
            .collect::<Vec<_>>();

        let encoder = TfidfEncoder::fit(&texts, options.max_features)?;
        let rows = encoder.encode_batch(&texts);
        let classifier = LogisticRegression::fit(&rows, &labels, options.logistic)?;

        let trained_at = Utc::now();
        info!(
            examples = corpus.len(),
            features = encoder.dims(),
            classes = classifier.classes().len(),
            "trained complaint classifier"
        );

        Ok(Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            model_version: format!("tfidf-lr-{}", trained_at.format("%Y%m%d%H%M%S")),
            trained_at,
            encoder,
            classifier,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|error| ArtifactError::io(path, error))?;
        let artifacts: Self = serde_json::from_str(&raw)?;
        artifacts.validate()?;
        Ok(artifacts)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArtifactError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| ArtifactError::io(parent, error))?;
        }
        let raw = serde_json::to_string(self)?;
        fs::write(path, raw).map_err(|error| ArtifactError::io(path, error))
    }

    pub fn labels(&self) -> &[Category] {
        self.classifier.classes()
    }

    fn validate(&self) -> Result<(), ArtifactError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::VersionMismatch {
                found: self.format_version,
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }
        self.encoder.validate()?;
        if !self.classifier.is_consistent() || self.classifier.dims() != self.encoder.dims() {
            return Err(ArtifactError::DimensionMismatch {
                encoder: self.encoder.dims(),
                classifier: self.classifier.dims(),
            });
        }
        Ok(())
    }
}
