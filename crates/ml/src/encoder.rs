use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ArtifactError;

pub const DEFAULT_MAX_FEATURES: usize = 5000;

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("valid token regex"));

/// Sparse row: `(feature index, weight)` pairs sorted by index.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    dims: usize,
    entries: Vec<(usize, f64)>,
}

impl SparseVector {
    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    pub fn is_zero(&self) -> bool {
        self.entries.iter().all(|(_, value)| *value == 0.0)
    }

    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.dims];
        for (index, value) in &self.entries {
            dense[*index] = *value;
        }
        dense
    }

    pub fn dot(&self, weights: &[f64]) -> f64 {
        self.entries
            .iter()
            .map(|(index, value)| weights.get(*index).copied().unwrap_or(0.0) * value)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenWeight {
    pub token: String,
    pub score: f64,
}

/// TF-IDF text encoder over lower-cased word unigrams and bigrams.
///
/// Features are kept in lexicographic order, so lookups are binary
/// searches and the feature index order is stable across save/load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfEncoder {
    features: Vec<String>,
    idf: Vec<f64>,
}

impl TfidfEncoder {
    pub fn fit<S: AsRef<str>>(documents: &[S], max_features: usize) -> Result<Self, ArtifactError> {
        if documents.is_empty() {
            return Err(ArtifactError::EmptyCorpus);
        }

        let mut document_freq: BTreeMap<String, usize> = BTreeMap::new();
        let mut term_freq: HashMap<String, usize> = HashMap::new();

        for document in documents {
            let terms = terms(document.as_ref());
            let mut seen = terms.iter().collect::<Vec<_>>();
            seen.sort();
            seen.dedup();
            for term in seen {
                *document_freq.entry(term.clone()).or_default() += 1;
            }
            for term in terms {
                *term_freq.entry(term).or_default() += 1;
            }
        }

        if document_freq.is_empty() {
            return Err(ArtifactError::EmptyVocabulary);
        }

        let mut kept = document_freq.keys().cloned().collect::<Vec<_>>();
        if kept.len() > max_features {
            kept.sort_by(|a, b| term_freq[b].cmp(&term_freq[a]).then_with(|| a.cmp(b)));
            kept.truncate(max_features);
            kept.sort();
        }

        let total = documents.len() as f64;
        let idf = kept
            .iter()
            .map(|term| ((1.0 + total) / (1.0 + document_freq[term] as f64)).ln() + 1.0)
            .collect();

        Ok(Self {
            features: kept,
            idf,
        })
    }

    pub fn dims(&self) -> usize {
        self.features.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.features
    }

    /// Encodes one document. Text with no known terms yields the zero
    /// vector.
    pub fn encode(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in terms(text) {
            if let Ok(index) = self.features.binary_search(&term) {
                *counts.entry(index).or_default() += 1.0;
            }
        }

        let mut entries = counts
            .into_iter()
            .map(|(index, count)| (index, count * self.idf[index]))
            .collect::<Vec<_>>();

        let norm = entries.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, value) in entries.iter_mut() {
                *value /= norm;
            }
        }

        SparseVector {
            dims: self.dims(),
            entries,
        }
    }

    pub fn encode_batch<S: AsRef<str>>(&self, documents: &[S]) -> Vec<SparseVector> {
        documents
            .iter()
            .map(|document| self.encode(document.as_ref()))
            .collect()
    }

    /// Highest-weighted features of an encoded row, descending by weight.
    /// Equal weights keep feature index order; zero weights are dropped.
    pub fn top_features(&self, vector: &SparseVector, limit: usize) -> Vec<TokenWeight> {
        let mut weighted = vector
            .entries()
            .iter()
            .filter(|(_, value)| *value > 0.0)
            .collect::<Vec<_>>();
        weighted.sort_by(|a, b| b.1.total_cmp(&a.1));

        weighted
            .into_iter()
            .take(limit)
            .filter_map(|(index, value)| {
                self.features.get(*index).map(|token| TokenWeight {
                    token: token.clone(),
                    score: *value,
                })
            })
            .collect()
    }

    pub(crate) fn validate(&self) -> Result<(), ArtifactError> {
        if self.features.is_empty() {
            return Err(ArtifactError::EmptyVocabulary);
        }
        if self.features.len() != self.idf.len() {
            return Err(ArtifactError::CorruptEncoder("idf length differs from vocabulary"));
        }
        if self.features.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ArtifactError::CorruptEncoder("vocabulary is not sorted"));
        }
        if self.idf.iter().any(|value| !value.is_finite()) {
            return Err(ArtifactError::CorruptEncoder("non-finite idf weight"));
        }
        Ok(())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_PATTERN
        .find_iter(&lower)
        .map(|token| token.as_str().to_string())
        .collect()
}

/// Unigrams followed by adjacent-token bigrams.
fn terms(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    let bigrams = tokens
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]))
        .collect::<Vec<_>>();

    let mut terms = tokens;
    terms.extend(bigrams);
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<&'static str> {
        vec![
            "Water leakage in kitchen sink",
            "Power outage in living room",
            "Kitchen cabinet loose",
        ]
    }

    #[test]
    fn vocabulary_is_sorted_with_bigrams() {
        let encoder = TfidfEncoder::fit(&corpus(), DEFAULT_MAX_FEATURES).unwrap();
        let names = encoder.feature_names();
        assert!(names.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(names.iter().any(|name| name == "kitchen sink"));
        // single-character tokens are not features
        assert!(!names.iter().any(|name| name == "a"));
    }

    #[test]
    fn encoded_rows_are_unit_length() {
        let encoder = TfidfEncoder::fit(&corpus(), DEFAULT_MAX_FEATURES).unwrap();
        let row = encoder.encode("kitchen sink leakage");
        let norm = row.entries().iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_vocabulary_text_is_zero() {
        let encoder = TfidfEncoder::fit(&corpus(), DEFAULT_MAX_FEATURES).unwrap();
        let row = encoder.encode("zzz qqq");
        assert!(row.is_zero());
        assert_eq!(row.dims(), encoder.dims());
        assert!(encoder.top_features(&row, 8).is_empty());
    }

    #[test]
    fn rarer_terms_weigh_more() {
        let encoder = TfidfEncoder::fit(&corpus(), DEFAULT_MAX_FEATURES).unwrap();
        let row = encoder.encode("kitchen leakage");
        let top = encoder.top_features(&row, 8);
        assert_eq!(top[0].token, "leakage");
        assert!(top[0].score > top[1].score);
    }

    #[test]
    fn max_features_keeps_most_frequent_terms() {
        let docs = ["leak leak leak pipe", "leak drain"];
        let encoder = TfidfEncoder::fit(&docs, 1).unwrap();
        assert_eq!(encoder.feature_names(), &["leak".to_string()]);
    }

    #[test]
    fn empty_vocabulary_is_an_error() {
        assert!(matches!(
            TfidfEncoder::fit(&["a b", "c"], DEFAULT_MAX_FEATURES),
            Err(ArtifactError::EmptyVocabulary)
        ));
    }
}
