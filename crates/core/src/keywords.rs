use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::Category;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub category: Category,
    pub keywords: Vec<String>,
}

/// Ordered keyword-to-category table. Iteration order is the tie-break
/// order for rule classification and the match order for chat hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordTable {
    entries: Vec<KeywordEntry>,
}

impl KeywordTable {
    pub fn new(entries: Vec<KeywordEntry>) -> Result<Self> {
        let entries = entries
            .into_iter()
            .map(|entry| KeywordEntry {
                category: entry.category,
                keywords: entry
                    .keywords
                    .into_iter()
                    .map(|keyword| keyword.trim().to_lowercase())
                    .filter(|keyword| !keyword.is_empty())
                    .collect(),
            })
            .collect::<Vec<_>>();

        if entries.is_empty() {
            anyhow::bail!("keyword table must define at least one category");
        }

        Ok(Self { entries })
    }

    /// Reads a JSON array of `{"category": .., "keywords": [..]}` objects.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("failed reading keyword table at {}", path.as_ref().display())
        })?;
        let entries: Vec<KeywordEntry> =
            serde_json::from_str(&raw).context("invalid keyword table json")?;
        Self::new(entries)
    }

    pub fn entries(&self) -> &[KeywordEntry] {
        &self.entries
    }

    pub fn categories(&self) -> Vec<Category> {
        self.entries
            .iter()
            .map(|entry| entry.category.clone())
            .collect()
    }

    /// Substring hit count per category, in table order. `lower` must
    /// already be lower-cased.
    pub fn hit_counts<'a>(&'a self, lower: &'a str) -> impl Iterator<Item = (&'a Category, usize)> + 'a {
        self.entries.iter().map(move |entry| {
            let hits = entry
                .keywords
                .iter()
                .filter(|keyword| lower.contains(keyword.as_str()))
                .count();
            (&entry.category, hits)
        })
    }

    /// First category, in table order, with any keyword present.
    pub fn first_match(&self, lower: &str) -> Option<&Category> {
        self.entries
            .iter()
            .find(|entry| {
                entry
                    .keywords
                    .iter()
                    .any(|keyword| lower.contains(keyword.as_str()))
            })
            .map(|entry| &entry.category)
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        let entry = |category: &str, keywords: &[&str]| KeywordEntry {
            category: Category::new(category),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        };

        Self {
            entries: vec![
                entry("plumbing", &["leak", "water", "pipe", "plumber", "drain", "seep"]),
                entry(
                    "electrical",
                    &["light", "flicker", "power", "wiring", "socket", "electrical", "short"],
                ),
                entry(
                    "pest",
                    &["rat", "rodent", "cockroach", "rodents", "pest", "mosquito", "insect"],
                ),
                entry(
                    "housekeeping",
                    &["clean", "cleaning", "sweep", "mop", "garbage", "trash"],
                ),
                entry("cleaning", &["waterlogging", "drainage", "blocked", "overflow"]),
                entry(
                    "security",
                    &["lock", "security", "guard", "intruder", "breakin", "gate"],
                ),
            ],
        }
    }
}
