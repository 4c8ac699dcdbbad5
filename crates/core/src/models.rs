use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const GENERAL_CATEGORY: &str = "general";

/// A label from one of the category taxonomies. Labels are compared
/// case-sensitively; the model taxonomy ("Plumbing") and the keyword
/// taxonomy ("plumbing") are distinct label spaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn general() -> Self {
        Self(GENERAL_CATEGORY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Which strategy produced a classification, and therefore which label
/// space its categories belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierSource {
    Model,
    Rules,
}

impl ClassifierSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Rules => "rules",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCategory {
    pub category: Category,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub confidence: f32,
    pub ranked: Vec<ScoredCategory>,
    pub source: ClassifierSource,
}

impl ClassificationResult {
    /// Builds a result from scores listed in label order. The ranking is a
    /// stable sort, so equal scores keep their label order. Returns `None`
    /// when there is nothing to rank.
    pub fn from_scores(
        scores: Vec<(Category, f32)>,
        confidence: f32,
        source: ClassifierSource,
    ) -> Option<Self> {
        let ranked = rank_scores(scores);
        let category = ranked.first()?.category.clone();

        Some(Self {
            category,
            confidence: confidence.clamp(0.0, 1.0),
            ranked,
            source,
        })
    }

    pub fn general_sentinel() -> Self {
        Self {
            category: Category::general(),
            confidence: 0.35,
            ranked: vec![ScoredCategory {
                category: Category::general(),
                score: 1.0,
            }],
            source: ClassifierSource::Rules,
        }
    }

    pub fn top_k(&self, k: usize) -> &[ScoredCategory] {
        &self.ranked[..k.min(self.ranked.len())]
    }
}

pub fn rank_scores(scores: Vec<(Category, f32)>) -> Vec<ScoredCategory> {
    let mut ranked = scores
        .into_iter()
        .map(|(category, score)| ScoredCategory { category, score })
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Urgency tiers, ordered by priority (`Low < Medium < High`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
}

impl UrgencyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied complaint identifier. Opaque: any JSON value is
/// accepted and echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComplaintId {
    Number(serde_json::Number),
    Text(String),
    Other(serde_json::Value),
}

impl ComplaintId {
    /// The position this id would shadow when written out as a plain
    /// non-negative integer.
    fn as_index(&self) -> Option<usize> {
        match self {
            Self::Number(number) => number.as_u64().and_then(|value| usize::try_from(value).ok()),
            _ => None,
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, Self::Text(text) if text.is_empty())
    }
}

impl From<i64> for ComplaintId {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for ComplaintId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Identity reported in cluster membership: the complaint id when one was
/// given, otherwise a batch position. See [`member_ids`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemberId {
    Id(ComplaintId),
    Index(usize),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplaintItem {
    #[serde(default)]
    pub id: Option<ComplaintId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ComplaintItem {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: None,
            title: Some(title.into()),
            description: Some(description.into()),
        }
    }

    pub fn with_id(mut self, id: ComplaintId) -> Self {
        self.id = Some(id);
        self
    }

    /// Title and description joined for encoding, or the `"empty"`
    /// placeholder when both are blank.
    pub fn cluster_text(&self) -> String {
        let joined = crate::text::join_text(&[
            self.title.as_deref().unwrap_or_default(),
            self.description.as_deref().unwrap_or_default(),
        ]);
        if joined.is_empty() {
            "empty".to_string()
        } else {
            joined
        }
    }
}

/// Member identities for a batch, in item order. Items without a usable id
/// get their position, moved past any integer already claimed by an
/// explicit id or an earlier position so identities never collide.
pub fn member_ids(items: &[ComplaintItem]) -> Vec<MemberId> {
    let mut taken = items
        .iter()
        .filter_map(|item| item.id.as_ref()?.as_index())
        .collect::<HashSet<_>>();

    items
        .iter()
        .enumerate()
        .map(|(position, item)| match &item.id {
            Some(id) if !id.is_blank() => MemberId::Id(id.clone()),
            _ => {
                let mut index = position;
                while !taken.insert(index) {
                    index += 1;
                }
                MemberId::Index(index)
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub cluster_id: usize,
    pub members: Vec<MemberId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefill {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAdvice {
    pub reply: String,
    pub suggested_category: Option<Category>,
    pub prefill: Prefill,
    pub urgency: UrgencyLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_is_stable_for_ties() {
        let result = ClassificationResult::from_scores(
            vec![
                (Category::from("a"), 0.25),
                (Category::from("b"), 0.5),
                (Category::from("c"), 0.25),
            ],
            0.75,
            ClassifierSource::Rules,
        )
        .expect("non-empty scores");

        let order = result
            .ranked
            .iter()
            .map(|scored| scored.category.as_str())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(result.category.as_str(), "b");
    }

    #[test]
    fn empty_scores_have_no_result() {
        assert!(ClassificationResult::from_scores(Vec::new(), 1.0, ClassifierSource::Model).is_none());
    }

    #[test]
    fn member_ids_fall_back_to_position() {
        let items = vec![
            ComplaintItem::new("leak", ""),
            ComplaintItem::new("leak", "").with_id(ComplaintId::from("c-9")),
            ComplaintItem::new("leak", "").with_id(ComplaintId::from("")),
        ];
        assert_eq!(
            member_ids(&items),
            vec![
                MemberId::Index(0),
                MemberId::Id(ComplaintId::from("c-9")),
                MemberId::Index(2),
            ]
        );
    }

    #[test]
    fn position_fallback_skips_explicit_numeric_ids() {
        let items = vec![
            ComplaintItem::new("pipe leak", "").with_id(ComplaintId::from(1_i64)),
            ComplaintItem::new("water leak pipe", ""),
            ComplaintItem::new("drain blocked", ""),
        ];
        let members = member_ids(&items);
        assert_eq!(
            members,
            vec![
                MemberId::Id(ComplaintId::from(1_i64)),
                MemberId::Index(2),
                MemberId::Index(3),
            ]
        );

        let rendered = members
            .iter()
            .map(|member| serde_json::to_value(member).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(rendered, vec![serde_json::json!(1), serde_json::json!(2), serde_json::json!(3)]);
    }

    #[test]
    fn any_json_id_is_accepted_and_echoed() {
        let raw = serde_json::json!([
            {"id": 1.5, "title": "leak"},
            {"id": true, "title": "leak"},
            {"id": 18446744073709551615u64, "title": "leak"},
            {"id": {"ref": "A-7"}, "title": "leak"},
            {"id": null, "title": "leak"}
        ]);
        let items: Vec<ComplaintItem> = serde_json::from_value(raw).unwrap();
        assert!(matches!(items[0].id, Some(ComplaintId::Number(_))));
        assert_eq!(items[1].id, Some(ComplaintId::Other(serde_json::json!(true))));
        assert!(items[4].id.is_none());

        let rendered = member_ids(&items)
            .iter()
            .map(|member| serde_json::to_value(member).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(rendered[0], serde_json::json!(1.5));
        assert_eq!(rendered[2], serde_json::json!(18446744073709551615u64));
        assert_eq!(rendered[3], serde_json::json!({"ref": "A-7"}));
        assert_eq!(rendered[4], serde_json::json!(4));
    }

    #[test]
    fn blank_item_uses_placeholder_text() {
        let item = ComplaintItem {
            id: None,
            title: Some("  ".to_string()),
            description: None,
        };
        assert_eq!(item.cluster_text(), "empty");
    }

    #[test]
    fn urgency_orders_by_priority() {
        assert!(UrgencyLevel::High > UrgencyLevel::Medium);
        assert!(UrgencyLevel::Medium > UrgencyLevel::Low);
        assert_eq!(
            serde_json::to_value(UrgencyLevel::High).unwrap(),
            serde_json::json!("high")
        );
    }
}
