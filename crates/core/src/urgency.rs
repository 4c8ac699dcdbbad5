use crate::models::UrgencyLevel;
use crate::text::contains_any;

const HIGH_KEYWORDS: &[&str] = &[
    "urgent",
    "immediately",
    "emergency",
    "danger",
    "fire",
    "electric shock",
    "short circuit",
    "no power",
    "gas leak",
    "cannot",
];

const MEDIUM_KEYWORDS: &[&str] = &[
    "soon",
    "asap",
    "please",
    "priority",
    "leak",
    "blocked",
    "broken",
    "not working",
    "smoke",
];

/// Keyword-tier urgency for complaint triage. Tiers are checked High then
/// Medium; anything else is Low.
pub fn classify_urgency(text: &str) -> UrgencyLevel {
    let lower = text.to_lowercase();

    if contains_any(&lower, HIGH_KEYWORDS) {
        return UrgencyLevel::High;
    }

    if contains_any(&lower, MEDIUM_KEYWORDS) {
        return UrgencyLevel::Medium;
    }

    UrgencyLevel::Low
}
