use std::sync::Arc;

use unicode_segmentation::UnicodeSegmentation;

use crate::keywords::KeywordTable;
use crate::models::{ChatAdvice, Prefill, UrgencyLevel};
use crate::text::contains_any;

const TITLE_MAX_CHARS: usize = 60;

const NOW_KEYWORDS: &[&str] = &["urgent", "now", "immediately", "asap", "emergency"];
const SOON_KEYWORDS: &[&str] = &["soon", "tomorrow", "today"];

/// Conversational intake hints. Uses only the keyword table, never the
/// trained model, so replies stay cheap and synchronous.
#[derive(Debug, Clone)]
pub struct ChatPrefillAdvisor {
    keywords: Arc<KeywordTable>,
}

impl ChatPrefillAdvisor {
    pub fn new(keywords: Arc<KeywordTable>) -> Self {
        Self { keywords }
    }

    pub fn advise(&self, message: &str) -> ChatAdvice {
        let lower = message.to_lowercase();
        let suggested_category = self.keywords.first_match(&lower).cloned();
        let urgency = chat_urgency(&lower);

        let reply = format!(
            "I understand, this sounds like a {} issue. Is it located in a particular block/apartment? Also, is this urgent?",
            suggested_category
                .as_ref()
                .map(|category| category.as_str())
                .unwrap_or("general")
        );

        ChatAdvice {
            reply,
            suggested_category,
            prefill: Prefill {
                title: prefill_title(&lower),
                description: message.to_string(),
            },
            urgency,
        }
    }
}

/// Two-tier urgency used by the chat flow. Deliberately separate from
/// [`crate::urgency::classify_urgency`], whose vocabulary differs.
pub fn chat_urgency(lower: &str) -> UrgencyLevel {
    if contains_any(lower, NOW_KEYWORDS) {
        UrgencyLevel::High
    } else if contains_any(lower, SOON_KEYWORDS) {
        UrgencyLevel::Medium
    } else {
        UrgencyLevel::Low
    }
}

/// At most 60 characters of the message, cut on a grapheme boundary, with
/// `...` appended when anything was dropped.
pub fn prefill_title(message: &str) -> String {
    // capitalising can widen the first char ("ß" -> "SS")
    let widened = message
        .chars()
        .next()
        .map(|first| first.to_uppercase().count() - 1)
        .unwrap_or(0);
    let limit = TITLE_MAX_CHARS - widened;

    let mut kept = 0;
    let mut end = 0;
    for (offset, grapheme) in message.grapheme_indices(true) {
        let chars = grapheme.chars().count();
        if kept + chars > limit {
            break;
        }
        kept += chars;
        end = offset + grapheme.len();
    }

    let mut title = capitalize(&message[..end]);
    if end < message.len() {
        title.push_str("...");
    }
    title
}

fn capitalize(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
