pub mod advisor;
pub mod error;
pub mod keywords;
pub mod models;
pub mod text;
pub mod urgency;

pub use advisor::{chat_urgency, prefill_title, ChatPrefillAdvisor};
pub use error::InputError;
pub use keywords::{KeywordEntry, KeywordTable};
pub use models::*;
pub use text::join_text;
pub use urgency::classify_urgency;
