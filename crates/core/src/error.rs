use thiserror::Error;

/// Request validation failures. These are the only errors surfaced to
/// callers; model and clustering failures are recovered internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("text must not be empty")]
    EmptyText,
    #[error("title and description must not both be empty")]
    EmptyTitleDescription,
    #[error("no complaints provided")]
    EmptyBatch,
}

impl InputError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyText => "empty_text",
            Self::EmptyTitleDescription => "empty_title_description",
            Self::EmptyBatch => "empty_batch",
        }
    }
}
