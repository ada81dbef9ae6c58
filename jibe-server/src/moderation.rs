//! Content moderation hook.
//!
//! The orchestrator only depends on [`ContentModerator`]; the shipped
//! [`WordlistModerator`] is a case-sensitive substring match against a short
//! phrase list.  It is a policy placeholder, not a safety boundary: anything
//! that rephrases a banned phrase passes.

/// Phrases rejected when `JIBE_BANNED_PHRASES` is not set.
pub const DEFAULT_BANNED_PHRASES: &[&str] = &["政治家", "国家领导人", "种族歧视", "恐怖主义"];

/// Decides whether a piece of text may be sent upstream or shown to a user.
pub trait ContentModerator: Send + Sync + 'static {
    fn is_allowed(&self, text: &str) -> bool;
}

/// Rejects text containing any phrase from a fixed list.
#[derive(Debug, Clone)]
pub struct WordlistModerator {
    phrases: Vec<String>,
}

impl WordlistModerator {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }
}

impl Default for WordlistModerator {
    fn default() -> Self {
        Self::new(DEFAULT_BANNED_PHRASES.iter().copied())
    }
}

impl ContentModerator for WordlistModerator {
    fn is_allowed(&self, text: &str) -> bool {
        !self.phrases.iter().any(|p| text.contains(p.as_str()))
    }
}
