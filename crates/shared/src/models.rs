use serde::{Deserialize, Serialize};
use std::fmt;

/// A prospective article subject, optionally with the link it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub link: Option<String>,
}

impl Candidate {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: None,
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Result of reading a source whose failure must not abort the run.
///
/// `Unavailable` keeps the reason so the caller can tell "no data" from
/// "data access failed".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceOutcome<T> {
    Loaded(T),
    Unavailable { reason: String },
}

impl<T> SourceOutcome<T> {
    pub fn from_result<E: fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => SourceOutcome::Loaded(value),
            Err(e) => SourceOutcome::Unavailable {
                reason: e.to_string(),
            },
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, SourceOutcome::Loaded(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            SourceOutcome::Loaded(_) => None,
            SourceOutcome::Unavailable { reason } => Some(reason),
        }
    }
}

impl<T: Default> SourceOutcome<T> {
    pub fn into_loaded_or_default(self) -> T {
        match self {
            SourceOutcome::Loaded(value) => value,
            SourceOutcome::Unavailable { .. } => T::default(),
        }
    }
}

/// Per-feed accounting for one candidate collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedReport {
    pub url: String,
    /// Number of candidates the feed contributed.
    pub outcome: SourceOutcome<usize>,
}

/// Final article ready to be handed to the publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub labels: Vec<String>,
}

impl PostDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            labels: vec!["AI".to_string(), "Technology".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedPost {
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_source_degrades_to_default() {
        let outcome: SourceOutcome<Vec<String>> =
            SourceOutcome::from_result(Err::<Vec<String>, _>("timeout"));

        assert!(!outcome.is_loaded());
        assert_eq!(outcome.reason(), Some("timeout"));
        assert!(outcome.into_loaded_or_default().is_empty());
    }

    #[test]
    fn loaded_source_keeps_value() {
        let outcome = SourceOutcome::<usize>::from_result(Ok::<_, String>(3));
        assert_eq!(outcome, SourceOutcome::Loaded(3));
        assert_eq!(outcome.reason(), None);
    }
}
