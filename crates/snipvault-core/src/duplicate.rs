//! Duplicate detection run before any capture is saved.
//!
//! A candidate is compared against the live items of the same type in the
//! same project: first by fingerprint, then by token-set Jaccard similarity.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // similarity is 0..=100

use serde::{Deserialize, Serialize};

use crate::models::{Knowledge, SavedItem, Snippet};
use crate::text::{content_hash, jaccard, normalize_content, token_set};

/// Snippet code similarity at or above which a capture is a near-duplicate
pub const SNIPPET_SIMILARITY_THRESHOLD: f64 = 0.80;
/// Knowledge answer similarity at or above which a capture is a near-duplicate
pub const KNOWLEDGE_SIMILARITY_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Similar,
}

/// Outcome of a duplicate check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
    /// Rounded similarity percentage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_item: Option<SavedItem>,
}

impl DuplicateCheck {
    pub const fn unique() -> Self {
        Self {
            is_duplicate: false,
            match_type: None,
            similarity: None,
            existing_item: None,
        }
    }
}

trait Candidate {
    /// Text the fingerprint and similarity are computed over
    fn compared_text(&self) -> &str;
    fn stored_hash(&self) -> Option<&str>;
    fn created_at(&self) -> i64;
    fn id(&self) -> String;
    fn is_deleted(&self) -> bool;
    fn to_saved_item(&self) -> SavedItem;
}

impl Candidate for Snippet {
    fn compared_text(&self) -> &str {
        &self.code
    }

    fn stored_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn id(&self) -> String {
        self.id.as_str()
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn to_saved_item(&self) -> SavedItem {
        SavedItem::Snippet(self.clone())
    }
}

impl Candidate for Knowledge {
    fn compared_text(&self) -> &str {
        &self.answer
    }

    fn stored_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn id(&self) -> String {
        self.id.as_str()
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn to_saved_item(&self) -> SavedItem {
        SavedItem::Knowledge(self.clone())
    }
}

/// Check snippet code against the existing snippets of its project.
pub fn check_snippet(code: &str, existing: &[Snippet]) -> DuplicateCheck {
    find_duplicate(code, existing, SNIPPET_SIMILARITY_THRESHOLD)
}

/// Check a knowledge answer against the existing knowledge of its project.
///
/// The question is informational and does not take part in the comparison.
pub fn check_knowledge(answer: &str, existing: &[Knowledge]) -> DuplicateCheck {
    find_duplicate(answer, existing, KNOWLEDGE_SIMILARITY_THRESHOLD)
}

fn find_duplicate<T: Candidate>(content: &str, existing: &[T], threshold: f64) -> DuplicateCheck {
    let mut candidates: Vec<&T> = existing.iter().filter(|item| !item.is_deleted()).collect();
    // Ties resolve to the oldest item
    candidates.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().cmp(&b.id()))
    });

    let hash = content_hash(content);
    if let Some(exact) = candidates.iter().find(|item| {
        item.stored_hash()
            .map_or_else(|| content_hash(item.compared_text()) == hash, |stored| stored == hash)
    }) {
        return DuplicateCheck {
            is_duplicate: true,
            match_type: Some(MatchType::Exact),
            similarity: Some(100),
            existing_item: Some(exact.to_saved_item()),
        };
    }

    let tokens = token_set(&normalize_content(content));
    let mut best: Option<(f64, &T)> = None;
    for item in candidates {
        let similarity = jaccard(&tokens, &token_set(&normalize_content(item.compared_text())));
        if similarity >= threshold && best.map_or(true, |(score, _)| similarity > score) {
            best = Some((similarity, item));
        }
    }

    best.map_or_else(DuplicateCheck::unique, |(similarity, item)| DuplicateCheck {
        is_duplicate: true,
        match_type: Some(MatchType::Similar),
        similarity: Some((similarity * 100.0).round() as u8),
        existing_item: Some(item.to_saved_item()),
    })
}
