//! Context Matcher: rank saved items against the live editor context.
//!
//! Four heuristics (errors, language, imports/frameworks, free text) run
//! independently. Their candidates are merged per item, keeping the best
//! score and every reason.

mod context;
mod heuristics;
mod imports;

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::models::{EntityKind, Knowledge, SavedItem, Snippet};

pub use context::{Diagnostic, EditorContext, Severity};
pub use heuristics::{
    match_errors, match_imports, match_language, match_text, recency_bonus, ERROR_SCORE_FLOOR,
};
pub use imports::{extract_imports, normalize_import};

pub const DEFAULT_MIN_SCORE: f64 = 15.0;
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// One heuristic's opinion about one item
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub item: SavedItem,
    pub score: f64,
    pub reasons: Vec<String>,
}

impl MatchCandidate {
    pub const fn new(item: SavedItem, score: f64, reasons: Vec<String>) -> Self {
        Self {
            item,
            score,
            reasons,
        }
    }
}

/// A ranked, explained match
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    #[serde(flatten)]
    pub item: SavedItem,
    pub relevance_score: f64,
    pub match_reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    pub min_score: f64,
    pub max_results: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// Rank live snippets and knowledge for `context`.
///
/// `now` (Unix ms) anchors the recency bonus.
pub fn match_context(
    context: &EditorContext,
    snippets: &[Snippet],
    knowledge: &[Knowledge],
    options: &MatchOptions,
    now: i64,
) -> Vec<MatchResult> {
    let snippets: Vec<Snippet> = snippets.iter().filter(|s| !s.is_deleted).cloned().collect();
    let knowledge: Vec<Knowledge> = knowledge.iter().filter(|k| !k.is_deleted).cloned().collect();

    let candidates = match_errors(context, &snippets, &knowledge)
        .into_iter()
        .chain(match_language(context, &snippets, &knowledge, now))
        .chain(match_imports(context, &snippets, &knowledge))
        .chain(match_text(context, &snippets, &knowledge));

    let mut results = merge(candidates);
    results.retain(|result| result.relevance_score >= options.min_score);
    results.sort_by(compare_results);
    results.truncate(options.max_results);
    results
}

/// Combine candidates by `(type, id)`: max score, reasons concatenated.
pub fn merge(candidates: impl IntoIterator<Item = MatchCandidate>) -> Vec<MatchResult> {
    let mut order: Vec<(EntityKind, String)> = Vec::new();
    let mut merged: HashMap<(EntityKind, String), MatchResult> = HashMap::new();

    for candidate in candidates {
        let key = (candidate.item.kind(), candidate.item.id());
        if let Some(existing) = merged.get_mut(&key) {
            existing.relevance_score = existing.relevance_score.max(candidate.score);
            for reason in candidate.reasons {
                if !existing.match_reasons.contains(&reason) {
                    existing.match_reasons.push(reason);
                }
            }
        } else {
            order.push(key.clone());
            merged.insert(
                key,
                MatchResult {
                    item: candidate.item,
                    relevance_score: candidate.score,
                    match_reasons: candidate.reasons,
                },
            );
        }
    }

    order
        .into_iter()
        .filter_map(|key| merged.remove(&key))
        .collect()
}

fn compare_results(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.relevance_score
        .total_cmp(&a.relevance_score)
        .then_with(|| b.item.created_at().cmp(&a.item.created_at()))
        .then_with(|| a.item.id().cmp(&b.item.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectId;
    use pretty_assertions::assert_eq;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_merge_keeps_max_and_concatenates_reasons() {
        let snippet = Snippet::new(ProjectId::new(), "x", "rust");
        let item = SavedItem::Snippet(snippet);
        let merged = merge([
            MatchCandidate::new(item.clone(), 30.0, vec!["Language: rust".to_string()]),
            MatchCandidate::new(item, 40.0, vec!["Uses serde".to_string()]),
        ]);

        assert_eq!(merged.len(), 1);
        assert!((merged[0].relevance_score - 40.0).abs() < f64::EPSILON);
        assert_eq!(
            merged[0].match_reasons,
            vec!["Language: rust".to_string(), "Uses serde".to_string()]
        );
    }

    #[test]
    fn test_error_match_outranks_language_match() {
        let project = ProjectId::new();
        let mut by_language = Snippet::new(project, "console.log(1)", "javascript");
        by_language.created_at = NOW;
        let mut by_error = Knowledge::new(
            project,
            "TypeError cannot read property map of undefined",
            "Guard the array before mapping.",
            vec![],
        );
        by_error.created_at = NOW;

        let context = EditorContext {
            language: Some("javascript".to_string()),
            diagnostics: vec![Diagnostic::error(
                "TypeError: Cannot read property 'map' of undefined",
            )],
            ..EditorContext::default()
        };

        let results = match_context(
            &context,
            &[by_language.clone()],
            &[by_error.clone()],
            &MatchOptions::default(),
            NOW,
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].item.id(), by_error.id.as_str());
        assert_eq!(results[1].item.id(), by_language.id.as_str());
    }

    #[test]
    fn test_min_score_and_max_results() {
        let project = ProjectId::new();
        let snippets: Vec<Snippet> = (0..15)
            .map(|i| {
                let mut snippet = Snippet::new(project, format!("let v{i} = {i};"), "rust");
                snippet.created_at = NOW - i64::from(i);
                snippet
            })
            .collect();
        let context = EditorContext {
            language: Some("rust".to_string()),
            ..EditorContext::default()
        };

        let results = match_context(&context, &snippets, &[], &MatchOptions::default(), NOW);
        assert_eq!(results.len(), DEFAULT_MAX_RESULTS);
        // equal scores fall back to newest first
        assert_eq!(results[0].item.id(), snippets[0].id.as_str());

        let strict = MatchOptions {
            min_score: 50.0,
            ..MatchOptions::default()
        };
        assert!(match_context(&context, &snippets, &[], &strict, NOW).is_empty());
    }

    #[test]
    fn test_empty_context_matches_nothing() {
        let snippet = Snippet::new(ProjectId::new(), "x", "rust");
        let knowledge = Knowledge::new(ProjectId::new(), "q", "a", vec![]);
        assert!(match_context(
            &EditorContext::default(),
            &[snippet],
            &[knowledge],
            &MatchOptions::default(),
            NOW
        )
        .is_empty());
    }

    #[test]
    fn test_deleted_items_never_match() {
        let mut snippet = Snippet::new(ProjectId::new(), "x", "rust");
        snippet.is_deleted = true;
        let context = EditorContext {
            language: Some("rust".to_string()),
            ..EditorContext::default()
        };
        assert!(match_context(&context, &[snippet], &[], &MatchOptions::default(), NOW).is_empty());
    }

    #[test]
    fn test_result_serializes_flat() {
        let snippet = Snippet::new(ProjectId::new(), "x", "rust");
        let result = MatchResult {
            item: SavedItem::Snippet(snippet),
            relevance_score: 30.0,
            match_reasons: vec!["Language: rust".to_string()],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "snippet");
        assert_eq!(json["relevanceScore"], 30.0);
        assert_eq!(json["matchReasons"][0], "Language: rust");
    }
}
