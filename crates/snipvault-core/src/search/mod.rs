//! Free-text search over snippets and knowledge
//!
//! Scoring is token based: an exact substring hit scales with the query
//! length, then each query token earns a whole-word or partial bonus.
//! Every field has its own weight profile.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;

use crate::models::{Knowledge, ProjectId, SavedItem, Snippet};
use crate::text::tokenize;

/// Per-field scoring weights
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWeights {
    /// Multiplied by the query length on a substring hit
    pub exact: u32,
    /// Query token present among the text tokens
    pub word: u32,
    /// Query token overlapping a text token
    pub partial: u32,
}

pub const CODE_WEIGHTS: SearchWeights = SearchWeights { exact: 15, word: 5, partial: 2 };
pub const DESCRIPTION_WEIGHTS: SearchWeights = SearchWeights { exact: 10, word: 3, partial: 1 };
pub const QUESTION_WEIGHTS: SearchWeights = SearchWeights { exact: 12, word: 4, partial: 1 };
pub const ANSWER_WEIGHTS: SearchWeights = SearchWeights { exact: 10, word: 3, partial: 1 };

/// Flat bonus when the language or a tag is named by the query
pub const LABEL_BONUS: u32 = 5;

pub const DEFAULT_MIN_SCORE: u32 = 1;
pub const DEFAULT_LIMIT: usize = 20;
pub const DEFAULT_UNIFIED_LIMIT: usize = 30;

/// Filters applied to a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub project_id: Option<ProjectId>,
    pub min_score: u32,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            project_id: None,
            min_score: DEFAULT_MIN_SCORE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl SearchOptions {
    /// Defaults for a combined snippet + knowledge search
    pub fn unified() -> Self {
        Self {
            limit: DEFAULT_UNIFIED_LIMIT,
            ..Self::default()
        }
    }
}

/// A scored hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(flatten)]
    pub item: SavedItem,
    pub score: u32,
}

/// Score `text` against `query` with one weight profile.
pub fn calculate_search_score(query: &str, text: &str, weights: SearchWeights) -> u32 {
    let query = query.trim().to_lowercase();
    if query.is_empty() || text.is_empty() {
        return 0;
    }
    let text_lower = text.to_lowercase();

    let mut score = 0;
    if text_lower.contains(&query) {
        score += weights.exact * u32::try_from(query.chars().count()).unwrap_or(u32::MAX);
    }

    let text_tokens: HashSet<String> = tokenize(&text_lower).into_iter().collect();
    for token in tokenize(&query) {
        if text_tokens.contains(&token) {
            score += weights.word;
        } else if text_tokens
            .iter()
            .any(|candidate| candidate.contains(&token) || token.contains(candidate.as_str()))
        {
            score += weights.partial;
        }
    }
    score
}

fn label_matches(query: &str, label: &str) -> bool {
    let label = label.trim().to_lowercase();
    if label.is_empty() {
        return false;
    }
    let query = query.trim().to_lowercase();
    query == label || query.split_whitespace().any(|word| word == label)
}

pub fn score_snippet(query: &str, snippet: &Snippet) -> u32 {
    let mut score = calculate_search_score(query, &snippet.code, CODE_WEIGHTS);
    if let Some(description) = &snippet.description {
        score += calculate_search_score(query, description, DESCRIPTION_WEIGHTS);
    }
    if label_matches(query, &snippet.language) {
        score += LABEL_BONUS;
    }
    score
}

pub fn score_knowledge(query: &str, knowledge: &Knowledge) -> u32 {
    let mut score = calculate_search_score(query, &knowledge.question, QUESTION_WEIGHTS)
        + calculate_search_score(query, &knowledge.answer, ANSWER_WEIGHTS);
    if knowledge.tags.iter().any(|tag| label_matches(query, tag)) {
        score += LABEL_BONUS;
    }
    score
}

/// Rank live snippets for a query.
pub fn search_snippets(
    query: &str,
    snippets: &[Snippet],
    options: &SearchOptions,
) -> Vec<SearchResult> {
    let results = snippets
        .iter()
        .filter(|snippet| !snippet.is_deleted && in_scope(options, &snippet.project_id))
        .map(|snippet| SearchResult {
            score: score_snippet(query, snippet),
            item: SavedItem::Snippet(snippet.clone()),
        })
        .collect();
    rank(results, options)
}

/// Rank live knowledge items for a query.
pub fn search_knowledge(
    query: &str,
    knowledge: &[Knowledge],
    options: &SearchOptions,
) -> Vec<SearchResult> {
    let results = knowledge
        .iter()
        .filter(|item| !item.is_deleted && in_scope(options, &item.project_id))
        .map(|item| SearchResult {
            score: score_knowledge(query, item),
            item: SavedItem::Knowledge(item.clone()),
        })
        .collect();
    rank(results, options)
}

/// Search both item types and merge into one ranking.
///
/// Each side is first ranked with the per-type default limit.
pub fn search_all(
    query: &str,
    snippets: &[Snippet],
    knowledge: &[Knowledge],
    options: &SearchOptions,
) -> Vec<SearchResult> {
    let per_type = SearchOptions {
        limit: DEFAULT_LIMIT.max(options.limit),
        ..options.clone()
    };
    let mut results = search_snippets(query, snippets, &per_type);
    results.extend(search_knowledge(query, knowledge, &per_type));
    rank(results, options)
}

fn in_scope(options: &SearchOptions, project_id: &ProjectId) -> bool {
    options.project_id.as_ref().map_or(true, |scope| scope == project_id)
}

/// Filter by `min_score`, sort by score then most recent update, truncate.
fn rank(mut results: Vec<SearchResult>, options: &SearchOptions) -> Vec<SearchResult> {
    results.retain(|result| result.score >= options.min_score);
    results.sort_by(compare_results);
    results.truncate(options.limit);
    results
}

fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.item.updated_at().cmp(&a.item.updated_at()))
        .then_with(|| a.item.id().cmp(&b.item.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exact_match_scales_with_query_length() {
        // "useeffect" substring: 15 * 9, plus whole-word token: 5
        assert_eq!(
            calculate_search_score("useEffect", "useEffect(() => {}, [])", CODE_WEIGHTS),
            15 * 9 + 5
        );
    }

    #[test]
    fn test_partial_match_counts_once_per_token() {
        // "fetch" is contained in "fetchdata" and "prefetch", but scores once
        assert_eq!(
            calculate_search_score("fetch", "fetchData(); prefetch();", DESCRIPTION_WEIGHTS),
            10 * 5 + 1
        );
        assert_eq!(
            calculate_search_score("fetcher", "fetch it", DESCRIPTION_WEIGHTS),
            1
        );
    }

    #[test]
    fn test_no_match_scores_zero() {
        assert_eq!(calculate_search_score("tokio", "async runtime", CODE_WEIGHTS), 0);
        assert_eq!(calculate_search_score("  ", "anything", CODE_WEIGHTS), 0);
    }

    #[test]
    fn test_score_grows_with_matching_tokens() {
        let text = "serde json parse of the response body";
        let narrow = calculate_search_score("serde", text, ANSWER_WEIGHTS);
        let wide = calculate_search_score("serde json", text, ANSWER_WEIGHTS);
        assert_eq!(narrow, 10 * 5 + 3);
        assert_eq!(wide, 10 * 10 + 3 + 3);
    }

    #[test]
    fn test_code_outweighs_description() {
        let project = ProjectId::new();
        let mut in_code = Snippet::new(project, "fn debounce() {}", "rust");
        in_code.description = Some("helper".to_string());
        let mut in_description = Snippet::new(project, "fn helper() {}", "rust");
        in_description.description = Some("debounce".to_string());

        assert!(score_snippet("debounce", &in_code) > score_snippet("debounce", &in_description));
    }

    #[test]
    fn test_language_and_tag_bonus() {
        let project = ProjectId::new();
        let snippet = Snippet::new(project, "print(1)", "python");
        assert_eq!(score_snippet("python", &snippet), LABEL_BONUS);

        let knowledge = Knowledge::new(project, "Q", "A", vec!["docker".to_string()]);
        assert_eq!(score_knowledge("docker compose", &knowledge), LABEL_BONUS);
    }

    #[test]
    fn test_search_filters_sorts_and_limits() {
        let project = ProjectId::new();
        let other_project = ProjectId::new();
        let strong = Snippet::new(project, "async fn retry_request() {}", "rust");
        let weak = Snippet::new(project, "fn retry() {}", "rust");
        let unrelated = Snippet::new(project, "let x = 1;", "rust");
        let elsewhere = Snippet::new(other_project, "async fn retry_request() {}", "rust");
        let mut deleted = Snippet::new(project, "async fn retry_request() {}", "rust");
        deleted.is_deleted = true;

        let snippets = vec![weak.clone(), unrelated, strong.clone(), elsewhere, deleted];
        let options = SearchOptions {
            project_id: Some(project),
            ..SearchOptions::default()
        };

        let results = search_snippets("retry_request", &snippets, &options);
        let ids: Vec<String> = results.iter().map(|result| result.item.id()).collect();
        assert_eq!(ids, vec![strong.id.as_str(), weak.id.as_str()]);

        let limited = search_snippets(
            "retry_request",
            &snippets,
            &SearchOptions { limit: 1, ..options },
        );
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_unified_search_merges_types() {
        let project = ProjectId::new();
        let snippet = Snippet::new(project, "docker compose up -d", "shell");
        let knowledge = Knowledge::new(
            project,
            "How do I restart docker compose?",
            "Run docker compose restart.",
            vec![],
        );

        let results =
            search_all("docker compose", &[snippet], &[knowledge], &SearchOptions::unified());
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
    }
}
