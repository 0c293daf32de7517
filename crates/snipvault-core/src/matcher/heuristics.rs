//! The four independent matchers. Each emits scored candidates; merging
//! happens in the parent module.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use super::imports::extract_imports;
use super::{EditorContext, MatchCandidate};
use crate::models::{Knowledge, SavedItem, Snippet};
use crate::text::{jaccard, token_set};
use crate::util::days_ms;

pub const ERROR_SIMILARITY_WEIGHT: f64 = 80.0;
pub const ERROR_CONTAINMENT_BONUS: f64 = 100.0;
pub const ERROR_TAG_BONUS: f64 = 10.0;
pub const ERROR_KEYWORD_BONUS: f64 = 15.0;
/// Error candidates scoring below this are discarded
pub const ERROR_SCORE_FLOOR: f64 = 10.0;
/// Leading characters of a diagnostic looked up verbatim in answers
pub const ERROR_PREFIX_CHARS: usize = 50;

pub const SNIPPET_LANGUAGE_WEIGHT: f64 = 30.0;
pub const KNOWLEDGE_LANGUAGE_WEIGHT: f64 = 25.0;
pub const RECENCY_BONUS: f64 = 5.0;
pub const RECENCY_WINDOW_DAYS: i64 = 7;

pub const IMPORT_MATCH_WEIGHT: f64 = 20.0;
pub const FRAMEWORK_MATCH_WEIGHT: f64 = 15.0;

pub const TEXT_SIMILARITY_WEIGHT: f64 = 10.0;
pub const TEXT_MATCH_MULTIPLIER: f64 = 10.0;
pub const TEXT_MIN_QUERY_TOKENS: usize = 2;

const ERROR_TAGS: &[&str] = &["error", "fix", "bug", "solution", "debug"];

static ERROR_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(fix(es|ed)?|error|bug|issue|solv(e|es|ed)|solution",
        r"|resolve[sd]?|workaround|debug)\b"
    ))
    .expect("valid regex")
});

pub fn recency_bonus(created_at: i64, now: i64) -> f64 {
    if now.saturating_sub(created_at) <= days_ms(RECENCY_WINDOW_DAYS) {
        RECENCY_BONUS
    } else {
        0.0
    }
}

fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    let short: String = line.chars().take(60).collect();
    if short.chars().count() < line.chars().count() {
        format!("{short}…")
    } else {
        short
    }
}

/// Diagnostics against knowledge questions/answers and snippet descriptions.
pub fn match_errors(
    context: &EditorContext,
    snippets: &[Snippet],
    knowledge: &[Knowledge],
) -> Vec<MatchCandidate> {
    let mut candidates = Vec::new();

    for diagnostic in &context.diagnostics {
        let message = diagnostic.message.trim();
        if message.is_empty() {
            continue;
        }
        let tokens = token_set(message);
        let prefix: String = message
            .chars()
            .take(ERROR_PREFIX_CHARS)
            .collect::<String>()
            .to_lowercase();

        for item in knowledge {
            let similarity = jaccard(&tokens, &token_set(&item.question));
            let contained = !prefix.is_empty() && item.answer.to_lowercase().contains(&prefix);
            let error_tag = item
                .tags
                .iter()
                .any(|tag| ERROR_TAGS.iter().any(|known| tag.trim().eq_ignore_ascii_case(known)));

            let score = similarity.mul_add(
                ERROR_SIMILARITY_WEIGHT,
                if contained { ERROR_CONTAINMENT_BONUS } else { 0.0 }
                    + if error_tag { ERROR_TAG_BONUS } else { 0.0 },
            );
            if score < ERROR_SCORE_FLOOR {
                continue;
            }

            let mut reasons = vec![format!("Error match: {}", preview(message))];
            if contained {
                reasons.push("Answer mentions this error".to_string());
            }
            if error_tag {
                reasons.push("Tagged as a fix".to_string());
            }
            candidates.push(MatchCandidate::new(
                SavedItem::Knowledge(item.clone()),
                score,
                reasons,
            ));
        }

        for snippet in snippets {
            let Some(description) = snippet.description.as_deref() else {
                continue;
            };
            let similarity = jaccard(&tokens, &token_set(description));
            if similarity <= 0.0 {
                continue;
            }
            let keyword = ERROR_KEYWORD_RE.is_match(description);
            let score = similarity.mul_add(
                ERROR_SIMILARITY_WEIGHT,
                if keyword { ERROR_KEYWORD_BONUS } else { 0.0 },
            );
            if score < ERROR_SCORE_FLOOR {
                continue;
            }
            candidates.push(MatchCandidate::new(
                SavedItem::Snippet(snippet.clone()),
                score,
                vec![format!("Error match: {}", preview(message))],
            ));
        }
    }

    candidates
}

/// Active language (and aliases) against snippet languages and knowledge tags.
pub fn match_language(
    context: &EditorContext,
    snippets: &[Snippet],
    knowledge: &[Knowledge],
    now: i64,
) -> Vec<MatchCandidate> {
    let aliases = context.alias_set();
    if aliases.is_empty() {
        return Vec::new();
    }
    let label = context
        .language
        .clone()
        .or_else(|| aliases.iter().next().cloned())
        .unwrap_or_default();

    let mut candidates = Vec::new();
    for snippet in snippets {
        if aliases.contains(&snippet.language.trim().to_lowercase()) {
            candidates.push(MatchCandidate::new(
                SavedItem::Snippet(snippet.clone()),
                SNIPPET_LANGUAGE_WEIGHT + recency_bonus(snippet.created_at, now),
                vec![format!("Language: {label}")],
            ));
        }
    }
    for item in knowledge {
        if item.tags.iter().any(|tag| aliases.contains(tag)) {
            candidates.push(MatchCandidate::new(
                SavedItem::Knowledge(item.clone()),
                KNOWLEDGE_LANGUAGE_WEIGHT + recency_bonus(item.created_at, now),
                vec![format!("Tagged {label}")],
            ));
        }
    }
    candidates
}

/// File imports and framework tags against snippet imports and knowledge text/tags.
pub fn match_imports(
    context: &EditorContext,
    snippets: &[Snippet],
    knowledge: &[Knowledge],
) -> Vec<MatchCandidate> {
    let imports: BTreeSet<String> = context
        .imports
        .iter()
        .filter_map(|import| super::imports::normalize_import(import))
        .collect();
    let frameworks: BTreeSet<String> = context
        .frameworks
        .iter()
        .map(|framework| framework.trim().to_lowercase())
        .filter(|framework| !framework.is_empty())
        .collect();
    if imports.is_empty() && frameworks.is_empty() {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    if !imports.is_empty() {
        for snippet in snippets {
            let snippet_imports = extract_imports(&snippet.code);
            let shared: Vec<&String> = snippet_imports
                .iter()
                .filter(|name| imports.contains(*name))
                .collect();
            if shared.is_empty() {
                continue;
            }
            candidates.push(MatchCandidate::new(
                SavedItem::Snippet(snippet.clone()),
                IMPORT_MATCH_WEIGHT * shared.len() as f64,
                shared.iter().map(|name| format!("Uses {name}")).collect(),
            ));
        }
    }

    for item in knowledge {
        let text = format!("{} {}", item.question, item.answer).to_lowercase();
        let shared_imports: Vec<&String> =
            imports.iter().filter(|name| text.contains(name.as_str())).collect();
        let shared_frameworks: Vec<&String> = frameworks
            .iter()
            .filter(|framework| item.tags.contains(*framework))
            .collect();
        if shared_imports.is_empty() && shared_frameworks.is_empty() {
            continue;
        }

        let score = IMPORT_MATCH_WEIGHT.mul_add(
            shared_imports.len() as f64,
            FRAMEWORK_MATCH_WEIGHT * shared_frameworks.len() as f64,
        );
        let reasons = shared_imports
            .iter()
            .map(|name| format!("Mentions {name}"))
            .chain(shared_frameworks.iter().map(|name| format!("Framework: {name}")))
            .collect();
        candidates.push(MatchCandidate::new(SavedItem::Knowledge(item.clone()), score, reasons));
    }
    candidates
}

/// Selection or current line against each item's combined text.
pub fn match_text(
    context: &EditorContext,
    snippets: &[Snippet],
    knowledge: &[Knowledge],
) -> Vec<MatchCandidate> {
    let Some(query) = context.query_text() else {
        return Vec::new();
    };
    let tokens = token_set(query);
    if tokens.len() < TEXT_MIN_QUERY_TOKENS {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    let mut consider = |item: SavedItem, item_tokens: HashSet<String>| {
        let similarity = jaccard(&tokens, &item_tokens);
        if similarity > 0.0 {
            candidates.push(MatchCandidate::new(
                item,
                TEXT_SIMILARITY_WEIGHT * similarity * TEXT_MATCH_MULTIPLIER,
                vec![format!("Similar text ({:.0}%)", similarity * 100.0)],
            ));
        }
    };

    for snippet in snippets {
        let text = format!(
            "{} {} {}",
            snippet.code,
            snippet.description.as_deref().unwrap_or_default(),
            snippet.language
        );
        consider(SavedItem::Snippet(snippet.clone()), token_set(&text));
    }
    for item in knowledge {
        let text = format!("{} {} {}", item.question, item.answer, item.tags.join(" "));
        consider(SavedItem::Knowledge(item.clone()), token_set(&text));
    }
    candidates
}
