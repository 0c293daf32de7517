//! Text normalization, tokenization and similarity primitives shared by the
//! duplicate detector, search engine and context matcher.

use std::collections::HashSet;

/// Minimum token length (exclusive): tokens must be longer than this.
const MIN_TOKEN_LEN: usize = 2;

/// Trim, lowercase and collapse whitespace runs to a single space.
///
/// ```
/// use snipvault_core::text::normalize_content;
///
/// assert_eq!(normalize_content("   const   x = 1;  "), "const x = 1;");
/// ```
#[must_use]
pub fn normalize_content(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Order-sensitive 32-bit rolling hash of already-normalized text.
#[must_use]
pub fn rolling_hash(normalized: &str) -> u32 {
    let mut hash: i32 = 0;
    for ch in normalized.chars() {
        #[allow(clippy::cast_possible_wrap)]
        let code = ch as u32 as i32;
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(code);
    }
    #[allow(clippy::cast_sign_loss)]
    let hash = hash as u32;
    hash
}

/// Fingerprint used as `contentHash`: rolling hash of the normalized content.
#[must_use]
pub fn content_hash(text: &str) -> String {
    format!("{:08x}", rolling_hash(&normalize_content(text)))
}

/// Lowercased word tokens longer than two characters, in text order.
///
/// Words are runs of alphanumeric characters or underscores.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
        .filter(|word| word.chars().count() > MIN_TOKEN_LEN)
        .map(str::to_lowercase)
        .collect()
}

/// Distinct tokens of `text`.
#[must_use]
pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Jaccard similarity of two token sets in `[0, 1]`.
///
/// Two empty sets have similarity 0 so that contentless records never match.
#[must_use]
pub fn jaccard(left: &HashSet<String>, right: &HashSet<String>) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(right).count();
    let union = left.len() + right.len() - intersection;
    intersection as f64 / union as f64
}
