//! Import extraction from captured code

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static ES_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)\bimport\s+(?:[\w*{}\s,$]+\s+from\s+)?["']([^"']+)["']"#)
        .expect("valid regex")
});
static REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:require|import)\s*\(\s*["']([^"']+)["']\s*\)"#).expect("valid regex")
});
static PY_FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*from\s+([\w.]+)\s+import\b").expect("valid regex"));
static PY_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*import\s+([\w.]+(?:\s*,\s*[\w.]+)*)\s*$").expect("valid regex")
});
static RUST_USE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:pub\s+)?use\s+(\w+)::").expect("valid regex"));

/// Reduce an import specifier to its top-level package name.
///
/// Relative paths and empty specifiers yield `None`.
pub fn normalize_import(specifier: &str) -> Option<String> {
    let specifier = specifier.trim().trim_matches(|c| c == '"' || c == '\'');
    if specifier.is_empty() || specifier.starts_with('.') || specifier.starts_with('/') {
        return None;
    }
    let specifier = specifier.strip_prefix("node:").unwrap_or(specifier);

    let top = if specifier.starts_with('@') {
        let mut parts = specifier.splitn(3, '/');
        match (parts.next(), parts.next()) {
            (Some(scope), Some(name)) if !name.is_empty() => format!("{scope}/{name}"),
            _ => return None,
        }
    } else {
        specifier
            .split(['/', '.'])
            .next()
            .unwrap_or(specifier)
            .split("::")
            .next()
            .unwrap_or(specifier)
            .to_string()
    };

    let top = top.to_lowercase();
    (!top.is_empty()).then_some(top)
}

/// Top-level packages imported by `code`
pub fn extract_imports(code: &str) -> BTreeSet<String> {
    let mut imports = BTreeSet::new();
    for regex in [&*ES_IMPORT_RE, &*REQUIRE_RE, &*PY_FROM_RE, &*RUST_USE_RE] {
        for captures in regex.captures_iter(code) {
            if let Some(name) = captures.get(1).and_then(|m| normalize_import(m.as_str())) {
                imports.insert(name);
            }
        }
    }
    for captures in PY_IMPORT_RE.captures_iter(code) {
        if let Some(list) = captures.get(1) {
            imports.extend(list.as_str().split(',').filter_map(normalize_import));
        }
    }
    imports
}
