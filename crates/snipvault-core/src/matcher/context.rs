//! Editor context supplied by IDE integrations

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Information,
    Hint,
}

/// A problem reported by the editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

/// Snapshot of what the user is looking at.
///
/// Every field is optional on the wire; missing fields just mean fewer
/// heuristics contribute.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorContext {
    /// Active language id, e.g. `typescript`
    pub language: Option<String>,
    /// Extra names the language goes by
    pub language_aliases: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    /// Import specifiers found in the open file
    pub imports: Vec<String>,
    /// Framework tags detected in the workspace
    pub frameworks: Vec<String>,
    pub selected_text: Option<String>,
    pub current_line: Option<String>,
}

impl EditorContext {
    /// Lowercased language plus every known alias of it
    pub fn alias_set(&self) -> BTreeSet<String> {
        let mut aliases = BTreeSet::new();
        let declared = self
            .language
            .iter()
            .chain(self.language_aliases.iter())
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty());

        for name in declared {
            for group in LANGUAGE_ALIASES {
                if group.contains(&name.as_str()) {
                    aliases.extend(group.iter().map(|alias| (*alias).to_string()));
                }
            }
            aliases.insert(name);
        }
        aliases
    }

    /// Free text to compare against items: the selection, else the current line
    pub fn query_text(&self) -> Option<&str> {
        self.selected_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .or_else(|| self.current_line.as_deref())
            .filter(|text| !text.trim().is_empty())
    }
}

/// Names that refer to the same language
const LANGUAGE_ALIASES: &[&[&str]] = &[
    &["javascript", "js", "jsx", "node", "mjs", "cjs"],
    &["typescript", "ts", "tsx"],
    &["python", "py", "python3"],
    &["rust", "rs"],
    &["go", "golang"],
    &["csharp", "c#", "cs"],
    &["cpp", "c++", "cxx", "cc"],
    &["ruby", "rb"],
    &["kotlin", "kt"],
    &["shell", "bash", "sh", "zsh", "shellscript"],
    &["yaml", "yml"],
    &["markdown", "md"],
    &["powershell", "ps1", "pwsh"],
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_set_expands_known_groups() {
        let context = EditorContext {
            language: Some("JS".to_string()),
            ..EditorContext::default()
        };
        let aliases = context.alias_set();
        assert!(aliases.contains("javascript"));
        assert!(aliases.contains("js"));
        assert!(!aliases.contains("typescript"));
    }

    #[test]
    fn test_alias_set_keeps_unknown_languages() {
        let context = EditorContext {
            language: Some("zig".to_string()),
            language_aliases: vec!["ziglang".to_string()],
            ..EditorContext::default()
        };
        let aliases: Vec<String> = context.alias_set().into_iter().collect();
        assert_eq!(aliases, vec!["zig", "ziglang"]);
    }

    #[test]
    fn test_query_text_prefers_selection() {
        let mut context = EditorContext {
            current_line: Some("let a = 1;".to_string()),
            selected_text: Some("  ".to_string()),
            ..EditorContext::default()
        };
        assert_eq!(context.query_text(), Some("let a = 1;"));

        context.selected_text = Some("fetch(url)".to_string());
        assert_eq!(context.query_text(), Some("fetch(url)"));
    }

    #[test]
    fn test_deserializes_partial_payload() {
        let context: EditorContext =
            serde_json::from_str(r#"{"language":"python","diagnostics":[{"message":"oops"}]}"#)
                .unwrap();
        assert_eq!(context.diagnostics[0].severity, Severity::Error);
        assert!(context.imports.is_empty());
    }
}
