//! Export of live snippets and knowledge.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::models::{Knowledge, Snippet};

/// Export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

/// Everything exported in one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub exported_at: i64,
    pub snippets: Vec<Snippet>,
    pub knowledge: Vec<Knowledge>,
}

impl ExportBundle {
    /// Bundle the given items, skipping soft-deleted ones, oldest first.
    pub fn new(exported_at: i64, snippets: Vec<Snippet>, knowledge: Vec<Knowledge>) -> Self {
        let mut snippets: Vec<Snippet> = snippets.into_iter().filter(|s| !s.is_deleted).collect();
        snippets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let mut knowledge: Vec<Knowledge> =
            knowledge.into_iter().filter(|k| !k.is_deleted).collect();
        knowledge.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Self {
            exported_at,
            snippets,
            knowledge,
        }
    }

    pub fn len(&self) -> usize {
        self.snippets.len() + self.knowledge.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Render as pretty-printed JSON.
pub fn render_json_export(bundle: &ExportBundle) -> serde_json::Result<String> {
    serde_json::to_string_pretty(bundle)
}

/// Render as Markdown: one frontmatter block per item, code fenced.
#[must_use]
pub fn render_markdown_export(bundle: &ExportBundle) -> String {
    let mut output = String::new();

    for snippet in &bundle.snippets {
        if !output.is_empty() {
            output.push('\n');
        }
        let _ = writeln!(output, "---");
        let _ = writeln!(output, "type: snippet");
        let _ = writeln!(output, "id: {}", snippet.id);
        let _ = writeln!(output, "project_id: {}", snippet.project_id);
        let _ = writeln!(output, "language: {}", snippet.language);
        if let Some(source) = &snippet.source {
            let _ = writeln!(output, "source: {source}");
        }
        let _ = writeln!(output, "created_at: {}", snippet.created_at);
        let _ = writeln!(output, "updated_at: {}", snippet.updated_at);
        let _ = writeln!(output, "---");
        let _ = writeln!(output);
        if let Some(description) = &snippet.description {
            let _ = writeln!(output, "{description}");
            let _ = writeln!(output);
        }
        let fence = fence_for(&snippet.code);
        let _ = writeln!(output, "{fence}{}", snippet.language);
        output.push_str(snippet.code.trim_end_matches('\n'));
        let _ = writeln!(output);
        let _ = writeln!(output, "{fence}");
    }

    for knowledge in &bundle.knowledge {
        if !output.is_empty() {
            output.push('\n');
        }
        let _ = writeln!(output, "---");
        let _ = writeln!(output, "type: knowledge");
        let _ = writeln!(output, "id: {}", knowledge.id);
        let _ = writeln!(output, "project_id: {}", knowledge.project_id);
        if let Some(source) = &knowledge.source {
            let _ = writeln!(output, "source: {source}");
        }
        let _ = writeln!(output, "created_at: {}", knowledge.created_at);
        let _ = writeln!(output, "updated_at: {}", knowledge.updated_at);
        let _ = writeln!(output, "tags:");
        for tag in &knowledge.tags {
            let _ = writeln!(output, "  - {tag}");
        }
        let _ = writeln!(output, "---");
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}", knowledge.question.trim());
        let _ = writeln!(output);
        output.push_str(knowledge.answer.trim_end());
        output.push('\n');
    }

    output
}

/// Render based on selected export format.
pub fn render_export(bundle: &ExportBundle, format: ExportFormat) -> serde_json::Result<String> {
    match format {
        ExportFormat::Json => render_json_export(bundle),
        ExportFormat::Markdown => Ok(render_markdown_export(bundle)),
    }
}

/// Build a deterministic default file name for export flows.
#[must_use]
pub fn suggested_export_file_name(format: ExportFormat, timestamp_ms: i64) -> String {
    format!("snipvault-export-{timestamp_ms}.{}", format.extension())
}

/// A backtick fence longer than any backtick run inside `code`
fn fence_for(code: &str) -> String {
    let longest = code
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or_default();
    "`".repeat(longest.max(2) + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectId;

    fn bundle() -> ExportBundle {
        let project = ProjectId::new();
        let mut snippet = Snippet::new(project, "fn main() {}\n", "rust");
        snippet.created_at = 123;
        snippet.updated_at = 456;
        let mut deleted = Snippet::new(project, "gone", "text");
        deleted.is_deleted = true;
        let knowledge = Knowledge::new(
            project,
            "Why borrowck?",
            "Because aliasing.",
            vec!["rust".to_string(), "Lifetimes".to_string()],
        );
        ExportBundle::new(999, vec![deleted, snippet], vec![knowledge])
    }

    #[test]
    fn bundle_skips_deleted_items() {
        let bundle = bundle();
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.snippets[0].code, "fn main() {}\n");
    }

    #[test]
    fn markdown_export_includes_frontmatter_and_content() {
        let rendered = render_markdown_export(&bundle());
        assert!(rendered.contains("type: snippet"));
        assert!(rendered.contains("created_at: 123"));
        assert!(rendered.contains("updated_at: 456"));
        assert!(rendered.contains("```rust\nfn main() {}\n```"));
        assert!(rendered.contains("tags:\n  - rust\n  - lifetimes"));
        assert!(rendered.contains("## Why borrowck?\n\nBecause aliasing."));
        assert!(!rendered.contains("gone"));
    }

    #[test]
    fn fence_outgrows_embedded_backticks() {
        assert_eq!(fence_for("plain"), "```");
        assert_eq!(fence_for("doc ```` block"), "`````");
    }

    #[test]
    fn json_export_is_camel_case() {
        let json: serde_json::Value =
            serde_json::from_str(&render_json_export(&bundle()).unwrap()).unwrap();
        assert_eq!(json["exportedAt"], 999);
        assert_eq!(json["snippets"][0]["language"], "rust");
        assert_eq!(json["knowledge"][0]["tags"][1], "lifetimes");
    }

    #[test]
    fn suggested_export_file_name_uses_format_extension() {
        assert_eq!(
            suggested_export_file_name(ExportFormat::Json, 123),
            "snipvault-export-123.json"
        );
        assert_eq!(
            suggested_export_file_name(ExportFormat::Markdown, 456),
            "snipvault-export-456.md"
        );
    }
}
