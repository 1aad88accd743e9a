use std::fmt::Write;

use chrono::SecondsFormat;

use crate::types::Page;

/// Full Markdown file for a page: optional front matter, the title heading,
/// then `body`. Every value comes from the page record, so the same remote
/// page always yields the same bytes.
pub fn build_markdown_document(page: &Page, body: &str, front_matter: bool) -> String {
    let mut doc = String::with_capacity(body.len() + 256);
    if front_matter {
        doc.push_str("---\n");
        let _ = writeln!(doc, "id: {}", yaml_string(&page.id));
        let _ = writeln!(doc, "title: {}", yaml_string(&page.title));
        if let Some(space) = &page.space_key {
            let _ = writeln!(doc, "space: {}", yaml_string(space));
        }
        if let Some(parent) = &page.parent_id {
            let _ = writeln!(doc, "parent_id: {}", yaml_string(parent));
        }
        if page.ancestors.is_empty() {
            doc.push_str("ancestors: []\n");
        } else {
            doc.push_str("ancestors:\n");
            for ancestor in &page.ancestors {
                let _ = writeln!(doc, "  - {}", yaml_string(ancestor));
            }
        }
        if let Some(version) = page.version {
            let _ = writeln!(doc, "version: {version}");
        }
        if let Some(modified) = page.last_modified {
            let _ = writeln!(
                doc,
                "last_modified: {}",
                modified.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            );
        }
        doc.push_str("---\n\n");
    }

    let _ = writeln!(doc, "# {}", page.title.trim());
    let body = body.trim();
    if !body.is_empty() {
        doc.push('\n');
        doc.push_str(body);
        doc.push('\n');
    }
    doc
}

/// Double-quoted YAML scalar; JSON string escaping is valid YAML.
fn yaml_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value.escape_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn page() -> Page {
        Page {
            id: "42".into(),
            title: "Getting \"Started\"".into(),
            space_key: Some("DEMO".into()),
            body: None,
            parent_id: Some("7".into()),
            ancestors: vec!["Home".into()],
            version: Some(3),
            last_modified: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single(),
            attachments: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn front_matter_quotes_strings() {
        let doc = build_markdown_document(&page(), "Body text", true);
        assert_eq!(
            doc,
            "---\nid: \"42\"\ntitle: \"Getting \\\"Started\\\"\"\nspace: \"DEMO\"\nparent_id: \"7\"\nancestors:\n  - \"Home\"\nversion: 3\nlast_modified: 2024-05-01T12:00:00Z\n---\n\n# Getting \"Started\"\n\nBody text\n"
        );
    }

    #[test]
    fn without_front_matter_starts_with_title() {
        let doc = build_markdown_document(&page(), "", false);
        assert_eq!(doc, "# Getting \"Started\"\n");
    }
}
