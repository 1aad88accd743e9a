use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};

static CDATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("Invalid CDATA regex pattern")
});

/// `<ri:attachment ri:filename="a.png" />` style empty elements in the `ac:`/`ri:` namespaces.
static SELF_CLOSING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<((?:ac|ri):[A-Za-z0-9_-]+)((?:\s+[^<>/]+?(?:="[^"]*"|='[^']*')?)*)\s*/>"#)
        .expect("Invalid self-closing tag regex pattern")
});

/// Parses a storage-format body with an HTML parser.
///
/// The HTML parser would turn CDATA into comments and treat `<ri:... />` as
/// an open tag swallowing its siblings, so both are rewritten first.
pub(crate) fn parse_storage(body: &str) -> Html {
    let body = CDATA_RE.replace_all(body, |caps: &regex::Captures<'_>| escape_text(&caps[1]));
    let body = SELF_CLOSING_RE.replace_all(&body, "<$1$2></$1>");
    Html::parse_fragment(&body)
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub(crate) fn element_name<'a>(element: &'a ElementRef<'_>) -> &'a str {
    element.value().name()
}

/// A `ri:attachment` reference from an image, a link or a macro parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub filename: String,
}

/// Attachment references in document order, first occurrence of each filename.
pub fn scan_attachment_refs(body: &str) -> Vec<AttachmentRef> {
    let document = parse_storage(body);
    let mut seen = HashSet::new();
    let mut refs = Vec::new();

    for node in document.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        if element_name(&element) != "ri:attachment" {
            continue;
        }
        let Some(filename) = element
            .value()
            .attr("ri:filename")
            .map(str::trim)
            .filter(|name| !name.is_empty())
        else {
            continue;
        };
        if seen.insert(filename.to_string()) {
            refs.push(AttachmentRef {
                filename: filename.to_string(),
            });
        }
    }
    refs
}
