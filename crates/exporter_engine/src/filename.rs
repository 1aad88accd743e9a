use std::collections::{HashMap, HashSet};

use crate::types::PageSummary;

const MAX_NAME_BYTES: usize = 120;

/// Filesystem-safe stem for a page title. The caller appends `.md`.
pub fn sanitize_title(input: &str) -> String {
    let mut cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]).to_string();
    if cleaned.is_empty() {
        cleaned = "untitled".to_string();
    }
    // Collapse multiple underscores
    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }
    let mut final_name = truncate_on_char_boundary(&compacted, MAX_NAME_BYTES)
        .trim_end_matches(&['_', ' ', '.'][..])
        .to_string();
    if final_name.is_empty() {
        final_name = "untitled".to_string();
    }
    if is_reserved_windows_name(&final_name) {
        final_name.push('_');
    }
    final_name
}

/// Sanitized attachment filename; the extension survives truncation.
pub fn sanitize_attachment_name(input: &str) -> String {
    let (stem, ext) = split_extension(input);
    let ext: String = ext
        .chars()
        .filter(|c| !is_forbidden(*c) && !c.is_whitespace())
        .collect();
    if ext.is_empty() {
        return sanitize_title(input);
    }
    let budget = MAX_NAME_BYTES.saturating_sub(ext.len() + 1).max(1);
    let stem = sanitize_title(stem);
    let stem = truncate_on_char_boundary(&stem, budget);
    format!("{stem}.{ext}")
}

pub(crate) fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], &name[idx + 1..]),
        _ => (name, ""),
    }
}

fn truncate_on_char_boundary(input: &str, max_bytes: usize) -> &str {
    if input.len() <= max_bytes {
        return input;
    }
    let mut end = max_bytes;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}' | '\u{7F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// Output file names for every page of a run, fixed before any page is written
/// so that links between pages can point at their final files.
#[derive(Debug, Clone, Default)]
pub struct PageNames {
    by_id: HashMap<String, String>,
    by_title: HashMap<String, String>,
}

impl PageNames {
    /// Names are claimed in listing order; later pages whose name is already
    /// taken (case-insensitively) get `<name>_<page id>.md`.
    pub fn allocate(pages: &[PageSummary]) -> Self {
        let mut taken: HashSet<String> = HashSet::new();
        let mut names = Self::default();

        for page in pages {
            if names.by_id.contains_key(&page.id) {
                continue;
            }
            let stem = sanitize_title(&page.title);
            let mut candidate = format!("{stem}.md");
            if taken.contains(&candidate.to_lowercase()) {
                candidate = format!("{stem}_{}.md", sanitize_title(&page.id));
                let mut n = 2;
                while taken.contains(&candidate.to_lowercase()) {
                    candidate = format!("{stem}_{}_{n}.md", sanitize_title(&page.id));
                    n += 1;
                }
            }
            taken.insert(candidate.to_lowercase());
            names
                .by_title
                .entry(page.title.clone())
                .or_insert_with(|| candidate.clone());
            names.by_id.insert(page.id.clone(), candidate);
        }
        names
    }

    pub fn file_for(&self, page_id: &str) -> Option<&str> {
        self.by_id.get(page_id).map(String::as_str)
    }

    /// File of the first listed page with exactly this title.
    pub fn file_for_title(&self, title: &str) -> Option<&str> {
        self.by_title.get(title).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
