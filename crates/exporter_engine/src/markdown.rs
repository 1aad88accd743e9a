//! Markdown rendering of parsed storage-format documents.
//!
//! Block elements render to self-contained strings that the enclosing flow
//! joins with blank lines; inline elements render to fragments that are
//! concatenated and whitespace-normalized when their paragraph is flushed.

use std::collections::HashMap;

use scraper::node::Node;
use scraper::ElementRef;

use crate::convert::LinkTargets;
use crate::references::element_name;

const HARD_BREAK: &str = "\\\n";

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "aside", "nav", "figure",
    "figcaption", "address", "center", "details", "summary", "dl", "dt", "dd", "h1", "h2", "h3",
    "h4", "h5", "h6", "ul", "ol", "table", "pre", "blockquote", "hr", "ac:layout",
    "ac:layout-section", "ac:layout-cell", "ac:rich-text-body", "ac:task-list",
];

/// Macros that sit inside running text.
const INLINE_MACROS: &[&str] = &["status", "jira", "anchor"];

/// Generated navigation with no content of its own.
const NAVIGATION_MACROS: &[&str] = &[
    "toc",
    "children",
    "pagetree",
    "recently-updated",
    "contentbylabel",
    "livesearch",
];

pub(crate) struct Renderer<'t> {
    targets: &'t dyn LinkTargets,
    warnings: Vec<String>,
}

impl<'t> Renderer<'t> {
    pub(crate) fn new(targets: &'t dyn LinkTargets) -> Self {
        Self {
            targets,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn into_warnings(self) -> Vec<String> {
        self.warnings
    }

    pub(crate) fn render_document(&mut self, root: ElementRef) -> String {
        self.render_flow(root, "\n\n").trim().to_string()
    }

    /// Children of `parent` as a sequence of blocks; loose inline content
    /// between blocks becomes a paragraph.
    fn render_flow(&mut self, parent: ElementRef, separator: &str) -> String {
        let mut blocks: Vec<String> = Vec::new();
        let mut inline = String::new();

        for child in parent.children() {
            match child.value() {
                Node::Text(text) => inline.push_str(&plain_text(text)),
                Node::Element(_) => {
                    let Some(element) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if is_block(&element) {
                        flush_paragraph(&mut inline, &mut blocks);
                        let block = self.render_block(element);
                        let block = block.trim_matches('\n');
                        if !block.trim().is_empty() {
                            blocks.push(block.to_string());
                        }
                    } else {
                        let fragment = self.render_inline(element);
                        inline.push_str(&fragment);
                    }
                }
                _ => {}
            }
        }
        flush_paragraph(&mut inline, &mut blocks);
        blocks.join(separator)
    }

    fn render_block(&mut self, element: ElementRef) -> String {
        let name = element_name(&element);
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                let text = single_line(&finish_inline(&self.render_inline_children(element)));
                if text.is_empty() {
                    String::new()
                } else {
                    format!("{} {text}", "#".repeat(level))
                }
            }
            "ul" => self.list(element, false),
            "ol" => self.list(element, true),
            "table" => self.table(element),
            "pre" => preformatted(element),
            "blockquote" => quote(&self.render_flow(element, "\n\n")),
            "hr" => "---".to_string(),
            "ac:structured-macro" | "ac:macro" => self.block_macro(element),
            "ac:task-list" => self.task_list(element),
            _ => self.render_flow(element, "\n\n"),
        }
    }

    fn render_inline_children(&mut self, element: ElementRef) -> String {
        let mut out = String::new();
        for child in element.children() {
            match child.value() {
                Node::Text(text) => out.push_str(&plain_text(text)),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        let fragment = self.render_inline(child);
                        out.push_str(&fragment);
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn render_inline(&mut self, element: ElementRef) -> String {
        match element_name(&element) {
            "strong" | "b" => emphasize("**", &self.render_inline_children(element)),
            "em" | "i" | "cite" | "var" | "dfn" => {
                emphasize("*", &self.render_inline_children(element))
            }
            "s" | "del" | "strike" => emphasize("~~", &self.render_inline_children(element)),
            "code" | "tt" | "kbd" | "samp" => code_span(&element.text().collect::<String>()),
            "br" => HARD_BREAK.to_string(),
            "a" => self.anchor(element),
            "img" => {
                let alt = element.value().attr("alt").unwrap_or("").trim();
                match element.value().attr("src").map(str::trim) {
                    Some(src) if !src.is_empty() => image(alt, src),
                    _ => escape_markdown(alt),
                }
            }
            "ac:image" => self.ac_image(element),
            "ac:link" => self.ac_link(element),
            "ac:emoticon" => element
                .value()
                .attr("ac:name")
                .map(|name| format!(":{name}:"))
                .unwrap_or_default(),
            "ac:structured-macro" | "ac:macro" => {
                if is_inline_macro(&element) {
                    inline_macro(element)
                } else {
                    format!(" {} ", single_line(&self.block_macro(element)))
                }
            }
            "time" => match element.value().attr("datetime") {
                Some(datetime) => datetime.to_string(),
                None => self.render_inline_children(element),
            },
            "ac:placeholder" | "ac:parameter" | "script" | "style" | "noscript" | "template" => {
                String::new()
            }
            name if name.starts_with("ri:") => String::new(),
            _ if is_block(&element) => format!(" {} ", self.render_inline_children(element)),
            _ => self.render_inline_children(element),
        }
    }

    fn list(&mut self, element: ElementRef, ordered: bool) -> String {
        let mut number = element
            .value()
            .attr("start")
            .and_then(|start| start.trim().parse::<u64>().ok())
            .unwrap_or(1);
        let mut items: Vec<(String, String)> = Vec::new();

        for child in element.children() {
            match child.value() {
                Node::Element(_) => {
                    let Some(item) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let name = element_name(&item);
                    if matches!(name, "ul" | "ol") && !items.is_empty() {
                        // A list nested directly in a list belongs to the previous item.
                        let nested = self.render_block(item);
                        if let Some((_, content)) = items.last_mut() {
                            content.push('\n');
                            content.push_str(&nested);
                        }
                        continue;
                    }
                    let content = if name == "li" {
                        self.render_flow(item, "\n")
                    } else if is_block(&item) {
                        self.render_block(item)
                    } else {
                        finish_inline(&self.render_inline(item))
                    };
                    items.push((list_marker(ordered, number), content));
                    number += 1;
                }
                Node::Text(text) if !text.trim().is_empty() => {
                    let content = escape_line_start(&finish_inline(&plain_text(text)));
                    items.push((list_marker(ordered, number), content));
                    number += 1;
                }
                _ => {}
            }
        }

        items
            .iter()
            .map(|(marker, content)| format_item(marker, content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn task_list(&mut self, element: ElementRef) -> String {
        let mut items = Vec::new();
        for task in child_elements(element, "ac:task") {
            let done = child_elements(task, "ac:task-status")
                .next()
                .map(|status| status.text().collect::<String>().trim() == "complete")
                .unwrap_or(false);
            let body = match child_elements(task, "ac:task-body").next() {
                Some(body) => self.render_flow(body, "\n"),
                None => String::new(),
            };
            let marker = if done { "- [x] " } else { "- [ ] " };
            items.push(format_item(marker, &body));
        }
        items.join("\n")
    }

    fn table(&mut self, element: ElementRef) -> String {
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut caption = None;
        self.collect_rows(element, &mut rows, &mut caption);
        if rows.is_empty() {
            return self.render_flow(element, "\n\n");
        }

        let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
        for row in &mut rows {
            row.resize(width, String::new());
        }

        let mut lines = Vec::with_capacity(rows.len() + 1);
        lines.push(table_row(&rows[0]));
        lines.push(format!("|{}|", vec![" --- "; width].join("|")));
        for row in &rows[1..] {
            lines.push(table_row(row));
        }
        let table = lines.join("\n");
        match caption {
            Some(caption) if !caption.is_empty() => format!("{caption}\n\n{table}"),
            _ => table,
        }
    }

    fn collect_rows(
        &mut self,
        element: ElementRef,
        rows: &mut Vec<Vec<String>>,
        caption: &mut Option<String>,
    ) {
        for child in element.children().filter_map(ElementRef::wrap) {
            match element_name(&child) {
                "thead" | "tbody" | "tfoot" => self.collect_rows(child, rows, caption),
                "tr" => {
                    let cells = self.table_cells(child);
                    rows.push(cells);
                }
                "caption" => {
                    *caption = Some(finish_inline(&self.render_inline_children(child)));
                }
                _ => {}
            }
        }
    }

    fn table_cells(&mut self, row: ElementRef) -> Vec<String> {
        let mut cells = Vec::new();
        for cell in row.children().filter_map(ElementRef::wrap) {
            if !matches!(element_name(&cell), "td" | "th") {
                continue;
            }
            let content = self.render_flow(cell, "\n");
            cells.push(cell_text(&content));
            let span = cell
                .value()
                .attr("colspan")
                .and_then(|span| span.trim().parse::<usize>().ok())
                .unwrap_or(1)
                .clamp(1, 64);
            for _ in 1..span {
                cells.push(String::new());
            }
        }
        cells
    }

    fn block_macro(&mut self, element: ElementRef) -> String {
        let name = macro_name(&element);
        let params = macro_params(element);
        let rich_body = child_elements(element, "ac:rich-text-body").next();
        let plain_body = child_elements(element, "ac:plain-text-body")
            .next()
            .map(|body| body.text().collect::<String>());

        match name.as_str() {
            "code" | "noformat" | "code-block" => {
                let code = plain_body
                    .or_else(|| rich_body.map(|body| body.text().collect()))
                    .unwrap_or_default();
                let language = params
                    .get("language")
                    .map(|lang| lang.trim())
                    .filter(|lang| !lang.is_empty());
                code_block(&code, language)
            }
            "info" | "note" | "tip" | "warning" | "panel" => {
                let body = self.macro_body(rich_body, plain_body);
                let label = params
                    .get("title")
                    .map(|title| title.trim().to_string())
                    .filter(|title| !title.is_empty())
                    .or_else(|| (name != "panel").then(|| capitalize(&name)));
                let content = match label {
                    Some(label) if body.is_empty() => format!("**{label}**"),
                    Some(label) => format!("**{label}**\n\n{body}"),
                    None => body,
                };
                quote(&content)
            }
            "expand" => {
                let body = self.macro_body(rich_body, plain_body);
                match params.get("title").map(|t| t.trim()).filter(|t| !t.is_empty()) {
                    Some(title) if body.is_empty() => format!("**{title}**"),
                    Some(title) => format!("**{title}**\n\n{body}"),
                    None => body,
                }
            }
            "markdown" => plain_body.unwrap_or_default(),
            _ if NAVIGATION_MACROS.contains(&name.as_str()) => String::new(),
            _ if INLINE_MACROS.contains(&name.as_str()) => inline_macro(element),
            _ => match (rich_body, plain_body) {
                (Some(body), _) => self.render_flow(body, "\n\n"),
                (None, Some(text)) if !text.trim().is_empty() => code_block(&text, None),
                _ => String::new(),
            },
        }
    }

    fn macro_body(&mut self, rich_body: Option<ElementRef>, plain_body: Option<String>) -> String {
        match (rich_body, plain_body) {
            (Some(body), _) => self.render_flow(body, "\n\n"),
            (None, Some(text)) => escape_line_start(&finish_inline(&plain_text(&text))),
            (None, None) => String::new(),
        }
    }

    fn anchor(&mut self, element: ElementRef) -> String {
        let text = finish_inline(&self.render_inline_children(element));
        let href = element
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|href| !href.is_empty());
        match href {
            None => text,
            Some(href) if text.is_empty() => format!("<{href}>"),
            Some(href) => format!("[{text}]({})", destination(href)),
        }
    }

    fn ac_image(&mut self, element: ElementRef) -> String {
        let alt = element
            .value()
            .attr("ac:alt")
            .or_else(|| element.value().attr("ac:title"))
            .map(str::trim)
            .filter(|alt| !alt.is_empty());

        for resource in element.descendants().filter_map(ElementRef::wrap) {
            match element_name(&resource) {
                "ri:attachment" => {
                    let Some(filename) = resource
                        .value()
                        .attr("ri:filename")
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                    else {
                        continue;
                    };
                    let target = self
                        .targets
                        .attachment(filename)
                        .unwrap_or_else(|| filename.to_string());
                    return image(alt.unwrap_or(filename), &target);
                }
                "ri:url" => {
                    if let Some(url) = resource.value().attr("ri:value") {
                        return image(alt.unwrap_or(""), url);
                    }
                }
                _ => {}
            }
        }
        escape_markdown(alt.unwrap_or_default())
    }

    fn ac_link(&mut self, element: ElementRef) -> String {
        let anchor = element
            .value()
            .attr("ac:anchor")
            .map(str::trim)
            .filter(|anchor| !anchor.is_empty());

        let mut body_text = String::new();
        let mut resource = None;
        for child in element.children().filter_map(ElementRef::wrap) {
            match element_name(&child) {
                "ac:plain-text-link-body" => {
                    body_text = finish_inline(&plain_text(&child.text().collect::<String>()));
                }
                "ac:link-body" => {
                    body_text = finish_inline(&self.render_inline_children(child));
                }
                name if name.starts_with("ri:") && resource.is_none() => resource = Some(child),
                _ => {}
            }
        }

        let (target, fallback_text) = match resource {
            Some(resource) => {
                let attr = |name: &str| resource.value().attr(name).map(str::trim);
                match element_name(&resource) {
                    "ri:attachment" => {
                        let filename = attr("ri:filename").unwrap_or_default();
                        let target = self
                            .targets
                            .attachment(filename)
                            .unwrap_or_else(|| filename.to_string());
                        (Some(target), filename.to_string())
                    }
                    "ri:page" | "ri:blog-post" => {
                        let title = attr("ri:content-title").unwrap_or_default();
                        let space = attr("ri:space-key").filter(|key| !key.is_empty());
                        let target = self.targets.page(space, title);
                        if target.is_none() && !title.is_empty() {
                            self.warnings
                                .push(format!("link to page {title:?} not resolved"));
                        }
                        (target, title.to_string())
                    }
                    "ri:user" => {
                        if !body_text.is_empty() {
                            return body_text;
                        }
                        let user = attr("ri:account-id")
                            .or_else(|| attr("ri:userkey"))
                            .or_else(|| attr("ri:username"))
                            .unwrap_or("unknown");
                        return format!("@{}", escape_markdown(user));
                    }
                    "ri:url" => {
                        let url = attr("ri:value").unwrap_or_default();
                        (Some(url.to_string()), url.to_string())
                    }
                    "ri:space" => (None, attr("ri:space-key").unwrap_or_default().to_string()),
                    _ => (None, String::new()),
                }
            }
            None => (None, String::new()),
        };

        let text = if body_text.is_empty() {
            escape_markdown(&fallback_text)
        } else {
            body_text
        };
        let target = match (target, anchor, resource.is_none()) {
            (Some(target), Some(anchor), _) => Some(format!("{target}#{anchor}")),
            (None, Some(anchor), true) => Some(format!("#{anchor}")),
            (target, _, _) => target.filter(|target| !target.is_empty()),
        };
        match target {
            Some(target) if text.is_empty() => format!("<{target}>"),
            Some(target) => format!("[{text}]({})", destination(&target)),
            None => text,
        }
    }
}

fn is_block(element: &ElementRef) -> bool {
    let name = element_name(element);
    if matches!(name, "ac:structured-macro" | "ac:macro") {
        return !is_inline_macro(element);
    }
    BLOCK_ELEMENTS.contains(&name)
}

fn is_inline_macro(element: &ElementRef) -> bool {
    INLINE_MACROS.contains(&macro_name(element).as_str())
}

fn macro_name(element: &ElementRef) -> String {
    element
        .value()
        .attr("ac:name")
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn macro_params(element: ElementRef) -> HashMap<String, String> {
    child_elements(element, "ac:parameter")
        .map(|param| {
            let key = param
                .value()
                .attr("ac:name")
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase();
            (key, param.text().collect::<String>())
        })
        .collect()
}

fn inline_macro(element: ElementRef) -> String {
    let params = macro_params(element);
    let param = |key: &str| {
        params
            .get(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    match macro_name(&element).as_str() {
        "status" => param("title")
            .map(|title| format!("[{title}]"))
            .unwrap_or_default(),
        "jira" => param("key").unwrap_or_default(),
        _ => String::new(),
    }
}

fn child_elements<'a>(
    element: ElementRef<'a>,
    name: &'static str,
) -> impl Iterator<Item = ElementRef<'a>> {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |child| element_name(child) == name)
}

fn preformatted(element: ElementRef) -> String {
    let code: String = element.text().collect();
    let language = language_class(&element).or_else(|| {
        child_elements(element, "code")
            .next()
            .and_then(|code| language_class(&code))
    });
    code_block(&code, language.as_deref())
}

fn language_class(element: &ElementRef) -> Option<String> {
    element
        .value()
        .attr("class")?
        .split_whitespace()
        .find_map(|class| {
            class
                .strip_prefix("language-")
                .or_else(|| class.strip_prefix("lang-"))
        })
        .map(str::to_string)
}

/// Fenced block with the code text unchanged; the fence outgrows any backtick run inside.
pub(crate) fn code_block(code: &str, language: Option<&str>) -> String {
    let body = code.strip_suffix('\n').unwrap_or(code);
    let fence = "`".repeat(longest_run(body, '`').max(2) + 1);
    format!("{fence}{}\n{body}\n{fence}", language.unwrap_or(""))
}

fn code_span(text: &str) -> String {
    let text = collapse_whitespace(text);
    if text.trim().is_empty() {
        return text;
    }
    let ticks = "`".repeat(longest_run(&text, '`') + 1);
    let pad = if text.starts_with('`') || text.ends_with('`') {
        " "
    } else {
        ""
    };
    format!("{ticks}{pad}{text}{pad}{ticks}")
}

fn longest_run(text: &str, needle: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for ch in text.chars() {
        if ch == needle {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn emphasize(marker: &str, inner: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return inner.to_string();
    }
    let lead = if inner.starts_with(char::is_whitespace) { " " } else { "" };
    let trail = if inner.ends_with(char::is_whitespace) { " " } else { "" };
    format!("{lead}{marker}{trimmed}{marker}{trail}")
}

fn image(alt: &str, target: &str) -> String {
    format!("![{}]({})", escape_markdown(alt), destination(target))
}

/// Link destination, wrapped in `<...>` when a bare one would break the link.
fn destination(target: &str) -> String {
    let needs_brackets = target
        .chars()
        .any(|ch| ch.is_whitespace() || matches!(ch, '(' | ')' | '<' | '>'));
    if needs_brackets {
        format!("<{}>", target.replace('<', "%3C").replace('>', "%3E"))
    } else {
        target.to_string()
    }
}

fn quote(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn list_marker(ordered: bool, number: u64) -> String {
    if ordered {
        format!("{number}. ")
    } else {
        "- ".to_string()
    }
}

fn format_item(marker: &str, content: &str) -> String {
    if content.trim().is_empty() {
        return marker.trim_end().to_string();
    }
    let pad = " ".repeat(marker.len());
    let mut out = String::new();
    for (idx, line) in content.lines().enumerate() {
        if idx == 0 {
            out.push_str(marker);
            out.push_str(line);
        } else {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(&pad);
                out.push_str(line);
            }
        }
    }
    out
}

fn table_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

fn cell_text(content: &str) -> String {
    content
        .lines()
        .map(|line| line.trim().trim_end_matches('\\').trim_end())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("<br>")
        .replace('|', "\\|")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

fn flush_paragraph(inline: &mut String, blocks: &mut Vec<String>) {
    let paragraph = finish_inline(inline)
        .split('\n')
        .map(escape_line_start)
        .collect::<Vec<_>>()
        .join("\n");
    if !paragraph.is_empty() {
        blocks.push(paragraph);
    }
    inline.clear();
}

/// Normalizes spaces around hard breaks and drops a trailing break.
fn finish_inline(raw: &str) -> String {
    let mut collapsed = String::with_capacity(raw.len());
    let mut prev_space = false;
    for ch in raw.chars() {
        if ch == ' ' {
            if prev_space {
                continue;
            }
            prev_space = true;
        } else {
            prev_space = false;
        }
        collapsed.push(ch);
    }
    let joined = collapsed
        .split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    let trimmed = joined.trim();
    trimmed
        .strip_suffix('\\')
        .map(str::trim_end)
        .unwrap_or(trimmed)
        .to_string()
}

fn plain_text(text: &str) -> String {
    escape_markdown(&collapse_whitespace(text))
}

/// Backslash-escapes characters that would otherwise read as inline Markdown
/// or raw HTML. Code and code spans never go through here.
pub(crate) fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (idx, ch) in text.char_indices() {
        match ch {
            '\\' | '`' | '*' | '_' | '[' | ']' | '<' | '>' => {
                out.push('\\');
                out.push(ch);
            }
            '&' if starts_entity(&text[idx + 1..]) => out.push_str("\\&"),
            _ => out.push(ch),
        }
    }
    out
}

/// `amp;`, `#39;` and the like.
fn starts_entity(rest: &str) -> bool {
    let name = rest.strip_prefix('#').unwrap_or(rest);
    let len = name.chars().take_while(char::is_ascii_alphanumeric).count();
    len > 0 && name[len..].starts_with(';')
}

/// Escapes a leading marker that would make the line a heading, quote, list
/// item or rule.
fn escape_line_start(line: &str) -> String {
    if line.starts_with(&['#', '>', '-', '+', '='][..]) {
        return format!("\\{line}");
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if (1..=9).contains(&digits) {
        let rest = &line[digits..];
        if let Some(after) = rest.strip_prefix(&['.', ')'][..]) {
            if after.is_empty() || after.starts_with(' ') {
                return format!("{}\\{rest}", &line[..digits]);
            }
        }
    }
    line.to_string()
}

fn single_line(text: &str) -> String {
    text.replace(HARD_BREAK, " ")
        .replace('\n', " ")
        .trim()
        .to_string()
}
