//! Turning one fetched page into its final Markdown document.

use thiserror::Error;

use crate::attachments::{LocalAttachment, ResolvedAttachments};
use crate::config::{AttachmentPolicy, ExportOptions};
use crate::convert::{Converter, LinkTargets};
use crate::filename::PageNames;
use crate::frontmatter::build_markdown_document;
use crate::markdown::escape_markdown;
use crate::types::Page;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("page has no body")]
    MissingBody,
    #[error("unsupported body representation {0:?}")]
    UnsupportedRepresentation(String),
    #[error("unresolved attachments: {}", .0.join(", "))]
    MissingAttachments(Vec<String>),
}

/// A page ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedDocument {
    pub page_id: String,
    pub file_name: String,
    pub markdown: String,
    pub attachments: Vec<LocalAttachment>,
    pub warnings: Vec<String>,
}

/// Link targets of one page: its downloaded attachments and the files of
/// every page in the exported space.
pub struct PageLinkTargets<'a> {
    attachments: &'a ResolvedAttachments,
    pages: &'a PageNames,
    space_key: Option<&'a str>,
}

impl<'a> PageLinkTargets<'a> {
    pub fn new(
        attachments: &'a ResolvedAttachments,
        pages: &'a PageNames,
        space_key: Option<&'a str>,
    ) -> Self {
        Self {
            attachments,
            pages,
            space_key,
        }
    }
}

impl LinkTargets for PageLinkTargets<'_> {
    fn attachment(&self, filename: &str) -> Option<String> {
        self.attachments.path_for(filename).map(local_target)
    }

    fn page(&self, space_key: Option<&str>, title: &str) -> Option<String> {
        if let (Some(linked), Some(own)) = (space_key, self.space_key) {
            if !linked.eq_ignore_ascii_case(own) {
                return None;
            }
        }
        self.pages.file_for_title(title).map(local_target)
    }
}

/// Converts `page` with its attachments already resolved. Performs no I/O.
pub fn convert_page(
    page: &Page,
    file_name: &str,
    resolved: &ResolvedAttachments,
    page_names: &PageNames,
    converter: &dyn Converter,
    options: &ExportOptions,
) -> Result<ConvertedDocument, ConversionError> {
    let body = page.body.as_ref().ok_or(ConversionError::MissingBody)?;
    if body.representation != "storage" {
        return Err(ConversionError::UnsupportedRepresentation(
            body.representation.clone(),
        ));
    }

    let unresolved: Vec<String> = resolved
        .missing
        .iter()
        .cloned()
        .chain(
            resolved
                .failed
                .iter()
                .filter(|failed| failed.referenced)
                .map(|failed| failed.filename.clone()),
        )
        .collect();
    if options.missing_attachments == AttachmentPolicy::Fail && !unresolved.is_empty() {
        return Err(ConversionError::MissingAttachments(unresolved));
    }

    let mut warnings: Vec<String> = resolved
        .missing
        .iter()
        .map(|name| format!("attachment {name:?} not found on page"))
        .collect();
    warnings.extend(
        resolved
            .failed
            .iter()
            .map(|failed| format!("attachment {:?} not downloaded: {}", failed.filename, failed.reason)),
    );

    let targets = PageLinkTargets::new(resolved, page_names, page.space_key.as_deref());
    let conversion = converter.to_markdown(&body.value, &targets);
    warnings.extend(conversion.warnings);

    let mut content = conversion.markdown;
    if options.attachment_index && !resolved.local.is_empty() {
        content.push_str("\n\n## Attachments\n\n");
        let entries: Vec<String> = resolved
            .local
            .iter()
            .map(|local| {
                format!(
                    "- [{}]({})",
                    escape_markdown(&local.filename),
                    link_destination(&local_target(&local.relative_path))
                )
            })
            .collect();
        content.push_str(&entries.join("\n"));
    }

    Ok(ConvertedDocument {
        page_id: page.id.clone(),
        file_name: file_name.to_string(),
        markdown: build_markdown_document(page, &content, options.front_matter),
        attachments: resolved.local.clone(),
        warnings,
    })
}

/// A local file name as a link target. `%` and `#` are kept in file names
/// but would read as an escape or a fragment in a link.
fn local_target(path: &str) -> String {
    path.replace('%', "%25").replace('#', "%23")
}

fn link_destination(path: &str) -> String {
    if path.contains(char::is_whitespace) {
        format!("<{path}>")
    } else {
        path.to_string()
    }
}
