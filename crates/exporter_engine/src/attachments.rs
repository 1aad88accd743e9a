//! Attachment planning and run-wide attachment naming.

use std::collections::{HashMap, HashSet};

use crate::filename::{sanitize_attachment_name, split_extension};
use crate::references::AttachmentRef;
use crate::types::{Attachment, Page};

/// Attachment directory, relative to the space directory.
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Local names of attachments across a whole run.
///
/// The first claim of a name wins. A different attachment with the same name
/// (compared case-insensitively) gets `<stem>_<page id>.<ext>`, then
/// `<stem>_<page id>_<n>.<ext>`.
#[derive(Debug, Default)]
pub struct AttachmentNames {
    by_id: HashMap<String, String>,
    taken: HashSet<String>,
    downloaded: HashSet<String>,
}

impl AttachmentNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local file name for `attachment`; stable for its id within the run.
    pub fn claim(&mut self, attachment: &Attachment) -> String {
        if let Some(name) = self.by_id.get(&attachment.id) {
            return name.clone();
        }
        let base = sanitize_attachment_name(&attachment.filename);
        let mut candidate = base.clone();
        if self.taken.contains(&candidate.to_lowercase()) {
            let (stem, ext) = split_extension(&base);
            let page = &attachment.page_id;
            let with_ext = |suffix: String| {
                if ext.is_empty() {
                    format!("{stem}_{suffix}")
                } else {
                    format!("{stem}_{suffix}.{ext}")
                }
            };
            candidate = with_ext(page.clone());
            let mut n = 2;
            while self.taken.contains(&candidate.to_lowercase()) {
                candidate = with_ext(format!("{page}_{n}"));
                n += 1;
            }
        }
        self.taken.insert(candidate.to_lowercase());
        self.by_id.insert(attachment.id.clone(), candidate.clone());
        candidate
    }

    pub fn is_downloaded(&self, attachment_id: &str) -> bool {
        self.downloaded.contains(attachment_id)
    }

    pub fn mark_downloaded(&mut self, attachment_id: &str) {
        self.downloaded.insert(attachment_id.to_string());
    }
}

/// Which attachments of one page to fetch, and which references match nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentPlan {
    /// In the page's attachment order.
    pub wanted: Vec<Attachment>,
    /// Referenced filenames with no matching attachment.
    pub missing: Vec<String>,
}

/// Matches references against the page's attachments by filename, then by id.
pub fn plan_attachments(page: &Page, refs: &[AttachmentRef], download_all: bool) -> AttachmentPlan {
    let mut referenced: HashSet<&str> = HashSet::new();
    let mut missing = Vec::new();

    for reference in refs {
        let matched = page
            .attachments
            .iter()
            .find(|a| a.filename == reference.filename)
            .or_else(|| page.attachments.iter().find(|a| a.id == reference.filename));
        match matched {
            Some(attachment) => {
                referenced.insert(attachment.id.as_str());
            }
            None => missing.push(reference.filename.clone()),
        }
    }

    let wanted = page
        .attachments
        .iter()
        .filter(|a| download_all || referenced.contains(a.id.as_str()))
        .cloned()
        .collect();
    AttachmentPlan { wanted, missing }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAttachment {
    pub attachment_id: String,
    /// Name as the page refers to it.
    pub filename: String,
    /// Relative to the page file, e.g. `attachments/logo.png`.
    pub relative_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttachment {
    pub filename: String,
    pub reason: String,
    /// The page body points at this attachment.
    pub referenced: bool,
}

/// Outcome of fetching one page's attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAttachments {
    pub local: Vec<LocalAttachment>,
    pub missing: Vec<String>,
    pub failed: Vec<FailedAttachment>,
}

impl ResolvedAttachments {
    pub fn path_for(&self, filename: &str) -> Option<&str> {
        self.local
            .iter()
            .find(|local| local.filename == filename)
            .or_else(|| {
                self.local
                    .iter()
                    .find(|local| local.attachment_id == filename)
            })
            .map(|local| local.relative_path.as_str())
    }
}

pub(crate) fn relative_path(local_name: &str) -> String {
    format!("{ATTACHMENTS_DIR}/{local_name}")
}
