use std::fmt::Write;

use crate::{PageId, PageStage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPage {
    pub page_id: PageId,
    pub title: String,
    pub stage: PageStage,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarnedPage {
    pub page_id: PageId,
    pub title: String,
    pub warnings: Vec<String>,
}

/// End-of-run view over the page records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedPage>,
    pub warned: Vec<WarnedPage>,
    /// Pages that never reached a terminal stage (run aborted first).
    pub skipped: usize,
    pub aborted: Option<String>,
    /// Why the page listing ended early, if it did.
    pub listing_error: Option<String>,
}

impl RunSummary {
    /// True only when the whole space was listed and every page was
    /// fetched, converted and written.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
            && self.skipped == 0
            && self.aborted.is_none()
            && self.listing_error.is_none()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} pages: {} succeeded, {} failed, {} with warnings",
            self.total,
            self.succeeded,
            self.failed.len(),
            self.warned.len()
        );
        if self.skipped > 0 {
            let _ = writeln!(out, "{} pages not processed", self.skipped);
        }
        if let Some(reason) = &self.listing_error {
            let _ = writeln!(out, "page listing incomplete: {reason}");
        }
        if let Some(reason) = &self.aborted {
            let _ = writeln!(out, "run aborted: {reason}");
        }
        if !self.failed.is_empty() {
            out.push_str("failed pages:\n");
            for page in &self.failed {
                let _ = writeln!(
                    out,
                    "  {} {:?} ({}): {}",
                    page.page_id, page.title, page.stage, page.reason
                );
            }
        }
        if !self.warned.is_empty() {
            out.push_str("warnings:\n");
            for page in &self.warned {
                for warning in &page.warnings {
                    let _ = writeln!(out, "  {} {:?}: {}", page.page_id, page.title, warning);
                }
            }
        }
        out
    }
}
