use std::collections::HashMap;

use crate::summary::{FailedPage, RunSummary, WarnedPage};
use crate::PageStage;

pub type PageId = String;

pub const DEFAULT_MAX_CONSECUTIVE_WRITE_FAILURES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub page_id: PageId,
    pub title: String,
    pub stage: PageStage,
    pub file: Option<String>,
    pub warnings: Vec<String>,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub(crate) total: Option<usize>,
    pub(crate) pages: Vec<PageRecord>,
    pub(crate) index: HashMap<PageId, usize>,
    pub(crate) max_consecutive_write_failures: u32,
    pub(crate) consecutive_write_failures: u32,
    pub(crate) aborted: Option<String>,
    pub(crate) listing_error: Option<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONSECUTIVE_WRITE_FAILURES)
    }
}

impl RunState {
    /// `max_consecutive_write_failures` of 0 disables the abort rule.
    pub fn new(max_consecutive_write_failures: u32) -> Self {
        Self {
            total: None,
            pages: Vec::new(),
            index: HashMap::new(),
            max_consecutive_write_failures,
            consecutive_write_failures: 0,
            aborted: None,
            listing_error: None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn page(&self, page_id: &str) -> Option<&PageRecord> {
        self.index.get(page_id).map(|&idx| &self.pages[idx])
    }

    pub fn pages(&self) -> &[PageRecord] {
        &self.pages
    }

    pub fn summary(&self) -> RunSummary {
        let mut succeeded = 0;
        let mut failed = Vec::new();
        let mut warned = Vec::new();
        let mut unfinished = 0;

        for record in &self.pages {
            if record.stage == PageStage::Written {
                succeeded += 1;
            } else if record.stage.is_failure() {
                failed.push(FailedPage {
                    page_id: record.page_id.clone(),
                    title: record.title.clone(),
                    stage: record.stage,
                    reason: record.failure.clone().unwrap_or_default(),
                });
            } else {
                unfinished += 1;
            }
            if !record.warnings.is_empty() {
                warned.push(WarnedPage {
                    page_id: record.page_id.clone(),
                    title: record.title.clone(),
                    warnings: record.warnings.clone(),
                });
            }
        }

        let total = self.total.unwrap_or(self.pages.len()).max(self.pages.len());
        let not_started = total - self.pages.len();

        RunSummary {
            total,
            succeeded,
            failed,
            warned,
            skipped: unfinished + not_started,
            aborted: self.aborted.clone(),
            listing_error: self.listing_error.clone(),
        }
    }

    pub(crate) fn record_mut(&mut self, page_id: &str) -> Option<&mut PageRecord> {
        match self.index.get(page_id) {
            Some(&idx) => self.pages.get_mut(idx),
            None => None,
        }
    }

    pub(crate) fn start_page(&mut self, page_id: PageId, title: String) {
        if let Some(&idx) = self.index.get(&page_id) {
            // Restarting a page resets its record; ids are unique per run.
            self.pages[idx] = PageRecord::new(page_id, title);
            return;
        }
        self.index.insert(page_id.clone(), self.pages.len());
        self.pages.push(PageRecord::new(page_id, title));
    }
}

impl PageRecord {
    fn new(page_id: PageId, title: String) -> Self {
        Self {
            page_id,
            title,
            stage: PageStage::Pending,
            file: None,
            warnings: Vec::new(),
            failure: None,
        }
    }
}
