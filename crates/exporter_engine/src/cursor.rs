use std::collections::HashSet;

use export_logging::export_debug;

use crate::fetch::ConfluenceApi;
use crate::types::{FetchError, PageSummary};

/// Lazy walk over every page in a space, one listing batch at a time.
///
/// A new cursor starts from the first batch, so each run sees a fresh listing.
pub struct PageCursor<'a> {
    api: &'a dyn ConfluenceApi,
    space_key: String,
    next: Option<String>,
    started: bool,
    exhausted: bool,
}

impl<'a> PageCursor<'a> {
    pub fn new(api: &'a dyn ConfluenceApi, space_key: impl Into<String>) -> Self {
        Self {
            api,
            space_key: space_key.into(),
            next: None,
            started: false,
            exhausted: false,
        }
    }

    /// Next non-empty batch, or `None` once the listing is exhausted.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<PageSummary>>, FetchError> {
        if self.exhausted {
            return Ok(None);
        }
        let cursor = if self.started {
            match self.next.take() {
                Some(cursor) => Some(cursor),
                None => {
                    self.exhausted = true;
                    return Ok(None);
                }
            }
        } else {
            None
        };

        // Transient failures were already retried by the client.
        let batch = match self.api.list_pages(&self.space_key, cursor.as_deref()).await {
            Ok(batch) => batch,
            Err(err) => {
                self.exhausted = true;
                return Err(err);
            }
        };
        self.started = true;
        export_debug!(
            "listed {} pages in {} (more: {})",
            batch.pages.len(),
            self.space_key,
            batch.next.is_some()
        );

        // A server that hands back the same cursor would loop forever.
        if batch.pages.is_empty() || (cursor.is_some() && batch.next == cursor) {
            self.exhausted = true;
        } else {
            self.next = batch.next;
        }
        if batch.pages.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch.pages))
        }
    }

    /// Drains the cursor. Pages listed twice keep their first position.
    ///
    /// A failing batch ends the walk; the pages listed before it are kept
    /// alongside the error.
    pub async fn collect_all(mut self) -> Listing {
        let mut seen = HashSet::new();
        let mut listing = Listing::default();
        loop {
            match self.next_batch().await {
                Ok(Some(batch)) => {
                    for page in batch {
                        if seen.insert(page.id.clone()) {
                            listing.pages.push(page);
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    listing.interrupted = Some(err);
                    break;
                }
            }
        }
        listing
    }
}

/// Result of walking a cursor to its end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub pages: Vec<PageSummary>,
    /// Set when a batch failed before the listing was exhausted.
    pub interrupted: Option<FetchError>,
}
