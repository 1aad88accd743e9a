use crate::{PageId, PageStage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Listing finished; `total` pages will be processed.
    Listed { total: usize },
    /// A page entered the pipeline.
    PageStarted { page_id: PageId, title: String },
    /// A page moved to a non-terminal stage, or to `Converted`.
    StageChanged { page_id: PageId, stage: PageStage },
    /// Non-fatal problem with a page (missing attachment, unresolved link).
    Warning { page_id: PageId, message: String },
    /// The page document was persisted as `file`.
    PageWritten { page_id: PageId, file: String },
    /// The page failed; `stage` is the terminal failure stage.
    PageFailed {
        page_id: PageId,
        stage: PageStage,
        reason: String,
    },
    /// Listing stopped early; only the pages listed so far are processed.
    ListingInterrupted { reason: String },
}
