use crate::{PageId, PageStage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Too many consecutive write failures; the output location is unusable.
    AbortRun { reason: String },
    /// A stage change that the per-page state machine does not allow.
    /// The record keeps its previous stage.
    RejectedTransition {
        page_id: PageId,
        from: PageStage,
        to: PageStage,
    },
    /// A message referred to a page that was never started.
    UnknownPage { page_id: PageId },
}
