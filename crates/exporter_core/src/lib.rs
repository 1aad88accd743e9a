//! Exporter core: pure per-page state machine and run summary.
mod effect;
mod msg;
mod stage;
mod state;
mod summary;
mod update;

pub use effect::Effect;
pub use msg::Msg;
pub use stage::{InvalidTransition, PageStage};
pub use state::{PageId, PageRecord, RunState};
pub use summary::{FailedPage, RunSummary, WarnedPage};
pub use update::update;
