use export_logging::{enter_page, export_debug, export_error, export_info, export_warn};
use exporter_core::{update, Effect, Msg, PageStage, RunState, RunSummary};
use thiserror::Error;

use crate::attachments::{
    plan_attachments, relative_path, AttachmentNames, FailedAttachment, LocalAttachment,
    ResolvedAttachments,
};
use crate::config::ExportConfig;
use crate::convert::Converter;
use crate::cursor::PageCursor;
use crate::fetch::ConfluenceApi;
use crate::filename::{sanitize_title, PageNames};
use crate::page::convert_page;
use crate::persist::{ensure_output_dir, AtomicFileWriter, PersistError};
use crate::references::scan_attachment_refs;
use crate::types::{FetchError, Page, PageSummary};

/// Receives every state-machine message of a run, in order.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, msg: &Msg);
}

pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn emit(&self, _msg: &Msg) {}
}

/// Failures that end a whole run. Per-page failures are reported in the
/// [`RunSummary`] instead.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{0}")]
    Authentication(FetchError),
    #[error("output location unusable: {0}")]
    Output(#[from] PersistError),
    #[error("listing pages of space {space} failed: {source}")]
    Listing {
        space: String,
        #[source]
        source: FetchError,
    },
    #[error("run aborted: {reason}")]
    Aborted { reason: String, summary: RunSummary },
}

/// Drives one export run: list, then fetch, convert and write each page in
/// listing order. When listing fails part way, the pages already listed are
/// still exported and the summary records the interruption.
pub struct ExportEngine<'a> {
    api: &'a dyn ConfluenceApi,
    converter: &'a dyn Converter,
    config: &'a ExportConfig,
    sink: &'a dyn ProgressSink,
}

impl<'a> ExportEngine<'a> {
    pub fn new(
        api: &'a dyn ConfluenceApi,
        converter: &'a dyn Converter,
        config: &'a ExportConfig,
    ) -> Self {
        Self {
            api,
            converter,
            config,
            sink: &NoopProgressSink,
        }
    }

    pub fn with_sink(mut self, sink: &'a dyn ProgressSink) -> Self {
        self.sink = sink;
        self
    }

    pub async fn run(&self) -> Result<RunSummary, ExportError> {
        let space = &self.config.space_key;
        let space_dir = self.config.space_dir();
        ensure_output_dir(&space_dir)?;
        let writer = AtomicFileWriter::new(space_dir);

        export_info!("listing pages of space {space}");
        let listing = PageCursor::new(self.api, space.as_str()).collect_all().await;
        let pages = listing.pages;
        let interrupted = match listing.interrupted {
            Some(source) if source.is_authentication() => {
                return Err(ExportError::Authentication(source))
            }
            Some(source) if pages.is_empty() => {
                return Err(ExportError::Listing {
                    space: space.clone(),
                    source,
                })
            }
            Some(source) => {
                export_error!(
                    "listing of space {space} stopped after {} pages: {source}",
                    pages.len()
                );
                Some(source.to_string())
            }
            None => None,
        };
        export_info!("{} pages to export", pages.len());

        let names = PageNames::allocate(&pages);
        let mut attachment_names = AttachmentNames::new();
        let mut state = RunState::new(self.config.max_consecutive_write_failures);
        state = self.apply(state, Msg::Listed { total: pages.len() });
        if let Some(reason) = interrupted {
            state = self.apply(state, Msg::ListingInterrupted { reason });
        }

        for summary in &pages {
            let _page = enter_page(&summary.id, &summary.title);
            state = self
                .export_page(state, summary, &names, &mut attachment_names, &writer)
                .await?;
            if state.is_aborted() {
                break;
            }
        }

        let summary = state.summary();
        if let Some(reason) = summary.aborted.clone() {
            return Err(ExportError::Aborted { reason, summary });
        }
        Ok(summary)
    }

    async fn export_page(
        &self,
        mut state: RunState,
        summary: &PageSummary,
        names: &PageNames,
        attachment_names: &mut AttachmentNames,
        writer: &AtomicFileWriter,
    ) -> Result<RunState, ExportError> {
        let page_id = summary.id.clone();
        state = self.apply(
            state,
            Msg::PageStarted {
                page_id: page_id.clone(),
                title: summary.title.clone(),
            },
        );
        state = self.stage(state, &page_id, PageStage::Fetching);

        let page = match self.api.get_page(&page_id).await {
            Ok(page) => page,
            Err(err) if err.is_authentication() => return Err(ExportError::Authentication(err)),
            Err(err) => {
                export_warn!("fetch failed: {err}");
                return Ok(self.fail(state, &page_id, PageStage::FetchFailed, err.to_string()));
            }
        };
        state = self.stage(state, &page_id, PageStage::Fetched);
        for warning in &page.warnings {
            state = self.warn(state, &page_id, warning);
        }

        let resolved = self
            .resolve_attachments(&page, attachment_names, writer)
            .await?;

        state = self.stage(state, &page_id, PageStage::Converting);
        let file_name = names
            .file_for(&page_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.md", sanitize_title(&page.title)));
        let document = match convert_page(
            &page,
            &file_name,
            &resolved,
            names,
            self.converter,
            &self.config.options,
        ) {
            Ok(document) => document,
            Err(err) => {
                export_warn!("conversion failed: {err}");
                return Ok(self.fail(state, &page_id, PageStage::ConvertFailed, err.to_string()));
            }
        };
        for warning in &document.warnings {
            state = self.warn(state, &page_id, warning);
        }
        state = self.stage(state, &page_id, PageStage::Converted);

        state = self.stage(state, &page_id, PageStage::Writing);
        match writer.write(&document.file_name, &document.markdown) {
            Ok(path) => {
                export_info!("wrote {}", path.display());
                Ok(self.apply(
                    state,
                    Msg::PageWritten {
                        page_id,
                        file: document.file_name,
                    },
                ))
            }
            Err(err) => {
                export_error!("write of {} failed: {err}", document.file_name);
                Ok(self.fail(state, &page_id, PageStage::WriteFailed, err.to_string()))
            }
        }
    }

    /// Downloads the attachments the page needs, once per run each. A failed
    /// download or write only leaves that attachment unresolved.
    async fn resolve_attachments(
        &self,
        page: &Page,
        names: &mut AttachmentNames,
        writer: &AtomicFileWriter,
    ) -> Result<ResolvedAttachments, ExportError> {
        let refs = page
            .body
            .as_ref()
            .map(|body| scan_attachment_refs(&body.value))
            .unwrap_or_default();
        let plan = plan_attachments(
            page,
            &refs,
            self.config.options.download_all_attachments,
        );
        let mut resolved = ResolvedAttachments {
            missing: plan.missing,
            ..ResolvedAttachments::default()
        };

        for attachment in &plan.wanted {
            let local_name = names.claim(attachment);
            let relative = relative_path(&local_name);
            let referenced = refs
                .iter()
                .any(|r| r.filename == attachment.filename || r.filename == attachment.id);

            if !names.is_downloaded(&attachment.id) {
                let failure = match self.api.download_attachment(attachment).await {
                    Ok(bytes) => writer
                        .write_bytes(&relative, &bytes)
                        .err()
                        .map(|err| err.to_string()),
                    Err(err) if err.is_authentication() => {
                        return Err(ExportError::Authentication(err))
                    }
                    Err(err) => Some(err.to_string()),
                };
                if let Some(reason) = failure {
                    export_warn!("attachment {} failed: {reason}", attachment.filename);
                    resolved.failed.push(FailedAttachment {
                        filename: attachment.filename.clone(),
                        reason,
                        referenced,
                    });
                    continue;
                }
                names.mark_downloaded(&attachment.id);
                export_debug!("saved attachment {relative}");
            }

            resolved.local.push(LocalAttachment {
                attachment_id: attachment.id.clone(),
                filename: attachment.filename.clone(),
                relative_path: relative,
            });
        }
        Ok(resolved)
    }

    fn stage(&self, state: RunState, page_id: &str, stage: PageStage) -> RunState {
        self.apply(
            state,
            Msg::StageChanged {
                page_id: page_id.to_string(),
                stage,
            },
        )
    }

    fn warn(&self, state: RunState, page_id: &str, message: &str) -> RunState {
        export_warn!("{message}");
        self.apply(
            state,
            Msg::Warning {
                page_id: page_id.to_string(),
                message: message.to_string(),
            },
        )
    }

    fn fail(&self, state: RunState, page_id: &str, stage: PageStage, reason: String) -> RunState {
        self.apply(
            state,
            Msg::PageFailed {
                page_id: page_id.to_string(),
                stage,
                reason,
            },
        )
    }

    fn apply(&self, state: RunState, msg: Msg) -> RunState {
        self.sink.emit(&msg);
        let (state, effects) = update(state, msg);
        for effect in effects {
            match effect {
                Effect::AbortRun { reason } => export_error!("aborting run: {reason}"),
                Effect::RejectedTransition { page_id, from, to } => {
                    export_warn!("page {page_id}: rejected transition {from} -> {to}")
                }
                Effect::UnknownPage { page_id } => {
                    export_warn!("message for unknown page {page_id}")
                }
            }
        }
        state
    }
}
