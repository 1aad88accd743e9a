//! Exporter engine: Confluence API client, storage-format conversion and the export pipeline.
mod attachments;
mod check;
mod config;
mod convert;
mod cursor;
mod engine;
mod fetch;
mod filename;
mod frontmatter;
mod markdown;
mod page;
mod persist;
mod references;
mod retry;
mod types;
mod wire;

pub use attachments::{
    plan_attachments, AttachmentNames, AttachmentPlan, FailedAttachment, LocalAttachment,
    ResolvedAttachments, ATTACHMENTS_DIR,
};
pub use check::{check_connection, ConnectionReport};
pub use config::{
    AttachmentPolicy, ConfigError, ExportConfig, ExportOptions, FetchSettings, Secret, SiteConfig,
    DEFAULT_OUTPUT_ROOT,
};
pub use convert::{Conversion, Converter, LinkTargets, NoLinkTargets, StorageConverter};
pub use cursor::{Listing, PageCursor};
pub use engine::{ExportEngine, ExportError, NoopProgressSink, ProgressSink};
pub use fetch::{ConfluenceApi, ReqwestConfluenceClient};
pub use filename::{sanitize_attachment_name, sanitize_title, PageNames};
pub use frontmatter::build_markdown_document;
pub use page::{convert_page, ConversionError, ConvertedDocument, PageLinkTargets};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use references::{scan_attachment_refs, AttachmentRef};
pub use retry::RetryPolicy;
pub use types::{
    Attachment, CurrentUser, FailureKind, FetchError, Page, PageBatch, PageBody, PageSummary,
    Space,
};
