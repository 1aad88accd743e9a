use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub id: String,
    pub title: String,
}

/// One page of listing results plus the opaque cursor for the next one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageBatch {
    pub pages: Vec<PageSummary>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBody {
    pub value: String,
    pub representation: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub space_key: Option<String>,
    pub body: Option<PageBody>,
    /// Nearest ancestor.
    pub parent_id: Option<String>,
    /// Ancestor titles, root first.
    pub ancestors: Vec<String>,
    pub version: Option<u32>,
    pub last_modified: Option<DateTime<Utc>>,
    pub attachments: Vec<Attachment>,
    /// Problems met while fetching that did not stop the page, such as an
    /// attachment list that could only be read in part.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub media_type: Option<String>,
    pub size: Option<u64>,
    /// Relative to the wiki root, or absolute.
    pub download: String,
    pub page_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Space {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub account_id: Option<String>,
    pub display_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
    /// Server-requested delay before the next attempt.
    pub retry_after: Option<Duration>,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub(crate) fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub(crate) fn malformed(what: &str, detail: impl fmt::Display) -> Self {
        Self::new(FailureKind::MalformedResponse, format!("{what}: {detail}"))
    }

    /// Worth retrying: timeouts, connection failures, 408, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            FailureKind::Timeout | FailureKind::Network => true,
            FailureKind::HttpStatus(code) => matches!(code, 408 | 429 | 500..=599),
            _ => false,
        }
    }

    pub fn is_authentication(&self) -> bool {
        self.kind == FailureKind::Authentication
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    Authentication,
    NotFound,
    HttpStatus(u16),
    Timeout,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    MalformedResponse,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::Authentication => write!(f, "authentication failed"),
            FailureKind::NotFound => write!(f, "not found"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::MalformedResponse => write!(f, "malformed response"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}
