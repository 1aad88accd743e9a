use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::retry::RetryPolicy;

pub const DEFAULT_OUTPUT_ROOT: &str = "confluence_export";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid site url {url:?}: {reason}")]
    InvalidSiteUrl { url: String, reason: String },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("invalid space key {0:?}")]
    InvalidSpaceKey(String),
}

/// Credential wrapper that never prints its value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// What to do when a page body references an attachment that cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentPolicy {
    #[default]
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub page_size: u32,
    pub max_attachment_bytes: u64,
    pub retry: RetryPolicy,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            page_size: 100,
            max_attachment_bytes: 512 * 1024 * 1024,
            retry: RetryPolicy::default(),
        }
    }
}

/// Where the wiki lives and how to authenticate against it.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    wiki_root: Url,
    pub email: String,
    pub api_token: Secret,
}

impl SiteConfig {
    /// Accepts `https://example.atlassian.net` or `https://example.atlassian.net/wiki`.
    pub fn new(
        site_url: &str,
        email: impl Into<String>,
        api_token: Secret,
    ) -> Result<Self, ConfigError> {
        let email = email.into();
        if email.trim().is_empty() {
            return Err(ConfigError::Empty("email"));
        }
        if api_token.expose().trim().is_empty() {
            return Err(ConfigError::Empty("api token"));
        }
        Ok(Self {
            wiki_root: wiki_root(site_url)?,
            email,
            api_token,
        })
    }

    /// Base of REST and download paths, without a trailing slash.
    pub fn wiki_root(&self) -> &Url {
        &self.wiki_root
    }
}

fn wiki_root(site_url: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidSiteUrl {
        url: site_url.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = site_url.trim();
    let mut url = Url::parse(trimmed).map_err(|err| invalid(&err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    url.set_query(None);
    url.set_fragment(None);

    let path = url.path().trim_end_matches('/').to_string();
    let path = if path.ends_with("/wiki") {
        path
    } else {
        format!("{path}/wiki")
    };
    url.set_path(&path);
    Ok(url)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub missing_attachments: AttachmentPolicy,
    /// Download every attachment of a page, not only the referenced ones.
    pub download_all_attachments: bool,
    /// Append an `## Attachments` section listing downloaded files.
    pub attachment_index: bool,
    pub front_matter: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            missing_attachments: AttachmentPolicy::Warn,
            download_all_attachments: true,
            attachment_index: true,
            front_matter: true,
        }
    }
}

/// Fully resolved settings for one export run.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub site: SiteConfig,
    pub space_key: String,
    pub output_root: PathBuf,
    pub options: ExportOptions,
    pub fetch: FetchSettings,
    /// 0 disables the abort rule.
    pub max_consecutive_write_failures: u32,
}

impl ExportConfig {
    pub fn new(site: SiteConfig, space_key: impl Into<String>) -> Result<Self, ConfigError> {
        let space_key = space_key.into().trim().to_string();
        if space_key.is_empty() {
            return Err(ConfigError::Empty("space key"));
        }
        if space_key.contains(['/', '\\']) || space_key == "." || space_key == ".." {
            return Err(ConfigError::InvalidSpaceKey(space_key));
        }
        Ok(Self {
            site,
            space_key,
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            options: ExportOptions::default(),
            fetch: FetchSettings::default(),
            max_consecutive_write_failures: 3,
        })
    }

    pub fn space_dir(&self) -> PathBuf {
        self.output_root.join(&self.space_key)
    }
}
