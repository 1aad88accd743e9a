use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use export_logging::export_debug;

use crate::config::{FetchSettings, SiteConfig};
use crate::retry::with_retry;
use crate::types::{
    Attachment, CurrentUser, FailureKind, FetchError, Page, PageBatch, PageSummary, Space,
};
use crate::wire::{self, ContentItem, ContentList, SpaceList, WireSpace, WireUser};

/// Remote operations the exporter needs. Implemented over HTTP by
/// [`ReqwestConfluenceClient`] and by in-memory fakes in tests.
#[async_trait::async_trait]
pub trait ConfluenceApi: Send + Sync {
    /// One batch of current pages in `space_key`. `cursor` is `None` for the
    /// first batch and then the `next` value of the previous batch.
    async fn list_pages(
        &self,
        space_key: &str,
        cursor: Option<&str>,
    ) -> Result<PageBatch, FetchError>;

    /// Page with storage body, version, ancestors and its attachment list.
    async fn get_page(&self, page_id: &str) -> Result<Page, FetchError>;

    async fn download_attachment(&self, attachment: &Attachment) -> Result<Bytes, FetchError>;

    async fn current_user(&self) -> Result<CurrentUser, FetchError>;

    async fn list_spaces(&self, limit: u32) -> Result<Vec<Space>, FetchError>;

    async fn get_space(&self, space_key: &str) -> Result<Space, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestConfluenceClient {
    client: reqwest::Client,
    site: SiteConfig,
    settings: FetchSettings,
}

impl ReqwestConfluenceClient {
    pub fn new(site: SiteConfig, settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .user_agent(concat!("confluence-export/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            client,
            site,
            settings,
        })
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url, FetchError> {
        let mut url = self.site.wiki_root().clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::new(FailureKind::InvalidUrl, "site url cannot be a base"))?
            .pop_if_empty()
            .extend(["rest", "api"])
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Resolves a `_links` value (`next`, `download`) against the wiki root.
    fn resolve_link(&self, link: &str) -> Result<Url, FetchError> {
        if link.starts_with("http://") || link.starts_with("https://") {
            return Url::parse(link)
                .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()));
        }
        let root = self.site.wiki_root();
        let root_path = root.path().trim_end_matches('/');
        let joined = if !root_path.is_empty() && link.starts_with(&format!("{root_path}/")) {
            let mut url = root.clone();
            url.set_path("");
            format!("{}{link}", url.as_str().trim_end_matches('/'))
        } else {
            let sep = if link.starts_with('/') { "" } else { "/" };
            format!("{}{sep}{link}", root.as_str().trim_end_matches('/'))
        };
        Url::parse(&joined).map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))
    }

    /// Credentials only go to the configured site; `_links` may point at
    /// other hosts.
    fn is_site_url(&self, url: &Url) -> bool {
        url.origin() == self.site.wiki_root().origin()
    }

    async fn send_once(&self, url: &Url) -> Result<reqwest::Response, FetchError> {
        export_debug!("GET {url}");
        let mut request = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json");
        if self.is_site_url(url) {
            request = request.basic_auth(&self.site.email, Some(self.site.api_token.expose()));
        } else {
            export_debug!(
                "{} is not the site origin; sending without credentials",
                url.origin().ascii_serialization()
            );
        }
        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        Err(classify_status(status, url).with_retry_after(retry_after))
    }

    async fn read_limited(
        &self,
        response: reqwest::Response,
        max_bytes: u64,
    ) -> Result<Bytes, FetchError> {
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(too_large(max_bytes, Some(content_len)));
            }
        }
        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(too_large(max_bytes, Some(next_len)));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(bytes))
    }

    async fn get_json<T: DeserializeOwned>(&self, what: &str, url: &Url) -> Result<T, FetchError> {
        let label = format!("{what} ({url})");
        with_retry(&self.settings.retry, &label, move || async move {
            let response = self.send_once(url).await?;
            let body = response.bytes().await.map_err(map_reqwest_error)?;
            wire::parse(what, &body)
        })
        .await
    }

    /// Attachments of a page. Only an authentication failure is an error. A
    /// failed batch or a malformed record becomes a warning, and the
    /// attachments listed so far are kept.
    async fn list_attachments(
        &self,
        page_id: &str,
    ) -> Result<(Vec<Attachment>, Vec<String>), FetchError> {
        let mut url = self.endpoint(
            &["content", page_id, "child", "attachment"],
            &[
                ("start", "0".to_string()),
                ("limit", self.settings.page_size.to_string()),
            ],
        )?;
        let mut attachments = Vec::new();
        let mut warnings = Vec::new();
        loop {
            let list: ContentList = match self.get_json("attachment list", &url).await {
                Ok(list) => list,
                Err(err) if err.is_authentication() => return Err(err),
                Err(err) => {
                    warnings.push(format!("attachment list incomplete: {err}"));
                    break;
                }
            };
            let count = list.results.len();
            for item in list.results {
                match item.into_attachment(page_id) {
                    Ok(attachment) => attachments.push(attachment),
                    Err(err) => warnings.push(format!("skipped attachment record: {err}")),
                }
            }
            match list.links.next {
                Some(next) if count > 0 => match self.resolve_link(&next) {
                    Ok(next) => url = next,
                    Err(err) => {
                        warnings.push(format!("attachment list incomplete: {err}"));
                        break;
                    }
                },
                _ => break,
            }
        }
        Ok((attachments, warnings))
    }
}

#[async_trait::async_trait]
impl ConfluenceApi for ReqwestConfluenceClient {
    async fn list_pages(
        &self,
        space_key: &str,
        cursor: Option<&str>,
    ) -> Result<PageBatch, FetchError> {
        let url = match cursor {
            Some(next) => self.resolve_link(next)?,
            None => self.endpoint(
                &["content"],
                &[
                    ("spaceKey", space_key.to_string()),
                    ("type", "page".to_string()),
                    ("status", "current".to_string()),
                    ("start", "0".to_string()),
                    ("limit", self.settings.page_size.to_string()),
                ],
            )?,
        };
        let list: ContentList = self.get_json("page list", &url).await?;
        let pages = list
            .results
            .into_iter()
            .map(ContentItem::into_summary)
            .collect::<Result<Vec<PageSummary>, _>>()?;
        Ok(PageBatch {
            pages,
            next: list.links.next,
        })
    }

    async fn get_page(&self, page_id: &str) -> Result<Page, FetchError> {
        let url = self.endpoint(
            &["content", page_id],
            &[("expand", "body.storage,version,ancestors,space".to_string())],
        )?;
        let item: ContentItem = self.get_json("page", &url).await?;
        let (attachments, warnings) = self.list_attachments(page_id).await?;
        let mut page = item.into_page(attachments)?;
        page.warnings = warnings;
        Ok(page)
    }

    async fn download_attachment(&self, attachment: &Attachment) -> Result<Bytes, FetchError> {
        let url = self.resolve_link(&attachment.download)?;
        let label = format!("attachment {:?}", attachment.filename);
        let max_bytes = self.settings.max_attachment_bytes;
        let url = &url;
        with_retry(&self.settings.retry, &label, move || async move {
            let response = self.send_once(url).await?;
            self.read_limited(response, max_bytes).await
        })
        .await
    }

    async fn current_user(&self) -> Result<CurrentUser, FetchError> {
        let url = self.endpoint(&["user", "current"], &[])?;
        let user: WireUser = self.get_json("current user", &url).await?;
        Ok(user.into_user())
    }

    async fn list_spaces(&self, limit: u32) -> Result<Vec<Space>, FetchError> {
        let url = self.endpoint(&["space"], &[("limit", limit.to_string())])?;
        let list: SpaceList = self.get_json("space list", &url).await?;
        list.results.into_iter().map(WireSpace::into_space).collect()
    }

    async fn get_space(&self, space_key: &str) -> Result<Space, FetchError> {
        let url = self.endpoint(&["space", space_key], &[])?;
        let space: WireSpace = self.get_json("space", &url).await?;
        space.into_space()
    }
}

fn classify_status(status: StatusCode, url: &Url) -> FetchError {
    let message = format!("{status} for {}", url.path());
    match status {
        StatusCode::UNAUTHORIZED => FetchError::new(FailureKind::Authentication, message),
        StatusCode::NOT_FOUND => FetchError::new(FailureKind::NotFound, message),
        _ => FetchError::new(FailureKind::HttpStatus(status.as_u16()), message),
    }
}

fn too_large(max_bytes: u64, actual: Option<u64>) -> FetchError {
    FetchError::new(
        FailureKind::TooLarge { max_bytes, actual },
        "response too large",
    )
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
