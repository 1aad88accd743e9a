//! JSON shapes returned by the Confluence REST API.
//!
//! Every field is optional on the wire; conversion into the crate's records
//! checks what is required and reports `MalformedResponse` otherwise.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::types::{Attachment, CurrentUser, FetchError, Page, PageBody, PageSummary, Space};

pub(crate) fn parse<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(bytes).map_err(|err| FetchError::malformed(what, err))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Links {
    pub next: Option<String>,
    pub download: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentList {
    #[serde(default)]
    pub results: Vec<ContentItem>,
    #[serde(default, rename = "_links")]
    pub links: Links,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentItem {
    id: Option<Value>,
    title: Option<String>,
    body: Option<WireBody>,
    version: Option<WireVersion>,
    #[serde(default)]
    ancestors: Vec<ContentItem>,
    space: Option<WireSpace>,
    metadata: Option<WireMetadata>,
    extensions: Option<WireExtensions>,
    #[serde(default, rename = "_links")]
    links: Links,
}

#[derive(Debug, Deserialize)]
struct WireBody {
    storage: Option<WireStorage>,
}

#[derive(Debug, Deserialize)]
struct WireStorage {
    value: Option<String>,
    representation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireVersion {
    number: Option<u32>,
    when: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireSpace {
    key: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMetadata {
    #[serde(rename = "mediaType")]
    media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireExtensions {
    #[serde(rename = "mediaType")]
    media_type: Option<String>,
    #[serde(rename = "fileSize")]
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SpaceList {
    #[serde(default)]
    pub results: Vec<WireSpace>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUser {
    #[serde(rename = "accountId")]
    account_id: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "publicName")]
    public_name: Option<String>,
    email: Option<String>,
}

/// Ids arrive as strings from Cloud and as numbers from some proxies.
fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl ContentItem {
    fn id(&self, what: &str) -> Result<String, FetchError> {
        id_string(self.id.as_ref()).ok_or_else(|| FetchError::malformed(what, "missing id"))
    }

    fn title(&self, what: &str) -> Result<String, FetchError> {
        self.title
            .clone()
            .ok_or_else(|| FetchError::malformed(what, "missing title"))
    }

    pub(crate) fn into_summary(self) -> Result<PageSummary, FetchError> {
        Ok(PageSummary {
            id: self.id("page summary")?,
            title: self.title("page summary")?,
        })
    }

    pub(crate) fn into_page(self, attachments: Vec<Attachment>) -> Result<Page, FetchError> {
        let id = self.id("page")?;
        let title = self.title("page")?;
        let body = self
            .body
            .and_then(|body| body.storage)
            .and_then(|storage| {
                storage.value.map(|value| PageBody {
                    value,
                    representation: storage
                        .representation
                        .unwrap_or_else(|| "storage".to_string()),
                })
            });
        let parent_id = self
            .ancestors
            .last()
            .and_then(|ancestor| id_string(ancestor.id.as_ref()));
        let ancestors = self
            .ancestors
            .iter()
            .filter_map(|ancestor| ancestor.title.clone())
            .collect();
        let (version, last_modified) = match self.version {
            Some(version) => (
                version.number,
                version.when.as_deref().and_then(parse_timestamp),
            ),
            None => (None, None),
        };

        Ok(Page {
            id,
            title,
            space_key: self.space.and_then(|space| space.key),
            body,
            parent_id,
            ancestors,
            version,
            last_modified,
            attachments,
            warnings: Vec::new(),
        })
    }

    pub(crate) fn into_attachment(self, page_id: &str) -> Result<Attachment, FetchError> {
        let id = self.id("attachment")?;
        let filename = self.title("attachment")?;
        let download = self
            .links
            .download
            .ok_or_else(|| FetchError::malformed("attachment", "missing download link"))?;
        let (ext_media_type, size) = match self.extensions {
            Some(ext) => (ext.media_type, ext.file_size),
            None => (None, None),
        };
        let media_type = self.metadata.and_then(|m| m.media_type).or(ext_media_type);

        Ok(Attachment {
            id,
            filename,
            media_type,
            size,
            download,
            page_id: page_id.to_string(),
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

impl WireSpace {
    pub(crate) fn into_space(self) -> Result<Space, FetchError> {
        let key = self
            .key
            .ok_or_else(|| FetchError::malformed("space", "missing key"))?;
        let name = self.name.unwrap_or_else(|| key.clone());
        Ok(Space { key, name })
    }
}

impl WireUser {
    pub(crate) fn into_user(self) -> CurrentUser {
        CurrentUser {
            account_id: self.account_id,
            display_name: self
                .display_name
                .or(self.public_name)
                .unwrap_or_else(|| "unknown".to_string()),
            email: self.email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FailureKind;

    #[test]
    fn page_is_normalized_from_wire_shape() {
        let json = br#"{
            "id": "123",
            "type": "page",
            "title": "Getting Started",
            "space": {"key": "DEMO", "name": "Demo"},
            "body": {"storage": {"value": "<p>Hi</p>", "representation": "storage"}},
            "version": {"number": 4, "when": "2024-03-01T10:00:00.000Z"},
            "ancestors": [{"id": "1", "title": "Home"}, {"id": 7, "title": "Guides"}]
        }"#;
        let item: ContentItem = parse("page", json).unwrap();
        let page = item.into_page(Vec::new()).unwrap();

        assert_eq!(page.id, "123");
        assert_eq!(page.space_key.as_deref(), Some("DEMO"));
        assert_eq!(page.body.unwrap().value, "<p>Hi</p>");
        assert_eq!(page.parent_id.as_deref(), Some("7"));
        assert_eq!(page.ancestors, vec!["Home".to_string(), "Guides".to_string()]);
        assert_eq!(page.version, Some(4));
        assert_eq!(
            page.last_modified.unwrap().to_rfc3339(),
            "2024-03-01T10:00:00+00:00"
        );
    }

    #[test]
    fn missing_title_is_malformed() {
        let item: ContentItem = parse("page", br#"{"id": "1"}"#).unwrap();
        let err = item.into_page(Vec::new()).unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedResponse);
    }

    #[test]
    fn attachment_requires_download_link() {
        let json = br#"{"id": "att1", "title": "logo.png", "extensions": {"mediaType": "image/png", "fileSize": 12}}"#;
        let item: ContentItem = parse("attachment", json).unwrap();
        let err = item.into_attachment("123").unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedResponse);

        let json = br#"{"id": "att1", "title": "logo.png",
            "extensions": {"mediaType": "image/png", "fileSize": 12},
            "_links": {"download": "/download/attachments/123/logo.png"}}"#;
        let item: ContentItem = parse("attachment", json).unwrap();
        let attachment = item.into_attachment("123").unwrap();
        assert_eq!(attachment.media_type.as_deref(), Some("image/png"));
        assert_eq!(attachment.size, Some(12));
        assert_eq!(attachment.page_id, "123");
    }

    #[test]
    fn non_json_body_is_malformed() {
        let err = parse::<ContentList>("page list", b"<html>login</html>").unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedResponse);
    }
}
