use std::time::Duration;

use exporter_engine::{
    Attachment, ConfluenceApi, ExportConfig, ExportEngine, FailureKind, FetchSettings, PageCursor,
    ReqwestConfluenceClient, RetryPolicy, Secret, SiteConfig, StorageConverter,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{basic_auth, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn quick_settings() -> FetchSettings {
    FetchSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2,
        },
        ..FetchSettings::default()
    }
}

fn client(server: &MockServer, settings: FetchSettings) -> ReqwestConfluenceClient {
    let site = SiteConfig::new(&server.uri(), "me@example.com", Secret::new("s3cret")).unwrap();
    ReqwestConfluenceClient::new(site, settings).unwrap()
}

fn summary(id: &str, title: &str) -> serde_json::Value {
    json!({ "id": id, "type": "page", "title": title })
}

#[tokio::test]
async fn listing_follows_next_links_until_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content"))
        .and(query_param("spaceKey", "DEMO"))
        .and(query_param("start", "0"))
        .and(basic_auth("me@example.com", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [summary("1", "Home"), summary("2", "Getting Started")],
            "_links": { "next": "/rest/api/content?spaceKey=DEMO&type=page&start=2&limit=2" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content"))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [summary("3", "API/Reference")],
            "_links": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server, quick_settings());
    let listing = PageCursor::new(&api, "DEMO").collect_all().await;
    assert_eq!(listing.interrupted, None);
    let titles: Vec<&str> = listing.pages.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Home", "Getting Started", "API/Reference"]);
}

#[tokio::test]
async fn unauthorized_is_fatal_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server, quick_settings());
    let err = api.list_pages("DEMO", None).await.unwrap_err();
    assert!(err.is_authentication());
    assert_eq!(err.kind, FailureKind::Authentication);
}

#[tokio::test]
async fn service_unavailable_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/space/DEMO"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/space/DEMO"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "key": "DEMO", "name": "Demo" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server, quick_settings());
    let space = api.get_space("DEMO").await.unwrap();
    assert_eq!(space.key, "DEMO");
    assert_eq!(space.name, "Demo");
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/7"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let api = client(&server, quick_settings());
    let err = api.get_page("7").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(502));
    assert!(err.message.contains("after 3 attempts"), "{}", err.message);
}

#[tokio::test]
async fn malformed_json_is_reported_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/user/current"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server, quick_settings());
    let err = api.current_user().await.unwrap_err();
    assert_eq!(err.kind, FailureKind::MalformedResponse);
}

#[tokio::test]
async fn page_comes_with_body_ancestors_and_attachments() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/42"))
        .and(query_param("expand", "body.storage,version,ancestors,space"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "42",
            "title": "Getting Started",
            "space": { "key": "DEMO", "name": "Demo" },
            "version": { "number": 5, "when": "2024-03-01T10:00:00.000Z" },
            "ancestors": [{ "id": "1", "title": "Home" }],
            "body": { "storage": { "value": "<p>Hi</p>", "representation": "storage" } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/42/child/attachment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "id": "att9",
                "title": "logo.png",
                "extensions": { "mediaType": "image/png", "fileSize": 4 },
                "_links": { "download": "/download/attachments/42/logo.png?version=1" }
            }],
            "_links": {}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wiki/download/attachments/42/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG".to_vec()))
        .mount(&server)
        .await;

    let api = client(&server, quick_settings());
    let page = api.get_page("42").await.unwrap();
    assert_eq!(page.title, "Getting Started");
    assert_eq!(page.space_key.as_deref(), Some("DEMO"));
    assert_eq!(page.parent_id.as_deref(), Some("1"));
    assert_eq!(page.ancestors, vec!["Home".to_string()]);
    assert_eq!(page.version, Some(5));
    assert_eq!(page.body.as_ref().unwrap().value, "<p>Hi</p>");
    assert_eq!(page.attachments.len(), 1);

    let attachment = &page.attachments[0];
    assert_eq!(attachment.filename, "logo.png");
    assert_eq!(attachment.size, Some(4));
    let bytes = api.download_attachment(attachment).await.unwrap();
    assert_eq!(bytes.as_ref(), b"\x89PNG");
}

#[tokio::test]
async fn oversized_attachment_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/download/attachments/1/big.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
        .mount(&server)
        .await;

    let settings = FetchSettings {
        max_attachment_bytes: 16,
        ..quick_settings()
    };
    let api = client(&server, settings);
    let attachment = exporter_engine::Attachment {
        id: "a1".into(),
        filename: "big.bin".into(),
        media_type: None,
        size: None,
        download: "/download/attachments/1/big.bin".into(),
        page_id: "1".into(),
    };
    let err = api.download_attachment(&attachment).await.unwrap_err();
    assert!(matches!(err.kind, FailureKind::TooLarge { max_bytes: 16, .. }));
}

#[tokio::test]
async fn not_found_page_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/404"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server, quick_settings());
    let err = api.get_page("404").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::NotFound);
    assert!(!err.is_transient());
}

fn page_json(id: &str, title: &str, body: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "space": { "key": "DEMO", "name": "Demo" },
        "version": { "number": 1 },
        "ancestors": [],
        "body": { "storage": { "value": body, "representation": "storage" } }
    })
}

#[tokio::test]
async fn unavailable_attachment_list_keeps_the_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json("42", "Home", "<p>Hi</p>")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/42/child/attachment"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let api = client(&server, quick_settings());
    let page = api.get_page("42").await.unwrap();
    assert_eq!(page.title, "Home");
    assert!(page.attachments.is_empty());
    assert_eq!(page.warnings.len(), 1);
    assert!(
        page.warnings[0].starts_with("attachment list incomplete: http status 503"),
        "{:?}",
        page.warnings
    );
}

#[tokio::test]
async fn attachment_record_without_download_link_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json("42", "Home", "<p>Hi</p>")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/42/child/attachment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "id": "att1", "title": "good.png",
                  "_links": { "download": "/download/attachments/42/good.png" } },
                { "id": "att2", "title": "broken.png", "_links": {} }
            ],
            "_links": {}
        })))
        .mount(&server)
        .await;

    let api = client(&server, quick_settings());
    let page = api.get_page("42").await.unwrap();
    let names: Vec<&str> = page.attachments.iter().map(|a| a.filename.as_str()).collect();
    assert_eq!(names, vec!["good.png"]);
    assert_eq!(page.warnings.len(), 1);
    assert!(
        page.warnings[0].contains("missing download link"),
        "{:?}",
        page.warnings
    );
}

#[tokio::test]
async fn attachment_list_outage_still_writes_the_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [summary("42", "Home")],
            "_links": {}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json("42", "Home", "<p>Hi</p>")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/42/child/attachment"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();
    let site = SiteConfig::new(&server.uri(), "me@example.com", Secret::new("s3cret")).unwrap();
    let mut config = ExportConfig::new(site, "DEMO").unwrap();
    config.output_root = out.path().to_path_buf();
    config.options.front_matter = false;
    let api = client(&server, quick_settings());

    let summary = ExportEngine::new(&api, &StorageConverter, &config)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.warned.len(), 1);
    assert!(summary.warned[0].warnings[0].starts_with("attachment list incomplete"));
    let markdown = std::fs::read_to_string(out.path().join("DEMO").join("Home.md")).unwrap();
    assert_eq!(markdown, "# Home\n\nHi\n");
}

#[tokio::test]
async fn credentials_are_not_sent_to_other_hosts() {
    let site_server = MockServer::start().await;
    let cdn = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNG".to_vec()))
        .expect(1)
        .mount(&cdn)
        .await;
    Mock::given(method("GET"))
        .and(path("/wiki/download/attachments/1/own.png"))
        .and(basic_auth("me@example.com", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"OWN".to_vec()))
        .expect(1)
        .mount(&site_server)
        .await;

    let api = client(&site_server, quick_settings());
    let foreign = Attachment {
        id: "a1".into(),
        filename: "logo.png".into(),
        media_type: None,
        size: None,
        download: format!("{}/files/logo.png", cdn.uri()),
        page_id: "1".into(),
    };
    let own = Attachment {
        id: "a2".into(),
        filename: "own.png".into(),
        download: "/download/attachments/1/own.png".into(),
        ..foreign.clone()
    };

    assert_eq!(api.download_attachment(&foreign).await.unwrap().as_ref(), b"PNG");
    assert_eq!(api.download_attachment(&own).await.unwrap().as_ref(), b"OWN");

    let received = cdn.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].headers.get("authorization").is_none());
}
