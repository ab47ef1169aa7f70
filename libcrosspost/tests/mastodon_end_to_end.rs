//! End-to-end tests against a fake Mastodon instance
//!
//! Runs the whole service stack (reqwest transport, capability cache,
//! validation, posting) against a wiremock server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use libcrosspost::config::{Config, PostingConfig};
use libcrosspost::files::LocalFileStore;
use libcrosspost::http::{HttpTransport, ReqwestTransport};
use libcrosspost::scaling::PassthroughScaler;
use libcrosspost::types::{AccountData, FileRecord, PostStatus};
use libcrosspost::{
    Account, CancellationToken, CapabilityStore, CrosspostService, PlatformRegistry, Submission,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Hands out sequential media ids; the first upload is still processing
struct MediaResponder {
    uploads: AtomicUsize,
}

impl Respond for MediaResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            ResponseTemplate::new(202).set_body_json(json!({"id": "m0", "url": null}))
        } else {
            ResponseTemplate::new(200).set_body_json(json!({
                "id": format!("m{}", n),
                "url": format!("https://files.example/m{}.png", n)
            }))
        }
    }
}

/// Creates statuses with sequential ids, optionally rejecting one
struct StatusResponder {
    base: String,
    created: AtomicUsize,
    reject_at: Option<usize>,
}

impl Respond for StatusResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        if self.reject_at == Some(n) {
            return ResponseTemplate::new(422)
                .set_body_json(json!({"error": "Validation failed: Text character limit"}));
        }
        ResponseTemplate::new(200).set_body_json(json!({
            "id": format!("s{}", n),
            "url": format!("{}/@artist/s{}", self.base, n)
        }))
    }
}

fn instance(max_characters: usize, max_attachments: usize) -> Value {
    json!({
        "uri": "example.social",
        "configuration": {
            "statuses": {
                "max_characters": max_characters,
                "max_media_attachments": max_attachments
            },
            "media_attachments": {
                "image_size_limit": 10_485_760,
                "video_size_limit": 41_943_040
            }
        }
    })
}

async fn setup(server: &MockServer, max_characters: usize, max_attachments: usize) -> CrosspostService {
    Mock::given(method("GET"))
        .and(path("/api/v1/instance"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance(max_characters, max_attachments)))
        .mount(server)
        .await;

    let config = Config {
        posting: PostingConfig {
            media_poll_interval: Duration::from_millis(10),
            media_poll_attempts: 5,
            ..PostingConfig::default()
        },
        ..Config::default()
    };
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&config.http).unwrap());
    let capabilities = Arc::new(CapabilityStore::new());
    let registry = PlatformRegistry::with_defaults(transport, Arc::clone(&capabilities), &config);

    CrosspostService::from_parts(
        config,
        registry,
        capabilities,
        Arc::new(LocalFileStore::new()),
        Arc::new(PassthroughScaler),
    )
}

fn account(server: &MockServer) -> Account {
    Account {
        id: "masto".to_string(),
        platform: "mastodon".to_string(),
        alias: None,
        data: AccountData::from_value(json!({
            "website": server.uri(),
            "token": "tok",
            "username": "artist"
        })),
    }
}

fn image_submission(dir: &TempDir, count: usize) -> Submission {
    let records: Vec<FileRecord> = (0..count)
        .map(|i| {
            let name = format!("{}.png", i);
            let path = dir.path().join(&name);
            std::fs::write(&path, b"\x89PNG fake").unwrap();
            FileRecord::new(&name, "image/png", 9, path)
        })
        .collect();
    let mut records = records.into_iter();
    let mut submission = Submission::file("Sketch", "New sketch", records.next().unwrap());
    submission.additional.extend(records);
    submission
}

async fn status_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/api/v1/statuses")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_login_then_thread_of_images() {
    let server = MockServer::start().await;
    let service = setup(&server, 500, 2).await;

    Mock::given(method("POST"))
        .and(path("/api/v2/media"))
        .respond_with(MediaResponder {
            uploads: AtomicUsize::new(0),
        })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/v1/media/m\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "m0",
            "url": "https://files.example/m0.png"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses"))
        .respond_with(StatusResponder {
            base: server.uri(),
            created: AtomicUsize::new(0),
            reject_at: None,
        })
        .mount(&server)
        .await;

    let account = account(&server);
    let login = service.check_login(&account).await.unwrap();
    assert!(login.logged_in);
    assert_eq!(login.username.as_deref(), Some("artist"));

    let dir = TempDir::new().unwrap();
    let run = service
        .posting()
        .post(
            Arc::new(image_submission(&dir, 3)),
            std::slice::from_ref(&account),
            CancellationToken::new(),
        )
        .await;

    let result = &run.results[0];
    assert!(result.success(), "{:?}", result.message);
    assert_eq!(
        result.source.as_deref(),
        Some(format!("{}/@artist/s0", server.uri()).as_str())
    );

    let statuses = status_bodies(&server).await;
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0]["media_ids"], json!(["m0", "m1"]));
    assert_eq!(statuses[0]["sensitive"], json!(false));
    assert_eq!(statuses[0]["visibility"], json!("public"));
    assert!(statuses[0].get("in_reply_to_id").is_none());
    assert_eq!(statuses[1]["media_ids"], json!(["m2"]));
    assert_eq!(statuses[1]["in_reply_to_id"], json!("s0"));
    assert_eq!(statuses[0]["status"], statuses[1]["status"]);
}

#[tokio::test]
async fn test_rejected_second_chunk() {
    let server = MockServer::start().await;
    let service = setup(&server, 500, 1).await;

    Mock::given(method("POST"))
        .and(path("/api/v2/media"))
        .respond_with(|_: &Request| {
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "m", "url": "https://files.example/m.png"}))
        })
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses"))
        .respond_with(StatusResponder {
            base: server.uri(),
            created: AtomicUsize::new(0),
            reject_at: Some(1),
        })
        .mount(&server)
        .await;

    let account = account(&server);
    service.check_login(&account).await.unwrap();

    let dir = TempDir::new().unwrap();
    let run = service
        .posting()
        .post(
            Arc::new(image_submission(&dir, 3)),
            std::slice::from_ref(&account),
            CancellationToken::new(),
        )
        .await;

    let result = &run.results[0];
    assert_eq!(result.status, PostStatus::Failed);
    assert_eq!(result.chunk_number, Some(1));
    assert_eq!(
        result.source.as_deref(),
        Some(format!("{}/@artist/s0", server.uri()).as_str())
    );
    assert!(result
        .message
        .as_deref()
        .unwrap()
        .contains("Text character limit"));
    assert_eq!(status_bodies(&server).await.len(), 2);
}

#[tokio::test]
async fn test_short_instance_limit_warns_and_truncates() {
    let server = MockServer::start().await;
    let service = setup(&server, 10, 4).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/statuses"))
        .respond_with(StatusResponder {
            base: server.uri(),
            created: AtomicUsize::new(0),
            reject_at: None,
        })
        .mount(&server)
        .await;

    let account = account(&server);
    service.check_login(&account).await.unwrap();

    let mut submission = Submission::notification("", "Hello #world!!");
    submission.tags = vec!["neat stuff".to_string()];

    let validation = service
        .validation()
        .validate(&submission, std::slice::from_ref(&account));
    assert!(validation[0].is_valid());
    assert_eq!(validation[0].warnings.len(), 1);
    assert!(validation[0].warnings[0].contains("10"));

    let run = service
        .posting()
        .post(
            Arc::new(submission),
            std::slice::from_ref(&account),
            CancellationToken::new(),
        )
        .await;
    assert!(run.all_succeeded());
    assert_eq!(run.results[0].warnings.len(), 1);

    let statuses = status_bodies(&server).await;
    assert_eq!(statuses[0]["status"], json!("Hello #wor"));
}

#[tokio::test]
async fn test_login_and_post_uses_instance_limits() {
    let server = MockServer::start().await;
    let service = setup(&server, 5000, 4).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/statuses"))
        .respond_with(StatusResponder {
            base: server.uri(),
            created: AtomicUsize::new(0),
            reject_at: None,
        })
        .mount(&server)
        .await;

    let account = account(&server);
    let description = "a".repeat(800);
    let submission = Submission::notification("", &description);

    let validation = service
        .login_and_validate(&submission, std::slice::from_ref(&account))
        .await;
    assert!(validation[0].warnings.is_empty(), "{:?}", validation[0].warnings);

    let run = service
        .login_and_post(
            Arc::new(submission),
            std::slice::from_ref(&account),
            CancellationToken::new(),
        )
        .await;
    assert!(run.all_succeeded(), "{:?}", run.results[0].message);
    assert!(run.results[0].warnings.is_empty());

    let instance_checks = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/api/v1/instance")
        .count();
    assert_eq!(instance_checks, 2);

    let statuses = status_bodies(&server).await;
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0]["status"].as_str().unwrap().chars().count(), 800);
}

#[tokio::test]
async fn test_rejected_token_reports_logged_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/instance"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "The access token is invalid"})))
        .mount(&server)
        .await;

    let config = Config::default();
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&config.http).unwrap());
    let capabilities = Arc::new(CapabilityStore::new());
    let registry = PlatformRegistry::with_defaults(transport, Arc::clone(&capabilities), &config);
    let service = CrosspostService::from_parts(
        config,
        registry,
        Arc::clone(&capabilities),
        Arc::new(LocalFileStore::new()),
        Arc::new(PassthroughScaler),
    );

    let login = service.check_login(&account(&server)).await.unwrap();
    assert!(!login.logged_in);
    assert!(!capabilities.contains("masto", "instance_info"));
}
