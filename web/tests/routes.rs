use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use database::Database;
use monitor_service::{MonitorController, MonitorService, MonitorSettings};
use replybot_core::{
    CoreError, FeedAdapter, InteractionLog, NewInteraction, Post, ResponseGenerator,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct QuietFeed;

#[async_trait]
impl FeedAdapter for QuietFeed {
    async fn fetch_new(&self, _subreddit: &str, _limit: u32) -> Result<Vec<Post>, CoreError> {
        Ok(Vec::new())
    }

    async fn reply(&self, _post_id: &str, _text: &str) -> Result<(), CoreError> {
        Ok(())
    }
}

struct Echo;

#[async_trait]
impl ResponseGenerator for Echo {
    async fn generate(&self, title: &str, _content: &str) -> Result<String, CoreError> {
        Ok(format!("Re: {}", title))
    }
}

async fn test_app(static_dir: Option<&std::path::Path>) -> (Router, Arc<Database>, Arc<MonitorService>) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    db.run_migrations().await.unwrap();
    let db = Arc::new(db);

    let settings = MonitorSettings {
        poll_interval: Duration::from_millis(5),
        ..MonitorSettings::default()
    };
    let controller = MonitorController::new(Arc::new(QuietFeed), Arc::new(Echo), db.clone(), settings);
    let service = Arc::new(MonitorService::new(Arc::new(controller)));

    (web::router(service.clone(), static_dir), db, service)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

fn as_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn test_monitor_and_stop() {
    let (app, _db, service) = test_app(None).await;

    let (status, body) = send(
        &app,
        "POST",
        "/monitor",
        Some(json!({ "subreddit_name": "forhire", "keywords": ["job"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        as_json(&body),
        json!({ "message": "Monitoring initiated successfully." })
    );

    let (status, body) = send(&app, "GET", "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    let status_json = as_json(&body);
    assert_eq!(status_json["state"], "running");
    assert_eq!(status_json["subreddit"], "forhire");
    assert_eq!(status_json["keywords"], json!(["job"]));

    let (status, body) = send(&app, "POST", "/stop_monitoring", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        as_json(&body),
        json!({ "message": "Monitoring stopped successfully." })
    );

    service.shutdown().await;
    let (_, body) = send(&app, "GET", "/status", None).await;
    assert_eq!(as_json(&body), json!({ "state": "idle" }));
}

#[tokio::test]
async fn test_monitor_accepts_comma_separated_keywords() {
    let (app, _db, service) = test_app(None).await;

    let (status, _) = send(
        &app,
        "POST",
        "/monitor",
        Some(json!({ "subreddit_name": "r/forhire", "keywords": "Job, Hiring" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, "GET", "/status", None).await;
    assert_eq!(as_json(&body)["keywords"], json!(["hiring", "job"]));

    service.shutdown().await;
}

#[tokio::test]
async fn test_monitor_errors_are_reported() {
    let (app, _db, service) = test_app(None).await;

    let (status, body) = send(
        &app,
        "POST",
        "/monitor",
        Some(json!({ "subreddit_name": "not valid!", "keywords": ["job"] })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(as_json(&body)["error"]
        .as_str()
        .unwrap()
        .contains("Invalid input"));

    let request = json!({ "subreddit_name": "forhire", "keywords": ["job"] });
    let (status, _) = send(&app, "POST", "/monitor", Some(request.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", "/monitor", Some(request)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(as_json(&body)["error"]
        .as_str()
        .unwrap()
        .contains("Already monitoring r/forhire"));

    service.shutdown().await;
}

#[tokio::test]
async fn test_interactions_newest_first() {
    let (app, db, _service) = test_app(None).await;

    for (id, title) in [("a", "First"), ("b", "Second")] {
        db.append(NewInteraction {
            post_id: id.to_string(),
            title: title.to_string(),
            content: String::new(),
            response: "Thanks!".to_string(),
        })
        .await
        .unwrap();
    }

    let (status, body) = send(&app, "GET", "/interactions", None).await;
    assert_eq!(status, StatusCode::OK);

    let interactions = as_json(&body)["interactions"].as_array().unwrap().clone();
    assert_eq!(interactions.len(), 2);
    assert_eq!(interactions[0]["post_id"], "b");
    assert_eq!(interactions[1]["post_id"], "a");
    assert_eq!(interactions[1]["response"], "Thanks!");
}

#[tokio::test]
async fn test_health_and_static_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>replybot</h1>").unwrap();
    let (app, _db, _service) = test_app(Some(dir.path())).await;

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");

    let (status, body) = send(&app, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<h1>replybot</h1>");
}

#[tokio::test]
async fn test_malformed_monitor_body_is_reported() {
    let (app, _db, service) = test_app(None).await;

    let (status, body) = send(
        &app,
        "POST",
        "/monitor",
        Some(json!({ "subreddit_name": "forhire", "keywords": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(as_json(&body)["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid input"));

    // No body and no content type.
    let (status, body) = send(&app, "POST", "/monitor", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(as_json(&body)["error"].is_string());

    assert!(service.status().is_idle());
}
