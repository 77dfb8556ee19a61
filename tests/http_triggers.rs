// HTTP trigger surface, exercised in-process through the router.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tube_relay::config::{Config, TelegramMode};
use tube_relay::pipeline::{self, JobReceiver};
use tube_relay::server::{router, AppState};
use tube_relay::telegram::types::TelegramFile;
use tube_relay::telegram::{ChannelListener, ChannelRef, TelegramApi, TelegramUpdate};

struct IdleTelegram;

#[async_trait]
impl TelegramApi for IdleTelegram {
    async fn get_updates(&self, _offset: Option<i64>, _timeout: u64) -> anyhow::Result<Vec<TelegramUpdate>> {
        Ok(vec![])
    }
    async fn get_file(&self, _file_id: &str) -> anyhow::Result<TelegramFile> {
        anyhow::bail!("not used")
    }
    async fn download_file(&self, _file_path: &str, _dest: &Path) -> anyhow::Result<u64> {
        anyhow::bail!("not used")
    }
}

struct Harness {
    app: axum::Router,
    listener: Arc<ChannelListener>,
    receiver: JobReceiver,
}

fn harness(mode: TelegramMode, trigger_token: Option<&str>, webhook_secret: Option<&str>) -> Harness {
    let mut config = Config::default();
    config.telegram.mode = mode;
    config.telegram.channel = Some("@trips".to_string());
    config.telegram.webhook_secret = webhook_secret.map(String::from);
    config.server.trigger_token = trigger_token.map(String::from);

    let (queue, receiver) = pipeline::channel(4);
    let listener = Arc::new(ChannelListener::new(
        Arc::new(IdleTelegram),
        ChannelRef::parse("@trips").unwrap(),
        queue.clone(),
    ));
    let state = Arc::new(AppState::new(config, listener.clone(), queue));

    Harness {
        app: router(state),
        listener,
        receiver,
    }
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("POST").uri(uri)
}

#[tokio::test]
async fn test_root_reports_running() {
    let h = harness(TelegramMode::Polling, None, None);
    let resp = h
        .app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"Webhook Server Running!");
}

#[tokio::test]
async fn test_run_now_wakes_listener() {
    let h = harness(TelegramMode::Polling, None, None);
    let waker = h.listener.waker();

    let resp = h
        .app
        .oneshot(post("/webhook").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "Upload started!");
    assert!(body["run_id"].as_str().is_some());

    tokio::time::timeout(Duration::from_millis(200), waker.notified())
        .await
        .expect("listener was not woken");
}

#[tokio::test]
async fn test_run_now_requires_token_when_configured() {
    let h = harness(TelegramMode::Polling, Some("s3cret"), None);

    let missing = h
        .app
        .clone()
        .oneshot(post("/api/run").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = h
        .app
        .clone()
        .oneshot(
            post("/api/run")
                .header("X-Trigger-Token", "nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let ok = h
        .app
        .oneshot(
            post("/api/run")
                .header("X-Trigger-Token", "s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_run_now_conflicts_in_webhook_mode() {
    let h = harness(TelegramMode::Webhook, None, None);
    let resp = h
        .app
        .oneshot(post("/webhook").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_run_now_fails_when_pipeline_stopped() {
    let h = harness(TelegramMode::Polling, None, None);
    drop(h.receiver);
    let resp = h
        .app
        .oneshot(post("/webhook").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

fn channel_post_json(username: &str) -> String {
    json!({
        "update_id": 77,
        "channel_post": {
            "message_id": 3,
            "chat": {"id": -100, "type": "channel", "username": username},
            "caption": "My Trip: Day 1",
            "video": {"file_id": "VID", "mime_type": "video/mp4"}
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_telegram_webhook_queues_channel_post() {
    let mut h = harness(TelegramMode::Webhook, None, Some("tg-secret"));

    let resp = h
        .app
        .clone()
        .oneshot(
            post("/telegram/webhook")
                .header("content-type", "application/json")
                .header("X-Telegram-Bot-Api-Secret-Token", "tg-secret")
                .body(Body::from(channel_post_json("trips")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let queued = h.receiver.recv().await.unwrap();
    assert!(queued.has_video);
    assert_eq!(queued.caption.as_deref(), Some("My Trip: Day 1"));

    let forged = h
        .app
        .oneshot(
            post("/telegram/webhook")
                .header("content-type", "application/json")
                .header("X-Telegram-Bot-Api-Secret-Token", "guess")
                .body(Body::from(channel_post_json("trips")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_telegram_webhook_ignores_other_channels() {
    let mut h = harness(TelegramMode::Webhook, None, None);

    let resp = h
        .app
        .oneshot(
            post("/telegram/webhook")
                .header("content-type", "application/json")
                .body(Body::from(channel_post_json("elsewhere")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    drop(h.listener);
    let next = tokio::time::timeout(Duration::from_millis(100), h.receiver.recv()).await;
    assert!(matches!(next, Ok(None) | Err(_)));
}
