//! Trigger endpoints: the run-now hook and the Telegram webhook receiver.

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::http::AppState;
use crate::config::TelegramMode;
use crate::telegram::TelegramUpdate;

pub const TRIGGER_TOKEN_HEADER: &str = "x-trigger-token";
pub const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// `None` when the header matches or nothing is expected.
fn check_token(headers: &HeaderMap, header: &str, expected: Option<&str>) -> Option<Response> {
    let expected = expected?;
    match headers.get(header) {
        Some(received) if received == expected => None,
        Some(_) => {
            warn!("Invalid {} header", header);
            Some(StatusCode::UNAUTHORIZED.into_response())
        }
        None => {
            warn!("Missing {} header", header);
            Some(StatusCode::UNAUTHORIZED.into_response())
        }
    }
}

/// Wakes the polling listener so it fetches new posts right away.
pub async fn run_now(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    if let Some(denied) = check_token(
        &headers,
        TRIGGER_TOKEN_HEADER,
        state.config.server.trigger_token.as_deref(),
    ) {
        return denied;
    }

    if state.config.telegram.mode == TelegramMode::Webhook {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "listener runs in webhook mode; posts arrive as they are published" })),
        )
            .into_response();
    }

    if state.queue.is_closed() {
        warn!("Run-now requested but the pipeline is not running");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "pipeline is not running" })),
        )
            .into_response();
    }

    let run_id = Uuid::new_v4();
    state.listener.waker().notify_one();
    info!("Run-now trigger accepted (run {})", run_id);

    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "Upload started!", "run_id": run_id })),
    )
        .into_response()
}

pub async fn telegram_update(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(update): Json<Value>,
) -> Response {
    if let Some(denied) = check_token(
        &headers,
        TELEGRAM_SECRET_HEADER,
        state.config.telegram.webhook_secret.as_deref(),
    ) {
        return denied;
    }

    if state.config.telegram.mode != TelegramMode::Webhook {
        warn!("Telegram webhook called while the listener is polling");
        return StatusCode::CONFLICT.into_response();
    }

    let update: TelegramUpdate = match serde_json::from_value(update) {
        Ok(u) => u,
        Err(e) => {
            debug!("Unparseable Telegram update: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match state.listener.accept(update).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => {
            warn!("Failed to queue Telegram update: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
