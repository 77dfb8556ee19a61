//! HTTP surface: liveness, status and the trigger endpoints.

use anyhow::Result;
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::webhook;
use crate::config::{Config, TelegramMode};
use crate::pipeline::JobQueue;
use crate::telegram::ChannelListener;

pub struct AppState {
    pub config: Config,
    pub listener: Arc<ChannelListener>,
    pub queue: JobQueue,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, listener: Arc<ChannelListener>, queue: JobQueue) -> Self {
        Self {
            config,
            listener,
            queue,
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/api/status", get(status))
        .route("/webhook", post(webhook::run_now))
        .route("/api/run", post(webhook::run_now))
        .route("/telegram/webhook", post(webhook::telegram_update))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = self.state.config.server_addr().parse()?;
        let app = router(self.state);

        info!("Starting HTTP server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn index() -> &'static str {
    "Webhook Server Running!"
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    channel: String,
    mode: TelegramMode,
    uptime_secs: u64,
    pipeline_running: bool,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        channel: state.listener.channel().to_string(),
        mode: state.config.telegram.mode,
        uptime_secs: state.started_at.elapsed().as_secs(),
        pipeline_running: !state.queue.is_closed(),
    })
}
