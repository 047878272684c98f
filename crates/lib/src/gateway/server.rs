//! Gateway HTTP server (single port).

use crate::channels::{AckFrame, AckSlot, DingTalkChannel, StreamEvent};
use crate::config::{self, Config};
use crate::qinglong::QingLongClient;
use crate::router::CommandRouter;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Header the stream relay must carry when a relay secret is configured.
pub const RELAY_SECRET_HEADER: &str = "x-relay-secret";

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub qinglong_url: String,
    /// When Some, relay requests must send this in `x-relay-secret`.
    pub relay_secret: Option<String>,
    /// None when DingTalk credentials are not configured.
    pub router: Option<Arc<CommandRouter>>,
}

pub fn build_app(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/dingtalk/stream", post(stream_relay))
        .with_state(state)
}

/// Run the gateway; binds to config.gateway.bind:config.gateway.port and blocks until shutdown.
/// Missing QingLong credentials are fatal. Missing DingTalk credentials only skip robot registration.
/// A non-loopback bind requires a relay secret.
pub async fn run_gateway(config: Config) -> Result<()> {
    let credentials = config::resolve_qinglong_credentials(&config)
        .context("set qinglong.url/clientId/clientSecret or QINGLONG_URL/QINGLONG_CLIENT_ID/QINGLONG_CLIENT_SECRET")?;
    let bind = config.gateway.bind.trim();
    let relay_secret = config::resolve_relay_secret(&config);
    if !config::is_loopback_bind(bind) && relay_secret.is_none() {
        anyhow::bail!(
            "refusing to bind gateway to {} without a relay secret (set gateway.relaySecret or QLBOT_RELAY_SECRET)",
            bind
        );
    }

    let qinglong_url = credentials.base_url().to_string();
    let client = QingLongClient::new(credentials);
    let router = match config::resolve_dingtalk_credentials(&config) {
        Some(creds) => {
            let channel = Arc::new(DingTalkChannel::new(creds, config.dingtalk.api_base.clone()));
            log::info!("dingtalk robot registered");
            Some(Arc::new(CommandRouter::new(client, channel)))
        }
        None => {
            log::warn!("dingtalk robot config incomplete, skipping robot registration");
            None
        }
    };

    let app = build_app(GatewayState {
        qinglong_url,
        relay_secret,
        router,
    });

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// POST /dingtalk/stream — one relayed stream event in, its acknowledgement frame out.
async fn stream_relay(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(ref expected) = state.relay_secret {
        let provided = headers
            .get(RELAY_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN.into_response();
        }
    }
    let Some(router) = state.router.clone() else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    let event: StreamEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let slot = AckSlot::new();
    router.handle_stream_event(&event, &slot).await;
    let frame = slot
        .take()
        .unwrap_or_else(|| AckFrame::new(&event.headers.message_id, &json!({})));
    Json(frame).into_response()
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "qinglong": state.qinglong_url,
        "dingtalk": state.router.is_some(),
    }))
}
