//! In-process mock QingLong panel and DingTalk API, served by axum on 127.0.0.1:0.
#![allow(dead_code)]

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lib::qinglong::Clock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Serve `app` on a free loopback port; returns its base URL.
pub async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Manually advanced clock.
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now_millis: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(now_millis)))
    }

    pub fn set(&self, now_millis: i64) {
        self.0.store(now_millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Mock QingLong panel. Issues tokens "t1", "t2", ... and records every call.
pub struct MockQingLong {
    pub login_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    /// Lifetime in seconds of issued tokens.
    pub expiration: AtomicI64,
    pub envs: Mutex<Vec<Value>>,
    /// When Some, login answers with this body instead of issuing a token.
    pub login_failure: Mutex<Option<Value>>,
    /// When Some, list answers with this status and body.
    pub list_override: Mutex<Option<(u16, Value)>>,
    pub update_response: Mutex<Value>,
    pub update_bodies: Mutex<Vec<Value>>,
    pub login_queries: Mutex<Vec<HashMap<String, String>>>,
    pub authorizations: Mutex<Vec<String>>,
}

impl MockQingLong {
    pub fn new(envs: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            login_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            expiration: AtomicI64::new(100),
            envs: Mutex::new(envs),
            login_failure: Mutex::new(None),
            list_override: Mutex::new(None),
            update_response: Mutex::new(json!({ "code": 200 })),
            update_bodies: Mutex::new(Vec::new()),
            login_queries: Mutex::new(Vec::new()),
            authorizations: Mutex::new(Vec::new()),
        })
    }

    pub async fn serve(self: &Arc<Self>) -> String {
        let app = Router::new()
            .route("/open/auth/token", get(ql_login))
            .route("/open/envs", get(ql_list).put(ql_update))
            .with_state(self.clone());
        spawn(app).await
    }

    pub fn logins(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

fn record_authorization(state: &MockQingLong, headers: &HeaderMap) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    state.authorizations.lock().unwrap().push(auth);
}

async fn ql_login(
    State(state): State<Arc<MockQingLong>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let n = state.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
    state.login_queries.lock().unwrap().push(query);
    if let Some(body) = state.login_failure.lock().unwrap().clone() {
        return Json(body);
    }
    Json(json!({
        "code": 200,
        "data": {
            "token": format!("t{}", n),
            "token_type": "Bearer",
            "expiration": state.expiration.load(Ordering::SeqCst),
        }
    }))
}

async fn ql_list(State(state): State<Arc<MockQingLong>>, headers: HeaderMap) -> Response {
    state.list_calls.fetch_add(1, Ordering::SeqCst);
    record_authorization(&state, &headers);
    if let Some((status, body)) = state.list_override.lock().unwrap().clone() {
        let status = StatusCode::from_u16(status).expect("valid status");
        return (status, Json(body)).into_response();
    }
    let envs = state.envs.lock().unwrap().clone();
    Json(json!({ "code": 200, "data": envs })).into_response()
}

async fn ql_update(
    State(state): State<Arc<MockQingLong>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.update_calls.fetch_add(1, Ordering::SeqCst);
    record_authorization(&state, &headers);
    state.update_bodies.lock().unwrap().push(body);
    Json(state.update_response.lock().unwrap().clone())
}

/// One webhook POST as seen by the mock DingTalk.
#[derive(Debug, Clone)]
pub struct RecordedReply {
    pub access_token: String,
    pub body: Value,
}

/// Mock DingTalk OpenAPI (access token) and session webhook (`/robot/send`).
pub struct MockDingTalk {
    pub token_calls: AtomicUsize,
    pub replies: Mutex<Vec<RecordedReply>>,
    /// When Some, the webhook answers with this status.
    pub webhook_status: Mutex<Option<u16>>,
}

impl MockDingTalk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            token_calls: AtomicUsize::new(0),
            replies: Mutex::new(Vec::new()),
            webhook_status: Mutex::new(None),
        })
    }

    pub async fn serve(self: &Arc<Self>) -> String {
        let app = Router::new()
            .route("/v1.0/oauth2/accessToken", post(dt_access_token))
            .route("/robot/send", post(dt_webhook))
            .with_state(self.clone());
        spawn(app).await
    }

    pub fn replies(&self) -> Vec<RecordedReply> {
        self.replies.lock().unwrap().clone()
    }
}

async fn dt_access_token(
    State(state): State<Arc<MockDingTalk>>,
    Json(body): Json<Value>,
) -> Response {
    state.token_calls.fetch_add(1, Ordering::SeqCst);
    if body.get("appKey").and_then(|v| v.as_str()) != Some("app-key") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({ "accessToken": "robot-token", "expireIn": 7200 })).into_response()
}

async fn dt_webhook(
    State(state): State<Arc<MockDingTalk>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(status) = *state.webhook_status.lock().unwrap() {
        let status = StatusCode::from_u16(status).expect("valid status");
        return (status, "webhook down").into_response();
    }
    let access_token = headers
        .get("x-acs-dingtalk-access-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    state
        .replies
        .lock()
        .unwrap()
        .push(RecordedReply { access_token, body });
    Json(json!({ "errcode": 0, "errmsg": "ok" })).into_response()
}

pub fn env(id: i64, name: &str, value: &str) -> Value {
    json!({ "id": id, "name": name, "value": value, "status": 0 })
}
