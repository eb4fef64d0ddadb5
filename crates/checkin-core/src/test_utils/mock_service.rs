// src/test_utils/mock_service.rs
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Deserialize, Debug, Clone)]
struct LoginPayload {
    username: String,
    password: String,
}

#[derive(Default)]
struct ServiceData {
    users: HashMap<String, (i64, String)>,
    sessions: HashMap<String, String>,
    checked_in: HashSet<String>,
    tokens: HashMap<String, Vec<Value>>,
    /// Statuses returned, one per request, before normal handling resumes.
    faults: VecDeque<u16>,
    requests: Vec<String>,
    issued: usize,
}

#[derive(Clone, Default)]
struct MockState {
    data: Arc<Mutex<ServiceData>>,
}

impl MockState {
    /// Record the request and pop a scripted fault, if any.
    fn enter(&self, route: &str) -> Option<Response> {
        let mut data = self.data.lock().unwrap();
        data.requests.push(route.to_string());
        let status = data.faults.pop_front()?;
        log::debug!("Mock service injecting HTTP {} on {}", status, route);
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Some((status, "scripted failure").into_response())
    }

    /// Resolve the session cookie and user header to a username.
    fn user(&self, headers: &HeaderMap) -> Option<String> {
        let cookie = headers.get(header::COOKIE)?.to_str().ok()?;
        let token = cookie
            .split(';')
            .filter_map(|part| part.trim().strip_prefix("session="))
            .next()?;
        let data = self.data.lock().unwrap();
        let username = data.sessions.get(token)?.clone();
        let (user_id, _) = data.users.get(&username)?;
        let header_id = headers.get("VoApi-User")?.to_str().ok()?;
        (header_id == user_id.to_string()).then_some(username)
    }
}

fn not_logged_in() -> Response {
    Json(json!({"success": false, "message": "未登录且未提供 access token"})).into_response()
}

async fn login_handler(State(state): State<MockState>, Json(payload): Json<LoginPayload>) -> Response {
    if let Some(fault) = state.enter("login") {
        return fault;
    }
    let mut data = state.data.lock().unwrap();
    let user_id = match data.users.get(&payload.username) {
        Some((user_id, password)) if *password == payload.password => *user_id,
        _ => {
            return Json(json!({"success": false, "message": "用户名或密码错误，或用户已被封禁"}))
                .into_response()
        }
    };
    data.issued += 1;
    let token = format!("tok-{}-{}", payload.username, data.issued);
    data.sessions.insert(token.clone(), payload.username.clone());

    let mut response = Json(json!({
        "success": true,
        "message": "",
        "data": {"id": user_id, "username": payload.username}
    }))
    .into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("session={}; Path=/; HttpOnly", token)) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

async fn check_in_handler(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Some(fault) = state.enter("check_in") {
        return fault;
    }
    let Some(username) = state.user(&headers) else {
        return not_logged_in();
    };
    let mut data = state.data.lock().unwrap();
    if !data.checked_in.insert(username) {
        return Json(json!({"success": false, "message": "今日已签到"})).into_response();
    }
    Json(json!({"success": true, "message": "签到成功", "data": {"quota": 500000}})).into_response()
}

async fn self_handler(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Some(fault) = state.enter("self") {
        return fault;
    }
    if state.user(&headers).is_none() {
        return not_logged_in();
    }
    Json(json!({
        "success": true,
        "message": "",
        "data": {"quota": 1_000_000, "used_quota": 2_500, "request_count": 4}
    }))
    .into_response()
}

async fn list_tokens_handler(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Some(fault) = state.enter("list_tokens") {
        return fault;
    }
    let Some(username) = state.user(&headers) else {
        return not_logged_in();
    };
    let data = state.data.lock().unwrap();
    let tokens = data.tokens.get(&username).cloned().unwrap_or_default();
    Json(json!({"success": true, "message": "", "data": tokens})).into_response()
}

async fn create_token_handler(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    if let Some(fault) = state.enter("create_token") {
        return fault;
    }
    let Some(username) = state.user(&headers) else {
        return not_logged_in();
    };
    let mut data = state.data.lock().unwrap();
    let tokens = data.tokens.entry(username.clone()).or_default();
    let index = tokens.len();
    tokens.push(json!({
        "name": payload.get("name").cloned().unwrap_or(Value::Null),
        "key": format!("{}key{:04}", username, index),
        "status": 1,
        "used_quota": 0,
        "remain_quota": payload.get("remain_quota").cloned().unwrap_or(json!(0)),
        "unlimited_quota": payload.get("unlimited_quota").cloned().unwrap_or(json!(false)),
        "created_time": 1_700_000_000,
        "expired_time": -1
    }));
    Json(json!({"success": true, "message": ""})).into_response()
}

/// In-process stand-in for the upstream check-in service.
pub struct MockService {
    addr: SocketAddr,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
    state: MockState,
}

impl MockService {
    /// Start on an ephemeral port with the given `(username, password)` users.
    pub async fn start(users: &[(&str, &str)]) -> Self {
        let state = MockState::default();
        {
            let mut data = state.data.lock().unwrap();
            for (index, (username, password)) in users.iter().enumerate() {
                data.users
                    .insert(username.to_string(), (1000 + index as i64, password.to_string()));
            }
        }

        let app = Router::new()
            .route("/api/user/login", post(login_handler))
            .route("/api/user/check_in", post(check_in_handler))
            .route("/api/user/self", get(self_handler))
            .route("/api/token/", get(list_tokens_handler).post(create_token_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap_or_else(|e| {
            panic!("Failed to bind mock service to 127.0.0.1:0. Error: {}", e);
        });
        let addr = listener.local_addr().unwrap();
        log::info!("Mock service listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap_or_else(|e| log::error!("Mock service error: {}", e));
        });

        MockService {
            addr,
            shutdown_tx,
            state,
        }
    }

    pub fn address(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The next `statuses.len()` requests, whatever the route, answer with
    /// these statuses instead.
    pub fn inject_faults(&self, statuses: &[u16]) {
        self.state.data.lock().unwrap().faults.extend(statuses.iter().copied());
    }

    pub fn mark_checked_in(&self, username: &str) {
        self.state.data.lock().unwrap().checked_in.insert(username.to_string());
    }

    /// Forget every issued session, as a server-side logout would.
    pub fn expire_sessions(&self) {
        self.state.data.lock().unwrap().sessions.clear();
    }

    pub fn request_count(&self, route: &str) -> usize {
        self.state
            .data
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.as_str() == route)
            .count()
    }

    pub async fn shutdown(self) {
        if self.shutdown_tx.send(()).is_err() {
            log::warn!("Mock service shutdown signal already sent or receiver dropped.");
        }
    }
}
