use crate::client::UpstreamApi;
use crate::config::ServiceConfig;
use crate::core_types::{Account, AccountInfo, Session, TokenRecord};
use crate::errors::CheckinError;
use crate::parser::{ParsedResponse, ResponseParser};
use crate::redact::{redact_cookie, redact_secrets};
use async_trait::async_trait;
use chrono::Local;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const ALREADY_DONE_MARKERS: &[&str] = &["已签到", "今日已", "已存在", "already"];
const SESSION_MARKERS: &[&str] = &["未登录", "无权进行此操作", "not logged in", "unauthorized", "expired"];

/// Status, body and cookies of one exchange, before classification.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub cookies: HashMap<String, String>,
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    config: ServiceConfig,
    parser: Arc<ResponseParser>,
}

impl HttpClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, CheckinError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("checkin/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CheckinError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            config: config.clone(),
            parser: Arc::new(ResponseParser::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn authed(&self, builder: RequestBuilder, session: &Session) -> RequestBuilder {
        let builder = builder.header(
            reqwest::header::COOKIE,
            format!("{}={}", self.config.session_cookie, session.session_token),
        );
        match session.user_id {
            Some(user_id) => builder.header(self.config.user_header.as_str(), user_id.to_string()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<RawResponse, CheckinError> {
        let response = builder.send().await.map_err(CheckinError::from)?;
        Self::read(response).await
    }

    async fn read(response: Response) -> Result<RawResponse, CheckinError> {
        let status = response.status().as_u16();
        let cookies = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let body = response.text().await.map_err(CheckinError::from)?;
        Ok(RawResponse { status, body, cookies })
    }

    fn classify(&self, raw: &RawResponse) -> Result<ParsedResponse, CheckinError> {
        classify_response(&self.parser, raw)
    }
}

/// Map one exchange onto the error taxonomy. `Ok` only for a body that
/// does not report `success: false`.
pub fn classify_response(parser: &ResponseParser, raw: &RawResponse) -> Result<ParsedResponse, CheckinError> {
    match raw.status {
        429 => {
            return Err(CheckinError::RateLimited(format!(
                "HTTP 429: {}",
                short(&raw.body)
            )))
        }
        500..=599 => {
            return Err(CheckinError::Server {
                status: raw.status,
                message: short(&raw.body),
            })
        }
        408 => {
            return Err(CheckinError::Network(format!(
                "HTTP 408 request timeout: {}",
                short(&raw.body)
            )))
        }
        401 | 403 => return Err(CheckinError::SessionExpired(format!("HTTP {}", raw.status))),
        _ => {}
    }

    let parsed = match parser.parse(&raw.body) {
        Ok(parsed) => parsed,
        Err(e) if (400..500).contains(&raw.status) => {
            return Err(CheckinError::Rejected(format!("HTTP {}: {}", raw.status, e)))
        }
        Err(e) => return Err(e),
    };

    let message = parsed.message.clone().unwrap_or_default();
    let lowered = message.to_lowercase();
    if parsed.success == Some(false) || (400..500).contains(&raw.status) {
        if ALREADY_DONE_MARKERS.iter().any(|m| lowered.contains(m)) {
            return Err(CheckinError::AlreadyDone(message));
        }
        if SESSION_MARKERS.iter().any(|m| lowered.contains(m)) {
            return Err(CheckinError::SessionExpired(message));
        }
        let reason = if message.is_empty() {
            format!("HTTP {} with success=false", raw.status)
        } else {
            message
        };
        return Err(CheckinError::Rejected(reason));
    }

    Ok(parsed)
}

fn short(body: &str) -> String {
    let trimmed = body.trim();
    let mut out: String = trimmed.chars().take(120).collect();
    if trimmed.chars().count() > 120 {
        out.push_str("...");
    }
    out
}

#[async_trait]
impl UpstreamApi for HttpClient {
    async fn login(&self, account: &Account) -> Result<Session, CheckinError> {
        let url = self.url(&self.config.endpoints.login);
        log::debug!("POST {} for {}", url, account.identifier);

        let raw = self
            .send(self.client.post(&url).json(&json!({
                "username": account.identifier,
                "password": account.secret,
            })))
            .await?;
        log::debug!(
            "{}: login answered HTTP {}: {}",
            account.identifier,
            raw.status,
            redact_cookie(&redact_secrets(&short(&raw.body)), &self.config.session_cookie)
        );

        let parsed = match self.classify(&raw) {
            // a 401 on login means the credentials were refused, not a stale session
            Err(CheckinError::SessionExpired(reason)) => return Err(CheckinError::Rejected(reason)),
            other => other?,
        };

        let token = raw
            .cookies
            .get(&self.config.session_cookie)
            .cloned()
            .ok_or_else(|| {
                CheckinError::Parse(format!(
                    "login succeeded but no '{}' cookie was set",
                    self.config.session_cookie
                ))
            })?;

        if parsed.user_id.is_none() {
            log::warn!("{}: login response carried no user id", account.identifier);
        }

        Ok(Session {
            identifier: account.identifier.clone(),
            session_token: token,
            user_id: parsed.user_id,
            acquired_at: Local::now(),
        })
    }

    async fn check_in(&self, session: &Session) -> Result<String, CheckinError> {
        let url = self.url(&self.config.endpoints.check_in);
        let raw = self.send(self.authed(self.client.post(&url), session)).await?;
        let parsed = self.classify(&raw)?;
        Ok(parsed.message_or("checked in").to_string())
    }

    async fn account_info(&self, session: &Session) -> Result<AccountInfo, CheckinError> {
        let url = self.url(&self.config.endpoints.self_info);
        let raw = self.send(self.authed(self.client.get(&url), session)).await?;
        let parsed = self.classify(&raw)?;
        let data = parsed
            .data
            .ok_or_else(|| CheckinError::Parse("account info response has no data".to_string()))?;
        Ok(serde_json::from_value(data)?)
    }

    async fn list_tokens(&self, session: &Session) -> Result<Vec<TokenRecord>, CheckinError> {
        let url = self.url(&self.config.endpoints.tokens);
        let raw = self
            .send(
                self.authed(self.client.get(&url), session)
                    .query(&[("p", "1"), ("size", "10")]),
            )
            .await?;
        let parsed = self.classify(&raw)?;

        // either {"data": [...]} or {"data": {"records": [...]}}
        let records = match parsed.data {
            Some(Value::Array(items)) => Value::Array(items),
            Some(Value::Object(mut map)) => map.remove("records").unwrap_or(Value::Array(Vec::new())),
            _ => Value::Array(Vec::new()),
        };
        if records.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(records)?)
    }

    async fn create_token(&self, session: &Session, name: &str) -> Result<(), CheckinError> {
        let url = self.url(&self.config.endpoints.tokens);
        let body = json!({
            "name": name,
            "remain_quota": 500_000_000,
            "expired_time": -1,
            "unlimited_quota": true,
            "model_limits_enabled": false,
            "model_limits": "",
            "allow_ips": "",
            "group": "",
        });
        let raw = self.send(self.authed(self.client.post(&url), session).json(&body)).await?;
        self.classify(&raw)?;
        Ok(())
    }
}
