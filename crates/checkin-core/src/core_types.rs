//! Core type definitions shared by the client, the runner and the reports
//!
//! Accounts come from the operator's configuration and never change during a
//! run. Sessions are the cookie plus user id handed out by the upstream on
//! login. Operation results are what the batch runner produces, one per
//! account, and what the reports flatten into table rows.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Account {
    #[serde(rename = "username")]
    pub identifier: String,
    #[serde(rename = "password")]
    pub secret: String,
}

impl Account {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Session {
    pub identifier: String,
    pub session_token: String,
    pub user_id: Option<i64>,
    pub acquired_at: DateTime<Local>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    AlreadyDone,
    Failure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Outcome::Success => "success",
            Outcome::AlreadyDone => "already done",
            Outcome::Failure => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OperationResult {
    pub identifier: String,
    pub outcome: Outcome,
    pub message: String,
    /// Attempts beyond the first.
    pub retry_count: u32,
}

impl OperationResult {
    pub fn success(identifier: impl Into<String>, message: impl Into<String>, retry_count: u32) -> Self {
        Self {
            identifier: identifier.into(),
            outcome: Outcome::Success,
            message: message.into(),
            retry_count,
        }
    }

    pub fn already_done(identifier: impl Into<String>, message: impl Into<String>, retry_count: u32) -> Self {
        Self {
            identifier: identifier.into(),
            outcome: Outcome::AlreadyDone,
            message: message.into(),
            retry_count,
        }
    }

    pub fn failure(identifier: impl Into<String>, message: impl Into<String>, retry_count: u32) -> Self {
        Self {
            identifier: identifier.into(),
            outcome: Outcome::Failure,
            message: message.into(),
            retry_count,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Failure
    }
}

/// Quota figures reported by the upstream's self-info endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct AccountInfo {
    #[serde(default)]
    pub quota: i64,
    #[serde(default)]
    pub used_quota: i64,
    #[serde(default)]
    pub request_count: i64,
}

/// One API key as listed by the upstream token endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TokenRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub used_quota: f64,
    #[serde(default)]
    pub remain_quota: i64,
    #[serde(default)]
    pub unlimited_quota: bool,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default = "never_expires")]
    pub expired_time: i64,
}

fn never_expires() -> i64 {
    -1
}

impl TokenRecord {
    pub fn is_enabled(&self) -> bool {
        self.status == 1
    }

    pub fn never_expires(&self) -> bool {
        self.expired_time == -1
    }
}
