//! Configuration type definitions
//!
//! A single YAML file drives a run: where the upstream lives, how hard to
//! retry, how to batch, where outputs go, and which accounts to process.
//! Everything except `service.base_url` and `accounts` has a default, so a
//! minimal file is just those two keys.

use crate::core_types::Account;
use crate::errors::CheckinError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    #[serde(default = "default_user_header")]
    pub user_header: String,
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_login_path")]
    pub login: String,
    #[serde(default = "default_check_in_path")]
    pub check_in: String,
    #[serde(default = "default_self_info_path")]
    pub self_info: String,
    #[serde(default = "default_tokens_path")]
    pub tokens: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            login: default_login_path(),
            check_in: default_check_in_path(),
            self_info: default_self_info_path(),
            tokens: default_tokens_path(),
        }
    }
}

/// Retry policy knobs, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_transient_delay_ms")]
    pub transient_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
            transient_delay_ms: default_transient_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_account_delay")]
    pub account_delay_ms: DelayRange,
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: DelayRange,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            workers: default_workers(),
            account_delay_ms: default_account_delay(),
            batch_delay_ms: default_batch_delay(),
        }
    }
}

/// Inclusive range a pacing delay is drawn from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelayRange {
    pub min: u64,
    pub max: u64,
}

impl DelayRange {
    pub fn fixed(ms: u64) -> Self {
        Self { min: ms, max: ms }
    }

    pub fn sample(&self) -> Duration {
        use rand::Rng;
        if self.max <= self.min {
            return Duration::from_millis(self.min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min..=self.max))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_sessions_path")]
    pub sessions: PathBuf,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    #[serde(default = "default_token_report")]
    pub token_report: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sessions: default_sessions_path(),
            report_dir: default_report_dir(),
            token_report: default_token_report(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
        }
    }
}

fn default_user_header() -> String {
    "VoApi-User".to_string()
}

fn default_session_cookie() -> String {
    "session".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_login_path() -> String {
    "/api/user/login".to_string()
}

fn default_check_in_path() -> String {
    "/api/user/check_in".to_string()
}

fn default_self_info_path() -> String {
    "/api/user/self".to_string()
}

fn default_tokens_path() -> String {
    "/api/token/".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    1_000
}

fn default_transient_delay_ms() -> u64 {
    3_000
}

fn default_batch_size() -> usize {
    5
}

fn default_workers() -> usize {
    2
}

fn default_account_delay() -> DelayRange {
    DelayRange { min: 3_000, max: 5_000 }
}

fn default_batch_delay() -> DelayRange {
    DelayRange { min: 4_000, max: 7_000 }
}

fn default_sessions_path() -> PathBuf {
    PathBuf::from("cookies_only.json")
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_token_report() -> PathBuf {
    PathBuf::from("token.md")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl CheckinConfig {
    pub fn validate(&self) -> Result<(), CheckinError> {
        let base_url = self.service.base_url.trim();
        if base_url.is_empty() {
            return Err(CheckinError::Config("service.base_url must be set".to_string()));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(CheckinError::Config(format!(
                "service.base_url must be an http(s) URL, got '{}'",
                base_url
            )));
        }
        if self.retry.max_retries == 0 {
            return Err(CheckinError::Config("retry.max_retries must be at least 1".to_string()));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(CheckinError::Config(
                "retry.max_delay_ms must not be smaller than retry.base_delay_ms".to_string(),
            ));
        }
        if self.batch.size == 0 {
            return Err(CheckinError::Config("batch.size must be at least 1".to_string()));
        }
        if self.batch.workers == 0 {
            return Err(CheckinError::Config("batch.workers must be at least 1".to_string()));
        }
        for (name, range) in [
            ("batch.account_delay_ms", &self.batch.account_delay_ms),
            ("batch.batch_delay_ms", &self.batch.batch_delay_ms),
        ] {
            if range.min > range.max {
                return Err(CheckinError::Config(format!(
                    "{}: min ({}) is greater than max ({})",
                    name, range.min, range.max
                )));
            }
        }
        for account in &self.accounts {
            if account.identifier.trim().is_empty() {
                return Err(CheckinError::Config("account with empty username".to_string()));
            }
        }
        Ok(())
    }
}
