//! Full runs against the in-process mock service over real HTTP.

use crate::client::HttpClient;
use crate::config::{CheckinConfig, ConfigLoader};
use crate::core_types::Outcome;
use crate::retry::tests::RecordingPause;
use crate::runs::{Runner, TokenOptions};
use crate::session_store::SessionStore;
use crate::test_utils::MockService;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const ACCOUNT_DELAY_MS: u64 = 7;
const BATCH_DELAY_MS: u64 = 11;

fn users(n: usize) -> Vec<(String, String)> {
    (0..n).map(|i| (format!("user{:02}", i), format!("pw{}", i))).collect()
}

fn config(base_url: &str, dir: &Path, users: &[(String, String)]) -> CheckinConfig {
    let mut yaml = format!(
        r#"
service:
  base_url: {base_url}
  timeout_secs: 5
retry:
  max_retries: 3
  base_delay_ms: 100
  max_delay_ms: 1000
  jitter_ms: 0
  transient_delay_ms: 50
batch:
  size: 5
  workers: 2
  account_delay_ms: {{ min: {ACCOUNT_DELAY_MS}, max: {ACCOUNT_DELAY_MS} }}
  batch_delay_ms: {{ min: {BATCH_DELAY_MS}, max: {BATCH_DELAY_MS} }}
paths:
  sessions: {sessions}
  report_dir: {reports}
  token_report: {tokens}
accounts:
"#,
        sessions = dir.join("cookies_only.json").display(),
        reports = dir.join("logs").display(),
        tokens = dir.join("token.md").display(),
    );
    for (username, password) in users {
        yaml.push_str(&format!("  - username: {}\n    password: {}\n", username, password));
    }
    ConfigLoader::from_str_with_env(&yaml, |_| None).unwrap()
}

async fn start(n: usize) -> (MockService, Vec<(String, String)>) {
    let users = users(n);
    let borrowed: Vec<(&str, &str)> = users.iter().map(|(u, p)| (u.as_str(), p.as_str())).collect();
    (MockService::start(&borrowed).await, users)
}

fn runner(config: CheckinConfig, pause: Arc<RecordingPause>) -> Runner {
    let client = HttpClient::new(&config.service).unwrap();
    Runner::new(config, Arc::new(client)).with_pause(pause)
}

#[tokio::test]
async fn test_seven_accounts_two_batches() {
    let (service, users) = start(7).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&service.address(), dir.path(), &users);
    service.mark_checked_in("user03");
    // the first two requests fail; both are retried
    service.inject_faults(&[429, 500]);

    let pause = Arc::new(RecordingPause::default());
    let outcome = runner(config, pause.clone()).check_in().await.unwrap();

    assert_eq!(outcome.results.len(), 7);
    assert_eq!(outcome.summary.total, 7);
    assert_eq!(outcome.summary.already_done, 1);
    assert_eq!(outcome.summary.succeeded, 6);
    assert_eq!(outcome.summary.failed, 0);
    assert_eq!(outcome.results.iter().map(|r| r.retry_count).sum::<u32>(), 2);
    let user03 = outcome.results.iter().find(|r| r.identifier == "user03").unwrap();
    assert_eq!(user03.outcome, Outcome::AlreadyDone);

    // batches of 5 and 2 pace 4 + 1 gaps between accounts
    let pauses = pause.pauses.lock().unwrap().clone();
    let pacing = pauses
        .iter()
        .filter(|d| **d == Duration::from_millis(ACCOUNT_DELAY_MS))
        .count();
    assert_eq!(pacing, 5);
    // two workers take both batches at once, nothing is left to wait
    assert!(!pauses.contains(&Duration::from_millis(BATCH_DELAY_MS)));
    assert!(pauses.contains(&Duration::from_millis(100)));
    assert!(pauses.contains(&Duration::from_millis(50)));

    let report = std::fs::read_to_string(&outcome.report_path).unwrap();
    let rows: Vec<&str> = report.lines().filter(|l| l.starts_with("| user")).collect();
    assert_eq!(rows.len(), 7);
    assert!(rows[0].starts_with("| user00 |"));
    assert!(rows[6].starts_with("| user06 |"));

    let summary = report
        .lines()
        .find(|l| l.starts_with("**Summary**"))
        .unwrap();
    let counts: Vec<usize> = summary
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().unwrap())
        .collect();
    assert_eq!(counts.len(), 4);
    assert_eq!(counts[0], 7);
    assert_eq!(counts[1] + counts[2] + counts[3], 7);

    service.shutdown().await;
}

#[tokio::test]
async fn test_third_batch_waits_for_inter_batch_delay() {
    let (service, users) = start(11).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&service.address(), dir.path(), &users);

    let pause = Arc::new(RecordingPause::default());
    let outcome = runner(config, pause.clone()).login().await.unwrap();
    assert_eq!(outcome.summary.succeeded, 11);

    let pauses = pause.pauses.lock().unwrap().clone();
    let count = |ms: u64| pauses.iter().filter(|d| **d == Duration::from_millis(ms)).count();
    assert_eq!(count(BATCH_DELAY_MS), 1);
    assert_eq!(count(ACCOUNT_DELAY_MS), 8);
    assert_eq!(pauses.len(), 9);
    service.shutdown().await;
}

#[tokio::test]
async fn test_stored_sessions_are_reused_then_refreshed() {
    let (service, users) = start(3).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&service.address(), dir.path(), &users);
    let sessions_path = config.paths.sessions.clone();
    let pause = Arc::new(RecordingPause::default());

    let login = runner(config.clone(), pause.clone()).login().await.unwrap();
    assert_eq!(login.summary.succeeded, 3);
    assert_eq!(service.request_count("login"), 3);
    let first = SessionStore::load(&sessions_path).unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first.get("user00").unwrap().user_id, Some(1000));

    // sessions still valid: no extra logins
    let run = runner(config.clone(), pause.clone()).check_in().await.unwrap();
    assert_eq!(run.summary.succeeded, 3);
    assert_eq!(service.request_count("login"), 3);

    // server forgets them: one re-login per account, already done today
    service.expire_sessions();
    let rerun = runner(config, pause).check_in().await.unwrap();
    assert_eq!(rerun.summary.already_done, 3);
    assert_eq!(service.request_count("login"), 6);

    let refreshed = SessionStore::load(&sessions_path).unwrap();
    assert_ne!(
        refreshed.get("user01").unwrap().session_token,
        first.get("user01").unwrap().session_token
    );

    service.shutdown().await;
}

#[tokio::test]
async fn test_wrong_password_is_not_retried() {
    let (service, mut users) = start(2).await;
    users[1].1 = "not-the-password".to_string();
    let dir = tempfile::tempdir().unwrap();
    let config = config(&service.address(), dir.path(), &users);

    let outcome = runner(config, Arc::new(RecordingPause::default()))
        .login()
        .await
        .unwrap();

    assert_eq!(outcome.summary.failed, 1);
    let failed = outcome.results.iter().find(|r| r.is_failure()).unwrap();
    assert_eq!(failed.identifier, "user01");
    assert_eq!(failed.retry_count, 0);
    assert_eq!(service.request_count("login"), 2);

    service.shutdown().await;
}

#[tokio::test]
async fn test_token_report_over_http() {
    let (service, users) = start(2).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&service.address(), dir.path(), &users);
    let token_report = config.paths.token_report.clone();
    let pause = Arc::new(RecordingPause::default());

    runner(config.clone(), pause.clone()).login().await.unwrap();
    let outcome = runner(config, pause)
        .tokens(TokenOptions {
            create_missing: true,
            reveal_keys: true,
        })
        .await
        .unwrap();

    assert_eq!(outcome.summary.succeeded, 2);
    assert_eq!(service.request_count("create_token"), 2);
    let text = std::fs::read_to_string(token_report).unwrap();
    assert!(text.contains("sk-user00key0000"));
    assert!(text.contains("| unlimited | 2023-"));

    service.shutdown().await;
}
