//! Login, check-in and token runs
//!
//! Each run feeds the configured accounts through the [`BatchScheduler`];
//! every upstream call inside an account goes through the shared
//! [`RetryExecutor`]. Workers only return values. The coordinator folds
//! refreshed sessions into the [`SessionStore`] after every batch, writes a
//! snapshot, and produces the report once all batches are done.

use crate::client::UpstreamApi;
use crate::config::CheckinConfig;
use crate::core_types::{Account, AccountInfo, OperationResult, Session, TokenRecord};
use crate::errors::CheckinError;
use crate::report::{write_token_report, RunReport, RunSummary, TokenRow};
use crate::retry::{Pause, RetryExecutor, RetryPolicy};
use crate::scheduler::{BatchOutput, BatchProgress, BatchScheduler, SchedulerSettings};
use crate::session_store::SessionStore;
use chrono::Local;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub result: OperationResult,
    pub session: Option<Session>,
}

#[derive(Debug, Clone)]
pub struct CheckinResult {
    pub result: OperationResult,
    /// Set when the account had to log in during the check-in.
    pub refreshed: Option<Session>,
}

#[derive(Debug, Clone)]
pub struct TokenResult {
    pub result: OperationResult,
    pub tokens: Vec<TokenRecord>,
    pub refreshed: Option<Session>,
}

impl BatchOutput for LoginResult {
    fn identifier(&self) -> &str {
        &self.result.identifier
    }

    fn aborted(account: &Account, reason: &str) -> Self {
        Self {
            result: <OperationResult as BatchOutput>::aborted(account, reason),
            session: None,
        }
    }
}

impl BatchOutput for CheckinResult {
    fn identifier(&self) -> &str {
        &self.result.identifier
    }

    fn aborted(account: &Account, reason: &str) -> Self {
        Self {
            result: <OperationResult as BatchOutput>::aborted(account, reason),
            refreshed: None,
        }
    }
}

impl BatchOutput for TokenResult {
    fn identifier(&self) -> &str {
        &self.result.identifier
    }

    fn aborted(account: &Account, reason: &str) -> Self {
        Self {
            result: <OperationResult as BatchOutput>::aborted(account, reason),
            tokens: Vec::new(),
            refreshed: None,
        }
    }
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub results: Vec<OperationResult>,
    pub summary: RunSummary,
    pub report_path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenOptions {
    pub create_missing: bool,
    pub reveal_keys: bool,
}

pub struct Runner {
    config: CheckinConfig,
    api: Arc<dyn UpstreamApi>,
    executor: RetryExecutor,
    scheduler: BatchScheduler,
}

impl Runner {
    pub fn new(config: CheckinConfig, api: Arc<dyn UpstreamApi>) -> Self {
        let executor = RetryExecutor::new(RetryPolicy::from(&config.retry));
        let scheduler = BatchScheduler::new(SchedulerSettings::from(&config.batch));
        Self {
            config,
            api,
            executor,
            scheduler,
        }
    }

    /// Replace every sleep of the run, retries and pacing alike.
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.executor = self.executor.with_pause(pause.clone());
        self.scheduler = self.scheduler.with_pause(pause);
        self
    }

    pub fn config(&self) -> &CheckinConfig {
        &self.config
    }

    fn accounts(&self) -> Result<Vec<Account>, CheckinError> {
        if self.config.accounts.is_empty() {
            return Err(CheckinError::Validation(
                "No accounts configured; add them to the config file or set CHECKIN_ACCOUNTS".to_string(),
            ));
        }
        Ok(self.config.accounts.clone())
    }

    fn account_order(&self) -> Vec<String> {
        self.config.accounts.iter().map(|a| a.identifier.clone()).collect()
    }

    /// Log every account in and store the sessions.
    pub async fn login(&self) -> Result<RunOutcome, CheckinError> {
        let started_at = Local::now();
        let accounts = self.accounts()?;
        let mut store = SessionStore::load(&self.config.paths.sessions)?;
        log::info!("Login run started for {} account(s)", accounts.len());

        let api = self.api.clone();
        let executor = self.executor.clone();
        let results = self
            .scheduler
            .run(
                accounts,
                move |account: Account| {
                    let api = api.clone();
                    let executor = executor.clone();
                    async move {
                        let mut work = AccountWork::new(api.as_ref(), &executor, &account);
                        let outcome = work.login().await;
                        let retries = work.retries;
                        match outcome {
                            Ok(session) => LoginResult {
                                result: OperationResult::success(
                                    &account.identifier,
                                    describe_login(&session),
                                    retries,
                                ),
                                session: Some(session),
                            },
                            Err(e) => LoginResult {
                                result: OperationResult::failure(&account.identifier, e.to_string(), retries),
                                session: None,
                            },
                        }
                    }
                },
                |progress: BatchProgress<'_, LoginResult>| {
                    for item in progress.results {
                        if let Some(session) = &item.session {
                            store.upsert(session.clone());
                        }
                    }
                    snapshot(&store, &progress);
                },
            )
            .await;

        store.save()?;
        let results: Vec<OperationResult> = results.into_iter().map(|r| r.result).collect();
        self.finish("Login", started_at, results)
    }

    /// Check every account in, logging in where no usable session exists.
    pub async fn check_in(&self) -> Result<RunOutcome, CheckinError> {
        let started_at = Local::now();
        let accounts = self.accounts()?;
        let mut store = SessionStore::load(&self.config.paths.sessions)?;
        log::info!(
            "Check-in run started for {} account(s), {} stored session(s)",
            accounts.len(),
            store.len()
        );

        let stored: Arc<HashMap<String, Session>> =
            Arc::new(store.sessions().map(|s| (s.identifier.clone(), s)).collect());
        let api = self.api.clone();
        let executor = self.executor.clone();
        let results = self
            .scheduler
            .run(
                accounts,
                move |account: Account| {
                    let api = api.clone();
                    let executor = executor.clone();
                    let session = stored.get(&account.identifier).cloned();
                    async move {
                        let mut work = AccountWork::new(api.as_ref(), &executor, &account);
                        check_in_account(&mut work, session).await
                    }
                },
                |progress: BatchProgress<'_, CheckinResult>| {
                    for item in progress.results {
                        if let Some(session) = &item.refreshed {
                            store.upsert(session.clone());
                        }
                    }
                    snapshot(&store, &progress);
                },
            )
            .await;

        store.save()?;
        let results: Vec<OperationResult> = results.into_iter().map(|r| r.result).collect();
        self.finish("Check-in", started_at, results)
    }

    /// List API tokens for every stored session and write the token report.
    pub async fn tokens(&self, options: TokenOptions) -> Result<RunOutcome, CheckinError> {
        let started_at = Local::now();
        let mut store = SessionStore::load(&self.config.paths.sessions)?;
        if store.is_empty() {
            return Err(CheckinError::Validation(format!(
                "No sessions in {}; run a login first",
                store.path().display()
            )));
        }

        // configured order first, then sessions for accounts no longer configured
        let configured: HashSet<&str> =
            self.config.accounts.iter().map(|a| a.identifier.as_str()).collect();
        let mut accounts: Vec<Account> = self
            .config
            .accounts
            .iter()
            .filter(|a| store.get(&a.identifier).is_some())
            .cloned()
            .collect();
        for session in store.sessions() {
            if !configured.contains(session.identifier.as_str()) {
                accounts.push(Account::new(session.identifier, ""));
            }
        }
        log::info!("Token run started for {} session(s)", accounts.len());

        let stored: Arc<HashMap<String, Session>> =
            Arc::new(store.sessions().map(|s| (s.identifier.clone(), s)).collect());
        let api = self.api.clone();
        let executor = self.executor.clone();
        let create_missing = options.create_missing;
        let mut rows: Vec<TokenRow> = Vec::new();
        let results = self
            .scheduler
            .run(
                accounts,
                move |account: Account| {
                    let api = api.clone();
                    let executor = executor.clone();
                    let session = stored.get(&account.identifier).cloned();
                    async move {
                        let mut work = AccountWork::new(api.as_ref(), &executor, &account);
                        tokens_for_account(&mut work, session, create_missing).await
                    }
                },
                |progress: BatchProgress<'_, TokenResult>| {
                    for item in progress.results {
                        if let Some(session) = &item.refreshed {
                            store.upsert(session.clone());
                        }
                        rows.extend(item.tokens.iter().cloned().map(|token| TokenRow {
                            identifier: item.result.identifier.clone(),
                            token,
                        }));
                    }
                    snapshot(&store, &progress);
                },
            )
            .await;

        store.save()?;
        let order = self.account_order();
        rows.sort_by_key(|row| order.iter().position(|id| *id == row.identifier).unwrap_or(usize::MAX));
        write_token_report(&self.config.paths.token_report, &rows, options.reveal_keys)?;
        log::info!(
            "Wrote {} token(s) to {}",
            rows.len(),
            self.config.paths.token_report.display()
        );

        let results: Vec<OperationResult> = results.into_iter().map(|r| r.result).collect();
        self.finish("Tokens", started_at, results)
    }

    fn finish(
        &self,
        title: &str,
        started_at: chrono::DateTime<Local>,
        results: Vec<OperationResult>,
    ) -> Result<RunOutcome, CheckinError> {
        for failed in results.iter().filter(|r| r.is_failure()) {
            log::error!("{}: {}", failed.identifier, failed.message);
        }

        let report = RunReport {
            title,
            started_at,
            results: &results,
        };
        let report_path = report.append_to(&self.config.paths.report_dir, &self.account_order())?;
        let summary = RunSummary::from_results(&results);
        log::info!("{} finished. {}", title, summary.line());
        log::info!("Report appended to {}", report_path.display());

        Ok(RunOutcome {
            results,
            summary,
            report_path,
        })
    }
}

fn snapshot<R>(store: &SessionStore, progress: &BatchProgress<'_, R>) {
    log::info!(
        "Batch {}/{} finished, {}/{} account(s) done",
        progress.batch_index + 1,
        progress.batch_count,
        progress.completed,
        progress.total
    );
    if let Err(e) = store.save() {
        log::error!("Failed to write session snapshot: {}", e);
    }
}

/// Upstream calls for one account, each wrapped by the retry executor.
/// Retries accumulate across calls.
struct AccountWork<'a> {
    api: &'a dyn UpstreamApi,
    executor: &'a RetryExecutor,
    account: &'a Account,
    retries: u32,
}

impl<'a> AccountWork<'a> {
    fn new(api: &'a dyn UpstreamApi, executor: &'a RetryExecutor, account: &'a Account) -> Self {
        Self {
            api,
            executor,
            account,
            retries: 0,
        }
    }

    fn id(&self) -> &str {
        &self.account.identifier
    }

    fn can_login(&self) -> bool {
        !self.account.secret.is_empty()
    }

    async fn login(&mut self) -> Result<Session, CheckinError> {
        if !self.can_login() {
            return Err(CheckinError::Validation(format!(
                "no password configured for {}",
                self.account.identifier
            )));
        }
        let (api, account) = (self.api, self.account);
        let report = self
            .executor
            .run(&format!("{} login", account.identifier), |_| api.login(account))
            .await;
        self.retries += report.retry_count();
        report.result
    }

    async fn check_in(&mut self, session: &Session) -> Result<String, CheckinError> {
        let api = self.api;
        let report = self
            .executor
            .run(&format!("{} check-in", self.id()), |_| api.check_in(session))
            .await;
        self.retries += report.retry_count();
        report.result
    }

    async fn list_tokens(&mut self, session: &Session) -> Result<Vec<TokenRecord>, CheckinError> {
        let api = self.api;
        let report = self
            .executor
            .run(&format!("{} tokens", self.id()), |_| api.list_tokens(session))
            .await;
        self.retries += report.retry_count();
        report.result
    }

    async fn create_token(&mut self, session: &Session) -> Result<(), CheckinError> {
        let (api, account) = (self.api, self.account);
        let name = account.identifier.as_str();
        let report = self
            .executor
            .run(&format!("{} create token", name), |_| api.create_token(session, name))
            .await;
        self.retries += report.retry_count();
        report.result
    }

    /// Only worth a single attempt; the check-in already happened.
    async fn account_info(&self, session: &Session) -> Option<AccountInfo> {
        match self.api.account_info(session).await {
            Ok(info) => Some(info),
            Err(e) => {
                log::debug!("{}: account info unavailable: {}", self.id(), e);
                None
            }
        }
    }

    /// Stored session if there is one, otherwise a fresh login.
    async fn session(&mut self, stored: Option<Session>) -> Result<(Session, bool), CheckinError> {
        match stored {
            Some(session) => Ok((session, false)),
            None => {
                log::info!("{}: no stored session, logging in", self.id());
                self.login().await.map(|session| (session, true))
            }
        }
    }
}

async fn check_in_account(work: &mut AccountWork<'_>, stored: Option<Session>) -> CheckinResult {
    let identifier = work.id().to_string();
    let (mut session, mut refreshed) = match work.session(stored).await {
        Ok(found) => found,
        Err(e) => {
            return CheckinResult {
                result: OperationResult::failure(&identifier, format!("login failed: {}", e), work.retries),
                refreshed: None,
            }
        }
    };

    let mut outcome = work.check_in(&session).await;
    if matches!(outcome, Err(CheckinError::SessionExpired(_))) && !refreshed && work.can_login() {
        log::warn!("{}: stored session was rejected, logging in again", identifier);
        match work.login().await {
            Ok(fresh) => {
                session = fresh;
                refreshed = true;
                outcome = work.check_in(&session).await;
            }
            Err(e) => {
                return CheckinResult {
                    result: OperationResult::failure(
                        &identifier,
                        format!("session rejected and login failed: {}", e),
                        work.retries,
                    ),
                    refreshed: None,
                }
            }
        }
    }

    let mut result = match outcome {
        Ok(message) => {
            log::info!("{}: checked in ({})", identifier, message);
            OperationResult::success(&identifier, message, work.retries)
        }
        Err(CheckinError::AlreadyDone(message)) => {
            log::info!("{}: already checked in today", identifier);
            OperationResult::already_done(&identifier, message, work.retries)
        }
        Err(e) => OperationResult::failure(&identifier, e.to_string(), work.retries),
    };

    if !result.is_failure() {
        if let Some(info) = work.account_info(&session).await {
            result.message = format!("{}; {}", result.message, describe_info(&info));
        }
    }

    CheckinResult {
        result,
        refreshed: refreshed.then_some(session),
    }
}

async fn tokens_for_account(
    work: &mut AccountWork<'_>,
    stored: Option<Session>,
    create_missing: bool,
) -> TokenResult {
    let identifier = work.id().to_string();
    let failed = |message: String, retries: u32, refreshed: Option<Session>| TokenResult {
        result: OperationResult::failure(&identifier, message, retries),
        tokens: Vec::new(),
        refreshed,
    };

    let (mut session, mut refreshed) = match work.session(stored).await {
        Ok(found) => found,
        Err(e) => return failed(format!("login failed: {}", e), work.retries, None),
    };

    let mut listed = work.list_tokens(&session).await;
    if matches!(listed, Err(CheckinError::SessionExpired(_))) && !refreshed && work.can_login() {
        log::warn!("{}: stored session was rejected, logging in again", identifier);
        match work.login().await {
            Ok(fresh) => {
                session = fresh;
                refreshed = true;
                listed = work.list_tokens(&session).await;
            }
            Err(e) => {
                return failed(
                    format!("session rejected and login failed: {}", e),
                    work.retries,
                    None,
                )
            }
        }
    }
    let refreshed = refreshed.then(|| session.clone());

    let mut tokens = match listed {
        Ok(tokens) => tokens,
        Err(e) => return failed(e.to_string(), work.retries, refreshed),
    };

    let mut created = false;
    if tokens.is_empty() && create_missing {
        log::info!("{}: no tokens, creating one", identifier);
        if let Err(e) = work.create_token(&session).await {
            return failed(format!("token creation failed: {}", e), work.retries, refreshed);
        }
        created = true;
        tokens = match work.list_tokens(&session).await {
            Ok(tokens) => tokens,
            Err(e) => return failed(e.to_string(), work.retries, refreshed),
        };
    }

    let message = if created {
        format!("created a token, {} token(s)", tokens.len())
    } else {
        format!("{} token(s)", tokens.len())
    };
    TokenResult {
        result: OperationResult::success(&identifier, message, work.retries),
        tokens,
        refreshed,
    }
}

fn describe_login(session: &Session) -> String {
    match session.user_id {
        Some(user_id) => format!("logged in as user {}", user_id),
        None => "logged in".to_string(),
    }
}

fn describe_info(info: &AccountInfo) -> String {
    format!(
        "quota {}, used {}, {} request(s)",
        info.quota, info.used_quota, info.request_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigLoader, DelayRange};
    use crate::retry::tests::RecordingPause;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted upstream: per-identifier behaviour, call log for assertions.
    #[derive(Default)]
    struct FakeApi {
        calls: Mutex<Vec<String>>,
        rate_limited_logins: Mutex<HashMap<String, u32>>,
        expired_tokens: Vec<String>,
        checked_in: Vec<String>,
        tokens: Mutex<HashMap<String, Vec<TokenRecord>>>,
    }

    impl FakeApi {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UpstreamApi for FakeApi {
        async fn login(&self, account: &Account) -> Result<Session, CheckinError> {
            self.record(format!("login {}", account.identifier));
            if account.secret == "wrong" {
                return Err(CheckinError::Rejected("用户名或密码错误".into()));
            }
            if let Some(left) = self.rate_limited_logins.lock().unwrap().get_mut(&account.identifier) {
                if *left > 0 {
                    *left -= 1;
                    return Err(CheckinError::RateLimited("HTTP 429".into()));
                }
            }
            Ok(Session {
                identifier: account.identifier.clone(),
                session_token: format!("fresh-{}", account.identifier),
                user_id: Some(account.identifier.len() as i64),
                acquired_at: Local::now(),
            })
        }

        async fn check_in(&self, session: &Session) -> Result<String, CheckinError> {
            self.record(format!("check_in {}", session.identifier));
            if self.expired_tokens.contains(&session.session_token) {
                return Err(CheckinError::SessionExpired("未登录".into()));
            }
            if self.checked_in.contains(&session.identifier) {
                return Err(CheckinError::AlreadyDone("今日已签到".into()));
            }
            Ok("签到成功".into())
        }

        async fn account_info(&self, _session: &Session) -> Result<AccountInfo, CheckinError> {
            Ok(AccountInfo {
                quota: 500,
                used_quota: 20,
                request_count: 3,
            })
        }

        async fn list_tokens(&self, session: &Session) -> Result<Vec<TokenRecord>, CheckinError> {
            self.record(format!("list_tokens {}", session.identifier));
            Ok(self
                .tokens
                .lock()
                .unwrap()
                .get(&session.identifier)
                .cloned()
                .unwrap_or_default())
        }

        async fn create_token(&self, session: &Session, name: &str) -> Result<(), CheckinError> {
            self.record(format!("create_token {}", session.identifier));
            self.tokens.lock().unwrap().entry(session.identifier.clone()).or_default().push(TokenRecord {
                name: name.to_string(),
                key: "abcdefghijkl".into(),
                status: 1,
                used_quota: 0.0,
                remain_quota: 500_000_000,
                unlimited_quota: true,
                created_time: 1_700_000_000,
                expired_time: -1,
            });
            Ok(())
        }
    }

    fn config(dir: &std::path::Path, accounts: &[(&str, &str)]) -> CheckinConfig {
        let mut config = ConfigLoader::parse_yaml("service:\n  base_url: http://127.0.0.1:9\n").unwrap();
        config.accounts = accounts.iter().map(|(u, p)| Account::new(*u, *p)).collect();
        config.batch.size = 2;
        config.batch.workers = 2;
        config.batch.account_delay_ms = DelayRange::fixed(0);
        config.batch.batch_delay_ms = DelayRange::fixed(0);
        config.paths.sessions = dir.join("cookies_only.json");
        config.paths.report_dir = dir.join("logs");
        config.paths.token_report = dir.join("token.md");
        config
    }

    fn runner(config: CheckinConfig, api: Arc<FakeApi>) -> Runner {
        Runner::new(config, api).with_pause(Arc::new(RecordingPause::default()))
    }

    fn stored(identifier: &str, token: &str) -> Session {
        Session {
            identifier: identifier.into(),
            session_token: token.into(),
            user_id: Some(1),
            acquired_at: Local::now(),
        }
    }

    #[tokio::test]
    async fn test_login_stores_sessions_and_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::default());
        api.rate_limited_logins.lock().unwrap().insert("carol".into(), 2);
        let config = config(dir.path(), &[("alice", "pw"), ("bob", "wrong"), ("carol", "pw")]);
        let sessions_path = config.paths.sessions.clone();

        let outcome = runner(config, api.clone()).login().await.unwrap();

        assert_eq!(outcome.summary.total, 3);
        assert_eq!(outcome.summary.succeeded, 2);
        assert_eq!(outcome.summary.failed, 1);
        let carol = outcome.results.iter().find(|r| r.identifier == "carol").unwrap();
        assert_eq!(carol.retry_count, 2);

        let store = SessionStore::load(&sessions_path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("alice").unwrap().session_token, "fresh-alice");
        assert!(store.get("bob").is_none());
        assert!(outcome.report_path.exists());
    }

    #[tokio::test]
    async fn test_check_in_relogs_on_rejected_session() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi {
            expired_tokens: vec!["stale".into()],
            checked_in: vec!["bob".into()],
            ..Default::default()
        });
        let config = config(dir.path(), &[("alice", "pw"), ("bob", "pw"), ("dave", "pw")]);
        let mut store = SessionStore::empty(&config.paths.sessions);
        store.upsert(stored("alice", "stale"));
        store.upsert(stored("bob", "good"));
        store.save().unwrap();
        let sessions_path = config.paths.sessions.clone();

        let outcome = runner(config, api.clone()).check_in().await.unwrap();

        assert_eq!(outcome.summary.total, 3);
        assert_eq!(outcome.summary.succeeded, 2);
        assert_eq!(outcome.summary.already_done, 1);
        let alice = outcome.results.iter().find(|r| r.identifier == "alice").unwrap();
        assert!(alice.message.contains("quota 500"));

        let calls = api.calls();
        assert!(calls.contains(&"login alice".to_string()));
        assert!(!calls.contains(&"login bob".to_string()));
        assert!(calls.contains(&"login dave".to_string()));

        let store = SessionStore::load(&sessions_path).unwrap();
        assert_eq!(store.get("alice").unwrap().session_token, "fresh-alice");
        assert_eq!(store.get("bob").unwrap().session_token, "good");
        assert_eq!(store.get("dave").unwrap().session_token, "fresh-dave");
    }

    #[tokio::test]
    async fn test_check_in_without_accounts_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = runner(config(dir.path(), &[]), Arc::new(FakeApi::default()))
            .check_in()
            .await;
        assert!(matches!(result, Err(CheckinError::Validation(_))));
    }

    #[tokio::test]
    async fn test_tokens_requires_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let result = runner(config(dir.path(), &[("alice", "pw")]), Arc::new(FakeApi::default()))
            .tokens(TokenOptions::default())
            .await;
        assert!(matches!(result, Err(CheckinError::Validation(_))));
    }

    #[tokio::test]
    async fn test_tokens_create_missing_and_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::default());
        let config = config(dir.path(), &[("alice", "pw")]);
        let mut store = SessionStore::empty(&config.paths.sessions);
        store.upsert(stored("alice", "good"));
        store.upsert(stored("retired", "old"));
        store.save().unwrap();
        let token_report = config.paths.token_report.clone();

        let outcome = runner(config, api.clone())
            .tokens(TokenOptions {
                create_missing: true,
                reveal_keys: false,
            })
            .await
            .unwrap();

        assert_eq!(outcome.summary.total, 2);
        assert_eq!(outcome.summary.succeeded, 2);
        let text = std::fs::read_to_string(token_report).unwrap();
        assert!(text.contains("| alice | alice | sk-ab********kl |"));
        assert!(text.contains("| retired | retired |"));
        assert!(!text.contains("abcdefghijkl"));
        assert_eq!(
            api.calls().iter().filter(|c| c.starts_with("create_token")).count(),
            2
        );
    }
}
