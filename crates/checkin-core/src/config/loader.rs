//! Configuration loader for YAML files and environment resolution
//!
//! This module handles loading configuration from YAML files, merging
//! accounts supplied through the environment, and writing the file back
//! when accounts are merged permanently.

use crate::config::types::*;
use crate::core_types::Account;
use crate::errors::CheckinError;
use std::collections::HashSet;
use std::env;
use std::path::Path;
use tokio::fs;

/// JSON array of `{"username": ..., "password": ...}` records.
pub const ACCOUNTS_ENV: &str = "CHECKIN_ACCOUNTS";
/// Overrides `service.base_url`.
pub const BASE_URL_ENV: &str = "CHECKIN_BASE_URL";

/// What a merge of extra accounts did to the configured list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: usize,
    pub updated: usize,
    pub ignored: usize,
}

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<CheckinConfig, CheckinError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            CheckinError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content)
    }

    /// Load configuration from a YAML string, resolving the process environment
    pub fn from_str(content: &str) -> Result<CheckinConfig, CheckinError> {
        Self::from_str_with_env(content, |key| env::var(key).ok())
    }

    /// Same as [`ConfigLoader::from_str`] with an explicit environment lookup
    pub fn from_str_with_env<F>(content: &str, lookup: F) -> Result<CheckinConfig, CheckinError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::parse_yaml(content)?;
        Self::resolve_environment(&mut config, lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without touching the environment. Used when the file is going
    /// to be rewritten and must not pick up transient overrides.
    pub fn parse_yaml(content: &str) -> Result<CheckinConfig, CheckinError> {
        serde_yaml::from_str(content)
            .map_err(|e| CheckinError::Config(format!("Failed to parse YAML config: {}", e)))
    }

    fn resolve_environment<F>(config: &mut CheckinConfig, lookup: F) -> Result<(), CheckinError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            log::info!("Using base URL from {}", BASE_URL_ENV);
            config.service.base_url = base_url;
        }

        if let Some(raw) = lookup(ACCOUNTS_ENV).filter(|v| !v.trim().is_empty()) {
            let extra = Self::parse_env_accounts(&raw)?;
            let summary = Self::merge_accounts(&mut config.accounts, extra.accounts);
            log::info!(
                "Merged accounts from {}: {} added, {} updated",
                ACCOUNTS_ENV,
                summary.added,
                summary.updated
            );
        }

        Self::dedup_accounts(&mut config.accounts);
        Ok(())
    }

    /// Parse the environment account list, skipping malformed records.
    pub fn parse_env_accounts(raw: &str) -> Result<EnvAccounts, CheckinError> {
        let values: Vec<serde_json::Value> = serde_json::from_str(raw).map_err(|e| {
            let preview: String = raw.chars().take(50).collect();
            CheckinError::Config(format!(
                "{} is not a valid JSON array ({}); starts with: {}",
                ACCOUNTS_ENV, e, preview
            ))
        })?;

        let total = values.len();
        let accounts: Vec<Account> = values
            .into_iter()
            .filter_map(|value| serde_json::from_value::<Account>(value).ok())
            .filter(|account| !account.identifier.trim().is_empty())
            .collect();

        let ignored = total - accounts.len();
        if ignored > 0 {
            log::warn!("Ignored {} malformed account record(s) in {}", ignored, ACCOUNTS_ENV);
        }

        Ok(EnvAccounts { accounts, ignored })
    }

    /// Merge `extra` into `accounts`. A known identifier with a new secret
    /// is updated in place; unknown identifiers are appended in order.
    pub fn merge_accounts(accounts: &mut Vec<Account>, extra: Vec<Account>) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for account in extra {
            match accounts.iter_mut().find(|a| a.identifier == account.identifier) {
                Some(existing) if existing.secret == account.secret => {}
                Some(existing) => {
                    existing.secret = account.secret;
                    summary.updated += 1;
                }
                None => {
                    accounts.push(account);
                    summary.added += 1;
                }
            }
        }
        summary
    }

    /// Drop repeated identifiers, first occurrence wins.
    pub fn dedup_accounts(accounts: &mut Vec<Account>) {
        let mut seen = HashSet::new();
        let before = accounts.len();
        accounts.retain(|account| seen.insert(account.identifier.clone()));
        if accounts.len() != before {
            log::warn!(
                "Dropped {} duplicate account(s) from configuration",
                before - accounts.len()
            );
        }
    }

    /// Merge the accounts in `CHECKIN_ACCOUNTS` into the file at `path` and
    /// write it back.
    pub async fn merge_env_into_file<P: AsRef<Path>>(path: P) -> Result<MergeSummary, CheckinError> {
        let raw = env::var(ACCOUNTS_ENV).map_err(|_| {
            CheckinError::Validation(format!("{} is not set", ACCOUNTS_ENV))
        })?;
        Self::merge_into_file(path, &raw).await
    }

    pub async fn merge_into_file<P: AsRef<Path>>(path: P, raw: &str) -> Result<MergeSummary, CheckinError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            CheckinError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut config = Self::parse_yaml(&content)?;
        let extra = Self::parse_env_accounts(raw)?;
        let mut summary = Self::merge_accounts(&mut config.accounts, extra.accounts);
        summary.ignored = extra.ignored;

        if summary.added > 0 || summary.updated > 0 {
            Self::save(&config, path)?;
            log::info!(
                "Config updated, now {} account(s)",
                config.accounts.len()
            );
        } else {
            log::info!("No new accounts to merge");
        }
        Ok(summary)
    }

    /// Write the configuration as YAML, replacing the file atomically.
    pub fn save<P: AsRef<Path>>(config: &CheckinConfig, path: P) -> Result<(), CheckinError> {
        let yaml = serde_yaml::to_string(config)?;
        crate::fsutil::write_atomic(path.as_ref(), yaml.as_bytes())
    }
}

#[derive(Debug, Clone)]
pub struct EnvAccounts {
    pub accounts: Vec<Account>,
    pub ignored: usize,
}
