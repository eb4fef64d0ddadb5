//! Markdown reports
//!
//! Run reports are appended to `<report_dir>/<date>.md`, one section per run.
//! The token report is a single table rewritten on every token run.

use crate::core_types::{OperationResult, Outcome, TokenRecord};
use crate::errors::CheckinError;
use crate::redact::mask_middle;
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub already_done: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_results(results: &[OperationResult]) -> Self {
        results.iter().fold(Self::default(), |mut summary, result| {
            summary.total += 1;
            match result.outcome {
                Outcome::Success => summary.succeeded += 1,
                Outcome::AlreadyDone => summary.already_done += 1,
                Outcome::Failure => summary.failed += 1,
            }
            summary
        })
    }

    pub fn line(&self) -> String {
        format!(
            "**Summary**: {} total, {} succeeded, {} already done, {} failed",
            self.total, self.succeeded, self.already_done, self.failed
        )
    }
}

pub struct RunReport<'a> {
    pub title: &'a str,
    pub started_at: DateTime<Local>,
    pub results: &'a [OperationResult],
}

impl RunReport<'_> {
    /// Rows follow the configured account order where possible; the runner
    /// hands results over in completion order.
    pub fn render(&self, order: &[String]) -> String {
        let mut rows: Vec<&OperationResult> = self.results.iter().collect();
        rows.sort_by_key(|r| order.iter().position(|id| *id == r.identifier).unwrap_or(usize::MAX));

        let mut out = String::new();
        let _ = writeln!(
            out,
            "\n## {} - {}\n",
            self.title,
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        out.push_str("| Account | Status | Message |\n");
        out.push_str("|---------|--------|---------|\n");
        for result in rows {
            let _ = writeln!(
                out,
                "| {} | {} | {} |",
                cell(&result.identifier),
                result.outcome,
                cell(&with_retries(result))
            );
        }
        let _ = writeln!(out, "\n{}", RunSummary::from_results(self.results).line());
        out
    }

    /// Append to `<dir>/<YYYY-MM-DD>.md`, creating it if needed.
    pub fn append_to(&self, dir: &Path, order: &[String]) -> Result<PathBuf, CheckinError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.md", self.started_at.format("%Y-%m-%d")));
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        file.write_all(self.render(order).as_bytes())?;
        Ok(path)
    }
}

fn with_retries(result: &OperationResult) -> String {
    if result.retry_count == 0 {
        result.message.clone()
    } else {
        format!("{} (retries: {})", result.message, result.retry_count)
    }
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

pub struct TokenRow {
    pub identifier: String,
    pub token: TokenRecord,
}

pub fn render_token_report(rows: &[TokenRow], reveal_keys: bool) -> String {
    let mut out = String::new();
    out.push_str("| Account | Name | Key | Status | Used quota | Remaining quota | Created | Expires |\n");
    out.push_str("|---------|------|-----|--------|------------|-----------------|---------|---------|\n");
    for row in rows {
        let token = &row.token;
        let key = if reveal_keys {
            format!("sk-{}", token.key)
        } else {
            format!("sk-{}", mask_middle(&token.key))
        };
        let status = if token.is_enabled() { "enabled" } else { "disabled" };
        let remaining = if token.unlimited_quota {
            "unlimited".to_string()
        } else {
            token.remain_quota.to_string()
        };
        let expires = if token.never_expires() {
            "never".to_string()
        } else {
            format_timestamp(token.expired_time)
        };
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | ${:.2} | {} | {} | {} |",
            cell(&row.identifier),
            cell(&token.name),
            key,
            status,
            token.used_quota,
            remaining,
            format_timestamp(token.created_time),
            expires
        );
    }
    out
}

pub fn write_token_report(path: &Path, rows: &[TokenRow], reveal_keys: bool) -> Result<(), CheckinError> {
    crate::fsutil::write_atomic(path, render_token_report(rows, reveal_keys).as_bytes())
}

fn format_timestamp(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0).single() {
        Some(dt) if timestamp > 0 => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => "never".to_string(),
    }
}
