//! Rate-limited session refresh and daily check-in runs against one upstream
//! web service.
//!
//! The crate is built around a small, reusable pipeline:
//!
//! - **Batch scheduling**: accounts are cut into fixed-size batches and run on
//!   a bounded worker pool, sequentially within a batch and with pacing delays
//! - **Retry and backoff**: every upstream call is wrapped by one executor that
//!   backs off exponentially on HTTP 429 and linearly on transient failures
//! - **Upstream client**: a reqwest adapter behind the `UpstreamApi` trait
//! - **Response parsing**: strict envelope decoding with a swappable degraded
//!   extractor for bodies that are not clean JSON
//! - **Reporting**: per-run Markdown tables with a summary line, plus the token
//!   report
//!
//! Sessions persist in a flat JSON store between runs. Configuration is YAML
//! with environment overrides.

pub mod client;
pub mod config;
pub mod core_types;
pub mod errors;
pub mod fsutil;
pub mod logging;
pub mod parser;
pub mod redact;
pub mod report;
pub mod retry;
pub mod runs;
pub mod scheduler;
pub mod session_store;

pub use client::{HttpClient, UpstreamApi};
pub use config::*;
pub use core_types::{Account, AccountInfo, OperationResult, Outcome, Session, TokenRecord};
pub use errors::{CheckinError, Disposition};
pub use logging::RunLog;
pub use report::RunSummary;
pub use retry::{RetryExecutor, RetryPolicy};
pub use runs::{RunOutcome, Runner, TokenOptions};
pub use scheduler::BatchScheduler;
pub use session_store::SessionStore;

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
mod test_run_integration;
