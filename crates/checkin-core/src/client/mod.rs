//! Upstream service boundary
//!
//! [`UpstreamApi`] is what the run workflows talk to. [`HttpClient`] is the
//! reqwest implementation; tests swap in scripted fakes or point the real
//! client at a local mock server.

pub mod http;

pub use http::{classify_response, HttpClient};

use crate::core_types::{Account, AccountInfo, Session, TokenRecord};
use crate::errors::CheckinError;
use async_trait::async_trait;

#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Exchange credentials for a session cookie and user id.
    async fn login(&self, account: &Account) -> Result<Session, CheckinError>;

    /// Claim today's check-in. Returns the upstream's message.
    async fn check_in(&self, session: &Session) -> Result<String, CheckinError>;

    async fn account_info(&self, session: &Session) -> Result<AccountInfo, CheckinError>;

    async fn list_tokens(&self, session: &Session) -> Result<Vec<TokenRecord>, CheckinError>;

    async fn create_token(&self, session: &Session, name: &str) -> Result<(), CheckinError>;
}
